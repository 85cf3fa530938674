use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use gatehouse_domain::account::normalize_email;
use gatehouse_domain::id::AccountId;

use crate::domain::policy::PasswordPolicy;
use crate::domain::repository::{
    AccountRepository, CredentialVerifier, Notifier, ResetTokenRepository, TokenRepository,
};
use crate::domain::types::{
    DeliveryOutcome, NewPasswordResetToken, NotificationContext, RESET_TOKEN_LEN,
};
use crate::error::{ErrorKind, IdentityError, WithOp};
use crate::infra::rate_limit::RateLimiter;
use crate::usecase::account::{load_active_account, non_blank};
use crate::usecase::secret::{generate_token, hash_token, is_well_formed};
use crate::usecase::token::revoke_sessions;

/// Rate-limit key for reset requests against one email.
pub fn email_limit_key(email: &str) -> String {
    format!("password-reset:email:{}", normalize_email(email))
}

/// Rate-limit key for reset requests from one source, e.g. a client IP.
pub fn source_limit_key(source: &str) -> String {
    format!("password-reset:source:{source}")
}

// ── ChangePassword ───────────────────────────────────────────────────────────

pub struct ChangePasswordInput {
    pub account_id: AccountId,
    pub current_password: String,
    pub new_password: String,
}

pub struct ChangePasswordUseCase<A, T, V>
where
    A: AccountRepository,
    T: TokenRepository,
    V: CredentialVerifier,
{
    pub accounts: A,
    pub tokens: T,
    pub verifier: V,
    pub policy: PasswordPolicy,
    pub revoke_sessions: bool,
}

impl<A, T, V> ChangePasswordUseCase<A, T, V>
where
    A: AccountRepository,
    T: TokenRepository,
    V: CredentialVerifier,
{
    pub async fn execute(&self, input: ChangePasswordInput) -> Result<(), IdentityError> {
        self.run(input).await.op("change_password")
    }

    async fn run(&self, input: ChangePasswordInput) -> Result<(), ErrorKind> {
        let account = load_active_account(&self.accounts, input.account_id).await?;

        if !self
            .verifier
            .verify(&input.current_password, &account.password_hash)?
        {
            return Err(ErrorKind::InvalidCredentials);
        }
        self.policy.check(&input.new_password)?;
        let password_hash = self.verifier.hash(&input.new_password)?;

        // A concurrent change made the verified password stale.
        if !self
            .accounts
            .set_password_hash(account.id, &account.password_hash, &password_hash)
            .await?
        {
            return Err(ErrorKind::InvalidCredentials);
        }

        if self.revoke_sessions {
            revoke_sessions(&self.tokens, account.id).await?;
        }
        tracing::info!(account_id = %account.id, "password changed");
        Ok(())
    }
}

// ── InitiatePasswordReset ────────────────────────────────────────────────────

pub struct InitiatePasswordResetUseCase<A, P, N>
where
    A: AccountRepository,
    P: ResetTokenRepository,
    N: Notifier,
{
    pub accounts: A,
    pub reset_tokens: P,
    pub notifier: N,
    pub limiter: Arc<RateLimiter>,
    pub ttl: Duration,
}

impl<A, P, N> InitiatePasswordResetUseCase<A, P, N>
where
    A: AccountRepository,
    P: ResetTokenRepository,
    N: Notifier,
{
    /// Start a reset for `email`. Unknown and inactive accounts charge the
    /// limiter exactly like real ones and return `Ok(None)`.
    ///
    /// The returned token is for in-process callers and tests; outward-facing
    /// layers report the same success either way.
    pub async fn execute(
        &self,
        email: &str,
        source: Option<&str>,
    ) -> Result<Option<String>, IdentityError> {
        self.run(email, source).await.op("initiate_password_reset")
    }

    async fn run(&self, email: &str, source: Option<&str>) -> Result<Option<String>, ErrorKind> {
        let email = normalize_email(email);

        // 1. Charge every window before deciding, so each key counts the attempt
        let mut keys = vec![email_limit_key(&email)];
        if let Some(source) = non_blank(source.map(str::to_owned)) {
            keys.push(source_limit_key(&source));
        }
        let mut blocked_until: Option<DateTime<Utc>> = None;
        for key in &keys {
            if let Err(e) = self.limiter.check(key) {
                let retry_at = e.retry_at().ok_or(e)?;
                blocked_until = Some(blocked_until.map_or(retry_at, |b| b.max(retry_at)));
            }
        }
        if let Some(retry_at) = blocked_until {
            tracing::warn!(%retry_at, "password reset rate limited");
            return Err(ErrorKind::RateLimitExceeded { retry_at });
        }

        // 2. Only active accounts get a token
        let account = match self.accounts.find_by_email(&email).await? {
            Some(account) if account.is_active => account,
            _ => {
                tracing::debug!("password reset requested for unknown or inactive account");
                return Ok(None);
            }
        };

        let token = generate_token(RESET_TOKEN_LEN);
        let record = self
            .reset_tokens
            .create(&NewPasswordResetToken {
                account_id: account.id,
                token_hash: hash_token(&token),
                expires_at: Utc::now() + self.ttl,
            })
            .await?;

        // 3. Deliver; failure is only logged
        let context = NotificationContext::PasswordReset {
            account_id: account.id,
            expires_at: record.expires_at,
        };
        if let DeliveryOutcome::Failed(reason) =
            self.notifier.deliver(&account.email, &token, &context).await
        {
            tracing::warn!(account_id = %account.id, reason = %reason, "password reset delivery failed");
        }

        tracing::info!(account_id = %account.id, "password reset initiated");
        Ok(Some(token))
    }
}

// ── ResetPassword ────────────────────────────────────────────────────────────

pub struct ResetPasswordUseCase<A, P, T, V>
where
    A: AccountRepository,
    P: ResetTokenRepository,
    T: TokenRepository,
    V: CredentialVerifier,
{
    pub accounts: A,
    pub reset_tokens: P,
    pub tokens: T,
    pub verifier: V,
    pub policy: PasswordPolicy,
    pub revoke_sessions: bool,
}

impl<A, P, T, V> ResetPasswordUseCase<A, P, T, V>
where
    A: AccountRepository,
    P: ResetTokenRepository,
    T: TokenRepository,
    V: CredentialVerifier,
{
    /// Redeem a reset token. Absent, consumed and expired tokens all fail
    /// with `InvalidToken`.
    pub async fn execute(&self, token: &str, new_password: &str) -> Result<(), IdentityError> {
        self.run(token, new_password).await.op("reset_password")
    }

    async fn run(&self, token: &str, new_password: &str) -> Result<(), ErrorKind> {
        if !is_well_formed(token, RESET_TOKEN_LEN) {
            return Err(ErrorKind::InvalidToken);
        }
        let now = Utc::now();
        let record = self
            .reset_tokens
            .find_by_hash(&hash_token(token))
            .await?
            .filter(|r| r.is_usable_at(now))
            .ok_or(ErrorKind::InvalidToken)?;

        // Everything that can reject the request runs before the token is burned.
        self.policy.check(new_password)?;
        let account = load_active_account(&self.accounts, record.account_id).await?;
        let password_hash = self.verifier.hash(new_password)?;

        // The store re-checks the account, so a deactivation during hashing wins.
        if !self
            .reset_tokens
            .redeem(record.id, &password_hash, now)
            .await?
        {
            return Err(ErrorKind::InvalidToken);
        }

        if self.revoke_sessions {
            revoke_sessions(&self.tokens, account.id).await?;
        }
        tracing::info!(account_id = %account.id, "password reset completed");
        Ok(())
    }
}

// ── PurgeExpiredResetTokens ──────────────────────────────────────────────────

pub struct PurgeExpiredResetTokensUseCase<P>
where
    P: ResetTokenRepository,
{
    pub reset_tokens: P,
}

impl<P> PurgeExpiredResetTokensUseCase<P>
where
    P: ResetTokenRepository,
{
    pub async fn execute(&self) -> Result<u64, IdentityError> {
        let count = self
            .reset_tokens
            .delete_expired(Utc::now())
            .await
            .op("purge_expired_reset_tokens")?;
        tracing::info!(count, "purged expired reset tokens");
        Ok(count)
    }
}
