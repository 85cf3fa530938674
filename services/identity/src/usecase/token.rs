use std::collections::BTreeSet;

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

use gatehouse_auth_types::token::{AccessClaims, AuthError, validate_access_token};
use gatehouse_domain::account::normalize_email;
use gatehouse_domain::id::AccountId;

use crate::config::IdentityConfig;
use crate::domain::repository::{AccountRepository, AuditSink, CredentialVerifier, TokenRepository};
use crate::domain::types::{
    Account, AuditEvent, AuditEventKind, ClientMeta, NewRefreshToken, REFRESH_TOKEN_LEN,
};
use crate::error::{ErrorKind, IdentityError, WithOp};
use crate::usecase::account::ensure_active;
use crate::usecase::permission::effective_permissions;
use crate::usecase::secret::{generate_token, hash_token, is_well_formed};

/// Signing secret and lifetimes for issued tokens.
#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub jwt_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub mobile_refresh_ttl: Duration,
}

impl TokenSettings {
    pub fn from_config(config: &IdentityConfig) -> Self {
        Self {
            jwt_secret: config.jwt_secret.clone(),
            access_ttl: config.access_token_ttl(),
            refresh_ttl: config.refresh_token_ttl(),
            mobile_refresh_ttl: config.mobile_refresh_token_ttl(),
        }
    }

    fn refresh_ttl_for(&self, is_mobile: bool) -> Duration {
        if is_mobile {
            self.mobile_refresh_ttl
        } else {
            self.refresh_ttl
        }
    }
}

/// Sign an HS256 access token embedding the account id and permission snapshot.
/// Returns the token and its `exp` in seconds since the epoch.
pub fn issue_access_token(
    account_id: AccountId,
    permissions: &BTreeSet<String>,
    settings: &TokenSettings,
    now: DateTime<Utc>,
) -> Result<(String, u64), ErrorKind> {
    let iat = now.timestamp().max(0) as u64;
    let exp = (now + settings.access_ttl).timestamp().max(0) as u64;
    let claims = AccessClaims {
        sub: account_id.to_string(),
        perms: permissions.iter().cloned().collect(),
        iat,
        exp,
        jti: Uuid::new_v4().to_string(),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(settings.jwt_secret.as_bytes()),
    )
    .map_err(|e| anyhow!("failed to sign access token: {e}"))?;
    Ok((token, exp))
}

/// Fresh opaque refresh value plus the record that stores its hash.
fn new_refresh_token(
    account_id: AccountId,
    is_mobile: bool,
    device_name: Option<String>,
    settings: &TokenSettings,
    now: DateTime<Utc>,
) -> (String, NewRefreshToken) {
    let value = generate_token(REFRESH_TOKEN_LEN);
    let record = NewRefreshToken {
        account_id,
        token_hash: hash_token(&value),
        expires_at: now + settings.refresh_ttl_for(is_mobile),
        is_mobile,
        device_name,
    };
    (value, record)
}

async fn record_audit<S: AuditSink>(audit: &S, event: AuditEvent) {
    if let Err(e) = audit.record(&event).await {
        tracing::warn!(
            kind = ?event.kind,
            error = %format!("{e:#}"),
            "failed to record audit event"
        );
    }
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub access_token_exp: u64,
    pub refresh_token: String,
    pub refresh_token_expires_at: DateTime<Utc>,
}

/// Result of a login or refresh.
#[derive(Debug)]
pub struct IssuedSession {
    pub account: Account,
    /// Snapshot embedded in the access token.
    pub permissions: BTreeSet<String>,
    pub tokens: TokenPair,
}

// ── Login ────────────────────────────────────────────────────────────────────

pub struct LoginInput {
    pub email: String,
    pub password: String,
    pub meta: ClientMeta,
}

pub struct LoginUseCase<A, T, V, S>
where
    A: AccountRepository,
    T: TokenRepository,
    V: CredentialVerifier,
    S: AuditSink,
{
    pub accounts: A,
    pub tokens: T,
    pub verifier: V,
    pub audit: S,
    pub settings: TokenSettings,
}

impl<A, T, V, S> LoginUseCase<A, T, V, S>
where
    A: AccountRepository,
    T: TokenRepository,
    V: CredentialVerifier,
    S: AuditSink,
{
    pub async fn execute(&self, input: LoginInput) -> Result<IssuedSession, IdentityError> {
        let result = self.run(&input).await;
        let event = match &result {
            Ok(session) => AuditEvent::success(AuditEventKind::Login, session.account.id, &input.meta),
            Err((account_id, kind)) => {
                AuditEvent::failure(AuditEventKind::Login, *account_id, &input.meta, kind.code())
            }
        };
        record_audit(&self.audit, event).await;

        let session = result.map_err(|(_, kind)| kind).op("login")?;
        tracing::info!(account_id = %session.account.id, "login succeeded");
        Ok(session)
    }

    async fn run(&self, input: &LoginInput) -> Result<IssuedSession, (Option<AccountId>, ErrorKind)> {
        // 1. Look up by normalized email
        let email = normalize_email(&input.email);
        let account = match self.accounts.find_by_email(&email).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                self.verifier.verify_dummy(&input.password);
                return Err((None, ErrorKind::AccountNotFound));
            }
            Err(e) => return Err((None, e)),
        };
        let id = Some(account.id);

        // 2. Password first, then activity
        match self.verifier.verify(&input.password, &account.password_hash) {
            Ok(true) => {}
            Ok(false) => return Err((id, ErrorKind::InvalidCredentials)),
            Err(e) => return Err((id, e)),
        }
        ensure_active(&account).map_err(|e| (id, e))?;

        // 3. Issue the pair and persist the refresh session
        self.issue(account, &input.meta).await.map_err(|e| (id, e))
    }

    async fn issue(&self, account: Account, meta: &ClientMeta) -> Result<IssuedSession, ErrorKind> {
        let now = Utc::now();
        let permissions = effective_permissions(&self.accounts, account.id).await?;
        let (access_token, access_token_exp) =
            issue_access_token(account.id, &permissions, &self.settings, now)?;
        let (refresh_token, record) = new_refresh_token(
            account.id,
            meta.is_mobile,
            meta.device_name.clone(),
            &self.settings,
            now,
        );
        let stored = self.tokens.create(&record).await?;

        Ok(IssuedSession {
            account,
            permissions,
            tokens: TokenPair {
                access_token,
                access_token_exp,
                refresh_token,
                refresh_token_expires_at: stored.expires_at,
            },
        })
    }
}

// ── RefreshToken ─────────────────────────────────────────────────────────────

pub struct RefreshTokenUseCase<A, T, S>
where
    A: AccountRepository,
    T: TokenRepository,
    S: AuditSink,
{
    pub accounts: A,
    pub tokens: T,
    pub audit: S,
    pub settings: TokenSettings,
}

impl<A, T, S> RefreshTokenUseCase<A, T, S>
where
    A: AccountRepository,
    T: TokenRepository,
    S: AuditSink,
{
    /// Exchange a refresh token for a new pair. The presented value is
    /// invalidated in the same store operation that inserts its successor.
    pub async fn execute(
        &self,
        refresh_token: &str,
        meta: &ClientMeta,
    ) -> Result<IssuedSession, IdentityError> {
        let result = self.run(refresh_token).await;
        let event = match &result {
            Ok(session) => {
                AuditEvent::success(AuditEventKind::Refresh, session.account.id, meta)
            }
            Err((account_id, kind)) => {
                AuditEvent::failure(AuditEventKind::Refresh, *account_id, meta, kind.code())
            }
        };
        record_audit(&self.audit, event).await;

        let session = result.map_err(|(_, kind)| kind).op("refresh_token")?;
        tracing::info!(account_id = %session.account.id, "refresh token rotated");
        Ok(session)
    }

    async fn run(
        &self,
        refresh_token: &str,
    ) -> Result<IssuedSession, (Option<AccountId>, ErrorKind)> {
        if !is_well_formed(refresh_token, REFRESH_TOKEN_LEN) {
            return Err((None, ErrorKind::InvalidToken));
        }
        let hash = hash_token(refresh_token);
        let now = Utc::now();

        let record = self
            .tokens
            .find_by_hash(&hash)
            .await
            .map_err(|e| (None, e))?
            .ok_or((None, ErrorKind::TokenNotFound))?;
        let id = Some(record.account_id);

        if record.is_expired_at(now) {
            self.tokens.delete_by_hash(&hash).await.map_err(|e| (id, e))?;
            return Err((id, ErrorKind::TokenExpired));
        }

        self.rotate(&hash, record.account_id, record.is_mobile, record.device_name, now)
            .await
            .map_err(|e| (id, e))
    }

    async fn rotate(
        &self,
        old_hash: &str,
        account_id: AccountId,
        is_mobile: bool,
        device_name: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<IssuedSession, ErrorKind> {
        let account = self
            .accounts
            .find_by_id(account_id)
            .await?
            .ok_or(ErrorKind::AccountNotFound)?;
        ensure_active(&account)?;

        let permissions = effective_permissions(&self.accounts, account.id).await?;
        let (access_token, access_token_exp) =
            issue_access_token(account.id, &permissions, &self.settings, now)?;
        let (refresh_token, record) =
            new_refresh_token(account.id, is_mobile, device_name, &self.settings, now);

        // Everything fallible happens above; until this commit the old value stays valid.
        let stored = self
            .tokens
            .rotate(old_hash, &record)
            .await?
            .ok_or(ErrorKind::TokenNotFound)?;

        Ok(IssuedSession {
            account,
            permissions,
            tokens: TokenPair {
                access_token,
                access_token_exp,
                refresh_token,
                refresh_token_expires_at: stored.expires_at,
            },
        })
    }
}

// ── Logout ───────────────────────────────────────────────────────────────────

pub struct LogoutUseCase<T, S>
where
    T: TokenRepository,
    S: AuditSink,
{
    pub tokens: T,
    pub audit: S,
}

impl<T, S> LogoutUseCase<T, S>
where
    T: TokenRepository,
    S: AuditSink,
{
    /// End the session behind `refresh_token`. Never fails toward the caller.
    pub async fn execute(&self, refresh_token: &str, meta: &ClientMeta) {
        if refresh_token.is_empty() {
            return;
        }
        let hash = hash_token(refresh_token);

        let record = match self.tokens.find_by_hash(&hash).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "logout lookup failed");
                None
            }
        };
        if let Err(e) = self.tokens.delete_by_hash(&hash).await {
            tracing::warn!(error = %e, "logout delete failed");
            return;
        }

        if let Some(record) = record {
            tracing::info!(account_id = %record.account_id, "logged out");
            record_audit(
                &self.audit,
                AuditEvent::success(AuditEventKind::Logout, record.account_id, meta),
            )
            .await;
        }
    }
}

// ── RevokeAllTokens ──────────────────────────────────────────────────────────

pub struct RevokeAllTokensUseCase<T>
where
    T: TokenRepository,
{
    pub tokens: T,
}

impl<T> RevokeAllTokensUseCase<T>
where
    T: TokenRepository,
{
    /// Delete every refresh session of the account. Returns how many were removed.
    pub async fn execute(&self, account_id: AccountId) -> Result<u64, IdentityError> {
        let count = self
            .tokens
            .delete_all_for_account(account_id)
            .await
            .op("revoke_all_tokens")?;
        tracing::info!(account_id = %account_id, count, "revoked refresh tokens");
        Ok(count)
    }
}

// ── ValidateToken ────────────────────────────────────────────────────────────

pub struct ValidateTokenUseCase<A>
where
    A: AccountRepository,
{
    pub accounts: A,
    pub jwt_secret: String,
}

impl<A> ValidateTokenUseCase<A>
where
    A: AccountRepository,
{
    /// Verify an access token and load its account, which must still be active.
    pub async fn execute(&self, access_token: &str) -> Result<Account, IdentityError> {
        self.run(access_token).await.op("validate_token")
    }

    async fn run(&self, access_token: &str) -> Result<Account, ErrorKind> {
        let info = validate_access_token(access_token, &self.jwt_secret).map_err(|e| match e {
            AuthError::Expired => ErrorKind::TokenExpired,
            AuthError::InvalidSignature | AuthError::Malformed => ErrorKind::InvalidToken,
        })?;
        let account = self
            .accounts
            .find_by_id(info.account_id)
            .await?
            .ok_or(ErrorKind::AccountNotFound)?;
        ensure_active(&account)?;
        Ok(account)
    }
}

// ── PurgeExpiredTokens ───────────────────────────────────────────────────────

pub struct PurgeExpiredTokensUseCase<T>
where
    T: TokenRepository,
{
    pub tokens: T,
}

impl<T> PurgeExpiredTokensUseCase<T>
where
    T: TokenRepository,
{
    pub async fn execute(&self) -> Result<u64, IdentityError> {
        let count = self
            .tokens
            .delete_expired(Utc::now())
            .await
            .op("purge_expired_tokens")?;
        tracing::info!(count, "purged expired refresh tokens");
        Ok(count)
    }
}

/// Revoke all sessions of an account, used after credential changes.
pub(crate) async fn revoke_sessions<T: TokenRepository>(
    tokens: &T,
    account_id: AccountId,
) -> Result<u64, ErrorKind> {
    let count = tokens.delete_all_for_account(account_id).await?;
    tracing::info!(account_id = %account_id, count, "revoked refresh tokens");
    Ok(count)
}
