use std::sync::Arc;

use crate::config::IdentityConfig;
use crate::domain::policy::PasswordPolicy;
use crate::domain::repository::{
    AccountRepository, AuditSink, InvitationRepository, Notifier, ResetTokenRepository,
    RoleRepository, TokenRepository,
};
use crate::error::ErrorKind;
use crate::infra::credential::Argon2Verifier;
use crate::infra::rate_limit::RateLimiter;
use crate::usecase::account::{
    DirectPermissionUseCase, ListAccountsUseCase, RegisterAccountUseCase, RoleAssignmentUseCase,
    SetAccountActiveUseCase,
};
use crate::usecase::invitation::{
    AcceptInvitationUseCase, CleanupExpiredInvitationsUseCase, CreateInvitationUseCase,
    ListPendingInvitationsUseCase, ResendInvitationUseCase, RevokeInvitationUseCase,
    ValidateInvitationUseCase,
};
use crate::usecase::maintenance::SweepExpiredUseCase;
use crate::usecase::password::{
    ChangePasswordUseCase, InitiatePasswordResetUseCase, PurgeExpiredResetTokensUseCase,
    ResetPasswordUseCase,
};
use crate::usecase::permission::PermissionResolver;
use crate::usecase::token::{
    LoginUseCase, LogoutUseCase, PurgeExpiredTokensUseCase, RefreshTokenUseCase,
    RevokeAllTokensUseCase, TokenSettings, ValidateTokenUseCase,
};

/// Shared identity state, built once at startup and handed to each request.
///
/// `S` is the store (every repository trait over one backend), `N` the
/// notifier and `A` the audit sink. Use-case factories clone the cheap
/// handles they need.
#[derive(Clone)]
pub struct IdentityContext<S, N, A> {
    pub store: S,
    pub notifier: N,
    pub audit: A,
    pub verifier: Argon2Verifier,
    pub rate_limiter: Arc<RateLimiter>,
    pub settings: TokenSettings,
    pub password_policy: PasswordPolicy,
    pub config: IdentityConfig,
}

impl<S, N, A> IdentityContext<S, N, A>
where
    S: AccountRepository
        + RoleRepository
        + TokenRepository
        + InvitationRepository
        + ResetTokenRepository
        + Clone,
    N: Notifier + Clone,
    A: AuditSink + Clone,
{
    pub fn new(config: IdentityConfig, store: S, notifier: N, audit: A) -> Result<Self, ErrorKind> {
        config.validate()?;
        let verifier = Argon2Verifier::from_config(&config)?;
        let rate_limiter = Arc::new(RateLimiter::new(
            config.password_reset_max_attempts,
            config.password_reset_window(),
        ));
        Ok(Self {
            store,
            notifier,
            audit,
            verifier,
            rate_limiter,
            settings: TokenSettings::from_config(&config),
            password_policy: PasswordPolicy::new(config.password_min_length),
            config,
        })
    }

    /// Replace the password policy, e.g. to add a custom rule.
    pub fn with_password_policy(mut self, policy: PasswordPolicy) -> Self {
        self.password_policy = policy;
        self
    }

    // ── Token service ────────────────────────────────────────────────────────

    pub fn login(&self) -> LoginUseCase<S, S, Argon2Verifier, A> {
        LoginUseCase {
            accounts: self.store.clone(),
            tokens: self.store.clone(),
            verifier: self.verifier.clone(),
            audit: self.audit.clone(),
            settings: self.settings.clone(),
        }
    }

    pub fn refresh_token(&self) -> RefreshTokenUseCase<S, S, A> {
        RefreshTokenUseCase {
            accounts: self.store.clone(),
            tokens: self.store.clone(),
            audit: self.audit.clone(),
            settings: self.settings.clone(),
        }
    }

    pub fn logout(&self) -> LogoutUseCase<S, A> {
        LogoutUseCase {
            tokens: self.store.clone(),
            audit: self.audit.clone(),
        }
    }

    pub fn revoke_all_tokens(&self) -> RevokeAllTokensUseCase<S> {
        RevokeAllTokensUseCase {
            tokens: self.store.clone(),
        }
    }

    pub fn validate_token(&self) -> ValidateTokenUseCase<S> {
        ValidateTokenUseCase {
            accounts: self.store.clone(),
            jwt_secret: self.settings.jwt_secret.clone(),
        }
    }

    pub fn purge_expired_tokens(&self) -> PurgeExpiredTokensUseCase<S> {
        PurgeExpiredTokensUseCase {
            tokens: self.store.clone(),
        }
    }

    pub fn change_password(&self) -> ChangePasswordUseCase<S, S, Argon2Verifier> {
        ChangePasswordUseCase {
            accounts: self.store.clone(),
            tokens: self.store.clone(),
            verifier: self.verifier.clone(),
            policy: self.password_policy.clone(),
            revoke_sessions: self.config.revoke_sessions_on_password_change,
        }
    }

    // ── Permissions ──────────────────────────────────────────────────────────

    pub fn permission_resolver(&self) -> PermissionResolver<S> {
        PermissionResolver {
            accounts: self.store.clone(),
        }
    }

    // ── Invitations ──────────────────────────────────────────────────────────

    pub fn create_invitation(&self) -> CreateInvitationUseCase<S, S, S, N> {
        CreateInvitationUseCase {
            accounts: self.store.clone(),
            roles: self.store.clone(),
            invitations: self.store.clone(),
            notifier: self.notifier.clone(),
            ttl: self.config.invitation_ttl(),
        }
    }

    pub fn validate_invitation(&self) -> ValidateInvitationUseCase<S, S> {
        ValidateInvitationUseCase {
            invitations: self.store.clone(),
            roles: self.store.clone(),
        }
    }

    pub fn accept_invitation(&self) -> AcceptInvitationUseCase<S, Argon2Verifier> {
        AcceptInvitationUseCase {
            invitations: self.store.clone(),
            verifier: self.verifier.clone(),
            policy: self.password_policy.clone(),
        }
    }

    pub fn resend_invitation(&self) -> ResendInvitationUseCase<S, S, S, N> {
        ResendInvitationUseCase {
            accounts: self.store.clone(),
            roles: self.store.clone(),
            invitations: self.store.clone(),
            notifier: self.notifier.clone(),
        }
    }

    pub fn revoke_invitation(&self) -> RevokeInvitationUseCase<S, S> {
        RevokeInvitationUseCase {
            accounts: self.store.clone(),
            invitations: self.store.clone(),
        }
    }

    pub fn list_pending_invitations(&self) -> ListPendingInvitationsUseCase<S> {
        ListPendingInvitationsUseCase {
            invitations: self.store.clone(),
        }
    }

    pub fn cleanup_expired_invitations(&self) -> CleanupExpiredInvitationsUseCase<S> {
        CleanupExpiredInvitationsUseCase {
            invitations: self.store.clone(),
        }
    }

    // ── Password reset ───────────────────────────────────────────────────────

    pub fn initiate_password_reset(&self) -> InitiatePasswordResetUseCase<S, S, N> {
        InitiatePasswordResetUseCase {
            accounts: self.store.clone(),
            reset_tokens: self.store.clone(),
            notifier: self.notifier.clone(),
            limiter: self.rate_limiter.clone(),
            ttl: self.config.password_reset_ttl(),
        }
    }

    pub fn reset_password(&self) -> ResetPasswordUseCase<S, S, S, Argon2Verifier> {
        ResetPasswordUseCase {
            accounts: self.store.clone(),
            reset_tokens: self.store.clone(),
            tokens: self.store.clone(),
            verifier: self.verifier.clone(),
            policy: self.password_policy.clone(),
            revoke_sessions: self.config.revoke_sessions_on_password_change,
        }
    }

    pub fn purge_expired_reset_tokens(&self) -> PurgeExpiredResetTokensUseCase<S> {
        PurgeExpiredResetTokensUseCase {
            reset_tokens: self.store.clone(),
        }
    }

    // ── Account administration ───────────────────────────────────────────────

    pub fn register_account(&self) -> RegisterAccountUseCase<S, S, Argon2Verifier> {
        RegisterAccountUseCase {
            accounts: self.store.clone(),
            roles: self.store.clone(),
            verifier: self.verifier.clone(),
            policy: self.password_policy.clone(),
        }
    }

    pub fn set_account_active(&self) -> SetAccountActiveUseCase<S, S> {
        SetAccountActiveUseCase {
            accounts: self.store.clone(),
            tokens: self.store.clone(),
        }
    }

    pub fn role_assignment(&self) -> RoleAssignmentUseCase<S> {
        RoleAssignmentUseCase {
            accounts: self.store.clone(),
        }
    }

    pub fn direct_permissions(&self) -> DirectPermissionUseCase<S> {
        DirectPermissionUseCase {
            accounts: self.store.clone(),
        }
    }

    pub fn list_accounts(&self) -> ListAccountsUseCase<S> {
        ListAccountsUseCase {
            accounts: self.store.clone(),
        }
    }

    // ── Maintenance ──────────────────────────────────────────────────────────

    pub fn sweep_expired(&self) -> SweepExpiredUseCase<S, S, S> {
        SweepExpiredUseCase {
            tokens: self.store.clone(),
            invitations: self.store.clone(),
            reset_tokens: self.store.clone(),
            limiter: self.rate_limiter.clone(),
        }
    }
}
