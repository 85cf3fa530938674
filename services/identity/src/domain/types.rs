use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use gatehouse_domain::id::{
    AccountId, InvitationId, PermissionId, ResetTokenId, RoleId, TokenId,
};
use gatehouse_domain::pagination::PageRequest;
use gatehouse_domain::permission::{PermissionKey, PermissionMode};

use crate::error::ErrorKind;

/// Refresh-token length in characters.
pub const REFRESH_TOKEN_LEN: usize = 64;

/// Invitation token length in characters.
pub const INVITATION_TOKEN_LEN: usize = 43;

/// Password reset token length in characters.
pub const RESET_TOKEN_LEN: usize = 43;

/// Encoded password hash. `Debug` never prints the digest.
#[derive(Clone, PartialEq, Eq)]
pub struct HashedPassword(String);

impl HashedPassword {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for HashedPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HashedPassword(..)")
    }
}

// ── Accounts, roles, permissions ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permission {
    pub id: PermissionId,
    pub name: String,
    pub description: String,
    pub resource: String,
    pub action: String,
}

impl Permission {
    pub fn key(&self) -> PermissionKey {
        PermissionKey::new(self.resource.clone(), self.action.clone())
    }

    pub fn full_name(&self) -> String {
        self.key().full_name()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub description: String,
    /// Granted permissions in insertion order.
    pub permissions: Vec<Permission>,
}

/// Direct account-to-permission assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectPermission {
    pub permission: Permission,
    pub mode: PermissionMode,
}

#[derive(Debug, Clone)]
pub struct Account {
    pub id: AccountId,
    /// Always normalized (trimmed, lower-cased).
    pub email: String,
    pub username: Option<String>,
    pub password_hash: HashedPassword,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub position: Option<String>,
    pub is_active: bool,
    /// Assigned roles in assignment order.
    pub roles: Vec<Role>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn has_role(&self, role_id: RoleId) -> bool {
        self.roles.iter().any(|r| r.id == role_id)
    }
}

/// Account fields supplied at creation; the store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub username: Option<String>,
    pub password_hash: HashedPassword,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub position: Option<String>,
    pub is_active: bool,
    pub role_ids: Vec<RoleId>,
}

#[derive(Debug, Clone)]
pub struct NewRole {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct NewPermission {
    pub name: String,
    pub description: String,
    pub resource: String,
    pub action: String,
}

/// Typed filter for account listing. `None` fields do not constrain.
#[derive(Debug, Clone, Default)]
pub struct AccountFilter {
    /// Case-insensitive substring of the email.
    pub email: Option<String>,
    pub active: Option<bool>,
    pub role_id: Option<RoleId>,
    pub page: PageRequest,
}

// ── Sessions ─────────────────────────────────────────────────────────────────

/// Persisted refresh-token session. Only the SHA-256 of the token is stored.
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub id: TokenId,
    pub account_id: AccountId,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub is_mobile: bool,
    /// Human-readable session label, e.g. a device name.
    pub device_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub account_id: AccountId,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub is_mobile: bool,
    pub device_name: Option<String>,
}

/// Caller-supplied request context for session operations.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub device_name: Option<String>,
    pub is_mobile: bool,
}

// ── Invitations ──────────────────────────────────────────────────────────────

/// Stored invitation state. Expiry is derived at read time and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationState {
    Pending,
    Used,
    Revoked,
}

impl InvitationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationState::Pending => "pending",
            InvitationState::Used => "used",
            InvitationState::Revoked => "revoked",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Invitation {
    pub id: InvitationId,
    /// SHA-256 of the opaque value; the value itself is never stored.
    pub token_hash: String,
    /// Always normalized.
    pub email: String,
    pub role_id: RoleId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub position: Option<String>,
    pub created_by: AccountId,
    pub expires_at: DateTime<Utc>,
    pub state: InvitationState,
    pub sent_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub retry_count: u32,
    pub used_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Invitation {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether the invitation can still be accepted, resent or revoked.
    ///
    /// `Used` wins over expiry so a consumed invitation always reads as used.
    pub fn ensure_usable_at(&self, now: DateTime<Utc>) -> Result<(), ErrorKind> {
        match self.state {
            InvitationState::Used => Err(ErrorKind::InvitationUsed),
            InvitationState::Revoked => Err(ErrorKind::InvitationExpired),
            InvitationState::Pending if self.is_expired_at(now) => {
                Err(ErrorKind::InvitationExpired)
            }
            InvitationState::Pending => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewInvitation {
    pub token_hash: String,
    pub email: String,
    pub role_id: RoleId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub position: Option<String>,
    pub created_by: AccountId,
    pub expires_at: DateTime<Utc>,
}

// ── Password reset ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PasswordResetToken {
    pub id: ResetTokenId,
    pub account_id: AccountId,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PasswordResetToken {
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.consumed_at.is_none() && now < self.expires_at
    }
}

#[derive(Debug, Clone)]
pub struct NewPasswordResetToken {
    pub account_id: AccountId,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

// ── Rate limiting ────────────────────────────────────────────────────────────

/// Fixed-window attempt counter for one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub identifier: String,
    pub window_start: DateTime<Utc>,
    pub attempts: u32,
    /// End of the current window; the earliest instant a blocked caller may retry.
    pub retry_at: DateTime<Utc>,
}

// ── Collaborator payloads ────────────────────────────────────────────────────

/// Result of handing a token to the notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    Failed(String),
}

/// What a delivered token is for. Carries only non-secret context.
#[derive(Debug, Clone)]
pub enum NotificationContext {
    Invitation {
        invitation_id: InvitationId,
        role_name: String,
        invited_by: AccountId,
        first_name: Option<String>,
        expires_at: DateTime<Utc>,
    },
    PasswordReset {
        account_id: AccountId,
        expires_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    Login,
    Refresh,
    Logout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub kind: AuditEventKind,
    pub account_id: Option<AccountId>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub outcome: AuditOutcome,
    /// Error code on failure.
    pub reason: Option<&'static str>,
    #[serde(serialize_with = "gatehouse_core::serde::to_rfc3339_ms")]
    pub at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn success(kind: AuditEventKind, account_id: AccountId, meta: &ClientMeta) -> Self {
        Self {
            kind,
            account_id: Some(account_id),
            ip: meta.ip.clone(),
            user_agent: meta.user_agent.clone(),
            outcome: AuditOutcome::Success,
            reason: None,
            at: Utc::now(),
        }
    }

    pub fn failure(
        kind: AuditEventKind,
        account_id: Option<AccountId>,
        meta: &ClientMeta,
        reason: &'static str,
    ) -> Self {
        Self {
            kind,
            account_id,
            ip: meta.ip.clone(),
            user_agent: meta.user_agent.clone(),
            outcome: AuditOutcome::Failure,
            reason: Some(reason),
            at: Utc::now(),
        }
    }
}
