#![allow(async_fn_in_trait)]

use chrono::{DateTime, Utc};

use gatehouse_domain::id::{AccountId, InvitationId, PermissionId, ResetTokenId, RoleId};
use gatehouse_domain::permission::PermissionMode;

use crate::domain::types::{
    Account, AccountFilter, AuditEvent, DeliveryOutcome, DirectPermission, HashedPassword,
    Invitation, InvitationState, NewAccount, NewInvitation, NewPasswordResetToken, NewPermission,
    NewRefreshToken, NewRole, NotificationContext, PasswordResetToken, Permission,
    RefreshTokenRecord, Role,
};
use crate::error::ErrorKind;

/// Durable account records and their role/permission relations.
pub trait AccountRepository: Send + Sync {
    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, ErrorKind>;

    /// `email` must already be normalized.
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, ErrorKind>;

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, ErrorKind>;

    /// Insert a new account with its initial roles.
    ///
    /// Fails with `EmailAlreadyExists` / `UsernameAlreadyExists` on conflict and
    /// `RoleNotFound` if a role id is unknown.
    async fn create(&self, account: &NewAccount) -> Result<Account, ErrorKind>;

    /// Replace the password hash if it still equals `expected`, touching no
    /// other column. Returns `false` when it changed since it was read.
    ///
    /// Fails with `AccountNotFound`, or `AccountInactive` when the account is
    /// deactivated at write time.
    async fn set_password_hash(
        &self,
        id: AccountId,
        expected: &HashedPassword,
        next: &HashedPassword,
    ) -> Result<bool, ErrorKind>;

    /// Set only the active flag.
    async fn set_active(&self, id: AccountId, active: bool) -> Result<Account, ErrorKind>;

    async fn list(&self, filter: &AccountFilter) -> Result<Vec<Account>, ErrorKind>;

    /// Returns `false` if the role was already assigned.
    async fn assign_role(&self, account_id: AccountId, role_id: RoleId)
    -> Result<bool, ErrorKind>;

    /// Returns `false` if the role was not assigned.
    async fn remove_role(&self, account_id: AccountId, role_id: RoleId)
    -> Result<bool, ErrorKind>;

    /// Upsert a direct grant or deny; replaces an existing entry of the other mode.
    async fn set_direct_permission(
        &self,
        account_id: AccountId,
        permission_id: PermissionId,
        mode: PermissionMode,
    ) -> Result<(), ErrorKind>;

    /// Returns `false` if there was no direct entry.
    async fn remove_direct_permission(
        &self,
        account_id: AccountId,
        permission_id: PermissionId,
    ) -> Result<bool, ErrorKind>;

    /// Roles with their permissions, in assignment order.
    async fn list_roles(&self, account_id: AccountId) -> Result<Vec<Role>, ErrorKind>;

    async fn list_direct_permissions(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<DirectPermission>, ErrorKind>;
}

/// Role and permission catalogue.
pub trait RoleRepository: Send + Sync {
    async fn find_role(&self, id: RoleId) -> Result<Option<Role>, ErrorKind>;

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, ErrorKind>;

    /// Fails with `RoleAlreadyExists` on a duplicate name.
    async fn create_role(&self, role: &NewRole) -> Result<Role, ErrorKind>;

    /// Fails with `PermissionAlreadyExists` on a duplicate `resource:action`.
    async fn create_permission(&self, permission: &NewPermission)
    -> Result<Permission, ErrorKind>;

    async fn find_permission(&self, id: PermissionId) -> Result<Option<Permission>, ErrorKind>;

    /// Delete a role and remove it from every account that holds it.
    /// Returns `false` if the role did not exist.
    async fn delete_role(&self, id: RoleId) -> Result<bool, ErrorKind>;

    /// Returns `false` if the role already granted the permission.
    async fn add_permission_to_role(
        &self,
        role_id: RoleId,
        permission_id: PermissionId,
    ) -> Result<bool, ErrorKind>;
}

/// Refresh-token sessions, keyed by the SHA-256 of the opaque value.
pub trait TokenRepository: Send + Sync {
    async fn create(&self, token: &NewRefreshToken) -> Result<RefreshTokenRecord, ErrorKind>;

    async fn find_by_hash(&self, hash: &str) -> Result<Option<RefreshTokenRecord>, ErrorKind>;

    /// Returns `true` if a record was deleted.
    async fn delete_by_hash(&self, hash: &str) -> Result<bool, ErrorKind>;

    async fn delete_all_for_account(&self, account_id: AccountId) -> Result<u64, ErrorKind>;

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, ErrorKind>;

    /// Delete `old_hash` and insert `new` as one atomic step.
    ///
    /// Returns `None` without inserting when `old_hash` no longer exists, so at
    /// most one of several concurrent rotations of the same value succeeds.
    async fn rotate(
        &self,
        old_hash: &str,
        new: &NewRefreshToken,
    ) -> Result<Option<RefreshTokenRecord>, ErrorKind>;
}

/// Invitations and their delivery bookkeeping, keyed by the SHA-256 of the
/// opaque token.
pub trait InvitationRepository: Send + Sync {
    async fn create(&self, invitation: &NewInvitation) -> Result<Invitation, ErrorKind>;

    async fn find_by_hash(&self, hash: &str) -> Result<Option<Invitation>, ErrorKind>;

    async fn find_by_id(&self, id: InvitationId) -> Result<Option<Invitation>, ErrorKind>;

    /// Compare-and-set the stored state. Returns `false` when the current state
    /// is not `expected`.
    async fn update_state(
        &self,
        id: InvitationId,
        expected: InvitationState,
        next: InvitationState,
        at: DateTime<Utc>,
    ) -> Result<bool, ErrorKind>;

    /// Replace the token hash as one atomic step, re-checking that the
    /// invitation is pending and unexpired at `now`. The old value stops
    /// matching immediately.
    async fn rotate_token(
        &self,
        id: InvitationId,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Invitation, ErrorKind>;

    /// Store a delivery attempt: sets `sent_at` on success, `last_error` on
    /// failure, and increments `retry_count` when `is_retry`.
    async fn record_delivery(
        &self,
        id: InvitationId,
        outcome: &DeliveryOutcome,
        is_retry: bool,
        at: DateTime<Utc>,
    ) -> Result<Invitation, ErrorKind>;

    /// Pending invitations not expired at `now`, newest first.
    async fn list_pending(&self, now: DateTime<Utc>) -> Result<Vec<Invitation>, ErrorKind>;

    /// Delete invitations expired at `now` that were never used.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, ErrorKind>;

    /// Redeem an invitation as one atomic step: re-check that it is pending and
    /// unexpired, create the account (uniqueness enforced), mark it used.
    async fn accept(
        &self,
        id: InvitationId,
        account: &NewAccount,
        now: DateTime<Utc>,
    ) -> Result<Account, ErrorKind>;
}

/// Single-use password reset tokens, keyed by SHA-256.
pub trait ResetTokenRepository: Send + Sync {
    async fn create(&self, token: &NewPasswordResetToken)
    -> Result<PasswordResetToken, ErrorKind>;

    async fn find_by_hash(&self, hash: &str) -> Result<Option<PasswordResetToken>, ErrorKind>;

    /// Redeem a token as one atomic step: consume it if still unconsumed,
    /// re-check that its account is active, store `password_hash`.
    ///
    /// Returns `false` if already consumed. Fails with `AccountNotFound` or
    /// `AccountInactive` and leaves the token unconsumed.
    async fn redeem(
        &self,
        id: ResetTokenId,
        password_hash: &HashedPassword,
        at: DateTime<Utc>,
    ) -> Result<bool, ErrorKind>;

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, ErrorKind>;
}

/// Password hashing. Implementations must compare in constant time.
pub trait CredentialVerifier: Send + Sync {
    fn hash(&self, password: &str) -> Result<HashedPassword, ErrorKind>;

    fn verify(&self, password: &str, hash: &HashedPassword) -> Result<bool, ErrorKind>;

    /// Burn one verification's worth of work when there is no account to
    /// check against, so lookups of unknown emails take as long as real ones.
    fn verify_dummy(&self, password: &str);
}

/// Outbound delivery of invitation and reset tokens (email, SMS, ...).
pub trait Notifier: Send + Sync {
    async fn deliver(
        &self,
        recipient: &str,
        token: &str,
        context: &NotificationContext,
    ) -> DeliveryOutcome;
}

/// Session audit trail. Failures are logged by the caller and never block.
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &AuditEvent) -> anyhow::Result<()>;
}
