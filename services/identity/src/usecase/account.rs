use gatehouse_domain::account::{is_valid_email, normalize_email, validate_username};
use gatehouse_domain::id::{AccountId, PermissionId, RoleId};
use gatehouse_domain::permission::PermissionMode;

use crate::domain::policy::PasswordPolicy;
use crate::domain::repository::{
    AccountRepository, CredentialVerifier, RoleRepository, TokenRepository,
};
use crate::domain::types::{Account, AccountFilter, NewAccount};
use crate::error::{ErrorKind, IdentityError, WithOp};
use crate::usecase::token::revoke_sessions;

/// Trim an optional text field; blank becomes `None`.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

pub(crate) fn ensure_active(account: &Account) -> Result<(), ErrorKind> {
    if account.is_active {
        Ok(())
    } else {
        Err(ErrorKind::AccountInactive)
    }
}

pub(crate) async fn load_active_account<A: AccountRepository>(
    accounts: &A,
    id: AccountId,
) -> Result<Account, ErrorKind> {
    let account = accounts
        .find_by_id(id)
        .await?
        .ok_or(ErrorKind::AccountNotFound)?;
    ensure_active(&account)?;
    Ok(account)
}

// ── RegisterAccount ──────────────────────────────────────────────────────────

pub struct RegisterAccountInput {
    pub email: String,
    pub username: Option<String>,
    pub password: String,
    pub password_confirmation: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub position: Option<String>,
    pub role_ids: Vec<RoleId>,
}

pub struct RegisterAccountUseCase<A, R, V>
where
    A: AccountRepository,
    R: RoleRepository,
    V: CredentialVerifier,
{
    pub accounts: A,
    pub roles: R,
    pub verifier: V,
    pub policy: PasswordPolicy,
}

impl<A, R, V> RegisterAccountUseCase<A, R, V>
where
    A: AccountRepository,
    R: RoleRepository,
    V: CredentialVerifier,
{
    /// Create an active account. Whether the caller may hand out `role_ids`
    /// is decided before this call.
    pub async fn execute(&self, input: RegisterAccountInput) -> Result<Account, IdentityError> {
        self.run(input).await.op("register_account")
    }

    async fn run(&self, input: RegisterAccountInput) -> Result<Account, ErrorKind> {
        let email = normalize_email(&input.email);
        if !is_valid_email(&email) {
            return Err(ErrorKind::InvalidEmail);
        }
        let username = non_blank(input.username);
        if let Some(username) = &username {
            if !validate_username(username) {
                return Err(ErrorKind::InvalidUsername);
            }
            if self.accounts.find_by_username(username).await?.is_some() {
                return Err(ErrorKind::UsernameAlreadyExists);
            }
        }
        self.policy.check(&input.password)?;
        if input.password != input.password_confirmation {
            return Err(ErrorKind::PasswordMismatch);
        }
        if self.accounts.find_by_email(&email).await?.is_some() {
            return Err(ErrorKind::EmailAlreadyExists);
        }
        for role_id in &input.role_ids {
            if self.roles.find_role(*role_id).await?.is_none() {
                return Err(ErrorKind::RoleNotFound);
            }
        }

        let password_hash = self.verifier.hash(&input.password)?;
        // The store re-checks uniqueness; the lookups above only give early answers.
        let account = self
            .accounts
            .create(&NewAccount {
                email,
                username,
                password_hash,
                first_name: non_blank(input.first_name),
                last_name: non_blank(input.last_name),
                position: non_blank(input.position),
                is_active: true,
                role_ids: input.role_ids,
            })
            .await?;

        tracing::info!(account_id = %account.id, "account registered");
        Ok(account)
    }
}

// ── SetAccountActive ─────────────────────────────────────────────────────────

pub struct SetAccountActiveUseCase<A, T>
where
    A: AccountRepository,
    T: TokenRepository,
{
    pub accounts: A,
    pub tokens: T,
}

impl<A, T> SetAccountActiveUseCase<A, T>
where
    A: AccountRepository,
    T: TokenRepository,
{
    /// Deactivating also ends every refresh session of the account.
    pub async fn execute(&self, account_id: AccountId, active: bool) -> Result<Account, IdentityError> {
        self.run(account_id, active).await.op("set_account_active")
    }

    async fn run(&self, account_id: AccountId, active: bool) -> Result<Account, ErrorKind> {
        let account = self.accounts.set_active(account_id, active).await?;

        if !active {
            revoke_sessions(&self.tokens, account.id).await?;
        }
        tracing::info!(account_id = %account.id, active, "account activity changed");
        Ok(account)
    }
}

// ── Role assignment ──────────────────────────────────────────────────────────

pub struct RoleAssignmentUseCase<A>
where
    A: AccountRepository,
{
    pub accounts: A,
}

impl<A> RoleAssignmentUseCase<A>
where
    A: AccountRepository,
{
    /// Returns `false` if the account already had the role.
    pub async fn assign(&self, account_id: AccountId, role_id: RoleId) -> Result<bool, IdentityError> {
        self.accounts
            .assign_role(account_id, role_id)
            .await
            .op("assign_role")
    }

    /// Returns `false` if the account did not have the role.
    pub async fn remove(&self, account_id: AccountId, role_id: RoleId) -> Result<bool, IdentityError> {
        self.accounts
            .remove_role(account_id, role_id)
            .await
            .op("remove_role")
    }
}

// ── Direct permissions ───────────────────────────────────────────────────────

pub struct DirectPermissionUseCase<A>
where
    A: AccountRepository,
{
    pub accounts: A,
}

impl<A> DirectPermissionUseCase<A>
where
    A: AccountRepository,
{
    /// Grant directly, replacing a deny for the same permission.
    pub async fn grant(
        &self,
        account_id: AccountId,
        permission_id: PermissionId,
    ) -> Result<(), IdentityError> {
        self.accounts
            .set_direct_permission(account_id, permission_id, PermissionMode::Grant)
            .await
            .op("grant_permission")
    }

    /// Deny directly, replacing a grant for the same permission.
    pub async fn deny(
        &self,
        account_id: AccountId,
        permission_id: PermissionId,
    ) -> Result<(), IdentityError> {
        self.accounts
            .set_direct_permission(account_id, permission_id, PermissionMode::Deny)
            .await
            .op("deny_permission")
    }

    pub async fn remove(
        &self,
        account_id: AccountId,
        permission_id: PermissionId,
    ) -> Result<bool, IdentityError> {
        self.accounts
            .remove_direct_permission(account_id, permission_id)
            .await
            .op("remove_permission")
    }
}

// ── ListAccounts ─────────────────────────────────────────────────────────────

pub struct ListAccountsUseCase<A>
where
    A: AccountRepository,
{
    pub accounts: A,
}

impl<A> ListAccountsUseCase<A>
where
    A: AccountRepository,
{
    pub async fn execute(&self, filter: AccountFilter) -> Result<Vec<Account>, IdentityError> {
        let filter = AccountFilter {
            page: filter.page.clamped(),
            ..filter
        };
        self.accounts.list(&filter).await.op("list_accounts")
    }
}
