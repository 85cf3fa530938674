use std::collections::BTreeSet;

use gatehouse_domain::id::AccountId;
use gatehouse_domain::permission::{PermissionKey, PermissionMode};

use crate::domain::repository::AccountRepository;
use crate::domain::types::{DirectPermission, Role};
use crate::error::{ErrorKind, IdentityError, WithOp};

/// Effective permissions from already-loaded roles and direct entries.
///
/// `(role permissions ∪ direct grants) − direct denies`, as sorted
/// `resource:action` names. Input order does not affect the result.
pub fn resolve(roles: &[Role], direct: &[DirectPermission]) -> BTreeSet<String> {
    let mut granted: BTreeSet<PermissionKey> = roles
        .iter()
        .flat_map(|role| role.permissions.iter().map(|p| p.key()))
        .collect();
    let mut denied = BTreeSet::new();

    for entry in direct {
        match entry.mode {
            PermissionMode::Grant => granted.insert(entry.permission.key()),
            PermissionMode::Deny => denied.insert(entry.permission.key()),
        };
    }

    granted
        .difference(&denied)
        .map(PermissionKey::full_name)
        .collect()
}

/// Resolves an account's effective permissions from the store.
pub struct PermissionResolver<A>
where
    A: AccountRepository,
{
    pub accounts: A,
}

impl<A> PermissionResolver<A>
where
    A: AccountRepository,
{
    pub async fn execute(&self, account_id: AccountId) -> Result<BTreeSet<String>, IdentityError> {
        effective_permissions(&self.accounts, account_id)
            .await
            .op("effective_permissions")
    }
}

/// Store-backed resolution shared by the token and invitation use cases.
pub(crate) async fn effective_permissions<A: AccountRepository>(
    accounts: &A,
    account_id: AccountId,
) -> Result<BTreeSet<String>, ErrorKind> {
    let roles = accounts.list_roles(account_id).await?;
    let direct = accounts.list_direct_permissions(account_id).await?;
    Ok(resolve(&roles, &direct))
}
