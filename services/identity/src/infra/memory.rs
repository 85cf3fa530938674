use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::anyhow;
use chrono::{DateTime, Utc};

use gatehouse_domain::account::normalize_email;
use gatehouse_domain::id::{
    AccountId, InvitationId, PermissionId, ResetTokenId, RoleId, TokenId,
};
use gatehouse_domain::permission::PermissionMode;

use crate::domain::repository::{
    AccountRepository, InvitationRepository, ResetTokenRepository, RoleRepository,
    TokenRepository,
};
use crate::domain::types::{
    Account, AccountFilter, DeliveryOutcome, DirectPermission, HashedPassword, Invitation,
    InvitationState, NewAccount, NewInvitation, NewPasswordResetToken, NewPermission,
    NewRefreshToken, NewRole, PasswordResetToken, Permission, RefreshTokenRecord, Role,
};
use crate::error::ErrorKind;

/// In-process store implementing every repository trait over one shared state.
///
/// Cloning is cheap and every clone sees the same data. Each trait method runs
/// under a single mutex acquisition, which makes `rotate`, `accept`,
/// `update_state`, `set_password_hash` and `redeem` atomic.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    seq: i64,
    accounts: BTreeMap<AccountId, AccountRow>,
    roles: BTreeMap<RoleId, RoleRow>,
    permissions: BTreeMap<PermissionId, Permission>,
    direct: BTreeMap<(AccountId, PermissionId), PermissionMode>,
    refresh_tokens: HashMap<String, RefreshTokenRecord>,
    invitations: BTreeMap<InvitationId, Invitation>,
    reset_tokens: BTreeMap<ResetTokenId, PasswordResetToken>,
}

struct AccountRow {
    id: AccountId,
    email: String,
    username: Option<String>,
    password_hash: HashedPassword,
    first_name: Option<String>,
    last_name: Option<String>,
    position: Option<String>,
    is_active: bool,
    role_ids: Vec<RoleId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

struct RoleRow {
    id: RoleId,
    name: String,
    description: String,
    permission_ids: Vec<PermissionId>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, ErrorKind> {
        self.state
            .lock()
            .map_err(|_| ErrorKind::Internal(anyhow!("memory store lock poisoned")))
    }
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.seq += 1;
        self.seq
    }

    fn role(&self, row: &RoleRow) -> Role {
        Role {
            id: row.id,
            name: row.name.clone(),
            description: row.description.clone(),
            permissions: row
                .permission_ids
                .iter()
                .filter_map(|id| self.permissions.get(id).cloned())
                .collect(),
        }
    }

    fn account(&self, row: &AccountRow) -> Account {
        Account {
            id: row.id,
            email: row.email.clone(),
            username: row.username.clone(),
            password_hash: row.password_hash.clone(),
            first_name: row.first_name.clone(),
            last_name: row.last_name.clone(),
            position: row.position.clone(),
            is_active: row.is_active,
            roles: row
                .role_ids
                .iter()
                .filter_map(|id| self.roles.get(id).map(|r| self.role(r)))
                .collect(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    fn email_taken(&self, email: &str) -> bool {
        self.accounts.values().any(|a| a.email == email)
    }

    fn username_taken(&self, username: &str) -> bool {
        self.accounts.values().any(|a| {
            a.username
                .as_deref()
                .is_some_and(|u| u.eq_ignore_ascii_case(username))
        })
    }

    fn insert_account(
        &mut self,
        new: &NewAccount,
        now: DateTime<Utc>,
    ) -> Result<Account, ErrorKind> {
        let email = normalize_email(&new.email);
        if self.email_taken(&email) {
            return Err(ErrorKind::EmailAlreadyExists);
        }
        if new
            .username
            .as_deref()
            .is_some_and(|u| self.username_taken(u))
        {
            return Err(ErrorKind::UsernameAlreadyExists);
        }
        if new.role_ids.iter().any(|id| !self.roles.contains_key(id)) {
            return Err(ErrorKind::RoleNotFound);
        }

        let mut role_ids: Vec<RoleId> = Vec::with_capacity(new.role_ids.len());
        for id in &new.role_ids {
            if !role_ids.contains(id) {
                role_ids.push(*id);
            }
        }

        let id = AccountId(self.next_id());
        let row = AccountRow {
            id,
            email,
            username: new.username.clone(),
            password_hash: new.password_hash.clone(),
            first_name: new.first_name.clone(),
            last_name: new.last_name.clone(),
            position: new.position.clone(),
            is_active: new.is_active,
            role_ids,
            created_at: now,
            updated_at: now,
        };
        let account = self.account(&row);
        self.accounts.insert(id, row);
        Ok(account)
    }
}

impl AccountRepository for MemoryStore {
    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, ErrorKind> {
        let state = self.lock()?;
        Ok(state.accounts.get(&id).map(|row| state.account(row)))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, ErrorKind> {
        let state = self.lock()?;
        Ok(state
            .accounts
            .values()
            .find(|row| row.email == email)
            .map(|row| state.account(row)))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, ErrorKind> {
        let state = self.lock()?;
        Ok(state
            .accounts
            .values()
            .find(|row| {
                row.username
                    .as_deref()
                    .is_some_and(|u| u.eq_ignore_ascii_case(username))
            })
            .map(|row| state.account(row)))
    }

    async fn create(&self, account: &NewAccount) -> Result<Account, ErrorKind> {
        self.lock()?.insert_account(account, Utc::now())
    }

    async fn set_password_hash(
        &self,
        id: AccountId,
        expected: &HashedPassword,
        next: &HashedPassword,
    ) -> Result<bool, ErrorKind> {
        let mut state = self.lock()?;
        let row = state.accounts.get_mut(&id).ok_or(ErrorKind::AccountNotFound)?;
        if !row.is_active {
            return Err(ErrorKind::AccountInactive);
        }
        if row.password_hash != *expected {
            return Ok(false);
        }
        row.password_hash = next.clone();
        row.updated_at = Utc::now();
        Ok(true)
    }

    async fn set_active(&self, id: AccountId, active: bool) -> Result<Account, ErrorKind> {
        let mut state = self.lock()?;
        let row = state.accounts.get_mut(&id).ok_or(ErrorKind::AccountNotFound)?;
        row.is_active = active;
        row.updated_at = Utc::now();

        let row = &state.accounts[&id];
        Ok(state.account(row))
    }

    async fn list(&self, filter: &AccountFilter) -> Result<Vec<Account>, ErrorKind> {
        let state = self.lock()?;
        let needle = filter.email.as_deref().map(normalize_email);
        Ok(state
            .accounts
            .values()
            .filter(|row| needle.as_deref().is_none_or(|n| row.email.contains(n)))
            .filter(|row| filter.active.is_none_or(|active| row.is_active == active))
            .filter(|row| {
                filter
                    .role_id
                    .is_none_or(|role_id| row.role_ids.contains(&role_id))
            })
            .skip(filter.page.offset())
            .take(filter.page.limit())
            .map(|row| state.account(row))
            .collect())
    }

    async fn assign_role(
        &self,
        account_id: AccountId,
        role_id: RoleId,
    ) -> Result<bool, ErrorKind> {
        let mut state = self.lock()?;
        if !state.roles.contains_key(&role_id) {
            return Err(ErrorKind::RoleNotFound);
        }
        let row = state
            .accounts
            .get_mut(&account_id)
            .ok_or(ErrorKind::AccountNotFound)?;
        if row.role_ids.contains(&role_id) {
            return Ok(false);
        }
        row.role_ids.push(role_id);
        row.updated_at = Utc::now();
        Ok(true)
    }

    async fn remove_role(
        &self,
        account_id: AccountId,
        role_id: RoleId,
    ) -> Result<bool, ErrorKind> {
        let mut state = self.lock()?;
        let row = state
            .accounts
            .get_mut(&account_id)
            .ok_or(ErrorKind::AccountNotFound)?;
        let before = row.role_ids.len();
        row.role_ids.retain(|id| *id != role_id);
        let removed = row.role_ids.len() != before;
        if removed {
            row.updated_at = Utc::now();
        }
        Ok(removed)
    }

    async fn set_direct_permission(
        &self,
        account_id: AccountId,
        permission_id: PermissionId,
        mode: PermissionMode,
    ) -> Result<(), ErrorKind> {
        let mut state = self.lock()?;
        if !state.accounts.contains_key(&account_id) {
            return Err(ErrorKind::AccountNotFound);
        }
        if !state.permissions.contains_key(&permission_id) {
            return Err(ErrorKind::PermissionNotFound);
        }
        state.direct.insert((account_id, permission_id), mode);
        Ok(())
    }

    async fn remove_direct_permission(
        &self,
        account_id: AccountId,
        permission_id: PermissionId,
    ) -> Result<bool, ErrorKind> {
        let mut state = self.lock()?;
        if !state.accounts.contains_key(&account_id) {
            return Err(ErrorKind::AccountNotFound);
        }
        Ok(state.direct.remove(&(account_id, permission_id)).is_some())
    }

    async fn list_roles(&self, account_id: AccountId) -> Result<Vec<Role>, ErrorKind> {
        let state = self.lock()?;
        let row = state
            .accounts
            .get(&account_id)
            .ok_or(ErrorKind::AccountNotFound)?;
        Ok(state.account(row).roles)
    }

    async fn list_direct_permissions(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<DirectPermission>, ErrorKind> {
        let state = self.lock()?;
        if !state.accounts.contains_key(&account_id) {
            return Err(ErrorKind::AccountNotFound);
        }
        Ok(state
            .direct
            .range((account_id, PermissionId(i64::MIN))..=(account_id, PermissionId(i64::MAX)))
            .filter_map(|((_, permission_id), mode)| {
                state
                    .permissions
                    .get(permission_id)
                    .map(|permission| DirectPermission {
                        permission: permission.clone(),
                        mode: *mode,
                    })
            })
            .collect())
    }
}

impl RoleRepository for MemoryStore {
    async fn find_role(&self, id: RoleId) -> Result<Option<Role>, ErrorKind> {
        let state = self.lock()?;
        Ok(state.roles.get(&id).map(|row| state.role(row)))
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, ErrorKind> {
        let state = self.lock()?;
        Ok(state
            .roles
            .values()
            .find(|row| row.name == name)
            .map(|row| state.role(row)))
    }

    async fn create_role(&self, role: &NewRole) -> Result<Role, ErrorKind> {
        let mut state = self.lock()?;
        if state.roles.values().any(|r| r.name == role.name) {
            return Err(ErrorKind::RoleAlreadyExists);
        }
        let id = RoleId(state.next_id());
        let row = RoleRow {
            id,
            name: role.name.clone(),
            description: role.description.clone(),
            permission_ids: Vec::new(),
        };
        let created = state.role(&row);
        state.roles.insert(id, row);
        Ok(created)
    }

    async fn create_permission(
        &self,
        permission: &NewPermission,
    ) -> Result<Permission, ErrorKind> {
        let mut state = self.lock()?;
        if state.permissions.values().any(|p| {
            (p.resource == permission.resource && p.action == permission.action)
                || p.name == permission.name
        }) {
            return Err(ErrorKind::PermissionAlreadyExists);
        }
        let created = Permission {
            id: PermissionId(state.next_id()),
            name: permission.name.clone(),
            description: permission.description.clone(),
            resource: permission.resource.clone(),
            action: permission.action.clone(),
        };
        state.permissions.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_permission(&self, id: PermissionId) -> Result<Option<Permission>, ErrorKind> {
        Ok(self.lock()?.permissions.get(&id).cloned())
    }

    async fn delete_role(&self, id: RoleId) -> Result<bool, ErrorKind> {
        let mut state = self.lock()?;
        if state.roles.remove(&id).is_none() {
            return Ok(false);
        }
        for row in state.accounts.values_mut() {
            row.role_ids.retain(|r| *r != id);
        }
        state
            .invitations
            .retain(|_, inv| inv.role_id != id || inv.state == InvitationState::Used);
        Ok(true)
    }

    async fn add_permission_to_role(
        &self,
        role_id: RoleId,
        permission_id: PermissionId,
    ) -> Result<bool, ErrorKind> {
        let mut state = self.lock()?;
        if !state.permissions.contains_key(&permission_id) {
            return Err(ErrorKind::PermissionNotFound);
        }
        let row = state.roles.get_mut(&role_id).ok_or(ErrorKind::RoleNotFound)?;
        if row.permission_ids.contains(&permission_id) {
            return Ok(false);
        }
        row.permission_ids.push(permission_id);
        Ok(true)
    }
}

fn refresh_record(id: TokenId, new: &NewRefreshToken, now: DateTime<Utc>) -> RefreshTokenRecord {
    RefreshTokenRecord {
        id,
        account_id: new.account_id,
        token_hash: new.token_hash.clone(),
        expires_at: new.expires_at,
        is_mobile: new.is_mobile,
        device_name: new.device_name.clone(),
        created_at: now,
    }
}

impl TokenRepository for MemoryStore {
    async fn create(&self, token: &NewRefreshToken) -> Result<RefreshTokenRecord, ErrorKind> {
        let mut state = self.lock()?;
        let record = refresh_record(TokenId(state.next_id()), token, Utc::now());
        state
            .refresh_tokens
            .insert(record.token_hash.clone(), record.clone());
        Ok(record)
    }

    async fn find_by_hash(&self, hash: &str) -> Result<Option<RefreshTokenRecord>, ErrorKind> {
        Ok(self.lock()?.refresh_tokens.get(hash).cloned())
    }

    async fn delete_by_hash(&self, hash: &str) -> Result<bool, ErrorKind> {
        Ok(self.lock()?.refresh_tokens.remove(hash).is_some())
    }

    async fn delete_all_for_account(&self, account_id: AccountId) -> Result<u64, ErrorKind> {
        let mut state = self.lock()?;
        let before = state.refresh_tokens.len();
        state
            .refresh_tokens
            .retain(|_, r| r.account_id != account_id);
        Ok((before - state.refresh_tokens.len()) as u64)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, ErrorKind> {
        let mut state = self.lock()?;
        let before = state.refresh_tokens.len();
        state.refresh_tokens.retain(|_, r| !r.is_expired_at(now));
        Ok((before - state.refresh_tokens.len()) as u64)
    }

    async fn rotate(
        &self,
        old_hash: &str,
        new: &NewRefreshToken,
    ) -> Result<Option<RefreshTokenRecord>, ErrorKind> {
        let mut state = self.lock()?;
        if state.refresh_tokens.remove(old_hash).is_none() {
            return Ok(None);
        }
        let record = refresh_record(TokenId(state.next_id()), new, Utc::now());
        state
            .refresh_tokens
            .insert(record.token_hash.clone(), record.clone());
        Ok(Some(record))
    }
}

impl InvitationRepository for MemoryStore {
    async fn create(&self, invitation: &NewInvitation) -> Result<Invitation, ErrorKind> {
        let mut state = self.lock()?;
        let now = Utc::now();
        let created = Invitation {
            id: InvitationId(state.next_id()),
            token_hash: invitation.token_hash.clone(),
            email: normalize_email(&invitation.email),
            role_id: invitation.role_id,
            first_name: invitation.first_name.clone(),
            last_name: invitation.last_name.clone(),
            position: invitation.position.clone(),
            created_by: invitation.created_by,
            expires_at: invitation.expires_at,
            state: InvitationState::Pending,
            sent_at: None,
            last_error: None,
            retry_count: 0,
            used_at: None,
            revoked_at: None,
            created_at: now,
        };
        state.invitations.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_hash(&self, hash: &str) -> Result<Option<Invitation>, ErrorKind> {
        Ok(self
            .lock()?
            .invitations
            .values()
            .find(|inv| inv.token_hash == hash)
            .cloned())
    }

    async fn find_by_id(&self, id: InvitationId) -> Result<Option<Invitation>, ErrorKind> {
        Ok(self.lock()?.invitations.get(&id).cloned())
    }

    async fn update_state(
        &self,
        id: InvitationId,
        expected: InvitationState,
        next: InvitationState,
        at: DateTime<Utc>,
    ) -> Result<bool, ErrorKind> {
        let mut state = self.lock()?;
        let inv = state
            .invitations
            .get_mut(&id)
            .ok_or(ErrorKind::InvitationNotFound)?;
        if inv.state != expected {
            return Ok(false);
        }
        inv.state = next;
        match next {
            InvitationState::Used => inv.used_at = Some(at),
            InvitationState::Revoked => inv.revoked_at = Some(at),
            InvitationState::Pending => {}
        }
        Ok(true)
    }

    async fn rotate_token(
        &self,
        id: InvitationId,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Invitation, ErrorKind> {
        let mut state = self.lock()?;
        let inv = state
            .invitations
            .get_mut(&id)
            .ok_or(ErrorKind::InvitationNotFound)?;
        inv.ensure_usable_at(now)?;
        inv.token_hash = token_hash.to_owned();
        Ok(inv.clone())
    }

    async fn record_delivery(
        &self,
        id: InvitationId,
        outcome: &DeliveryOutcome,
        is_retry: bool,
        at: DateTime<Utc>,
    ) -> Result<Invitation, ErrorKind> {
        let mut state = self.lock()?;
        let inv = state
            .invitations
            .get_mut(&id)
            .ok_or(ErrorKind::InvitationNotFound)?;
        match outcome {
            DeliveryOutcome::Sent => {
                inv.sent_at = Some(at);
                inv.last_error = None;
            }
            DeliveryOutcome::Failed(reason) => inv.last_error = Some(reason.clone()),
        }
        if is_retry {
            inv.retry_count = inv.retry_count.saturating_add(1);
        }
        Ok(inv.clone())
    }

    async fn list_pending(&self, now: DateTime<Utc>) -> Result<Vec<Invitation>, ErrorKind> {
        let state = self.lock()?;
        let mut pending: Vec<Invitation> = state
            .invitations
            .values()
            .filter(|inv| inv.state == InvitationState::Pending && !inv.is_expired_at(now))
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(pending)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, ErrorKind> {
        let mut state = self.lock()?;
        let before = state.invitations.len();
        state
            .invitations
            .retain(|_, inv| inv.state == InvitationState::Used || !inv.is_expired_at(now));
        Ok((before - state.invitations.len()) as u64)
    }

    async fn accept(
        &self,
        id: InvitationId,
        account: &NewAccount,
        now: DateTime<Utc>,
    ) -> Result<Account, ErrorKind> {
        let mut state = self.lock()?;
        state
            .invitations
            .get(&id)
            .ok_or(ErrorKind::InvitationNotFound)?
            .ensure_usable_at(now)?;

        let created = state.insert_account(account, now)?;

        if let Some(inv) = state.invitations.get_mut(&id) {
            inv.state = InvitationState::Used;
            inv.used_at = Some(now);
        }
        Ok(created)
    }
}

impl ResetTokenRepository for MemoryStore {
    async fn create(
        &self,
        token: &NewPasswordResetToken,
    ) -> Result<PasswordResetToken, ErrorKind> {
        let mut state = self.lock()?;
        let created = PasswordResetToken {
            id: ResetTokenId(state.next_id()),
            account_id: token.account_id,
            token_hash: token.token_hash.clone(),
            expires_at: token.expires_at,
            consumed_at: None,
            created_at: Utc::now(),
        };
        state.reset_tokens.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_hash(&self, hash: &str) -> Result<Option<PasswordResetToken>, ErrorKind> {
        Ok(self
            .lock()?
            .reset_tokens
            .values()
            .find(|t| t.token_hash == hash)
            .cloned())
    }

    async fn redeem(
        &self,
        id: ResetTokenId,
        password_hash: &HashedPassword,
        at: DateTime<Utc>,
    ) -> Result<bool, ErrorKind> {
        let mut state = self.lock()?;
        let State {
            accounts,
            reset_tokens,
            ..
        } = &mut *state;
        let token = match reset_tokens.get_mut(&id) {
            Some(token) if token.consumed_at.is_none() => token,
            _ => return Ok(false),
        };
        let row = accounts
            .get_mut(&token.account_id)
            .ok_or(ErrorKind::AccountNotFound)?;
        if !row.is_active {
            return Err(ErrorKind::AccountInactive);
        }
        token.consumed_at = Some(at);
        row.password_hash = password_hash.clone();
        row.updated_at = at;
        Ok(true)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, ErrorKind> {
        let mut state = self.lock()?;
        let before = state.reset_tokens.len();
        state.reset_tokens.retain(|_, t| now < t.expires_at);
        Ok((before - state.reset_tokens.len()) as u64)
    }
}
