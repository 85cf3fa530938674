use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use gatehouse_domain::account::{is_valid_email, normalize_email, validate_username};
use gatehouse_domain::id::{AccountId, InvitationId, RoleId};

use crate::domain::policy::PasswordPolicy;
use crate::domain::repository::{
    AccountRepository, CredentialVerifier, InvitationRepository, Notifier, RoleRepository,
};
use crate::domain::types::{
    Account, DeliveryOutcome, INVITATION_TOKEN_LEN, Invitation, InvitationState, NewAccount,
    NewInvitation, NotificationContext,
};
use crate::error::{ErrorKind, IdentityError, WithOp};
use crate::usecase::account::{load_active_account, non_blank};
use crate::usecase::permission::effective_permissions;
use crate::usecase::secret::{generate_token, hash_token, is_well_formed};

/// An invitation together with the opaque value just delivered for it. The
/// value is only available here; stores keep its hash.
#[derive(Debug, Clone)]
pub struct IssuedInvitation {
    pub invitation: Invitation,
    pub token: String,
}

async fn load_usable<I: InvitationRepository>(
    invitations: &I,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Invitation, ErrorKind> {
    if !is_well_formed(token, INVITATION_TOKEN_LEN) {
        return Err(ErrorKind::InvitationNotFound);
    }
    let invitation = invitations
        .find_by_hash(&hash_token(token))
        .await?
        .ok_or(ErrorKind::InvitationNotFound)?;
    invitation.ensure_usable_at(now)?;
    Ok(invitation)
}

async fn load_usable_by_id<I: InvitationRepository>(
    invitations: &I,
    id: InvitationId,
    now: DateTime<Utc>,
) -> Result<Invitation, ErrorKind> {
    let invitation = invitations
        .find_by_id(id)
        .await?
        .ok_or(ErrorKind::InvitationNotFound)?;
    invitation.ensure_usable_at(now)?;
    Ok(invitation)
}

async fn deliver<N: Notifier>(
    notifier: &N,
    invitation: &Invitation,
    token: &str,
    role_name: &str,
) -> DeliveryOutcome {
    let context = NotificationContext::Invitation {
        invitation_id: invitation.id,
        role_name: role_name.to_owned(),
        invited_by: invitation.created_by,
        first_name: invitation.first_name.clone(),
        expires_at: invitation.expires_at,
    };
    let outcome = notifier
        .deliver(&invitation.email, token, &context)
        .await;
    if let DeliveryOutcome::Failed(reason) = &outcome {
        tracing::warn!(
            invitation_id = %invitation.id,
            reason = %reason,
            "invitation delivery failed"
        );
    }
    outcome
}

// ── CreateInvitation ─────────────────────────────────────────────────────────

pub struct CreateInvitationInput {
    pub email: String,
    pub role_id: RoleId,
    pub creator_id: AccountId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub position: Option<String>,
}

pub struct CreateInvitationUseCase<A, R, I, N>
where
    A: AccountRepository,
    R: RoleRepository,
    I: InvitationRepository,
    N: Notifier,
{
    pub accounts: A,
    pub roles: R,
    pub invitations: I,
    pub notifier: N,
    pub ttl: Duration,
}

impl<A, R, I, N> CreateInvitationUseCase<A, R, I, N>
where
    A: AccountRepository,
    R: RoleRepository,
    I: InvitationRepository,
    N: Notifier,
{
    /// Issue and deliver an invitation. A failed delivery is recorded on the
    /// invitation but does not fail the call.
    pub async fn execute(
        &self,
        input: CreateInvitationInput,
    ) -> Result<IssuedInvitation, IdentityError> {
        self.run(input).await.op("create_invitation")
    }

    async fn run(&self, input: CreateInvitationInput) -> Result<IssuedInvitation, ErrorKind> {
        let email = normalize_email(&input.email);
        if !is_valid_email(&email) {
            return Err(ErrorKind::InvalidEmail);
        }

        // 1. Creator must exist and be active
        let creator = load_active_account(&self.accounts, input.creator_id).await?;

        // 2. Creator may only hand out permissions it already holds
        let role = self
            .roles
            .find_role(input.role_id)
            .await?
            .ok_or(ErrorKind::RoleNotFound)?;
        let held = effective_permissions(&self.accounts, creator.id).await?;
        let granted: BTreeSet<String> = role.permissions.iter().map(|p| p.full_name()).collect();
        if !granted.is_subset(&held) {
            return Err(ErrorKind::RoleNotAssignable);
        }

        // 3. Invitee must not have an account yet
        if self.accounts.find_by_email(&email).await?.is_some() {
            return Err(ErrorKind::EmailAlreadyExists);
        }

        // 4. Persist as pending, then deliver
        let now = Utc::now();
        let token = generate_token(INVITATION_TOKEN_LEN);
        let invitation = self
            .invitations
            .create(&NewInvitation {
                token_hash: hash_token(&token),
                email,
                role_id: role.id,
                first_name: non_blank(input.first_name),
                last_name: non_blank(input.last_name),
                position: non_blank(input.position),
                created_by: creator.id,
                expires_at: now + self.ttl,
            })
            .await?;

        let outcome = deliver(&self.notifier, &invitation, &token, &role.name).await;
        let invitation = self
            .invitations
            .record_delivery(invitation.id, &outcome, false, Utc::now())
            .await?;

        tracing::info!(
            invitation_id = %invitation.id,
            role_id = %role.id,
            created_by = %creator.id,
            "invitation created"
        );
        Ok(IssuedInvitation { invitation, token })
    }
}

// ── ValidateInvitation ───────────────────────────────────────────────────────

/// Non-secret view of a usable invitation for the registration form.
#[derive(Debug, Clone, Serialize)]
pub struct InvitationSummary {
    pub invitation_id: InvitationId,
    pub email: String,
    pub role_id: RoleId,
    pub role_name: String,
    #[serde(serialize_with = "gatehouse_core::serde::to_rfc3339_ms")]
    pub expires_at: DateTime<Utc>,
    pub invited_by: AccountId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub position: Option<String>,
}

pub struct ValidateInvitationUseCase<I, R>
where
    I: InvitationRepository,
    R: RoleRepository,
{
    pub invitations: I,
    pub roles: R,
}

impl<I, R> ValidateInvitationUseCase<I, R>
where
    I: InvitationRepository,
    R: RoleRepository,
{
    pub async fn execute(&self, token: &str) -> Result<InvitationSummary, IdentityError> {
        self.run(token).await.op("validate_invitation")
    }

    async fn run(&self, token: &str) -> Result<InvitationSummary, ErrorKind> {
        let invitation = load_usable(&self.invitations, token, Utc::now()).await?;
        let role = self
            .roles
            .find_role(invitation.role_id)
            .await?
            .ok_or(ErrorKind::RoleNotFound)?;

        Ok(InvitationSummary {
            invitation_id: invitation.id,
            email: invitation.email,
            role_id: role.id,
            role_name: role.name,
            expires_at: invitation.expires_at,
            invited_by: invitation.created_by,
            first_name: invitation.first_name,
            last_name: invitation.last_name,
            position: invitation.position,
        })
    }
}

// ── AcceptInvitation ─────────────────────────────────────────────────────────

pub struct AcceptInvitationInput {
    pub token: String,
    pub username: Option<String>,
    pub password: String,
    pub password_confirmation: String,
    /// Overrides the invitation's name hints when present.
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub position: Option<String>,
}

pub struct AcceptInvitationUseCase<I, V>
where
    I: InvitationRepository,
    V: CredentialVerifier,
{
    pub invitations: I,
    pub verifier: V,
    pub policy: PasswordPolicy,
}

impl<I, V> AcceptInvitationUseCase<I, V>
where
    I: InvitationRepository,
    V: CredentialVerifier,
{
    /// Register the invitee. Of several concurrent acceptances of the same
    /// token exactly one succeeds; the rest see `InvitationUsed`.
    pub async fn execute(&self, input: AcceptInvitationInput) -> Result<Account, IdentityError> {
        self.run(input).await.op("accept_invitation")
    }

    async fn run(&self, input: AcceptInvitationInput) -> Result<Account, ErrorKind> {
        let now = Utc::now();
        let invitation = load_usable(&self.invitations, &input.token, now).await?;

        let first_name = non_blank(input.first_name).or(invitation.first_name.clone());
        let last_name = non_blank(input.last_name).or(invitation.last_name.clone());
        if first_name.is_none() || last_name.is_none() {
            return Err(ErrorKind::InvitationNameRequired);
        }

        let username = non_blank(input.username);
        if username.as_deref().is_some_and(|u| !validate_username(u)) {
            return Err(ErrorKind::InvalidUsername);
        }

        self.policy.check(&input.password)?;
        if input.password != input.password_confirmation {
            return Err(ErrorKind::PasswordMismatch);
        }
        let password_hash = self.verifier.hash(&input.password)?;

        let account = self
            .invitations
            .accept(
                invitation.id,
                &NewAccount {
                    email: invitation.email.clone(),
                    username,
                    password_hash,
                    first_name,
                    last_name,
                    position: non_blank(input.position).or(invitation.position.clone()),
                    is_active: true,
                    role_ids: vec![invitation.role_id],
                },
                now,
            )
            .await?;

        tracing::info!(
            invitation_id = %invitation.id,
            account_id = %account.id,
            "invitation accepted"
        );
        Ok(account)
    }
}

// ── ResendInvitation ─────────────────────────────────────────────────────────

pub struct ResendInvitationUseCase<A, R, I, N>
where
    A: AccountRepository,
    R: RoleRepository,
    I: InvitationRepository,
    N: Notifier,
{
    pub accounts: A,
    pub roles: R,
    pub invitations: I,
    pub notifier: N,
}

impl<A, R, I, N> ResendInvitationUseCase<A, R, I, N>
where
    A: AccountRepository,
    R: RoleRepository,
    I: InvitationRepository,
    N: Notifier,
{
    /// Replace the token, deliver the new one and bump the retry counter.
    /// Earlier values stop working.
    pub async fn execute(
        &self,
        id: InvitationId,
        actor_id: AccountId,
    ) -> Result<IssuedInvitation, IdentityError> {
        self.run(id, actor_id).await.op("resend_invitation")
    }

    async fn run(
        &self,
        id: InvitationId,
        actor_id: AccountId,
    ) -> Result<IssuedInvitation, ErrorKind> {
        load_active_account(&self.accounts, actor_id).await?;
        let invitation = load_usable_by_id(&self.invitations, id, Utc::now()).await?;
        let role = self
            .roles
            .find_role(invitation.role_id)
            .await?
            .ok_or(ErrorKind::RoleNotFound)?;

        let token = generate_token(INVITATION_TOKEN_LEN);
        let invitation = self
            .invitations
            .rotate_token(invitation.id, &hash_token(&token), Utc::now())
            .await?;

        let outcome = deliver(&self.notifier, &invitation, &token, &role.name).await;
        let invitation = self
            .invitations
            .record_delivery(invitation.id, &outcome, true, Utc::now())
            .await?;

        tracing::info!(
            invitation_id = %invitation.id,
            retry_count = invitation.retry_count,
            actor_id = %actor_id,
            "invitation resent"
        );
        Ok(IssuedInvitation { invitation, token })
    }
}

// ── RevokeInvitation ─────────────────────────────────────────────────────────

pub struct RevokeInvitationUseCase<A, I>
where
    A: AccountRepository,
    I: InvitationRepository,
{
    pub accounts: A,
    pub invitations: I,
}

impl<A, I> RevokeInvitationUseCase<A, I>
where
    A: AccountRepository,
    I: InvitationRepository,
{
    pub async fn execute(&self, id: InvitationId, actor_id: AccountId) -> Result<(), IdentityError> {
        self.run(id, actor_id).await.op("revoke_invitation")
    }

    async fn run(&self, id: InvitationId, actor_id: AccountId) -> Result<(), ErrorKind> {
        load_active_account(&self.accounts, actor_id).await?;
        let now = Utc::now();
        load_usable_by_id(&self.invitations, id, now).await?;

        let revoked = self
            .invitations
            .update_state(id, InvitationState::Pending, InvitationState::Revoked, now)
            .await?;
        if !revoked {
            // Lost a race; report whichever transition won.
            let current = self
                .invitations
                .find_by_id(id)
                .await?
                .ok_or(ErrorKind::InvitationNotFound)?;
            return Err(match current.state {
                InvitationState::Used => ErrorKind::InvitationUsed,
                _ => ErrorKind::InvitationExpired,
            });
        }

        tracing::info!(invitation_id = %id, actor_id = %actor_id, "invitation revoked");
        Ok(())
    }
}

// ── ListPendingInvitations / CleanupExpiredInvitations ───────────────────────

pub struct ListPendingInvitationsUseCase<I>
where
    I: InvitationRepository,
{
    pub invitations: I,
}

impl<I> ListPendingInvitationsUseCase<I>
where
    I: InvitationRepository,
{
    /// Pending, unexpired invitations, newest first.
    pub async fn execute(&self) -> Result<Vec<Invitation>, IdentityError> {
        self.invitations
            .list_pending(Utc::now())
            .await
            .op("list_pending_invitations")
    }
}

pub struct CleanupExpiredInvitationsUseCase<I>
where
    I: InvitationRepository,
{
    pub invitations: I,
}

impl<I> CleanupExpiredInvitationsUseCase<I>
where
    I: InvitationRepository,
{
    /// Delete expired invitations that were never used.
    pub async fn execute(&self) -> Result<u64, IdentityError> {
        let count = self
            .invitations
            .delete_expired(Utc::now())
            .await
            .op("cleanup_expired_invitations")?;
        tracing::info!(count, "removed expired invitations");
        Ok(count)
    }
}
