use chrono::{DateTime, Utc};

/// Identity core error variants.
///
/// Stores and collaborators return these directly; public use cases wrap them
/// in [`IdentityError`] together with the operation name.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account not found")]
    AccountNotFound,
    #[error("account inactive")]
    AccountInactive,
    #[error("email already exists")]
    EmailAlreadyExists,
    #[error("username already exists")]
    UsernameAlreadyExists,
    #[error("invalid email")]
    InvalidEmail,
    #[error("invalid username")]
    InvalidUsername,
    #[error("password too weak")]
    PasswordTooWeak,
    #[error("passwords do not match")]
    PasswordMismatch,
    #[error("invalid token")]
    InvalidToken,
    #[error("token expired")]
    TokenExpired,
    #[error("token not found")]
    TokenNotFound,
    #[error("role not found")]
    RoleNotFound,
    #[error("role already exists")]
    RoleAlreadyExists,
    #[error("permission not found")]
    PermissionNotFound,
    #[error("permission already exists")]
    PermissionAlreadyExists,
    #[error("role grants permissions the inviter does not hold")]
    RoleNotAssignable,
    #[error("invitation not found")]
    InvitationNotFound,
    #[error("invitation expired")]
    InvitationExpired,
    #[error("invitation already used")]
    InvitationUsed,
    #[error("first and last name are required")]
    InvitationNameRequired,
    #[error("rate limit exceeded, retry at {retry_at}")]
    RateLimitExceeded { retry_at: DateTime<Utc> },
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ErrorKind {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::AccountNotFound => "ACCOUNT_NOT_FOUND",
            Self::AccountInactive => "ACCOUNT_INACTIVE",
            Self::EmailAlreadyExists => "EMAIL_ALREADY_EXISTS",
            Self::UsernameAlreadyExists => "USERNAME_ALREADY_EXISTS",
            Self::InvalidEmail => "INVALID_EMAIL",
            Self::InvalidUsername => "INVALID_USERNAME",
            Self::PasswordTooWeak => "PASSWORD_TOO_WEAK",
            Self::PasswordMismatch => "PASSWORD_MISMATCH",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::TokenNotFound => "TOKEN_NOT_FOUND",
            Self::RoleNotFound => "ROLE_NOT_FOUND",
            Self::RoleAlreadyExists => "ROLE_ALREADY_EXISTS",
            Self::PermissionNotFound => "PERMISSION_NOT_FOUND",
            Self::PermissionAlreadyExists => "PERMISSION_ALREADY_EXISTS",
            Self::RoleNotAssignable => "ROLE_NOT_ASSIGNABLE",
            Self::InvitationNotFound => "INVITATION_NOT_FOUND",
            Self::InvitationExpired => "INVITATION_EXPIRED",
            Self::InvitationUsed => "INVITATION_USED",
            Self::InvitationNameRequired => "INVITATION_NAME_REQUIRED",
            Self::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Instant after which a rate-limited caller may retry.
    pub fn retry_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::RateLimitExceeded { retry_at } => Some(*retry_at),
            _ => None,
        }
    }

    /// Whole seconds until [`retry_at`](Self::retry_at), rounded up and never
    /// below 1. Suitable for a `Retry-After` header.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after_secs_at(Utc::now())
    }

    pub fn retry_after_secs_at(&self, now: DateTime<Utc>) -> Option<u64> {
        let retry_at = self.retry_at()?;
        let millis = (retry_at - now).num_milliseconds().max(0) as u64;
        Some(millis.div_ceil(1000).max(1))
    }

    /// Invitation exists but can no longer be used.
    pub fn is_gone(&self) -> bool {
        matches!(self, Self::InvitationUsed | Self::InvitationExpired)
    }

    /// Login-facing view of this error: a missing account reads as bad
    /// credentials so responses do not reveal which emails are registered.
    pub fn masked(self) -> Self {
        match self {
            Self::AccountNotFound => Self::InvalidCredentials,
            other => other,
        }
    }
}

/// An [`ErrorKind`] tagged with the operation that produced it.
#[derive(Debug, thiserror::Error)]
#[error("{op}: {kind}")]
pub struct IdentityError {
    pub op: &'static str,
    #[source]
    pub kind: ErrorKind,
}

impl IdentityError {
    pub fn new(op: &'static str, kind: ErrorKind) -> Self {
        Self { op, kind }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn into_kind(self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

/// Attach an operation name to a failed result.
pub trait WithOp<T> {
    fn op(self, op: &'static str) -> Result<T, IdentityError>;
}

impl<T, E> WithOp<T> for Result<T, E>
where
    E: Into<ErrorKind>,
{
    fn op(self, op: &'static str) -> Result<T, IdentityError> {
        self.map_err(|e| {
            let kind = e.into();
            // Only internal errors are logged here, with the full anyhow chain.
            if let ErrorKind::Internal(ref e) = kind {
                tracing::error!(op, error = %format!("{e:#}"), kind = "INTERNAL", "internal error");
            }
            IdentityError::new(op, kind)
        })
    }
}
