//! JWT access-token validation.

use std::collections::BTreeSet;

use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
#[cfg(any(feature = "USE_ONLY_IN_IDENTITY_SERVICE", test))]
use serde::Serialize;

use gatehouse_domain::id::AccountId;

/// Account identity and permission snapshot extracted from a validated access token.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub account_id: AccountId,
    pub permissions: BTreeSet<String>,
    pub issued_at: u64,
    pub access_token_exp: u64,
}

impl TokenInfo {
    /// Whether the snapshot embedded at issuance contains `permission`
    /// (full `resource:action` name).
    ///
    /// The snapshot is not re-resolved; it may lag the store by up to one
    /// access-token lifetime.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

/// Errors returned by [`validate_access_token`].
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("malformed token")]
    Malformed,
}

/// JWT claims payload shared by token creation (identity service) and
/// validation (any authorization layer).
///
/// # Fields
///
/// | Field | JWT claim | Rust type | Meaning |
/// |-------|-----------|-----------|---------|
/// | `sub` | `sub` | decimal string | account ID |
/// | `perms` | custom | `Vec<String>` | effective `resource:action` permissions, sorted |
/// | `iat` | `iat` | seconds since epoch | issue time |
/// | `exp` | `exp` | seconds since epoch | token expiration |
/// | `jti` | `jti` | UUID string | unique token id |
///
/// # Feature gate
///
/// [`Deserialize`] is always available. [`Serialize`] requires the
/// **`USE_ONLY_IN_IDENTITY_SERVICE`** cargo feature because the identity
/// service is the sole token issuer.
#[derive(Debug, Deserialize)]
#[cfg_attr(
    any(feature = "USE_ONLY_IN_IDENTITY_SERVICE", test),
    derive(Serialize)
)]
pub struct AccessClaims {
    /// Account ID (decimal string).
    pub sub: String,
    /// Effective permissions at issuance.
    #[serde(default)]
    pub perms: Vec<String>,
    /// Issued-at timestamp (seconds since UNIX epoch).
    pub iat: u64,
    /// Expiration timestamp (seconds since UNIX epoch).
    pub exp: u64,
    /// Token id.
    pub jti: String,
}

/// Clock-skew allowance when checking `exp`, in seconds.
pub const EXP_LEEWAY_SECS: u64 = 60;

fn validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = EXP_LEEWAY_SECS;
    validation.set_required_spec_claims(&["exp", "sub", "iat"]);
    validation
}

/// Verify an HS256 access token and return the identity and permission
/// snapshot it carries.
///
/// Only signature and expiry are checked here. Whether the account still
/// exists and is active is the identity service's `ValidateToken` question.
pub fn validate_access_token(token: &str, secret: &str) -> Result<TokenInfo, AuthError> {
    let claims = decode::<AccessClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation(),
    )
    .map_err(|e| match e.kind() {
        JwtErrorKind::ExpiredSignature => AuthError::Expired,
        JwtErrorKind::InvalidSignature => AuthError::InvalidSignature,
        _ => AuthError::Malformed,
    })?
    .claims;

    let account_id = claims
        .sub
        .parse::<AccountId>()
        .map_err(|_| AuthError::Malformed)?;
    Ok(TokenInfo {
        account_id,
        permissions: claims.perms.into_iter().collect(),
        issued_at: claims.iat,
        access_token_exp: claims.exp,
    })
}
