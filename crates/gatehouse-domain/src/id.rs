//! Newtype wrappers for domain identifiers.
//!
//! All identifiers are store-assigned `i64` sequence values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

id_newtype!(
    /// Identifies an account.
    AccountId
);

id_newtype!(
    /// Identifies a role.
    RoleId
);

id_newtype!(
    /// Identifies a permission.
    PermissionId
);

id_newtype!(
    /// Identifies an invitation.
    InvitationId
);

id_newtype!(
    /// Identifies a persisted refresh-token record.
    TokenId
);

id_newtype!(
    /// Identifies a password reset token record.
    ResetTokenId
);
