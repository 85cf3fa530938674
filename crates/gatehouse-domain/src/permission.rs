//! Permission identity and direct-assignment mode.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// `resource:action` pair that identifies a permission for matching.
///
/// The stored permission name is a display key; two permissions with the same
/// resource and action are the same permission as far as resolution goes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PermissionKey {
    pub resource: String,
    pub action: String,
}

impl PermissionKey {
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
        }
    }

    /// Full name as embedded in access tokens, e.g. `users:update`.
    pub fn full_name(&self) -> String {
        format!("{}:{}", self.resource, self.action)
    }
}

impl fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.action)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("permission must be `resource:action`, got {0:?}")]
pub struct ParsePermissionKeyError(pub String);

impl FromStr for PermissionKey {
    type Err = ParsePermissionKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((resource, action))
                if !resource.is_empty() && !action.is_empty() && !action.contains(':') =>
            {
                Ok(Self::new(resource, action))
            }
            _ => Err(ParsePermissionKeyError(s.to_owned())),
        }
    }
}

/// Mode of a direct account-to-permission assignment.
///
/// A `Deny` beats every grant of the same permission, role-derived or direct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    Grant,
    Deny,
}
