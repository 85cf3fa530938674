use anyhow::anyhow;
use chrono::Duration;
use serde::Deserialize;

use gatehouse_core::config::Config;

use crate::error::ErrorKind;

/// Longest accepted lifetime or window: ten years.
pub const MAX_DURATION_SECS: i64 = 10 * 365 * 24 * 3600;

/// Identity core configuration loaded from `GATEHOUSE_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// HMAC secret for signing access tokens. Env var: `GATEHOUSE_JWT_SECRET`.
    pub jwt_secret: String,
    /// Access-token lifetime (default 15 minutes).
    #[serde(default = "default_access_token_ttl_secs")]
    pub access_token_ttl_secs: i64,
    /// Refresh-token lifetime for browser sessions (default 7 days).
    #[serde(default = "default_refresh_token_ttl_secs")]
    pub refresh_token_ttl_secs: i64,
    /// Refresh-token lifetime for sessions flagged as mobile (default 30 days).
    #[serde(default = "default_mobile_refresh_token_ttl_secs")]
    pub mobile_refresh_token_ttl_secs: i64,
    /// Invitation lifetime (default 7 days).
    #[serde(default = "default_invitation_ttl_secs")]
    pub invitation_ttl_secs: i64,
    /// Password reset token lifetime (default 15 minutes).
    #[serde(default = "default_password_reset_ttl_secs")]
    pub password_reset_ttl_secs: i64,
    /// Reset requests allowed per identifier per window (default 5).
    #[serde(default = "default_password_reset_max_attempts")]
    pub password_reset_max_attempts: u32,
    /// Rate-limit window for reset requests (default 1 hour).
    #[serde(default = "default_password_reset_window_secs")]
    pub password_reset_window_secs: i64,
    /// Minimum password length; values below 8 are raised to 8.
    #[serde(default = "default_password_min_length")]
    pub password_min_length: usize,
    /// Revoke every refresh token of an account after a password change or reset.
    #[serde(default = "default_true")]
    pub revoke_sessions_on_password_change: bool,
    /// Argon2id memory cost in KiB.
    #[serde(default = "default_argon2_memory_kib")]
    pub argon2_memory_kib: u32,
    /// Argon2id iteration count.
    #[serde(default = "default_argon2_iterations")]
    pub argon2_iterations: u32,
    /// Argon2id lanes.
    #[serde(default = "default_argon2_parallelism")]
    pub argon2_parallelism: u32,
}

impl Config for IdentityConfig {
    const ENV_PREFIX: &'static str = "GATEHOUSE_";
}

fn default_access_token_ttl_secs() -> i64 {
    900
}

fn default_refresh_token_ttl_secs() -> i64 {
    7 * 24 * 3600
}

fn default_mobile_refresh_token_ttl_secs() -> i64 {
    30 * 24 * 3600
}

fn default_invitation_ttl_secs() -> i64 {
    7 * 24 * 3600
}

fn default_password_reset_ttl_secs() -> i64 {
    900
}

fn default_password_reset_max_attempts() -> u32 {
    5
}

fn default_password_reset_window_secs() -> i64 {
    3600
}

fn default_password_min_length() -> usize {
    8
}

fn default_true() -> bool {
    true
}

// OWASP-recommended Argon2id baseline: 19 MiB, 2 passes, 1 lane.
fn default_argon2_memory_kib() -> u32 {
    19 * 1024
}

fn default_argon2_iterations() -> u32 {
    2
}

fn default_argon2_parallelism() -> u32 {
    1
}

impl IdentityConfig {
    /// Config with every default applied and the given signing secret.
    pub fn with_secret(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            access_token_ttl_secs: default_access_token_ttl_secs(),
            refresh_token_ttl_secs: default_refresh_token_ttl_secs(),
            mobile_refresh_token_ttl_secs: default_mobile_refresh_token_ttl_secs(),
            invitation_ttl_secs: default_invitation_ttl_secs(),
            password_reset_ttl_secs: default_password_reset_ttl_secs(),
            password_reset_max_attempts: default_password_reset_max_attempts(),
            password_reset_window_secs: default_password_reset_window_secs(),
            password_min_length: default_password_min_length(),
            revoke_sessions_on_password_change: default_true(),
            argon2_memory_kib: default_argon2_memory_kib(),
            argon2_iterations: default_argon2_iterations(),
            argon2_parallelism: default_argon2_parallelism(),
        }
    }

    /// Reject an empty secret and any lifetime or window outside
    /// `1..=MAX_DURATION_SECS`.
    pub fn validate(&self) -> Result<(), ErrorKind> {
        if self.jwt_secret.is_empty() {
            return Err(anyhow!("jwt_secret must not be empty").into());
        }
        let durations = [
            ("access_token_ttl_secs", self.access_token_ttl_secs),
            ("refresh_token_ttl_secs", self.refresh_token_ttl_secs),
            ("mobile_refresh_token_ttl_secs", self.mobile_refresh_token_ttl_secs),
            ("invitation_ttl_secs", self.invitation_ttl_secs),
            ("password_reset_ttl_secs", self.password_reset_ttl_secs),
            ("password_reset_window_secs", self.password_reset_window_secs),
        ];
        for (name, secs) in durations {
            if !(1..=MAX_DURATION_SECS).contains(&secs) {
                return Err(
                    anyhow!("{name} must be within 1..={MAX_DURATION_SECS}, got {secs}").into(),
                );
            }
        }
        Ok(())
    }

    pub fn access_token_ttl(&self) -> Duration {
        Duration::seconds(self.access_token_ttl_secs)
    }

    pub fn refresh_token_ttl(&self) -> Duration {
        Duration::seconds(self.refresh_token_ttl_secs)
    }

    pub fn mobile_refresh_token_ttl(&self) -> Duration {
        Duration::seconds(self.mobile_refresh_token_ttl_secs)
    }

    pub fn invitation_ttl(&self) -> Duration {
        Duration::seconds(self.invitation_ttl_secs)
    }

    pub fn password_reset_ttl(&self) -> Duration {
        Duration::seconds(self.password_reset_ttl_secs)
    }

    pub fn password_reset_window(&self) -> Duration {
        Duration::seconds(self.password_reset_window_secs)
    }
}
