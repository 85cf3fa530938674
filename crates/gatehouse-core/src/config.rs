/// Trait for loading configuration from environment variables.
///
/// Implementors derive `serde::Deserialize` (with `#[serde(default = ...)]`
/// for optional settings) and call `Config::from_env()` at startup. Field
/// `jwt_secret` is read from `{ENV_PREFIX}JWT_SECRET`.
pub trait Config: Sized + serde::de::DeserializeOwned {
    /// Prefix stripped from variable names before matching fields.
    const ENV_PREFIX: &'static str = "";

    /// Load from the process environment.
    fn try_from_env() -> Result<Self, envy::Error> {
        envy::prefixed(Self::ENV_PREFIX).from_env()
    }

    /// Load from the process environment.
    ///
    /// # Panics
    ///
    /// Panics if any required env var is missing or cannot be deserialized.
    fn from_env() -> Self {
        Self::try_from_env().expect("failed to load config from environment")
    }
}
