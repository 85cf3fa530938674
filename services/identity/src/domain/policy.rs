use std::fmt;
use std::sync::Arc;

use crate::error::ErrorKind;

/// Floor for the configurable minimum password length.
pub const PASSWORD_MIN_LEN: usize = 8;

type Rule = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Password strength policy: a minimum length in characters plus an optional
/// caller-supplied rule.
#[derive(Clone)]
pub struct PasswordPolicy {
    min_length: usize,
    rule: Option<Rule>,
}

impl PasswordPolicy {
    /// `min_length` below [`PASSWORD_MIN_LEN`] is raised to it.
    pub fn new(min_length: usize) -> Self {
        Self {
            min_length: min_length.max(PASSWORD_MIN_LEN),
            rule: None,
        }
    }

    /// Extra predicate a password must satisfy, e.g. a breached-password check.
    pub fn with_rule(mut self, rule: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.rule = Some(Arc::new(rule));
        self
    }

    pub fn min_length(&self) -> usize {
        self.min_length
    }

    pub fn check(&self, password: &str) -> Result<(), ErrorKind> {
        if password.chars().count() < self.min_length {
            return Err(ErrorKind::PasswordTooWeak);
        }
        match &self.rule {
            Some(rule) if !rule(password) => Err(ErrorKind::PasswordTooWeak),
            _ => Ok(()),
        }
    }
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self::new(PASSWORD_MIN_LEN)
    }
}

impl fmt::Debug for PasswordPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordPolicy")
            .field("min_length", &self.min_length)
            .field("has_rule", &self.rule.is_some())
            .finish()
    }
}
