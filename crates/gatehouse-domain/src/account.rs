//! Account identity rules: email normalization and username shape.

/// Minimum username length in characters.
pub const USERNAME_MIN_LEN: usize = 3;

/// Maximum username length in characters.
pub const USERNAME_MAX_LEN: usize = 30;

/// Trim and lower-case an email address.
///
/// Every email comparison and every stored email goes through this function.
///
/// ```
/// use gatehouse_domain::account::normalize_email;
///
/// assert_eq!(normalize_email("  A@X.com "), "a@x.com");
/// ```
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Loose structural check on an already-normalized email.
///
/// Exactly one `@`, a non-empty local part, and a dotted domain with no empty
/// labels. Deliverability is the notifier's problem.
pub fn is_valid_email(email: &str) -> bool {
    if email.is_empty() || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    domain.contains('.') && domain.split('.').all(|label| !label.is_empty())
}

/// Usernames are 3–30 characters of ASCII alphanumerics, `_`, `.` or `-`.
pub fn validate_username(username: &str) -> bool {
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return false;
    }
    username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
}
