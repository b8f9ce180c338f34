//! Site name validation.
//!
//! Site names end up in file paths (run slots, per-site logs) and in the
//! restart queue, so every name crossing a process boundary is checked here
//! before it is used.

use thiserror::Error;

/// Maximum allowed length for a site name.
pub const MAX_NAME_LENGTH: usize = 128;

/// Reserved names that cannot be used as site names (case-insensitive).
const RESERVED_NAMES: &[&str] = &[
    ".", "..", "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7",
    "com8", "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

/// Reasons a site name is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("site name cannot be empty")]
    Empty,
    #[error("site name too long: {len} characters (max {max})")]
    TooLong { len: usize, max: usize },
    #[error("site name '{0}' contains invalid characters; use only alphanumeric characters, dashes (-), and underscores (_)")]
    InvalidChars(String),
    #[error("site name '{0}' uses a reserved name")]
    Reserved(String),
}

/// Validates that a site name is a safe identifier.
///
/// A name is valid if it is non-empty, at most [`MAX_NAME_LENGTH`] bytes,
/// made only of ASCII alphanumerics, dashes and underscores, and not a
/// reserved system name.
///
/// # Examples
///
/// ```
/// use keeper::validation::validate_site_name;
///
/// assert!(validate_site_name("api").is_ok());
/// assert!(validate_site_name("blog_v2").is_ok());
/// assert!(validate_site_name("").is_err());
/// assert!(validate_site_name("../etc").is_err());
/// ```
pub fn validate_site_name(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }

    if name.len() > MAX_NAME_LENGTH {
        return Err(NameError::TooLong {
            len: name.len(),
            max: MAX_NAME_LENGTH,
        });
    }

    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid_chars {
        return Err(NameError::InvalidChars(name.to_string()));
    }

    if RESERVED_NAMES.contains(&name.to_lowercase().as_str()) {
        return Err(NameError::Reserved(name.to_string()));
    }

    Ok(())
}

/// Clap value parser for site name arguments.
pub fn clap_site_validator(s: &str) -> Result<String, String> {
    validate_site_name(s).map_err(|e| e.to_string())?;
    Ok(s.to_string())
}
