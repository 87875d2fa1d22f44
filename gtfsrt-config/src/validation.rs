//! Field-level validation helpers

use crate::error::{ConfigError, ConfigResult};

/// Validate a lowercase kebab identifier (`^[a-z0-9-]+$`).
pub fn validate_slug(value: &str, field: &str, path: &str) -> ConfigResult<()> {
    let ok = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !ok {
        return Err(ConfigError::validation(
            path,
            format!("{field} must match ^[a-z0-9-]+$, got {value:?}"),
        ));
    }
    Ok(())
}

/// Validate a secret name (`^[a-zA-Z0-9_-]+$`).
pub fn validate_secret_name(value: &str, path: &str) -> ConfigResult<()> {
    let ok = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !ok {
        return Err(ConfigError::validation(
            path,
            format!("secret_name must match ^[a-zA-Z0-9_-]+$, got {value:?}"),
        ));
    }
    Ok(())
}

/// Validate an integer against an inclusive range.
pub fn validate_range(value: u32, min: u32, max: u32, field: &str, path: &str) -> ConfigResult<()> {
    if !(min..=max).contains(&value) {
        return Err(ConfigError::validation(
            path,
            format!("{field} must be in [{min}, {max}], got {value}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_accepts_kebab() {
        assert!(validate_slug("septa-bus-2", "id", "agencies[0]").is_ok());
    }

    #[test]
    fn test_slug_rejects_uppercase_and_empty() {
        assert!(validate_slug("SEPTA", "id", "agencies[0]").is_err());
        assert!(validate_slug("", "id", "agencies[0]").is_err());
        assert!(validate_slug("a_b", "id", "agencies[0]").is_err());
    }

    #[test]
    fn test_secret_name_allows_underscore() {
        assert!(validate_secret_name("septa_api_key", "a").is_ok());
        assert!(validate_secret_name("bad name", "a").is_err());
    }

    #[test]
    fn test_range() {
        assert!(validate_range(20, 5, 3600, "interval_seconds", "p").is_ok());
        assert!(validate_range(4, 5, 3600, "interval_seconds", "p").is_err());
        assert!(validate_range(3601, 5, 3600, "interval_seconds", "p").is_err());
    }
}
