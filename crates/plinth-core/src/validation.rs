//! Input validation shared by services.
//!
//! Every validator returns `Error::InvalidInput` with a message naming the
//! offending field, so handlers can pass the message straight to clients.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::defaults::{PAGE_LIMIT, PAGE_LIMIT_MAX, PASSWORD_MIN_LENGTH};
use crate::{Error, Result};

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is a valid regex")
});

/// ISO 3166-1 alpha-2 codes.
const COUNTRY_CODES: &[&str] = &[
    "AD", "AE", "AF", "AG", "AI", "AL", "AM", "AO", "AQ", "AR", "AS", "AT", "AU", "AW", "AX",
    "AZ", "BA", "BB", "BD", "BE", "BF", "BG", "BH", "BI", "BJ", "BL", "BM", "BN", "BO", "BQ",
    "BR", "BS", "BT", "BV", "BW", "BY", "BZ", "CA", "CC", "CD", "CF", "CG", "CH", "CI", "CK",
    "CL", "CM", "CN", "CO", "CR", "CU", "CV", "CW", "CX", "CY", "CZ", "DE", "DJ", "DK", "DM",
    "DO", "DZ", "EC", "EE", "EG", "EH", "ER", "ES", "ET", "FI", "FJ", "FK", "FM", "FO", "FR",
    "GA", "GB", "GD", "GE", "GF", "GG", "GH", "GI", "GL", "GM", "GN", "GP", "GQ", "GR", "GS",
    "GT", "GU", "GW", "GY", "HK", "HM", "HN", "HR", "HT", "HU", "ID", "IE", "IL", "IM", "IN",
    "IO", "IQ", "IR", "IS", "IT", "JE", "JM", "JO", "JP", "KE", "KG", "KH", "KI", "KM", "KN",
    "KP", "KR", "KW", "KY", "KZ", "LA", "LB", "LC", "LI", "LK", "LR", "LS", "LT", "LU", "LV",
    "LY", "MA", "MC", "MD", "ME", "MF", "MG", "MH", "MK", "ML", "MM", "MN", "MO", "MP", "MQ",
    "MR", "MS", "MT", "MU", "MV", "MW", "MX", "MY", "MZ", "NA", "NC", "NE", "NF", "NG", "NI",
    "NL", "NO", "NP", "NR", "NU", "NZ", "OM", "PA", "PE", "PF", "PG", "PH", "PK", "PL", "PM",
    "PN", "PR", "PS", "PT", "PW", "PY", "QA", "RE", "RO", "RS", "RU", "RW", "SA", "SB", "SC",
    "SD", "SE", "SG", "SH", "SI", "SJ", "SK", "SL", "SM", "SN", "SO", "SR", "SS", "ST", "SV",
    "SX", "SY", "SZ", "TC", "TD", "TF", "TG", "TH", "TJ", "TK", "TL", "TM", "TN", "TO", "TR",
    "TT", "TV", "TW", "TZ", "UA", "UG", "UM", "US", "UY", "UZ", "VA", "VC", "VE", "VG", "VI",
    "VN", "VU", "WF", "WS", "YE", "YT", "ZA", "ZM", "ZW",
];

/// Require a non-blank value no longer than `max_len` characters.
///
/// Returns the trimmed value.
pub fn validate_required(field: &str, value: &str, max_len: usize) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput(format!("{} is required", field)));
    }
    if trimmed.chars().count() > max_len {
        return Err(Error::InvalidInput(format!(
            "{} exceeds {} characters",
            field, max_len
        )));
    }
    Ok(trimmed.to_string())
}

/// Like [`validate_required`] but passes `None` through.
pub fn validate_optional(field: &str, value: Option<&str>, max_len: usize) -> Result<Option<String>> {
    value.map(|v| validate_required(field, v, max_len)).transpose()
}

/// Validate and normalise an email address (trimmed, lowercased).
pub fn validate_email(email: &str) -> Result<String> {
    let normalised = email.trim().to_lowercase();
    if normalised.len() > 254 || !EMAIL_PATTERN.is_match(&normalised) {
        return Err(Error::InvalidInput(format!(
            "'{}' is not a valid email address",
            email.trim()
        )));
    }
    Ok(normalised)
}

/// Passwords need at least [`PASSWORD_MIN_LENGTH`] characters including one
/// letter and one digit.
pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < PASSWORD_MIN_LENGTH {
        return Err(Error::InvalidInput(format!(
            "password must be at least {} characters",
            PASSWORD_MIN_LENGTH
        )));
    }
    let has_letter = password.chars().any(|c| c.is_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !has_letter || !has_digit {
        return Err(Error::InvalidInput(
            "password must contain at least one letter and one digit".to_string(),
        ));
    }
    Ok(())
}

/// Validate an ISO 3166-1 alpha-2 country code, returning it uppercased.
pub fn validate_country_code(code: &str) -> Result<String> {
    let upper = code.trim().to_ascii_uppercase();
    if COUNTRY_CODES.binary_search(&upper.as_str()).is_ok() {
        Ok(upper)
    } else {
        Err(Error::InvalidInput(format!(
            "'{}' is not an ISO 3166-1 alpha-2 country code",
            code.trim()
        )))
    }
}

/// Clamp a requested page size into `1..=PAGE_LIMIT_MAX`, defaulting to
/// [`PAGE_LIMIT`].
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(PAGE_LIMIT).clamp(1, PAGE_LIMIT_MAX)
}

/// Negative offsets are treated as zero.
pub fn clamp_offset(offset: Option<i64>) -> i64 {
    offset.unwrap_or(0).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn country_codes_are_sorted_for_binary_search() {
        let mut sorted = COUNTRY_CODES.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, COUNTRY_CODES);
    }

    #[test]
    fn test_validate_required_trims() {
        assert_eq!(validate_required("name", "  Acme  ", 10).unwrap(), "Acme");
    }

    #[test]
    fn test_validate_required_rejects_blank() {
        let err = validate_required("name", "   ", 10).unwrap_err();
        assert_eq!(err.to_string(), "Invalid input: name is required");
    }

    #[test]
    fn test_validate_required_counts_chars_not_bytes() {
        assert!(validate_required("name", "ééééé", 5).is_ok());
        assert!(validate_required("name", "éééééé", 5).is_err());
    }

    #[test]
    fn test_validate_optional_passes_none() {
        assert_eq!(validate_optional("label", None, 5).unwrap(), None);
    }

    #[test]
    fn test_validate_email_normalises() {
        assert_eq!(
            validate_email(" Ada@Example.COM ").unwrap(),
            "ada@example.com"
        );
    }

    #[test]
    fn test_validate_email_rejects_garbage() {
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("a@b").is_err());
        assert!(validate_email("a b@c.d").is_err());
    }

    #[test]
    fn test_validate_password_rules() {
        assert!(validate_password("short1").is_err());
        assert!(validate_password("allletters").is_err());
        assert!(validate_password("12345678").is_err());
        assert!(validate_password("correct horse 9").is_ok());
    }

    #[test]
    fn test_validate_country_code() {
        assert_eq!(validate_country_code("de").unwrap(), "DE");
        assert_eq!(validate_country_code(" US ").unwrap(), "US");
        assert!(validate_country_code("XX").is_err());
        assert!(validate_country_code("USA").is_err());
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None), PAGE_LIMIT);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(10_000)), PAGE_LIMIT_MAX);
        assert_eq!(clamp_limit(Some(25)), 25);
    }

    #[test]
    fn test_clamp_offset() {
        assert_eq!(clamp_offset(None), 0);
        assert_eq!(clamp_offset(Some(-5)), 0);
        assert_eq!(clamp_offset(Some(40)), 40);
    }
}
