//! URL slug generation and validation.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::defaults::SLUG_MAX_LENGTH;
use crate::{Error, Result};

static SLUG_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("slug pattern is a valid regex")
});

/// Turn arbitrary text into a slug.
///
/// Lowercases ASCII letters, keeps digits, and collapses every run of other
/// characters into a single `-`. Leading and trailing separators are dropped
/// and the result is cut to [`SLUG_MAX_LENGTH`] without leaving a trailing
/// `-`. May return an empty string when the input has no ASCII alphanumerics.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.len() > SLUG_MAX_LENGTH {
        slug.truncate(SLUG_MAX_LENGTH);
        while slug.ends_with('-') {
            slug.pop();
        }
    }
    slug
}

/// Validate a caller-supplied slug.
pub fn validate_slug(slug: &str) -> Result<()> {
    if slug.is_empty() {
        return Err(Error::InvalidInput("slug must not be empty".to_string()));
    }
    if slug.len() > SLUG_MAX_LENGTH {
        return Err(Error::InvalidInput(format!(
            "slug exceeds {} characters",
            SLUG_MAX_LENGTH
        )));
    }
    if !SLUG_PATTERN.is_match(slug) {
        return Err(Error::InvalidInput(format!(
            "slug '{}' must be lowercase letters, digits and single hyphens",
            slug
        )));
    }
    Ok(())
}

/// Resolve the slug for a new entity: an explicit slug is validated, a
/// missing one is derived from `source`.
pub fn resolve_slug(explicit: Option<&str>, source: &str) -> Result<String> {
    match explicit {
        Some(s) => {
            validate_slug(s)?;
            Ok(s.to_string())
        }
        None => {
            let derived = slugify(source);
            if derived.is_empty() {
                return Err(Error::InvalidInput(format!(
                    "cannot derive a slug from '{}'; supply one explicitly",
                    source
                )));
            }
            Ok(derived)
        }
    }
}

/// Append a numeric suffix, keeping the result within the length limit.
pub fn with_suffix(base: &str, n: u32) -> String {
    let suffix = format!("-{}", n);
    let keep = SLUG_MAX_LENGTH.saturating_sub(suffix.len()).min(base.len());
    let trimmed = base[..keep].trim_end_matches('-');
    format!("{}{}", trimmed, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Hello World"), "hello-world");
    }

    #[test]
    fn test_slugify_collapses_punctuation() {
        assert_eq!(slugify("  Rust -- & Tokio!!  "), "rust-tokio");
    }

    #[test]
    fn test_slugify_drops_non_ascii() {
        assert_eq!(slugify("Café Noir"), "caf-noir");
    }

    #[test]
    fn test_slugify_empty_for_symbols_only() {
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_slugify_truncates_without_trailing_dash() {
        let long = "a".repeat(199) + " bcd";
        let slug = slugify(&long);
        assert!(slug.len() <= SLUG_MAX_LENGTH);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn test_validate_slug_accepts_canonical() {
        assert!(validate_slug("engineering-team-2").is_ok());
    }

    #[test]
    fn test_validate_slug_rejects_uppercase() {
        assert!(matches!(
            validate_slug("Engineering"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_validate_slug_rejects_double_hyphen() {
        assert!(validate_slug("a--b").is_err());
        assert!(validate_slug("-a").is_err());
        assert!(validate_slug("a-").is_err());
    }

    #[test]
    fn test_validate_slug_rejects_empty() {
        assert!(validate_slug("").is_err());
    }

    #[test]
    fn test_resolve_slug_prefers_explicit() {
        assert_eq!(resolve_slug(Some("custom"), "Title").unwrap(), "custom");
    }

    #[test]
    fn test_resolve_slug_derives_from_source() {
        assert_eq!(resolve_slug(None, "My First Post").unwrap(), "my-first-post");
    }

    #[test]
    fn test_resolve_slug_fails_when_underivable() {
        assert!(resolve_slug(None, "???").is_err());
    }

    #[test]
    fn test_with_suffix() {
        assert_eq!(with_suffix("hello", 2), "hello-2");
        let long = "a".repeat(SLUG_MAX_LENGTH);
        let suffixed = with_suffix(&long, 12);
        assert!(suffixed.len() <= SLUG_MAX_LENGTH);
        assert!(suffixed.ends_with("-12"));
    }
}
