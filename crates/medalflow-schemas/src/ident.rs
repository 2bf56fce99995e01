//! SQL identifier validation.
//!
//! Whitelist-first: an identifier must match the allowed pattern, and is
//! additionally screened against known injection fragments. Both checks run
//! at operation construction time so nothing downstream has to re-validate.

use medalflow_error::{ErrorCode, FlowError, FlowResult};
use once_cell::sync::Lazy;
use regex::Regex;

pub const MAX_IDENTIFIER_LENGTH: usize = 128;

static IDENTIFIER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_$#@]*$").expect("identifier pattern"));

static DANGEROUS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r";\s*DROP",
        r";\s*DELETE",
        r";\s*UPDATE",
        r";\s*INSERT",
        r"--",
        r"/\*",
        r"\*/",
        r"UNION\s+SELECT",
        r"OR\s+1\s*=\s*1",
        r"OR\s+'1'\s*=\s*'1'",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("dangerous pattern"))
    .collect()
});

/// Validate a SQL identifier, naming the offending field in the error.
pub fn validate_identifier(value: &str, field: &str) -> FlowResult<()> {
    if value.is_empty() {
        return Err(invalid(field, value, format!("{field} cannot be empty")));
    }
    if value.len() > MAX_IDENTIFIER_LENGTH {
        return Err(invalid(
            field,
            value,
            format!("{field} too long: maximum {MAX_IDENTIFIER_LENGTH} characters"),
        ));
    }
    let upper = value.to_uppercase();
    if DANGEROUS_PATTERNS.iter().any(|p| p.is_match(&upper)) {
        return Err(invalid(
            field,
            value,
            format!("potentially dangerous {field}: '{value}'"),
        ));
    }
    if !IDENTIFIER_PATTERN.is_match(value) {
        return Err(invalid(
            field,
            value,
            format!(
                "invalid {field}: '{value}'. Must start with letter or underscore, and contain \
                 only alphanumeric, underscore, $, #, or @ characters."
            ),
        ));
    }
    Ok(())
}

fn invalid(field: &str, value: &str, message: String) -> FlowError {
    FlowError::new(ErrorCode::InvalidIdentifier, message)
        .with_detail("field", field)
        .with_detail("value", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        for ident in ["customers", "_stage", "DimProduct", "t$1", "a#b", "x@y", "A1_"] {
            assert!(validate_identifier(ident, "object_name").is_ok(), "{ident}");
        }
    }

    #[test]
    fn rejects_injection_fragments() {
        for ident in [
            "x;drop table t",
            "a--b",
            "a/*b*/",
            "x union select 1",
            "y or 1=1",
            "y or '1'='1'",
        ] {
            assert!(validate_identifier(ident, "object_name").is_err(), "{ident}");
        }
    }

    #[test]
    fn rejects_shape_violations() {
        assert!(validate_identifier("", "schema_name").is_err());
        assert!(validate_identifier("1abc", "schema_name").is_err());
        assert!(validate_identifier("a b", "schema_name").is_err());
        assert!(validate_identifier("a.b", "schema_name").is_err());
        assert!(validate_identifier(&"a".repeat(129), "schema_name").is_err());
        assert!(validate_identifier(&"a".repeat(128), "schema_name").is_ok());
    }

    #[test]
    fn error_carries_field_and_value() {
        let err = validate_identifier("bad name", "schema_name").unwrap_err();
        assert_eq!(err.code(), medalflow_error::ErrorCode::InvalidIdentifier);
        assert_eq!(err.details()["field"], "schema_name");
        assert_eq!(err.details()["value"], "bad name");
    }
}
