//! Input validation for statement construction
//!
//! Table names end up interpolated into `TRUNCATE`, `INSERT`, `COPY` and
//! `SELECT COUNT(*)` statements, so they are checked against a strict
//! identifier grammar before any statement is issued. String values embedded
//! in the `COPY` statement are quoted as SQL literals.

use crate::constants::MAX_IDENTIFIER_LENGTH;
use crate::error::{EtlError, Result};

/// Validates a table name of the form `table` or `schema.table`
pub fn validate_table_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(EtlError::config("Table name must not be empty"));
    }

    let segments: Vec<&str> = name.split('.').collect();
    if segments.len() > 2 {
        return Err(EtlError::config(format!(
            "Table name '{name}' has too many qualifiers (max: schema.table)"
        )));
    }

    for segment in segments {
        validate_identifier_segment(name, segment)?;
    }

    Ok(())
}

fn validate_identifier_segment(full_name: &str, segment: &str) -> Result<()> {
    if segment.len() > MAX_IDENTIFIER_LENGTH {
        return Err(EtlError::config(format!(
            "Identifier '{segment}' too long: {} bytes (max: {MAX_IDENTIFIER_LENGTH})",
            segment.len()
        )));
    }

    let mut chars = segment.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => {
            return Err(EtlError::config(format!(
                "Invalid table name '{full_name}': identifiers must start with a letter or underscore"
            )))
        }
    }

    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$') {
        return Err(EtlError::config(format!(
            "Invalid table name '{full_name}': only letters, digits, '_' and '$' are allowed"
        )));
    }

    Ok(())
}

/// Escape a value for use inside a single-quoted SQL literal
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_and_qualified_names() {
        assert!(validate_table_name("songplays").is_ok());
        assert!(validate_table_name("public.staging_events").is_ok());
        assert!(validate_table_name("_tmp$1").is_ok());
    }

    #[test]
    fn test_rejects_injection_attempts() {
        for name in [
            "songs; DROP TABLE users",
            "songs--",
            "1songs",
            "a.b.c",
            "",
            "songs ",
            "\"songs\"",
        ] {
            assert!(
                matches!(validate_table_name(name), Err(EtlError::Config(_))),
                "expected {name:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_rejects_overlong_segment() {
        let name = "a".repeat(MAX_IDENTIFIER_LENGTH + 1);
        assert!(validate_table_name(&name).is_err());
        assert!(validate_table_name(&"a".repeat(MAX_IDENTIFIER_LENGTH)).is_ok());
    }

    #[test]
    fn test_escape_literal_doubles_quotes() {
        assert_eq!(escape_literal("it's"), "it''s");
        assert_eq!(escape_literal("auto"), "auto");
    }
}
