//! Heuristic classification of integrity violations across dialects.
//!
//! Structured diagnostic codes are consulted first and always win. Message
//! text is only scanned when the driver gave no code, with a fixed category
//! priority: unique, not-null, foreign key, check.

use tracing::{debug, warn};

use super::taxonomy::{Classification, ConstraintVariant};
use super::violation::{Dialect, RawViolation};

use ConstraintVariant::{Check, ForeignKey, NotNull, Unique};

type CodeTable = &'static [(&'static str, ConstraintVariant)];

/// Postgres SQLSTATE codes (class 23).
static POSTGRES_CODES: CodeTable = &[
    ("23505", Unique),
    ("23502", NotNull),
    ("23503", ForeignKey),
    ("23514", Check),
];

/// SQLite extended result codes.
static SQLITE_CODES: CodeTable = &[
    ("2067", Unique),     // SQLITE_CONSTRAINT_UNIQUE
    ("1555", Unique),     // SQLITE_CONSTRAINT_PRIMARYKEY
    ("1299", NotNull),    // SQLITE_CONSTRAINT_NOTNULL
    ("787", ForeignKey),  // SQLITE_CONSTRAINT_FOREIGNKEY
    ("275", Check),       // SQLITE_CONSTRAINT_CHECK
];

/// MySQL server error numbers.
static MYSQL_CODES: CodeTable = &[
    ("1062", Unique),     // ER_DUP_ENTRY
    ("1586", Unique),     // ER_DUP_ENTRY_WITH_KEY_NAME
    ("1048", NotNull),    // ER_BAD_NULL_ERROR
    ("1364", NotNull),    // ER_NO_DEFAULT_FOR_FIELD
    ("1451", ForeignKey), // ER_ROW_IS_REFERENCED_2
    ("1452", ForeignKey), // ER_NO_REFERENCED_ROW_2
    ("3819", Check),      // ER_CHECK_CONSTRAINT_VIOLATED
];

/// Message keywords per category, scanned in this order. Lowercase.
static MESSAGE_KEYWORDS: &[(ConstraintVariant, &[&str])] = &[
    (
        Unique,
        &[
            "unique constraint",
            "unique failed",
            "unique violation",
            "duplicate",
        ],
    ),
    (
        NotNull,
        &[
            "not null constraint",
            "not null",
            "null value in column",
            "cannot be null",
        ],
    ),
    (
        ForeignKey,
        &[
            "foreign key constraint",
            "foreign key",
            "is not present in table",
        ],
    ),
    (Check, &["check constraint", "check failed"]),
];

fn code_table(dialect: Dialect) -> CodeTable {
    match dialect {
        Dialect::Postgres | Dialect::Unknown => POSTGRES_CODES,
        Dialect::Sqlite => SQLITE_CODES,
        Dialect::MySql => MYSQL_CODES,
    }
}

/// Look a diagnostic code up in the dialect's table.
pub fn variant_for_code(dialect: Dialect, code: &str) -> Option<ConstraintVariant> {
    code_table(dialect)
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, v)| *v)
}

/// Match message text against the keyword table; first category wins.
pub fn variant_for_message(message: &str) -> Option<ConstraintVariant> {
    let normalized = message.to_lowercase();
    MESSAGE_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| normalized.contains(k)))
        .map(|(variant, _)| *variant)
}

/// Classify a violation. Pure apart from logging; never fails.
pub fn classify(violation: &RawViolation) -> Classification {
    let constraint = violation.constraint.clone();

    if let Some(code) = violation.code.as_deref() {
        return match variant_for_code(violation.dialect, code) {
            Some(variant) => Classification::new(variant, constraint),
            None => {
                warn!(
                    code,
                    dialect = %violation.dialect,
                    constraint = ?constraint,
                    "classifier: unknown diagnostic code"
                );
                Classification::new(ConstraintVariant::Unknown, constraint)
            }
        };
    }

    match variant_for_message(&violation.message) {
        Some(variant) => Classification::new(variant, constraint),
        None => {
            debug!(
                raw = %violation.message,
                dialect = %violation.dialect,
                "classifier: unmatched integrity message"
            );
            Classification::new(ConstraintVariant::Unknown, constraint)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn pg(code: &str) -> RawViolation {
        RawViolation::new("")
            .with_dialect(Dialect::Postgres)
            .with_code(code)
    }

    #[test]
    fn postgres_codes_map_to_variants() {
        assert_eq!(classify(&pg("23505")).variant, Unique);
        assert_eq!(classify(&pg("23502")).variant, NotNull);
        assert_eq!(classify(&pg("23503")).variant, ForeignKey);
        assert_eq!(classify(&pg("23514")).variant, Check);
    }

    #[test]
    fn constraint_name_comes_from_diagnostics() {
        let v = pg("23505").with_constraint("users_email_key");
        assert_eq!(
            classify(&v),
            Classification::new(Unique, Some("users_email_key".into()))
        );
    }

    #[test]
    fn sqlite_and_mysql_codes() {
        let sqlite = |code: &str| {
            RawViolation::new("")
                .with_dialect(Dialect::Sqlite)
                .with_code(code)
        };
        assert_eq!(classify(&sqlite("2067")).variant, Unique);
        assert_eq!(classify(&sqlite("1555")).variant, Unique);
        assert_eq!(classify(&sqlite("1299")).variant, NotNull);
        assert_eq!(classify(&sqlite("787")).variant, ForeignKey);
        assert_eq!(classify(&sqlite("275")).variant, Check);

        let mysql = |code: &str| {
            RawViolation::new("")
                .with_dialect(Dialect::MySql)
                .with_code(code)
        };
        assert_eq!(classify(&mysql("1062")).variant, Unique);
        assert_eq!(classify(&mysql("1048")).variant, NotNull);
        assert_eq!(classify(&mysql("1452")).variant, ForeignKey);
        assert_eq!(classify(&mysql("3819")).variant, Check);
    }

    #[test]
    fn code_tables_are_per_dialect() {
        // A SQLite code means nothing to Postgres.
        assert_eq!(variant_for_code(Dialect::Postgres, "2067"), None);
        assert_eq!(variant_for_code(Dialect::Sqlite, "23505"), None);
        // Unknown dialect falls back to SQLSTATE.
        assert_eq!(variant_for_code(Dialect::Unknown, "23505"), Some(Unique));
    }

    #[test]
    fn code_wins_over_message() {
        let v = pg("23514").with_constraint("messages_content_not_empty");
        let v = RawViolation {
            message: "duplicate key value violates unique constraint".into(),
            ..v
        };
        assert_eq!(classify(&v).variant, Check);
    }

    #[traced_test]
    #[test]
    fn unknown_code_degrades_and_warns() {
        let v = pg("99999").with_constraint("weird");
        let c = classify(&v);
        assert_eq!(c.variant, ConstraintVariant::Unknown);
        assert_eq!(c.constraint.as_deref(), Some("weird"));
        assert!(logs_contain("classifier: unknown diagnostic code"));
        assert!(logs_contain("99999"));
    }

    #[test]
    fn message_fallback_by_dialect_text() {
        let cases = [
            ("UNIQUE constraint failed: users.email", Unique),
            (
                "duplicate key value violates unique constraint \"users_email_key\"",
                Unique,
            ),
            ("Duplicate entry 'a@b.c' for key 'idx_users_email'", Unique),
            ("NOT NULL constraint failed: users.username", NotNull),
            (
                "null value in column \"username\" violates not-null constraint",
                NotNull,
            ),
            ("Column 'username' cannot be null", NotNull),
            ("FOREIGN KEY constraint failed", ForeignKey),
            (
                "Key (user_id)=(42) is not present in table \"users\".",
                ForeignKey,
            ),
            ("CHECK constraint failed: content_not_empty", Check),
        ];
        for (message, expected) in cases {
            let c = classify(&RawViolation::new(message));
            assert_eq!(c.variant, expected, "message: {message}");
            assert_eq!(c.constraint, None);
        }
    }

    #[test]
    fn keyword_priority_is_fixed() {
        // Mentions both unique and check: unique is scanned first.
        let v = RawViolation::new("CHECK constraint failed: unique constraint on slug");
        assert_eq!(classify(&v).variant, Unique);

        // not null beats foreign key
        let v = RawViolation::new("foreign key column is not null");
        assert_eq!(classify(&v).variant, NotNull);
    }

    #[traced_test]
    #[test]
    fn unmatched_message_is_unknown_and_only_debug_logged() {
        let v = RawViolation::new("disk I/O error while writing page 7");
        let c = classify(&v);
        assert_eq!(c, Classification::new(ConstraintVariant::Unknown, None));
        assert!(logs_contain("classifier: unmatched integrity message"));
        logs_assert(|lines: &[&str]| {
            if lines.iter().any(|l| l.contains(" WARN ")) {
                Err("unmatched message must not be logged at warn".into())
            } else {
                Ok(())
            }
        });
    }

    #[test]
    fn classification_is_idempotent() {
        let v = RawViolation::new("UNIQUE constraint failed: users.email")
            .with_constraint("users_email_key");
        let first = classify(&v);
        for _ in 0..5 {
            assert_eq!(classify(&v), first);
        }
    }
}
