//! Classification → [`DomainError`].
//!
//! Messages are built from the entity name, the recovered columns and the
//! constraint name only; driver text is never echoed back to clients and is
//! logged at debug level exclusively.

use tracing::{debug, info, warn};

use super::error::DomainError;
use super::guard::GuardScope;
use super::taxonomy::{Classification, ConstraintVariant};

/// Build the domain error for a classified violation. Never fails.
pub fn map_to_domain_error(
    classification: Classification,
    columns: Option<Vec<String>>,
    scope: &GuardScope<'_>,
    raw: &str,
) -> DomainError {
    let Classification {
        variant,
        constraint,
    } = classification;
    let model = scope.model();
    let operation = scope.operation;
    let fields = columns.filter(|c| !c.is_empty());
    let joined = fields.as_ref().map(|f| f.join(", "));

    debug!(
        model,
        operation,
        variant = %variant,
        raw,
        "mapper.raw_violation"
    );

    let err = match variant {
        ConstraintVariant::Unique => {
            info!(
                model,
                operation,
                fields = ?fields,
                constraint = ?constraint,
                variant = %variant,
                "mapper.duplicate_detected"
            );
            let message = match (&joined, &constraint) {
                (Some(cols), _) => format!("{model} already exists for field(s): {cols}"),
                (None, Some(c)) => format!("{model} already exists (constraint: {c})"),
                (None, None) => format!("{model} already exists (unique constraint)"),
            };
            DomainError::duplicate(message)
        }
        ConstraintVariant::NotNull => {
            info!(
                model,
                operation,
                fields = ?fields,
                constraint = ?constraint,
                variant = %variant,
                "mapper.not_null_violation"
            );
            let message = match (&joined, &constraint) {
                (Some(cols), _) => format!("Missing required field(s): {cols} for {model}"),
                (None, Some(c)) => format!("Missing required field for {model} (constraint: {c})"),
                (None, None) => format!("Missing required field for {model}"),
            };
            DomainError::missing_field(message)
        }
        ConstraintVariant::ForeignKey => {
            info!(
                model,
                operation,
                fields = ?fields,
                constraint = ?constraint,
                variant = %variant,
                "mapper.foreign_key_violation"
            );
            let message = match (&joined, &constraint) {
                (Some(cols), _) => {
                    format!("{model} referenced entity not found for field(s): {cols}")
                }
                (None, Some(c)) => format!("{model} foreign key violation (constraint: {c})"),
                (None, None) => format!("{model} foreign key constraint violated"),
            };
            DomainError::reference(message)
        }
        ConstraintVariant::Check => {
            warn!(
                model,
                operation,
                constraint = ?constraint,
                variant = %variant,
                "mapper.check_constraint_failure"
            );
            return with_constraint(
                DomainError::business_rule(format!(
                    "{model} business rule violated (check constraint)."
                )),
                constraint,
            );
        }
        ConstraintVariant::Unknown => {
            warn!(
                model,
                operation,
                constraint = ?constraint,
                variant = %variant,
                "mapper.unknown_integrity_error"
            );
            return with_constraint(
                DomainError::unknown_integrity(format!("{model} database integrity error.")),
                constraint,
            );
        }
    };

    let err = match fields {
        Some(fields) => err.with_fields(fields),
        None => err,
    };
    with_constraint(err, constraint)
}

fn with_constraint(err: DomainError, constraint: Option<String>) -> DomainError {
    match constraint {
        Some(c) => err.with_constraint(c),
        None => err,
    }
}
