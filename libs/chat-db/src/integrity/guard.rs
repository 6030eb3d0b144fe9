//! Transactional guard.
//!
//! Runs a unit of work on a session-owned transaction. Every failure path
//! rolls back first and then surfaces a [`DomainError`]; raw storage errors
//! never escape. The guard never commits.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use sea_orm::DbErr;
use tracing::{debug, error};

use super::classify::classify;
use super::error::DomainError;
use super::extract::extract_columns;
use super::mapper::map_to_domain_error;
use super::violation::{Dialect, RawViolation};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Entity and operation labels for messages and logs.
#[derive(Clone, Copy, Debug)]
pub struct GuardScope<'a> {
    pub entity: &'a str,
    pub operation: &'a str,
}

impl<'a> GuardScope<'a> {
    pub fn new(entity: &'a str, operation: &'a str) -> Self {
        Self { entity, operation }
    }

    /// Entity name used in client messages.
    pub fn model(&self) -> &'a str {
        if self.entity.is_empty() {
            "Record"
        } else {
            self.entity
        }
    }
}

/// A request-scoped session owning at most one open transaction.
#[async_trait]
pub trait TxSession: Send {
    type Conn: Send + Sync;

    fn dialect(&self) -> Dialect;

    /// Connection for the current transaction, beginning one if needed.
    async fn conn(&mut self) -> anyhow::Result<&Self::Conn>;

    /// Roll back the open transaction, if any.
    async fn rollback(&mut self) -> anyhow::Result<()>;
}

/// Run `work` under the guard.
///
/// On success the value is returned untouched and the transaction stays open
/// for the caller to commit. On failure the transaction is rolled back and
/// the error is translated:
/// * a [`DomainError`] raised by `work` passes through unchanged;
/// * an integrity violation anywhere in the error chain is classified and
///   mapped;
/// * anything else becomes an unknown-integrity error wrapping the original.
pub async fn run_guarded<S, T, F>(
    session: &mut S,
    scope: GuardScope<'_>,
    work: F,
) -> Result<T, DomainError>
where
    S: TxSession,
    T: Send,
    F: for<'c> FnOnce(&'c S::Conn) -> BoxFuture<'c, anyhow::Result<T>> + Send,
{
    let outcome = match session.conn().await {
        Ok(conn) => work(conn).await,
        Err(e) => Err(e.context("failed to begin transaction")),
    };

    let err = match outcome {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };

    if let Err(rollback_err) = session.rollback().await {
        error!(
            model = scope.model(),
            operation = scope.operation,
            error = ?rollback_err,
            "guard.rollback_failed"
        );
    }

    Err(translate(err, session.dialect(), &scope))
}

/// Map a failed unit of work to the error the caller sees.
pub fn translate(err: anyhow::Error, dialect: Dialect, scope: &GuardScope<'_>) -> DomainError {
    let err = match err.downcast::<DomainError>() {
        Ok(domain) => {
            debug!(
                model = scope.model(),
                operation = scope.operation,
                kind = ?domain.kind(),
                "guard.domain_error"
            );
            return domain;
        }
        Err(err) => err,
    };

    if let Some(violation) = find_violation(&err, dialect) {
        let classification = classify(&violation);
        let columns = extract_columns(&violation.message);
        return map_to_domain_error(classification, columns, scope, &violation.message)
            .with_source(err);
    }

    error!(
        model = scope.model(),
        operation = scope.operation,
        error = ?err,
        "guard.unexpected_failure"
    );
    let target = if scope.entity.is_empty() {
        "database"
    } else {
        scope.entity
    };
    DomainError::unknown_integrity(format!("Failed to operate on {target}")).with_source(err)
}

fn find_violation(err: &anyhow::Error, dialect: Dialect) -> Option<RawViolation> {
    err.chain().find_map(|cause| {
        if let Some(db_err) = cause.downcast_ref::<DbErr>() {
            return RawViolation::from_db_err(db_err, dialect);
        }
        cause.downcast_ref::<RawViolation>().cloned()
    })
}
