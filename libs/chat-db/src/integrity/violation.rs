//! Raw integrity violations as surfaced by the storage driver.
//!
//! A [`RawViolation`] is a driver-neutral snapshot of the failing statement's
//! diagnostics: an optional structured code, an optional constraint name and
//! the human-readable message. It lives only for the duration of one failed
//! unit of work.

use std::fmt;

use sea_orm::{DatabaseBackend, DbErr};
use thiserror::Error;

/// SQL dialect a violation came from. Selects the diagnostic-code table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    Postgres,
    MySql,
    Sqlite,
    #[default]
    Unknown,
}

impl Dialect {
    #[allow(unreachable_patterns)]
    pub fn from_backend(backend: DatabaseBackend) -> Self {
        match backend {
            DatabaseBackend::Postgres => Dialect::Postgres,
            DatabaseBackend::MySql => Dialect::MySql,
            DatabaseBackend::Sqlite => Dialect::Sqlite,
            _ => Dialect::Unknown,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
            Dialect::Sqlite => "sqlite",
            Dialect::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{dialect} integrity violation: {message}")]
pub struct RawViolation {
    pub dialect: Dialect,
    /// Structured diagnostic code (SQLSTATE, SQLite extended code, MySQL error number).
    pub code: Option<String>,
    pub constraint: Option<String>,
    pub message: String,
}

impl RawViolation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            dialect: Dialect::Unknown,
            code: None,
            constraint: None,
            message: message.into(),
        }
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = Some(constraint.into());
        self
    }

    /// Extract an integrity violation from a SeaORM error.
    ///
    /// Returns `None` when the error is not a database-reported constraint
    /// failure (connection problems, decoding errors, syntax errors, ...).
    #[cfg(any(feature = "pg", feature = "mysql", feature = "sqlite"))]
    pub fn from_db_err(err: &DbErr, dialect: Dialect) -> Option<Self> {
        let db_err = database_error(err)?;
        if !is_integrity_violation(db_err, dialect) {
            return None;
        }

        Some(Self {
            dialect,
            code: diagnostic_code(db_err, dialect),
            constraint: db_err.constraint().map(str::to_owned),
            message: full_message(db_err),
        })
    }

    #[cfg(not(any(feature = "pg", feature = "mysql", feature = "sqlite")))]
    pub fn from_db_err(_err: &DbErr, _dialect: Dialect) -> Option<Self> {
        None
    }
}

// ===================== sqlx plumbing =====================

#[cfg(any(feature = "pg", feature = "mysql", feature = "sqlite"))]
use sqlx::error::{DatabaseError, ErrorKind};

#[cfg(any(feature = "pg", feature = "mysql", feature = "sqlite"))]
fn database_error(err: &DbErr) -> Option<&(dyn DatabaseError + 'static)> {
    use sea_orm::RuntimeErr;

    match err {
        DbErr::Exec(RuntimeErr::SqlxError(e))
        | DbErr::Query(RuntimeErr::SqlxError(e))
        | DbErr::Conn(RuntimeErr::SqlxError(e)) => e.as_database_error(),
        _ => None,
    }
}

/// SQLITE_CONSTRAINT primary result code; extended codes keep it in the low byte.
#[cfg(any(feature = "pg", feature = "mysql", feature = "sqlite"))]
const SQLITE_CONSTRAINT: i32 = 19;

#[cfg(any(feature = "pg", feature = "mysql", feature = "sqlite"))]
fn is_integrity_violation(db_err: &(dyn DatabaseError + 'static), dialect: Dialect) -> bool {
    if !matches!(db_err.kind(), ErrorKind::Other) {
        return true;
    }
    let Some(code) = db_err.code() else {
        return false;
    };
    match dialect {
        Dialect::Sqlite => code
            .parse::<i32>()
            .map(|c| c & 0xff == SQLITE_CONSTRAINT)
            .unwrap_or(false),
        // SQLSTATE class 23: integrity constraint violation
        _ => code.starts_with("23"),
    }
}

#[cfg(any(feature = "pg", feature = "mysql", feature = "sqlite"))]
fn diagnostic_code(db_err: &(dyn DatabaseError + 'static), dialect: Dialect) -> Option<String> {
    match dialect {
        // MySQL reports the ambiguous SQLSTATE 23000 for every constraint; only
        // the server error number tells them apart.
        Dialect::MySql => mysql_error_number(db_err),
        // A bare SQLITE_CONSTRAINT says nothing about the category; leave it
        // to the message scan.
        Dialect::Sqlite => db_err
            .code()
            .filter(|c| c.parse::<i32>().ok() != Some(SQLITE_CONSTRAINT))
            .map(|c| c.into_owned()),
        _ => db_err.code().map(|c| c.into_owned()),
    }
}

#[cfg(feature = "mysql")]
fn mysql_error_number(db_err: &(dyn DatabaseError + 'static)) -> Option<String> {
    db_err
        .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
        .map(|e| e.number().to_string())
}

#[cfg(all(not(feature = "mysql"), any(feature = "pg", feature = "sqlite")))]
fn mysql_error_number(_db_err: &(dyn DatabaseError + 'static)) -> Option<String> {
    None
}

/// Primary message, plus the Postgres DETAIL line when the server sent one
/// (that is where `Key (col)=(...)` lives).
#[cfg(any(feature = "pg", feature = "mysql", feature = "sqlite"))]
fn full_message(db_err: &(dyn DatabaseError + 'static)) -> String {
    let message = db_err.message();
    match postgres_detail(db_err) {
        Some(detail) => format!("{message}\nDETAIL:  {detail}"),
        None => message.to_owned(),
    }
}

#[cfg(feature = "pg")]
fn postgres_detail<'a>(db_err: &'a (dyn DatabaseError + 'static)) -> Option<&'a str> {
    db_err
        .try_downcast_ref::<sqlx::postgres::PgDatabaseError>()
        .and_then(|pg| pg.detail())
}

#[cfg(all(not(feature = "pg"), any(feature = "mysql", feature = "sqlite")))]
fn postgres_detail<'a>(_db_err: &'a (dyn DatabaseError + 'static)) -> Option<&'a str> {
    None
}
