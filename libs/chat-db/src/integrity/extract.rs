//! Best-effort recovery of offending column names from driver messages.
//!
//! Returns `None` whenever nothing could be recovered; callers must treat
//! the result as a hint, never as authoritative.

use once_cell::sync::Lazy;
use regex::Regex;

/// Postgres: `null value in column "username" of relation "users" ...`
static PG_NULL_COLUMN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)null value in column "([^"]+)""#).expect("valid regex"));

/// Postgres DETAIL: `Key (user_id, slug)=(1, a) already exists.`
static PG_KEY_COLUMNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)key \(([^)]+)\)=").expect("valid regex"));

/// SQLite: `UNIQUE constraint failed: users.email, users.tenant`
static SQLITE_FAILED_COLUMNS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:unique|not null) constraint failed: ([^\n]+)").expect("valid regex")
});

/// MySQL: `Duplicate entry 'x' for key 'users.idx_email'`
static MYSQL_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)for key '?([^'\s]+)'?").expect("valid regex"));

/// Pull column names out of a raw integrity message.
///
/// MySQL only names the index, so its key name is returned verbatim as a
/// single-element list.
pub fn extract_columns(message: &str) -> Option<Vec<String>> {
    if message.is_empty() {
        return None;
    }

    if let Some(caps) = PG_NULL_COLUMN.captures(message) {
        return Some(vec![caps[1].to_owned()]);
    }

    if let Some(caps) = PG_KEY_COLUMNS.captures(message) {
        return non_empty(
            caps[1]
                .split(',')
                .map(|c| c.trim().trim_matches('"').to_owned())
                .collect(),
        );
    }

    if let Some(caps) = SQLITE_FAILED_COLUMNS.captures(message) {
        return non_empty(
            caps[1]
                .split(',')
                .map(|c| {
                    let c = c.trim();
                    c.rsplit('.').next().unwrap_or(c).to_owned()
                })
                .collect(),
        );
    }

    if let Some(caps) = MYSQL_KEY.captures(message) {
        return Some(vec![caps[1].to_owned()]);
    }

    None
}

fn non_empty(cols: Vec<String>) -> Option<Vec<String>> {
    let cols: Vec<String> = cols.into_iter().filter(|c| !c.is_empty()).collect();
    if cols.is_empty() {
        None
    } else {
        Some(cols)
    }
}
