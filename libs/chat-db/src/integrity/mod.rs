//! Integrity-violation translation pipeline.
//!
//! `violation` → `classify` → `extract` → `mapper`, driven by `guard`.

pub mod classify;
pub mod error;
pub mod extract;
pub mod guard;
pub mod mapper;
pub mod taxonomy;
pub mod violation;

pub use classify::classify;
pub use error::{status_for_code, DomainError, DomainErrorKind, ErrorPayload};
pub use extract::extract_columns;
pub use guard::{run_guarded, translate, BoxFuture, GuardScope, TxSession};
pub use mapper::map_to_domain_error;
pub use taxonomy::{Classification, ConstraintVariant};
pub use violation::{Dialect, RawViolation};
