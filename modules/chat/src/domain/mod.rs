//! Repositories over a borrowed [`DbSession`](chat_db::DbSession).
//!
//! Each repository runs its statements through `DbSession::guarded`, so a
//! failing write rolls the session back and surfaces as a
//! [`DomainError`](chat_db::DomainError). Pre-checks that only read (unique
//! conflicts, parent existence) return their error outside the guard and leave
//! the session's pending work alone.

mod conversations;
mod messages;
mod sensitive;
mod users;

pub use conversations::ConversationRepository;
pub use messages::MessageRepository;
pub use sensitive::{mask_sensitive, MASK, SENSITIVE_KEYS};
pub use users::UserRepository;

use chat_db::DomainError;

/// Largest page any list operation returns.
pub const MAX_PAGE_SIZE: u64 = 1000;

fn check_page(limit: u64) -> Result<(), DomainError> {
    if limit == 0 || limit > MAX_PAGE_SIZE {
        return Err(DomainError::invalid_input(format!(
            "limit must be between 1 and {MAX_PAGE_SIZE}"
        ))
        .with_fields(["limit"]));
    }
    Ok(())
}
