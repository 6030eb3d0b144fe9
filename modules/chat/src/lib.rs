//! Chat store: users, their conversations and the messages in them.
//!
//! Repositories borrow a [`chat_db::DbSession`] and run every statement under
//! the integrity guard, so callers only ever see [`chat_db::DomainError`].
//! Nothing here commits; the caller decides when the session's work is final.

pub mod contract;
pub mod domain;
pub mod infra;

pub use contract::model::{
    Conversation, Message, MessageRole, NewConversation, NewMessage, NewUser, User, UserPatch,
};
pub use domain::{mask_sensitive, ConversationRepository, MessageRepository, UserRepository};
pub use infra::storage::migrations::Migrator;

use chat_db::DbHandle;
use sea_orm_migration::MigratorTrait;
use tracing::info;

/// Bring the schema up to date; a no-op when nothing is pending.
pub async fn migrate(db: &DbHandle) -> anyhow::Result<()> {
    info!(engine = ?db.engine(), "Running chat database migrations");
    Migrator::up(&db.sea(), None).await?;
    info!("Chat database migrations completed successfully");
    Ok(())
}
