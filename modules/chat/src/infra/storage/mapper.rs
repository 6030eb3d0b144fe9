use anyhow::Context;

use crate::contract::model::{Conversation, Message, MessageRole, User};
use crate::infra::storage::entity::{conversation, message, user};

/// Convert a database entity to a contract model
pub fn entity_to_contract(entity: user::Model) -> User {
    User {
        id: entity.id,
        username: entity.username,
        email: entity.email,
        hashed_password: entity.hashed_password,
        is_active: entity.is_active,
        created_at: entity.created_at,
        updated_at: entity.updated_at,
    }
}

impl From<user::Model> for User {
    fn from(entity: user::Model) -> Self {
        entity_to_contract(entity)
    }
}

impl From<conversation::Model> for Conversation {
    fn from(entity: conversation::Model) -> Self {
        Conversation {
            id: entity.id,
            user_id: entity.user_id,
            title: entity.title,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}

impl TryFrom<message::Model> for Message {
    type Error = anyhow::Error;

    fn try_from(entity: message::Model) -> Result<Self, Self::Error> {
        let role: MessageRole = entity
            .role
            .parse()
            .with_context(|| format!("message {} has an unreadable role", entity.id))?;
        Ok(Message {
            id: entity.id,
            conversation_id: entity.conversation_id,
            role,
            content: entity.content,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        })
    }
}

pub fn messages_to_contract(entities: Vec<message::Model>) -> anyhow::Result<Vec<Message>> {
    entities.into_iter().map(Message::try_from).collect()
}
