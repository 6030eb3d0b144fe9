use chat_db::{DbSession, DomainError, GuardScope};
use chrono::Utc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::check_page;
use crate::contract::model::{Message, MessageRole, NewMessage};
use crate::infra::storage::entity::conversation;
use crate::infra::storage::entity::message::{self, NewMessageEntity};
use crate::infra::storage::mapper::messages_to_contract;

const ENTITY: &str = "Message";

fn scope(operation: &'static str) -> GuardScope<'static> {
    GuardScope::new(ENTITY, operation)
}

pub struct MessageRepository<'s> {
    session: &'s mut DbSession,
}

impl<'s> MessageRepository<'s> {
    pub fn new(session: &'s mut DbSession) -> Self {
        Self { session }
    }

    /// Append a message and mark the conversation as active.
    ///
    /// Content is trimmed; blank content is rejected by the store's check
    /// constraint.
    #[instrument(
        skip(self, new_message),
        fields(conversation_id = %new_message.conversation_id, role = %new_message.role)
    )]
    pub async fn create_message(&mut self, new_message: NewMessage) -> Result<Message, DomainError> {
        info!("Creating new message");
        let conversation_id = new_message.conversation_id;

        let parent_exists = self
            .session
            .guarded(scope("create"), move |tx| {
                Box::pin(async move { Ok(conversation::exists(tx, conversation_id).await?) })
            })
            .await?;
        if !parent_exists {
            return Err(DomainError::not_found(format!(
                "Conversation with ID {conversation_id} not found"
            )));
        }

        let now = Utc::now();
        let entity = NewMessageEntity {
            id: Uuid::new_v4(),
            conversation_id,
            role: new_message.role.as_str().to_owned(),
            content: new_message.content.trim().to_owned(),
            created_at: now,
        };
        let created = self
            .session
            .guarded(scope("create"), move |tx| {
                Box::pin(async move {
                    let created = message::create(tx, entity).await?;
                    conversation::touch(tx, conversation_id, now).await?;
                    Message::try_from(created)
                })
            })
            .await?;

        info!(id = %created.id, "repo.create.success");
        Ok(created)
    }

    /// Messages in the order they were written.
    pub async fn get_conversation_messages(
        &mut self,
        conversation_id: Uuid,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<Message>, DomainError> {
        check_page(limit)?;
        let messages = self
            .session
            .guarded(scope("list"), move |tx| {
                Box::pin(async move {
                    let rows =
                        message::find_by_conversation_paginated(tx, conversation_id, skip, limit)
                            .await?;
                    messages_to_contract(rows)
                })
            })
            .await?;
        debug!(%conversation_id, count = messages.len(), "Retrieved conversation messages");
        Ok(messages)
    }

    pub async fn get_latest_message(
        &mut self,
        conversation_id: Uuid,
    ) -> Result<Option<Message>, DomainError> {
        self.session
            .guarded(scope("get"), move |tx| {
                Box::pin(async move {
                    message::find_latest(tx, conversation_id)
                        .await?
                        .map(Message::try_from)
                        .transpose()
                })
            })
            .await
    }

    pub async fn count_conversation_messages(
        &mut self,
        conversation_id: Uuid,
    ) -> Result<u64, DomainError> {
        self.session
            .guarded(scope("count"), move |tx| {
                Box::pin(async move {
                    Ok(message::count_by_conversation(tx, conversation_id).await?)
                })
            })
            .await
    }

    pub async fn count_messages_by_role(
        &mut self,
        conversation_id: Uuid,
        role: MessageRole,
    ) -> Result<u64, DomainError> {
        self.session
            .guarded(scope("count"), move |tx| {
                Box::pin(async move {
                    Ok(message::count_by_role(tx, conversation_id, role.as_str()).await?)
                })
            })
            .await
    }

    pub async fn update_message_content(
        &mut self,
        id: Uuid,
        content: &str,
    ) -> Result<Option<Message>, DomainError> {
        info!(message_id = %id, "Updating message content");
        let content = content.trim().to_owned();
        self.session
            .guarded(scope("update"), move |tx| {
                Box::pin(async move {
                    message::update_content(tx, id, content)
                        .await?
                        .map(Message::try_from)
                        .transpose()
                })
            })
            .await
    }

    /// Remove every message of a conversation; returns how many went.
    pub async fn delete_conversation_messages(
        &mut self,
        conversation_id: Uuid,
    ) -> Result<u64, DomainError> {
        let deleted = self
            .session
            .guarded(scope("delete"), move |tx| {
                Box::pin(async move {
                    Ok(message::delete_by_conversation(tx, conversation_id).await?)
                })
            })
            .await?;
        info!(%conversation_id, deleted, "Deleted conversation messages");
        Ok(deleted)
    }
}
