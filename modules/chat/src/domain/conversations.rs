use chat_db::{DbSession, DomainError, GuardScope};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::check_page;
use crate::contract::model::{Conversation, NewConversation};
use crate::infra::storage::entity::conversation::{self, NewConversationEntity};
use crate::infra::storage::entity::user;

const ENTITY: &str = "Conversation";

fn scope(operation: &'static str) -> GuardScope<'static> {
    GuardScope::new(ENTITY, operation)
}

/// Blank titles are stored as no title.
fn normalize_title(title: Option<String>) -> Option<String> {
    title
        .map(|t| t.trim().to_owned())
        .filter(|t| !t.is_empty())
}

pub struct ConversationRepository<'s> {
    session: &'s mut DbSession,
}

impl<'s> ConversationRepository<'s> {
    pub fn new(session: &'s mut DbSession) -> Self {
        Self { session }
    }

    /// Start a conversation for an existing user.
    #[instrument(skip(self, new_conversation), fields(user_id = %new_conversation.user_id))]
    pub async fn create_conversation(
        &mut self,
        new_conversation: NewConversation,
    ) -> Result<Conversation, DomainError> {
        info!("Creating new conversation");
        let user_id = new_conversation.user_id;

        let owner_exists = self
            .session
            .guarded(scope("create"), move |tx| {
                Box::pin(async move { Ok(user::find_by_id(tx, user_id).await?.is_some()) })
            })
            .await?;
        if !owner_exists {
            return Err(DomainError::not_found(format!(
                "User with ID {user_id} not found"
            )));
        }

        let entity = NewConversationEntity {
            id: Uuid::new_v4(),
            user_id,
            title: normalize_title(new_conversation.title),
            created_at: Utc::now(),
        };
        let created = self
            .session
            .guarded(scope("create"), move |tx| {
                Box::pin(async move { Ok(conversation::create(tx, entity).await?) })
            })
            .await?;

        info!(id = %created.id, "repo.create.success");
        Ok(created.into())
    }

    /// The conversation, but only if `user_id` owns it.
    pub async fn get_user_conversation(
        &mut self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Conversation>, DomainError> {
        let found = self
            .session
            .guarded(scope("get"), move |tx| {
                Box::pin(async move { Ok(conversation::find_for_user(tx, user_id, id).await?) })
            })
            .await?;
        if found.is_none() {
            debug!(%user_id, conversation_id = %id, "conversation not found for user");
        }
        Ok(found.map(Into::into))
    }

    /// A user's conversations, most recently active first.
    pub async fn get_by_user(
        &mut self,
        user_id: Uuid,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<Conversation>, DomainError> {
        check_page(limit)?;
        let rows = self
            .session
            .guarded(scope("list"), move |tx| {
                Box::pin(async move {
                    Ok(conversation::find_by_user_paginated(tx, user_id, skip, limit).await?)
                })
            })
            .await?;
        debug!(%user_id, count = rows.len(), "Retrieved user conversations");
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn update_title(
        &mut self,
        id: Uuid,
        title: &str,
    ) -> Result<Option<Conversation>, DomainError> {
        info!(conversation_id = %id, "Updating conversation title");
        let title = normalize_title(Some(title.to_owned()));
        let updated = self
            .session
            .guarded(scope("update"), move |tx| {
                Box::pin(async move { Ok(conversation::update_title(tx, id, title).await?) })
            })
            .await?;
        Ok(updated.map(Into::into))
    }

    /// Bump `updated_at` to now; `false` when the conversation is gone.
    pub async fn touch(&mut self, id: Uuid) -> Result<bool, DomainError> {
        debug!(conversation_id = %id, "Updating conversation timestamp");
        let now = Utc::now();
        let touched = self
            .session
            .guarded(scope("update"), move |tx| {
                Box::pin(async move { Ok(conversation::touch(tx, id, now).await?) })
            })
            .await?;
        Ok(touched > 0)
    }

    /// Delete only when `user_id` owns the conversation; `false` otherwise.
    pub async fn delete_user_conversation(
        &mut self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<bool, DomainError> {
        let deleted = self
            .session
            .guarded(scope("delete"), move |tx| {
                Box::pin(async move {
                    if conversation::find_for_user(tx, user_id, id).await?.is_none() {
                        return Ok(None);
                    }
                    Ok(Some(conversation::delete(tx, id).await?))
                })
            })
            .await?;

        match deleted {
            None => {
                warn!(
                    %user_id,
                    conversation_id = %id,
                    "Conversation not found or does not belong to user"
                );
                Ok(false)
            }
            Some(deleted) => {
                if deleted {
                    info!(%user_id, conversation_id = %id, "Deleted conversation");
                }
                Ok(deleted)
            }
        }
    }

    pub async fn count_user_conversations(&mut self, user_id: Uuid) -> Result<u64, DomainError> {
        self.session
            .guarded(scope("count"), move |tx| {
                Box::pin(async move { Ok(conversation::count_by_user(tx, user_id).await?) })
            })
            .await
    }
}
