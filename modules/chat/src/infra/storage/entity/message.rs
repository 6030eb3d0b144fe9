use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{QueryOrder, QuerySelect, Set};
use uuid::Uuid;

/// `role` is stored as its lowercase name; the mapper parses it back.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "messages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: String,
    #[sea_orm(column_type = "Text")]
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::conversation::Entity",
        from = "Column::ConversationId",
        to = "super::conversation::Column::Id",
        on_delete = "Cascade"
    )]
    Conversation,
}

impl Related<super::conversation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Conversation.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

pub struct NewMessageEntity {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Model>, DbErr> {
    Entity::find_by_id(id).one(db).await
}

/// Messages of one conversation in the order they were written
pub async fn find_by_conversation_paginated<C: ConnectionTrait>(
    db: &C,
    conversation_id: Uuid,
    offset: u64,
    limit: u64,
) -> Result<Vec<Model>, DbErr> {
    Entity::find()
        .filter(Column::ConversationId.eq(conversation_id))
        .order_by_asc(Column::CreatedAt)
        .order_by_asc(Column::Id)
        .offset(offset)
        .limit(limit)
        .all(db)
        .await
}

pub async fn find_latest<C: ConnectionTrait>(
    db: &C,
    conversation_id: Uuid,
) -> Result<Option<Model>, DbErr> {
    Entity::find()
        .filter(Column::ConversationId.eq(conversation_id))
        .order_by_desc(Column::CreatedAt)
        .one(db)
        .await
}

pub async fn count_by_conversation<C: ConnectionTrait>(
    db: &C,
    conversation_id: Uuid,
) -> Result<u64, DbErr> {
    Entity::find()
        .filter(Column::ConversationId.eq(conversation_id))
        .count(db)
        .await
}

pub async fn count_by_role<C: ConnectionTrait>(
    db: &C,
    conversation_id: Uuid,
    role: &str,
) -> Result<u64, DbErr> {
    Entity::find()
        .filter(Column::ConversationId.eq(conversation_id))
        .filter(Column::Role.eq(role))
        .count(db)
        .await
}

pub async fn create<C: ConnectionTrait>(
    db: &C,
    new_message: NewMessageEntity,
) -> Result<Model, DbErr> {
    let active_model = ActiveModel {
        id: Set(new_message.id),
        conversation_id: Set(new_message.conversation_id),
        role: Set(new_message.role),
        content: Set(new_message.content),
        created_at: Set(new_message.created_at),
        updated_at: Set(new_message.created_at),
    };

    active_model.insert(db).await
}

pub async fn update_content<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    content: String,
) -> Result<Option<Model>, DbErr> {
    let Some(existing) = find_by_id(db, id).await? else {
        return Ok(None);
    };

    let mut active_model: ActiveModel = existing.into();
    active_model.content = Set(content);
    active_model.updated_at = Set(Utc::now());
    active_model.update(db).await.map(Some)
}

pub async fn delete_by_conversation<C: ConnectionTrait>(
    db: &C,
    conversation_id: Uuid,
) -> Result<u64, DbErr> {
    let result = Entity::delete_many()
        .filter(Column::ConversationId.eq(conversation_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}
