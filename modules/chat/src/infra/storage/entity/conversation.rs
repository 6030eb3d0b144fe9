use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::Expr;
use sea_orm::{QueryOrder, QuerySelect, Set};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "conversations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,
    #[sea_orm(has_many = "super::message::Entity")]
    Messages,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::message::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Messages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

pub struct NewConversationEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Model>, DbErr> {
    Entity::find_by_id(id).one(db).await
}

/// Owner-scoped lookup: `None` when the conversation belongs to someone else.
pub async fn find_for_user<C: ConnectionTrait>(
    db: &C,
    user_id: Uuid,
    id: Uuid,
) -> Result<Option<Model>, DbErr> {
    Entity::find_by_id(id)
        .filter(Column::UserId.eq(user_id))
        .one(db)
        .await
}

/// A user's conversations, most recently active first
pub async fn find_by_user_paginated<C: ConnectionTrait>(
    db: &C,
    user_id: Uuid,
    offset: u64,
    limit: u64,
) -> Result<Vec<Model>, DbErr> {
    Entity::find()
        .filter(Column::UserId.eq(user_id))
        .order_by_desc(Column::UpdatedAt)
        .offset(offset)
        .limit(limit)
        .all(db)
        .await
}

pub async fn exists<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<bool, DbErr> {
    let count = Entity::find()
        .filter(Column::Id.eq(id))
        .count(db)
        .await?;
    Ok(count > 0)
}

pub async fn count_by_user<C: ConnectionTrait>(db: &C, user_id: Uuid) -> Result<u64, DbErr> {
    Entity::find()
        .filter(Column::UserId.eq(user_id))
        .count(db)
        .await
}

pub async fn create<C: ConnectionTrait>(
    db: &C,
    new_conversation: NewConversationEntity,
) -> Result<Model, DbErr> {
    let active_model = ActiveModel {
        id: Set(new_conversation.id),
        user_id: Set(new_conversation.user_id),
        title: Set(new_conversation.title),
        created_at: Set(new_conversation.created_at),
        updated_at: Set(new_conversation.created_at),
    };

    active_model.insert(db).await
}

/// Replace the title and bump `updated_at`; `None` when the row is gone.
pub async fn update_title<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    title: Option<String>,
) -> Result<Option<Model>, DbErr> {
    let Some(existing) = find_by_id(db, id).await? else {
        return Ok(None);
    };

    let mut active_model: ActiveModel = existing.into();
    active_model.title = Set(title);
    active_model.updated_at = Set(Utc::now());
    active_model.update(db).await.map(Some)
}

/// Set `updated_at` without loading the row; returns the number of rows hit.
pub async fn touch<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    at: DateTime<Utc>,
) -> Result<u64, DbErr> {
    let result = Entity::update_many()
        .col_expr(Column::UpdatedAt, Expr::value(at))
        .filter(Column::Id.eq(id))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

pub async fn delete<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<bool, DbErr> {
    let result = Entity::delete_by_id(id).exec(db).await?;
    Ok(result.rows_affected > 0)
}
