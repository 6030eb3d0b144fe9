use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{Condition, QueryOrder, QuerySelect, Set};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub username: String,
    #[sea_orm(unique)]
    pub email: String,
    pub hashed_password: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::conversation::Entity")]
    Conversations,
}

impl Related<super::conversation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Conversations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Data for inserting a user row
pub struct NewUserEntity {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub hashed_password: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Column updates; `None` leaves the column as is
#[derive(Default)]
pub struct UpdateUserEntity {
    pub username: Option<String>,
    pub email: Option<String>,
    pub hashed_password: Option<String>,
    pub is_active: Option<bool>,
}

pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Model>, DbErr> {
    Entity::find_by_id(id).one(db).await
}

pub async fn find_by_username<C: ConnectionTrait>(
    db: &C,
    username: &str,
) -> Result<Option<Model>, DbErr> {
    Entity::find()
        .filter(Column::Username.eq(username))
        .one(db)
        .await
}

pub async fn find_by_email<C: ConnectionTrait>(db: &C, email: &str) -> Result<Option<Model>, DbErr> {
    Entity::find().filter(Column::Email.eq(email)).one(db).await
}

/// Match `username` verbatim or `email` as given; callers normalise first.
pub async fn find_by_username_or_email<C: ConnectionTrait>(
    db: &C,
    username: &str,
    email: &str,
) -> Result<Option<Model>, DbErr> {
    Entity::find()
        .filter(
            Condition::any()
                .add(Column::Username.eq(username))
                .add(Column::Email.eq(email)),
        )
        .one(db)
        .await
}

/// Active users, newest first
pub async fn find_active_paginated<C: ConnectionTrait>(
    db: &C,
    offset: u64,
    limit: u64,
) -> Result<Vec<Model>, DbErr> {
    Entity::find()
        .filter(Column::IsActive.eq(true))
        .order_by_desc(Column::CreatedAt)
        .offset(offset)
        .limit(limit)
        .all(db)
        .await
}

pub async fn username_exists<C: ConnectionTrait>(db: &C, username: &str) -> Result<bool, DbErr> {
    let count = Entity::find()
        .filter(Column::Username.eq(username))
        .count(db)
        .await?;
    Ok(count > 0)
}

pub async fn email_exists<C: ConnectionTrait>(db: &C, email: &str) -> Result<bool, DbErr> {
    let count = Entity::find()
        .filter(Column::Email.eq(email))
        .count(db)
        .await?;
    Ok(count > 0)
}

pub async fn count_active<C: ConnectionTrait>(db: &C) -> Result<u64, DbErr> {
    Entity::find()
        .filter(Column::IsActive.eq(true))
        .count(db)
        .await
}

pub async fn create<C: ConnectionTrait>(db: &C, new_user: NewUserEntity) -> Result<Model, DbErr> {
    let active_model = ActiveModel {
        id: Set(new_user.id),
        username: Set(new_user.username),
        email: Set(new_user.email),
        hashed_password: Set(new_user.hashed_password),
        is_active: Set(new_user.is_active),
        created_at: Set(new_user.created_at),
        updated_at: Set(new_user.created_at),
    };

    active_model.insert(db).await
}

/// Apply `update_data` and bump `updated_at`; `None` when the row is gone.
pub async fn update<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    update_data: UpdateUserEntity,
) -> Result<Option<Model>, DbErr> {
    let Some(existing) = find_by_id(db, id).await? else {
        return Ok(None);
    };

    let mut active_model: ActiveModel = existing.into();
    if let Some(username) = update_data.username {
        active_model.username = Set(username);
    }
    if let Some(email) = update_data.email {
        active_model.email = Set(email);
    }
    if let Some(hashed_password) = update_data.hashed_password {
        active_model.hashed_password = Set(hashed_password);
    }
    if let Some(is_active) = update_data.is_active {
        active_model.is_active = Set(is_active);
    }
    active_model.updated_at = Set(Utc::now());

    active_model.update(db).await.map(Some)
}

/// Delete a user by ID, returns true if a user was deleted
pub async fn delete<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<bool, DbErr> {
    let result = Entity::delete_by_id(id).exec(db).await?;
    Ok(result.rows_affected > 0)
}
