use std::time::Instant;

use chat_db::{DbSession, DomainError, GuardScope};
use chrono::Utc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::check_page;
use super::sensitive::mask_sensitive;
use crate::contract::model::{NewUser, User, UserPatch};
use crate::infra::storage::entity::user::{self, NewUserEntity, UpdateUserEntity};

const ENTITY: &str = "User";

fn scope(operation: &'static str) -> GuardScope<'static> {
    GuardScope::new(ENTITY, operation)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// User persistence on a borrowed session; the caller commits.
pub struct UserRepository<'s> {
    session: &'s mut DbSession,
}

impl<'s> UserRepository<'s> {
    pub fn new(session: &'s mut DbSession) -> Self {
        Self { session }
    }

    /// Validate, pre-check uniqueness, then insert.
    ///
    /// The pre-check is best effort: a concurrent writer can still win the
    /// race, in which case the store's unique constraint reports the
    /// duplicate through the guard.
    #[instrument(skip(self, new_user), fields(username = %new_user.username.trim()))]
    pub async fn create_user(&mut self, new_user: NewUser) -> Result<User, DomainError> {
        let username = new_user.username.trim().to_owned();
        let email = normalize_email(&new_user.email);
        let hashed_password = new_user.hashed_password;

        debug!(
            model = ENTITY,
            operation = "create",
            provided_keys = ?["email", "hashed_password", "username"],
            "repo.create.start"
        );

        let missing: Vec<&str> = [
            ("email", email.as_str()),
            ("hashed_password", hashed_password.as_str()),
            ("username", username.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(key, _)| key)
        .collect();
        if !missing.is_empty() {
            info!(
                model = ENTITY,
                operation = "create",
                missing_fields = ?missing,
                "repo.create.missing_required"
            );
            return Err(DomainError::missing_field(format!(
                "Missing required field(s): {} for {ENTITY}",
                missing.join(", ")
            ))
            .with_fields(missing));
        }

        let conflicts = self.unique_conflicts(&username, &email).await?;
        if !conflicts.is_empty() {
            info!(
                model = ENTITY,
                operation = "create",
                conflict_fields = ?conflicts,
                "repo.create.duplicate_precheck"
            );
            return Err(DomainError::duplicate(format!(
                "{ENTITY} already exists for field(s): {}",
                conflicts.join(", ")
            ))
            .with_fields(conflicts));
        }

        self.insert_user(NewUser {
            username,
            email,
            hashed_password,
        })
        .await
    }

    /// Insert without any pre-check; the store's constraints decide.
    pub async fn insert_user(&mut self, new_user: NewUser) -> Result<User, DomainError> {
        debug!(
            model = ENTITY,
            operation = "create",
            fields = ?mask_sensitive([
                ("username", new_user.username.as_str()),
                ("email", new_user.email.as_str()),
                ("hashed_password", new_user.hashed_password.as_str()),
            ]),
            "repo.insert"
        );

        let started = Instant::now();
        let entity = NewUserEntity {
            id: Uuid::new_v4(),
            username: new_user.username,
            email: new_user.email,
            hashed_password: new_user.hashed_password,
            is_active: true,
            created_at: Utc::now(),
        };
        let created = self
            .session
            .guarded(scope("create"), move |tx| {
                Box::pin(async move { Ok(user::create(tx, entity).await?) })
            })
            .await?;

        info!(
            model = ENTITY,
            operation = "create",
            id = %created.id,
            duration_ms = started.elapsed().as_millis() as u64,
            "repo.create.success"
        );
        Ok(created.into())
    }

    /// Sorted names of the unique columns `username`/`email` already taken.
    async fn unique_conflicts(
        &mut self,
        username: &str,
        email: &str,
    ) -> Result<Vec<&'static str>, DomainError> {
        let username = username.to_owned();
        let email = email.to_owned();
        self.session
            .guarded(scope("create"), move |tx| {
                Box::pin(async move {
                    let mut conflicts = Vec::new();
                    if user::email_exists(tx, &email).await? {
                        conflicts.push("email");
                    }
                    if user::username_exists(tx, &username).await? {
                        conflicts.push("username");
                    }
                    Ok(conflicts)
                })
            })
            .await
    }

    pub async fn get_by_id(&mut self, id: Uuid) -> Result<Option<User>, DomainError> {
        let found = self
            .session
            .guarded(scope("get"), move |tx| {
                Box::pin(async move { Ok(user::find_by_id(tx, id).await?) })
            })
            .await?;
        Ok(found.map(Into::into))
    }

    pub async fn get_by_id_or_raise(&mut self, id: Uuid) -> Result<User, DomainError> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("{ENTITY} with ID {id} not found")))
    }

    pub async fn get_by_username(&mut self, username: &str) -> Result<Option<User>, DomainError> {
        let username = username.trim().to_owned();
        let found = self
            .session
            .guarded(scope("get"), move |tx| {
                Box::pin(async move { Ok(user::find_by_username(tx, &username).await?) })
            })
            .await?;
        debug!(found = found.is_some(), "user lookup by username");
        Ok(found.map(Into::into))
    }

    pub async fn get_by_email(&mut self, email: &str) -> Result<Option<User>, DomainError> {
        let email = normalize_email(email);
        let found = self
            .session
            .guarded(scope("get"), move |tx| {
                Box::pin(async move { Ok(user::find_by_email(tx, &email).await?) })
            })
            .await?;
        debug!(found = found.is_some(), "user lookup by email");
        Ok(found.map(Into::into))
    }

    /// Login-style lookup: the identifier matches a username as typed
    /// (trimmed) or an email after normalisation.
    pub async fn get_by_username_or_email(
        &mut self,
        identifier: &str,
    ) -> Result<Option<User>, DomainError> {
        let username = identifier.trim().to_owned();
        let email = normalize_email(identifier);
        let found = self
            .session
            .guarded(scope("get"), move |tx| {
                Box::pin(async move {
                    Ok(user::find_by_username_or_email(tx, &username, &email).await?)
                })
            })
            .await?;
        Ok(found.map(Into::into))
    }

    /// Update username and/or email. Unique clashes come back as
    /// `Duplicate` naming the offending column.
    #[instrument(skip(self, patch), fields(user_id = %id))]
    pub async fn update_profile(
        &mut self,
        id: Uuid,
        patch: UserPatch,
    ) -> Result<Option<User>, DomainError> {
        info!("Updating user profile");
        if patch.is_empty() {
            return self.get_by_id(id).await;
        }

        let changes = UpdateUserEntity {
            username: patch.username.map(|u| u.trim().to_owned()),
            email: patch.email.as_deref().map(normalize_email),
            ..Default::default()
        };
        let blank: Vec<&str> = [("email", &changes.email), ("username", &changes.username)]
            .into_iter()
            .filter(|(_, value)| value.as_deref().is_some_and(str::is_empty))
            .map(|(key, _)| key)
            .collect();
        if !blank.is_empty() {
            return Err(DomainError::invalid_field(format!(
                "Invalid value for field(s): {} for {ENTITY}",
                blank.join(", ")
            ))
            .with_fields(blank));
        }
        self.update(id, "update", changes).await
    }

    #[instrument(skip(self, hashed_password), fields(user_id = %id))]
    pub async fn update_password(
        &mut self,
        id: Uuid,
        hashed_password: String,
    ) -> Result<Option<User>, DomainError> {
        debug!(
            changes = ?mask_sensitive([("hashed_password", hashed_password.as_str())]),
            "Updating user password"
        );
        let changes = UpdateUserEntity {
            hashed_password: Some(hashed_password),
            ..Default::default()
        };
        self.update(id, "update", changes).await
    }

    pub async fn activate_user(&mut self, id: Uuid) -> Result<Option<User>, DomainError> {
        info!(user_id = %id, "Activating user");
        self.set_active(id, true).await
    }

    pub async fn deactivate_user(&mut self, id: Uuid) -> Result<Option<User>, DomainError> {
        info!(user_id = %id, "Deactivating user");
        self.set_active(id, false).await
    }

    async fn set_active(&mut self, id: Uuid, is_active: bool) -> Result<Option<User>, DomainError> {
        let changes = UpdateUserEntity {
            is_active: Some(is_active),
            ..Default::default()
        };
        self.update(id, "update", changes).await
    }

    async fn update(
        &mut self,
        id: Uuid,
        operation: &'static str,
        changes: UpdateUserEntity,
    ) -> Result<Option<User>, DomainError> {
        let updated = self
            .session
            .guarded(scope(operation), move |tx| {
                Box::pin(async move { Ok(user::update(tx, id, changes).await?) })
            })
            .await?;
        if updated.is_none() {
            debug!(user_id = %id, "update skipped, user not found");
        }
        Ok(updated.map(Into::into))
    }

    /// Returns `false` when no such user exists. Conversations and their
    /// messages go with the user.
    pub async fn delete(&mut self, id: Uuid) -> Result<bool, DomainError> {
        let deleted = self
            .session
            .guarded(scope("delete"), move |tx| {
                Box::pin(async move { Ok(user::delete(tx, id).await?) })
            })
            .await?;
        info!(user_id = %id, deleted, "user delete");
        Ok(deleted)
    }

    pub async fn username_exists(&mut self, username: &str) -> Result<bool, DomainError> {
        let username = username.trim().to_owned();
        self.session
            .guarded(scope("exists"), move |tx| {
                Box::pin(async move { Ok(user::username_exists(tx, &username).await?) })
            })
            .await
    }

    pub async fn email_exists(&mut self, email: &str) -> Result<bool, DomainError> {
        let email = normalize_email(email);
        self.session
            .guarded(scope("exists"), move |tx| {
                Box::pin(async move { Ok(user::email_exists(tx, &email).await?) })
            })
            .await
    }

    pub async fn count_active_users(&mut self) -> Result<u64, DomainError> {
        self.session
            .guarded(scope("count"), |tx| {
                Box::pin(async move { Ok(user::count_active(tx).await?) })
            })
            .await
    }

    /// Active users, newest first.
    pub async fn list_active(&mut self, skip: u64, limit: u64) -> Result<Vec<User>, DomainError> {
        check_page(limit)?;
        let rows = self
            .session
            .guarded(scope("list"), move |tx| {
                Box::pin(async move { Ok(user::find_active_paginated(tx, skip, limit).await?) })
            })
            .await?;
        debug!(count = rows.len(), skip, limit, "Retrieved active users");
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
