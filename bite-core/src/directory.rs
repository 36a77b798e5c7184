//! User directory: who is approved to claim donations and accept requests.
//!
//! Registration and approval happen elsewhere. The engine only asks for a
//! user's standing at the moment it arbitrates.

use crate::framework::DatabaseProcessor;
use async_trait::async_trait;
use kanau::processor::Processor;
use sqlx::PgPool;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorStanding {
    Approved,
    /// Known but not approved (pending review or rejected).
    Unapproved,
    Unknown,
}

impl ActorStanding {
    pub fn is_approved(self) -> bool {
        self == ActorStanding::Approved
    }
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn standing(&self, user_id: Uuid) -> Result<ActorStanding, DirectoryError>;
}

/// Approval status column of the `users` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE", type_name = "user_status")]
pub enum UserStatus {
    Pending,
    Approved,
    Rejected,
}

impl From<Option<UserStatus>> for ActorStanding {
    fn from(status: Option<UserStatus>) -> Self {
        match status {
            Some(UserStatus::Approved) => ActorStanding::Approved,
            Some(UserStatus::Pending | UserStatus::Rejected) => ActorStanding::Unapproved,
            None => ActorStanding::Unknown,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GetUserStatus {
    pub user_id: Uuid,
}

impl Processor<GetUserStatus> for DatabaseProcessor {
    type Output = Option<UserStatus>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetUserStatus")]
    async fn process(&self, query: GetUserStatus) -> Result<Option<UserStatus>, sqlx::Error> {
        sqlx::query_scalar::<_, UserStatus>("SELECT status FROM users WHERE user_id = $1")
            .bind(query.user_id)
            .fetch_optional(&self.pool)
            .await
    }
}

/// Reads approval status from the shared `users` table.
#[derive(Clone)]
pub struct PgUserDirectory {
    db: DatabaseProcessor,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self {
            db: DatabaseProcessor { pool },
        }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn standing(&self, user_id: Uuid) -> Result<ActorStanding, DirectoryError> {
        let status = self.db.process(GetUserStatus { user_id }).await?;
        Ok(status.into())
    }
}

/// Fixed directory built from configuration or in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    users: HashMap<Uuid, UserStatus>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user_id: Uuid, status: UserStatus) -> Self {
        self.users.insert(user_id, status);
        self
    }

    pub fn approve(self, user_id: Uuid) -> Self {
        self.with_user(user_id, UserStatus::Approved)
    }

    pub fn insert(&mut self, user_id: Uuid, status: UserStatus) {
        self.users.insert(user_id, status);
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserDirectory for StaticDirectory {
    async fn standing(&self, user_id: Uuid) -> Result<ActorStanding, DirectoryError> {
        Ok(self.users.get(&user_id).copied().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_directory_reports_standing() {
        let approved = Uuid::now_v7();
        let pending = Uuid::now_v7();
        let rejected = Uuid::now_v7();
        let directory = StaticDirectory::new()
            .approve(approved)
            .with_user(pending, UserStatus::Pending)
            .with_user(rejected, UserStatus::Rejected);

        assert_eq!(
            directory.standing(approved).await.unwrap(),
            ActorStanding::Approved
        );
        assert_eq!(
            directory.standing(pending).await.unwrap(),
            ActorStanding::Unapproved
        );
        assert_eq!(
            directory.standing(rejected).await.unwrap(),
            ActorStanding::Unapproved
        );
        assert_eq!(
            directory.standing(Uuid::now_v7()).await.unwrap(),
            ActorStanding::Unknown
        );
    }
}
