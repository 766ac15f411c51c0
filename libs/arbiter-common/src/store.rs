use crate::types::{Problem, Submission, User};
use async_trait::async_trait;
use redis::AsyncCommands;
use thiserror::Error;

/// Collaborator stores. The judge reads submissions/problems/users by id and
/// writes full result documents back; everything else about persistence
/// belongs to the web layer. Documents are JSON blobs keyed by id, matching
/// what the intake wrote.

pub const SUBMISSION_PREFIX: &str = "arbiter:submission";
pub const PROBLEM_PREFIX: &str = "arbiter:problem";
pub const USER_PREFIX: &str = "arbiter:user";

pub fn submission_key(id: &str) -> String {
    format!("{}:{}", SUBMISSION_PREFIX, id)
}

pub fn problem_key(id: &str) -> String {
    format!("{}:{}", PROBLEM_PREFIX, id)
}

pub fn user_key(id: &str) -> String {
    format!("{}:{}", USER_PREFIX, id)
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Submission>, StoreError>;
    /// Idempotent full overwrite of the submission document.
    async fn save(&self, submission: &Submission) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ProblemStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Problem>, StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<User>, StoreError>;
    async fn save(&self, user: &User) -> Result<(), StoreError>;
}

/// Redis-backed implementation of all three stores. `ConnectionManager` is a
/// cheap clone over one multiplexed connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: redis::aio::ConnectionManager,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let conn = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    pub fn new(conn: redis::aio::ConnectionManager) -> Self {
        Self { conn }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn.get(key).await?;
        match payload {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn set_json<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(value)?;
        let _: () = conn.set(key, payload).await?;
        Ok(())
    }
}

#[async_trait]
impl SubmissionStore for RedisStore {
    async fn get(&self, id: &str) -> Result<Option<Submission>, StoreError> {
        self.get_json(&submission_key(id)).await
    }

    async fn save(&self, submission: &Submission) -> Result<(), StoreError> {
        self.set_json(&submission_key(&submission.id), submission).await
    }
}

#[async_trait]
impl ProblemStore for RedisStore {
    async fn get(&self, id: &str) -> Result<Option<Problem>, StoreError> {
        self.get_json(&problem_key(id)).await
    }
}

#[async_trait]
impl UserStore for RedisStore {
    async fn get(&self, id: &str) -> Result<Option<User>, StoreError> {
        self.get_json(&user_key(id)).await
    }

    async fn save(&self, user: &User) -> Result<(), StoreError> {
        self.set_json(&user_key(&user.id), user).await
    }
}
