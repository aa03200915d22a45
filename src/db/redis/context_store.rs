use async_trait::async_trait;
use redis::AsyncCommands;
use redis::Client;
use std::fmt::Display;
use uuid::Uuid;

use crate::error::AppError;
use crate::error::AppResult;
use crate::models::UserShoppingContext;
use crate::services::providers::UserContextStore;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    UserContext(Uuid),
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::UserContext(user_id) => write!(f, "user_ctx:{}", user_id),
        }
    }
}

/// Creates a Redis client for user context storage
///
/// Uses multiplexed async connections obtained per operation.
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// User shopping contexts stored as JSON documents without expiry
#[derive(Clone)]
pub struct RedisContextStore {
    redis_client: Client,
}

impl RedisContextStore {
    pub fn new(redis_client: Client) -> Self {
        Self { redis_client }
    }
}

#[async_trait]
impl UserContextStore for RedisContextStore {
    async fn load(&self, user_id: Uuid) -> AppResult<Option<UserShoppingContext>> {
        let key = CacheKey::UserContext(user_id);
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let stored: Option<String> = conn.get(key.to_string()).await?;

        match stored {
            Some(json) => {
                let context = serde_json::from_str(&json).map_err(|e| {
                    AppError::Internal(format!("User context deserialization error: {}", e))
                })?;
                Ok(Some(context))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, context: &UserShoppingContext) -> AppResult<()> {
        let key = CacheKey::UserContext(context.user_id);
        let json = serde_json::to_string(context)
            .map_err(|e| AppError::Internal(format!("User context serialization error: {}", e)))?;

        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.set(key.to_string(), json).await?;

        tracing::debug!(user_id = %context.user_id, "Stored user context");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
