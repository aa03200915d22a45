pub mod context_store;

pub use context_store::create_redis_client;
pub use context_store::CacheKey;
pub use context_store::RedisContextStore;
