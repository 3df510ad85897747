//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod http_audit_source;
mod http_change_feed;
mod in_memory_change_feed;
mod postgres_sync_store;
mod redis_invalidation_channel;

pub use http_audit_source::HttpAuditSource;
pub use http_change_feed::HttpChangeFeed;
pub use in_memory_change_feed::{
    InMemoryChangeFeed, InMemoryChangeFeedWriter, in_memory_change_feed,
};
pub use postgres_sync_store::PostgresSyncStore;
pub use redis_invalidation_channel::RedisInvalidationChannel;
