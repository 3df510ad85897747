//! Ports onto the external CRM and the cross-process invalidation channel.

mod audit;
mod feed;
mod invalidation;

pub use audit::AuditSource;
pub use feed::{ChangeFeed, ChangeFeedRequest, ChangeFeedStream, DEFAULT_PAGE_SIZE};
pub use invalidation::{InvalidationCallback, InvalidationChannel, PERSON_RECORDS_CHANNEL};
