//! Persistence and delivery ports for the event log.

mod handler;
mod store;

pub use handler::EventHandler;
pub use store::{DispatchMode, SyncStore, SyncTransaction};
