//! Channel-backed change feed on the production interface.
//!
//! Tests and local tooling push batches through a bounded channel; the sync
//! loop consumes them exactly as it consumes the HTTP feed.

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use registra_application::{ChangeFeed, ChangeFeedRequest, ChangeFeedStream};
use registra_core::{AppError, AppResult};
use registra_domain::{ChangeBatch, roll_up_changes};

/// Creates a bounded in-memory change feed and its writer half.
#[must_use]
pub fn in_memory_change_feed(capacity: usize) -> (InMemoryChangeFeedWriter, InMemoryChangeFeed) {
    let (sender, receiver) = mpsc::channel(capacity);
    (
        InMemoryChangeFeedWriter { sender },
        InMemoryChangeFeed {
            receiver: Mutex::new(Some(receiver)),
        },
    )
}

/// Producer half feeding batches into the in-memory feed.
#[derive(Clone)]
pub struct InMemoryChangeFeedWriter {
    sender: mpsc::Sender<ChangeBatch>,
}

impl InMemoryChangeFeedWriter {
    /// Pushes one batch, waiting while the channel is full.
    pub async fn push(&self, batch: ChangeBatch) -> AppResult<()> {
        self.sender
            .send(batch)
            .await
            .map_err(|_| AppError::Internal("change feed consumer dropped".to_owned()))
    }
}

/// Consumer half implementing the change feed port.
pub struct InMemoryChangeFeed {
    receiver: Mutex<Option<mpsc::Receiver<ChangeBatch>>>,
}

#[async_trait]
impl ChangeFeed for InMemoryChangeFeed {
    async fn open(&self, request: ChangeFeedRequest) -> AppResult<Box<dyn ChangeFeedStream>> {
        let receiver = self.receiver.lock().await.take().ok_or_else(|| {
            AppError::Validation("in-memory change feed is already open".to_owned())
        })?;

        Ok(Box::new(InMemoryChangeFeedStream {
            receiver,
            roll_up: request.roll_up_changes,
        }))
    }
}

struct InMemoryChangeFeedStream {
    receiver: mpsc::Receiver<ChangeBatch>,
    roll_up: bool,
}

#[async_trait]
impl ChangeFeedStream for InMemoryChangeFeedStream {
    async fn next_batch(&mut self) -> AppResult<Option<ChangeBatch>> {
        let Some(mut batch) = self.receiver.recv().await else {
            return Ok(None);
        };

        if self.roll_up {
            batch.items = roll_up_changes(batch.items);
        }

        Ok(Some(batch))
    }
}
