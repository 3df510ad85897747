//! Redis pub/sub adapter for the invalidation channel.

use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;
use tracing::{debug, warn};

use registra_application::{InvalidationCallback, InvalidationChannel};
use registra_core::{AppError, AppResult};

/// Redis implementation of the cross-process invalidation channel.
#[derive(Clone)]
pub struct RedisInvalidationChannel {
    client: redis::Client,
}

impl RedisInvalidationChannel {
    /// Creates a channel adapter with a configured Redis client.
    #[must_use]
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl InvalidationChannel for RedisInvalidationChannel {
    async fn notify(&self, channel: &str) -> AppResult<()> {
        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))?;

        connection
            .publish::<_, _, ()>(channel, 1)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to publish invalidation signal: {error}"))
            })?;

        Ok(())
    }

    async fn listen(&self, channel: &str, on_notify: InvalidationCallback) -> AppResult<()> {
        let mut pubsub = self.client.get_async_pubsub().await.map_err(|error| {
            AppError::Internal(format!("failed to open redis subscription: {error}"))
        })?;
        pubsub.subscribe(channel).await.map_err(|error| {
            AppError::Internal(format!(
                "failed to subscribe to invalidation channel: {error}"
            ))
        })?;

        let channel_name = channel.to_owned();
        tokio::spawn(async move {
            let mut messages = pubsub.on_message();
            while let Some(message) = messages.next().await {
                debug!(
                    channel = message.get_channel_name(),
                    "invalidation signal received"
                );
                on_notify();
            }

            warn!(
                channel = channel_name.as_str(),
                "invalidation subscription ended"
            );
        });

        Ok(())
    }
}
