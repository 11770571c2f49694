//! Fan-out of outbound messages to connected players.

use std::sync::Arc;

use futures::{StreamExt, future::BoxFuture, stream};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{dao::models::PlayerEntity, dto::ws::OutboundMessage};

/// Per-recipient delivery failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PushError {
    /// No live connection is registered under this identity.
    #[error("connection `{0}` is not registered")]
    UnknownConnection(String),
    /// The connection went away while the message was queued.
    #[error("connection `{0}` is closed")]
    Closed(String),
}

/// Delivers one already serialized message to one connection.
pub trait PushChannel: Send + Sync {
    fn send(&self, connection_id: String, payload: Arc<str>) -> BoxFuture<'static, Result<(), PushError>>;
}

/// Outcome of a broadcast; failures are already logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Serializes a message once and pushes it to many recipients with bounded concurrency.
#[derive(Clone)]
pub struct Notifier {
    channel: Arc<dyn PushChannel>,
    concurrency: usize,
}

impl Notifier {
    pub fn new(channel: Arc<dyn PushChannel>, concurrency: usize) -> Self {
        Self {
            channel,
            concurrency: concurrency.max(1),
        }
    }

    /// Push `message` to a single connection. Failures are logged and returned.
    pub async fn send_to(
        &self,
        connection_id: &str,
        message: &OutboundMessage,
    ) -> Result<(), PushError> {
        let Some(payload) = encode(message) else {
            return Ok(());
        };
        let result = self
            .channel
            .send(connection_id.to_string(), payload)
            .await;
        if let Err(err) = &result {
            warn!(connection_id, kind = message.kind(), error = %err, "failed to deliver message");
        }
        result
    }

    /// Push `message` to every recipient and wait for all sends to settle.
    ///
    /// A failed recipient never affects the others.
    pub async fn broadcast<'a, I>(&self, recipients: I, message: &OutboundMessage) -> BroadcastReport
    where
        I: IntoIterator<Item = &'a PlayerEntity>,
    {
        let connection_ids = recipients
            .into_iter()
            .map(|player| player.connection_id.clone())
            .collect::<Vec<_>>();
        if connection_ids.is_empty() {
            return BroadcastReport::default();
        }
        let Some(payload) = encode(message) else {
            return BroadcastReport {
                delivered: 0,
                failed: connection_ids.len(),
            };
        };

        let results = stream::iter(connection_ids)
            .map(|connection_id| {
                let channel = self.channel.clone();
                let payload = payload.clone();
                async move {
                    let result = channel.send(connection_id.clone(), payload).await;
                    (connection_id, result)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect::<Vec<_>>()
            .await;

        let mut report = BroadcastReport::default();
        for (connection_id, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    warn!(
                        connection_id = %connection_id,
                        kind = message.kind(),
                        error = %err,
                        "failed to deliver broadcast"
                    );
                    report.failed += 1;
                }
            }
        }
        debug!(
            kind = message.kind(),
            delivered = report.delivered,
            failed = report.failed,
            "broadcast finished"
        );
        report
    }
}

/// Serialization failure is a bug, not a delivery problem: log and drop.
fn encode(message: &OutboundMessage) -> Option<Arc<str>> {
    match serde_json::to_string(message) {
        Ok(payload) => Some(payload.into()),
        Err(err) => {
            warn!(error = %err, kind = message.kind(), "failed to serialize message");
            None
        }
    }
}
