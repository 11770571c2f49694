//! Live websocket connections keyed by connection identity.

use std::sync::Arc;

use axum::extract::ws::Message;
use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::debug;

use crate::services::notifier::{PushChannel, PushError};

/// Writer handles of every open socket.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<String, mpsc::UnboundedSender<Message>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, connection_id: String, tx: mpsc::UnboundedSender<Message>) {
        self.connections.insert(connection_id, tx);
    }

    pub fn unregister(&self, connection_id: &str) {
        self.connections.remove(connection_id);
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    fn push(&self, connection_id: &str, payload: &str) -> Result<(), PushError> {
        // Clone the sender so the map shard is not held while sending.
        let tx = self
            .connections
            .get(connection_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| PushError::UnknownConnection(connection_id.to_owned()))?;

        tx.send(Message::Text(payload.into())).map_err(|_| {
            debug!(connection_id, "dropping closed connection from registry");
            self.connections.remove(connection_id);
            PushError::Closed(connection_id.to_owned())
        })
    }
}

impl PushChannel for ConnectionRegistry {
    fn send(
        &self,
        connection_id: String,
        payload: Arc<str>,
    ) -> BoxFuture<'static, Result<(), PushError>> {
        let result = self.push(&connection_id, &payload);
        Box::pin(async move { result })
    }
}
