use serde::Serialize;
use utoipa::ToSchema;

/// Body of the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "ok" or "degraded".
    pub status: String,
    /// Storage backend in use.
    pub storage: String,
    /// Player sockets currently attached to this process.
    pub connections: usize,
}

impl HealthResponse {
    pub fn new(degraded: bool, storage: &str, connections: usize) -> Self {
        Self {
            status: if degraded { "degraded" } else { "ok" }.to_owned(),
            storage: storage.to_owned(),
            connections,
        }
    }
}
