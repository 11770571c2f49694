//! Failures of the CouchDB game store, folded into [`StorageError`] at the trait boundary.

use reqwest::StatusCode;
use thiserror::Error;

use crate::dao::storage::StorageError;

/// Result of a CouchDB store call.
pub type CouchResult<T> = Result<T, CouchDaoError>;

/// What went wrong talking to CouchDB. `target` is a document id, `_find` or the database URL.
#[derive(Debug, Error)]
pub enum CouchDaoError {
    /// Connection settings are incomplete.
    #[error("CouchDB store needs `{var}` to be set")]
    MissingEnvVar { var: &'static str },
    /// TLS or proxy setup rejected by reqwest.
    #[error("could not build the CouchDB HTTP client")]
    Client {
        #[source]
        source: reqwest::Error,
    },
    /// Looking up or creating the game database failed before any document was touched.
    #[error("game database `{database}` {step} failed")]
    Bootstrap {
        database: String,
        step: &'static str,
        #[source]
        source: reqwest::Error,
    },
    /// The game database exists in an unusable state.
    #[error("game database `{database}` answered {status}")]
    BootstrapStatus {
        database: String,
        status: StatusCode,
    },
    /// The request never got a response.
    #[error("CouchDB unreachable while accessing `{target}`")]
    Unreachable {
        target: String,
        #[source]
        source: reqwest::Error,
    },
    /// Any status the store has no mapping for.
    #[error("CouchDB answered {status} for `{target}`")]
    UnexpectedStatus { target: String, status: StatusCode },
    /// The response body was not the JSON we asked for.
    #[error("unreadable CouchDB body for `{target}`")]
    UnreadableBody {
        target: String,
        #[source]
        source: reqwest::Error,
    },
    /// A `_find` row did not match the game, player or slot shape.
    #[error("`{target}` returned a document of the wrong shape")]
    UnexpectedDocument {
        target: String,
        #[source]
        source: serde_json::Error,
    },
    /// Every delete attempt raced a concurrent revision.
    #[error("document `{target}` kept changing while being deleted")]
    DeleteContended { target: String },
}

impl From<CouchDaoError> for StorageError {
    fn from(err: CouchDaoError) -> Self {
        StorageError::unavailable(err.to_string(), err)
    }
}
