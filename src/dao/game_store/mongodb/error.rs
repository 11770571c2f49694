use mongodb::error::Error as MongoError;
use thiserror::Error;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to read `{key}` from `{collection}`")]
    Load {
        collection: &'static str,
        key: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to write `{key}` to `{collection}`")]
    Save {
        collection: &'static str,
        key: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to delete `{key}` from `{collection}`")]
    Delete {
        collection: &'static str,
        key: String,
        #[source]
        source: MongoError,
    },
    #[error("stored identifier `{value}` is not a UUID")]
    InvalidId {
        value: String,
        #[source]
        source: uuid::Error,
    },
}
