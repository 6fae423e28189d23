use mongodb::error::Error as MongoError;
use thiserror::Error;

/// Result alias for MongoDB store operations.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures raised by the MongoDB record store.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// The connection string did not parse.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    /// The driver rejected the parsed options.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    /// The server never answered while connecting.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    /// A periodic ping failed.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    /// Creating a unique index failed.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    /// An upsert was rejected.
    #[error("failed to write `{key}` to collection `{collection}`")]
    Write {
        collection: &'static str,
        key: String,
        #[source]
        source: MongoError,
    },
    /// A delete was rejected.
    #[error("failed to delete `{key}` from collection `{collection}`")]
    Delete {
        collection: &'static str,
        key: String,
        #[source]
        source: MongoError,
    },
    /// Reading a collection failed.
    #[error("failed to list collection `{collection}`")]
    List {
        collection: &'static str,
        #[source]
        source: MongoError,
    },
}
