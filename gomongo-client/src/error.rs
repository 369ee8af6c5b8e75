//! Error types for façade operations.

use thiserror::Error;

/// Result type for façade operations.
pub type GoMongoResult<T> = Result<T, GoMongoError>;

/// Errors that can occur while using a [`GoMongo`](crate::GoMongo) instance.
///
/// Driver failures are never translated: they surface as [`GoMongoError::Driver`]
/// and display exactly as the driver formats them.
#[derive(Error, Debug)]
pub enum GoMongoError {
    /// The instance was destroyed and can no longer be used.
    #[error("GoMongo instance is destroyed and cannot be used anymore")]
    Destroyed,

    /// MongoDB driver error.
    #[error(transparent)]
    Driver(#[from] mongodb::error::Error),

    /// BSON deserialization error.
    #[error("bson deserialization error: {0}")]
    BsonDe(#[from] bson::de::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path of the file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML.
    #[error("invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),

    /// A filter, update or pipeline was rejected.
    #[error("query error: {0}")]
    Query(String),
}

impl GoMongoError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a query error.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query(message.into())
    }

    /// Check if this is the destroyed-instance error.
    pub fn is_destroyed(&self) -> bool {
        matches!(self, Self::Destroyed)
    }

    /// Check if this error came from the driver.
    pub fn is_driver(&self) -> bool {
        matches!(self, Self::Driver(_))
    }

    /// Check if this is a configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Io { .. } | Self::Toml(_))
    }

    /// Check if this is a rejected query.
    pub fn is_query(&self) -> bool {
        matches!(self, Self::Query(_))
    }
}
