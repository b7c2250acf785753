//! Error types for Parcel Watch.

/// Top-level error type for the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Carrier registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// JMAP protocol and transport errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Session fetch failed: {0}")]
    Session(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Method error {error_type}: {description}")]
    Method {
        error_type: String,
        description: String,
    },

    /// The server cannot diff from the state we hold. Recoverable by
    /// resynchronizing to a fresh snapshot, at the cost of the gap.
    #[error("Server cannot calculate changes from the stored state")]
    CannotCalculateChanges,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Authentication failed (HTTP {status})")]
    AuthFailed { status: u16 },
}

/// Carrier registry errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Carrier list fetch failed: {0}")]
    Fetch(String),

    #[error("Carrier list unavailable (no cache and fetch failed)")]
    Unavailable,
}

/// Extraction service errors.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Extraction request failed: {0}")]
    Request(String),

    #[error("Invalid extraction response: {0}")]
    InvalidResponse(String),
}

/// Result type alias for the pipeline.
pub type Result<T> = std::result::Result<T, Error>;
