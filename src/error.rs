//! Error types for the rentq service.

use thiserror::Error;

/// Main error type for rentq operations.
#[derive(Error, Debug)]
pub enum RentqError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid year-quarter: {0}")]
    Quarter(#[from] QuarterError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),

    #[error("Model error: {0}")]
    Llm(#[from] LlmError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Configuration-related errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// User-input validation errors. Messages are returned verbatim to clients.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("'{0}' is required")]
    Required(&'static str),

    #[error("'{field}' must be one of {allowed:?}")]
    NotAllowed {
        field: &'static str,
        allowed: &'static [&'static str],
    },

    #[error("'{0}' must be a number")]
    NotANumber(&'static str),

    #[error("'{0}' must be an integer")]
    NotAnInteger(&'static str),

    #[error("'{field}' must be >= {min}")]
    BelowMinimum { field: &'static str, min: f64 },

    #[error("'{field}' must be <= {max}")]
    AboveMaximum { field: &'static str, max: f64 },
}

/// Year-quarter parsing errors.
#[derive(Error, Debug)]
pub enum QuarterError {
    #[error("year-quarter is empty; use '2025Q1' or '25q1'")]
    Empty,

    #[error("malformed year-quarter '{0}'; use '2025Q1' or '25q1'")]
    Malformed(String),

    #[error("quarter out of range in '{0}'; quarters run 1..=4")]
    QuarterOutOfRange(String),
}

/// SQLite store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database file not found: {0}")]
    DbNotFound(std::path::PathBuf),

    #[error("failed to open database {path}: {source}")]
    Open {
        path: std::path::PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("query failed: {0}")]
    Query(#[from] rusqlite::Error),
}

/// Prediction/support lookup errors.
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("no matching rows for building '{building}' in district '{district}'")]
    NoCandidates { district: String, building: String },

    #[error("support item {0} not found")]
    SupportNotFound(i64),

    #[error("unsupported source type: {0}")]
    UnsupportedSourceType(String),

    #[error("malformed detail_json for support item {0}")]
    MalformedDetail(i64),
}

/// Errors from remote model services (Hugging Face inference, LLaMA).
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("{service} request failed: {source}")]
    Request {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} returned status {status}: {body}")]
    Upstream {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} response could not be decoded: {source}")]
    Decode {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{0} returned an empty answer")]
    EmptyAnswer(&'static str),

    #[error("model output is not a JSON object: {0}")]
    MalformedAnswer(String),
}

/// Result type alias for rentq operations.
pub type Result<T> = std::result::Result<T, RentqError>;
