use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FieldcryptError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Job ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Request error: {0}")]
    Request(#[from] RequestError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid policy '{name}': {reason}")]
    InvalidPolicy { name: String, reason: String },
}

/// Failure contract of the field transform port.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("Transform client is not configured")]
    NotConfigured,

    #[error("Unknown policy '{0}'")]
    UnknownPolicy(String),

    #[error("User '{user}' is not authorized to reveal under policy '{policy}'")]
    Unauthorized { user: String, policy: String },

    #[error("Transform backend failure: {0}")]
    Backend(String),
}

/// Invalid transform request parameters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("Unknown mode '{0}' (expected 'protect' or 'reveal')")]
    UnknownMode(String),

    #[error("Delimiter must not be empty")]
    EmptyDelimiter,

    #[error("Policy name must not be empty")]
    EmptyPolicy,
}

/// Failures that abort a whole job.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to open input '{path}': {source}")]
    OpenInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read input: {0}")]
    ReadInput(#[source] std::io::Error),

    #[error("Failed to create output '{path}': {source}")]
    CreateOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write output: {0}")]
    WriteOutput(#[source] std::io::Error),

    #[error("Failed to spawn line worker: {0}")]
    SpawnWorker(#[source] std::io::Error),

    #[error("Line worker pool closed unexpectedly")]
    PoolClosed,
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Failed to create job directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to persist upload '{path}': {source}")]
    PersistUpload {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Job queue is full ({capacity} pending jobs)")]
    QueueFull { capacity: usize },

    #[error("Job scheduler has shut down")]
    SchedulerClosed,

    #[error("Failed to spawn job runner: {0}")]
    SpawnRunner(#[source] std::io::Error),
}

/// Errors surfaced to callers of the converter service.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid request: {0}")]
    Request(#[from] RequestError),

    #[error("Pre-flight check failed under policy '{policy}': {source}")]
    Preflight {
        policy: String,
        #[source]
        source: TransformError,
    },

    #[error("Failed to read upload: {0}")]
    ReadUpload(#[source] std::io::Error),

    #[error("Failed to open result '{path}': {source}")]
    OpenResult {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, FieldcryptError>;
