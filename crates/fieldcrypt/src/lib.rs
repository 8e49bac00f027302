pub mod broadcast;
pub mod config;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod pipeline;
pub mod preview;
pub mod sanitize;
pub mod secrets;
pub mod service;
pub mod storage;
pub mod transform;
pub mod worker;

pub use broadcast::{JobEvent, JobEventBroadcaster, JobEventKind};
pub use config::{load_config, LogSettings, ServiceConfig, TransformSettings};
pub use error::{
    ConfigError, FieldcryptError, LedgerError, PipelineError, RequestError, Result, ServiceError,
    TransformError,
};
pub use ledger::{Job, JobCounts, JobLedger, JobStatus};
pub use logging::init_logging;
pub use pipeline::{ChunkedPipeline, TransformRequest, FIELD_ERROR_SENTINEL, LINE_ERROR_SENTINEL};
pub use preview::FilePreview;
pub use secrets::{resolve_secret, SecretError};
pub use service::{ConverterService, Download};
pub use storage::{ResultArtifact, ResultStore};
pub use transform::{FieldTransform, Mode, PolicyCipher, TransformClient};
