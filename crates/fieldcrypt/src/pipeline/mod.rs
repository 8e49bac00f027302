pub mod line;
pub mod pool;
pub mod progress;
pub mod request;
pub mod runner;

pub use line::{LineTransformer, TransformedLine, FIELD_ERROR_SENTINEL};
pub use progress::{NoopProgress, ProgressEvent, ProgressReporter};
pub use request::{output_filename, Delimiter, TransformRequest};
pub use runner::{ChunkedPipeline, LineCounts, PipelineOutcome, LINE_ERROR_SENTINEL};
