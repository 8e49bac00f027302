pub mod result_store;
pub mod spool;

pub use result_store::{ResultArtifact, ResultStore};
pub use spool::UploadSpool;
