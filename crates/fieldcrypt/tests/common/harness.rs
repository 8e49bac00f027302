//! Test harness for isolated service runs.

#![allow(dead_code)]

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use fieldcrypt::{ConverterService, FieldTransform, Job, ServiceConfig, TransformClient};

const JOB_TIMEOUT: Duration = Duration::from_secs(20);

/// Temp directory with an `uploads/` area and a `work/` dir for the service.
pub struct TestHarness {
    temp_dir: TempDir,
    pub upload_dir: PathBuf,
    pub work_dir: PathBuf,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let upload_dir = temp_dir.path().join("uploads");
        let work_dir = temp_dir.path().join("work");
        std::fs::create_dir_all(&upload_dir).expect("Failed to create upload dir");

        Self {
            temp_dir,
            upload_dir,
            work_dir,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn write_upload(&self, filename: &str, content: &str) -> PathBuf {
        let path = self.upload_dir.join(filename);
        std::fs::write(&path, content).expect("Failed to write upload");
        path
    }

    /// Service whose client is built from `config.transform`.
    pub fn service(&self, config: &ServiceConfig) -> ConverterService {
        ConverterService::new(config).expect("Failed to start service")
    }

    /// Service driving a test double instead of the policy cipher.
    pub fn service_with(
        &self,
        config: &ServiceConfig,
        backend: Arc<dyn FieldTransform>,
    ) -> ConverterService {
        let client = Arc::new(TransformClient::with_backend(backend));
        ConverterService::with_client(config, client).expect("Failed to start service")
    }

    /// Polls until the job is terminal.
    pub fn wait_for_job(&self, service: &ConverterService, job_id: &str) -> Job {
        let deadline = Instant::now() + JOB_TIMEOUT;
        loop {
            let job = service.status(job_id).expect("Job disappeared");
            if job.is_finished() {
                return job;
            }
            assert!(
                Instant::now() < deadline,
                "Job {} stuck in {}",
                job_id,
                job.status
            );
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Reads the artifact behind a completed job's token.
    pub fn read_result(&self, service: &ConverterService, job: &Job) -> String {
        let token = job.result_token.as_deref().expect("Job has no result token");
        let mut download = service
            .download(token)
            .expect("Download failed")
            .expect("Result not found");
        let mut content = String::new();
        download
            .file
            .read_to_string(&mut content)
            .expect("Failed to read result");
        content
    }
}
