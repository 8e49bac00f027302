//! Facade tying the transform client, job ledger and result store together
//! for an outer HTTP or CLI surface.

use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read};
use std::path::Path;
use std::sync::Arc;

use log::{info, warn};
use tokio::sync::broadcast;

use crate::broadcast::JobEvent;
use crate::config::{ServiceConfig, TransformSettings};
use crate::error::{RequestError, ServiceError};
use crate::ledger::{Job, JobCounts, JobLedger};
use crate::pipeline::{Delimiter, TransformRequest};
use crate::preview::{FilePreview, RESULT_PREVIEW_LINES, UPLOAD_PREVIEW_ROWS};
use crate::storage::ResultArtifact;
use crate::transform::{FieldTransform, TransformClient};

/// An artifact opened for streaming to a client.
pub struct Download {
    pub artifact: ResultArtifact,
    pub file: File,
}

pub struct ConverterService {
    client: Arc<TransformClient>,
    ledger: JobLedger,
}

impl ConverterService {
    /// Builds the client from `config.transform` and starts the job runners.
    pub fn new(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let client = Arc::new(TransformClient::from_settings(config.transform.as_ref()));
        Self::with_client(config, client)
    }

    pub fn with_client(
        config: &ServiceConfig,
        client: Arc<TransformClient>,
    ) -> Result<Self, ServiceError> {
        let ledger = JobLedger::new(config, Arc::clone(&client))?;
        Ok(Self { client, ledger })
    }

    /// Shows the first rows of an upload split with `delimiter`.
    pub fn preview<R: Read>(
        &self,
        filename: &str,
        upload: R,
        delimiter: &str,
    ) -> Result<FilePreview, ServiceError> {
        let delimiter = Delimiter::parse(delimiter)?;
        FilePreview::from_reader(
            filename,
            BufReader::new(upload),
            &delimiter,
            UPLOAD_PREVIEW_ROWS,
        )
        .map_err(ServiceError::ReadUpload)
    }

    /// Builds a request from form values, falling back to the configured
    /// default policy when none is given.
    pub fn build_request(
        &self,
        mode: &str,
        columns: &[usize],
        policy: Option<&str>,
        delimiter: &str,
        skip_header: bool,
    ) -> Result<TransformRequest, ServiceError> {
        let policy = match policy.map(str::trim).filter(|p| !p.is_empty()) {
            Some(policy) => policy.to_string(),
            None => self
                .client
                .default_policy()
                .ok_or(RequestError::EmptyPolicy)?,
        };
        Ok(TransformRequest::parse(
            mode,
            columns,
            &policy,
            delimiter,
            skip_header,
        )?)
    }

    /// Checks the upload with one sample transform, then queues it.
    /// Returns the job id.
    pub fn process<R: Read>(
        &self,
        filename: &str,
        upload: R,
        request: TransformRequest,
    ) -> Result<String, ServiceError> {
        let mut reader = BufReader::new(upload);
        let consumed = self.preflight(&mut reader, &request)?;
        let job_id = self
            .ledger
            .submit(filename, Cursor::new(consumed).chain(reader), request)?;
        Ok(job_id)
    }

    /// Like [`process`](Self::process) for an upload already on disk.
    pub fn process_file(
        &self,
        filename: &str,
        upload: &Path,
        request: TransformRequest,
    ) -> Result<String, ServiceError> {
        let file = File::open(upload).map_err(ServiceError::ReadUpload)?;
        self.preflight(&mut BufReader::new(file), &request)?;
        Ok(self.ledger.submit_file(filename, upload, request)?)
    }

    /// Applies `settings` to the client before queueing the upload.
    pub fn process_with_settings<R: Read>(
        &self,
        filename: &str,
        upload: R,
        request: TransformRequest,
        settings: TransformSettings,
    ) -> Result<String, ServiceError> {
        self.reconfigure(settings)?;
        self.process(filename, upload, request)
    }

    /// `None` means no such job.
    pub fn status(&self, job_id: &str) -> Option<Job> {
        self.ledger.get_status(job_id)
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.ledger.list()
    }

    pub fn counts(&self) -> JobCounts {
        self.ledger.counts()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.ledger.subscribe()
    }

    /// Opens the artifact for a token. `Ok(None)` for unknown or expired tokens.
    pub fn download(&self, token: &str) -> Result<Option<Download>, ServiceError> {
        let Some(artifact) = self.ledger.fetch_result(token) else {
            return Ok(None);
        };
        match File::open(&artifact.path) {
            Ok(file) => Ok(Some(Download { artifact, file })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Result for token {} is gone from disk", token);
                Ok(None)
            }
            Err(source) => Err(ServiceError::OpenResult {
                path: artifact.path,
                source,
            }),
        }
    }

    /// First lines of a finished result.
    pub fn preview_result(&self, token: &str) -> Result<Option<FilePreview>, ServiceError> {
        let Some(download) = self.download(token)? else {
            return Ok(None);
        };
        let preview = FilePreview::from_result(
            &download.artifact.filename,
            BufReader::new(download.file),
            RESULT_PREVIEW_LINES,
        )
        .map_err(|source| ServiceError::OpenResult {
            path: download.artifact.path.clone(),
            source,
        })?;
        Ok(Some(preview))
    }

    /// Active transform settings with key material masked.
    pub fn transform_settings(&self) -> Option<TransformSettings> {
        self.client.settings_view()
    }

    /// Replaces the transform backend for jobs started from now on.
    pub fn reconfigure(&self, settings: TransformSettings) -> Result<(), ServiceError> {
        self.client.reconfigure(settings)?;
        Ok(())
    }

    pub fn purge_expired(&self) -> usize {
        self.ledger.purge_expired()
    }

    pub fn ledger(&self) -> &JobLedger {
        &self.ledger
    }

    pub fn shutdown(self) {
        info!("Shutting down converter service");
        self.ledger.shutdown();
    }

    /// Transforms the first selected field of the first data line.
    ///
    /// Returns the bytes read so the caller can replay them in front of the
    /// rest of the stream. Reads nothing when pre-flight checks are off.
    fn preflight<R: BufRead>(
        &self,
        reader: &mut R,
        request: &TransformRequest,
    ) -> Result<Vec<u8>, ServiceError> {
        let mut consumed = Vec::new();
        if !self.client.preflight_enabled() {
            return Ok(consumed);
        }
        let Some(&column) = request.columns.first() else {
            return Ok(consumed);
        };

        let mut header_pending = request.skip_header;
        let mut line = String::new();
        loop {
            line.clear();
            let read = reader
                .read_line(&mut line)
                .map_err(ServiceError::ReadUpload)?;
            if read == 0 {
                return Ok(consumed);
            }
            consumed.extend_from_slice(line.as_bytes());

            let content = line.trim_end_matches(['\n', '\r']);
            if content.trim().is_empty() {
                continue;
            }
            if header_pending {
                header_pending = false;
                continue;
            }

            let sample = request
                .delimiter
                .split(content)
                .get(column)
                .map(|field| field.to_string());
            if let Some(sample) = sample.filter(|s| !s.is_empty()) {
                self.client
                    .snapshot()
                    .apply(request.mode, &sample, &request.policy)
                    .map_err(|source| ServiceError::Preflight {
                        policy: request.policy.clone(),
                        source,
                    })?;
            }
            return Ok(consumed);
        }
    }
}
