use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::TransformRequest;
use crate::transform::Mode;

/// Lifecycle of a job. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Uploading,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Uploading => "UPLOADING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Polling view of one submitted file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_id: String,
    /// Original upload name.
    pub filename: String,
    pub mode: Mode,
    pub policy: String,
    pub status: JobStatus,
    /// Known once the input has been read to the end.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_lines: Option<u64>,
    pub processed_lines: u64,
    pub error_count: u64,
    pub submitted_at: DateTime<Utc>,
    /// Submission time until a runner picks the job up, then the moment
    /// processing began. `duration` is measured from here.
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Human readable run time, e.g. `1.250s`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    /// Download token, set only once the job is `Completed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Job {
    pub(crate) fn new(job_id: &str, filename: &str, request: &TransformRequest) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.to_string(),
            filename: filename.to_string(),
            mode: request.mode,
            policy: request.policy.clone(),
            status: JobStatus::Uploading,
            total_lines: None,
            processed_lines: 0,
            error_count: 0,
            submitted_at: now,
            start_time: now,
            end_time: None,
            duration: None,
            duration_ms: None,
            result_token: None,
            error_message: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    pub(crate) fn start(&mut self) -> bool {
        if self.status != JobStatus::Uploading {
            return false;
        }
        self.status = JobStatus::Processing;
        self.start_time = Utc::now();
        true
    }

    /// Adds one drained chunk to the counters.
    pub(crate) fn record_chunk(&mut self, processed: u64, errors: u64) {
        if self.is_finished() {
            return;
        }
        self.processed_lines += processed;
        self.error_count += errors;
    }

    pub(crate) fn set_total_lines(&mut self, total: u64) {
        if !self.is_finished() {
            self.total_lines = Some(total);
        }
    }

    pub(crate) fn complete(&mut self, token: String) -> bool {
        if self.is_finished() {
            return false;
        }
        self.status = JobStatus::Completed;
        self.result_token = Some(token);
        self.stamp_end();
        true
    }

    pub(crate) fn fail(&mut self, message: String) -> bool {
        if self.is_finished() {
            return false;
        }
        self.status = JobStatus::Failed;
        self.error_message = Some(message);
        self.stamp_end();
        true
    }

    fn stamp_end(&mut self) {
        let end = Utc::now();
        let ms = (end - self.start_time).num_milliseconds().max(0);
        self.end_time = Some(end);
        self.duration_ms = Some(ms);
        self.duration = Some(format_duration(ms));
    }
}

pub(crate) fn format_duration(ms: i64) -> String {
    format!("{}.{:03}s", ms / 1000, ms % 1000)
}

/// Number of jobs in each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCounts {
    pub uploading: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl JobCounts {
    pub(crate) fn add(&mut self, status: JobStatus) {
        match status {
            JobStatus::Uploading => self.uploading += 1,
            JobStatus::Processing => self.processing += 1,
            JobStatus::Completed => self.completed += 1,
            JobStatus::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.uploading + self.processing + self.completed + self.failed
    }
}
