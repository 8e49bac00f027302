//! Job progress broadcaster for streaming job state instead of polling.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::ledger::{Job, JobStatus};

/// What happened to a job.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobEventKind {
    Submitted,
    Started,
    /// A chunk of lines was written.
    Progress,
    /// All input lines are known; `totalLines` is set.
    InputExhausted,
    Completed,
    Failed,
}

impl std::fmt::Display for JobEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobEventKind::Submitted => write!(f, "Submitted"),
            JobEventKind::Started => write!(f, "Started"),
            JobEventKind::Progress => write!(f, "Progress"),
            JobEventKind::InputExhausted => write!(f, "Input exhausted"),
            JobEventKind::Completed => write!(f, "Completed"),
            JobEventKind::Failed => write!(f, "Failed"),
        }
    }
}

/// Snapshot of a job at the moment something changed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub job_id: String,
    pub filename: String,
    pub kind: JobEventKind,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_lines: Option<u64>,
    pub processed_lines: u64,
    pub error_count: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobEvent {
    pub fn from_job(job: &Job, kind: JobEventKind) -> Self {
        Self {
            job_id: job.job_id.clone(),
            filename: job.filename.clone(),
            kind,
            status: job.status,
            total_lines: job.total_lines,
            processed_lines: job.processed_lines,
            error_count: job.error_count,
            timestamp: Utc::now(),
            result_token: job.result_token.clone(),
            error: job.error_message.clone(),
        }
    }
}

/// Broadcasts job events to any number of subscribers.
#[derive(Clone)]
pub struct JobEventBroadcaster {
    sender: Arc<broadcast::Sender<JobEvent>>,
}

impl JobEventBroadcaster {
    /// Creates a broadcaster; slow subscribers lag after `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: JobEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for JobEventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}
