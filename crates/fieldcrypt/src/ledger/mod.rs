//! Asynchronous job tracking: submission, background execution, polling.

pub mod job;

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use log::{error, info, warn};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::broadcast::{JobEvent, JobEventBroadcaster, JobEventKind};
use crate::config::{PipelineSettings, ServiceConfig};
use crate::error::LedgerError;
use crate::pipeline::{ChunkedPipeline, ProgressEvent, ProgressReporter, TransformRequest};
use crate::sanitize;
use crate::storage::{ResultArtifact, ResultStore, UploadSpool};
use crate::transform::TransformClient;
use crate::worker::JobScheduler;

pub use job::{Job, JobCounts, JobStatus};

/// Registry of submitted jobs plus the scheduler that runs them.
///
/// Construct once at service start and share; every method takes `&self`.
pub struct JobLedger {
    inner: Arc<LedgerInner>,
    scheduler: JobScheduler,
}

struct LedgerInner {
    jobs: RwLock<HashMap<String, Job>>,
    results: ResultStore,
    spool: UploadSpool,
    events: JobEventBroadcaster,
    client: Arc<TransformClient>,
    pipeline: PipelineSettings,
}

impl JobLedger {
    pub fn new(config: &ServiceConfig, client: Arc<TransformClient>) -> Result<Self, LedgerError> {
        Self::with_results(config, client, ResultStore::from_settings(&config.results))
    }

    pub fn with_results(
        config: &ServiceConfig,
        client: Arc<TransformClient>,
        results: ResultStore,
    ) -> Result<Self, LedgerError> {
        let work_dir = &config.jobs.work_dir;
        std::fs::create_dir_all(work_dir).map_err(|source| LedgerError::CreateDirectory {
            path: work_dir.clone(),
            source,
        })?;

        let scheduler =
            JobScheduler::spawn(config.jobs.max_concurrent_jobs, config.jobs.queue_capacity)?;

        Ok(Self {
            inner: Arc::new(LedgerInner {
                jobs: RwLock::new(HashMap::new()),
                results,
                spool: UploadSpool::new(work_dir),
                events: JobEventBroadcaster::default(),
                client,
                pipeline: config.pipeline,
            }),
            scheduler,
        })
    }

    /// Registers a job, spools the upload and queues it. Returns the job id
    /// without waiting for any line to be processed.
    pub fn submit<R: Read>(
        &self,
        filename: &str,
        upload: R,
        request: TransformRequest,
    ) -> Result<String, LedgerError> {
        let job_id = self.register(filename, &request);
        let input = self
            .inner
            .spool
            .persist_reader(&job_id, filename, upload)
            .map_err(|e| self.reject(&job_id, None, e))?;
        self.enqueue(job_id, filename, input, request)
    }

    /// Like [`submit`](Self::submit) for an upload already on disk; the file
    /// is moved into the work directory.
    pub fn submit_file(
        &self,
        filename: &str,
        upload: &Path,
        request: TransformRequest,
    ) -> Result<String, LedgerError> {
        let job_id = self.register(filename, &request);
        let input = self
            .inner
            .spool
            .persist_file(&job_id, filename, upload)
            .map_err(|e| self.reject(&job_id, None, e))?;
        self.enqueue(job_id, filename, input, request)
    }

    /// `None` means no such job.
    pub fn get_status(&self, job_id: &str) -> Option<Job> {
        self.inner.read_jobs().get(job_id).cloned()
    }

    /// The artifact of a completed job, if it is still held.
    pub fn get_result(&self, job_id: &str) -> Option<ResultArtifact> {
        let token = {
            let jobs = self.inner.read_jobs();
            let job = jobs.get(job_id)?;
            if job.status != JobStatus::Completed {
                return None;
            }
            job.result_token.clone()?
        };
        self.inner.results.fetch(&token)
    }

    /// Looks up an artifact by its download token.
    pub fn fetch_result(&self, token: &str) -> Option<ResultArtifact> {
        self.inner.results.fetch(token)
    }

    /// All known jobs, newest first.
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.inner.read_jobs().values().cloned().collect();
        jobs.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        jobs
    }

    pub fn counts(&self) -> JobCounts {
        let mut counts = JobCounts::default();
        for job in self.inner.read_jobs().values() {
            counts.add(job.status);
        }
        counts
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    pub fn results(&self) -> &ResultStore {
        &self.inner.results
    }

    /// Drops finished jobs older than the result TTL together with their
    /// artifacts. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let ttl = match chrono::Duration::from_std(self.inner.results.ttl()) {
            Ok(ttl) => ttl,
            Err(_) => return 0,
        };
        let cutoff = Utc::now() - ttl;

        let expired: Vec<Job> = {
            let mut jobs = self.inner.write_jobs();
            let ids: Vec<String> = jobs
                .values()
                .filter(|job| job.end_time.map(|end| end <= cutoff).unwrap_or(false))
                .map(|job| job.job_id.clone())
                .collect();
            ids.iter().filter_map(|id| jobs.remove(id)).collect()
        };

        for job in &expired {
            if let Some(token) = &job.result_token {
                self.inner.results.remove(token);
            }
            self.inner.spool.remove_job_dir(&job.job_id);
        }
        self.inner.results.purge_expired();

        if !expired.is_empty() {
            info!("Purged {} expired jobs", expired.len());
        }
        expired.len()
    }

    /// Finishes queued jobs and stops the runners.
    pub fn shutdown(self) {
        self.scheduler.wait();
    }

    fn register(&self, filename: &str, request: &TransformRequest) -> String {
        let job_id = Uuid::new_v4().to_string();
        let job = Job::new(&job_id, filename, request);
        let event = JobEvent::from_job(&job, JobEventKind::Submitted);

        self.inner.write_jobs().insert(job_id.clone(), job);
        self.inner.events.send(event);
        info!(
            "Job {} submitted for {} ({} under '{}')",
            job_id,
            sanitize::safe_filename(filename),
            request.mode,
            request.policy
        );
        job_id
    }

    fn enqueue(
        &self,
        job_id: String,
        filename: &str,
        input: PathBuf,
        request: TransformRequest,
    ) -> Result<String, LedgerError> {
        let inner = Arc::clone(&self.inner);
        let task_job_id = job_id.clone();
        let task_input = input.clone();
        let filename = filename.to_string();

        self.scheduler
            .try_submit(Box::new(move || {
                inner.run_job(&task_job_id, &filename, &task_input, &request)
            }))
            .map_err(|e| self.reject(&job_id, Some(&input), e))?;

        Ok(job_id)
    }

    /// Marks a job that never reached a runner as failed and cleans up.
    fn reject(&self, job_id: &str, input: Option<&Path>, err: LedgerError) -> LedgerError {
        warn!("Job {} rejected: {}", job_id, err);
        if let Some(input) = input {
            self.inner.spool.discard(input);
        }
        self.inner.spool.remove_job_dir(job_id);
        self.inner
            .update(job_id, JobEventKind::Failed, |job| job.fail(err.to_string()));
        err
    }
}

impl LedgerInner {
    fn run_job(self: &Arc<Self>, job_id: &str, filename: &str, input: &Path, request: &TransformRequest) {
        self.update(job_id, JobEventKind::Started, Job::start);

        let transform = self.client.snapshot();
        let pipeline = ChunkedPipeline::new(transform, self.pipeline);
        let output_name = request.output_filename(filename);
        let output = self.spool.output_path(job_id, &output_name);
        let progress = LedgerProgress {
            ledger: Arc::clone(self),
            job_id: job_id.to_string(),
        };

        let outcome = pipeline
            .run(request, input, &output, &progress)
            .map_err(|e| e.to_string())
            .and_then(|_| {
                ResultArtifact::from_file(&output, &output_name)
                    .map_err(|e| format!("Failed to read result '{}': {}", output_name, e))
            });

        match outcome {
            Ok(artifact) => {
                let token = Uuid::new_v4().to_string();
                self.results.store(&token, artifact);
                self.update(job_id, JobEventKind::Completed, |job| job.complete(token));
                info!("Job {} completed", job_id);
            }
            Err(message) => {
                error!("Job {} failed: {}", job_id, message);
                self.spool.discard(&output);
                self.update(job_id, JobEventKind::Failed, |job| job.fail(message));
            }
        }

        self.spool.discard(input);
    }

    /// Applies `change` under the write lock and publishes the new state.
    fn update<T>(&self, job_id: &str, kind: JobEventKind, change: impl FnOnce(&mut Job) -> T) {
        let event = {
            let mut jobs = self.write_jobs();
            let Some(job) = jobs.get_mut(job_id) else {
                warn!("Update for unknown job {}", job_id);
                return;
            };
            change(job);
            JobEvent::from_job(job, kind)
        };
        self.events.send(event);
    }

    fn read_jobs(&self) -> RwLockReadGuard<'_, HashMap<String, Job>> {
        match self.jobs.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Job ledger lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_jobs(&self) -> RwLockWriteGuard<'_, HashMap<String, Job>> {
        match self.jobs.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Job ledger lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

/// Feeds pipeline progress into the job record.
struct LedgerProgress {
    ledger: Arc<LedgerInner>,
    job_id: String,
}

impl ProgressReporter for LedgerProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::ChunkDrained { processed, errors } => {
                self.ledger
                    .update(&self.job_id, JobEventKind::Progress, |job| {
                        job.record_chunk(processed, errors)
                    });
            }
            ProgressEvent::InputExhausted { total_lines } => {
                self.ledger
                    .update(&self.job_id, JobEventKind::InputExhausted, |job| {
                        job.set_total_lines(total_lines)
                    });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::line::test_support::{BracketTransform, FailOn};
    use crate::transform::{FieldTransform, Mode};
    use std::io::Cursor;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn ledger(dir: &TempDir, backend: impl FieldTransform + 'static) -> JobLedger {
        let mut config = ServiceConfig::default();
        config.jobs.work_dir = dir.path().join("work");
        config.jobs.max_concurrent_jobs = 2;
        config.pipeline.chunk_size = 2;
        JobLedger::new(&config, Arc::new(TransformClient::with_backend(Arc::new(backend))))
            .unwrap()
    }

    fn request(columns: &[usize], skip_header: bool) -> TransformRequest {
        TransformRequest::new(Mode::Protect, columns.iter().copied(), "pii", ",", skip_header)
            .unwrap()
    }

    fn wait_terminal(ledger: &JobLedger, job_id: &str) -> Job {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let job = ledger.get_status(job_id).unwrap();
            if job.is_finished() {
                return job;
            }
            assert!(Instant::now() < deadline, "job did not finish");
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_job_completes_with_artifact() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir, BracketTransform);

        let id = ledger
            .submit("people.csv", Cursor::new("id,name\n1,ann\n\n2,bob\n3,cy\n"), request(&[1], true))
            .unwrap();
        let job = wait_terminal(&ledger, &id);

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.total_lines, Some(3));
        assert_eq!(job.processed_lines, 3);
        assert_eq!(job.error_count, 0);
        assert!(job.result_token.is_some());

        let artifact = ledger.get_result(&id).unwrap();
        assert_eq!(artifact.filename, "protect_people.csv");
        assert_eq!(
            std::fs::read_to_string(&artifact.path).unwrap(),
            "id,name\n1,<pii:ann>\n2,<pii:bob>\n3,<pii:cy>\n"
        );

        let token = job.result_token.unwrap();
        assert_eq!(ledger.fetch_result(&token), Some(artifact));
        // Job ids are not download tokens.
        assert!(ledger.fetch_result(&id).is_none());
    }

    #[test]
    fn test_input_removed_after_run() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir, BracketTransform);

        let id = ledger
            .submit("a.csv", Cursor::new("x,y\n"), request(&[0], false))
            .unwrap();
        wait_terminal(&ledger, &id);

        let input = dir.path().join("work").join(&id).join("input_a.csv");
        assert!(!input.exists());
    }

    #[test]
    fn test_field_errors_still_complete() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir, FailOn("bad"));

        let id = ledger
            .submit("a.csv", Cursor::new("ok\nbad\nok\n"), request(&[0], false))
            .unwrap();
        let job = wait_terminal(&ledger, &id);

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.error_count, 1);
        assert_eq!(job.processed_lines, 3);
    }

    #[test]
    fn test_events_follow_lifecycle() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir, BracketTransform);
        let mut rx = ledger.subscribe();

        let id = ledger
            .submit("a.csv", Cursor::new("1\n2\n3\n"), request(&[0], false))
            .unwrap();

        let mut kinds = Vec::new();
        loop {
            let event = rx.blocking_recv().unwrap();
            assert_eq!(event.job_id, id);
            kinds.push(event.kind);
            if event.status.is_terminal() {
                break;
            }
        }

        assert_eq!(
            kinds,
            vec![
                JobEventKind::Submitted,
                JobEventKind::Started,
                JobEventKind::Progress,
                JobEventKind::InputExhausted,
                JobEventKind::Progress,
                JobEventKind::Completed,
            ]
        );
    }

    #[test]
    fn test_counters_stay_consistent_while_processing() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir, BracketTransform);
        let mut rx = ledger.subscribe();

        let input: String = (0..7).map(|i| format!("{}\n", i)).collect();
        let id = ledger
            .submit("a.csv", Cursor::new(input), request(&[0], false))
            .unwrap();

        let mut events = Vec::new();
        loop {
            let event = rx.blocking_recv().unwrap();
            let done = event.status.is_terminal();
            events.push(event);
            if done {
                break;
            }
        }

        let mut last_processed = 0;
        for event in &events {
            assert!(event.processed_lines >= last_processed, "{:?}", event);
            last_processed = event.processed_lines;

            if let Some(total) = event.total_lines {
                assert!(event.processed_lines <= total, "{:?}", event);
            }
            assert_eq!(
                event.result_token.is_some(),
                event.status == JobStatus::Completed,
                "{:?}",
                event
            );
            match event.kind {
                JobEventKind::Submitted => assert_eq!(event.status, JobStatus::Uploading),
                JobEventKind::Completed => {}
                _ => assert_eq!(event.status, JobStatus::Processing, "{:?}", event),
            }
        }

        let progress: Vec<u64> = events
            .iter()
            .filter(|e| e.kind == JobEventKind::Progress)
            .map(|e| e.processed_lines)
            .collect();
        assert_eq!(progress, vec![2, 4, 6, 7]);

        let last = events.last().unwrap();
        assert_eq!(last.kind, JobEventKind::Completed);
        assert_eq!(last.total_lines, Some(7));
        assert_eq!(last.processed_lines, 7);
        assert_eq!(ledger.get_status(&id).unwrap().processed_lines, 7);
    }

    #[test]
    fn test_badly_encoded_line_does_not_fail_job() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir, BracketTransform);

        let id = ledger
            .submit(
                "latin1.csv",
                Cursor::new(b"a,b,c\ncaf\xe9,x,y\nd,e,f\n".to_vec()),
                request(&[1], false),
            )
            .unwrap();
        let job = wait_terminal(&ledger, &id);

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.total_lines, Some(3));
        assert_eq!(job.processed_lines, 3);
        let artifact = ledger.get_result(&id).unwrap();
        assert_eq!(
            std::fs::read_to_string(&artifact.path).unwrap(),
            "a,<pii:b>,c\ncaf\u{FFFD},<pii:x>,y\nd,<pii:e>,f\n"
        );
    }

    #[test]
    fn test_newest_result_survives_full_store() {
        let dir = TempDir::new().unwrap();
        let mut config = ServiceConfig::default();
        config.jobs.work_dir = dir.path().join("work");
        let ledger = JobLedger::with_results(
            &config,
            Arc::new(TransformClient::with_backend(Arc::new(BracketTransform))),
            ResultStore::new(Duration::from_secs(60), 2),
        )
        .unwrap();

        for i in 0..6 {
            let id = ledger
                .submit("a.csv", Cursor::new(format!("{}\n", i)), request(&[0], false))
                .unwrap();
            let job = wait_terminal(&ledger, &id);
            assert_eq!(job.status, JobStatus::Completed);

            let artifact = ledger.get_result(&id).unwrap();
            assert!(artifact.path.exists(), "job {} lost its artifact", i);
        }
    }

    #[test]
    fn test_unknown_job() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir, BracketTransform);
        assert!(ledger.get_status("nope").is_none());
        assert!(ledger.get_result("nope").is_none());
    }

    #[test]
    fn test_list_and_counts() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir, BracketTransform);

        let first = ledger
            .submit("a.csv", Cursor::new("1\n"), request(&[0], false))
            .unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let second = ledger
            .submit("b.csv", Cursor::new("2\n"), request(&[0], false))
            .unwrap();
        wait_terminal(&ledger, &first);
        wait_terminal(&ledger, &second);

        let ids: Vec<String> = ledger.list().into_iter().map(|j| j.job_id).collect();
        assert_eq!(ids, vec![second, first]);
        assert_eq!(ledger.counts().completed, 2);
    }

    #[test]
    fn test_purge_expired_removes_jobs_and_artifacts() {
        let dir = TempDir::new().unwrap();
        let mut config = ServiceConfig::default();
        config.jobs.work_dir = dir.path().join("work");
        let ledger = JobLedger::with_results(
            &config,
            Arc::new(TransformClient::with_backend(Arc::new(BracketTransform))),
            ResultStore::new(Duration::from_millis(300), 10),
        )
        .unwrap();

        let id = ledger
            .submit("a.csv", Cursor::new("1\n"), request(&[0], false))
            .unwrap();
        let job = wait_terminal(&ledger, &id);
        let path = ledger.get_result(&id).unwrap().path;
        assert!(job.result_token.is_some());

        std::thread::sleep(Duration::from_millis(400));
        assert_eq!(ledger.purge_expired(), 1);

        assert!(ledger.get_status(&id).is_none());
        assert!(!path.exists());
    }
}
