use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, error, info};

use crate::error::LedgerError;

/// A unit of background work, usually one whole job.
pub type JobTask = Box<dyn FnOnce() + Send + 'static>;

/// Runs background jobs on a fixed set of runner threads.
///
/// Pending work waits in a bounded queue; when it is full, new work is
/// refused instead of spawning more threads.
pub struct JobScheduler {
    task_sender: Option<Sender<JobTask>>,
    runners: Vec<JoinHandle<()>>,
    queue_capacity: usize,
}

impl JobScheduler {
    pub fn spawn(runner_count: usize, queue_capacity: usize) -> Result<Self, LedgerError> {
        let runner_count = runner_count.max(1);
        let queue_capacity = queue_capacity.max(1);
        let (task_sender, task_receiver) = bounded::<JobTask>(queue_capacity);

        let mut scheduler = Self {
            task_sender: Some(task_sender),
            runners: Vec::with_capacity(runner_count),
            queue_capacity,
        };

        for runner_id in 0..runner_count {
            let task_rx = task_receiver.clone();

            let handle = thread::Builder::new()
                .name(format!("fieldcrypt-job-{}", runner_id))
                .spawn(move || run_runner(runner_id, task_rx))
                .map_err(LedgerError::SpawnRunner)?;

            scheduler.runners.push(handle);
        }

        info!(
            "Started {} job runners (queue capacity {})",
            runner_count, queue_capacity
        );
        Ok(scheduler)
    }

    /// Queues a task without blocking.
    pub fn try_submit(&self, task: JobTask) -> Result<(), LedgerError> {
        let sender = self
            .task_sender
            .as_ref()
            .ok_or(LedgerError::SchedulerClosed)?;

        sender.try_send(task).map_err(|e| match e {
            TrySendError::Full(_) => LedgerError::QueueFull {
                capacity: self.queue_capacity,
            },
            TrySendError::Disconnected(_) => LedgerError::SchedulerClosed,
        })
    }

    /// Tasks accepted but not yet picked up by a runner.
    pub fn pending(&self) -> usize {
        self.task_sender.as_ref().map(|s| s.len()).unwrap_or(0)
    }

    /// Stops accepting work, finishes queued tasks and joins the runners.
    pub fn wait(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.task_sender.take().is_none() {
            return;
        }

        for (i, runner) in self.runners.drain(..).enumerate() {
            if let Err(e) = runner.join() {
                error!("Job runner {} panicked: {:?}", i, e);
            } else {
                debug!("Job runner {} finished", i);
            }
        }

        info!("All job runners have stopped");
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_runner(runner_id: usize, task_receiver: Receiver<JobTask>) {
    debug!("Job runner {} started", runner_id);

    for task in task_receiver.iter() {
        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            error!("Job runner {} recovered from a panicking task", runner_id);
        }
    }

    debug!("Job runner {} stopped", runner_id);
}
