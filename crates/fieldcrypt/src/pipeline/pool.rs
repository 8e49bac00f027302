use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error};

use super::line::{LineTransformer, TransformedLine};
use crate::error::PipelineError;

/// One input line waiting for a worker.
struct LineTask {
    index: u64,
    line: String,
    reply: Sender<TransformedLine>,
}

/// Handle to a submitted line. Resolves exactly once.
pub struct PendingLine {
    index: u64,
    receiver: Receiver<TransformedLine>,
}

impl PendingLine {
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Blocks until the worker finishes this line.
    ///
    /// `None` means the worker failed without producing a result.
    pub fn wait(self) -> Option<TransformedLine> {
        self.receiver.recv().ok()
    }
}

/// Fixed-size pool of line workers owned by a single job.
pub struct LinePool {
    task_sender: Option<Sender<LineTask>>,
    workers: Vec<JoinHandle<()>>,
}

impl LinePool {
    pub fn spawn(
        transformer: Arc<LineTransformer>,
        worker_count: usize,
    ) -> Result<Self, PipelineError> {
        let worker_count = worker_count.max(1);
        let (task_sender, task_receiver) = bounded::<LineTask>(worker_count * 2);

        let mut pool = Self {
            task_sender: Some(task_sender),
            workers: Vec::with_capacity(worker_count),
        };

        for worker_id in 0..worker_count {
            let task_rx = task_receiver.clone();
            let worker_transformer = Arc::clone(&transformer);

            // On error `pool` is dropped here, which stops the workers already started.
            let handle = thread::Builder::new()
                .name(format!("fieldcrypt-line-{}", worker_id))
                .spawn(move || run_worker(worker_id, task_rx, worker_transformer))
                .map_err(PipelineError::SpawnWorker)?;

            pool.workers.push(handle);
        }

        debug!("Started {} line workers", worker_count);
        Ok(pool)
    }

    /// Queues a line; blocks while the task queue is full.
    pub fn submit(&self, index: u64, line: String) -> Result<PendingLine, PipelineError> {
        let sender = self.task_sender.as_ref().ok_or(PipelineError::PoolClosed)?;
        let (reply, receiver) = bounded(1);

        sender
            .send(LineTask { index, line, reply })
            .map_err(|_| PipelineError::PoolClosed)?;

        Ok(PendingLine { index, receiver })
    }

    /// Closes the queue and joins every worker.
    pub fn wait(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the sender lets workers drain the queue and exit.
        self.task_sender.take();

        for (i, worker) in self.workers.drain(..).enumerate() {
            if let Err(e) = worker.join() {
                error!("Line worker {} panicked: {:?}", i, e);
            }
        }
    }
}

impl Drop for LinePool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(worker_id: usize, task_receiver: Receiver<LineTask>, transformer: Arc<LineTransformer>) {
    debug!("Line worker {} started", worker_id);

    for task in task_receiver.iter() {
        let LineTask { index, line, reply } = task;

        match panic::catch_unwind(AssertUnwindSafe(|| transformer.transform(&line))) {
            Ok(result) => {
                // The collector may have given up on this job already.
                let _ = reply.send(result);
            }
            Err(_) => {
                error!("Line worker {} failed on line {}", worker_id, index);
                drop(reply);
            }
        }
    }

    debug!("Line worker {} stopped", worker_id);
}
