use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, error, info};

use crate::jobs::runner::{JobRunner, QueuedJob};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubmitError {
    /// The queue is at capacity.
    Full,
    /// The pool is shut down.
    Closed,
}

/// Fixed set of worker threads fed by a bounded queue.
///
/// Each worker owns a current-thread tokio runtime and runs one job at a
/// time, so a job may block on external processes without stalling others.
pub(crate) struct WorkerPool {
    job_sender: RwLock<Option<Sender<QueuedJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(
        runner: Arc<JobRunner>,
        worker_count: usize,
        queue_capacity: usize,
    ) -> std::io::Result<Self> {
        let worker_count = worker_count.max(1);
        let (job_sender, job_receiver) = bounded::<QueuedJob>(queue_capacity.max(1));
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let worker_runner = Arc::clone(&runner);

            let handle = thread::Builder::new()
                .name(format!("prism-worker-{}", worker_id))
                .spawn(move || run_worker(worker_id, job_rx, worker_runner))?;
            workers.push(handle);
        }

        info!("Started {} job workers", worker_count);

        Ok(Self {
            job_sender: RwLock::new(Some(job_sender)),
            workers: Mutex::new(workers),
            shutdown,
        })
    }

    /// Enqueues a job without blocking.
    pub fn try_submit(&self, job: QueuedJob) -> Result<(), SubmitError> {
        if self.is_shutdown() {
            return Err(SubmitError::Closed);
        }

        let sender = match self.job_sender.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        match sender.as_ref() {
            Some(sender) => sender.try_send(job).map_err(|e| match e {
                TrySendError::Full(_) => SubmitError::Full,
                TrySendError::Disconnected(_) => SubmitError::Closed,
            }),
            None => Err(SubmitError::Closed),
        }
    }

    /// Stops accepting jobs, lets workers drain the queue, and joins them.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down job workers...");

        // Dropping the sender disconnects workers once the queue is empty.
        match self.job_sender.write() {
            Ok(mut g) => drop(g.take()),
            Err(poisoned) => drop(poisoned.into_inner().take()),
        }

        let workers = match self.workers.lock() {
            Ok(mut g) => std::mem::take(&mut *g),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for (i, worker) in workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All job workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

fn run_worker(worker_id: usize, job_receiver: Receiver<QueuedJob>, runner: Arc<JobRunner>) {
    debug!("Worker {} started", worker_id);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => Some(rt),
        Err(e) => {
            error!("Worker {} failed to build runtime: {}", worker_id, e);
            None
        }
    };

    while let Ok(job) = job_receiver.recv() {
        debug!("Worker {} processing job {}", worker_id, job.id);
        match &runtime {
            Some(rt) => rt.block_on(runner.execute(job)),
            None => runner.abandon(job, "worker runtime unavailable"),
        }
    }

    debug!("Worker {} stopped", worker_id);
}
