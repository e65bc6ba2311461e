use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};

use crate::error::WorkerError;
use crate::task::{TaskError, TaskStore, HEARTBEAT_INTERVAL};
use crate::worker::codegen::CodeGenerationRunner;
use crate::worker::job::{CodeGenerationJob, JobResult, QueuedJob};

/// Fixed set of OS threads draining an unbounded job channel, plus one
/// thread keeping the runner's task claims alive.
///
/// Every queued job already sits `PENDING` in the task store, so the channel
/// holds nothing that is not durable and [`WorkerPool::submit`] never blocks.
pub struct WorkerPool {
    job_sender: Sender<QueuedJob>,
    result_receiver: Receiver<JobResult>,
    workers: Vec<JoinHandle<()>>,
    heartbeat_stop: Sender<()>,
    heartbeat: JoinHandle<()>,
    store: TaskStore,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Starts `worker_count` workers sharing one runner. A count of 0 is
    /// raised to 1.
    pub fn new(runner: Arc<CodeGenerationRunner>, worker_count: usize) -> Result<Self, WorkerError> {
        let worker_count = worker_count.max(1);
        let (job_sender, job_receiver) = unbounded::<QueuedJob>();
        let (result_sender, result_receiver) = bounded::<JobResult>(worker_count * 2);
        let shutdown = Arc::new(AtomicBool::new(false));

        let store = runner.store().clone();
        let (heartbeat_stop, stop_rx) = bounded::<()>(0);
        let beat_store = store.clone();
        let heartbeat = thread::Builder::new()
            .name("task-heartbeat".to_string())
            .spawn(move || run_heartbeat(beat_store, stop_rx))
            .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let result_tx = result_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_runner = Arc::clone(&runner);

            let handle = thread::Builder::new()
                .name(format!("codegen-worker-{}", worker_id))
                .spawn(move || {
                    run_worker(worker_id, job_rx, result_tx, shutdown_flag, worker_runner);
                })
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Ok(Self {
            job_sender,
            result_receiver,
            workers,
            heartbeat_stop,
            heartbeat,
            store,
            shutdown,
        })
    }

    /// Queues a job without waiting for a free worker.
    pub fn submit(&self, job: QueuedJob) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }

        self.job_sender
            .send(job)
            .map_err(|_| WorkerError::ChannelClosed)
    }

    /// Re-queues `PENDING` jobs left by processes that stopped and fails the
    /// ones they had mid-run. Returns how many were queued again.
    pub fn resume(&self, store: &TaskStore) -> Result<usize, TaskError> {
        let recovered = store.recover::<CodeGenerationJob>()?;
        let mut queued = 0;
        for task in recovered {
            let handle = task.handle.clone();
            if let Err(e) = self.submit(QueuedJob {
                handle: task.handle,
                job: task.payload,
            }) {
                error!("Failed to re-queue task {}: {}", handle, e);
                store.mark_failure(&handle, &e.to_string())?;
            } else {
                queued += 1;
            }
        }
        Ok(queued)
    }

    /// Blocks for the next finished job. Results are dropped when nobody
    /// reads them; the task store keeps the outcome either way.
    pub fn recv_result(&self) -> Option<JobResult> {
        self.result_receiver.recv().ok()
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Joins the workers, then stops the heartbeat and gives up the claim on
    /// jobs still queued so the next process picks them up.
    pub fn wait(self) {
        // Drop sender to signal workers to exit
        drop(self.job_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        drop(self.heartbeat_stop);
        if let Err(e) = self.heartbeat.join() {
            error!("Heartbeat thread panicked: {:?}", e);
        }
        if let Err(e) = self.store.release() {
            warn!("Failed to release task claims: {}", e);
        }

        info!("All workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

fn run_heartbeat(store: TaskStore, stop: Receiver<()>) {
    loop {
        if let Err(e) = store.heartbeat() {
            warn!("Task heartbeat failed: {}", e);
        }
        match stop.recv_timeout(HEARTBEAT_INTERVAL) {
            Err(RecvTimeoutError::Timeout) => continue,
            _ => break,
        }
    }
    debug!("Heartbeat stopped");
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<QueuedJob>,
    result_sender: Sender<JobResult>,
    shutdown: Arc<AtomicBool>,
    runner: Arc<CodeGenerationRunner>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match job_receiver.recv_timeout(std::time::Duration::from_millis(100)) {
            Ok(queued) => {
                debug!("Worker {} processing task {}", worker_id, queued.handle);

                let result = match runner.run(&queued) {
                    Ok(done) => JobResult::success(queued.handle, done.history_id),
                    Err(e) => JobResult::failure(queued.handle, e.to_string()),
                };

                // Nobody draining results is fine; the task store has the outcome
                if let Err(e) = result_sender.try_send(result) {
                    if e.is_disconnected() {
                        error!("Worker {} result channel closed", worker_id);
                        break;
                    }
                    debug!("Worker {} dropped result: channel full", worker_id);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}
