//! Reactor Thread Pool
//!
//! A fixed set of independent event-loop contexts, one dedicated thread each,
//! used to spread accepted sockets across cores. Each context is a
//! current-thread tokio runtime parked on a keep-alive token so an idle loop
//! does not exit before shutdown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::shared::CoreError;

struct ReactorWorker {
    handle: Handle,
    keep_alive: Mutex<Option<oneshot::Sender<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

/// Pool of `N` single-threaded reactors handing out contexts round-robin.
pub struct ReactorPool {
    workers: Vec<ReactorWorker>,
    next: AtomicUsize,
}

impl ReactorPool {
    /// Start `workers` reactor threads, each named `reactor-{i}`.
    pub fn new(workers: usize) -> Result<Self, CoreError> {
        if workers == 0 {
            return Err(CoreError::NoReactorWorkers);
        }

        let mut pool = Vec::with_capacity(workers);
        for i in 0..workers {
            let (keep_alive_tx, keep_alive_rx) = oneshot::channel::<()>();
            let (handle_tx, handle_rx) = std::sync::mpsc::channel();

            let thread = std::thread::Builder::new()
                .name(format!("reactor-{i}"))
                .spawn(move || {
                    let runtime = match tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                    {
                        Ok(runtime) => runtime,
                        Err(e) => {
                            let _ = handle_tx.send(Err(e));
                            return;
                        }
                    };
                    let _ = handle_tx.send(Ok(runtime.handle().clone()));

                    // Park until the keep-alive token is released; spawned
                    // sessions keep running while this future is pending.
                    runtime.block_on(async move {
                        let _ = keep_alive_rx.await;
                    });
                })
                .map_err(|e| CoreError::ReactorStart(e.to_string()))?;

            let handle = handle_rx
                .recv()
                .map_err(|_| CoreError::ReactorStart("reactor thread exited during startup".into()))?
                .map_err(|e| CoreError::ReactorStart(e.to_string()))?;

            pool.push(ReactorWorker {
                handle,
                keep_alive: Mutex::new(Some(keep_alive_tx)),
                thread: Mutex::new(Some(thread)),
            });
        }

        tracing::info!(workers, "reactor pool started");
        Ok(Self {
            workers: pool,
            next: AtomicUsize::new(0),
        })
    }

    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Round-robin handle to the next reactor context.
    pub fn next_context(&self) -> Handle {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        self.workers[index].handle.clone()
    }

    /// Release every keep-alive token, then join every thread, in that order
    /// so in-flight callbacks unwind before the threads are joined.
    /// Idempotent.
    pub fn stop(&self) {
        for worker in &self.workers {
            worker.keep_alive.lock().take();
        }
        for worker in &self.workers {
            let thread = worker.thread.lock().take();
            if let Some(thread) = thread {
                if thread.join().is_err() {
                    tracing::error!("reactor thread panicked during shutdown");
                }
            }
        }
        tracing::info!(workers = self.workers.len(), "reactor pool stopped");
    }
}
