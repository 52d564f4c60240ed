//! Message Dispatcher
//!
//! Single-consumer queue plus handler registry. Network threads produce fully
//! assembled frames; exactly one consumer thread runs the business-logic
//! handlers. All handlers therefore execute serialized — they never need to
//! be thread-safe with respect to each other, and they may block (e.g. on a
//! resource pool) without stalling any reactor.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use bytes::Bytes;
use parking_lot::{Condvar, Mutex, RwLock};

use crate::net::Session;
use crate::protocol::Frame;

/// Business-logic handler for one message id.
///
/// Invoked on the dispatcher thread with the originating session, the message
/// id, and the raw frame body.
pub trait MessageHandler: Send + Sync + 'static {
    fn handle(&self, session: Arc<Session>, message_id: u16, body: &[u8]);
}

impl<F> MessageHandler for F
where
    F: Fn(Arc<Session>, u16, &[u8]) + Send + Sync + 'static,
{
    fn handle(&self, session: Arc<Session>, message_id: u16, body: &[u8]) {
        self(session, message_id, body)
    }
}

/// One completed inbound frame awaiting its handler.
///
/// Holds only a weak session reference: a session that closes while its job
/// is queued does not stay alive for it, and the job is dropped at dispatch.
pub struct DispatchJob {
    session: Weak<Session>,
    message_id: u16,
    body: Bytes,
}

impl DispatchJob {
    pub fn new(session: &Arc<Session>, frame: Frame) -> Self {
        Self {
            session: Arc::downgrade(session),
            message_id: frame.message_id(),
            body: frame.body_bytes(),
        }
    }

    pub fn message_id(&self) -> u16 {
        self.message_id
    }
}

struct JobQueue {
    jobs: VecDeque<DispatchJob>,
    stopped: bool,
}

/// Single-consumer dispatch queue keyed by numeric message id.
pub struct Dispatcher {
    queue: Mutex<JobQueue>,
    consume: Condvar,
    handlers: RwLock<HashMap<u16, Arc<dyn MessageHandler>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(JobQueue {
                jobs: VecDeque::new(),
                stopped: false,
            }),
            consume: Condvar::new(),
            handlers: RwLock::new(HashMap::new()),
            worker: Mutex::new(None),
        })
    }

    /// Register the handler for a message id.
    ///
    /// Configuration-time operation: call before [`start`](Self::start).
    /// The last registration for the same id wins.
    pub fn register_handler(&self, message_id: u16, handler: impl MessageHandler) {
        let previous = self
            .handlers
            .write()
            .insert(message_id, Arc::new(handler));
        if previous.is_some() {
            tracing::warn!(message_id, "handler re-registered; previous replaced");
        }
    }

    /// Spawn the consumer thread. Call once, after handler registration.
    pub fn start(self: &Arc<Self>) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            tracing::warn!("dispatcher already started");
            return;
        }
        let dispatcher = self.clone();
        let handle = std::thread::Builder::new()
            .name("dispatcher".into())
            .spawn(move || dispatcher.consume_loop())
            .expect("failed to spawn dispatcher thread");
        *worker = Some(handle);
        tracing::info!("dispatcher consumer thread started");
    }

    /// Enqueue a job and wake the consumer if the queue was empty.
    pub fn post(&self, job: DispatchJob) {
        let mut queue = self.queue.lock();
        if queue.stopped {
            tracing::debug!(message_id = job.message_id, "dispatcher stopped; job dropped");
            return;
        }
        queue.jobs.push_back(job);
        let was_empty = queue.jobs.len() == 1;
        drop(queue);
        if was_empty {
            self.consume.notify_one();
        }
    }

    /// Stop the consumer and join its thread.
    ///
    /// Jobs already queued are drained and processed before the thread exits;
    /// requests that reached the server still get a response.
    pub fn shutdown(&self) {
        {
            let mut queue = self.queue.lock();
            if queue.stopped {
                return;
            }
            queue.stopped = true;
        }
        self.consume.notify_all();

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("dispatcher thread panicked");
            }
        }
        tracing::info!("dispatcher stopped");
    }

    fn consume_loop(&self) {
        loop {
            let job = {
                let mut queue = self.queue.lock();
                while queue.jobs.is_empty() && !queue.stopped {
                    self.consume.wait(&mut queue);
                }
                match queue.jobs.pop_front() {
                    Some(job) => job,
                    // Stopped and fully drained.
                    None => break,
                }
            };
            self.run_job(job);
        }
        tracing::debug!("dispatcher consumer loop exited");
    }

    fn run_job(&self, job: DispatchJob) {
        let handler = self.handlers.read().get(&job.message_id).cloned();
        let Some(handler) = handler else {
            tracing::warn!(message_id = job.message_id, "no handler registered; frame dropped");
            return;
        };

        let Some(session) = job.session.upgrade() else {
            tracing::debug!(
                message_id = job.message_id,
                "session closed before dispatch; frame dropped"
            );
            return;
        };

        handler.handle(session, job.message_id, &job.body);
    }
}
