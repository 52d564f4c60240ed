//! Per-Connection Session
//!
//! A session owns one socket exclusively. A resident read task on the
//! session's reactor drives the incremental frame decoder and posts completed
//! frames to the dispatcher; outbound frames go through a FIFO send queue
//! drained by at most one in-flight write at any time. Completion callbacks
//! capture an `Arc` of the session, so it cannot be destroyed while work is
//! pending.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::runtime::Handle;
use tokio::sync::watch;
use uuid::Uuid;

use super::registry::SessionRegistry;
use crate::dispatch::{DispatchJob, Dispatcher};
use crate::protocol::{Frame, FrameDecoder, READ_BUFFER_SIZE};
use crate::shared::ProtocolError;

/// Default bound on queued outbound frames before a session is treated as a
/// slow consumer and closed.
pub const DEFAULT_MAX_SEND_QUEUE: usize = 1000;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

struct SendState {
    /// Encoded frames awaiting the wire, front first.
    queue: VecDeque<Bytes>,
    /// True while a drain task holds the write side. Single-flight gate:
    /// at most one outstanding write per session.
    writing: bool,
}

/// One client connection.
///
/// `Open → Closing → Closed`: [`close`](Session::close) is idempotent and
/// safe from any thread; operations after close begin are no-ops.
pub struct Session {
    id: String,
    user_id: OnceCell<String>,
    send: Mutex<SendState>,
    writer: tokio::sync::Mutex<Option<BoxedWriter>>,
    closed: AtomicBool,
    closed_tx: watch::Sender<bool>,
    reactor: Handle,
    registry: Arc<SessionRegistry>,
    dispatcher: Arc<Dispatcher>,
    max_send_queue: usize,
}

impl Session {
    /// Take ownership of a transport and start the session on `reactor`.
    ///
    /// The returned handle is the only way to reach the session; the read
    /// task holds a clone, so the session lives at least until the socket
    /// closes.
    pub fn spawn<T>(
        transport: T,
        reactor: Handle,
        registry: Arc<SessionRegistry>,
        dispatcher: Arc<Dispatcher>,
        max_send_queue: usize,
    ) -> Arc<Self>
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(transport);
        let (closed_tx, _) = watch::channel(false);

        let session = Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            user_id: OnceCell::new(),
            send: Mutex::new(SendState {
                queue: VecDeque::new(),
                writing: false,
            }),
            writer: tokio::sync::Mutex::new(Some(Box::new(writer))),
            closed: AtomicBool::new(false),
            closed_tx,
            reactor: reactor.clone(),
            registry: registry.clone(),
            dispatcher,
            max_send_queue,
        });

        registry.insert(session.clone());
        tracing::debug!(session_id = %session.id, "session started");

        reactor.spawn(session.clone().read_loop(Box::new(reader)));
        session
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// User id bound by the login handler, if any.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.get().map(String::as_str)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Bind the authenticated user id, set exactly once, and register the
    /// session for targeted push. Returns false if an id was already bound.
    pub fn bind_user(self: &Arc<Self>, user_id: impl Into<String>) -> bool {
        let user_id = user_id.into();
        if self.user_id.set(user_id.clone()).is_err() {
            tracing::warn!(session_id = %self.id, "user id already bound");
            return false;
        }
        self.registry.set_session(&user_id, self.clone());
        true
    }

    /// Queue one outbound frame.
    ///
    /// Frames leave the wire in enqueue order. If no write is in flight a
    /// drain task is started on the session's reactor; otherwise the running
    /// drain picks the frame up. Errors only on an oversized body; sending on
    /// a closing session is a no-op.
    pub fn send(self: &Arc<Self>, message_id: u16, body: &[u8]) -> Result<(), ProtocolError> {
        let frame = Frame::new(message_id, Bytes::copy_from_slice(body))?;

        if self.is_closed() {
            tracing::debug!(session_id = %self.id, message_id, "send on closed session ignored");
            return Ok(());
        }

        let start_drain = {
            let mut send = self.send.lock();
            if send.queue.len() >= self.max_send_queue {
                drop(send);
                tracing::warn!(
                    session_id = %self.id,
                    limit = self.max_send_queue,
                    "send queue overflow; closing slow session"
                );
                self.close();
                return Ok(());
            }
            send.queue.push_back(frame.encode());
            if send.writing {
                false
            } else {
                send.writing = true;
                true
            }
        };

        if start_drain {
            self.reactor.spawn(self.clone().drain_send_queue());
        }
        Ok(())
    }

    /// Close the session: signal the read and write tasks to unwind, drop
    /// the socket, and remove the session from the registry. Idempotent and
    /// safe to call from any thread, concurrently.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.closed_tx.send(true);

        // Drop the write half now if no write is in flight; otherwise the
        // drain task drops it after its current write completes.
        if let Ok(mut writer) = self.writer.try_lock() {
            *writer = None;
        }

        self.registry.unregister(self);
        tracing::info!(session_id = %self.id, user_id = ?self.user_id.get(), "session closed");
    }

    /// Resident read task: read, feed the decoder, post completed frames,
    /// repeat. Waiting for the next read is the session's only idle state.
    async fn read_loop(self: Arc<Self>, mut reader: Box<dyn AsyncRead + Send + Unpin>) {
        let mut decoder = FrameDecoder::new();
        let mut buf = [0u8; READ_BUFFER_SIZE];
        let mut closed_rx = self.closed_tx.subscribe();

        loop {
            // Covers a close that happened before this receiver subscribed.
            if self.is_closed() {
                break;
            }
            tokio::select! {
                _ = closed_rx.changed() => break,
                read = reader.read(&mut buf) => match read {
                    Ok(0) => {
                        tracing::debug!(session_id = %self.id, "peer closed connection");
                        break;
                    }
                    Ok(n) => match decoder.feed(&buf[..n]) {
                        Ok(frames) => {
                            for frame in frames {
                                tracing::trace!(
                                    session_id = %self.id,
                                    message_id = frame.message_id(),
                                    "frame received"
                                );
                                self.dispatcher.post(DispatchJob::new(&self, frame));
                            }
                        }
                        Err(violation) => {
                            tracing::warn!(
                                session_id = %self.id,
                                error = %violation,
                                "protocol violation; dropping connection"
                            );
                            break;
                        }
                    },
                    Err(e) => {
                        tracing::debug!(session_id = %self.id, error = %e, "read error");
                        break;
                    }
                },
            }
        }

        self.close();
    }

    /// Drain the send queue, one write at a time. Exactly one of these runs
    /// per session while `writing` is set; the front of the queue is always
    /// the frame currently on the wire.
    async fn drain_send_queue(self: Arc<Self>) {
        loop {
            let next = {
                let mut send = self.send.lock();
                match send.queue.front().cloned() {
                    Some(encoded) => encoded,
                    None => {
                        send.writing = false;
                        return;
                    }
                }
            };

            let mut writer = self.writer.lock().await;
            let Some(stream) = writer.as_mut() else {
                self.send.lock().writing = false;
                return;
            };

            let written = async {
                stream.write_all(&next).await?;
                stream.flush().await
            }
            .await;
            drop(writer);

            if let Err(e) = written {
                tracing::debug!(session_id = %self.id, error = %e, "write error");
                self.send.lock().writing = false;
                self.close();
                return;
            }

            self.send.lock().queue.pop_front();

            if self.is_closed() {
                *self.writer.lock().await = None;
                self.send.lock().writing = false;
                return;
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user_id", &self.user_id.get())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{HEADER_LENGTH, MAX_BODY_LENGTH};
    use pretty_assertions::assert_eq;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{DuplexStream, ReadBuf};

    /// Transport recording the size of every write the session issues.
    struct CountingTransport {
        inner: DuplexStream,
        writes: Arc<Mutex<Vec<usize>>>,
    }

    impl AsyncRead for CountingTransport {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_read(cx, buf)
        }
    }

    impl AsyncWrite for CountingTransport {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let poll = Pin::new(&mut self.inner).poll_write(cx, buf);
            if let Poll::Ready(Ok(accepted)) = &poll {
                self.writes.lock().push(*accepted);
            }
            poll
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_flush(cx)
        }

        fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_shutdown(cx)
        }
    }

    /// Transport whose flush always fails, as on a socket the peer reset
    /// between the write and the flush.
    struct FailingFlush {
        inner: DuplexStream,
    }

    impl AsyncRead for FailingFlush {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_read(cx, buf)
        }
    }

    impl AsyncWrite for FailingFlush {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Pin::new(&mut self.inner).poll_write(cx, buf)
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "connection reset",
            )))
        }

        fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_shutdown(cx)
        }
    }

    fn new_session(
        registry: &Arc<SessionRegistry>,
        dispatcher: &Arc<Dispatcher>,
    ) -> (Arc<Session>, DuplexStream) {
        let (server_side, client_side) = tokio::io::duplex(64 * 1024);
        let session = Session::spawn(
            server_side,
            Handle::current(),
            registry.clone(),
            dispatcher.clone(),
            DEFAULT_MAX_SEND_QUEUE,
        );
        (session, client_side)
    }

    async fn read_frame(client: &mut DuplexStream) -> (u16, Vec<u8>) {
        let mut header = [0u8; HEADER_LENGTH];
        client.read_exact(&mut header).await.unwrap();
        let message_id = u16::from_be_bytes([header[0], header[1]]);
        let length = u16::from_be_bytes([header[2], header[3]]) as usize;
        let mut body = vec![0u8; length];
        client.read_exact(&mut body).await.unwrap();
        (message_id, body)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn sequential_sends_arrive_in_fifo_order() {
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = Dispatcher::new();
        let (session, mut client) = new_session(&registry, &dispatcher);

        session.send(1, b"first").unwrap();
        session.send(2, b"second").unwrap();
        session.send(3, b"third").unwrap();

        assert_eq!(read_frame(&mut client).await, (1, b"first".to_vec()));
        assert_eq!(read_frame(&mut client).await, (2, b"second".to_vec()));
        assert_eq!(read_frame(&mut client).await, (3, b"third".to_vec()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_sends_never_interleave_bytes() {
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = Dispatcher::new();
        let (server_side, mut client) = tokio::io::duplex(64 * 1024);
        let writes = Arc::new(Mutex::new(Vec::new()));
        let transport = CountingTransport {
            inner: server_side,
            writes: writes.clone(),
        };
        let session = Session::spawn(
            transport,
            Handle::current(),
            registry.clone(),
            dispatcher.clone(),
            DEFAULT_MAX_SEND_QUEUE,
        );

        // Three threads race sends; each message id has a distinctive body.
        let senders: Vec<_> = [1u16, 2, 3]
            .into_iter()
            .map(|id| {
                let session = session.clone();
                std::thread::spawn(move || {
                    let body = vec![id as u8; 100];
                    for _ in 0..10 {
                        session.send(id, &body).unwrap();
                    }
                })
            })
            .collect();
        for sender in senders {
            sender.join().unwrap();
        }

        // Every frame on the wire must be whole: well-formed header, body
        // bytes all matching the id's fill pattern.
        for _ in 0..30 {
            let (id, body) = read_frame(&mut client).await;
            assert!(matches!(id, 1..=3));
            assert_eq!(body, vec![id as u8; 100]);
        }

        // Single-flight: exactly one write per frame, each a whole frame.
        wait_until(|| writes.lock().len() >= 30).await;
        let writes = writes.lock();
        assert_eq!(writes.len(), 30);
        assert!(writes.iter().all(|&size| size == HEADER_LENGTH + 100));
    }

    #[tokio::test]
    async fn flush_failure_closes_the_session() {
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = Dispatcher::new();
        let (server_side, _client) = tokio::io::duplex(4096);
        let session = Session::spawn(
            FailingFlush { inner: server_side },
            Handle::current(),
            registry.clone(),
            dispatcher.clone(),
            DEFAULT_MAX_SEND_QUEUE,
        );

        session.send(1, b"ping").unwrap();

        wait_until(|| session.is_closed()).await;
        assert_eq!(registry.session_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn inbound_frames_reach_registered_handler_in_order() {
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = Dispatcher::new();

        let (tx, rx) = std::sync::mpsc::channel();
        dispatcher.register_handler(1005, move |_session: Arc<Session>, _id: u16, body: &[u8]| {
            tx.send(body.to_vec()).unwrap();
        });
        dispatcher.start();

        let (_session, mut client) = new_session(&registry, &dispatcher);
        for body in [b"a".as_slice(), b"bb", b"ccc"] {
            let frame = Frame::new(1005, Bytes::copy_from_slice(body)).unwrap();
            client.write_all(&frame.encode()).await.unwrap();
        }

        for expected in [b"a".as_slice(), b"bb", b"ccc"] {
            let got = rx.recv_timeout(Duration::from_secs(1)).unwrap();
            assert_eq!(got, expected);
        }
        dispatcher.shutdown();
    }

    #[tokio::test]
    async fn oversized_frame_closes_the_session() {
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = Dispatcher::new();
        let (session, mut client) = new_session(&registry, &dispatcher);
        assert_eq!(registry.session_count(), 1);

        let mut header = Vec::new();
        header.extend_from_slice(&1u16.to_be_bytes());
        header.extend_from_slice(&((MAX_BODY_LENGTH + 1) as u16).to_be_bytes());
        client.write_all(&header).await.unwrap();

        wait_until(|| session.is_closed()).await;
        wait_until(|| registry.session_count() == 0).await;
    }

    #[tokio::test]
    async fn peer_disconnect_closes_the_session() {
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = Dispatcher::new();
        let (session, client) = new_session(&registry, &dispatcher);

        drop(client);
        wait_until(|| session.is_closed()).await;
        assert_eq!(registry.session_count(), 0);
    }

    #[tokio::test]
    async fn registry_lifecycle_across_close() {
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = Dispatcher::new();
        let (session, _client) = new_session(&registry, &dispatcher);

        assert!(session.bind_user("u1"));
        let found = registry.get_session("u1").unwrap();
        assert_eq!(found.id(), session.id());

        session.close();
        assert!(registry.get_session("u1").is_none());
        assert_eq!(registry.session_count(), 0);
    }

    #[tokio::test]
    async fn user_id_binds_exactly_once() {
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = Dispatcher::new();
        let (session, _client) = new_session(&registry, &dispatcher);

        assert!(session.bind_user("u1"));
        assert!(!session.bind_user("u2"));
        assert_eq!(session.user_id(), Some("u1"));
        assert!(registry.get_session("u2").is_none());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_send_becomes_noop() {
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = Dispatcher::new();
        let (session, _client) = new_session(&registry, &dispatcher);

        session.close();
        session.close();
        assert!(session.is_closed());
        session.send(1, b"ignored").unwrap();
        assert!(session.send.lock().queue.is_empty());
    }

    #[tokio::test]
    async fn relogin_keeps_newer_binding_when_old_session_closes() {
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = Dispatcher::new();
        let (old, _old_client) = new_session(&registry, &dispatcher);
        let (new, _new_client) = new_session(&registry, &dispatcher);

        assert!(old.bind_user("u1"));
        assert!(new.bind_user("u1"));

        old.close();
        let bound = registry.get_session("u1").unwrap();
        assert_eq!(bound.id(), new.id());
    }
}
