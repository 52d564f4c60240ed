//! Chat Server Acceptor
//!
//! Binds the listening socket and starts a session on the next reactor for
//! every accepted connection. The accepted socket is re-registered with the
//! target reactor's driver so all of its I/O stays on that thread's loop.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};

use super::reactor::ReactorPool;
use super::registry::SessionRegistry;
use super::session::Session;
use crate::dispatch::Dispatcher;
use crate::shared::CoreError;

/// TCP acceptor wired to the reactor pool, registry, and dispatcher.
pub struct ChatServer {
    listener: TcpListener,
    reactors: Arc<ReactorPool>,
    registry: Arc<SessionRegistry>,
    dispatcher: Arc<Dispatcher>,
    max_send_queue: usize,
}

impl ChatServer {
    pub async fn bind(
        addr: SocketAddr,
        reactors: Arc<ReactorPool>,
        registry: Arc<SessionRegistry>,
        dispatcher: Arc<Dispatcher>,
        max_send_queue: usize,
    ) -> Result<Self, CoreError> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr = %addr, "listening");
        Ok(Self {
            listener,
            reactors,
            registry,
            dispatcher,
            max_send_queue,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever, spreading sessions across the reactors
    /// round-robin. Individual accept errors are logged and the loop
    /// continues.
    pub async fn run(&self) -> std::io::Result<()> {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::error!(error = %e, "accept error");
                    continue;
                }
            };
            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!(peer = %peer, error = %e, "failed to set TCP_NODELAY");
            }

            // Detach from this runtime's driver; the session's reactor will
            // re-register the socket when it takes ownership.
            let std_stream = match stream.into_std() {
                Ok(std_stream) => std_stream,
                Err(e) => {
                    tracing::warn!(peer = %peer, error = %e, "failed to detach accepted socket");
                    continue;
                }
            };

            let reactor = self.reactors.next_context();
            let registry = self.registry.clone();
            let dispatcher = self.dispatcher.clone();
            let max_send_queue = self.max_send_queue;
            let target = reactor.clone();

            target.spawn(async move {
                match TcpStream::from_std(std_stream) {
                    Ok(stream) => {
                        let session =
                            Session::spawn(stream, reactor, registry, dispatcher, max_send_queue);
                        tracing::info!(
                            session_id = %session.id(),
                            peer = %peer,
                            "connection accepted"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(peer = %peer, error = %e, "failed to register socket with reactor");
                    }
                }
            });
        }
    }
}
