//! Application Startup
//!
//! Builds the long-lived core objects once — reactor pool, session registry,
//! dispatcher, acceptor — and wires them together by handle. No lazy
//! singletons: lifecycle and shutdown ordering are explicit.

use std::sync::Arc;

use anyhow::Result;

use crate::config::Settings;
use crate::dispatch::Dispatcher;
use crate::net::{ChatServer, ReactorPool, SessionRegistry};
use crate::pool::{EndpointKey, EndpointPools, ResourcePool, RpcChannel};

/// Application instance owning the core's long-lived objects.
pub struct Application {
    server: ChatServer,
    reactors: Arc<ReactorPool>,
    registry: Arc<SessionRegistry>,
    dispatcher: Arc<Dispatcher>,
    rpc_pools: Arc<EndpointPools<RpcChannel>>,
}

impl Application {
    /// Build the application from settings.
    pub async fn build(settings: Settings) -> Result<Self> {
        let reactors = Arc::new(ReactorPool::new(settings.reactor.effective_workers())?);
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = Dispatcher::new();

        let rpc_pools = Arc::new(EndpointPools::new());
        for endpoint in &settings.rpc.endpoints {
            let key = EndpointKey::new(endpoint.host.clone(), endpoint.port);
            let stub_key = key.clone();
            let pool = ResourcePool::new(settings.rpc.pool_size, || {
                RpcChannel::new(stub_key.clone())
            });
            rpc_pools.register(key, Arc::new(pool));
        }

        let server = ChatServer::bind(
            settings.server.socket_addr(),
            reactors.clone(),
            registry.clone(),
            dispatcher.clone(),
            settings.session.max_send_queue,
        )
        .await?;

        Ok(Self {
            server,
            reactors,
            registry,
            dispatcher,
            rpc_pools,
        })
    }

    /// Handler registration point; register message handlers here before
    /// calling [`run_until_stopped`](Self::run_until_stopped).
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Live-session registry, for targeted push and forced disconnects.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Per-endpoint RPC client pools, for handlers calling downstream
    /// services. Acquire only off the reactor threads.
    pub fn rpc_pools(&self) -> &Arc<EndpointPools<RpcChannel>> {
        &self.rpc_pools
    }

    /// Get the bound address.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.server.local_addr()
    }

    /// Serve until ctrl-c, then shut down gracefully: stop accepting, close
    /// every session, drain the dispatcher, stop the reactors.
    pub async fn run_until_stopped(self) -> Result<()> {
        self.dispatcher.start();

        tokio::select! {
            result = self.server.run() => {
                result?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
            }
        }

        self.shutdown();
        Ok(())
    }

    fn shutdown(&self) {
        self.registry.close_all();
        // Drains queued requests before the consumer thread exits.
        self.dispatcher.shutdown();
        // The consumer has exited; no handler can be blocked on a pool now.
        self.rpc_pools.stop_all();
        self.reactors.stop();
        tracing::info!("shutdown complete");
    }
}
