//! Per-endpoint pool registry.
//!
//! The cluster keeps one pool of client handles per downstream service
//! instance (status server, user server, ...). These are long-lived objects
//! built once at startup and passed by handle, not lazily-constructed
//! globals.

use std::sync::Arc;

use dashmap::DashMap;

use super::ResourcePool;

/// Address of one downstream service instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointKey {
    pub host: String,
    pub port: u16,
}

impl EndpointKey {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl std::fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Client handle to one downstream service instance.
///
/// Handles are cheap to construct; the RPC layer dials the endpoint lazily
/// on first use, so pooling them bounds concurrent calls per endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcChannel {
    endpoint: EndpointKey,
}

impl RpcChannel {
    pub fn new(endpoint: EndpointKey) -> Self {
        Self { endpoint }
    }

    pub fn endpoint(&self) -> &EndpointKey {
        &self.endpoint
    }
}

/// Registry of resource pools keyed by downstream endpoint.
pub struct EndpointPools<T> {
    pools: DashMap<EndpointKey, Arc<ResourcePool<T>>>,
}

impl<T> EndpointPools<T> {
    pub fn new() -> Self {
        Self {
            pools: DashMap::new(),
        }
    }

    /// Register a pool for an endpoint. Replaces any existing pool for the
    /// same endpoint; registration is a startup-time operation.
    pub fn register(&self, key: EndpointKey, pool: Arc<ResourcePool<T>>) {
        tracing::info!(endpoint = %key, capacity = pool.capacity(), "endpoint pool registered");
        self.pools.insert(key, pool);
    }

    pub fn get(&self, key: &EndpointKey) -> Option<Arc<ResourcePool<T>>> {
        self.pools.get(key).map(|entry| entry.value().clone())
    }

    /// Stop every registered pool, releasing all blocked waiters.
    pub fn stop_all(&self) {
        for entry in self.pools.iter() {
            entry.value().stop();
        }
    }
}

impl<T> Default for EndpointPools<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_endpoint() {
        let pools = EndpointPools::new();
        let key = EndpointKey::new("10.0.0.5", 50051);
        pools.register(key.clone(), Arc::new(ResourcePool::new(2, || "stub")));

        assert!(pools.get(&key).is_some());
        assert!(pools.get(&EndpointKey::new("10.0.0.5", 50052)).is_none());
    }

    #[test]
    fn stop_all_stops_every_pool() {
        let pools = EndpointPools::new();
        let a = Arc::new(ResourcePool::new(1, || ()));
        let b = Arc::new(ResourcePool::new(1, || ()));
        pools.register(EndpointKey::new("a", 1), a.clone());
        pools.register(EndpointKey::new("b", 2), b.clone());

        pools.stop_all();
        assert_eq!(a.acquire(), None);
        assert_eq!(b.acquire(), None);
    }
}
