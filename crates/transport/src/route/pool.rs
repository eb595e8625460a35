use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use tracing::{debug, trace};

use crate::route::HttpRoute;

struct Pooled<T> {
    connection: Arc<T>,
    leases: Arc<AtomicUsize>,
    capacity: usize,
}

impl<T> Pooled<T> {
    /// Takes one lease unless the connection is already at capacity.
    fn try_lease(&self, route: &HttpRoute) -> Option<Lease<T>> {
        let mut current = self.leases.load(Ordering::Acquire);
        loop {
            if current >= self.capacity {
                return None;
            }
            match self.leases.compare_exchange_weak(current, current + 1, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        Some(Lease { route: route.clone(), connection: Arc::clone(&self.connection), leases: Arc::clone(&self.leases) })
    }

    fn is_unreferenced(&self) -> bool {
        self.leases.load(Ordering::Acquire) == 0
    }
}

/// Live connections grouped by the route they were opened for.
///
/// Each connection carries an explicit lease count next to the number of
/// exchanges it can carry at once (1 for HTTP/1.1, the stream limit for
/// HTTP/2 and HTTP/3). A connection is only ever removed by [`evict`] and only
/// while nothing holds a lease on it.
///
/// [`evict`]: ConnectionPool::evict
pub struct ConnectionPool<T> {
    routes: DashMap<HttpRoute, Vec<Pooled<T>>>,
}

impl<T> fmt::Debug for ConnectionPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool").field("routes", &self.routes.len()).field("connections", &self.len()).finish()
    }
}

impl<T> ConnectionPool<T> {
    pub fn new() -> Self {
        Self { routes: DashMap::new() }
    }

    /// Adds a freshly opened connection and leases it to the caller.
    pub fn insert(&self, route: HttpRoute, connection: T, capacity: usize) -> Lease<T> {
        let pooled = Pooled { connection: Arc::new(connection), leases: Arc::new(AtomicUsize::new(1)), capacity: capacity.max(1) };
        let lease = Lease { route: route.clone(), connection: Arc::clone(&pooled.connection), leases: Arc::clone(&pooled.leases) };

        debug!(%route, capacity = pooled.capacity, "pool new connection");
        self.routes.entry(route).or_default().push(pooled);
        lease
    }

    /// Leases a connection to `route` that can take one more exchange.
    pub fn acquire(&self, route: &HttpRoute) -> Option<Lease<T>> {
        let connections = self.routes.get(route)?;
        let lease = connections.iter().find_map(|pooled| pooled.try_lease(route));
        if lease.is_none() {
            trace!(%route, connections = connections.len(), "every pooled connection is busy");
        }
        lease
    }

    /// Drops the connections to `route` nobody holds a lease on, returns how
    /// many were removed.
    pub fn evict(&self, route: &HttpRoute) -> usize {
        let Some(mut connections) = self.routes.get_mut(route) else {
            return 0;
        };
        let before = connections.len();
        connections.retain(|pooled| !pooled.is_unreferenced());
        let evicted = before - connections.len();
        let now_empty = connections.is_empty();
        drop(connections);

        if now_empty {
            self.routes.remove_if(route, |_, connections| connections.is_empty());
        }
        if evicted > 0 {
            debug!(%route, evicted, "evict unreferenced connections");
        }
        evicted
    }

    /// Number of pooled connections across every route.
    pub fn len(&self) -> usize {
        self.routes.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn routes(&self) -> Vec<HttpRoute> {
        self.routes.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl<T> Default for ConnectionPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A reference on a pooled connection, released when dropped.
pub struct Lease<T> {
    route: HttpRoute,
    connection: Arc<T>,
    leases: Arc<AtomicUsize>,
}

impl<T> Lease<T> {
    pub fn route(&self) -> &HttpRoute {
        &self.route
    }

    /// Leases currently held on this connection, this one included.
    pub fn active(&self) -> usize {
        self.leases.load(Ordering::Acquire)
    }
}

impl<T> Deref for Lease<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.connection
    }
}

impl<T> Drop for Lease<T> {
    fn drop(&mut self) {
        let left = self.leases.fetch_sub(1, Ordering::AcqRel) - 1;
        trace!(route = %self.route, left, "release pooled connection");
    }
}

impl<T> fmt::Debug for Lease<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease").field("route", &self.route).field("active", &self.active()).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use http::uri::Scheme;

    use super::*;

    fn route(port: u16) -> HttpRoute {
        HttpRoute::new(Scheme::HTTP, "localhost", port, 7)
    }

    #[test]
    fn acquire_respects_capacity() {
        let pool = ConnectionPool::new();
        let first = pool.insert(route(80), "h1", 1);
        assert_eq!(*first, "h1");
        assert!(pool.acquire(&route(80)).is_none());

        drop(first);
        let again = pool.acquire(&route(80)).unwrap();
        assert_eq!(again.active(), 1);
        assert!(pool.acquire(&route(81)).is_none());
    }

    #[test]
    fn multiplexed_connection_is_shared() {
        let pool = ConnectionPool::new();
        let opened = pool.insert(route(443), "h2", 3);
        let second = pool.acquire(&route(443)).unwrap();
        let third = pool.acquire(&route(443)).unwrap();

        assert_eq!(opened.active(), 3);
        assert!(pool.acquire(&route(443)).is_none());
        drop(second);
        drop(third);
        assert_eq!(opened.active(), 1);
    }

    #[test]
    fn evict_keeps_leased_connections() {
        let pool = ConnectionPool::new();
        let busy = pool.insert(route(80), 1, 1);
        drop(pool.insert(route(80), 2, 1));
        assert_eq!(pool.len(), 2);

        assert_eq!(pool.evict(&route(80)), 1);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.routes(), vec![route(80)]);

        drop(busy);
        assert_eq!(pool.evict(&route(80)), 1);
        assert!(pool.is_empty());
        assert!(pool.routes().is_empty());
        assert_eq!(pool.evict(&route(80)), 0);
    }

    #[test]
    fn concurrent_acquire_never_exceeds_capacity() {
        let pool = Arc::new(ConnectionPool::new());
        drop(pool.insert(route(80), (), 4));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    for _ in 0..200 {
                        if let Some(lease) = pool.acquire(&route(80)) {
                            assert!(lease.active() <= 4);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(pool.evict(&route(80)), 1);
    }
}
