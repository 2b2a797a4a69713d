use crate::errors::Result;
use async_trait::async_trait;
use log::{debug, info, warn};

/// Establishes the long-lived connection a worker owns.
#[async_trait]
pub trait Connector: Send + Sync {
    type Conn: Send + Sync;

    /// Short label used in logs (`kafka producer`, `timescale`, ...).
    fn name(&self) -> &str;

    async fn connect(&self) -> Result<Self::Conn>;

    /// Checked before every reuse; a dead connection is dropped and re-established.
    async fn is_alive(&self, _conn: &Self::Conn) -> bool {
        true
    }

    /// Orderly shutdown of a connection. Dropping it must also release it.
    async fn close(&self, conn: Self::Conn) {
        drop(conn);
    }
}

/// Lazily acquired, reused connection.
///
/// The first [`get`](ConnectionGuard::get) connects, later calls reuse the same
/// connection while the connector reports it alive. Owners call
/// [`invalidate`](ConnectionGuard::invalidate) after an operation failed so the next
/// `get` reconnects. The connection is released when the guard is dropped.
pub struct ConnectionGuard<C: Connector> {
    connector: C,
    conn: Option<C::Conn>,
}

impl<C: Connector> ConnectionGuard<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            conn: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    pub async fn get(&mut self) -> Result<&mut C::Conn> {
        if let Some(conn) = self.conn.take() {
            if self.connector.is_alive(&conn).await {
                return Ok(self.conn.insert(conn));
            }
            warn!("{} connection is no longer alive, reconnecting", self.connector.name());
            self.connector.close(conn).await;
        }
        let conn = self.connector.connect().await?;
        info!("{} connection established", self.connector.name());
        Ok(self.conn.insert(conn))
    }

    /// Drops the current connection; the next `get` reconnects.
    pub fn invalidate(&mut self) {
        if self.conn.take().is_some() {
            debug!("{} connection invalidated", self.connector.name());
        }
    }

    pub async fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.connector.close(conn).await;
            info!("{} connection closed", self.connector.name());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counters {
        connects: AtomicUsize,
        closes: AtomicUsize,
        dropped: AtomicUsize,
        alive: AtomicBool,
        refuse: AtomicBool,
    }

    struct Conn {
        id: usize,
        counters: Arc<Counters>,
    }

    impl Drop for Conn {
        fn drop(&mut self) {
            self.counters.dropped.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct TestConnector(Arc<Counters>);

    #[async_trait]
    impl Connector for TestConnector {
        type Conn = Conn;

        fn name(&self) -> &str {
            "test"
        }

        async fn connect(&self) -> Result<Conn> {
            if self.0.refuse.load(Ordering::SeqCst) {
                return Err(Error::queue_connection("connection refused"));
            }
            let id = self.0.connects.fetch_add(1, Ordering::SeqCst);
            self.0.alive.store(true, Ordering::SeqCst);
            Ok(Conn {
                id,
                counters: self.0.clone(),
            })
        }

        async fn is_alive(&self, _conn: &Conn) -> bool {
            self.0.alive.load(Ordering::SeqCst)
        }

        async fn close(&self, conn: Conn) {
            self.0.closes.fetch_add(1, Ordering::SeqCst);
            drop(conn);
        }
    }

    fn guard() -> (ConnectionGuard<TestConnector>, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        (ConnectionGuard::new(TestConnector(counters.clone())), counters)
    }

    #[tokio::test]
    async fn test_connects_lazily_and_reuses() {
        let (mut guard, counters) = guard();
        assert!(!guard.is_connected());
        assert_eq!(counters.connects.load(Ordering::SeqCst), 0);

        assert_eq!(guard.get().await.unwrap().id, 0);
        assert_eq!(guard.get().await.unwrap().id, 0);
        assert_eq!(counters.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reconnects_when_connection_died() {
        let (mut guard, counters) = guard();
        guard.get().await.unwrap();
        counters.alive.store(false, Ordering::SeqCst);

        assert_eq!(guard.get().await.unwrap().id, 1);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reconnect() {
        let (mut guard, counters) = guard();
        guard.get().await.unwrap();
        guard.invalidate();
        assert!(!guard.is_connected());
        assert_eq!(counters.dropped.load(Ordering::SeqCst), 1);

        assert_eq!(guard.get().await.unwrap().id, 1);
    }

    #[tokio::test]
    async fn test_connect_failure_propagates_and_retries_next_time() {
        let (mut guard, counters) = guard();
        counters.refuse.store(true, Ordering::SeqCst);
        assert!(guard.get().await.err().unwrap().is_queue());
        assert!(!guard.is_connected());

        counters.refuse.store(false, Ordering::SeqCst);
        assert!(guard.get().await.is_ok());
    }

    #[tokio::test]
    async fn test_released_on_close_and_drop() {
        let (mut guard, counters) = guard();
        guard.get().await.unwrap();
        guard.close().await;
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
        assert_eq!(counters.dropped.load(Ordering::SeqCst), 1);

        guard.get().await.unwrap();
        drop(guard);
        assert_eq!(counters.dropped.load(Ordering::SeqCst), 2);
    }
}
