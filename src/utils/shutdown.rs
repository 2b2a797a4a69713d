use tokio::sync::broadcast;

/// Listens for the process-wide shutdown signal.
///
/// Only one value is ever sent on the channel. Once any value (or a closed/lagged
/// channel) is observed the listener stays in the shut down state.
#[derive(Debug)]
pub struct Shutdown {
    is_shutdown: bool,
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    pub fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            is_shutdown: false,
            notify,
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown
    }

    /// Waits for the shutdown notice, returning immediately if it was already seen.
    pub async fn recv(&mut self) {
        if self.is_shutdown {
            return;
        }
        let _ = self.notify.recv().await;
        self.is_shutdown = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_recv_after_send() {
        let (tx, rx) = broadcast::channel(1);
        let mut shutdown = Shutdown::new(rx);
        assert!(!shutdown.is_shutdown());
        tx.send(()).unwrap();
        shutdown.recv().await;
        assert!(shutdown.is_shutdown());
        // stays shut down
        shutdown.recv().await;
    }

    #[tokio::test]
    async fn test_closed_channel_counts_as_shutdown() {
        let (tx, rx) = broadcast::channel::<()>(1);
        let mut shutdown = Shutdown::new(rx);
        drop(tx);
        shutdown.recv().await;
        assert!(shutdown.is_shutdown());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_without_signal() {
        let (_tx, rx) = broadcast::channel::<()>(1);
        let mut shutdown = Shutdown::new(rx);
        let waited = tokio::time::timeout(Duration::from_secs(5), shutdown.recv()).await;
        assert!(waited.is_err());
        assert!(!shutdown.is_shutdown());
    }
}
