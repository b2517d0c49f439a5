//! Process-wide shutdown latch.
//!
//! Set once by SIGINT/SIGTERM (or by [`Shutdown::request`]) and never reset.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Routes SIGINT and SIGTERM into this latch. Can only be done once per
    /// process.
    pub fn install(&self) -> Result<(), ctrlc::Error> {
        let latch = self.clone();
        ctrlc::set_handler(move || {
            if !latch.is_requested() {
                info!("Termination signal received, finishing the current account");
            }
            latch.request();
        })
    }

    pub fn request(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been requested.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|requested| *requested).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_latch_starts_clear_and_stays_set() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_requested());
        shutdown.request();
        shutdown.request();
        assert!(shutdown.is_requested());
        assert!(shutdown.clone().is_requested());
    }

    #[tokio::test]
    async fn test_wait_wakes_on_request() {
        let shutdown = Shutdown::new();
        let waiter = shutdown.clone();
        let handle = tokio::spawn(async move { waiter.wait().await });
        shutdown.request();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_already_set() {
        let shutdown = Shutdown::new();
        shutdown.request();
        tokio::time::timeout(Duration::from_millis(100), shutdown.wait())
            .await
            .unwrap();
    }
}
