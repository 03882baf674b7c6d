//! Session liveness flag.
//!
//! One [`Liveness`] is owned by the lifecycle; every loop holds a
//! [`LivenessToken`] and checks it at cycle start and after each suspension
//! point. Once cancelled a session never becomes alive again.

use std::sync::Arc;
use tokio::sync::watch;

/// Owner side of the liveness flag
#[derive(Debug, Clone)]
pub struct Liveness {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

impl Liveness {
    /// Create a live flag
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(true);
        Self { tx: Arc::new(tx) }
    }

    /// Hand out a token for a loop
    pub fn token(&self) -> LivenessToken {
        LivenessToken { rx: self.tx.subscribe() }
    }

    /// Request teardown. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_alive(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Reader side of the liveness flag
#[derive(Debug, Clone)]
pub struct LivenessToken {
    rx: watch::Receiver<bool>,
}

impl LivenessToken {
    pub fn is_alive(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the session is cancelled or its owner is gone
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // An error means the owner was dropped, which also ends the session
        let _ = rx.wait_for(|alive| !*alive).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_visible_to_tokens() {
        let liveness = Liveness::new();
        let token = liveness.token();
        assert!(token.is_alive());
        liveness.cancel();
        liveness.cancel();
        assert!(!token.is_alive());
        assert!(!liveness.is_alive());
    }

    #[tokio::test]
    async fn test_cancelled_resolves() {
        let liveness = Liveness::new();
        let token = liveness.token();
        liveness.cancel();
        token.cancelled().await;
    }

    #[tokio::test]
    async fn test_dropped_owner_counts_as_cancelled() {
        let token = Liveness::new().token();
        token.cancelled().await;
    }
}
