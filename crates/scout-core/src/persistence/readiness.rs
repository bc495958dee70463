//! Readiness gate for asynchronously initialized storage

use crate::error::{ScoutError, ScoutResult};
use tokio::sync::watch;

#[derive(Debug)]
enum ReadyState {
    Pending,
    Ready,
    Failed(ScoutError),
}

/// One-shot readiness signal.
///
/// Waiters are woken by the watch channel when the state leaves `Pending`.
#[derive(Debug)]
pub struct Readiness {
    tx: watch::Sender<ReadyState>,
}

impl Readiness {
    /// Create a gate in the pending state
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ReadyState::Pending);
        Self { tx }
    }

    /// Open the gate
    pub fn mark_ready(&self) {
        self.tx.send_replace(ReadyState::Ready);
    }

    /// Fail every current and future waiter with `error`
    pub fn mark_failed(&self, error: ScoutError) {
        self.tx.send_replace(ReadyState::Failed(error));
    }

    /// Whether the gate is open
    pub fn is_ready(&self) -> bool {
        matches!(*self.tx.borrow(), ReadyState::Ready)
    }

    /// Wait until the gate is opened or failed
    pub async fn wait(&self) -> ScoutResult<()> {
        let mut rx = self.tx.subscribe();
        let state = rx
            .wait_for(|state| !matches!(state, ReadyState::Pending))
            .await
            .map_err(|_| ScoutError::initialization("readiness channel closed"))?;

        match &*state {
            ReadyState::Ready => Ok(()),
            ReadyState::Failed(error) => Err(error.clone()),
            ReadyState::Pending => Err(ScoutError::initialization("storage is not initialized")),
        }
    }
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_waiter_released_when_ready() {
        let readiness = Arc::new(Readiness::new());
        assert!(!readiness.is_ready());

        let waiter = {
            let readiness = Arc::clone(&readiness);
            tokio::spawn(async move { readiness.wait().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        readiness.mark_ready();
        waiter.await.unwrap().unwrap();
        assert!(readiness.is_ready());
    }

    #[tokio::test]
    async fn test_failure_propagates() {
        let readiness = Readiness::new();
        readiness.mark_failed(ScoutError::initialization("cannot create root"));

        let err = readiness.wait().await.unwrap_err();
        assert!(matches!(err, ScoutError::Initialization { .. }));
    }
}
