//! Admission control: bounds how many orchestrator processes run at once.

use std::sync::Arc;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Shared run-slot pool. Clones share the same slots.
#[derive(Debug, Clone)]
pub struct Admission {
    slots: Arc<Semaphore>,
    limit: usize,
}

impl Admission {
    /// `limit` is clamped to at least one slot.
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            slots: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Wait for a free slot. The slot is released when the permit drops.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, AcquireError> {
        Arc::clone(&self.slots).acquire_owned().await
    }

    /// Stop admitting runs; waiting and future `acquire` calls fail.
    pub fn close(&self) {
        self.slots.close();
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn zero_limit_is_clamped() {
        let admission = Admission::new(0);
        assert_eq!(admission.limit(), 1);
        let _permit = admission.acquire().await.unwrap();
        assert_eq!(admission.available(), 0);
    }

    #[tokio::test]
    async fn excess_requests_wait_for_a_slot() {
        let admission = Admission::new(1);
        let first = admission.acquire().await.unwrap();

        let waiting = admission.clone();
        let second = tokio::spawn(async move { waiting.acquire().await.map(|_| ()) });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!second.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), second)
            .await
            .expect("second run admitted")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn closed_admission_rejects() {
        let admission = Admission::new(2);
        admission.close();
        assert!(admission.acquire().await.is_err());
    }
}
