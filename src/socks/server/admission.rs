use std::{sync::Arc, time::Duration};
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Counting gate bounding the number of sessions running at once.
#[derive(Clone)]
pub struct Admission {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// One unit of admission capacity. Dropping it gives the unit back, so a
/// session releases exactly once no matter how it ends.
#[must_use = "the slot is released as soon as it is dropped"]
pub struct Slot {
    _permit: OwnedSemaphorePermit,
}

impl Admission {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, Semaphore::MAX_PERMITS);
        Admission {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently held.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    /// Waits until a slot is free and takes it.
    pub async fn acquire(&self) -> Result<Slot, AcquireError> {
        let permit = self.semaphore.clone().acquire_owned().await?;
        Ok(Slot { _permit: permit })
    }

    /// Waits up to `grace` for every slot to be returned. Returns whether the
    /// pool drained in time.
    pub async fn drain(&self, grace: Duration) -> bool {
        let all = u32::try_from(self.capacity).unwrap_or(u32::MAX);
        matches!(
            tokio::time::timeout(grace, self.semaphore.acquire_many(all)).await,
            Ok(Ok(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_blocks_when_saturated() {
        let admission = Admission::new(2);
        let first = admission.acquire().await.unwrap();
        let _second = admission.acquire().await.unwrap();
        assert_eq!(admission.in_flight(), 2);

        let third = tokio::time::timeout(Duration::from_millis(50), admission.acquire()).await;
        assert!(third.is_err(), "third slot must wait");

        drop(first);
        let _third = admission.acquire().await.unwrap();
        assert_eq!(admission.in_flight(), 2);
    }

    #[tokio::test]
    async fn test_slot_released_once_on_drop() {
        let admission = Admission::new(3);
        {
            let _slot = admission.acquire().await.unwrap();
            assert_eq!(admission.in_flight(), 1);
        }
        assert_eq!(admission.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_zero_capacity_is_raised_to_one() {
        let admission = Admission::new(0);
        assert_eq!(admission.capacity(), 1);
        let _slot = admission.acquire().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain() {
        let admission = Admission::new(2);
        let slot = admission.acquire().await.unwrap();
        assert!(!admission.drain(Duration::from_secs(1)).await);

        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            drop(slot);
        });

        assert!(admission.drain(Duration::from_secs(1)).await);
        release.await.unwrap();
        // draining hands every slot back afterwards
        assert_eq!(admission.in_flight(), 0);
    }
}
