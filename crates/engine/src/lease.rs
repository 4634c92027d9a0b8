//! Per-campaign exclusivity for lifecycle passes.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Hands out one async lock per campaign id so that a `synchronize` pass and a
/// sweep pass over the same record serialize, while unrelated records proceed
/// in parallel.
#[derive(Default)]
pub struct LeaseTable {
    leases: DashMap<Uuid, Arc<Mutex<()>>>,
}

/// Held for the duration of one record's pass. Dropping it releases the lease.
pub struct Lease {
    id: Uuid,
    _guard: OwnedMutexGuard<()>,
}

impl Lease {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl LeaseTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, id: Uuid) -> Lease {
        // Clone the Arc out so the shard lock is released before awaiting.
        let lock = self
            .leases
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        Lease { id, _guard: guard }
    }

    /// Drops locks nobody holds or waits on.
    pub fn prune(&self) {
        self.leases.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.leases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_id_serializes() {
        let table = Arc::new(LeaseTable::new());
        let id = Uuid::new_v4();

        let lease = table.acquire(id).await;
        assert_eq!(lease.id(), id);

        let contender = {
            let table = table.clone();
            tokio::spawn(async move {
                let _lease = table.acquire(id).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(lease);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_ids_do_not_block() {
        let table = LeaseTable::new();
        let _a = table.acquire(Uuid::new_v4()).await;
        let _b = tokio::time::timeout(Duration::from_millis(50), table.acquire(Uuid::new_v4()))
            .await
            .expect("unrelated lease must not block");
        assert_eq!(table.len(), 2);
    }

    #[tokio::test]
    async fn test_prune_releases_idle_locks() {
        let table = LeaseTable::new();
        let held = table.acquire(Uuid::new_v4()).await;
        drop(table.acquire(Uuid::new_v4()).await);

        table.prune();
        assert_eq!(table.len(), 1);
        drop(held);
        table.prune();
        assert!(table.is_empty());
    }
}
