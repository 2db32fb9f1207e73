//! Per-volume serialisation.
//!
//! A fixed array of mutexes selected by a stable hash of the volume name:
//! operations on the same volume never overlap, operations on different
//! volumes only contend on a hash collision, and the set of locks never
//! grows.

use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

use tokio::sync::{Mutex, MutexGuard};

const STRIPES: usize = 32;

pub struct VolumeLocks {
    stripes: Vec<Mutex<()>>,
}

impl Default for VolumeLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl VolumeLocks {
    pub fn new() -> Self {
        Self {
            stripes: (0..STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    fn stripe(&self, volume_id: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        volume_id.hash(&mut hasher);
        hasher.finish() as usize % self.stripes.len()
    }

    /// Take the lock for this volume; held until the guard drops, which
    /// must cover the whole critical section.
    pub async fn lock(&self, volume_id: &str) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe(volume_id)].lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    #[tokio::test]
    async fn same_volume_never_interleaves() {
        let locks = Arc::new(VolumeLocks::new());
        let active = Arc::new(AtomicUsize::new(0));
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let active = Arc::clone(&active);
            tasks.push(tokio::spawn(async move {
                let _guard = locks.lock("vol-a").await;
                let inside = active.fetch_add(1, Ordering::SeqCst);
                assert_eq!(inside, 0, "critical sections overlapped");
                tokio::time::sleep(Duration::from_millis(10)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
    }

    #[tokio::test]
    async fn distinct_volumes_run_in_parallel() {
        let locks = Arc::new(VolumeLocks::new());
        // find a name on a different stripe than vol-0
        let other = (1..)
            .map(|i| format!("vol-{}", i))
            .find(|name| locks.stripe(name) != locks.stripe("vol-0"))
            .unwrap();

        let locks2 = Arc::clone(&locks);
        let _held = locks.lock("vol-0").await;
        // must not block on the held lock
        tokio::time::timeout(Duration::from_secs(1), locks2.lock(&other))
            .await
            .expect("distinct volumes blocked each other");
    }
}
