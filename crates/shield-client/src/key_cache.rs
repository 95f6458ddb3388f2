//! Bounded public key cache.
//!
//! Lives for the process. Entries are only dropped by explicit invalidation
//! or by eviction of the oldest entry once the capacity is reached; there is
//! no time-based expiry because a published key never changes.

use std::collections::{HashMap, VecDeque};

use tokio::sync::Mutex;

use shield_core::{Identity, PublicKeyPem};

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<Identity, PublicKeyPem>,
    /// Insertion order, oldest first.
    order: VecDeque<Identity>,
}

/// Identity to public key cache with FIFO eviction.
#[derive(Debug)]
pub struct KeyCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl KeyCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn get(&self, identity: &Identity) -> Option<PublicKeyPem> {
        self.inner.lock().await.entries.get(identity).cloned()
    }

    pub async fn insert(&self, identity: Identity, public_key: PublicKeyPem) {
        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner.entries.get_mut(&identity) {
            *existing = public_key;
            return;
        }
        while inner.entries.len() >= self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }
        inner.order.push_back(identity.clone());
        inner.entries.insert(identity, public_key);
    }

    /// Drop one identity. Returns whether it was cached.
    pub async fn invalidate(&self, identity: &Identity) -> bool {
        let mut inner = self.inner.lock().await;
        let removed = inner.entries.remove(identity).is_some();
        if removed {
            inner.order.retain(|cached| cached != identity);
        }
        removed
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.entries.clear();
        inner.order.clear();
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shield_core::{KeyCodec, KeySize};
    use std::sync::OnceLock;

    fn key() -> PublicKeyPem {
        static KEY: OnceLock<PublicKeyPem> = OnceLock::new();
        KEY.get_or_init(|| {
            KeyCodec::new(KeySize::Rsa1024)
                .generate_key_pair()
                .unwrap()
                .public
        })
        .clone()
    }

    fn id(n: usize) -> Identity {
        Identity::new(format!("user{}@x.com", n)).unwrap()
    }

    #[tokio::test]
    async fn test_insert_get_invalidate() {
        let cache = KeyCache::new(4);
        assert!(cache.get(&id(1)).await.is_none());

        cache.insert(id(1), key()).await;
        assert_eq!(cache.get(&id(1)).await, Some(key()));

        assert!(cache.invalidate(&id(1)).await);
        assert!(!cache.invalidate(&id(1)).await);
        assert!(cache.get(&id(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_bounded_evicts_oldest() {
        let cache = KeyCache::new(3);
        for n in 0..5 {
            cache.insert(id(n), key()).await;
        }
        assert_eq!(cache.len().await, 3);
        assert!(cache.get(&id(0)).await.is_none());
        assert!(cache.get(&id(1)).await.is_none());
        assert!(cache.get(&id(4)).await.is_some());
    }

    #[tokio::test]
    async fn test_reinsert_does_not_grow() {
        let cache = KeyCache::new(2);
        cache.insert(id(1), key()).await;
        cache.insert(id(1), key()).await;
        cache.insert(id(2), key()).await;
        assert_eq!(cache.len().await, 2);
        assert!(cache.get(&id(1)).await.is_some());
    }

    #[tokio::test]
    async fn test_invalidate_frees_slot() {
        let cache = KeyCache::new(2);
        cache.insert(id(1), key()).await;
        cache.insert(id(2), key()).await;
        cache.invalidate(&id(1)).await;
        cache.insert(id(3), key()).await;
        assert!(cache.get(&id(2)).await.is_some());
        assert!(cache.get(&id(3)).await.is_some());
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = KeyCache::new(2);
        cache.insert(id(1), key()).await;
        cache.clear().await;
        assert!(cache.is_empty().await);
        assert_eq!(cache.capacity(), 2);
    }
}
