//! Strongly-typed identifiers and the collision-checked id allocator.

use core::str::FromStr;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

const ORDER_ID_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ1234567890";

/// Identifier of an order: a random alphanumeric string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OrderId {
    type Err = DomainError;

    fn from_str(s: &str) -> DomainResult<Self> {
        if s.is_empty() || !s.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DomainError::invalid_id(format!("OrderId: {s:?}")));
        }
        Ok(Self(s.to_string()))
    }
}

/// Identifier returned by a collaborator for an accepted request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Uses UUIDv7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for TransactionId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for TransactionId {
    type Err = DomainError;

    fn from_str(s: &str) -> DomainResult<Self> {
        let uuid =
            Uuid::from_str(s).map_err(|e| DomainError::invalid_id(format!("TransactionId: {e}")))?;
        Ok(Self(uuid))
    }
}

/// Storage for ids that have already been handed out.
pub trait IdStore: Send + Sync {
    /// Record `id` as used. Returns `false` if it was already taken.
    fn reserve(&self, id: &str) -> bool;

    /// Number of ids reserved so far.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory id store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryIdStore {
    used: Mutex<HashSet<String>>,
}

impl InMemoryIdStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdStore for InMemoryIdStore {
    fn reserve(&self, id: &str) -> bool {
        let mut used = self.used.lock().unwrap_or_else(|e| e.into_inner());
        used.insert(id.to_string())
    }

    fn len(&self) -> usize {
        self.used.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Allocates unique order ids, regenerating on collision.
///
/// Scoped to whoever owns it (a commander, a service stub); two allocators
/// with separate stores may hand out the same id.
#[derive(Clone)]
pub struct IdAllocator {
    store: Arc<dyn IdStore>,
    length: usize,
}

impl IdAllocator {
    pub const DEFAULT_LENGTH: usize = 12;

    pub fn new(store: Arc<dyn IdStore>) -> Self {
        Self {
            store,
            length: Self::DEFAULT_LENGTH,
        }
    }

    /// Allocator backed by a fresh [`InMemoryIdStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryIdStore::new()))
    }

    pub fn with_length(mut self, length: usize) -> Self {
        self.length = length.max(1);
        self
    }

    /// Generate ids until one is accepted by the store.
    pub fn next_order_id(&self) -> OrderId {
        let mut rng = rand::rng();
        loop {
            let candidate: String = (0..self.length)
                .map(|_| ORDER_ID_CHARS[rng.random_range(0..ORDER_ID_CHARS.len())] as char)
                .collect();
            if self.store.reserve(&candidate) {
                return OrderId(candidate);
            }
        }
    }

    pub fn allocated(&self) -> usize {
        self.store.len()
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl core::fmt::Debug for IdAllocator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IdAllocator")
            .field("length", &self.length)
            .field("allocated", &self.store.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Rejects the first `reject` reservations, then defers to an in-memory store.
    struct CollidingStore {
        reject: usize,
        seen: AtomicUsize,
        inner: InMemoryIdStore,
    }

    impl IdStore for CollidingStore {
        fn reserve(&self, id: &str) -> bool {
            if self.seen.fetch_add(1, Ordering::SeqCst) < self.reject {
                return false;
            }
            self.inner.reserve(id)
        }

        fn len(&self) -> usize {
            self.inner.len()
        }
    }

    #[test]
    fn order_ids_are_alphanumeric_with_default_length() {
        let allocator = IdAllocator::in_memory();
        let id = allocator.next_order_id();
        assert_eq!(id.as_str().len(), IdAllocator::DEFAULT_LENGTH);
        assert!(id.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn collisions_are_regenerated() {
        let store = Arc::new(CollidingStore {
            reject: 3,
            seen: AtomicUsize::new(0),
            inner: InMemoryIdStore::new(),
        });
        let allocator = IdAllocator::new(store.clone());

        let _ = allocator.next_order_id();

        assert_eq!(store.seen.load(Ordering::SeqCst), 4);
        assert_eq!(allocator.allocated(), 1);
    }

    #[test]
    fn same_store_rejects_duplicates() {
        let store = InMemoryIdStore::new();
        assert!(store.reserve("ABC"));
        assert!(!store.reserve("ABC"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn order_id_parse_rejects_non_alphanumeric() {
        assert!("ABC123".parse::<OrderId>().is_ok());
        assert!("".parse::<OrderId>().is_err());
        assert!("AB-12".parse::<OrderId>().is_err());
    }

    #[test]
    fn transaction_id_round_trips_through_display() {
        let id = TransactionId::new();
        let parsed: TransactionId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Property: a single allocator never hands out the same id twice,
        /// even with a tiny id space that forces collisions.
        #[test]
        fn allocated_ids_are_unique(count in 1usize..30) {
            let allocator = IdAllocator::in_memory().with_length(2);
            let mut seen = HashSet::new();
            for _ in 0..count {
                let id = allocator.next_order_id();
                prop_assert!(seen.insert(id));
            }
            prop_assert_eq!(allocator.allocated(), count);
        }
    }
}
