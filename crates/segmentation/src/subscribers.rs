//! Subscriber source: the read-only view of the subscriber population the
//! evaluator scans. The subscriber CRUD store lives elsewhere; this module
//! only defines the seam and an in-memory implementation.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use segment_core::error::SegmentResult;
use segment_core::types::Subscriber;
use tracing::info;
use uuid::Uuid;

/// Read access to the subscriber population.
pub trait SubscriberSource: Send + Sync {
    /// Cursor over all subscribers in a stable order. Items are shared
    /// handles; a scan never copies subscriber records.
    fn stream(&self) -> Box<dyn Iterator<Item = Arc<Subscriber>> + Send + '_>;

    /// Distinct tags in use, sorted. Used for builder suggestions only.
    fn tags(&self) -> Vec<String>;

    /// Distinct signup sources, sorted. Used for builder suggestions only.
    fn sources(&self) -> Vec<String>;
}

/// In-memory subscriber population. Iteration order is insertion order.
///
/// The population is held as a shared snapshot. Readers clone the outer
/// `Arc` and scan without the lock; writers copy the handle list only while
/// a scan still holds the previous snapshot.
pub struct InMemorySubscriberStore {
    subscribers: RwLock<Arc<Vec<Arc<Subscriber>>>>,
}

impl InMemorySubscriberStore {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Arc::new(Vec::new())),
        }
    }

    pub fn with_subscribers(subscribers: Vec<Subscriber>) -> Self {
        Self {
            subscribers: RwLock::new(Arc::new(
                subscribers.into_iter().map(Arc::new).collect(),
            )),
        }
    }

    /// Load a JSON array of subscribers from disk.
    pub fn load_json(path: impl AsRef<Path>) -> SegmentResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let subscribers: Vec<Subscriber> = serde_json::from_str(&raw)?;
        info!(
            path = %path.as_ref().display(),
            count = subscribers.len(),
            "Subscriber seed loaded"
        );
        Ok(Self::with_subscribers(subscribers))
    }

    /// Insert, or replace the record with the same id in place.
    pub fn upsert(&self, subscriber: Subscriber) {
        let mut guard = self.subscribers.write();
        let subscribers = Arc::make_mut(&mut *guard);
        match subscribers.iter_mut().find(|s| s.id == subscriber.id) {
            Some(existing) => *existing = Arc::new(subscriber),
            None => subscribers.push(Arc::new(subscriber)),
        }
    }

    pub fn get(&self, id: Uuid) -> Option<Subscriber> {
        self.subscribers
            .read()
            .iter()
            .find(|s| s.id == id)
            .map(|s| Subscriber::clone(s))
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }
}

impl Default for InMemorySubscriberStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriberSource for InMemorySubscriberStore {
    fn stream(&self) -> Box<dyn Iterator<Item = Arc<Subscriber>> + Send + '_> {
        // Evaluation never holds the lock while scanning.
        let snapshot = Arc::clone(&*self.subscribers.read());
        Box::new((0..snapshot.len()).map(move |i| Arc::clone(&snapshot[i])))
    }

    fn tags(&self) -> Vec<String> {
        let subscribers = self.subscribers.read();
        let tags: BTreeSet<&str> = subscribers
            .iter()
            .flat_map(|s| s.tags.iter().map(String::as_str))
            .filter(|t| !t.trim().is_empty())
            .collect();
        tags.into_iter().map(str::to_string).collect()
    }

    fn sources(&self) -> Vec<String> {
        let subscribers = self.subscribers.read();
        let sources: BTreeSet<&str> = subscribers
            .iter()
            .filter_map(|s| s.source.as_deref())
            .filter(|s| !s.trim().is_empty())
            .collect();
        sources.into_iter().map(str::to_string).collect()
    }
}
