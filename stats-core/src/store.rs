use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::node::Node;
use crate::source::Source;

/// Ordered global stat map (`spec.md` §2/§4.2). `BTreeMap` gives the
/// lexicographic iteration order the snapshot serializer requires without a
/// hand-rolled ordered tree (`spec.md` §9).
#[derive(Debug, Default)]
pub struct GlobalStore {
    nodes: RwLock<BTreeMap<String, Node>>,
}

impl GlobalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, BTreeMap<String, Node>> {
        self.nodes.read()
    }

    pub fn write(&self) -> parking_lot::RwLockWriteGuard<'_, BTreeMap<String, Node>> {
        self.nodes.write()
    }
}

/// Ordered mount → [`Source`] map, the "outer" lock in the outer-then-inner
/// discipline of `spec.md` §4.2: always acquire this before a `Source`'s own
/// lock, never the reverse.
#[derive(Debug, Default)]
pub struct SourceStore {
    sources: RwLock<BTreeMap<String, Arc<Source>>>,
}

impl SourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, mount: &str) -> Option<Arc<Source>> {
        self.sources.read().get(mount).cloned()
    }

    /// Returns the existing source for `mount`, or creates and inserts one
    /// with a fresh [`Source::new`] if none exists.
    pub fn get_or_create(&self, mount: &str, now: i64) -> Arc<Source> {
        if let Some(existing) = self.sources.read().get(mount).cloned() {
            return existing;
        }
        let mut guard = self.sources.write();
        // Re-check: another writer may have created it between our read and write locks.
        guard
            .entry(mount.to_string())
            .or_insert_with(|| Arc::new(Source::new(mount, now)))
            .clone()
    }

    pub fn remove(&self, mount: &str) -> Option<Arc<Source>> {
        self.sources.write().remove(mount)
    }

    pub fn mounts(&self) -> Vec<String> {
        self.sources.read().keys().cloned().collect()
    }

    pub fn snapshot(&self) -> Vec<Arc<Source>> {
        self.sources.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sources.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.read().is_empty()
    }
}
