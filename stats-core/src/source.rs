use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::flags::StatFlags;
use crate::node::Node;

/// Deadline used by `purge` to mean "never expire" — set by `handle()` on a
/// freshly created source so a live publisher's mount survives until it
/// explicitly releases or the process restarts.
pub const EXPIRE_NEVER: i64 = i64::MAX;

/// The mutable state of one mount: its flags, expiry deadline, and child
/// stats. Grouped behind one lock so `HIDDEN` propagation to every child
/// (`spec.md` §3 Source invariant) is atomic, and so [`crate::Handle`] can
/// hold an owned write guard across a batch of updates (`spec.md` §4.6).
#[derive(Debug)]
pub struct SourceState {
    pub flags: StatFlags,
    pub updated: i64,
    pub children: BTreeMap<String, Node>,
}

/// One mount's stat container (`spec.md` §3 Source).
///
/// The source-store lock (see [`crate::store::SourceStore`]) is acquired
/// before this per-source lock, never the reverse.
#[derive(Debug)]
pub struct Source {
    pub mount: String,
    state: Arc<RwLock<SourceState>>,
}

impl Source {
    /// A freshly created source starts `SLAVE | GENERAL | HIDDEN`, matching
    /// both `process_source_event()` and `stats_handle()` in
    /// `original_source/src/stats.c`: a source is hidden until something
    /// explicitly announces it via `set_source_visibility`, which is what
    /// emits the `NEW <type> <mount>` line.
    pub fn new(mount: impl Into<String>, now: i64) -> Self {
        Self {
            mount: mount.into(),
            state: Arc::new(RwLock::new(SourceState {
                flags: StatFlags::SLAVE | StatFlags::GENERAL | StatFlags::HIDDEN,
                updated: now,
                children: BTreeMap::new(),
            })),
        }
    }

    /// Clones the `Arc` over this source's state, for [`crate::Handle`] to
    /// take an owned write lock on.
    pub fn state_arc(&self) -> Arc<RwLock<SourceState>> {
        Arc::clone(&self.state)
    }

    pub fn flags(&self) -> StatFlags {
        self.state.read().flags
    }

    pub fn is_hidden(&self) -> bool {
        self.flags().contains(StatFlags::HIDDEN)
    }

    pub fn updated(&self) -> i64 {
        self.state.read().updated
    }

    pub fn set_expire(&self, deadline: i64) {
        self.state.write().updated = deadline;
    }

    pub fn has_fallback_child(&self) -> bool {
        self.state.read().children.contains_key("fallback")
    }

    /// Drops all children, keeping the source node itself (`FLUSH`).
    pub fn flush_children(&self) {
        self.state.write().children.clear();
    }

    /// Snapshot of the current children, newest-lock-free clone for serializers.
    pub fn snapshot_children(&self) -> Vec<Node> {
        self.state.read().children.values().cloned().collect()
    }

    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, SourceState> {
        self.state.read()
    }

    pub fn write(&self) -> parking_lot::RwLockWriteGuard<'_, SourceState> {
        self.state.write()
    }
}
