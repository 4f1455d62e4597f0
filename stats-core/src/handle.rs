use std::sync::Arc;

use encoding_rs::Encoding;
use lock_api::ArcRwLockWriteGuard;
use parking_lot::RawRwLock;
use tracing::warn;

use crate::error::{StatsError, StatsResult};
use crate::event::Action;
use crate::flags::StatFlags;
use crate::processing::{self, Outcome};
use crate::source::{Source, SourceState};
use crate::subscriber::SubscriberRegistry;

/// A batched-update handle on one source's stats (`spec.md` §4.6).
///
/// Holds an owned write guard over the source's inner map for the handle's
/// whole lifetime, the Rust counterpart of "`handle(mount)` ... returns with
/// the source's inner map write-locked" — `parking_lot`'s `arc_lock` feature
/// gives an [`ArcRwLockWriteGuard`] that doesn't borrow from `Handle` itself,
/// so no self-referential struct is needed.
pub struct Handle {
    source: Arc<Source>,
    guard: Option<ArcRwLockWriteGuard<RawRwLock, SourceState>>,
    registry: Arc<SubscriberRegistry>,
}

impl Handle {
    pub(crate) fn new(
        source: Arc<Source>,
        guard: ArcRwLockWriteGuard<RawRwLock, SourceState>,
        registry: Arc<SubscriberRegistry>,
    ) -> Self {
        Self {
            source,
            guard: Some(guard),
            registry,
        }
    }

    pub fn mount(&self) -> &str {
        &self.source.mount
    }

    pub fn source(&self) -> &Arc<Source> {
        &self.source
    }

    fn guard_mut(&mut self) -> &mut SourceState {
        self.guard.as_mut().expect("handle used after release")
    }

    fn apply_and_broadcast(&mut self, name: &str, value: Option<&str>, flags: StatFlags, action: Action, now: i64) {
        let mount = self.source.mount.clone();
        let inherited_hidden = self.guard_mut().flags.contains(StatFlags::HIDDEN);
        let state = self.guard_mut();
        let outcome = processing::apply(&mut state.children, name, value, flags, action, inherited_hidden);
        match outcome {
            Outcome::Upserted { value, flags } => {
                let line = format!("EVENT {mount} {name} {value}\n");
                self.registry.broadcast(&line, flags, now);
            }
            Outcome::Removed => {
                let line = format!("DELETE {mount} {name}\n");
                self.registry.broadcast(&line, StatFlags::PUBLIC, now);
            }
            Outcome::Suppressed | Outcome::NoSuchNode => {}
        }
    }

    pub fn set(&mut self, name: &str, value: &str, now: i64) {
        self.apply_and_broadcast(name, Some(value), StatFlags::empty(), Action::Set, now);
    }

    pub fn set_inc(&mut self, name: &str, now: i64) {
        let buf = processing::operand_buffer(Action::Inc, 0);
        self.apply_and_broadcast(name, Some(&buf), StatFlags::empty(), Action::Inc, now);
    }

    pub fn set_flags(&mut self, name: &str, value: &str, flags: StatFlags, now: i64) {
        self.apply_flags_and_broadcast(name, Some(value), flags, now);
    }

    fn apply_flags_and_broadcast(&mut self, name: &str, value: Option<&str>, flags: StatFlags, now: i64) {
        let mount = self.source.mount.clone();
        let inherited_hidden = self.guard_mut().flags.contains(StatFlags::HIDDEN);
        let state = self.guard_mut();
        let outcome = processing::apply_flags(&mut state.children, name, value, flags, inherited_hidden);
        if let Outcome::Upserted { value, flags } = outcome {
            let line = format!("EVENT {mount} {name} {value}\n");
            self.registry.broadcast(&line, flags, now);
        }
    }

    pub fn set_time(&mut self, name: &str, flags: StatFlags, unix_secs: i64, now: i64) {
        self.set_flags(name, &unix_secs.to_string(), flags, now);
    }

    pub fn set_expire(&mut self, deadline: i64) {
        self.guard_mut().updated = deadline;
    }

    /// Re-encodes `value` from `charset` to UTF-8 before setting; logs and
    /// drops the write on an unrecognized charset or invalid bytes
    /// (`spec.md` §7 item 3 — never surfaces as an error to the caller).
    pub fn set_conv(&mut self, name: &str, value: &[u8], charset: &str, now: i64) {
        let Some(encoding) = Encoding::for_label(charset.as_bytes()) else {
            warn!(charset, name, "unknown charset, dropping stat write");
            return;
        };
        let (decoded, _, had_errors) = encoding.decode(value);
        if had_errors {
            warn!(charset, name, "charset conversion had replacement errors");
        }
        self.set(name, &decoded, now);
    }

    /// Looks up one stat's current value. Fails with `HandleNotLocked` if
    /// the handle was already [`release`](Self::release)d, or
    /// `StatNotFound` if this source has never had a stat by that name
    /// (`spec.md` §7: "retrieve on an unknown handle").
    pub fn retrieve(&self, name: &str) -> StatsResult<String> {
        let state = self.guard.as_ref().ok_or_else(|| StatsError::HandleNotLocked(self.source.mount.clone()))?;
        state
            .children
            .get(name)
            .map(|n| n.value.clone())
            .ok_or_else(|| StatsError::StatNotFound(name.to_string()))
    }

    /// Drops all children while keeping the source node, emitting a single
    /// `FLUSH <mount>` line (`spec.md` §4.6).
    pub fn flush(&mut self, now: i64) {
        let mount = self.source.mount.clone();
        self.guard_mut().children.clear();
        self.registry.broadcast(&format!("FLUSH {mount}\n"), StatFlags::PUBLIC, now);
    }

    /// Drops the write lock. Consumes the handle; the `Arc<Source>` it was
    /// built from can still be used with [`crate::engine::StatsEngine::lock`]
    /// to re-acquire without a second source-store lookup.
    pub fn release(mut self) -> Arc<Source> {
        self.guard.take();
        self.source
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle").field("mount", &self.source.mount).finish()
    }
}
