//! The `StatsEngine` singleton (`spec.md` §2, §6): wires the global store,
//! source store, and subscriber registry together and exposes the inbound
//! API the rest of a streaming server calls into.
//!
//! Modeled as a constructed value threaded through callers rather than a
//! `lazy_static`/global (`spec.md` §9) — `initialize`/`shutdown` stay
//! explicit and the engine is trivially constructible in tests.

use std::collections::VecDeque;
use std::sync::Arc;

use encoding_rs::Encoding;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::IdentityConfig;
use crate::error::{StatsError, StatsResult};
use crate::event::Action;
use crate::flags::StatFlags;
use crate::frame::Frame;
use crate::handle::Handle;
use crate::housekeeping;
use crate::node::Node;
use crate::ports::{FallbackDirectory, ListenerDirectory, NullFallbackDirectory, NullListenerDirectory};
use crate::processing::{self, Outcome};
use crate::snapshot::{self, SnapshotFilter};
use crate::source::Source;
use crate::streamlist;
use crate::subscriber::{Subscriber, SubscriberId, SubscriberRegistry};
use crate::{ConnectionCounters, GlobalStore, SourceStore};

const REGISTRATION_HEADER: &str = "HTTP/1.0 200 OK\r\nCapability: streamlist stats\r\n\r\n";

pub struct StatsEngine {
    global: GlobalStore,
    sources: SourceStore,
    subscribers: Arc<SubscriberRegistry>,
    fallback: Arc<dyn FallbackDirectory>,
    listeners: Arc<dyn ListenerDirectory>,
    shutdown: CancellationToken,
}

impl StatsEngine {
    pub fn new(fallback: Arc<dyn FallbackDirectory>, listeners: Arc<dyn ListenerDirectory>) -> Arc<Self> {
        Arc::new(Self {
            global: GlobalStore::new(),
            sources: SourceStore::new(),
            subscribers: Arc::new(SubscriberRegistry::new()),
            fallback,
            listeners,
            shutdown: CancellationToken::new(),
        })
    }

    /// Convenience constructor with no live fallback/listener collaborator
    /// wired in, for tests and standalone use.
    pub fn standalone() -> Arc<Self> {
        Self::new(Arc::new(NullFallbackDirectory), Arc::new(NullListenerDirectory))
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn global_store(&self) -> &GlobalStore {
        &self.global
    }

    pub fn source_store(&self) -> &SourceStore {
        &self.sources
    }

    // ---- lifecycle ----------------------------------------------------

    /// Seeds the counters and identity scalars `stats.c: stats_initialize`
    /// seeds at startup (`spec.md` §3 expansion).
    pub fn initialize(&self, now: i64, build: Option<&str>) {
        const REGULAR_COUNTERS: &[&str] = &[
            "clients",
            "listeners",
            "connections",
            "sources",
            "stats",
            "banned_IPs",
            "client_connections",
            "source_client_connections",
            "source_relay_connections",
            "source_total_connections",
            "stats_connections",
            "listener_connections",
            "outgoing_kbitrate",
            "stream_kbytes_sent",
            "stream_kbytes_read",
        ];
        let mut map = self.global.write();
        for name in REGULAR_COUNTERS {
            map.insert(
                (*name).to_string(),
                Node::new(*name, "0", StatFlags::PUBLIC | StatFlags::COUNTERS | StatFlags::REGULAR),
            );
        }
        map.insert("server_start".into(), Node::new("server_start", now.to_string(), StatFlags::GENERAL));
        if let Some(build) = build {
            map.insert("build".into(), Node::new("build", build, StatFlags::empty()));
        }
    }

    /// Refreshes the identity globals from a fresh configuration snapshot
    /// (`global(config)` / `stats_global`, `spec.md` §3 expansion).
    pub fn global(&self, config: &IdentityConfig, now: i64) {
        self.event_flags(None, Some("server_id"), Some(&config.server_id), StatFlags::GENERAL, now);
        self.event_flags(None, Some("host"), Some(&config.host), StatFlags::GENERAL, now);
        self.event(None, Some("location"), Some(&config.location), now);
        self.event(None, Some("admin"), Some(&config.admin), now);
        if let Some(build) = &config.build {
            self.event(None, Some("build"), Some(build), now);
        }
    }

    // ---- inbound stat mutation API -------------------------------------

    pub fn event(&self, source: Option<&str>, name: Option<&str>, value: Option<&str>, now: i64) {
        self.apply_single(source, name, value, StatFlags::empty(), Action::Set, now);
    }

    pub fn event_inc(&self, source: Option<&str>, name: &str, now: i64) {
        let buf = processing::operand_buffer(Action::Inc, 0);
        self.apply_single(source, Some(name), Some(&buf), StatFlags::empty(), Action::Inc, now);
    }

    pub fn event_dec(&self, source: Option<&str>, name: &str, now: i64) {
        let buf = processing::operand_buffer(Action::Dec, 0);
        self.apply_single(source, Some(name), Some(&buf), StatFlags::empty(), Action::Dec, now);
    }

    pub fn event_add(&self, source: Option<&str>, name: &str, delta: i64, now: i64) {
        let buf = processing::operand_buffer(Action::Add, delta);
        self.apply_single(source, Some(name), Some(&buf), StatFlags::empty(), Action::Add, now);
    }

    pub fn event_sub(&self, source: Option<&str>, name: &str, delta: i64, now: i64) {
        let buf = processing::operand_buffer(Action::Sub, delta);
        self.apply_single(source, Some(name), Some(&buf), StatFlags::empty(), Action::Sub, now);
    }

    pub fn event_remove(&self, source: Option<&str>, name: &str, now: i64) {
        self.apply_single(source, Some(name), None, StatFlags::empty(), Action::Remove, now);
    }

    /// Whole-source `REMOVE` (`name == None`): drops the source unless it
    /// carries a `fallback` child, in which case it is retained for `purge`
    /// to reap later (`spec.md` §4.1, §8 scenario 5).
    pub fn remove_source(&self, mount: &str, now: i64) {
        self.apply_whole_source(mount, StatFlags::empty(), Action::Remove, now);
    }

    /// `event_flags`/`set_flags`: `name == None` at source scope toggles the
    /// source's whole-`HIDDEN` visibility (`spec.md` §4.1); `name == None` at
    /// global scope is a no-op (global store has no visibility toggle).
    pub fn event_flags(&self, source: Option<&str>, name: Option<&str>, value: Option<&str>, flags: StatFlags, now: i64) {
        match (source, name) {
            (Some(mount), None) => self.set_source_visibility(mount, flags, now),
            (None, None) => warn!("event_flags with no name at global scope is a no-op"),
            _ => self.apply_single_flags(source, name, value, flags, now),
        }
    }

    pub fn event_time(&self, source: Option<&str>, name: &str, flags: StatFlags, unix_secs: i64, now: i64) {
        self.event_flags(source, Some(name), Some(&unix_secs.to_string()), flags, now);
    }

    /// Re-encodes `value` from `charset` to UTF-8, logging and dropping the
    /// write on an unrecognized charset (`spec.md` §7 item 3).
    pub fn event_conv(&self, source: Option<&str>, name: &str, value: &[u8], charset: &str, now: i64) {
        let Some(encoding) = Encoding::for_label(charset.as_bytes()) else {
            warn!(charset, name, "unknown charset, dropping stat write");
            return;
        };
        let (decoded, _, had_errors) = encoding.decode(value);
        if had_errors {
            warn!(charset, name, "charset conversion had replacement errors");
        }
        self.event(source, Some(name), Some(&decoded), now);
    }

    pub fn get_value(&self, source: Option<&str>, name: &str) -> Option<String> {
        match source {
            None => self.global.read().get(name).map(|n| n.value.clone()),
            Some(mount) => self
                .sources
                .get(mount)
                .and_then(|s| s.read().children.get(name).map(|n| n.value.clone())),
        }
    }

    fn apply_single(&self, source: Option<&str>, name: Option<&str>, value: Option<&str>, flags: StatFlags, action: Action, now: i64) {
        match source {
            None => self.apply_global(name, value, flags, action, now),
            Some(mount) => self.apply_source(mount, name, value, flags, action, now),
        }
    }

    fn apply_single_flags(&self, source: Option<&str>, name: Option<&str>, value: Option<&str>, flags: StatFlags, now: i64) {
        let Some(name) = name else { return };
        match source {
            None => {
                let outcome = {
                    let mut map = self.global.write();
                    processing::apply_flags(&mut map, name, value, flags, false)
                };
                // A REGULAR value change resets last_reported to 0 inside
                // processing::apply_flags and is left for global_calc's next
                // tick to broadcast, symmetric with apply_global below.
                if let Outcome::Upserted { flags, .. } = &outcome {
                    if flags.contains(StatFlags::REGULAR) {
                        return;
                    }
                }
                self.broadcast_global_outcome(name, outcome, now);
            }
            Some(mount) => {
                let source = self.sources.get_or_create(mount, now);
                let inherited_hidden = source.is_hidden();
                let outcome = {
                    let mut state = source.write();
                    processing::apply_flags(&mut state.children, name, value, flags, inherited_hidden)
                };
                self.broadcast_source_outcome(mount, name, outcome, now);
            }
        }
    }

    /// Global-scope single-stat mutation. A non-`REGULAR` change broadcasts
    /// immediately; a `REGULAR` value change instead resets `last_reported`
    /// to 0 (inside `processing::apply`) and is picked up by `global_calc`'s
    /// next tick, matching `process_global_event`'s event-path gate of
    /// `(node->flags & STATS_REGULAR) == 0` in the original.
    fn apply_global(&self, name: Option<&str>, value: Option<&str>, flags: StatFlags, action: Action, now: i64) {
        let Some(name) = name else {
            warn!("global scope event with no stat name is a no-op");
            return;
        };
        let outcome = {
            let mut map = self.global.write();
            processing::apply(&mut map, name, value, flags, action, false)
        };
        if let Outcome::Upserted { flags, .. } = &outcome {
            if flags.contains(StatFlags::REGULAR) {
                return;
            }
        }
        self.broadcast_global_outcome(name, outcome, now);
    }

    fn broadcast_global_outcome(&self, name: &str, outcome: Outcome, now: i64) {
        match outcome {
            Outcome::Upserted { value, flags } => {
                let line = format!("EVENT global {name} {value}\n");
                self.subscribers.broadcast(&line, flags, now);
            }
            Outcome::Removed => {
                self.subscribers.broadcast(&format!("DELETE global {name}\n"), StatFlags::PUBLIC, now);
            }
            Outcome::Suppressed | Outcome::NoSuchNode => {}
        }
    }

    /// Source-scope single-stat mutation. Always broadcasts on upsert,
    /// symmetric with the global path above.
    fn apply_source(&self, mount: &str, name: Option<&str>, value: Option<&str>, flags: StatFlags, action: Action, now: i64) {
        let Some(name) = name else {
            return self.apply_whole_source(mount, flags, action, now);
        };
        let source = self.sources.get_or_create(mount, now);
        let inherited_hidden = source.is_hidden();
        let outcome = {
            let mut state = source.write();
            processing::apply(&mut state.children, name, value, flags, action, inherited_hidden)
        };
        self.broadcast_source_outcome(mount, name, outcome, now);
    }

    fn broadcast_source_outcome(&self, mount: &str, name: &str, outcome: Outcome, now: i64) {
        match outcome {
            Outcome::Upserted { value, flags } => {
                let line = format!("EVENT {mount} {name} {value}\n");
                self.subscribers.broadcast(&line, flags, now);
            }
            Outcome::Removed => {
                self.subscribers.broadcast(&format!("DELETE {mount} {name}\n"), StatFlags::PUBLIC, now);
            }
            Outcome::Suppressed | Outcome::NoSuchNode => {}
        }
    }

    /// `name == None` at source scope: whole-source `REMOVE` (only when no
    /// `fallback` child is present) or a `HIDDEN` flags toggle (`spec.md`
    /// §4.1).
    fn apply_whole_source(&self, mount: &str, flags: StatFlags, action: Action, now: i64) {
        match action {
            Action::Remove => {
                let Some(source) = self.sources.get(mount) else { return };
                if source.has_fallback_child() {
                    // Retained: purge() will drop non-fallback entries on its own cadence.
                    return;
                }
                self.sources.remove(mount);
                self.subscribers.broadcast(&format!("DELETE {mount}\n"), StatFlags::PUBLIC, now);
            }
            Action::Hidden => self.set_source_visibility(mount, flags, now),
            _ => warn!(mount, ?action, "unsupported whole-source action"),
        }
    }

    /// Toggles a source's `HIDDEN` bit to whatever `flags` carries,
    /// synchronizing every child and emitting `NEW`/`DELETE` on a
    /// visibility transition (`spec.md` §4.1).
    fn set_source_visibility(&self, mount: &str, flags: StatFlags, now: i64) {
        let source = self.sources.get_or_create(mount, now);
        let new_hidden = flags.contains(StatFlags::HIDDEN);
        let (was_hidden, server_type, children) = {
            let mut state = source.write();
            let was_hidden = state.flags.contains(StatFlags::HIDDEN);
            state.flags = flags;
            for child in state.children.values_mut() {
                child.flags.set(StatFlags::HIDDEN, new_hidden);
            }
            let server_type = state.children.get("server_type").map(|n| n.value.clone());
            (was_hidden, server_type, state.children.values().cloned().collect::<Vec<Node>>())
        };

        if was_hidden && !new_hidden {
            let server_type = server_type.unwrap_or_else(|| "audio/mpeg".to_string());
            self.subscribers.broadcast(&format!("NEW {server_type} {mount}\n"), flags, now);
            // Every child is announced under the source's own new flags, not
            // its individual per-stat flags: this is a full resync of a
            // newly-visible source, gated on the same subscriber mask the
            // NEW line just used.
            for child in children {
                let line = format!("EVENT {mount} {} {}\n", child.name, child.value);
                self.subscribers.broadcast(&line, flags, now);
            }
        } else if !was_hidden && new_hidden {
            self.subscribers.broadcast(&format!("DELETE {mount}\n"), StatFlags::PUBLIC, now);
        }
    }

    // ---- handle API -----------------------------------------------------

    /// Implicitly creates the source, pins its expiry to
    /// [`crate::source::EXPIRE_NEVER`], and returns a write-locked [`Handle`]
    /// (`spec.md` §4.6). Rejected once [`Self::shutdown`] has run: a
    /// late-arriving source has nothing left to report to.
    pub fn handle(&self, mount: &str, now: i64) -> StatsResult<Handle> {
        if self.shutdown.is_cancelled() {
            return Err(StatsError::ShuttingDown);
        }
        let source = self.sources.get_or_create(mount, now);
        source.set_expire(crate::source::EXPIRE_NEVER);
        self.lock(source)
    }

    /// Re-acquires a write lock on a previously released source without a
    /// source-store lookup (`lock(handle, mount)` in `spec.md` §4.6).
    pub fn lock(&self, source: Arc<Source>) -> StatsResult<Handle> {
        if self.shutdown.is_cancelled() {
            return Err(StatsError::ShuttingDown);
        }
        let guard = source.state_arc().write_arc();
        Ok(Handle::new(source, guard, Arc::clone(&self.subscribers)))
    }

    // ---- subscriber registration ----------------------------------------

    /// Registers a new subscriber and delivers it exactly one consistent
    /// snapshot followed by the live tail (`spec.md` §4.4).
    pub fn add_listener(&self, mask: StatFlags, now: i64) -> Arc<Subscriber> {
        let subscriber = Subscriber::new(mask, now);
        self.subscribers.register(subscriber.clone());

        let detached = self.build_registration_burst(mask);
        subscriber.splice_front(detached, now);
        subscriber
    }

    pub fn remove_listener(&self, id: SubscriberId) {
        self.subscribers.remove(id);
    }

    fn build_registration_burst(&self, mask: StatFlags) -> VecDeque<Frame> {
        let mut frames = VecDeque::new();
        frames.push_back(Frame::sealed(REGISTRATION_HEADER));

        let push_line = |frames: &mut VecDeque<Frame>, line: &str| {
            if let Some(tail) = frames.back_mut() {
                if tail.can_append(line.len()) {
                    tail.append(line);
                    return;
                }
            }
            let mut frame = Frame::new();
            frame.append(line);
            frames.push_back(frame);
        };

        for node in self.global.read().values() {
            if StatFlags::matches_subscriber(node.flags, mask) {
                push_line(&mut frames, &format!("EVENT global {} {}\n", node.name, node.value));
            }
        }

        let sources = self.sources.snapshot();
        let visible_sources: Vec<_> = sources
            .iter()
            .filter(|s| !s.is_hidden() || mask.is_admin())
            .collect();

        for source in &visible_sources {
            let state = source.read();
            let server_type = state.children.get("server_type").map(|n| n.value.clone()).unwrap_or_else(|| "audio/mpeg".to_string());
            if StatFlags::matches_subscriber(state.flags, mask) {
                push_line(&mut frames, &format!("NEW {server_type} {}\n", source.mount));
            }
        }

        push_line(&mut frames, "INFO full list end\n");

        for source in &visible_sources {
            let state = source.read();
            let mut children: Vec<&Node> = state.children.values().collect();
            children.sort_by_key(|n| n.name == "metadata_updated");
            for node in children {
                if !StatFlags::matches_subscriber(node.flags, mask) {
                    continue;
                }
                push_line(&mut frames, &format!("EVENT {} {} {}\n", source.mount, node.name, node.value));
            }
        }

        frames
    }

    // ---- housekeeping -----------------------------------------------------

    pub fn global_calc(&self, counters: &dyn ConnectionCounters, now: i64) {
        housekeeping::global_calc(&self.global, &self.subscribers, counters, now);
    }

    pub fn purge(&self, mark: i64, now: i64) {
        housekeeping::purge(&self.sources, &self.subscribers, self.fallback.as_ref(), mark, now);
    }

    pub fn clients_wakeup(&self) {
        self.subscribers.wake_all();
    }

    // ---- snapshot / streamlist --------------------------------------------

    pub fn snapshot_xml(&self, filter: &SnapshotFilter) -> String {
        snapshot::serialize(&self.global, &self.sources, filter, self.listeners.as_ref())
    }

    pub fn streamlist(&self, prefix: Option<&str>) -> String {
        streamlist::build(&self.sources, prefix)
    }
}

impl std::fmt::Debug for StatsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsEngine")
            .field("sources", &self.sources.len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
