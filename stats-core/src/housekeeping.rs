//! Periodic maintenance (`spec.md` §4.7): refreshing derived globals and
//! rebroadcasting throttled `REGULAR` stats, and purging stale mounts.
//!
//! Neither function owns a clock or a scheduler; [`crate::engine::StatsEngine`]
//! calls them from a `tokio::time::interval` tick in `stats-server`, passing
//! the current wall-clock second.

use crate::flags::StatFlags;
use crate::node::Node;
use crate::ports::{ConnectionCounters, FallbackDirectory};
use crate::store::{GlobalStore, SourceStore};
use crate::subscriber::SubscriberRegistry;

/// Seconds a `REGULAR` global may go unreported before the next tick forces
/// a rebroadcast, even with no intervening write (`spec.md` §4.7).
const REGULAR_REPORT_INTERVAL_SECS: i64 = 9;

fn refresh_counter(global: &mut std::collections::BTreeMap<String, Node>, name: &str, value: Option<i64>) {
    let Some(value) = value else { return };
    match global.get_mut(name) {
        Some(node) => node.value = value.to_string(),
        None => {
            global.insert(
                name.to_string(),
                Node::new(name, value.to_string(), StatFlags::PUBLIC | StatFlags::COUNTERS | StatFlags::REGULAR),
            );
        }
    }
}

/// Refreshes `clients`/`listeners`/`outgoing_kbitrate` from `counters`, then
/// rebroadcasts every `REGULAR` global whose `last_reported` is more than
/// [`REGULAR_REPORT_INTERVAL_SECS`] behind `now` (`spec.md` §4.1, §4.7).
///
/// `engine::apply_global` resets `last_reported` to 0 on a `REGULAR` value
/// change but does not broadcast it itself (`process_global_event` gates
/// the event-path broadcast on `(node->flags & STATS_REGULAR) == 0` in the
/// original) — this tick is the only place a `REGULAR` global's new value
/// ever reaches subscribers.
pub fn global_calc(global: &GlobalStore, registry: &SubscriberRegistry, counters: &dyn ConnectionCounters, now: i64) {
    let mut map = global.write();
    refresh_counter(&mut map, "clients", counters.clients());
    refresh_counter(&mut map, "listeners", counters.listeners());
    refresh_counter(&mut map, "outgoing_kbitrate", counters.outgoing_kbitrate());

    for node in map.values_mut() {
        if !node.flags.contains(StatFlags::REGULAR) {
            continue;
        }
        if node.last_reported + REGULAR_REPORT_INTERVAL_SECS >= now {
            continue;
        }
        node.last_reported = now;
        let line = format!("EVENT global {} {}\n", node.name, node.value);
        registry.broadcast(&line, node.flags, now);
    }
}

/// Drops mounts past their deadline (`spec.md` §4.7):
///
/// - A `/`-prefixed mount is purged once its expiry (`updated`, set by
///   [`crate::Handle::set_expire`]/released-stream cleanup) is before `mark`.
/// - A non-`/` pseudo-mount (a fallback file entry with no live `Source`
///   behind it) is purged as soon as `fallback` no longer reports it.
///
/// Emits one `DELETE <mount>` line per removal.
pub fn purge(sources: &SourceStore, registry: &SubscriberRegistry, fallback: &dyn FallbackDirectory, mark: i64, now: i64) {
    for mount in sources.mounts() {
        let Some(source) = sources.get(&mount) else { continue };
        let stale = if mount.starts_with('/') {
            source.updated() < mark
        } else {
            !fallback.contains(&mount)
        };
        if !stale {
            continue;
        }
        sources.remove(&mount);
        registry.broadcast(&format!("DELETE {mount}\n"), StatFlags::PUBLIC, now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::NullFallbackDirectory;

    struct FixedCounters {
        clients: i64,
    }

    impl ConnectionCounters for FixedCounters {
        fn clients(&self) -> Option<i64> {
            Some(self.clients)
        }
        fn listeners(&self) -> Option<i64> {
            None
        }
        fn outgoing_kbitrate(&self) -> Option<i64> {
            None
        }
    }

    #[test]
    fn global_calc_refreshes_and_rebroadcasts_regular() {
        let global = GlobalStore::new();
        global.write().insert(
            "clients".into(),
            Node::new("clients", "0", StatFlags::PUBLIC | StatFlags::COUNTERS | StatFlags::REGULAR),
        );
        let registry = SubscriberRegistry::new();
        let sub = crate::subscriber::Subscriber::new(StatFlags::GENERAL, 0);
        registry.register(sub.clone());

        global_calc(&global, &registry, &FixedCounters { clients: 7 }, 100);

        assert_eq!(global.read().get("clients").unwrap().value, "7");
        assert_eq!(global.read().get("clients").unwrap().last_reported, 100);
        let batch = sub.drain_batch().unwrap();
        assert_eq!(batch.as_ref(), b"EVENT global clients 7\n");
    }

    #[test]
    fn global_calc_skips_recently_reported_regular() {
        let global = GlobalStore::new();
        global
            .write()
            .insert("x".into(), Node::new("x", "1", StatFlags::REGULAR));
        global.write().get_mut("x").unwrap().last_reported = 95;
        let registry = SubscriberRegistry::new();
        let sub = crate::subscriber::Subscriber::new(StatFlags::GENERAL, 0);
        registry.register(sub.clone());

        global_calc(&global, &registry, &crate::ports::NullConnectionCounters, 100);

        assert!(sub.drain_batch().is_none());
    }

    #[test]
    fn purge_drops_expired_mount_and_stale_fallback() {
        let sources = SourceStore::new();
        sources.get_or_create("/live", 50);
        sources.get_or_create("fallback-entry", 0);
        let registry = SubscriberRegistry::new();
        let sub = crate::subscriber::Subscriber::new(StatFlags::PUBLIC, 0);
        registry.register(sub.clone());

        purge(&sources, &registry, &NullFallbackDirectory, 60, 60);

        assert!(sources.get("/live").is_none());
        assert!(sources.get("fallback-entry").is_none());
        let batch = sub.drain_batch().unwrap();
        let text = String::from_utf8(batch.to_vec()).unwrap();
        assert!(text.contains("DELETE /live"));
        assert!(text.contains("DELETE fallback-entry"));
    }

    #[test]
    fn purge_keeps_mount_with_far_expiry() {
        let sources = SourceStore::new();
        sources.get_or_create("/live", crate::source::EXPIRE_NEVER);
        let registry = SubscriberRegistry::new();

        purge(&sources, &registry, &NullFallbackDirectory, 60, 60);

        assert!(sources.get("/live").is_some());
    }
}
