//! End-to-end scenarios against a full `StatsEngine` (no HTTP layer).

use std::collections::BTreeMap;

use stats_core::{Source, StatFlags, StatsEngine};

fn drain_text(sub: &stats_core::Subscriber) -> String {
    let mut out = String::new();
    while let Some(bytes) = sub.drain_batch() {
        out.push_str(std::str::from_utf8(&bytes).unwrap());
    }
    out
}

#[test]
fn counter_increment_fan_out() {
    let engine = StatsEngine::standalone();
    engine.initialize(0, None);
    let sub = engine.add_listener(StatFlags::GENERAL | StatFlags::COUNTERS, 0);
    drain_text(&sub); // discard the registration burst

    engine.event_inc(None, "clients", 1);

    // "clients" is REGULAR; the event path never broadcasts it directly
    // (matches `process_global_event`'s `(node->flags & STATS_REGULAR) == 0`
    // gate in the original), so nothing reaches the subscriber until the
    // next global_calc tick.
    assert!(drain_text(&sub).is_empty());
    assert_eq!(engine.get_value(None, "clients"), Some("1".to_string()));

    engine.global_calc(&stats_core::NullConnectionCounters, 20);
    let text = drain_text(&sub);
    assert!(text.contains("EVENT global clients 1\n"), "got: {text}");
}

#[test]
fn hidden_source_becomes_visible() {
    let engine = StatsEngine::standalone();
    let sub = engine.add_listener(StatFlags::SLAVE, 0);
    drain_text(&sub);

    // A freshly created source defaults to HIDDEN, so this write never
    // fans out to a non-admin subscriber on its own.
    let mut h = engine.handle("/a.mp3", 0).unwrap();
    h.set("server_type", "application/ogg", 0);
    h.release();
    drain_text(&sub);

    engine.event_flags(Some("/a.mp3"), None, None, StatFlags::GENERAL | StatFlags::SLAVE, 0);

    let text = drain_text(&sub);
    assert!(text.contains("NEW application/ogg /a.mp3\n"), "got: {text}");
    assert!(text.contains("EVENT /a.mp3 server_type application/ogg\n"), "got: {text}");
    let new_pos = text.find("NEW").unwrap();
    let event_pos = text.find("EVENT /a.mp3").unwrap();
    assert!(new_pos < event_pos);
}

#[test]
fn regular_suppression() {
    let engine = StatsEngine::standalone();
    let sub = engine.add_listener(StatFlags::COUNTERS, 0);
    drain_text(&sub);

    engine.event_flags(None, Some("listeners"), Some("5"), StatFlags::COUNTERS | StatFlags::REGULAR, 0);
    engine.event_flags(None, Some("listeners"), Some("5"), StatFlags::COUNTERS | StatFlags::REGULAR, 1);

    // Neither write broadcasts directly; a REGULAR global only ever reaches
    // subscribers via global_calc's periodic tick.
    assert!(drain_text(&sub).is_empty());

    engine.global_calc(&stats_core::NullConnectionCounters, 20);
    let text = drain_text(&sub);
    assert_eq!(text.matches("EVENT global listeners 5\n").count(), 1, "got: {text}");

    // The value is unchanged and the interval hasn't elapsed again, so the
    // very next tick stays silent.
    engine.global_calc(&stats_core::NullConnectionCounters, 21);
    assert!(drain_text(&sub).is_empty());
}

#[test]
fn slow_consumer_eviction() {
    let engine = StatsEngine::standalone();
    // Admin mask so every line fans out regardless of the event's own flags.
    let sub = engine.add_listener(StatFlags::HIDDEN, 0);
    drain_text(&sub);

    let mut h = engine.handle("/big", 0).unwrap();
    let line_value = "x".repeat(4000);
    for i in 0..2000 {
        h.set(&format!("k{i}"), &line_value, 0);
    }
    h.release();

    assert!(sub.has_error());
}

#[test]
fn purge_retains_fallback_backed_mount() {
    let engine = StatsEngine::standalone();
    let mut h = engine.handle("/x", 0).unwrap();
    h.set("fallback", "/y", 0);
    h.release();

    engine.remove_source("/x", 0);
    assert!(engine.source_store().get("/x").is_some(), "source with a fallback child must not be removed");

    let mut h = engine.handle("/x", 0).unwrap();
    h.flush(0);
    h.release();
    engine.remove_source("/x", 0);
    assert!(engine.source_store().get("/x").is_none());
}

#[test]
fn snapshot_filters_by_flags() {
    let engine = StatsEngine::standalone();
    engine.event_flags(None, Some("visible"), Some("1"), StatFlags::PUBLIC, 0);
    engine.event_flags(None, Some("secret"), Some("2"), StatFlags::HIDDEN, 0);

    let mut h = engine.handle("/v", 0).unwrap();
    h.set_flags("server_type", "audio/mpeg", StatFlags::PUBLIC, 0);
    h.release();
    engine.event_flags(Some("/v"), None, None, StatFlags::PUBLIC, 0);

    let mut h = engine.handle("/h", 0).unwrap();
    h.release();
    engine.event_flags(Some("/h"), None, None, StatFlags::HIDDEN, 0);

    let public = stats_core::SnapshotFilter::default();
    let public_xml = engine.snapshot_xml(&public);
    assert!(public_xml.contains("visible"));
    assert!(!public_xml.contains("secret"));

    let admin = stats_core::SnapshotFilter {
        flags: StatFlags::HIDDEN,
        show_mount: None,
    };
    let admin_xml = engine.snapshot_xml(&admin);
    assert!(admin_xml.contains("secret"));
}

#[test]
fn handle_set_release_get_value_round_trip() {
    let engine = StatsEngine::standalone();
    let mut h = engine.handle("/m", 0).unwrap();
    h.set("title", "hello", 0);
    h.release();
    assert_eq!(engine.get_value(Some("/m"), "title"), Some("hello".to_string()));
}

#[test]
fn flush_clears_children_keeps_source() {
    let engine = StatsEngine::standalone();
    let mut h = engine.handle("/m", 0).unwrap();
    h.set("title", "hello", 0);
    h.flush(0);
    h.release();

    assert!(engine.source_store().get("/m").is_some());
    assert_eq!(engine.get_value(Some("/m"), "title"), None);
}

#[test]
fn inc_then_dec_on_fresh_stat_is_zero() {
    let engine = StatsEngine::standalone();
    engine.event_inc(None, "fresh", 0);
    engine.event_dec(None, "fresh", 0);
    assert_eq!(engine.get_value(None, "fresh"), Some("0".to_string()));
}

#[test]
fn retrieve_unknown_stat_is_an_error() {
    let engine = StatsEngine::standalone();
    let h = engine.handle("/m", 0).unwrap();
    assert!(matches!(h.retrieve("title"), Err(stats_core::StatsError::StatNotFound(_))));
}

#[test]
fn handle_rejected_after_shutdown() {
    let engine = StatsEngine::standalone();
    engine.shutdown();
    assert!(matches!(engine.handle("/m", 0), Err(stats_core::StatsError::ShuttingDown)));
}

#[test]
fn hidden_propagates_to_children_on_creation() {
    let engine = StatsEngine::standalone();
    engine.event_flags(Some("/h"), None, None, StatFlags::HIDDEN, 0);
    engine.event(Some("/h"), Some("title"), Some("t"), 0);
    let source: std::sync::Arc<Source> = engine.source_store().get("/h").unwrap();
    let children: BTreeMap<_, _> = source.read().children.iter().map(|(k, v)| (k.clone(), v.flags)).collect();
    assert!(children.get("title").unwrap().contains(StatFlags::HIDDEN));
}
