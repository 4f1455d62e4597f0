//! Outbound collaborator traits.
//!
//! Config parsing, format demuxing, YP, and the HTTP listener are out of
//! scope for this crate (`spec.md` Non-goals), but the snapshot serializer
//! still needs to ask *something* about per-listener detail and file
//! fallback existence. Those collaborators are modeled as trait objects so
//! `stats-core` compiles and tests standalone; `stats-server` is free to
//! wire a real connection table in, or fall back to the `Null*` stand-ins
//! below.

/// One connected listener, as reported by an external listener directory.
#[derive(Debug, Clone)]
pub struct ListenerInfo {
    pub id: u64,
    pub ip: String,
    pub user_agent: Option<String>,
    pub connected_secs: i64,
}

/// Reports whether a mount has a live file-fallback behind it.
///
/// Grounded on `fserve_contains(mount)` in `spec.md` §4.7/§6.
pub trait FallbackDirectory: Send + Sync {
    fn contains(&self, mount: &str) -> bool;
}

/// Enumerates the listeners currently attached to a mount, for snapshot enrichment.
///
/// Grounded on `admin_source_listeners(source, xmlnode)` in `spec.md` §6.
pub trait ListenerDirectory: Send + Sync {
    fn list_listeners(&self, mount: &str) -> Vec<ListenerInfo>;
}

/// Reports the three connection-subsystem counters `global_calc` refreshes
/// into the global store each tick (`spec.md` §4.7). Out of scope here
/// (connection acceptance lives in the HTTP/relay layer), so this is a seam:
/// `stats-server` wires a real counter source; [`NullConnectionCounters`]
/// leaves the existing stat values untouched.
pub trait ConnectionCounters: Send + Sync {
    fn clients(&self) -> Option<i64>;
    fn listeners(&self) -> Option<i64>;
    fn outgoing_kbitrate(&self) -> Option<i64>;
}

/// Default `FallbackDirectory` that never reports a fallback.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullFallbackDirectory;

impl FallbackDirectory for NullFallbackDirectory {
    fn contains(&self, _mount: &str) -> bool {
        false
    }
}

/// Default `ConnectionCounters` that reports nothing, leaving `global_calc`'s
/// refresh of `clients`/`listeners`/`outgoing_kbitrate` a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullConnectionCounters;

impl ConnectionCounters for NullConnectionCounters {
    fn clients(&self) -> Option<i64> {
        None
    }

    fn listeners(&self) -> Option<i64> {
        None
    }

    fn outgoing_kbitrate(&self) -> Option<i64> {
        None
    }
}

/// Default `ListenerDirectory` that never has listeners to report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullListenerDirectory;

impl ListenerDirectory for NullListenerDirectory {
    fn list_listeners(&self, _mount: &str) -> Vec<ListenerInfo> {
        Vec::new()
    }
}
