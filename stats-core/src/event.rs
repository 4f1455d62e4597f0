/// The kind of mutation applied to one node (`spec.md` §4.1, grounded on
/// `stats.c`'s `STATS_EVENT_*` enum consumed by `process_event`).
///
/// `source == None` targets the global store; `Some(mount)` targets that
/// source's inner map, implicitly creating the source unless the action is
/// `Remove`. At whole-source scope (no stat name), only `Remove` and
/// `Hidden` apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Set,
    Inc,
    Dec,
    Add,
    Sub,
    Remove,
    /// Toggle a source's `HIDDEN` bit as specified by the event's flags
    /// (only meaningful with no stat name).
    Hidden,
}
