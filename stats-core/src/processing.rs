//! The node-mutation core shared by global and source-scoped events
//! (`spec.md` §4.1, grounded on `stats.c`'s `modify_node_event` +
//! `process_global_event`/`process_source_stat`).
//!
//! This module knows nothing about locking or broadcasting; [`crate::engine`]
//! and [`crate::handle`] call it while already holding the relevant map's
//! write lock, then decide what (if anything) to send to subscribers based
//! on the returned [`Outcome`].

use std::collections::BTreeMap;

use crate::event::Action;
use crate::flags::StatFlags;
use crate::node::Node;

/// What happened to the node as a result of applying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A `REGULAR` node's `SET` carried the same value already stored; no
    /// wire traffic, no state change (`spec.md` §4.1, §8 invariant).
    Suppressed,
    /// The node was created or its value changed.
    Upserted { value: String, flags: StatFlags },
    /// The node existed and was deleted.
    Removed,
    /// `REMOVE` on a name that was never present.
    NoSuchNode,
}

/// Applies a single-stat event (`Set`/`Inc`/`Dec`/`Add`/`Sub`/`Remove`) to `map`.
///
/// `value` is the event's text operand: for `Set` it's the new value; for
/// `Add`/`Sub` it's the decimal delta; for `Inc`/`Dec` it is the original's
/// pre-seeded scratch buffer (`"1"` / `"0"`) used verbatim when the node
/// doesn't exist yet — preserving the documented quirk that `event_dec` (and,
/// by the same code path, `event_sub`) on a fresh stat creates it from that
/// literal buffer rather than computing arithmetic from a zero baseline
/// (`spec.md` §9 Open Questions).
///
/// `inherited_hidden` is the owning source's current `HIDDEN` bit (always
/// `false` at global scope); a freshly created child inherits it.
pub fn apply(
    map: &mut BTreeMap<String, Node>,
    name: &str,
    value: Option<&str>,
    flags: StatFlags,
    action: Action,
    inherited_hidden: bool,
) -> Outcome {
    debug_assert!(!matches!(action, Action::Hidden));

    if action == Action::Remove {
        return match map.remove(name) {
            Some(_) => Outcome::Removed,
            None => Outcome::NoSuchNode,
        };
    }

    if let Some(node) = map.get_mut(name) {
        match action {
            Action::Set => {
                let new_value = value.unwrap_or("");
                if node.flags.contains(StatFlags::REGULAR) && node.value == new_value {
                    return Outcome::Suppressed;
                }
                node.value = new_value.to_string();
            }
            Action::Inc => node.value = (node.as_i64() + 1).to_string(),
            Action::Dec => node.value = (node.as_i64() - 1).to_string(),
            Action::Add => {
                let delta: i64 = value.and_then(|v| v.trim().parse().ok()).unwrap_or(0);
                node.value = (node.as_i64() + delta).to_string();
            }
            Action::Sub => {
                let delta: i64 = value.and_then(|v| v.trim().parse().ok()).unwrap_or(0);
                node.value = (node.as_i64() - delta).to_string();
            }
            Action::Remove | Action::Hidden => unreachable!(),
        }
        if node.flags.contains(StatFlags::REGULAR) {
            node.last_reported = 0;
        }
        return Outcome::Upserted {
            value: node.value.clone(),
            flags: node.flags,
        };
    }

    // No existing node: create it from the event's value verbatim, matching
    // the original's "adding node" branch, which never applies Inc/Dec/Add/Sub
    // arithmetic to a synthesized baseline.
    let Some(raw_value) = value else {
        return Outcome::NoSuchNode;
    };
    let mut node_flags = flags;
    if inherited_hidden {
        node_flags |= StatFlags::HIDDEN;
    }
    map.insert(name.to_string(), Node::new(name, raw_value, node_flags));
    Outcome::Upserted {
        value: raw_value.to_string(),
        flags: node_flags,
    }
}

/// Applies a `"_flags"`-suffixed event (`event_flags`/`set_flags`): unlike
/// [`apply`], this always replaces the node's flags — creating it if
/// absent — mirroring `modify_node_event`'s `STATS_EVENT_HIDDEN`-tagged
/// branch, which both APIs route through in the original. `value == None`
/// is a flags-only change and is legal on an existing node (not on
/// creation, since a brand new node needs an initial value).
pub fn apply_flags(
    map: &mut BTreeMap<String, Node>,
    name: &str,
    value: Option<&str>,
    flags: StatFlags,
    inherited_hidden: bool,
) -> Outcome {
    if let Some(node) = map.get_mut(name) {
        node.flags = flags;
        let Some(new_value) = value else {
            return Outcome::Upserted {
                value: node.value.clone(),
                flags: node.flags,
            };
        };
        if node.flags.contains(StatFlags::REGULAR) && node.value == new_value {
            return Outcome::Suppressed;
        }
        node.value = new_value.to_string();
        if node.flags.contains(StatFlags::REGULAR) {
            node.last_reported = 0;
        }
        return Outcome::Upserted {
            value: node.value.clone(),
            flags: node.flags,
        };
    }

    let Some(raw_value) = value else {
        return Outcome::NoSuchNode;
    };
    let mut node_flags = flags;
    if inherited_hidden {
        node_flags |= StatFlags::HIDDEN;
    }
    map.insert(name.to_string(), Node::new(name, raw_value, node_flags));
    Outcome::Upserted {
        value: raw_value.to_string(),
        flags: node_flags,
    }
}

/// Pre-formats the text operand for `Inc`/`Dec`/`Add`/`Sub`, the Rust
/// counterpart of the original's scratch `buffer` built before
/// `process_event`. `Sub`'s buffer is the positive magnitude, not its
/// negation — the create-fresh-node path uses it verbatim, so a `SUB` on an
/// absent stat creates it holding the positive amount, matching `event_dec`'s
/// analogous quirk.
pub fn operand_buffer(action: Action, delta: i64) -> String {
    match action {
        Action::Inc => "1".to_string(),
        Action::Dec => "0".to_string(),
        Action::Add => delta.to_string(),
        Action::Sub => delta.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dec_on_fresh_stat_seeds_zero() {
        let mut map = BTreeMap::new();
        let out = apply(&mut map, "x", Some(&operand_buffer(Action::Dec, 0)), StatFlags::empty(), Action::Dec, false);
        assert_eq!(out, Outcome::Upserted { value: "0".into(), flags: StatFlags::empty() });
    }

    #[test]
    fn inc_then_dec_on_fresh_stat_is_zero() {
        let mut map = BTreeMap::new();
        apply(&mut map, "x", Some(&operand_buffer(Action::Inc, 0)), StatFlags::empty(), Action::Inc, false);
        let out = apply(&mut map, "x", None, StatFlags::empty(), Action::Dec, false);
        assert_eq!(out, Outcome::Upserted { value: "0".into(), flags: StatFlags::empty() });
    }

    #[test]
    fn regular_set_same_value_suppressed() {
        let mut map = BTreeMap::new();
        apply(&mut map, "x", Some("5"), StatFlags::REGULAR, Action::Set, false);
        let out = apply(&mut map, "x", Some("5"), StatFlags::REGULAR, Action::Set, false);
        assert_eq!(out, Outcome::Suppressed);
    }

    #[test]
    fn regular_set_changed_value_resets_last_reported() {
        let mut map = BTreeMap::new();
        apply(&mut map, "x", Some("5"), StatFlags::REGULAR, Action::Set, false);
        map.get_mut("x").unwrap().last_reported = 42;
        apply(&mut map, "x", Some("6"), StatFlags::REGULAR, Action::Set, false);
        assert_eq!(map.get("x").unwrap().last_reported, 0);
    }

    #[test]
    fn fresh_child_inherits_hidden() {
        let mut map = BTreeMap::new();
        apply(&mut map, "x", Some("1"), StatFlags::GENERAL, Action::Set, true);
        assert!(map.get("x").unwrap().flags.contains(StatFlags::HIDDEN));
    }
}
