use bitflags::bitflags;

bitflags! {
    /// Visibility/behavior bits carried by every [`crate::Node`], [`crate::Source`],
    /// and event, and by a subscriber's subscription mask.
    ///
    /// Flags compose freely; see `spec.md` §3 for the semantics of each bit and
    /// §4.1 for how they interact with fan-out selection.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatFlags: u32 {
        /// Visible to unauthenticated subscribers and public snapshots.
        const PUBLIC = 1 << 0;
        /// Replicated to downstream relay slaves.
        const SLAVE = 1 << 1;
        /// General server identity/info stat.
        const GENERAL = 1 << 2;
        /// A live counter.
        const COUNTERS = 1 << 3;
        /// Periodic broadcast throttled to at most once per ~10s; redundant
        /// same-value writes are suppressed entirely.
        const REGULAR = 1 << 4;
        /// Admin-only: hidden from public listings and non-admin subscribers.
        const HIDDEN = 1 << 5;
    }
}

impl StatFlags {
    /// True iff a subscriber with this mask receives an event carrying `event_flags`.
    ///
    /// An admin subscriber (`HIDDEN` in its mask) sees everything. A non-admin
    /// subscriber never sees a `HIDDEN` event, and otherwise needs at least one
    /// bit in common with the event's non-`HIDDEN` flags.
    pub fn matches_subscriber(event_flags: StatFlags, subscriber_mask: StatFlags) -> bool {
        if subscriber_mask.contains(StatFlags::HIDDEN) {
            return true;
        }
        if event_flags.contains(StatFlags::HIDDEN) {
            return false;
        }
        !(event_flags & subscriber_mask).is_empty()
    }

    /// True iff this mask marks its bearer as an admin subscriber (sees hidden stats).
    pub fn is_admin(self) -> bool {
        self.contains(StatFlags::HIDDEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_sees_everything() {
        let admin = StatFlags::HIDDEN;
        assert!(StatFlags::matches_subscriber(StatFlags::GENERAL, admin));
        assert!(StatFlags::matches_subscriber(StatFlags::HIDDEN, admin));
    }

    #[test]
    fn non_admin_never_sees_hidden() {
        let sub = StatFlags::GENERAL | StatFlags::COUNTERS;
        assert!(!StatFlags::matches_subscriber(StatFlags::HIDDEN | StatFlags::GENERAL, sub));
    }

    #[test]
    fn non_admin_needs_overlap() {
        let sub = StatFlags::SLAVE;
        assert!(!StatFlags::matches_subscriber(StatFlags::GENERAL, sub));
        assert!(StatFlags::matches_subscriber(StatFlags::SLAVE | StatFlags::GENERAL, sub));
    }
}
