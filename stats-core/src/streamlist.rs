//! Plain-text streamlist serializer (`spec.md` §4.5), one visible mount per
//! line, for relay slaves enumerating what to pull.

use crate::store::SourceStore;

/// Builds the streamlist body. `prefix`, when given, is prepended to each
/// mount (the original's `/admin/streams?mount=` convention); hidden
/// sources are never listed.
pub fn build(sources: &SourceStore, prefix: Option<&str>) -> String {
    let mut out = String::new();
    for source in sources.snapshot() {
        if source.is_hidden() {
            continue;
        }
        if let Some(prefix) = prefix {
            out.push_str(prefix);
        }
        out.push_str(&source.mount);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::StatFlags;

    #[test]
    fn hidden_sources_are_skipped() {
        let sources = SourceStore::new();
        // Sources default to HIDDEN on creation; /a is announced, /b is left alone.
        sources.get_or_create("/a", 0).write().flags = StatFlags::PUBLIC;
        sources.get_or_create("/b", 0);

        let listing = build(&sources, None);
        assert!(listing.contains("/a\n"));
        assert!(!listing.contains("/b"));
    }

    #[test]
    fn prefix_is_applied_per_line() {
        let sources = SourceStore::new();
        sources.get_or_create("/a", 0).write().flags = StatFlags::PUBLIC;
        let listing = build(&sources, Some("/admin/streams?mount="));
        assert_eq!(listing, "/admin/streams?mount=/a\n");
    }
}
