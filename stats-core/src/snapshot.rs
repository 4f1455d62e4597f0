//! XML snapshot serializer (`spec.md` §4.5).
//!
//! Produces the `<icestats>` document consumed by admin pages / XSLT
//! rendering. Built with `quick-xml`'s writer rather than a full DOM, since
//! the tree here is shallow and streamed directly into a `String`.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event as XmlEvent};
use quick_xml::writer::Writer;

use crate::flags::StatFlags;
use crate::ports::ListenerDirectory;
use crate::store::{GlobalStore, SourceStore};

/// Selects which hidden-ness to include and, optionally, a single mount.
#[derive(Debug, Clone, Default)]
pub struct SnapshotFilter {
    /// Include nodes/sources carrying these flags. Passing `StatFlags::HIDDEN`
    /// makes hidden stats and sources visible (an admin snapshot); omitting it
    /// restricts to public ones.
    pub flags: StatFlags,
    pub show_mount: Option<String>,
}

/// Serializes the current global store and source store into an `<icestats>`
/// XML document, filtered by `filter`.
///
/// When `filter.show_mount` names a live source, its listeners are attached
/// via `listeners`. The file-fallback collaborator named in `spec.md` §4.5
/// is intentionally not modeled here: a pseudo-mount with no live `Source`
/// simply produces no `<source>` element, matching "snapshot builders
/// return an empty or partial tree on lookup miss" (`spec.md` §7).
pub fn serialize(global: &GlobalStore, sources: &SourceStore, filter: &SnapshotFilter, listeners: &dyn ListenerDirectory) -> String {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    let root = BytesStart::new("icestats");
    writer.write_event(XmlEvent::Start(root.clone())).expect("write to Vec never fails");

    for node in global.read().values() {
        if node.flags.contains(StatFlags::HIDDEN) && !filter.flags.contains(StatFlags::HIDDEN) {
            continue;
        }
        write_leaf(&mut writer, &node.name, &node.value);
    }

    for source in sources.snapshot() {
        if let Some(mount) = &filter.show_mount {
            if &source.mount != mount {
                continue;
            }
        }
        let hidden = source.is_hidden();
        if hidden && !filter.flags.contains(StatFlags::HIDDEN) {
            continue;
        }

        let mut source_tag = BytesStart::new("source");
        source_tag.push_attribute(("mount", source.mount.as_str()));
        writer.write_event(XmlEvent::Start(source_tag)).unwrap();

        for node in source.snapshot_children() {
            if node.flags.contains(StatFlags::HIDDEN) && !filter.flags.contains(StatFlags::HIDDEN) {
                continue;
            }
            write_leaf(&mut writer, &node.name, &node.value);
        }

        if filter.show_mount.is_some() {
            for listener in listeners.list_listeners(&source.mount) {
                let mut listener_tag = BytesStart::new("listener");
                listener_tag.push_attribute(("id", listener.id.to_string().as_str()));
                writer.write_event(XmlEvent::Start(listener_tag)).unwrap();
                write_leaf(&mut writer, "IP", &listener.ip);
                write_leaf(&mut writer, "Connected", &listener.connected_secs.to_string());
                if let Some(ua) = &listener.user_agent {
                    write_leaf(&mut writer, "UserAgent", ua);
                }
                writer.write_event(XmlEvent::End(BytesEnd::new("listener"))).unwrap();
            }
        }

        writer.write_event(XmlEvent::End(BytesEnd::new("source"))).unwrap();
    }

    writer.write_event(XmlEvent::End(BytesEnd::new("icestats"))).unwrap();
    String::from_utf8(writer.into_inner()).expect("xml writer only emits valid utf-8 given utf-8 inputs")
}

fn write_leaf(writer: &mut Writer<Vec<u8>>, name: &str, value: &str) {
    writer.write_event(XmlEvent::Start(BytesStart::new(name))).unwrap();
    writer.write_event(XmlEvent::Text(BytesText::new(value))).unwrap();
    writer.write_event(XmlEvent::End(BytesEnd::new(name))).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::NullListenerDirectory;
    use crate::Node;

    #[test]
    fn filters_hidden_global_and_source() {
        let global = GlobalStore::new();
        global
            .write()
            .insert("visible".into(), Node::new("visible", "1", StatFlags::PUBLIC));
        global
            .write()
            .insert("secret".into(), Node::new("secret", "2", StatFlags::HIDDEN));

        let sources = SourceStore::new();
        sources.get_or_create("/v", 0).write().flags = StatFlags::PUBLIC;
        sources.get_or_create("/h", 0).write().flags = StatFlags::HIDDEN;

        let public_filter = SnapshotFilter::default();
        let public_xml = serialize(&global, &sources, &public_filter, &NullListenerDirectory);
        assert!(public_xml.contains("visible"));
        assert!(!public_xml.contains("secret"));
        assert!(public_xml.contains("mount=\"/v\""));
        assert!(!public_xml.contains("mount=\"/h\""));

        let admin_filter = SnapshotFilter {
            flags: StatFlags::HIDDEN,
            show_mount: None,
        };
        let admin_xml = serialize(&global, &sources, &admin_filter, &NullListenerDirectory);
        assert!(admin_xml.contains("secret"));
        assert!(admin_xml.contains("mount=\"/h\""));
    }
}
