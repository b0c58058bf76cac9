//! Flatten/Restore Engine
//!
//! Turns a parsed document into one contiguous, position-independent
//! arena image and back:
//!
//! - `size`: exact byte size of the flattened form
//! - `copy`: deep copy into an exact-size arena, back-references patched
//! - `relocate`: absolute addresses -> base-relative offsets
//! - `hydrate`: offsets -> addresses at load time, bounds-validated
//! - `view`: read-only traversal over the rehydrated image
//!
//! The persisted artifact is the raw arena image with no header; the
//! byte count travels out-of-band (in practice, the file length).

pub mod arena;
pub(crate) mod copy;
mod hydrate;
pub(crate) mod layout;
mod relocate;
mod size;
pub mod view;

pub use arena::{Arena, Backing};
pub use layout::NULL_OFFSET;
pub use size::estimate_size;
pub use view::{AttrRef, FlatDocument, NodeRef, NsRef, ParentRef};

use tracing::debug;

use crate::dom::Document;
use crate::FlatError;

/// Flatten a parsed document into a relocatable arena image.
///
/// The returned arena (together with its length) is the unit that gets
/// persisted or transmitted; rehydrate it with [`rehydrate`] after
/// loading it anywhere.
pub fn flatten(doc: &Document) -> Result<Arena, FlatError> {
    let mut arena = copy::duplicate(doc)?;
    relocate::relocate(&mut arena);
    debug!(bytes = arena.len(), "document flattened");
    Ok(arena)
}

/// Rehydrate a loaded image in place and wrap it for traversal.
///
/// Accepts any backing storage (owned arena or private memory map);
/// the image length is taken from the backing itself.
pub fn rehydrate(backing: impl Into<Backing>) -> Result<FlatDocument, FlatError> {
    let mut backing = backing.into();
    hydrate::hydrate(backing.base_mut(), backing.len())?;
    debug!(bytes = backing.len(), "document rehydrated");
    Ok(FlatDocument::new(backing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{NodeId, ParentLink};

    /// Structural equality between a source node and its flat copy:
    /// kind, name, content, attribute names/values, and child topology.
    fn assert_node_matches(doc: &Document, id: NodeId, flat: NodeRef<'_>) {
        let src = doc.node(id);
        assert_eq!(flat.kind(), Some(src.kind));
        assert_eq!(flat.name(), doc.strings.get_str(src.name));
        assert_eq!(flat.content(), doc.strings.get_str(src.content));

        let src_attrs: Vec<_> = doc.attributes(id).collect();
        let flat_attrs: Vec<_> = flat.attributes().collect();
        assert_eq!(src_attrs.len(), flat_attrs.len());
        for (&aid, fattr) in src_attrs.iter().zip(&flat_attrs) {
            let attr = doc.attr(aid);
            assert_eq!(fattr.name(), doc.strings.get_str(attr.name));
            assert_eq!(fattr.value(), doc.attr_value(aid));
        }

        let src_kids: Vec<_> = doc.children(ParentLink::Element(id)).collect();
        let flat_kids: Vec<_> = flat.children().collect();
        assert_eq!(src_kids.len(), flat_kids.len());
        for (&kid, fkid) in src_kids.iter().zip(&flat_kids) {
            assert_node_matches(doc, kid, *fkid);
        }
    }

    fn assert_round_trip(doc: &Document, flat: &FlatDocument) {
        let src_top: Vec<_> = doc.children(ParentLink::Document).collect();
        let flat_top: Vec<_> = flat.children().collect();
        assert_eq!(src_top.len(), flat_top.len());
        for (&id, node) in src_top.iter().zip(&flat_top) {
            assert_node_matches(doc, id, *node);
        }
        assert_eq!(flat.node_count(), doc.node_count());
    }

    fn sample_doc() -> Document {
        let mut doc = Document::new();
        let root = doc.add_element(ParentLink::Document, "a");
        doc.add_attribute(root, "id", b"x");
        doc.add_text(ParentLink::Element(root), b"hi");
        let nested = doc.add_element(ParentLink::Element(root), "b");
        doc.add_text(ParentLink::Element(nested), b"deep");
        doc.add_comment(ParentLink::Element(root), b" note ");
        doc
    }

    #[test]
    fn test_round_trip_at_two_bases() {
        let doc = sample_doc();
        let blob = flatten(&doc).unwrap();

        // Two live arenas guarantee two distinct base addresses
        let first = FlatDocument::from_bytes(blob.as_slice()).unwrap();
        let second = FlatDocument::from_bytes(blob.as_slice()).unwrap();

        assert_round_trip(&doc, &first);
        assert_round_trip(&doc, &second);
    }

    #[test]
    fn test_scenario_parent_resolves_to_root() {
        let doc = sample_doc();
        let blob = flatten(&doc).unwrap();
        let flat = FlatDocument::from_bytes(blob.as_slice()).unwrap();

        let root = flat.root_element().unwrap();
        assert_eq!(root.name(), Some("a"));
        assert_eq!(root.attribute("id"), Some("x"));

        let text = root.children().next().unwrap();
        assert_eq!(text.content(), Some("hi"));
        match text.parent() {
            Some(ParentRef::Element(parent)) => {
                assert!(NodeRef::ptr_eq(parent, root));
            }
            _ => panic!("text child should resolve back to the root element"),
        }

        // Attribute value text resolves to its attribute, and onward to
        // the element
        let attr = root.attributes().next().unwrap();
        let value = attr.children().next().unwrap();
        match value.parent() {
            Some(ParentRef::Attribute(a)) => {
                assert_eq!(a.name(), Some("id"));
                assert!(NodeRef::ptr_eq(a.parent().unwrap(), root));
            }
            _ => panic!("value text should resolve back to its attribute"),
        }
    }

    #[test]
    fn test_shared_namespace_single_copy() {
        let mut doc = Document::new();
        let root = doc.add_element(ParentLink::Document, "root");
        let ns = doc.declare_namespace(root, "svg", "http://www.w3.org/2000/svg");
        let a = doc.add_element(ParentLink::Element(root), "a");
        let b = doc.add_element(ParentLink::Element(root), "b");
        doc.node_mut(a).ns = Some(ns);
        doc.node_mut(b).ns = Some(ns);

        let blob = flatten(&doc).unwrap();
        let flat = FlatDocument::from_bytes(blob.as_slice()).unwrap();

        let froot = flat.root_element().unwrap();
        let kids: Vec<_> = froot.children().collect();
        let ns_a = kids[0].namespace().unwrap();
        let ns_b = kids[1].namespace().unwrap();
        assert!(NsRef::ptr_eq(ns_a, ns_b));
        assert_eq!(ns_a.href(), Some("http://www.w3.org/2000/svg"));

        // And both alias the declaration on the root's definition chain
        let decl = froot.ns_definitions().next().unwrap();
        assert!(NsRef::ptr_eq(decl, ns_a));
    }

    #[test]
    fn test_document_metadata_round_trips() {
        let mut doc = Document::new();
        doc.version = doc.strings.intern_str("1.0");
        doc.encoding = doc.strings.intern_str("UTF-8");
        doc.set_url("files/sample.xml");
        doc.add_element(ParentLink::Document, "root");

        let blob = flatten(&doc).unwrap();
        let flat = FlatDocument::from_bytes(blob.as_slice()).unwrap();
        assert_eq!(flat.version(), Some("1.0"));
        assert_eq!(flat.encoding(), Some("UTF-8"));
        assert_eq!(flat.url(), Some("files/sample.xml"));
        assert_eq!(flat.name(), None);
    }

    #[test]
    fn test_old_namespace_chain_round_trips() {
        let mut doc = Document::new();
        doc.push_old_namespace("legacy", "urn:legacy");
        doc.push_old_namespace("", "urn:default");
        doc.add_element(ParentLink::Document, "root");

        let blob = flatten(&doc).unwrap();
        let flat = FlatDocument::from_bytes(blob.as_slice()).unwrap();
        let old: Vec<_> = flat.old_namespaces().collect();
        assert_eq!(old.len(), 2);
        assert_eq!(old[0].prefix(), Some("legacy"));
        assert_eq!(old[0].href(), Some("urn:legacy"));
        assert_eq!(old[1].prefix(), None);
        assert_eq!(old[1].href(), Some("urn:default"));
    }

    #[test]
    fn test_persisted_blob_reloads_via_mmap() {
        use std::io::Write;

        let doc = sample_doc();
        let blob = flatten(&doc).unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(blob.as_slice()).unwrap();
        file.flush().unwrap();

        let reopened = std::fs::File::open(file.path()).unwrap();
        let map = unsafe { memmap2::MmapOptions::new().map_copy(&reopened) }.unwrap();
        let flat = FlatDocument::from_mmap(map).unwrap();
        assert_round_trip(&doc, &flat);
    }

    #[test]
    fn test_wide_and_deep_round_trip() {
        let mut doc = Document::new();
        let root = doc.add_element(ParentLink::Document, "root");
        let mut cursor = root;
        for _ in 0..64 {
            cursor = doc.add_element(ParentLink::Element(cursor), "nest");
        }
        for i in 0..128 {
            let child = doc.add_element(ParentLink::Element(root), "leaf");
            doc.add_attribute(child, "n", i.to_string().as_bytes());
        }

        let blob = flatten(&doc).unwrap();
        assert_eq!(blob.len(), estimate_size(&doc));
        let flat = FlatDocument::from_bytes(blob.as_slice()).unwrap();
        assert_round_trip(&doc, &flat);
    }
}
