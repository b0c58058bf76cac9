//! Size estimation
//!
//! Computes the exact number of bytes a flattened document occupies:
//! one max-aligned struct per entity plus a max-aligned, null-terminated
//! run per owned string. The walk follows owning edges only and visits
//! every entity exactly once, so shared namespace declarations are
//! counted once and back-reference cycles cannot diverge. The copier
//! allocates precisely this many bytes and fills all of them.

use std::collections::HashSet;

use tracing::debug;

use super::layout::{align_up, RawAttr, RawDoc, RawNode, RawNs};
use crate::dom::{Document, EntityId, SymbolId, NO_SYMBOL};

/// Exact byte size of the flattened form of `doc`
pub fn estimate_size(doc: &Document) -> usize {
    let mut estimator = Estimator {
        doc,
        seen: HashSet::new(),
        stack: Vec::with_capacity(64),
        total: 0,
    };
    estimator.run();
    debug!(bytes = estimator.total, "estimated flattened document size");
    estimator.total
}

struct Estimator<'d> {
    doc: &'d Document,
    seen: HashSet<EntityId>,
    stack: Vec<EntityId>,
    total: usize,
}

impl<'d> Estimator<'d> {
    fn run(&mut self) {
        self.stack.push(EntityId::Doc);

        while let Some(entity) = self.stack.pop() {
            if !self.seen.insert(entity) {
                continue;
            }
            match entity {
                EntityId::Doc => self.visit_doc(),
                EntityId::Node(id) => self.visit_node(id),
                EntityId::Attr(id) => self.visit_attr(id),
                EntityId::Ns(id) => self.visit_ns(id),
            }
        }
    }

    fn visit_doc(&mut self) {
        let doc = self.doc;
        self.total += align_up(std::mem::size_of::<RawDoc>());
        self.total += self.string_size(doc.name);
        self.total += self.string_size(doc.version);
        self.total += self.string_size(doc.encoding);
        self.total += self.string_size(doc.url);

        if let Some(ns) = doc.old_ns {
            self.stack.push(EntityId::Ns(ns));
        }
        if let Some(child) = doc.first_child {
            self.stack.push(EntityId::Node(child));
        }
    }

    fn visit_node(&mut self, id: crate::dom::NodeId) {
        let node = self.doc.node(id);
        self.total += align_up(std::mem::size_of::<RawNode>());
        self.total += self.string_size(node.name);
        self.total += self.string_size(node.content);

        if let Some(attr) = node.properties {
            self.stack.push(EntityId::Attr(attr));
        }
        if let Some(ns) = node.ns_def {
            self.stack.push(EntityId::Ns(ns));
        }
        if let Some(child) = node.first_child {
            self.stack.push(EntityId::Node(child));
        }
        if let Some(next) = node.next_sibling {
            self.stack.push(EntityId::Node(next));
        }
    }

    fn visit_attr(&mut self, id: crate::dom::AttrId) {
        let attr = self.doc.attr(id);
        self.total += align_up(std::mem::size_of::<RawAttr>());
        self.total += self.string_size(attr.name);

        if let Some(child) = attr.first_child {
            self.stack.push(EntityId::Node(child));
        }
        if let Some(next) = attr.next {
            self.stack.push(EntityId::Attr(next));
        }
    }

    fn visit_ns(&mut self, id: crate::dom::NsId) {
        let ns = self.doc.ns(id);
        self.total += align_up(std::mem::size_of::<RawNs>());
        self.total += self.string_size(ns.prefix);
        self.total += self.string_size(ns.href);

        if let Some(next) = ns.next {
            self.stack.push(EntityId::Ns(next));
        }
    }

    /// Aligned size of a string's inline run, terminator included
    fn string_size(&self, id: SymbolId) -> usize {
        if id == NO_SYMBOL {
            0
        } else {
            align_up(self.doc.strings.get(id).len() + 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::ParentLink;

    #[test]
    fn test_empty_document() {
        let doc = Document::new();
        assert_eq!(estimate_size(&doc), align_up(std::mem::size_of::<RawDoc>()));
    }

    #[test]
    fn test_concrete_scenario() {
        // <a id="x">hi</a>: doc + element + attribute + attribute value
        // text + child text, plus the four string payloads
        let mut doc = Document::new();
        let root = doc.add_element(ParentLink::Document, "a");
        doc.add_attribute(root, "id", b"x");
        doc.add_text(ParentLink::Element(root), b"hi");

        let expected = align_up(std::mem::size_of::<RawDoc>())
            + align_up(std::mem::size_of::<RawNode>()) * 3
            + align_up(std::mem::size_of::<RawAttr>())
            + align_up(b"a\0".len())
            + align_up(b"id\0".len())
            + align_up(b"x\0".len())
            + align_up(b"hi\0".len());
        assert_eq!(estimate_size(&doc), expected);
    }

    #[test]
    fn test_idempotent() {
        let mut doc = Document::new();
        let root = doc.add_element(ParentLink::Document, "root");
        for i in 0..10 {
            let child = doc.add_element(ParentLink::Element(root), "item");
            doc.add_attribute(child, "n", i.to_string().as_bytes());
        }
        assert_eq!(estimate_size(&doc), estimate_size(&doc));
    }

    #[test]
    fn test_shared_namespace_counted_once() {
        let mut doc = Document::new();
        let root = doc.add_element(ParentLink::Document, "root");
        let base = estimate_size(&doc);

        let ns = doc.declare_namespace(root, "svg", "http://www.w3.org/2000/svg");
        let with_ns = estimate_size(&doc);
        assert_eq!(
            with_ns - base,
            align_up(std::mem::size_of::<RawNs>())
                + align_up(b"svg\0".len())
                + align_up(b"http://www.w3.org/2000/svg\0".len())
        );

        // Referencing the declaration from two children adds nothing:
        // namespace-in-use is a back-reference, not an owned copy.
        let a = doc.add_element(ParentLink::Element(root), "a");
        let b = doc.add_element(ParentLink::Element(root), "b");
        let plain = estimate_size(&doc);
        doc.node_mut(a).ns = Some(ns);
        doc.node_mut(b).ns = Some(ns);
        assert_eq!(estimate_size(&doc), plain);
    }
}
