//! Relocation
//!
//! Rewrites every reference slot of a freshly copied image from an
//! absolute in-process address to a base-relative offset, turning the
//! arena into a position-independent blob. Nulls become the all-ones
//! sentinel; offset zero stays a valid target (the document struct).
//!
//! The walk follows owning edges with a visited set keyed by address,
//! so shared declarations are rewritten once and back-reference cycles
//! terminate. Owning targets are collected before their slots are
//! overwritten.

use std::collections::HashSet;

use super::arena::Arena;
use super::layout::{RawAttr, RawDoc, RawNode, RawNs, Ref, NULL_OFFSET};

/// In-place address-to-offset rewrite of a self-contained image
pub(crate) fn relocate(arena: &mut Arena) {
    let base = arena.base();
    if arena.is_empty() {
        return;
    }

    let mut visited: HashSet<usize> = HashSet::new();
    let mut stack: Vec<Slot> = vec![Slot::Doc(base)];

    // The arena is exclusively borrowed; every address pushed here was
    // placed by the copier inside this same buffer.
    unsafe {
        while let Some(slot) = stack.pop() {
            match slot {
                Slot::Doc(addr) => {
                    if !visited.insert(addr) {
                        continue;
                    }
                    let d = addr as *mut RawDoc;
                    push_ns(&mut stack, (*d).old_ns);
                    push_node(&mut stack, (*d).children);

                    reloc(&mut (*d).name, base);
                    reloc(&mut (*d).version, base);
                    reloc(&mut (*d).encoding, base);
                    reloc(&mut (*d).url, base);
                    reloc(&mut (*d).old_ns, base);
                    reloc(&mut (*d).children, base);
                    reloc(&mut (*d).last, base);
                }

                Slot::Node(addr) => {
                    if !visited.insert(addr) {
                        continue;
                    }
                    let n = addr as *mut RawNode;
                    push_attr(&mut stack, (*n).properties);
                    push_ns(&mut stack, (*n).ns_def);
                    push_node(&mut stack, (*n).children);
                    push_node(&mut stack, (*n).next);

                    reloc(&mut (*n).name, base);
                    reloc(&mut (*n).content, base);
                    reloc(&mut (*n).ns, base);
                    reloc(&mut (*n).ns_def, base);
                    reloc(&mut (*n).properties, base);
                    reloc(&mut (*n).children, base);
                    reloc(&mut (*n).next, base);
                    reloc(&mut (*n).last, base);
                    reloc(&mut (*n).parent, base);
                    reloc(&mut (*n).prev, base);
                    reloc(&mut (*n).doc, base);
                }

                Slot::Attr(addr) => {
                    if !visited.insert(addr) {
                        continue;
                    }
                    let a = addr as *mut RawAttr;
                    push_node(&mut stack, (*a).children);
                    push_attr(&mut stack, (*a).next);

                    reloc(&mut (*a).name, base);
                    reloc(&mut (*a).ns, base);
                    reloc(&mut (*a).children, base);
                    reloc(&mut (*a).next, base);
                    reloc(&mut (*a).last, base);
                    reloc(&mut (*a).parent, base);
                    reloc(&mut (*a).prev, base);
                    reloc(&mut (*a).doc, base);
                }

                Slot::Ns(addr) => {
                    if !visited.insert(addr) {
                        continue;
                    }
                    let x = addr as *mut RawNs;
                    push_ns(&mut stack, (*x).next);

                    reloc(&mut (*x).prefix, base);
                    reloc(&mut (*x).href, base);
                    reloc(&mut (*x).next, base);
                    reloc(&mut (*x).context, base);
                }
            }
        }
    }
}

/// An entity awaiting rewrite, by absolute address
enum Slot {
    Doc(usize),
    Node(usize),
    Attr(usize),
    Ns(usize),
}

/// Two slots aiming at one target produce the same offset; null maps to
/// the sentinel.
#[inline]
fn reloc<T>(slot: &mut Ref<T>, base: usize) {
    let addr = slot.addr();
    slot.set(if addr == 0 { NULL_OFFSET } else { addr - base });
}

fn push_node(stack: &mut Vec<Slot>, slot: Ref<RawNode>) {
    if !slot.is_null() {
        stack.push(Slot::Node(slot.addr()));
    }
}

fn push_attr(stack: &mut Vec<Slot>, slot: Ref<RawAttr>) {
    if !slot.is_null() {
        stack.push(Slot::Attr(slot.addr()));
    }
}

fn push_ns(stack: &mut Vec<Slot>, slot: Ref<RawNs>) {
    if !slot.is_null() {
        stack.push(Slot::Ns(slot.addr()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Document, ParentLink};
    use crate::flat::copy::duplicate;

    #[test]
    fn test_relocated_image_is_position_independent() {
        // Flattening the same document into two live arenas (distinct
        // bases by construction) must yield byte-identical images; any
        // absolute address leaking through would differ between them.
        let mut doc = Document::new();
        let root = doc.add_element(ParentLink::Document, "root");
        doc.add_attribute(root, "id", b"x");
        doc.add_text(ParentLink::Element(root), b"hi");
        let ns = doc.declare_namespace(root, "p", "urn:example");
        doc.node_mut(root).ns = Some(ns);

        let mut first = duplicate(&doc).unwrap();
        relocate(&mut first);
        let mut second = duplicate(&doc).unwrap();
        relocate(&mut second);

        assert_ne!(first.base(), second.base());
        assert_eq!(first.as_slice(), second.as_slice());
    }

    #[test]
    fn test_document_slots_become_offsets() {
        let mut doc = Document::new();
        doc.add_element(ParentLink::Document, "root");
        let mut arena = duplicate(&doc).unwrap();
        relocate(&mut arena);

        let raw = unsafe { &*(arena.base() as *const RawDoc) };
        // No version/encoding were set: sentinel
        assert_eq!(raw.version.addr(), NULL_OFFSET);
        assert_eq!(raw.encoding.addr(), NULL_OFFSET);
        // Root element follows the document struct
        assert!(raw.children.addr() < arena.len());
        // last aliases children for a single child: identical offsets
        assert_eq!(raw.children.addr(), raw.last.addr());
    }
}
