//! Flat document view
//!
//! Read-only traversal over a rehydrated image. The cursors here are
//! thin wrappers around the flat structs; every address they follow was
//! validated during rehydration, so the accessors stay safe without
//! re-checking bounds. The image must never be mutated through this
//! surface; release is dropping the `FlatDocument` as a whole.

use std::ffi::CStr;

use memmap2::MmapMut;

use super::arena::{Arena, Backing};
use super::layout::{RawAttr, RawDoc, RawKind, RawNode, RawNs, Ref};
use crate::dom::NodeKind;
use crate::FlatError;

/// A rehydrated document: the backing image plus traversal access
pub struct FlatDocument {
    backing: Backing,
}

impl FlatDocument {
    pub(crate) fn new(backing: Backing) -> Self {
        FlatDocument { backing }
    }

    /// Load a persisted blob by copying it into a fresh arena
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FlatError> {
        if bytes.is_empty() {
            return Err(FlatError::OutOfBoundsReference { offset: 0, len: 0 });
        }
        super::rehydrate(Arena::from_bytes(bytes)?)
    }

    /// Rehydrate a memory-mapped blob in place. The map must be private
    /// (copy-on-write): rehydration rewrites every reference slot.
    pub fn from_mmap(map: MmapMut) -> Result<Self, FlatError> {
        super::rehydrate(map)
    }

    /// Image size in bytes
    pub fn byte_len(&self) -> usize {
        self.backing.len()
    }

    fn raw(&self) -> &RawDoc {
        unsafe { &*(self.backing.base() as *const RawDoc) }
    }

    /// Document name
    pub fn name(&self) -> Option<&str> {
        unsafe { load_str(self.raw().name) }
    }

    /// XML declaration version
    pub fn version(&self) -> Option<&str> {
        unsafe { load_str(self.raw().version) }
    }

    /// XML declaration encoding
    pub fn encoding(&self) -> Option<&str> {
        unsafe { load_str(self.raw().encoding) }
    }

    /// Source locator
    pub fn url(&self) -> Option<&str> {
        unsafe { load_str(self.raw().url) }
    }

    /// First top-level node
    pub fn first_child(&self) -> Option<NodeRef<'_>> {
        unsafe { load(self.raw().children).map(|raw| NodeRef { raw }) }
    }

    /// Last top-level node
    pub fn last_child(&self) -> Option<NodeRef<'_>> {
        unsafe { load(self.raw().last).map(|raw| NodeRef { raw }) }
    }

    /// First element among the top-level nodes
    pub fn root_element(&self) -> Option<NodeRef<'_>> {
        self.children().find(|n| n.is_element())
    }

    /// Iterate over the top-level nodes
    pub fn children(&self) -> FlatChildIter<'_> {
        FlatChildIter {
            next: self.first_child(),
        }
    }

    /// Superseded namespace declarations, if any
    pub fn old_namespaces(&self) -> FlatNsIter<'_> {
        FlatNsIter {
            next: unsafe { load(self.raw().old_ns).map(|raw| NsRef { raw }) },
        }
    }

    /// Total number of content nodes, attribute value chains included
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack: Vec<NodeRef<'_>> = self.children().collect();
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children());
            for attr in node.attributes() {
                stack.extend(attr.children());
            }
        }
        count
    }
}

impl std::fmt::Debug for FlatDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlatDocument")
            .field("bytes", &self.byte_len())
            .field("root", &self.root_element().and_then(|n| n.name()))
            .finish()
    }
}

/// Cursor over a flat content node
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    raw: &'a RawNode,
}

/// Cursor over a flat attribute
#[derive(Clone, Copy)]
pub struct AttrRef<'a> {
    raw: &'a RawAttr,
}

/// Cursor over a flat namespace declaration
#[derive(Clone, Copy)]
pub struct NsRef<'a> {
    raw: &'a RawNs,
}

/// A node's parent: the document, an element, or the owning attribute
/// (for attribute value text)
pub enum ParentRef<'a> {
    Document,
    Element(NodeRef<'a>),
    Attribute(AttrRef<'a>),
}

impl<'a> NodeRef<'a> {
    /// Node kind; None if the discriminant is not a content-node kind
    pub fn kind(&self) -> Option<NodeKind> {
        self.raw.kind.to_node_kind()
    }

    pub fn is_element(&self) -> bool {
        self.raw.kind == RawKind::ELEMENT
    }

    pub fn is_text(&self) -> bool {
        self.raw.kind == RawKind::TEXT
    }

    /// Element tag name
    pub fn name(&self) -> Option<&'a str> {
        unsafe { load_str(self.raw.name) }
    }

    /// Text payload
    pub fn content(&self) -> Option<&'a str> {
        unsafe { load_str(self.raw.content) }
    }

    pub fn first_child(&self) -> Option<NodeRef<'a>> {
        unsafe { load(self.raw.children).map(|raw| NodeRef { raw }) }
    }

    pub fn last_child(&self) -> Option<NodeRef<'a>> {
        unsafe { load(self.raw.last).map(|raw| NodeRef { raw }) }
    }

    pub fn next_sibling(&self) -> Option<NodeRef<'a>> {
        unsafe { load(self.raw.next).map(|raw| NodeRef { raw }) }
    }

    pub fn prev_sibling(&self) -> Option<NodeRef<'a>> {
        unsafe { load(self.raw.prev).map(|raw| NodeRef { raw }) }
    }

    /// Parent, dispatched on the target's kind discriminant
    pub fn parent(&self) -> Option<ParentRef<'a>> {
        let ptr = self.raw.parent.as_ptr()?;
        unsafe {
            match *(ptr as *const RawKind) {
                RawKind::DOCUMENT => Some(ParentRef::Document),
                RawKind::ATTRIBUTE => Some(ParentRef::Attribute(AttrRef {
                    raw: &*(ptr as *const RawAttr),
                })),
                _ => Some(ParentRef::Element(NodeRef { raw: &*ptr })),
            }
        }
    }

    /// Namespace this node is in
    pub fn namespace(&self) -> Option<NsRef<'a>> {
        unsafe { load(self.raw.ns).map(|raw| NsRef { raw }) }
    }

    /// Namespace declarations defined on this node
    pub fn ns_definitions(&self) -> FlatNsIter<'a> {
        FlatNsIter {
            next: unsafe { load(self.raw.ns_def).map(|raw| NsRef { raw }) },
        }
    }

    /// Iterate over this node's children
    pub fn children(&self) -> FlatChildIter<'a> {
        FlatChildIter {
            next: self.first_child(),
        }
    }

    /// Iterate over this element's attributes
    pub fn attributes(&self) -> FlatAttrIter<'a> {
        FlatAttrIter {
            next: unsafe { load(self.raw.properties).map(|raw| AttrRef { raw }) },
        }
    }

    /// Attribute value by name
    pub fn attribute(&self, name: &str) -> Option<&'a str> {
        self.attributes()
            .find(|a| a.name() == Some(name))
            .and_then(|a| a.value())
    }

    /// Identity comparison (same flat struct)
    pub fn ptr_eq(a: NodeRef<'_>, b: NodeRef<'_>) -> bool {
        std::ptr::eq(a.raw, b.raw)
    }
}

impl<'a> AttrRef<'a> {
    pub fn name(&self) -> Option<&'a str> {
        unsafe { load_str(self.raw.name) }
    }

    /// Attribute value: content of the first node in the value chain
    pub fn value(&self) -> Option<&'a str> {
        self.children().next()?.content()
    }

    /// Iterate over the value content chain
    pub fn children(&self) -> FlatChildIter<'a> {
        FlatChildIter {
            next: unsafe { load(self.raw.children).map(|raw| NodeRef { raw }) },
        }
    }

    pub fn next(&self) -> Option<AttrRef<'a>> {
        unsafe { load(self.raw.next).map(|raw| AttrRef { raw }) }
    }

    pub fn prev(&self) -> Option<AttrRef<'a>> {
        unsafe { load(self.raw.prev).map(|raw| AttrRef { raw }) }
    }

    /// Element carrying this attribute
    pub fn parent(&self) -> Option<NodeRef<'a>> {
        unsafe { load(self.raw.parent).map(|raw| NodeRef { raw }) }
    }

    /// Namespace this attribute is in
    pub fn namespace(&self) -> Option<NsRef<'a>> {
        unsafe { load(self.raw.ns).map(|raw| NsRef { raw }) }
    }
}

impl<'a> NsRef<'a> {
    /// Declared prefix; None for the default namespace
    pub fn prefix(&self) -> Option<&'a str> {
        unsafe { load_str(self.raw.prefix) }
    }

    /// Namespace URI
    pub fn href(&self) -> Option<&'a str> {
        unsafe { load_str(self.raw.href) }
    }

    pub fn next(&self) -> Option<NsRef<'a>> {
        unsafe { load(self.raw.next).map(|raw| NsRef { raw }) }
    }

    /// Identity comparison (same flat struct)
    pub fn ptr_eq(a: NsRef<'_>, b: NsRef<'_>) -> bool {
        std::ptr::eq(a.raw, b.raw)
    }
}

/// Iterator over flat sibling chains
pub struct FlatChildIter<'a> {
    next: Option<NodeRef<'a>>,
}

impl<'a> Iterator for FlatChildIter<'a> {
    type Item = NodeRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.next_sibling();
        Some(current)
    }
}

/// Iterator over flat attribute chains
pub struct FlatAttrIter<'a> {
    next: Option<AttrRef<'a>>,
}

impl<'a> Iterator for FlatAttrIter<'a> {
    type Item = AttrRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.next();
        Some(current)
    }
}

/// Iterator over flat namespace declaration chains
pub struct FlatNsIter<'a> {
    next: Option<NsRef<'a>>,
}

impl<'a> Iterator for FlatNsIter<'a> {
    type Item = NsRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.next();
        Some(current)
    }
}

/// Follow a hydrated slot. Caller guarantees the image was rehydrated,
/// which validated the target's extent.
unsafe fn load<'a, T>(slot: Ref<T>) -> Option<&'a T> {
    slot.as_ptr().map(|p| &*p)
}

/// Read a hydrated string slot. Rehydration verified the terminator is
/// inside the buffer.
unsafe fn load_str<'a>(slot: Ref<u8>) -> Option<&'a str> {
    let ptr = slot.as_ptr()?;
    let bytes = CStr::from_ptr(ptr as *const std::ffi::c_char).to_bytes();
    std::str::from_utf8(bytes).ok()
}
