//! Arena deep copy
//!
//! Copies a parsed document into one exact-size arena in two phases.
//!
//! Phase one walks the owning edges with an explicit work stack,
//! bump-allocating a flat struct per entity and an inline run per
//! string, and recording every placement in the copy map. The map is
//! consulted before each placement, so an entity reachable twice is
//! placed once and chains that loop back terminate.
//!
//! Phase two resolves the back-references (parent, prev, last, owning
//! document, namespace-in-use) through the copy map. A back-reference
//! whose source target was never placed means the source graph's
//! spanning structure is broken, and the copy is abandoned. Phase two
//! cannot run inside phase one: a back-reference target is not
//! guaranteed placed at the moment the referencing entity is copied.
//!
//! On success the allocation cursor has consumed the estimate exactly.

use std::collections::HashMap;
use std::mem::size_of;
use std::ptr::addr_of_mut;

use super::arena::Arena;
use super::layout::{align_up, RawAttr, RawDoc, RawKind, RawNode, RawNs, Ref};
use super::size::estimate_size;
use crate::dom::{AttrId, Document, EntityId, NodeId, NsId, ParentLink, SymbolId, NO_SYMBOL};
use crate::FlatError;

/// Deep-copy `doc` into a fresh arena of exactly its estimated size
pub(crate) fn duplicate(doc: &Document) -> Result<Arena, FlatError> {
    let capacity = estimate_size(doc);
    let arena = Arena::new_exact(capacity)?;

    let mut dup = Duplicator {
        doc,
        base: arena.base(),
        capacity,
        cursor: 0,
        map: HashMap::new(),
    };
    // The arena is freshly allocated and exclusively ours until return.
    unsafe {
        dup.copy()?;
        dup.patch()?;
    }

    if dup.cursor != capacity {
        return Err(FlatError::SizeMismatch {
            needed: dup.cursor,
            capacity,
        });
    }
    Ok(arena)
}

/// One copy-in-progress: bump cursor plus the source-to-destination map
struct Duplicator<'d> {
    doc: &'d Document,
    base: usize,
    capacity: usize,
    cursor: usize,
    /// Source identity -> destination address
    map: HashMap<EntityId, usize>,
}

/// A pending placement: the source entity and the destination slot that
/// must receive its address once placed.
enum CopyTask {
    Node { src: NodeId, slot: *mut Ref<RawNode> },
    Attr { src: AttrId, slot: *mut Ref<RawAttr> },
    Ns { src: NsId, slot: *mut Ref<RawNs> },
}

impl<'d> Duplicator<'d> {
    /// Bump-allocate an aligned placement, or fail if the estimate is
    /// exceeded (estimator and copier have diverged)
    fn allocate(&mut self, size: usize) -> Result<usize, FlatError> {
        let need = align_up(size);
        if self.capacity - self.cursor < need {
            return Err(FlatError::SizeMismatch {
                needed: self.cursor + need,
                capacity: self.capacity,
            });
        }
        let addr = self.base + self.cursor;
        self.cursor += need;
        Ok(addr)
    }

    /// Copy a string into the arena as a null-terminated inline run
    unsafe fn copy_string(&mut self, id: SymbolId) -> Result<Ref<u8>, FlatError> {
        if id == NO_SYMBOL {
            return Ok(Ref::NULL);
        }
        let bytes = self.doc.strings.get(id);
        let addr = self.allocate(bytes.len() + 1)?;
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), addr as *mut u8, bytes.len());
        *((addr + bytes.len()) as *mut u8) = 0;
        Ok(Ref::from_addr(addr))
    }

    /// Phase one: structural copy along owning edges.
    ///
    /// The arena arrives zeroed, so every slot not written here is
    /// already a hydrated null; phase two fills in the back-references.
    unsafe fn copy(&mut self) -> Result<(), FlatError> {
        let doc = self.doc;

        // The document struct anchors the image at offset 0
        let addr = self.allocate(size_of::<RawDoc>())?;
        self.map.insert(EntityId::Doc, addr);
        let d = addr as *mut RawDoc;
        (*d).kind = RawKind::DOCUMENT;
        (*d).name = self.copy_string(doc.name)?;
        (*d).version = self.copy_string(doc.version)?;
        (*d).encoding = self.copy_string(doc.encoding)?;
        (*d).url = self.copy_string(doc.url)?;

        let mut stack: Vec<CopyTask> = Vec::with_capacity(64);
        if let Some(ns) = doc.old_ns {
            stack.push(CopyTask::Ns {
                src: ns,
                slot: addr_of_mut!((*d).old_ns),
            });
        }
        if let Some(child) = doc.first_child {
            stack.push(CopyTask::Node {
                src: child,
                slot: addr_of_mut!((*d).children),
            });
        }

        while let Some(task) = stack.pop() {
            match task {
                CopyTask::Node { src, slot } => {
                    let key = EntityId::Node(src);
                    if let Some(&dst) = self.map.get(&key) {
                        *slot = Ref::from_addr(dst);
                        continue;
                    }
                    let dst = self.allocate(size_of::<RawNode>())?;
                    self.map.insert(key, dst);
                    *slot = Ref::from_addr(dst);

                    let node = doc.node(src);
                    let n = dst as *mut RawNode;
                    (*n).kind = RawKind::from_node_kind(node.kind);
                    (*n).name = self.copy_string(node.name)?;
                    (*n).content = self.copy_string(node.content)?;

                    if let Some(attr) = node.properties {
                        stack.push(CopyTask::Attr {
                            src: attr,
                            slot: addr_of_mut!((*n).properties),
                        });
                    }
                    if let Some(ns) = node.ns_def {
                        stack.push(CopyTask::Ns {
                            src: ns,
                            slot: addr_of_mut!((*n).ns_def),
                        });
                    }
                    if let Some(child) = node.first_child {
                        stack.push(CopyTask::Node {
                            src: child,
                            slot: addr_of_mut!((*n).children),
                        });
                    }
                    if let Some(next) = node.next_sibling {
                        stack.push(CopyTask::Node {
                            src: next,
                            slot: addr_of_mut!((*n).next),
                        });
                    }
                }

                CopyTask::Attr { src, slot } => {
                    let key = EntityId::Attr(src);
                    if let Some(&dst) = self.map.get(&key) {
                        *slot = Ref::from_addr(dst);
                        continue;
                    }
                    let dst = self.allocate(size_of::<RawAttr>())?;
                    self.map.insert(key, dst);
                    *slot = Ref::from_addr(dst);

                    let attr = doc.attr(src);
                    let a = dst as *mut RawAttr;
                    (*a).kind = RawKind::ATTRIBUTE;
                    (*a).name = self.copy_string(attr.name)?;

                    if let Some(child) = attr.first_child {
                        stack.push(CopyTask::Node {
                            src: child,
                            slot: addr_of_mut!((*a).children),
                        });
                    }
                    if let Some(next) = attr.next {
                        stack.push(CopyTask::Attr {
                            src: next,
                            slot: addr_of_mut!((*a).next),
                        });
                    }
                }

                CopyTask::Ns { src, slot } => {
                    let key = EntityId::Ns(src);
                    if let Some(&dst) = self.map.get(&key) {
                        *slot = Ref::from_addr(dst);
                        continue;
                    }
                    let dst = self.allocate(size_of::<RawNs>())?;
                    self.map.insert(key, dst);
                    *slot = Ref::from_addr(dst);

                    let ns = doc.ns(src);
                    let x = dst as *mut RawNs;
                    (*x).kind = RawKind::NAMESPACE;
                    (*x).prefix = self.copy_string(ns.prefix)?;
                    (*x).href = self.copy_string(ns.href)?;

                    if let Some(next) = ns.next {
                        stack.push(CopyTask::Ns {
                            src: next,
                            slot: addr_of_mut!((*x).next),
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// Phase two: resolve back-references through the copy map.
    ///
    /// The map holds exactly the entities placed in phase one, so it can
    /// be patched in any order.
    unsafe fn patch(&self) -> Result<(), FlatError> {
        let doc = self.doc;
        for (&key, &dst) in &self.map {
            match key {
                EntityId::Doc => {
                    let d = dst as *mut RawDoc;
                    (*d).last = self.lookup_node(doc.last_child, "document.last")?;
                }
                EntityId::Node(id) => {
                    let node = doc.node(id);
                    let n = dst as *mut RawNode;
                    (*n).last = self.lookup_node(node.last_child, "node.last")?;
                    (*n).prev = self.lookup_node(node.prev_sibling, "node.prev")?;
                    (*n).parent = self.lookup_parent(node.parent)?;
                    (*n).doc = Ref::from_addr(self.require(EntityId::Doc, "node.doc")?);
                    (*n).ns = self.lookup_ns(node.ns, "node.ns")?;
                }
                EntityId::Attr(id) => {
                    let attr = doc.attr(id);
                    let a = dst as *mut RawAttr;
                    (*a).last = self.lookup_node(attr.last_child, "attr.last")?;
                    (*a).prev = self.lookup_attr(attr.prev, "attr.prev")?;
                    (*a).parent = self.lookup_node(attr.parent, "attr.parent")?;
                    (*a).doc = Ref::from_addr(self.require(EntityId::Doc, "attr.doc")?);
                    (*a).ns = self.lookup_ns(attr.ns, "attr.ns")?;
                }
                EntityId::Ns(_) => {
                    let x = dst as *mut RawNs;
                    (*x).context = Ref::from_addr(self.require(EntityId::Doc, "ns.context")?);
                }
            }
        }
        Ok(())
    }

    /// Destination address of a source entity that phase one must have
    /// placed; a miss is a broken spanning-structure invariant
    fn require(&self, key: EntityId, field: &'static str) -> Result<usize, FlatError> {
        self.map
            .get(&key)
            .copied()
            .ok_or(FlatError::UnreachableBackReference { field })
    }

    fn lookup_node(
        &self,
        id: Option<NodeId>,
        field: &'static str,
    ) -> Result<Ref<RawNode>, FlatError> {
        match id {
            None => Ok(Ref::NULL),
            Some(id) => Ok(Ref::from_addr(self.require(EntityId::Node(id), field)?)),
        }
    }

    fn lookup_attr(
        &self,
        id: Option<AttrId>,
        field: &'static str,
    ) -> Result<Ref<RawAttr>, FlatError> {
        match id {
            None => Ok(Ref::NULL),
            Some(id) => Ok(Ref::from_addr(self.require(EntityId::Attr(id), field)?)),
        }
    }

    fn lookup_ns(&self, id: Option<NsId>, field: &'static str) -> Result<Ref<RawNs>, FlatError> {
        match id {
            None => Ok(Ref::NULL),
            Some(id) => Ok(Ref::from_addr(self.require(EntityId::Ns(id), field)?)),
        }
    }

    /// Parent slots are kind-dispatched at the target: the stored type
    /// is node, but the address may carry the document or an attribute
    fn lookup_parent(&self, parent: Option<ParentLink>) -> Result<Ref<RawNode>, FlatError> {
        let key = match parent {
            None => return Ok(Ref::NULL),
            Some(ParentLink::Document) => EntityId::Doc,
            Some(ParentLink::Element(id)) => EntityId::Node(id),
            Some(ParentLink::Attribute(id)) => EntityId::Attr(id),
        };
        Ok(Ref::from_addr(self.require(key, "node.parent")?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::ParentLink;

    fn nested_doc(depth: usize, width: usize) -> Document {
        let mut doc = Document::new();
        let mut parent = doc.add_element(ParentLink::Document, "root");
        for _ in 0..depth {
            parent = doc.add_element(ParentLink::Element(parent), "nest");
        }
        for i in 0..width {
            let child = doc.add_element(ParentLink::Element(parent), "leaf");
            doc.add_attribute(child, "n", i.to_string().as_bytes());
        }
        doc
    }

    #[test]
    fn test_space_exactness() {
        // duplicate() itself fails on any cursor/estimate divergence,
        // so success plus a length check covers the property.
        for doc in [
            Document::new(),
            nested_doc(0, 0),
            nested_doc(40, 0),
            nested_doc(0, 40),
            nested_doc(10, 10),
        ] {
            let arena = duplicate(&doc).unwrap();
            assert_eq!(arena.len(), estimate_size(&doc));
        }
    }

    #[test]
    fn test_back_reference_cycles_terminate() {
        // parent/prev links close cycles through every child; the copy
        // must place each entity once regardless.
        let mut doc = Document::new();
        let root = doc.add_element(ParentLink::Document, "root");
        let a = doc.add_element(ParentLink::Element(root), "a");
        doc.add_element(ParentLink::Element(a), "b");
        doc.add_element(ParentLink::Element(root), "c");
        let arena = duplicate(&doc).unwrap();
        assert_eq!(arena.len(), estimate_size(&doc));
    }

    #[test]
    fn test_unreachable_namespace_is_rejected() {
        let mut doc = Document::new();
        let root = doc.add_element(ParentLink::Document, "root");
        let child = doc.add_element(ParentLink::Element(root), "child");
        let ns = doc.declare_namespace(root, "p", "urn:example");
        doc.node_mut(child).ns = Some(ns);

        // Detach the declaration chain: the in-use reference now points
        // outside the spanning structure.
        doc.node_mut(root).ns_def = None;

        match duplicate(&doc) {
            Err(FlatError::UnreachableBackReference { field }) => {
                assert_eq!(field, "node.ns");
            }
            other => panic!("expected UnreachableBackReference, got {other:?}"),
        }
    }

    #[test]
    fn test_document_struct_leads_the_image() {
        let mut doc = Document::new();
        doc.add_element(ParentLink::Document, "root");
        let arena = duplicate(&doc).unwrap();
        let kind = unsafe { *(arena.base() as *const RawKind) };
        assert_eq!(kind, RawKind::DOCUMENT);
    }
}
