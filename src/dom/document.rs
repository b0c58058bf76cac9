//! Parsed document
//!
//! A `Document` owns three entity arenas (content nodes, attributes,
//! namespace declarations) plus the string pool, and carries the
//! document-level metadata the source had (version, encoding, URL).
//! The builder methods keep sibling/parent links consistent; the reader
//! and the tests both construct documents exclusively through them.

use super::node::{Attr, AttrId, Node, NodeId, NodeKind, NsDecl, NsId, ParentLink};
use super::strings::{StringPool, SymbolId, NO_SYMBOL};

/// An XML document as produced by the reader
#[derive(Debug)]
pub struct Document {
    /// Document name; rarely set for parsed documents
    pub name: SymbolId,
    /// XML declaration version
    pub version: SymbolId,
    /// XML declaration encoding
    pub encoding: SymbolId,
    /// Source locator (file path or URL)
    pub url: SymbolId,
    /// Head of the superseded-namespace chain (owning)
    pub old_ns: Option<NsId>,
    /// First top-level node (owning)
    pub first_child: Option<NodeId>,
    /// Last top-level node (back-reference)
    pub last_child: Option<NodeId>,
    nodes: Vec<Node>,
    attrs: Vec<Attr>,
    namespaces: Vec<NsDecl>,
    /// Interned strings
    pub strings: StringPool,
}

impl Document {
    /// Create an empty document
    pub fn new() -> Self {
        Document {
            name: NO_SYMBOL,
            version: NO_SYMBOL,
            encoding: NO_SYMBOL,
            url: NO_SYMBOL,
            old_ns: None,
            first_child: None,
            last_child: None,
            nodes: Vec::with_capacity(256),
            attrs: Vec::with_capacity(64),
            namespaces: Vec::new(),
            strings: StringPool::new(),
        }
    }

    /// Parse an XML document (lenient; see the `reader` module)
    pub fn parse(input: &[u8]) -> Self {
        crate::reader::parse(input)
    }

    // ------------------------------------------------------------------
    // Builder API
    // ------------------------------------------------------------------

    /// Append a new element under `parent`
    pub fn add_element(&mut self, parent: ParentLink, name: &str) -> NodeId {
        let name = self.strings.intern_str(name);
        let id = self.push_node(Node::element(name, parent));
        self.link_child(parent, id);
        id
    }

    /// Append a new text node under `parent`
    pub fn add_text(&mut self, parent: ParentLink, content: &[u8]) -> NodeId {
        let content = self.strings.intern(content);
        let id = self.push_node(Node::text(content, parent));
        self.link_child(parent, id);
        id
    }

    /// Append a new comment node under `parent`
    pub fn add_comment(&mut self, parent: ParentLink, content: &[u8]) -> NodeId {
        let content = self.strings.intern(content);
        let id = self.push_node(Node::comment(content, parent));
        self.link_child(parent, id);
        id
    }

    /// Append an attribute to an element. A non-empty value becomes a
    /// text node chained under the attribute.
    pub fn add_attribute(&mut self, elem: NodeId, name: &str, value: &[u8]) -> AttrId {
        let name = self.strings.intern_str(name);
        let id = self.attrs.len() as AttrId;
        self.attrs.push(Attr::new(name, elem));

        // Link onto the element's attribute chain
        match self.last_attr(elem) {
            Some(last) => {
                self.attrs[id as usize].prev = Some(last);
                self.attrs[last as usize].next = Some(id);
            }
            None => self.nodes[elem as usize].properties = Some(id),
        }

        if !value.is_empty() {
            self.add_text(ParentLink::Attribute(id), value);
        }
        id
    }

    /// Declare a namespace on an element's definition chain
    pub fn declare_namespace(&mut self, elem: NodeId, prefix: &str, href: &str) -> NsId {
        let prefix = self.strings.intern_str(prefix);
        let href = self.strings.intern_str(href);
        let id = self.push_ns(NsDecl::new(prefix, href));

        let mut cursor = self.nodes[elem as usize].ns_def;
        match cursor {
            None => self.nodes[elem as usize].ns_def = Some(id),
            Some(_) => {
                while let Some(ns) = cursor {
                    match self.namespaces[ns as usize].next {
                        None => {
                            self.namespaces[ns as usize].next = Some(id);
                            break;
                        }
                        next => cursor = next,
                    }
                }
            }
        }
        id
    }

    /// Append a superseded namespace to the document-level chain
    pub fn push_old_namespace(&mut self, prefix: &str, href: &str) -> NsId {
        let prefix = self.strings.intern_str(prefix);
        let href = self.strings.intern_str(href);
        let id = self.push_ns(NsDecl::new(prefix, href));

        let mut cursor = self.old_ns;
        match cursor {
            None => self.old_ns = Some(id),
            Some(_) => {
                while let Some(ns) = cursor {
                    match self.namespaces[ns as usize].next {
                        None => {
                            self.namespaces[ns as usize].next = Some(id);
                            break;
                        }
                        next => cursor = next,
                    }
                }
            }
        }
        id
    }

    /// Set the source locator
    pub fn set_url(&mut self, url: &str) {
        self.url = self.strings.intern_str(url);
    }

    fn push_node(&mut self, node: Node) -> NodeId {
        let id = self.nodes.len() as NodeId;
        self.nodes.push(node);
        id
    }

    fn push_ns(&mut self, ns: NsDecl) -> NsId {
        let id = self.namespaces.len() as NsId;
        self.namespaces.push(ns);
        id
    }

    /// Link a node at the end of its parent's child chain
    fn link_child(&mut self, parent: ParentLink, child: NodeId) {
        let last = match parent {
            ParentLink::Document => self.last_child,
            ParentLink::Element(p) => self.nodes[p as usize].last_child,
            ParentLink::Attribute(a) => self.attrs[a as usize].last_child,
        };

        if let Some(last) = last {
            self.nodes[child as usize].prev_sibling = Some(last);
            self.nodes[last as usize].next_sibling = Some(child);
        } else {
            match parent {
                ParentLink::Document => self.first_child = Some(child),
                ParentLink::Element(p) => self.nodes[p as usize].first_child = Some(child),
                ParentLink::Attribute(a) => self.attrs[a as usize].first_child = Some(child),
            }
        }

        match parent {
            ParentLink::Document => self.last_child = Some(child),
            ParentLink::Element(p) => self.nodes[p as usize].last_child = Some(child),
            ParentLink::Attribute(a) => self.attrs[a as usize].last_child = Some(child),
        }
    }

    fn last_attr(&self, elem: NodeId) -> Option<AttrId> {
        let mut cursor = self.nodes[elem as usize].properties?;
        while let Some(next) = self.attrs[cursor as usize].next {
            cursor = next;
        }
        Some(cursor)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Get a node by id
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id as usize]
    }

    /// Get a mutable node by id
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id as usize]
    }

    /// Get an attribute by id
    pub fn attr(&self, id: AttrId) -> &Attr {
        &self.attrs[id as usize]
    }

    /// Get a mutable attribute by id
    pub fn attr_mut(&mut self, id: AttrId) -> &mut Attr {
        &mut self.attrs[id as usize]
    }

    /// Get a namespace declaration by id
    pub fn ns(&self, id: NsId) -> &NsDecl {
        &self.namespaces[id as usize]
    }

    /// Get a mutable namespace declaration by id
    pub fn ns_mut(&mut self, id: NsId) -> &mut NsDecl {
        &mut self.namespaces[id as usize]
    }

    /// Total number of content nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Total number of attributes
    pub fn attr_count(&self) -> usize {
        self.attrs.len()
    }

    /// Total number of namespace declarations
    pub fn ns_count(&self) -> usize {
        self.namespaces.len()
    }

    /// First element among the document's top-level children
    pub fn root_element(&self) -> Option<NodeId> {
        self.children(ParentLink::Document)
            .find(|&id| self.nodes[id as usize].is_element())
    }

    /// Node name as UTF-8
    pub fn node_name(&self, id: NodeId) -> Option<&str> {
        self.strings.get_str(self.node(id).name)
    }

    /// Text payload of a node as UTF-8
    pub fn text_content(&self, id: NodeId) -> Option<&str> {
        self.strings.get_str(self.node(id).content)
    }

    /// Attribute value: the concatenated content of its value chain
    /// (in practice a single text node)
    pub fn attr_value(&self, id: AttrId) -> Option<&str> {
        let first = self.attr(id).first_child?;
        self.text_content(first)
    }

    /// Iterate over the children of a document, element, or attribute
    pub fn children(&self, parent: ParentLink) -> ChildIter<'_> {
        let first = match parent {
            ParentLink::Document => self.first_child,
            ParentLink::Element(p) => self.nodes[p as usize].first_child,
            ParentLink::Attribute(a) => self.attrs[a as usize].first_child,
        };
        ChildIter { doc: self, next: first }
    }

    /// Iterate over an element's attributes
    pub fn attributes(&self, elem: NodeId) -> AttrIter<'_> {
        AttrIter {
            doc: self,
            next: self.nodes[elem as usize].properties,
        }
    }

    /// Iterate over the namespace declarations defined on an element
    pub fn ns_definitions(&self, elem: NodeId) -> NsIter<'_> {
        NsIter {
            doc: self,
            next: self.nodes[elem as usize].ns_def,
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over sibling chains
pub struct ChildIter<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl<'a> Iterator for ChildIter<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.doc.node(current).next_sibling;
        Some(current)
    }
}

/// Iterator over attribute chains
pub struct AttrIter<'a> {
    doc: &'a Document,
    next: Option<AttrId>,
}

impl<'a> Iterator for AttrIter<'a> {
    type Item = AttrId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.doc.attr(current).next;
        Some(current)
    }
}

/// Iterator over namespace declaration chains
pub struct NsIter<'a> {
    doc: &'a Document,
    next: Option<NsId>,
}

impl<'a> Iterator for NsIter<'a> {
    type Item = NsId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.doc.ns(current).next;
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_simple() {
        let mut doc = Document::new();
        let root = doc.add_element(ParentLink::Document, "root");
        doc.add_text(ParentLink::Element(root), b"hello");

        assert_eq!(doc.root_element(), Some(root));
        assert_eq!(doc.node_name(root), Some("root"));
        let kids: Vec<_> = doc.children(ParentLink::Element(root)).collect();
        assert_eq!(kids.len(), 1);
        assert_eq!(doc.text_content(kids[0]), Some("hello"));
        assert_eq!(doc.node(kids[0]).parent, Some(ParentLink::Element(root)));
    }

    #[test]
    fn test_sibling_links() {
        let mut doc = Document::new();
        let root = doc.add_element(ParentLink::Document, "root");
        let a = doc.add_element(ParentLink::Element(root), "a");
        let b = doc.add_element(ParentLink::Element(root), "b");
        let c = doc.add_element(ParentLink::Element(root), "c");

        assert_eq!(doc.node(root).first_child, Some(a));
        assert_eq!(doc.node(root).last_child, Some(c));
        assert_eq!(doc.node(a).next_sibling, Some(b));
        assert_eq!(doc.node(b).prev_sibling, Some(a));
        assert_eq!(doc.node(b).next_sibling, Some(c));
        assert!(doc.node(a).prev_sibling.is_none());
        assert!(doc.node(c).next_sibling.is_none());
    }

    #[test]
    fn test_attribute_chain() {
        let mut doc = Document::new();
        let root = doc.add_element(ParentLink::Document, "root");
        let id = doc.add_attribute(root, "id", b"x");
        let class = doc.add_attribute(root, "class", b"y");

        let attrs: Vec<_> = doc.attributes(root).collect();
        assert_eq!(attrs, vec![id, class]);
        assert_eq!(doc.attr_value(id), Some("x"));
        assert_eq!(doc.attr(class).prev, Some(id));

        // Value text hangs off the attribute, not the element
        let value = doc.attr(id).first_child.unwrap();
        assert_eq!(doc.node(value).parent, Some(ParentLink::Attribute(id)));
    }

    #[test]
    fn test_namespace_chain() {
        let mut doc = Document::new();
        let root = doc.add_element(ParentLink::Document, "root");
        let svg = doc.declare_namespace(root, "svg", "http://www.w3.org/2000/svg");
        let xlink = doc.declare_namespace(root, "xlink", "http://www.w3.org/1999/xlink");

        let defs: Vec<_> = doc.ns_definitions(root).collect();
        assert_eq!(defs, vec![svg, xlink]);
        assert_eq!(doc.ns(svg).next, Some(xlink));
    }
}
