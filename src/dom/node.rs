//! Document entities
//!
//! Content nodes, attributes, and namespace declarations are stored in
//! per-kind arenas on the document and reference each other through
//! typed indices. Owning edges (child, next-sibling, next-attribute,
//! next-declaration) form the spanning tree; parent, prev, last, and
//! namespace-in-use links are back-references resolved over it.

use super::strings::{SymbolId, NO_SYMBOL};

/// Index of a content node in the document's node arena
pub type NodeId = u32;

/// Index of an attribute in the document's attribute arena
pub type AttrId = u32;

/// Index of a namespace declaration in the document's namespace arena
pub type NsId = u32;

/// Kind of content node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Element node
    Element,
    /// Text content
    Text,
    /// Comment
    Comment,
}

/// What a node hangs off: the document itself, an element, or the
/// owning attribute (for attribute value text).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentLink {
    Document,
    Element(NodeId),
    Attribute(AttrId),
}

/// Identity of any entity in a document, used as the key for visited
/// sets and the copy map during flattening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityId {
    Doc,
    Node(NodeId),
    Attr(AttrId),
    Ns(NsId),
}

/// A content node (element, text, or comment)
#[derive(Debug, Clone)]
pub struct Node {
    /// Kind of this node
    pub kind: NodeKind,
    /// Element tag name (local part); 0 for text and comments
    pub name: SymbolId,
    /// Text payload; 0 for elements without inline content
    pub content: SymbolId,
    /// Namespace this node is in (back-reference into some ns_def chain)
    pub ns: Option<NsId>,
    /// Head of the namespace declarations defined at this node (owning)
    pub ns_def: Option<NsId>,
    /// Head of the attribute chain (owning)
    pub properties: Option<AttrId>,
    /// First child (owning)
    pub first_child: Option<NodeId>,
    /// Next sibling (owning)
    pub next_sibling: Option<NodeId>,
    /// Last child (back-reference)
    pub last_child: Option<NodeId>,
    /// Parent (back-reference)
    pub parent: Option<ParentLink>,
    /// Previous sibling (back-reference)
    pub prev_sibling: Option<NodeId>,
}

impl Node {
    /// Create an element node
    pub fn element(name: SymbolId, parent: ParentLink) -> Self {
        Node {
            kind: NodeKind::Element,
            name,
            content: NO_SYMBOL,
            ns: None,
            ns_def: None,
            properties: None,
            first_child: None,
            next_sibling: None,
            last_child: None,
            parent: Some(parent),
            prev_sibling: None,
        }
    }

    /// Create a text node
    pub fn text(content: SymbolId, parent: ParentLink) -> Self {
        Node {
            kind: NodeKind::Text,
            name: NO_SYMBOL,
            content,
            ns: None,
            ns_def: None,
            properties: None,
            first_child: None,
            next_sibling: None,
            last_child: None,
            parent: Some(parent),
            prev_sibling: None,
        }
    }

    /// Create a comment node
    pub fn comment(content: SymbolId, parent: ParentLink) -> Self {
        Node {
            kind: NodeKind::Comment,
            ..Node::text(content, parent)
        }
    }

    #[inline]
    pub fn is_element(&self) -> bool {
        self.kind == NodeKind::Element
    }

    #[inline]
    pub fn is_text(&self) -> bool {
        self.kind == NodeKind::Text
    }
}

/// An attribute. Shares the traversal shape of elements: its value is
/// an owning chain of text nodes under `first_child`.
#[derive(Debug, Clone)]
pub struct Attr {
    /// Attribute name (local part)
    pub name: SymbolId,
    /// Namespace this attribute is in (back-reference)
    pub ns: Option<NsId>,
    /// Head of the value content chain (owning)
    pub first_child: Option<NodeId>,
    /// Next attribute on the same element (owning)
    pub next: Option<AttrId>,
    /// Last value node (back-reference)
    pub last_child: Option<NodeId>,
    /// Element carrying this attribute (back-reference)
    pub parent: Option<NodeId>,
    /// Previous attribute (back-reference)
    pub prev: Option<AttrId>,
}

impl Attr {
    pub fn new(name: SymbolId, parent: NodeId) -> Self {
        Attr {
            name,
            ns: None,
            first_child: None,
            next: None,
            last_child: None,
            parent: Some(parent),
            prev: None,
        }
    }
}

/// A namespace declaration (`xmlns` / `xmlns:prefix`). Declared once on
/// some element's `ns_def` chain and referenced from any number of
/// elements and attributes in scope.
#[derive(Debug, Clone)]
pub struct NsDecl {
    /// Declared prefix; 0 for the default namespace
    pub prefix: SymbolId,
    /// Namespace URI
    pub href: SymbolId,
    /// Next declaration in the same chain (owning)
    pub next: Option<NsId>,
}

impl NsDecl {
    pub fn new(prefix: SymbolId, href: SymbolId) -> Self {
        NsDecl {
            prefix,
            href,
            next: None,
        }
    }
}
