//! DOM Module - Parsed Document Model
//!
//! Index-arena representation of a parsed XML document:
//! - Per-kind entity arenas (nodes, attributes, namespace declarations)
//! - Typed indices instead of pointers for all links
//! - String interning for names, content, and namespace strings
//!
//! This is the source-side model the flatten engine consumes; the flat
//! image counterpart lives in `crate::flat`.

pub mod document;
pub mod node;
pub mod strings;

pub use document::{AttrIter, ChildIter, Document, NsIter};
pub use node::{Attr, AttrId, EntityId, Node, NodeId, NodeKind, NsDecl, NsId, ParentLink};
pub use strings::{StringPool, SymbolId, NO_SYMBOL};
