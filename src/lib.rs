//! flatxml - parse once, flatten, reload without re-parsing
//!
//! Pipeline:
//! reader -> `Document` (index-arena DOM)
//!        -> `flatten` (exact-size deep copy + relocation)
//!        -> position-independent blob (persist / transmit / mmap)
//!        -> `rehydrate` (bounds-validated pointer restore)
//!        -> `FlatDocument` read-only traversal
//!
//! The blob is the raw arena image, headerless; its byte count travels
//! out-of-band (callers use the file length). Reference slots inside
//! the blob are platform-width offsets with all-ones meaning null.

pub mod dom;
pub mod flat;
pub mod reader;

pub use dom::{Document, NodeKind, ParentLink};
pub use flat::{estimate_size, flatten, rehydrate, Arena, Backing, FlatDocument};

use thiserror::Error;

/// Engine failures. Each aborts the operation in progress; no partial
/// arena or half-hydrated image is ever handed out.
#[derive(Error, Debug)]
pub enum FlatError {
    /// The platform cannot supply the arena allocation
    #[error("cannot allocate a flatten arena of {bytes} bytes")]
    AllocationExhausted { bytes: usize },

    /// Copier and estimator disagree on the layout: the copy would run
    /// past the estimate, or finished short of it
    #[error("arena size mismatch: copy consumed {needed} of {capacity} bytes")]
    SizeMismatch { needed: usize, capacity: usize },

    /// A back-reference targets an entity no owning edge ever reached;
    /// the source graph's spanning structure is broken
    #[error("back-reference {field} targets an entity outside the spanning structure")]
    UnreachableBackReference { field: &'static str },

    /// A loaded image holds an offset outside its own bounds: the blob
    /// is corrupted, truncated, or paired with the wrong byte count
    #[error("offset {offset:#x} outside the {len}-byte image")]
    OutOfBoundsReference { offset: usize, len: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flatten_reload() {
        let doc = Document::parse(
            b"<?xml version=\"1.0\"?>\
              <catalog xmlns:x=\"urn:x\"><x:item id=\"1\">first</x:item>\
              <x:item id=\"2\">second</x:item></catalog>",
        );
        let blob = flatten(&doc).unwrap();
        assert_eq!(blob.len(), estimate_size(&doc));

        let flat = FlatDocument::from_bytes(blob.as_slice()).unwrap();
        assert_eq!(flat.version(), Some("1.0"));

        let root = flat.root_element().unwrap();
        assert_eq!(root.name(), Some("catalog"));
        let items: Vec<_> = root.children().filter(|n| n.is_element()).collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].attribute("id"), Some("1"));
        assert_eq!(items[1].children().next().unwrap().content(), Some("second"));

        // Both items share the declaration from the root
        let ns_a = items[0].namespace().unwrap();
        let ns_b = items[1].namespace().unwrap();
        assert_eq!(ns_a.href(), Some("urn:x"));
        assert!(flat::NsRef::ptr_eq(ns_a, ns_b));
        assert_eq!(flat.node_count(), doc.node_count());
    }
}
