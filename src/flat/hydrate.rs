//! Rehydration
//!
//! Converts a loaded blob back into a traversable image: every slot's
//! offset becomes `base + offset`, nulls come back from the sentinel,
//! and no slot is accepted without validation. The blob is untrusted:
//! a truncated file or a byte count the caller got wrong must surface
//! as [`FlatError::OutOfBoundsReference`], never as a wild pointer.
//!
//! Validation per slot: the target's full extent must lie inside the
//! buffer and meet its alignment; string targets must carry their null
//! terminator before the buffer ends.

use std::collections::HashSet;

use memchr::memchr;

use super::layout::{RawAttr, RawDoc, RawNode, RawNs, Ref, NULL_OFFSET};
use crate::FlatError;

/// In-place offset-to-address rewrite of a blob loaded at `base`
pub(crate) fn hydrate(base: usize, len: usize) -> Result<(), FlatError> {
    // The document struct must sit whole at offset 0
    check_extent::<RawDoc>(0, len)?;

    let mut visited: HashSet<usize> = HashSet::new();
    let mut stack: Vec<Slot> = vec![Slot::Doc(0)];

    // Addresses handed out below all passed check_extent first.
    unsafe {
        while let Some(slot) = stack.pop() {
            match slot {
                Slot::Doc(off) => {
                    if !visited.insert(off) {
                        continue;
                    }
                    let d = (base + off) as *mut RawDoc;
                    hydrate_str(&mut (*d).name, base, len)?;
                    hydrate_str(&mut (*d).version, base, len)?;
                    hydrate_str(&mut (*d).encoding, base, len)?;
                    hydrate_str(&mut (*d).url, base, len)?;
                    if let Some(off) = hydrate_ref(&mut (*d).old_ns, base, len)? {
                        stack.push(Slot::Ns(off));
                    }
                    if let Some(off) = hydrate_ref(&mut (*d).children, base, len)? {
                        stack.push(Slot::Node(off));
                    }
                    hydrate_ref(&mut (*d).last, base, len)?;
                }

                Slot::Node(off) => {
                    if !visited.insert(off) {
                        continue;
                    }
                    let n = (base + off) as *mut RawNode;
                    hydrate_str(&mut (*n).name, base, len)?;
                    hydrate_str(&mut (*n).content, base, len)?;
                    hydrate_ref(&mut (*n).ns, base, len)?;
                    if let Some(off) = hydrate_ref(&mut (*n).ns_def, base, len)? {
                        stack.push(Slot::Ns(off));
                    }
                    if let Some(off) = hydrate_ref(&mut (*n).properties, base, len)? {
                        stack.push(Slot::Attr(off));
                    }
                    if let Some(off) = hydrate_ref(&mut (*n).children, base, len)? {
                        stack.push(Slot::Node(off));
                    }
                    if let Some(off) = hydrate_ref(&mut (*n).next, base, len)? {
                        stack.push(Slot::Node(off));
                    }
                    hydrate_ref(&mut (*n).last, base, len)?;
                    hydrate_ref(&mut (*n).parent, base, len)?;
                    hydrate_ref(&mut (*n).prev, base, len)?;
                    hydrate_ref(&mut (*n).doc, base, len)?;
                }

                Slot::Attr(off) => {
                    if !visited.insert(off) {
                        continue;
                    }
                    let a = (base + off) as *mut RawAttr;
                    hydrate_str(&mut (*a).name, base, len)?;
                    hydrate_ref(&mut (*a).ns, base, len)?;
                    if let Some(off) = hydrate_ref(&mut (*a).children, base, len)? {
                        stack.push(Slot::Node(off));
                    }
                    if let Some(off) = hydrate_ref(&mut (*a).next, base, len)? {
                        stack.push(Slot::Attr(off));
                    }
                    hydrate_ref(&mut (*a).last, base, len)?;
                    hydrate_ref(&mut (*a).parent, base, len)?;
                    hydrate_ref(&mut (*a).prev, base, len)?;
                    hydrate_ref(&mut (*a).doc, base, len)?;
                }

                Slot::Ns(off) => {
                    if !visited.insert(off) {
                        continue;
                    }
                    let x = (base + off) as *mut RawNs;
                    hydrate_str(&mut (*x).prefix, base, len)?;
                    hydrate_str(&mut (*x).href, base, len)?;
                    if let Some(off) = hydrate_ref(&mut (*x).next, base, len)? {
                        stack.push(Slot::Ns(off));
                    }
                    hydrate_ref(&mut (*x).context, base, len)?;
                }
            }
        }
    }

    Ok(())
}

/// An entity awaiting conversion, by arena offset
enum Slot {
    Doc(usize),
    Node(usize),
    Attr(usize),
    Ns(usize),
}

/// The target's whole struct must fit in the buffer, aligned
fn check_extent<T>(off: usize, len: usize) -> Result<(), FlatError> {
    let size = std::mem::size_of::<T>();
    if off % std::mem::align_of::<T>() != 0 || off >= len || len - off < size {
        return Err(FlatError::OutOfBoundsReference { offset: off, len });
    }
    Ok(())
}

/// Convert one typed slot, returning the validated offset for owning
/// traversal (None for null)
fn hydrate_ref<T>(slot: &mut Ref<T>, base: usize, len: usize) -> Result<Option<usize>, FlatError> {
    let off = slot.addr();
    if off == NULL_OFFSET {
        slot.set(0);
        return Ok(None);
    }
    check_extent::<T>(off, len)?;
    slot.set(base + off);
    Ok(Some(off))
}

/// Convert one string slot; the run must be null-terminated inside the
/// buffer
fn hydrate_str(slot: &mut Ref<u8>, base: usize, len: usize) -> Result<(), FlatError> {
    let off = slot.addr();
    if off == NULL_OFFSET {
        slot.set(0);
        return Ok(());
    }
    if off >= len {
        return Err(FlatError::OutOfBoundsReference { offset: off, len });
    }
    let tail = unsafe { std::slice::from_raw_parts((base + off) as *const u8, len - off) };
    if memchr(0, tail).is_none() {
        return Err(FlatError::OutOfBoundsReference { offset: off, len });
    }
    slot.set(base + off);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Document, ParentLink};
    use crate::flat::arena::Arena;
    use crate::flat::flatten;
    use std::mem::offset_of;

    fn sample_blob() -> Vec<u8> {
        let mut doc = Document::new();
        let root = doc.add_element(ParentLink::Document, "root");
        doc.add_attribute(root, "id", b"x");
        doc.add_text(ParentLink::Element(root), b"hi");
        flatten(&doc).unwrap().as_slice().to_vec()
    }

    #[test]
    fn test_hydrate_accepts_valid_blob() {
        let blob = sample_blob();
        let arena = Arena::from_bytes(&blob).unwrap();
        hydrate(arena.base(), arena.len()).unwrap();
    }

    #[test]
    fn test_corrupted_offset_is_rejected() {
        let mut blob = sample_blob();
        // Point the document's root-child slot past the buffer end
        let slot = offset_of!(RawDoc, children);
        let bogus = (blob.len() + 128).to_ne_bytes();
        blob[slot..slot + bogus.len()].copy_from_slice(&bogus);

        let arena = Arena::from_bytes(&blob).unwrap();
        match hydrate(arena.base(), arena.len()) {
            Err(FlatError::OutOfBoundsReference { offset, len }) => {
                assert_eq!(offset, blob.len() + 128);
                assert_eq!(len, blob.len());
            }
            other => panic!("expected OutOfBoundsReference, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_blob_is_rejected() {
        let blob = sample_blob();
        let cut = &blob[..blob.len() / 2];
        let arena = Arena::from_bytes(cut).unwrap();
        assert!(matches!(
            hydrate(arena.base(), arena.len()),
            Err(FlatError::OutOfBoundsReference { .. })
        ));
    }

    #[test]
    fn test_undersized_buffer_is_rejected() {
        let arena = Arena::from_bytes(&[0u8; 8]).unwrap();
        assert!(matches!(
            hydrate(arena.base(), arena.len()),
            Err(FlatError::OutOfBoundsReference { .. })
        ));
    }
}
