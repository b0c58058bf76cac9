//! String Pool
//!
//! Deduplicated storage for names, content, and namespace strings.
//! Every string a document references lives in one growable buffer;
//! interning the same bytes twice returns the same id.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Id of an interned string. Id 0 is reserved for "no string".
pub type SymbolId = u32;

/// Reserved id meaning "no string" / empty.
pub const NO_SYMBOL: SymbolId = 0;

#[derive(Debug, Clone, Copy)]
struct Entry {
    offset: u32,
    len: u32,
}

/// Deduplicating string pool backing a parsed document
#[derive(Debug)]
pub struct StringPool {
    /// Entries indexed by string id
    entries: Vec<Entry>,
    /// Byte storage for all interned strings
    data: Vec<u8>,
    /// Hash of string content -> ids with that hash (handles rare collisions)
    hash_index: HashMap<u64, Vec<SymbolId>>,
}

impl StringPool {
    /// Create a new empty string pool
    pub fn new() -> Self {
        let mut pool = StringPool {
            entries: Vec::with_capacity(256),
            data: Vec::with_capacity(4096),
            hash_index: HashMap::new(),
        };
        // Entry 0 is reserved for "no string"
        pool.entries.push(Entry { offset: 0, len: 0 });
        pool
    }

    #[inline]
    fn compute_hash(s: &[u8]) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        let mut hasher = DefaultHasher::new();
        s.hash(&mut hasher);
        hasher.finish()
    }

    /// Intern a byte string, returning its id.
    ///
    /// Empty input maps to the reserved id 0.
    pub fn intern(&mut self, s: &[u8]) -> SymbolId {
        if s.is_empty() {
            return NO_SYMBOL;
        }

        let hash = Self::compute_hash(s);

        if let Some(ids) = self.hash_index.get(&hash) {
            for &id in ids {
                if self.get(id) == s {
                    return id;
                }
            }
        }

        let offset = self.data.len() as u32;
        let len = s.len() as u32;
        self.data.extend_from_slice(s);

        let id = self.entries.len() as SymbolId;
        self.entries.push(Entry { offset, len });
        self.hash_index.entry(hash).or_default().push(id);

        id
    }

    /// Intern a UTF-8 string
    pub fn intern_str(&mut self, s: &str) -> SymbolId {
        self.intern(s.as_bytes())
    }

    /// Get a string by id. Id 0 and unknown ids resolve to the empty string.
    pub fn get(&self, id: SymbolId) -> &[u8] {
        match self.entries.get(id as usize) {
            Some(entry) => {
                let start = entry.offset as usize;
                &self.data[start..start + entry.len as usize]
            }
            None => b"",
        }
    }

    /// Get a string by id as UTF-8, or None for id 0 / invalid UTF-8
    pub fn get_str(&self, id: SymbolId) -> Option<&str> {
        if id == NO_SYMBOL {
            return None;
        }
        std::str::from_utf8(self.get(id)).ok()
    }

    /// Number of interned strings, including the reserved empty entry
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing beyond the reserved entry has been interned
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }
}

impl Default for StringPool {
    fn default() -> Self {
        Self::new()
    }
}
