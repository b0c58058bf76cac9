//! XML Reader
//!
//! Lenient single-pass reader that builds a `Document` directly from a
//! byte slice: memchr-driven markup scanning, entity decoding, and
//! scope-stacked namespace resolution. Malformed input never fails the
//! parse: stray end tags are ignored, unclosed elements are closed by
//! the nearest matching ancestor, unresolvable prefixes keep their
//! qualified name and stay namespace-less.

pub mod entities;

use memchr::{memchr, memmem};
use std::borrow::Cow;
use tracing::trace;

use crate::dom::{Document, NodeId, NsId, ParentLink, SymbolId, NO_SYMBOL};
use self::entities::decode_text;

/// Parse an XML document (lenient mode, never fails)
pub fn parse(input: &[u8]) -> Document {
    let mut reader = Reader {
        input,
        pos: 0,
        doc: Document::new(),
        stack: Vec::with_capacity(16),
        scopes: Vec::with_capacity(16),
    };
    reader.run();
    reader.doc
}

struct Reader<'a> {
    input: &'a [u8],
    pos: usize,
    doc: Document,
    /// Open element stack
    stack: Vec<NodeId>,
    /// One namespace frame per open element: (prefix symbol, declaration)
    scopes: Vec<Vec<(SymbolId, NsId)>>,
}

impl<'a> Reader<'a> {
    fn run(&mut self) {
        while self.pos < self.input.len() {
            match memchr(b'<', &self.input[self.pos..]) {
                None => {
                    self.text(self.pos, self.input.len());
                    self.pos = self.input.len();
                }
                Some(rel) => {
                    let lt = self.pos + rel;
                    if lt > self.pos {
                        self.text(self.pos, lt);
                    }
                    self.pos = lt;
                    self.markup();
                }
            }
        }
    }

    fn parent(&self) -> ParentLink {
        match self.stack.last() {
            Some(&id) => ParentLink::Element(id),
            None => ParentLink::Document,
        }
    }

    fn text(&mut self, start: usize, end: usize) {
        let input = self.input;
        let decoded = decode_text(&input[start..end]);
        // Inter-markup whitespace at document level carries nothing
        if self.stack.is_empty() && decoded.iter().all(|b| b.is_ascii_whitespace()) {
            return;
        }
        let parent = self.parent();
        self.doc.add_text(parent, &decoded);
    }

    fn markup(&mut self) {
        let input = self.input;
        let rest = &input[self.pos..];
        if rest.starts_with(b"</") {
            self.end_tag();
        } else if rest.starts_with(b"<!--") {
            self.comment();
        } else if rest.starts_with(b"<![CDATA[") {
            self.cdata();
        } else if rest.starts_with(b"<!") {
            self.skip_declaration();
        } else if rest.starts_with(b"<?") {
            self.processing_instruction();
        } else {
            self.start_tag();
        }
    }

    fn comment(&mut self) {
        let input = self.input;
        let body_start = self.pos + 4;
        match memmem::find(&input[body_start..], b"-->") {
            Some(rel) => {
                let parent = self.parent();
                self.doc.add_comment(parent, &input[body_start..body_start + rel]);
                self.pos = body_start + rel + 3;
            }
            None => self.pos = input.len(),
        }
    }

    fn cdata(&mut self) {
        let input = self.input;
        let body_start = self.pos + 9;
        match memmem::find(&input[body_start..], b"]]>") {
            Some(rel) => {
                // CDATA content is literal: no entity decoding
                let parent = self.parent();
                self.doc.add_text(parent, &input[body_start..body_start + rel]);
                self.pos = body_start + rel + 3;
            }
            None => self.pos = input.len(),
        }
    }

    /// Skip `<!...>` declarations, tracking the DOCTYPE internal subset
    fn skip_declaration(&mut self) {
        let input = self.input;
        let mut depth = 0usize;
        let mut i = self.pos + 2;
        while i < input.len() {
            match input[i] {
                b'[' => depth += 1,
                b']' => depth = depth.saturating_sub(1),
                b'>' if depth == 0 => {
                    trace!("skipping markup declaration");
                    self.pos = i + 1;
                    return;
                }
                _ => {}
            }
            i += 1;
        }
        self.pos = input.len();
    }

    fn processing_instruction(&mut self) {
        let input = self.input;
        let end = memmem::find(&input[self.pos..], b"?>").map(|rel| self.pos + rel);
        let body = &input[self.pos + 2..end.unwrap_or(input.len())];

        // The XML declaration carries document metadata
        let is_decl = body.starts_with(b"xml")
            && body.get(3).map_or(true, |b| b.is_ascii_whitespace());
        if is_decl {
            for (name, value) in parse_attributes(&body[3..]) {
                if name == b"version" {
                    let sym = self.doc.strings.intern(&value);
                    self.doc.version = sym;
                } else if name == b"encoding" {
                    let sym = self.doc.strings.intern(&value);
                    self.doc.encoding = sym;
                }
            }
        } else {
            trace!("skipping processing instruction");
        }

        self.pos = match end {
            Some(e) => e + 2,
            None => input.len(),
        };
    }

    fn start_tag(&mut self) {
        let input = self.input;
        let Some(gt) = find_tag_end(input, self.pos + 1) else {
            self.pos = input.len();
            return;
        };
        let self_closing = gt > self.pos + 1 && input[gt - 1] == b'/';
        let inner = &input[self.pos + 1..if self_closing { gt - 1 } else { gt }];
        self.pos = gt + 1;

        let name_end = inner
            .iter()
            .position(|b| b.is_ascii_whitespace())
            .unwrap_or(inner.len());
        let qname = &inner[..name_end];
        if qname.is_empty() {
            return;
        }
        let attrs = parse_attributes(&inner[name_end..]);

        let parent = self.parent();
        let (prefix, local) = split_qname(qname);
        let elem = self.doc.add_element(parent, &lossy(local));

        // Namespace declarations first: they scope this very element
        let mut frame: Vec<(SymbolId, NsId)> = Vec::new();
        for &(name, ref value) in &attrs {
            if name == b"xmlns" {
                let ns = self.doc.declare_namespace(elem, "", &lossy(value));
                frame.push((NO_SYMBOL, ns));
            } else if let Some(p) = name.strip_prefix(b"xmlns:") {
                let ns = self.doc.declare_namespace(elem, &lossy(p), &lossy(value));
                let sym = self.doc.strings.intern(p);
                frame.push((sym, ns));
            }
        }

        // Resolve the element's namespace; an unresolvable prefix keeps
        // the qualified name instead
        let elem_ns = match prefix {
            Some(p) => {
                let sym = self.doc.strings.intern(p);
                self.resolve(sym, &frame)
            }
            None => self.resolve(NO_SYMBOL, &frame),
        };
        match (elem_ns, prefix) {
            (Some(ns), _) => self.doc.node_mut(elem).ns = Some(ns),
            (None, Some(_)) => {
                let full = self.doc.strings.intern(qname);
                self.doc.node_mut(elem).name = full;
            }
            (None, None) => {}
        }

        for &(name, ref value) in &attrs {
            if name == b"xmlns" || name.starts_with(b"xmlns:") {
                continue;
            }
            // The default namespace does not apply to attributes
            let (aprefix, alocal) = split_qname(name);
            let ans = match aprefix {
                Some(p) => {
                    let sym = self.doc.strings.intern(p);
                    self.resolve(sym, &frame)
                }
                None => None,
            };
            let stored = if ans.is_none() && aprefix.is_some() {
                name
            } else {
                alocal
            };
            let aid = self.doc.add_attribute(elem, &lossy(stored), value);
            if let Some(ns) = ans {
                self.doc.attr_mut(aid).ns = Some(ns);
            }
        }

        if !self_closing {
            self.stack.push(elem);
            self.scopes.push(frame);
        }
    }

    fn end_tag(&mut self) {
        let input = self.input;
        let Some(gt) = memchr(b'>', &input[self.pos..]).map(|rel| self.pos + rel) else {
            self.pos = input.len();
            return;
        };
        let qname = trim_ascii(&input[self.pos + 2..gt]);
        self.pos = gt + 1;
        let (_, local) = split_qname(qname);

        // Close the nearest open element with a matching name; anything
        // opened inside it is closed along with it. A stray end tag is
        // ignored.
        let mut found = None;
        for (i, &id) in self.stack.iter().enumerate().rev() {
            let stored = self.doc.strings.get(self.doc.node(id).name);
            if stored == local || stored == qname {
                found = Some(i);
                break;
            }
        }
        if let Some(i) = found {
            self.stack.truncate(i);
            self.scopes.truncate(i);
        }
    }

    /// Look a prefix up in the current frame and the enclosing scopes,
    /// innermost first
    fn resolve(&self, prefix: SymbolId, frame: &[(SymbolId, NsId)]) -> Option<NsId> {
        for &(p, ns) in frame.iter().rev() {
            if p == prefix {
                return Some(ns);
            }
        }
        for scope in self.scopes.iter().rev() {
            for &(p, ns) in scope.iter().rev() {
                if p == prefix {
                    return Some(ns);
                }
            }
        }
        None
    }
}

/// Find the closing '>' of a tag, honoring quoted attribute values
fn find_tag_end(input: &[u8], from: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (i, &b) in input.iter().enumerate().skip(from) {
        match b {
            b'"' | b'\'' => match quote {
                None => quote = Some(b),
                Some(q) if q == b => quote = None,
                _ => {}
            },
            b'>' if quote.is_none() => return Some(i),
            _ => {}
        }
    }
    None
}

/// Parse the attribute region of a tag into (name, decoded value) pairs
fn parse_attributes(bytes: &[u8]) -> Vec<(&[u8], Vec<u8>)> {
    let mut attrs = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }

        let name_start = i;
        while i < bytes.len()
            && !bytes[i].is_ascii_whitespace()
            && bytes[i] != b'='
            && bytes[i] != b'/'
        {
            i += 1;
        }
        let name = &bytes[name_start..i];
        if name.is_empty() {
            i += 1;
            continue;
        }

        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        let value = if i < bytes.len() && bytes[i] == b'=' {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i < bytes.len() && (bytes[i] == b'"' || bytes[i] == b'\'') {
                let q = bytes[i];
                i += 1;
                match memchr(q, &bytes[i..]) {
                    Some(rel) => {
                        let v = decode_text(&bytes[i..i + rel]).into_owned();
                        i += rel + 1;
                        v
                    }
                    None => {
                        let v = decode_text(&bytes[i..]).into_owned();
                        i = bytes.len();
                        v
                    }
                }
            } else {
                // Unquoted value, read to the next whitespace
                let start = i;
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                decode_text(&bytes[start..i]).into_owned()
            }
        } else {
            Vec::new()
        };

        attrs.push((name, value));
    }

    attrs
}

/// Split `prefix:local`; a leading or trailing colon is no prefix
fn split_qname(qname: &[u8]) -> (Option<&[u8]>, &[u8]) {
    match memchr(b':', qname) {
        Some(i) if i > 0 && i + 1 < qname.len() => (Some(&qname[..i]), &qname[i + 1..]),
        _ => (None, qname),
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |e| e + 1);
    &bytes[start..end]
}

fn lossy(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}
