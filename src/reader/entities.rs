//! XML Entity Decoding
//!
//! Handles the built-in entities (&lt; &gt; &amp; &quot; &apos;) and
//! numeric character references (&#123; &#x7B;). Uses Cow for zero-copy
//! when no entities are present.

use memchr::memchr;
use std::borrow::Cow;

/// Decode text content, handling entity references.
///
/// Returns Borrowed if no entities are present (zero-copy).
#[inline]
pub fn decode_text(input: &[u8]) -> Cow<'_, [u8]> {
    if memchr(b'&', input).is_none() {
        return Cow::Borrowed(input);
    }
    Cow::Owned(decode_entities(input))
}

/// Decode all entity references in the input
pub fn decode_entities(input: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(input.len());
    let mut pos = 0;

    while pos < input.len() {
        if let Some(amp_pos) = memchr(b'&', &input[pos..]) {
            // Copy everything before the entity
            result.extend_from_slice(&input[pos..pos + amp_pos]);
            pos += amp_pos;

            if let Some(semi_offset) = memchr(b';', &input[pos..]) {
                let entity = &input[pos + 1..pos + semi_offset];

                if let Some(decoded) = decode_entity(entity) {
                    let mut buf = [0u8; 4];
                    result.extend_from_slice(decoded.encode_utf8(&mut buf).as_bytes());
                    pos += semi_offset + 1;
                } else {
                    // Unknown entity, keep the ampersand as-is
                    result.push(b'&');
                    pos += 1;
                }
            } else {
                // No semicolon found, keep the ampersand
                result.push(b'&');
                pos += 1;
            }
        } else {
            result.extend_from_slice(&input[pos..]);
            break;
        }
    }

    result
}

/// Decode a single entity body (between '&' and ';')
fn decode_entity(entity: &[u8]) -> Option<char> {
    match entity {
        b"lt" => Some('<'),
        b"gt" => Some('>'),
        b"amp" => Some('&'),
        b"quot" => Some('"'),
        b"apos" => Some('\''),
        [b'#', rest @ ..] => decode_numeric_entity(rest),
        _ => None,
    }
}

/// Decode a numeric character reference body (after '#')
fn decode_numeric_entity(body: &[u8]) -> Option<char> {
    let code = match body {
        [b'x' | b'X', hex @ ..] => {
            let s = std::str::from_utf8(hex).ok()?;
            u32::from_str_radix(s, 16).ok()?
        }
        _ => {
            let s = std::str::from_utf8(body).ok()?;
            s.parse::<u32>().ok()?
        }
    };
    char::from_u32(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_entities_is_borrowed() {
        let decoded = decode_text(b"plain text");
        assert!(matches!(decoded, Cow::Borrowed(_)));
        assert_eq!(decoded.as_ref(), b"plain text");
    }

    #[test]
    fn test_builtin_entities() {
        assert_eq!(
            decode_text(b"a &lt; b &amp;&amp; c &gt; d").as_ref(),
            b"a < b && c > d"
        );
        assert_eq!(decode_text(b"&quot;hi&apos;").as_ref(), b"\"hi'");
    }

    #[test]
    fn test_numeric_entities() {
        assert_eq!(decode_text(b"&#65;&#x42;").as_ref(), b"AB");
        assert_eq!(decode_text(b"snowman &#x2603;").as_ref(), "snowman \u{2603}".as_bytes());
    }

    #[test]
    fn test_unknown_entity_kept() {
        assert_eq!(decode_text(b"&unknown; x").as_ref(), b"&unknown; x");
        assert_eq!(decode_text(b"dangling &amp").as_ref(), b"dangling &amp");
    }
}
