use std::borrow::Cow;

use crate::filter::unescape;
use crate::result::{LdapError, Result};

/// Escape a filter literal.
///
/// Literal values appearing in an LDAP filter can contain any byte, but
/// parentheses, the asterisk, the backslash and NUL must be written as hex
/// escapes in the string representation. The return value is not allocated
/// unless something actually needs escaping.
pub fn ldap_escape<'a, S: Into<Cow<'a, str>>>(lit: S) -> Cow<'a, str> {
    #[inline]
    fn needs_escape(c: u8) -> bool {
        c == b'\\' || c == b'*' || c == b'(' || c == b')' || c == 0
    }

    escape_with(lit.into(), needs_escape, |_, _| false)
}

/// Escape an attribute value in a relative distinguished name (RDN), per
/// the rules of RFC 4514. Leading spaces and `#`, trailing spaces, and the
/// special characters are hex-escaped; the return value is not allocated
/// unless something actually needs escaping.
pub fn dn_escape<'a, S: Into<Cow<'a, str>>>(val: S) -> Cow<'a, str> {
    #[inline]
    fn always_escape(c: u8) -> bool {
        matches!(
            c,
            b'"' | b'+' | b',' | b';' | b'<' | b'=' | b'>' | b'\\' | 0
        )
    }

    #[inline]
    fn positional(pos: Position, c: u8) -> bool {
        match pos {
            Position::Leading => c == b' ' || c == b'#',
            Position::Trailing => c == b' ',
            Position::Inner => false,
        }
    }

    escape_with(val.into(), always_escape, positional)
}

#[derive(Clone, Copy, PartialEq)]
enum Position {
    Leading,
    Inner,
    Trailing,
}

fn escape_with(
    val: Cow<str>,
    always: fn(u8) -> bool,
    positional: fn(Position, u8) -> bool,
) -> Cow<str> {
    #[inline]
    fn xdigit(c: u8) -> u8 {
        c + if c < 10 { b'0' } else { b'a' - 10 }
    }

    let mut output: Option<Vec<u8>> = None;
    for (i, &c) in val.as_bytes().iter().enumerate() {
        let pos = if i == 0 {
            Position::Leading
        } else if i + 1 == val.len() {
            Position::Trailing
        } else {
            Position::Inner
        };
        if always(c) || positional(pos, c) {
            let output = output.get_or_insert_with(|| {
                let mut out = Vec::with_capacity(val.len() + 12);
                out.extend(val[..i].as_bytes());
                out
            });
            output.push(b'\\');
            output.push(xdigit(c >> 4));
            output.push(xdigit(c & 0xF));
        } else if let Some(ref mut output) = output {
            output.push(c);
        }
    }
    match output {
        Some(output) => Cow::Owned(String::from_utf8(output).expect("escaped string")),
        None => val,
    }
}

/// Resolve LDAP filter hex escapes in a string.
///
/// The result must be valid UTF-8, otherwise an error is returned.
pub fn ldap_unescape<'a, S: Into<Cow<'a, str>>>(val: S) -> Result<Cow<'a, str>> {
    let val = val.into();
    if !val.contains('\\') {
        return Ok(val);
    }
    let raw = unescape(val.as_bytes()).map_err(|_| LdapError::FilterCompile)?;
    String::from_utf8(raw)
        .map(Cow::Owned)
        .map_err(|_| LdapError::DecodingUTF8)
}
