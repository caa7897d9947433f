//! Search filter compiler.
//!
//! Filters have two faces: the RFC 4515 string syntax written by people, and
//! the RFC 4511 wire form sent to servers. [`parse()`](fn.parse.html) turns a
//! string into a [`Filter`](enum.Filter.html) tree,
//! [`Filter::to_packet()`](enum.Filter.html#method.to_packet) encodes the
//! tree for the wire, [`Filter::from_packet()`](enum.Filter.html#method.from_packet)
//! reverses that, and the `Display` impl re-emits the string syntax with hex
//! escapes in canonical uppercase form.

use std::fmt;
use std::result::Result as StdResult;

use crate::result::{LdapError, Result};

use bertree::{Class, Packet};

use nom::IResult;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while, take_while1};
use nom::character::complete::digit1;
use nom::character::{is_alphabetic, is_alphanumeric};
use nom::combinator::{map, map_res, opt, recognize, verify};
use nom::error::{Error, ErrorKind, ParseError};
use nom::multi::many0;
use nom::number::complete::be_u8;
use nom::sequence::{delimited, preceded};

// Filter choice tags under [CONTEXT], per RFC 4511 section 4.5.1.7.
const TAG_AND: u64 = 0;
const TAG_OR: u64 = 1;
const TAG_NOT: u64 = 2;
const TAG_EQUALITY: u64 = 3;
const TAG_SUBSTRINGS: u64 = 4;
const TAG_GREATER_OR_EQUAL: u64 = 5;
const TAG_LESS_OR_EQUAL: u64 = 6;
const TAG_PRESENT: u64 = 7;
const TAG_APPROX: u64 = 8;
const TAG_EXTENSIBLE: u64 = 9;

const SUB_INITIAL: u64 = 0;
const SUB_ANY: u64 = 1;
const SUB_FINAL: u64 = 2;

const EXT_MATCHING_RULE: u64 = 1;
const EXT_TYPE: u64 = 2;
const EXT_VALUE: u64 = 3;
const EXT_DN_ATTRS: u64 = 4;

/// A search filter expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Filter {
    /// Conjunction; empty is the "absolute true" filter.
    And(Vec<Filter>),
    /// Disjunction; empty is the "absolute false" filter.
    Or(Vec<Filter>),
    /// Negation.
    Not(Box<Filter>),
    /// `(attr=value)`.
    Equality(String, Vec<u8>),
    /// `(attr=initial*any*...*final)`, at least one asterisk in the pattern.
    Substrings {
        attr: String,
        initial: Option<Vec<u8>>,
        any: Vec<Vec<u8>>,
        last: Option<Vec<u8>>,
    },
    /// `(attr>=value)`.
    GreaterOrEqual(String, Vec<u8>),
    /// `(attr<=value)`.
    LessOrEqual(String, Vec<u8>),
    /// `(attr=*)`.
    Present(String),
    /// `(attr~=value)`.
    Approx(String, Vec<u8>),
    /// `([attr][:dn][:rule]:=value)`.
    Extensible {
        matching_rule: Option<String>,
        attr: Option<String>,
        value: Vec<u8>,
        dn_attributes: bool,
    },
}

/// Compile the string representation of a search filter.
pub fn parse(input: &str) -> Result<Filter> {
    match filtexpr(input.as_bytes()) {
        Ok((rest, filter)) if rest.is_empty() => Ok(filter),
        _ => Err(LdapError::FilterCompile),
    }
}

fn filtexpr(i: &[u8]) -> IResult<&[u8], Filter> {
    alt((filter, item))(i)
}

fn filter(i: &[u8]) -> IResult<&[u8], Filter> {
    delimited(tag(b"("), filtercomp, tag(b")"))(i)
}

fn filtercomp(i: &[u8]) -> IResult<&[u8], Filter> {
    alt((and, or, not, item))(i)
}

fn filterlist(i: &[u8]) -> IResult<&[u8], Vec<Filter>> {
    many0(filter)(i)
}

fn and(i: &[u8]) -> IResult<&[u8], Filter> {
    map(preceded(tag(b"&"), filterlist), Filter::And)(i)
}

fn or(i: &[u8]) -> IResult<&[u8], Filter> {
    map(preceded(tag(b"|"), filterlist), Filter::Or)(i)
}

fn not(i: &[u8]) -> IResult<&[u8], Filter> {
    map(preceded(tag(b"!"), filter), |f| Filter::Not(Box::new(f)))(i)
}

fn item(i: &[u8]) -> IResult<&[u8], Filter> {
    alt((eq, ineq, extensible))(i)
}

// One run of assertion value characters, hex escapes resolved. The
// characters `(`, `)`, `*` and NUL terminate a run; a literal occurrence of
// any of them must be written as \XX.
fn value_part(i: &[u8]) -> IResult<&[u8], Vec<u8>> {
    map_res(take_while(is_value_char), unescape)(i)
}

fn is_value_char(c: u8) -> bool {
    c != 0 && c != b'(' && c != b')' && c != b'*'
}

/// Resolve `\XX` hex escapes in an assertion value.
pub(crate) fn unescape(raw: &[u8]) -> StdResult<Vec<u8>, ()> {
    fn hex(c: u8) -> StdResult<u8, ()> {
        match c {
            b'0'..=b'9' => Ok(c - b'0'),
            b'a'..=b'f' => Ok(c - b'a' + 10),
            b'A'..=b'F' => Ok(c - b'A' + 10),
            _ => Err(()),
        }
    }
    let mut out = Vec::with_capacity(raw.len());
    let mut iter = raw.iter().copied();
    while let Some(c) = iter.next() {
        if c != b'\\' {
            out.push(c);
            continue;
        }
        let hi = hex(iter.next().ok_or(())?)?;
        let lo = hex(iter.next().ok_or(())?)?;
        out.push((hi << 4) | lo);
    }
    Ok(out)
}

fn eq(i: &[u8]) -> IResult<&[u8], Filter> {
    let (i, attr) = attribute_description(i)?;
    let (i, _) = tag(b"=")(i)?;
    let (i, first) = value_part(i)?;
    let (i, more) = many0(preceded(tag(b"*"), value_part))(i)?;
    let attr = ascii_owned(attr);
    if more.is_empty() {
        // no asterisks: plain equality
        return Ok((i, Filter::Equality(attr, first)));
    }
    if first.is_empty() && more.len() == 1 && more[0].is_empty() {
        // a single bare asterisk: presence
        return Ok((i, Filter::Present(attr)));
    }
    let count = more.len();
    let mut any = Vec::new();
    let mut last = None;
    for (ix, part) in more.into_iter().enumerate() {
        if part.is_empty() {
            if ix + 1 == count {
                break;
            }
            // adjacent asterisks with nothing between them
            return Err(nom::Err::Error(Error::from_error_kind(i, ErrorKind::Verify)));
        }
        if ix + 1 == count {
            last = Some(part);
        } else {
            any.push(part);
        }
    }
    let initial = if first.is_empty() { None } else { Some(first) };
    Ok((
        i,
        Filter::Substrings {
            attr,
            initial,
            any,
            last,
        },
    ))
}

fn ineq(i: &[u8]) -> IResult<&[u8], Filter> {
    let (i, attr) = attribute_description(i)?;
    let (i, op) = alt((tag(b">="), tag(b"<="), tag(b"~=")))(i)?;
    let (i, value) = value_part(i)?;
    let attr = ascii_owned(attr);
    let filter = match op {
        b">=" => Filter::GreaterOrEqual(attr, value),
        b"<=" => Filter::LessOrEqual(attr, value),
        _ => Filter::Approx(attr, value),
    };
    Ok((i, filter))
}

fn extensible(i: &[u8]) -> IResult<&[u8], Filter> {
    alt((attr_dn_mrule, dn_mrule))(i)
}

fn attr_dn_mrule(i: &[u8]) -> IResult<&[u8], Filter> {
    let (i, attr) = attribute_description(i)?;
    let (i, dn) = opt(tag(b":dn"))(i)?;
    let (i, mrule) = opt(preceded(tag(b":"), attribute_type))(i)?;
    let (i, _) = tag(b":=")(i)?;
    let (i, value) = value_part(i)?;
    Ok((
        i,
        Filter::Extensible {
            matching_rule: mrule.map(ascii_owned),
            attr: Some(ascii_owned(attr)),
            value,
            dn_attributes: dn.is_some(),
        },
    ))
}

fn dn_mrule(i: &[u8]) -> IResult<&[u8], Filter> {
    let (i, dn) = opt(tag(b":dn"))(i)?;
    let (i, mrule) = preceded(tag(b":"), attribute_type)(i)?;
    let (i, _) = tag(b":=")(i)?;
    let (i, value) = value_part(i)?;
    Ok((
        i,
        Filter::Extensible {
            matching_rule: Some(ascii_owned(mrule)),
            attr: None,
            value,
            dn_attributes: dn.is_some(),
        },
    ))
}

fn attribute_description(i: &[u8]) -> IResult<&[u8], &[u8]> {
    recognize(|i| -> IResult<&[u8], ()> {
        let (i, _) = attribute_type(i)?;
        let (i, _) = many0(preceded(tag(b";"), take_while1(is_alnum_hyphen)))(i)?;
        Ok((i, ()))
    })(i)
}

fn attribute_type(i: &[u8]) -> IResult<&[u8], &[u8]> {
    alt((numeric_oid, descr))(i)
}

fn numeric_oid(i: &[u8]) -> IResult<&[u8], &[u8]> {
    recognize(|i| -> IResult<&[u8], ()> {
        let (i, _) = number(i)?;
        let (i, _) = many0(preceded(tag(b"."), number))(i)?;
        Ok((i, ()))
    })(i)
}

// A number may be zero, but must not have superfluous leading zeroes.
fn number(i: &[u8]) -> IResult<&[u8], &[u8]> {
    verify(digit1, |d: &[u8]| d.len() == 1 || d[0] != b'0')(i)
}

fn descr(i: &[u8]) -> IResult<&[u8], &[u8]> {
    recognize(|i| -> IResult<&[u8], ()> {
        let (i, _) = verify(be_u8, |c| is_alphabetic(*c))(i)?;
        let (i, _) = take_while(is_alnum_hyphen)(i)?;
        Ok((i, ()))
    })(i)
}

fn is_alnum_hyphen(c: u8) -> bool {
    is_alphanumeric(c) || c == b'-'
}

fn ascii_owned(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

impl Filter {
    /// Encode the filter for the wire.
    pub fn to_packet(&self) -> Packet {
        match *self {
            Filter::And(ref inner) => set_of(TAG_AND, inner),
            Filter::Or(ref inner) => set_of(TAG_OR, inner),
            Filter::Not(ref inner) => {
                Packet::constructed(Class::Context, TAG_NOT).with_child(inner.to_packet())
            }
            Filter::Equality(ref attr, ref value) => ava(TAG_EQUALITY, attr, value),
            Filter::GreaterOrEqual(ref attr, ref value) => ava(TAG_GREATER_OR_EQUAL, attr, value),
            Filter::LessOrEqual(ref attr, ref value) => ava(TAG_LESS_OR_EQUAL, attr, value),
            Filter::Approx(ref attr, ref value) => ava(TAG_APPROX, attr, value),
            Filter::Present(ref attr) => {
                Packet::primitive(Class::Context, TAG_PRESENT, attr.clone().into_bytes())
            }
            Filter::Substrings {
                ref attr,
                ref initial,
                ref any,
                ref last,
            } => {
                let mut subs = Packet::sequence();
                if let Some(initial) = initial {
                    subs.push(Packet::primitive(Class::Context, SUB_INITIAL, initial.clone()));
                }
                for part in any {
                    subs.push(Packet::primitive(Class::Context, SUB_ANY, part.clone()));
                }
                if let Some(last) = last {
                    subs.push(Packet::primitive(Class::Context, SUB_FINAL, last.clone()));
                }
                Packet::constructed(Class::Context, TAG_SUBSTRINGS)
                    .with_child(Packet::octet_string(attr.as_bytes()))
                    .with_child(subs)
            }
            Filter::Extensible {
                ref matching_rule,
                ref attr,
                ref value,
                dn_attributes,
            } => {
                let mut pkt = Packet::constructed(Class::Context, TAG_EXTENSIBLE);
                if let Some(rule) = matching_rule {
                    pkt.push(Packet::primitive(
                        Class::Context,
                        EXT_MATCHING_RULE,
                        rule.clone().into_bytes(),
                    ));
                }
                if let Some(attr) = attr {
                    pkt.push(Packet::primitive(
                        Class::Context,
                        EXT_TYPE,
                        attr.clone().into_bytes(),
                    ));
                }
                pkt.push(Packet::primitive(Class::Context, EXT_VALUE, value.clone()));
                if dn_attributes {
                    pkt.push(Packet::primitive(Class::Context, EXT_DN_ATTRS, vec![0xFF]));
                }
                pkt
            }
        }
    }

    /// Reconstruct a filter from its wire form.
    pub fn from_packet(pkt: &Packet) -> Result<Filter> {
        if pkt.class != Class::Context {
            return Err(LdapError::FilterDecompile);
        }
        let filter = match pkt.tag {
            TAG_AND | TAG_OR => {
                let inner = pkt
                    .children()
                    .ok_or(LdapError::FilterDecompile)?
                    .iter()
                    .map(Filter::from_packet)
                    .collect::<Result<Vec<_>>>()?;
                if pkt.tag == TAG_AND {
                    Filter::And(inner)
                } else {
                    Filter::Or(inner)
                }
            }
            TAG_NOT => match pkt.children() {
                Some([inner]) => Filter::Not(Box::new(Filter::from_packet(inner)?)),
                _ => return Err(LdapError::FilterDecompile),
            },
            TAG_EQUALITY => unpack_ava(pkt, Filter::Equality)?,
            TAG_GREATER_OR_EQUAL => unpack_ava(pkt, Filter::GreaterOrEqual)?,
            TAG_LESS_OR_EQUAL => unpack_ava(pkt, Filter::LessOrEqual)?,
            TAG_APPROX => unpack_ava(pkt, Filter::Approx)?,
            TAG_PRESENT => Filter::Present(
                pkt.as_str()
                    .ok_or(LdapError::FilterDecompile)?
                    .to_owned(),
            ),
            TAG_SUBSTRINGS => {
                let (attr, subs) = match pkt.children() {
                    Some([attr, subs]) => (attr, subs),
                    _ => return Err(LdapError::FilterDecompile),
                };
                let attr = attr.as_str().ok_or(LdapError::FilterDecompile)?.to_owned();
                let mut initial = None;
                let mut any = Vec::new();
                let mut last = None;
                for part in subs.children().ok_or(LdapError::FilterDecompile)? {
                    let bytes = part
                        .bytes()
                        .ok_or(LdapError::FilterDecompile)?
                        .to_vec();
                    match part.tag {
                        SUB_INITIAL if initial.is_none() && any.is_empty() && last.is_none() => {
                            initial = Some(bytes)
                        }
                        SUB_ANY if last.is_none() => any.push(bytes),
                        SUB_FINAL if last.is_none() => last = Some(bytes),
                        _ => return Err(LdapError::FilterDecompile),
                    }
                }
                Filter::Substrings {
                    attr,
                    initial,
                    any,
                    last,
                }
            }
            TAG_EXTENSIBLE => {
                let mut matching_rule = None;
                let mut attr = None;
                let mut value = None;
                let mut dn_attributes = false;
                for part in pkt.children().ok_or(LdapError::FilterDecompile)? {
                    match part.tag {
                        EXT_MATCHING_RULE => {
                            matching_rule =
                                Some(part.as_str().ok_or(LdapError::FilterDecompile)?.to_owned())
                        }
                        EXT_TYPE => {
                            attr =
                                Some(part.as_str().ok_or(LdapError::FilterDecompile)?.to_owned())
                        }
                        EXT_VALUE => {
                            value = Some(part.bytes().ok_or(LdapError::FilterDecompile)?.to_vec())
                        }
                        EXT_DN_ATTRS => {
                            dn_attributes =
                                part.read_bool().ok_or(LdapError::FilterDecompile)?
                        }
                        _ => return Err(LdapError::FilterDecompile),
                    }
                }
                Filter::Extensible {
                    matching_rule,
                    attr,
                    value: value.ok_or(LdapError::FilterDecompile)?,
                    dn_attributes,
                }
            }
            _ => return Err(LdapError::FilterDecompile),
        };
        Ok(filter)
    }
}

fn set_of(tag: u64, inner: &[Filter]) -> Packet {
    let mut pkt = Packet::constructed(Class::Context, tag);
    for filter in inner {
        pkt.push(filter.to_packet());
    }
    pkt
}

fn ava(tag: u64, attr: &str, value: &[u8]) -> Packet {
    Packet::constructed(Class::Context, tag)
        .with_child(Packet::octet_string(attr.as_bytes()))
        .with_child(Packet::octet_string(value))
}

fn unpack_ava(pkt: &Packet, build: fn(String, Vec<u8>) -> Filter) -> Result<Filter> {
    match pkt.children() {
        Some([attr, value]) => {
            let attr = attr.as_str().ok_or(LdapError::FilterDecompile)?.to_owned();
            let value = value.bytes().ok_or(LdapError::FilterDecompile)?.to_vec();
            Ok(build(attr, value))
        }
        _ => Err(LdapError::FilterDecompile),
    }
}

// Escape an assertion value for the string form. The mandatory set
// ( ) * \ NUL is always hex-escaped, as are bytes that can't be shown as
// text; escapes use uppercase hex digits.
fn fmt_value(f: &mut fmt::Formatter, value: &[u8]) -> fmt::Result {
    fn must_escape(c: char) -> bool {
        matches!(c, '(' | ')' | '*' | '\\' | '\0')
    }
    match std::str::from_utf8(value) {
        Ok(s) => {
            for c in s.chars() {
                if must_escape(c) {
                    write!(f, "\\{:02X}", c as u32)?;
                } else {
                    write!(f, "{}", c)?;
                }
            }
        }
        Err(_) => {
            for &b in value {
                if b.is_ascii_graphic() && !must_escape(b as char) || b == b' ' {
                    write!(f, "{}", b as char)?;
                } else {
                    write!(f, "\\{:02X}", b)?;
                }
            }
        }
    }
    Ok(())
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Filter::And(ref inner) | Filter::Or(ref inner) => {
                write!(f, "({}", if matches!(self, Filter::And(_)) { '&' } else { '|' })?;
                for filter in inner {
                    write!(f, "{}", filter)?;
                }
                write!(f, ")")
            }
            Filter::Not(ref inner) => write!(f, "(!{})", inner),
            Filter::Equality(ref attr, ref value) => {
                write!(f, "({}=", attr)?;
                fmt_value(f, value)?;
                write!(f, ")")
            }
            Filter::GreaterOrEqual(ref attr, ref value) => {
                write!(f, "({}>=", attr)?;
                fmt_value(f, value)?;
                write!(f, ")")
            }
            Filter::LessOrEqual(ref attr, ref value) => {
                write!(f, "({}<=", attr)?;
                fmt_value(f, value)?;
                write!(f, ")")
            }
            Filter::Approx(ref attr, ref value) => {
                write!(f, "({}~=", attr)?;
                fmt_value(f, value)?;
                write!(f, ")")
            }
            Filter::Present(ref attr) => write!(f, "({}=*)", attr),
            Filter::Substrings {
                ref attr,
                ref initial,
                ref any,
                ref last,
            } => {
                write!(f, "({}=", attr)?;
                if let Some(initial) = initial {
                    fmt_value(f, initial)?;
                }
                write!(f, "*")?;
                for part in any {
                    fmt_value(f, part)?;
                    write!(f, "*")?;
                }
                if let Some(last) = last {
                    fmt_value(f, last)?;
                }
                write!(f, ")")
            }
            Filter::Extensible {
                ref matching_rule,
                ref attr,
                ref value,
                dn_attributes,
            } => {
                write!(f, "(")?;
                if let Some(attr) = attr {
                    write!(f, "{}", attr)?;
                }
                if dn_attributes {
                    write!(f, ":dn")?;
                }
                if let Some(rule) = matching_rule {
                    write!(f, ":{}", rule)?;
                }
                write!(f, ":=")?;
                fmt_value(f, value)?;
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::{parse, Filter};
    use bertree::write::encode_to_vec;

    fn ber_vec_eq(filter: &str, ber: &[u8]) {
        let compiled = parse(filter).unwrap();
        assert_eq!(encode_to_vec(&compiled.to_packet()).unwrap(), ber);
    }

    fn round_trips(filter: &str, canonical: &str) {
        let compiled = parse(filter).unwrap();
        let emitted = compiled.to_string();
        assert_eq!(emitted, canonical);
        assert_eq!(parse(&emitted).unwrap(), compiled);
    }

    #[test]
    fn filt_bare_item() {
        ber_vec_eq("a=v", b"\xa3\x06\x04\x01a\x04\x01v");
    }

    #[test]
    fn filt_simple_eq() {
        ber_vec_eq("(a=v)", b"\xa3\x06\x04\x01a\x04\x01v");
    }

    #[test]
    fn filt_extra_garbage() {
        assert!(parse("(a=v)garbage").is_err());
    }

    #[test]
    fn filt_simple_noneq() {
        ber_vec_eq("(a<=2)", b"\xa6\x06\x04\x01a\x04\x012");
    }

    #[test]
    fn filt_pres() {
        ber_vec_eq("(a=*)", b"\x87\x01a");
    }

    #[test]
    fn filt_ast_ini() {
        ber_vec_eq("(a=*v)", b"\xa4\x08\x04\x01a0\x03\x82\x01v");
    }

    #[test]
    fn filt_ast_fin() {
        ber_vec_eq("(a=v*)", b"\xa4\x08\x04\x01a0\x03\x80\x01v");
    }

    #[test]
    fn filt_ast_multi() {
        ber_vec_eq(
            "(a=v*x*y)",
            b"\xa4\x0e\x04\x01a0\t\x80\x01v\x81\x01x\x82\x01y",
        );
    }

    #[test]
    fn filt_ast_double() {
        assert!(parse("(a=f**)").is_err());
    }

    #[test]
    fn filt_esc_ok() {
        ber_vec_eq("(a=v\\2ax)", b"\xa3\x08\x04\x01a\x04\x03v*x");
    }

    #[test]
    fn filt_esc_runt() {
        assert!(parse("(a=v\\2)").is_err());
    }

    #[test]
    fn filt_esc_invalid() {
        assert!(parse("(a=v\\0x)").is_err());
    }

    #[test]
    fn filt_unbalanced() {
        assert!(parse("(&(a=v)").is_err());
        assert!(parse("(=v)").is_err());
    }

    #[test]
    fn filt_oid() {
        ber_vec_eq("(2.5.4.3=v)", b"\xa3\x0c\x04\x072.5.4.3\x04\x01v");
    }

    #[test]
    fn filt_oidl0() {
        assert!(parse("(2.5.04.0=top)").is_err());
    }

    #[test]
    fn filt_complex() {
        ber_vec_eq("(&(a=v)(b=x)(!(c=y)))", b"\xa0\x1a\xa3\x06\x04\x01a\x04\x01v\xa3\x06\x04\x01b\x04\x01x\xa2\x08\xa3\x06\x04\x01c\x04\x01y");
    }

    #[test]
    fn filt_abs_true_false() {
        ber_vec_eq("(&)", b"\xa0\0");
        ber_vec_eq("(|)", b"\xa1\0");
    }

    #[test]
    fn filt_ext_dn() {
        ber_vec_eq(
            "(ou:dn:=People)",
            b"\xa9\x0f\x82\x02ou\x83\x06People\x84\x01\xff",
        );
    }

    #[test]
    fn filt_ext_mrule() {
        ber_vec_eq(
            "(cn:2.5.13.5:=J D)",
            b"\xa9\x13\x81\x082.5.13.5\x82\x02cn\x83\x03J D",
        );
    }

    #[test]
    fn filt_simple_utf8() {
        ber_vec_eq("(a=ć)", b"\xa3\x07\x04\x01a\x04\x02\xc4\x87");
    }

    #[test]
    fn decompile_canonicalizes_escapes() {
        round_trips("(a=v\\2ax)", "(a=v\\2Ax)");
        round_trips("(cn=*)", "(cn=*)");
        round_trips("(a=v*x*y)", "(a=v*x*y)");
        round_trips("(ou:dn:2.5.13.5:=x)", "(ou:dn:2.5.13.5:=x)");
        round_trips("(!(a<=2))", "(!(a<=2))");
    }

    #[test]
    fn compile_decompile_structure() {
        let input = "(&(objectClass=person)(|(cn=Bob*)(uid=\\2a)))";
        let compiled = parse(input).unwrap();
        let top = compiled.to_packet();
        assert!(top.has_tag(bertree::Class::Context, 0));
        let children = top.children().unwrap();
        assert_eq!(children.len(), 2);
        assert!(children[0].has_tag(bertree::Class::Context, 3));
        assert!(children[1].has_tag(bertree::Class::Context, 1));
        assert_eq!(
            compiled.to_string(),
            "(&(objectClass=person)(|(cn=Bob*)(uid=\\2A)))"
        );
        assert_eq!(Filter::from_packet(&top).unwrap(), compiled);
    }

    #[test]
    fn wire_round_trip() {
        for s in [
            "(a=v)",
            "(a=*)",
            "(a=v*x*y)",
            "(a=*mid*)",
            "(&(a=v)(b>=2)(c~=x))",
            "(|(!(a=v))(b<=9))",
            "(cn:2.5.13.5:=J D)",
        ] {
            let compiled = parse(s).unwrap();
            assert_eq!(Filter::from_packet(&compiled.to_packet()).unwrap(), compiled);
        }
    }

    #[test]
    fn deep_nesting() {
        let mut input = String::new();
        for _ in 0..64 {
            input.push_str("(!");
        }
        input.push_str("(a=v)");
        for _ in 0..64 {
            input.push(')');
        }
        let compiled = parse(&input).unwrap();
        assert_eq!(Filter::from_packet(&compiled.to_packet()).unwrap(), compiled);
        assert_eq!(compiled.to_string(), input);
    }

    #[test]
    fn every_escapable_byte() {
        let compiled = parse("(a=\\28\\29\\2a\\5c\\00)").unwrap();
        assert_eq!(
            compiled,
            super::Filter::Equality("a".into(), b"()*\\\0".to_vec())
        );
        assert_eq!(compiled.to_string(), "(a=\\28\\29\\2A\\5C\\00)");
    }
}
