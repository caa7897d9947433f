//! Streaming BER decoder.
//!
//! The parsers here follow `nom`'s streaming convention: running out of
//! input yields `Err(Incomplete)`, so a caller feeding data from a socket
//! can simply wait for more bytes. Malformed input (indefinite lengths,
//! over-long tag or length forms) is a hard failure.

use std::convert::TryFrom;

use crate::common::Class;
use crate::packet::{Body, Packet};

use nom::bits::streaming as bits;
use nom::bytes::streaming::take;
use nom::combinator::map_opt;
use nom::error::{Error, ErrorKind, ParseError};
use nom::number::streaming as number;
use nom::sequence::tuple;
use nom::{IResult, InputLength};

// LDAP never needs tag numbers beyond 32 bits; more continuation octets
// than that is treated as a decoding error rather than parsed further.
const MAX_TAG_OCTETS: usize = 4;

fn class_bits(i: (&[u8], usize)) -> IResult<(&[u8], usize), Class> {
    map_opt(bits::take(2usize), Class::from_u8)(i)
}

fn constructed_bit(i: (&[u8], usize)) -> IResult<(&[u8], usize), bool> {
    let (i, bit): (_, u8) = bits::take(1usize)(i)?;
    Ok((i, bit != 0))
}

fn low_tag_bits(i: (&[u8], usize)) -> IResult<(&[u8], usize), u64> {
    bits::take(5usize)(i)
}

fn parse_identifier(i: &[u8]) -> IResult<&[u8], (Class, bool, u64)> {
    let (mut i, (class, constructed, low)) =
        nom::bits(tuple((class_bits, constructed_bit, low_tag_bits)))(i)?;
    if low != 0x1F {
        return Ok((i, (class, constructed, low)));
    }
    // High-tag-number form: base-128 big-endian, continuation bit in bit 8.
    let mut tag = 0u64;
    let mut octets = 0;
    loop {
        if octets == MAX_TAG_OCTETS {
            return Err(nom::Err::Failure(Error::from_error_kind(
                i,
                ErrorKind::TooLarge,
            )));
        }
        let (j, b) = number::be_u8(i)?;
        i = j;
        octets += 1;
        tag = (tag << 7) | u64::from(b & 0x7F);
        if b & 0x80 == 0 {
            break;
        }
    }
    Ok((i, (class, constructed, tag)))
}

fn parse_length(i: &[u8]) -> IResult<&[u8], usize> {
    let (i, first) = number::be_u8(i)?;
    if first < 0x80 {
        return Ok((i, first as usize));
    }
    if first == 0x80 {
        // Indefinite length; not used by LDAP, a protocol error here.
        return Err(nom::Err::Failure(Error::from_error_kind(
            i,
            ErrorKind::Verify,
        )));
    }
    let (i, octets) = take(first & 0x7F)(i)?;
    let (_, len) = parse_uint(octets)?;
    let len = usize::try_from(len)
        .map_err(|_| nom::Err::Failure(Error::from_error_kind(i, ErrorKind::TooLarge)))?;
    Ok((i, len))
}

/// Fold content octets into an unsigned integer.
pub fn parse_uint(i: &[u8]) -> IResult<&[u8], u64> {
    if i.len() > 8 {
        return Err(nom::Err::Failure(Error::from_error_kind(
            i,
            ErrorKind::TooLarge,
        )));
    }
    Ok((&i[i.len()..], i.iter().fold(0, |v, &b| (v << 8) | u64::from(b))))
}

/// Fold content octets into a signed two's-complement integer.
///
/// Empty content is a decoding error.
pub fn parse_int(i: &[u8]) -> IResult<&[u8], i64> {
    if i.is_empty() || i.len() > 8 {
        return Err(nom::Err::Failure(Error::from_error_kind(
            i,
            ErrorKind::Verify,
        )));
    }
    let mut v: i64 = if i[0] & 0x80 != 0 { -1 } else { 0 };
    for &b in i {
        v = (v << 8) | i64::from(b);
    }
    Ok((&i[i.len()..], v))
}

/// Parse one complete packet from the input, recursing into constructed
/// content until the declared length is consumed.
pub fn parse_packet(i: &[u8]) -> IResult<&[u8], Packet> {
    let (i, ((class, constructed, tag), len)) =
        tuple((parse_identifier, parse_length))(i)?;
    let (i, content) = take(len)(i)?;
    let body = if constructed {
        let mut rest = content;
        let mut nodes = Vec::new();
        while rest.input_len() > 0 {
            let (j, child) = parse_packet(rest)?;
            rest = j;
            nodes.push(child);
        }
        Body::Nodes(nodes)
    } else {
        Body::Bytes(content.to_vec())
    };
    Ok((i, Packet { class, tag, body }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::universal::Universal;

    #[test]
    fn primitive_integer() {
        let wire: &[u8] = &[0x02, 0x02, 0xFF, 0x7F];
        let (rest, pkt) = parse_packet(wire).unwrap();
        assert!(rest.is_empty());
        assert_eq!(
            pkt,
            Packet::primitive(Class::Universal, 2, vec![0xFF, 0x7F])
        );
        assert_eq!(pkt.read_int(), Some(-129));
    }

    #[test]
    fn constructed_sequence() {
        let wire: &[u8] = &[
            0x30, 0x0E, 0x04, 0x0C, b'H', b'e', b'l', b'l', b'o', b' ', b'W', b'o', b'r', b'l',
            b'd', b'!',
        ];
        let (rest, pkt) = parse_packet(wire).unwrap();
        assert!(rest.is_empty());
        let children = pkt.children().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].as_str(), Some("Hello World!"));
    }

    #[test]
    fn short_length_boundary() {
        // 127 octets still uses the short length form; 128 needs long form.
        let mut wire = vec![0x04, 0x7F];
        wire.extend(std::iter::repeat(b'a').take(127));
        let (rest, pkt) = parse_packet(&wire).unwrap();
        assert!(rest.is_empty());
        assert_eq!(pkt.bytes().unwrap().len(), 127);

        let mut wire = vec![0x04, 0x81, 0x80];
        wire.extend(std::iter::repeat(b'a').take(128));
        let (rest, pkt) = parse_packet(&wire).unwrap();
        assert!(rest.is_empty());
        assert_eq!(pkt.bytes().unwrap().len(), 128);
    }

    #[test]
    fn long_form_length() {
        let mut wire = vec![0x04, 0x82, 0x01, 0x00];
        wire.extend(std::iter::repeat(0u8).take(256));
        let (rest, pkt) = parse_packet(&wire).unwrap();
        assert!(rest.is_empty());
        assert_eq!(pkt.bytes().unwrap().len(), 256);
    }

    #[test]
    fn high_tag_number() {
        // Context tag 201: 0x1F marker, then base-128 (0x81 0x49).
        let wire: &[u8] = &[0x9F, 0x81, 0x49, 0x01, 0x2A];
        let (rest, pkt) = parse_packet(wire).unwrap();
        assert!(rest.is_empty());
        assert!(pkt.has_tag(Class::Context, 201));
        assert_eq!(pkt.bytes().unwrap(), &[0x2A]);
    }

    #[test]
    fn high_tag_overflow_rejected() {
        let wire: &[u8] = &[0x9F, 0x81, 0x82, 0x83, 0x84, 0x05, 0x00];
        assert!(matches!(parse_packet(wire), Err(nom::Err::Failure(_))));
    }

    #[test]
    fn indefinite_length_rejected() {
        let wire: &[u8] = &[0x30, 0x80, 0x00, 0x00];
        assert!(matches!(parse_packet(wire), Err(nom::Err::Failure(_))));
    }

    #[test]
    fn truncated_input_is_incomplete() {
        // Declared two content octets, only one present.
        let wire: &[u8] = &[0x04, 0x02, 0x61];
        assert!(matches!(parse_packet(wire), Err(nom::Err::Incomplete(_))));
        let empty: &[u8] = &[];
        assert!(matches!(parse_packet(empty), Err(nom::Err::Incomplete(_))));
    }

    #[test]
    fn empty_integer_content_rejected() {
        assert!(parse_int(&[]).is_err());
    }

    #[test]
    fn enumerated_scope_value() {
        let wire: &[u8] = &[0x0A, 0x01, 0x02];
        let (_, pkt) = parse_packet(wire).unwrap();
        assert!(pkt.has_tag(Class::Universal, Universal::Enumerated as u64));
        assert_eq!(pkt.read_uint(), Some(2));
    }
}
