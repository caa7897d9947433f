//! BER encoder.

use std::io;

use crate::common::Class;
use crate::packet::{Body, Packet};

use byteorder::WriteBytesExt;
use bytes::BytesMut;

/// Serialize a packet tree into the provided buffer.
pub fn encode_into(buf: &mut BytesMut, pkt: &Packet) -> io::Result<()> {
    let mut out = Vec::new();
    encode_node(&mut out, pkt)?;
    buf.extend(out);
    Ok(())
}

/// Serialize a packet tree into a fresh byte vector.
pub fn encode_to_vec(pkt: &Packet) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    encode_node(&mut out, pkt)?;
    Ok(out)
}

fn encode_node(out: &mut Vec<u8>, pkt: &Packet) -> io::Result<()> {
    write_identifier(out, pkt.class, pkt.is_constructed(), pkt.tag)?;
    match pkt.body {
        Body::Bytes(ref bytes) => {
            write_length(out, bytes.len())?;
            out.extend_from_slice(bytes);
        }
        Body::Nodes(ref nodes) => {
            let mut content = Vec::new();
            for node in nodes {
                encode_node(&mut content, node)?;
            }
            write_length(out, content.len())?;
            out.extend(content);
        }
    }
    Ok(())
}

fn write_identifier(out: &mut Vec<u8>, class: Class, constructed: bool, tag: u64) -> io::Result<()> {
    let leading = (class as u8) << 6 | (constructed as u8) << 5;
    if tag < 31 {
        out.write_u8(leading | tag as u8)?;
        return Ok(());
    }
    // High-tag-number form: 0x1F marker, then base-128 big-endian with the
    // continuation bit set on every octet but the last.
    out.write_u8(leading | 0x1F)?;
    let mut groups = Vec::new();
    let mut rem = tag;
    while {
        groups.push((rem & 0x7F) as u8);
        rem >>= 7;
        rem > 0
    } {}
    while let Some(group) = groups.pop() {
        out.write_u8(if groups.is_empty() { group } else { group | 0x80 })?;
    }
    Ok(())
}

fn write_length(out: &mut Vec<u8>, len: usize) -> io::Result<()> {
    if len < 128 {
        out.write_u8(len as u8)?;
        return Ok(());
    }
    let mut count = 0u8;
    let mut rem = len;
    while {
        count += 1;
        rem >>= 8;
        rem > 0
    } {}
    out.write_u8(count | 0x80)?;
    let repr = (len as u64).to_be_bytes();
    out.extend_from_slice(&repr[repr.len() - count as usize..]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read::parse_packet;

    fn wire(pkt: &Packet) -> Vec<u8> {
        encode_to_vec(pkt).unwrap()
    }

    #[test]
    fn simple_integer() {
        assert_eq!(wire(&Packet::integer(1616)), vec![0x02, 0x02, 0x06, 0x50]);
    }

    #[test]
    fn constructed_sequence() {
        let pkt = Packet::sequence().with_child(Packet::octet_string("Hello World!"));
        assert_eq!(
            wire(&pkt),
            vec![48, 14, 4, 12, 72, 101, 108, 108, 111, 32, 87, 111, 114, 108, 100, 33]
        );
    }

    #[test]
    fn bind_request_envelope() {
        let pkt = Packet::sequence()
            .with_child(Packet::integer(1))
            .with_child(
                Packet::constructed(Class::Application, 0)
                    .with_child(Packet::integer(3))
                    .with_child(Packet::octet_string("cn=root,dc=plabs"))
                    .with_child(Packet::primitive(Class::Context, 0, b"asdf".to_vec())),
            );
        let expected = vec![
            0x30, 0x20, 0x02, 0x01, 0x01, 0x60, 0x1B, 0x02, 0x01, 0x03, 0x04, 0x10, 0x63, 0x6e,
            0x3d, 0x72, 0x6f, 0x6f, 0x74, 0x2c, 0x64, 0x63, 0x3d, 0x70, 0x6c, 0x61, 0x62, 0x73,
            0x80, 0x04, 0x61, 0x73, 0x64, 0x66,
        ];
        assert_eq!(wire(&pkt), expected);
    }

    #[test]
    fn long_form_length() {
        let pkt = Packet::octet_string(vec![b'x'; 300]);
        let bytes = wire(&pkt);
        assert_eq!(&bytes[..4], &[0x04, 0x82, 0x01, 0x2C]);
        assert_eq!(bytes.len(), 304);
    }

    #[test]
    fn high_tag_number() {
        let pkt = Packet::primitive(Class::Context, 201, vec![0x2A]);
        assert_eq!(wire(&pkt), vec![0x9F, 0x81, 0x49, 0x01, 0x2A]);
    }

    #[test]
    fn round_trip() {
        let pkt = Packet::sequence()
            .with_child(Packet::integer(7))
            .with_child(
                Packet::constructed(Class::Application, 3)
                    .with_child(Packet::octet_string("dc=example,dc=org"))
                    .with_child(Packet::enumerated(2))
                    .with_child(Packet::boolean(false))
                    .with_child(Packet::octet_string(vec![0u8, 1, 2, 0xFF])),
            )
            .with_child(Packet::primitive(Class::Context, 0, Vec::new()));
        let bytes = wire(&pkt);
        let (rest, parsed) = parse_packet(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, pkt);
    }
}
