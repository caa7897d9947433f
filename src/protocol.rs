//! LDAPMessage framing on top of the BER codec.
//!
//! Every PDU on the wire is `SEQUENCE { messageID INTEGER, protocolOp
//! [APPLICATION n], controls [0] OPTIONAL }`. The codec below translates
//! between that envelope and `(MessageId, Packet, controls)` triples; the
//! connection driver does the rest.

use std::io;

use crate::MessageId;
use crate::controls::{decode_control, Control};
use crate::search::SearchItem;

use bertree::{read, write, Class, Packet, Universal};

use bytes::{Buf, BytesMut};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{Decoder, Encoder};

/// Protocol operation tags under [APPLICATION], per RFC 4511 section 4.
#[allow(dead_code)]
pub(crate) mod app_tags {
    pub const BIND_REQUEST: u64 = 0;
    pub const BIND_RESPONSE: u64 = 1;
    pub const UNBIND_REQUEST: u64 = 2;
    pub const SEARCH_REQUEST: u64 = 3;
    pub const SEARCH_RESULT_ENTRY: u64 = 4;
    pub const SEARCH_RESULT_DONE: u64 = 5;
    pub const MODIFY_REQUEST: u64 = 6;
    pub const MODIFY_RESPONSE: u64 = 7;
    pub const ADD_REQUEST: u64 = 8;
    pub const ADD_RESPONSE: u64 = 9;
    pub const DEL_REQUEST: u64 = 10;
    pub const DEL_RESPONSE: u64 = 11;
    pub const MODDN_REQUEST: u64 = 12;
    pub const MODDN_RESPONSE: u64 = 13;
    pub const COMPARE_REQUEST: u64 = 14;
    pub const COMPARE_RESPONSE: u64 = 15;
    pub const ABANDON_REQUEST: u64 = 16;
    pub const SEARCH_RESULT_REFERENCE: u64 = 19;
    pub const EXTENDED_REQUEST: u64 = 23;
    pub const EXTENDED_RESPONSE: u64 = 24;
    pub const INTERMEDIATE_RESPONSE: u64 = 25;
}

/// How far the per-search delivery queue can run ahead of the consumer
/// before the connection driver blocks on it.
pub(crate) const SEARCH_QUEUE_DEPTH: usize = 32;

pub(crate) type MaybeControls = Option<Vec<Packet>>;
pub(crate) type SearchItemSender = mpsc::Sender<(SearchItem, Vec<Control>)>;
pub(crate) type SearchItemReceiver = mpsc::Receiver<(SearchItem, Vec<Control>)>;
pub(crate) type ResultSender = oneshot::Sender<(Option<Packet>, Vec<Control>)>;
pub(crate) type OpExchange = (MessageId, LdapOp, Packet, MaybeControls, ResultSender);

/// What the driver must do with a submitted request.
#[derive(Debug)]
pub(crate) enum LdapOp {
    /// Expect exactly one terminal response.
    Single,
    /// Route response PDUs to the search queue until SearchResultDone.
    Search(SearchItemSender),
    /// Fire-and-forget cancellation of another operation.
    Abandon(MessageId),
    /// Send the request, then shut the transport down.
    Unbind,
}

pub(crate) struct LdapCodec;

fn decoding_error() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "decoding error")
}

impl Decoder for LdapCodec {
    type Item = (MessageId, Packet, Vec<Control>);
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, io::Error> {
        if buf.is_empty() {
            return Ok(None);
        }
        let (rest_len, envelope) = match read::parse_packet(buf) {
            Err(e) if e.is_incomplete() => return Ok(None),
            Err(_) => return Err(decoding_error()),
            Ok((rest, envelope)) => (rest.len(), envelope),
        };
        buf.advance(buf.len() - rest_len);
        if !envelope.has_tag(Class::Universal, Universal::Sequence as u64) {
            return Err(decoding_error());
        }
        let mut children = envelope
            .into_children()
            .ok_or_else(decoding_error)?
            .into_iter();
        let msgid = children
            .next()
            .filter(|p| p.has_tag(Class::Universal, Universal::Integer as u64))
            .and_then(|p| p.read_uint())
            .ok_or_else(decoding_error)? as MessageId;
        let op = children.next().ok_or_else(decoding_error)?;
        let mut controls = Vec::new();
        for extra in children {
            // Anything beyond the optional [0] controls element is ignored;
            // some servers append stray elements to unsolicited messages.
            if extra.has_tag(Class::Context, 0) && extra.is_constructed() {
                for raw in extra.into_children().expect("constructed") {
                    controls.push(decode_control(raw).map_err(|_| decoding_error())?);
                }
            }
        }
        Ok(Some((msgid, op, controls)))
    }
}

impl Encoder<(MessageId, Packet, MaybeControls)> for LdapCodec {
    type Error = io::Error;

    fn encode(
        &mut self,
        msg: (MessageId, Packet, MaybeControls),
        into: &mut BytesMut,
    ) -> io::Result<()> {
        let (id, op, controls) = msg;
        let mut envelope = Packet::sequence()
            .with_child(Packet::integer(i64::from(id)))
            .with_child(op);
        if let Some(controls) = controls {
            let mut wrapper = Packet::constructed(Class::Context, 0);
            for ctrl in controls {
                wrapper.push(ctrl);
            }
            envelope.push(wrapper);
        }
        write::encode_into(into, &envelope)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn envelope_round_trip() {
        let mut codec = LdapCodec;
        let op = Packet::constructed(Class::Application, app_tags::DEL_RESPONSE)
            .with_child(Packet::enumerated(0))
            .with_child(Packet::octet_string(""))
            .with_child(Packet::octet_string(""));
        let mut buf = BytesMut::new();
        codec.encode((7, op.clone(), None), &mut buf).unwrap();
        let (msgid, decoded, controls) = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msgid, 7);
        assert_eq!(decoded, op);
        assert!(controls.is_empty());
        assert!(buf.is_empty());
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn partial_frame_waits_for_more() {
        let mut codec = LdapCodec;
        let op = Packet::octet_string("dc=example");
        let mut buf = BytesMut::new();
        codec.encode((1, op, None), &mut buf).unwrap();
        let split = buf.split_off(3);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.unsplit(split);
        assert!(codec.decode(&mut buf).unwrap().is_some());
    }

    #[test]
    fn garbage_is_an_error() {
        let mut codec = LdapCodec;
        let mut buf = BytesMut::from(&[0x30u8, 0x80, 0x00, 0x00][..]);
        assert!(codec.decode(&mut buf).is_err());
    }
}
