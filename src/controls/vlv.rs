use super::{encode_value, parse_value, Control};
use crate::result::{LdapError, Result};

use bertree::{Class, Packet};

pub const VLV_REQUEST_OID: &str = "2.16.840.1.113730.3.4.9";
pub const VLV_RESPONSE_OID: &str = "2.16.840.1.113730.3.4.10";

/// Target of a Virtual List View request: where the window is anchored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VlvTarget {
    /// Anchor at an offset into the sorted result list.
    Offset { offset: i32, content_count: i32 },
    /// Anchor at the first entry whose sort key is >= the assertion value.
    AssertionValue(Vec<u8>),
}

/// Virtual List View request control (draft-ietf-ldapext-ldapv3-vlv).
/// Must be paired with a Server-Side Sorting request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VlvRequest {
    /// Entries requested before the target.
    pub before: i32,
    /// Entries requested after the target.
    pub after: i32,
    pub target: VlvTarget,
    /// Server context from a previous VLV response.
    pub context_id: Option<Vec<u8>>,
    pub critical: bool,
}

impl VlvRequest {
    pub(crate) fn encode_value(&self) -> Vec<u8> {
        let mut pkt = Packet::sequence()
            .with_child(Packet::integer(i64::from(self.before)))
            .with_child(Packet::integer(i64::from(self.after)));
        match self.target {
            VlvTarget::Offset {
                offset,
                content_count,
            } => {
                pkt.push(
                    Packet::constructed(Class::Context, 0)
                        .with_child(Packet::integer(i64::from(offset)))
                        .with_child(Packet::integer(i64::from(content_count))),
                );
            }
            VlvTarget::AssertionValue(ref value) => {
                pkt.push(Packet::primitive(Class::Context, 1, value.clone()));
            }
        }
        if let Some(ref ctx) = self.context_id {
            pkt.push(Packet::octet_string(ctx.as_slice()));
        }
        encode_value(&pkt)
    }
}

/// Virtual List View response control.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VlvResponse {
    /// Server's position of the target entry, 1-based.
    pub target_position: i32,
    /// Server's estimate of the full list size.
    pub content_count: i32,
    /// VLV result code; zero on success.
    pub result: u32,
    /// Context to pass back in the next request.
    pub context_id: Option<Vec<u8>>,
}

impl VlvResponse {
    pub(crate) fn decode(_critical: bool, value: Option<Vec<u8>>) -> Result<Control> {
        let pkt = parse_value(value)?;
        let children = pkt
            .children()
            .ok_or(LdapError::Decoding("vlv response value"))?;
        if children.len() < 3 {
            return Err(LdapError::Decoding("vlv response value"));
        }
        let target_position = children[0]
            .read_int()
            .ok_or(LdapError::Decoding("vlv target position"))? as i32;
        let content_count = children[1]
            .read_int()
            .ok_or(LdapError::Decoding("vlv content count"))? as i32;
        let result = children[2]
            .read_uint()
            .ok_or(LdapError::Decoding("vlv result code"))? as u32;
        let context_id = match children.get(3) {
            Some(p) => Some(
                p.bytes()
                    .ok_or(LdapError::Decoding("vlv context id"))?
                    .to_vec(),
            ),
            None => None,
        };
        Ok(Control::VlvResponse(VlvResponse {
            target_position,
            content_count,
            result,
            context_id,
        }))
    }
}
