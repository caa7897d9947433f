use super::{encode_value, parse_value, Control};
use crate::result::{LdapError, Result};

use bertree::{Class, Packet};

pub const SORT_REQUEST_OID: &str = "1.2.840.113556.1.4.473";
pub const SORT_RESPONSE_OID: &str = "1.2.840.113556.1.4.474";

/// One sort key of a Server-Side Sorting request (RFC 2891).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortKey {
    /// Attribute to sort by.
    pub attr: String,
    /// Optional matching rule OID overriding the attribute's ordering rule.
    pub ordering_rule: Option<String>,
    /// Sort in reverse order.
    pub reverse: bool,
}

/// Server-Side Sorting request control (RFC 2891).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortRequest {
    pub keys: Vec<SortKey>,
    pub critical: bool,
}

impl SortRequest {
    pub(crate) fn encode_value(&self) -> Vec<u8> {
        let mut list = Packet::sequence();
        for key in &self.keys {
            let mut item = Packet::sequence().with_child(Packet::octet_string(key.attr.as_bytes()));
            if let Some(ref rule) = key.ordering_rule {
                item.push(Packet::primitive(
                    Class::Context,
                    0,
                    rule.clone().into_bytes(),
                ));
            }
            if key.reverse {
                item.push(Packet::primitive(Class::Context, 1, vec![0xFF]));
            }
            list.push(item);
        }
        encode_value(&list)
    }
}

/// Server-Side Sorting response control (RFC 2891).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortResponse {
    /// Sort result code; zero on success.
    pub result: u32,
    /// The first attribute the server failed to sort by, if any.
    pub attr: Option<String>,
}

impl SortResponse {
    pub(crate) fn decode(_critical: bool, value: Option<Vec<u8>>) -> Result<Control> {
        let pkt = parse_value(value)?;
        let children = pkt
            .children()
            .ok_or(LdapError::Decoding("sort response value"))?;
        let result = children
            .first()
            .and_then(|p| p.read_uint())
            .ok_or(LdapError::Decoding("sort result code"))? as u32;
        let attr = match children.get(1) {
            Some(p) if p.has_tag(Class::Context, 0) => Some(
                p.as_str()
                    .ok_or(LdapError::Decoding("sort attribute type"))?
                    .to_owned(),
            ),
            Some(_) => return Err(LdapError::Decoding("sort response element")),
            None => None,
        };
        Ok(Control::SortResponse(SortResponse { result, attr }))
    }
}
