use super::{encode_value, parse_value, Control};
use crate::result::{LdapError, Result};

use bertree::Packet;

pub const PAGING_OID: &str = "1.2.840.113556.1.4.319";

/// Simple Paged Results control (RFC 2696).
///
/// The same shape serves as request and response. A client starts with the
/// desired page size and an empty cookie; after each page it copies the
/// server-returned cookie into the next request. An empty returned cookie
/// means the result set is exhausted. To abandon a paged search early, send
/// one more request with `size` 0 and the last cookie.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Paging {
    /// Requested page size; in a response, the server's result set estimate.
    pub size: i32,
    /// Opaque paging cookie.
    pub cookie: Vec<u8>,
}

impl Paging {
    /// A first-page control with the given page size.
    pub fn new(size: i32) -> Paging {
        Paging {
            size,
            cookie: Vec::new(),
        }
    }

    pub(crate) fn encode_value(&self) -> Vec<u8> {
        encode_value(
            &Packet::sequence()
                .with_child(Packet::integer(i64::from(self.size)))
                .with_child(Packet::octet_string(self.cookie.as_slice())),
        )
    }

    pub(crate) fn decode(_critical: bool, value: Option<Vec<u8>>) -> Result<Control> {
        let pkt = parse_value(value)?;
        match pkt.children() {
            Some([size, cookie]) => Ok(Control::Paging(Paging {
                size: size
                    .read_int()
                    .ok_or(LdapError::Decoding("paging size"))? as i32,
                cookie: cookie
                    .bytes()
                    .ok_or(LdapError::Decoding("paging cookie"))?
                    .to_vec(),
            })),
            _ => Err(LdapError::Decoding("paging control value")),
        }
    }
}
