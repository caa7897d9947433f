//! Request and response controls.
//!
//! A control is an OID-tagged extension attached to a request or a response.
//! The controls implemented by this library are the variants of
//! [`Control`](enum.Control.html); everything else decodes to
//! [`Control::Generic`](enum.Control.html#variant.Generic) with the raw
//! value preserved, so unknown response controls are never lost.
//!
//! Request controls are attached with
//! [`Ldap::with_controls()`](../struct.Ldap.html#method.with_controls) or
//! through the `controls` field of a
//! [`SearchRequest`](../struct.SearchRequest.html). Response controls arrive
//! in the `ctrls` vector of [`LdapResult`](../result/struct.LdapResult.html).
//! The password-policy family is decode-only; attaching one of those to a
//! request is a usage error.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::result::{LdapError, Result};

use bertree::{read, write, Class, Packet, Universal};

mod marker;
mod paging;
mod ppolicy;
mod sorting;
mod vlv;

pub use marker::{ManageDsaIt, SubtreeDelete, MANAGE_DSA_IT_OID, SUBTREE_DELETE_OID};
pub use paging::{Paging, PAGING_OID};
pub use ppolicy::{
    PasswordExpiring, PasswordMustChange, PasswordPolicy, PasswordPolicyError,
    PasswordPolicyWarning, PASSWORD_EXPIRING_OID, PASSWORD_MUST_CHANGE_OID, PASSWORD_POLICY_OID,
};
pub use sorting::{SortKey, SortRequest, SortResponse, SORT_REQUEST_OID, SORT_RESPONSE_OID};
pub use vlv::{VlvRequest, VlvResponse, VlvTarget, VLV_REQUEST_OID, VLV_RESPONSE_OID};

/// A control recognized or carried by this library.
#[derive(Clone, Debug, PartialEq)]
pub enum Control {
    /// Simple Paged Results (RFC 2696).
    Paging(Paging),
    /// ManageDsaIT (RFC 3296): treat referral objects as regular entries.
    ManageDsaIt(ManageDsaIt),
    /// Subtree Delete: delete an entire subtree with one Delete operation.
    SubtreeDelete(SubtreeDelete),
    /// Server-Side Sorting request (RFC 2891).
    SortRequest(SortRequest),
    /// Server-Side Sorting response (RFC 2891).
    SortResponse(SortResponse),
    /// Virtual List View request.
    VlvRequest(VlvRequest),
    /// Virtual List View response.
    VlvResponse(VlvResponse),
    /// Behera password policy response.
    PasswordPolicy(PasswordPolicy),
    /// Legacy VChu "password must change" response.
    PasswordMustChange(PasswordMustChange),
    /// Legacy VChu password expiry warning response.
    PasswordExpiring(PasswordExpiring),
    /// Any control with an OID this library doesn't recognize.
    Generic(GenericControl),
}

/// An unrecognized control, raw value preserved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenericControl {
    /// OID of the control.
    pub oid: String,
    /// Criticality; meaningless on responses.
    pub critical: bool,
    /// Raw control value, if any.
    pub value: Option<Vec<u8>>,
}

impl Control {
    /// The OID identifying this control on the wire.
    pub fn oid(&self) -> &str {
        match *self {
            Control::Paging(_) => PAGING_OID,
            Control::ManageDsaIt(_) => MANAGE_DSA_IT_OID,
            Control::SubtreeDelete(_) => SUBTREE_DELETE_OID,
            Control::SortRequest(_) => SORT_REQUEST_OID,
            Control::SortResponse(_) => SORT_RESPONSE_OID,
            Control::VlvRequest(_) => VLV_REQUEST_OID,
            Control::VlvResponse(_) => VLV_RESPONSE_OID,
            Control::PasswordPolicy(_) => PASSWORD_POLICY_OID,
            Control::PasswordMustChange(_) => PASSWORD_MUST_CHANGE_OID,
            Control::PasswordExpiring(_) => PASSWORD_EXPIRING_OID,
            Control::Generic(ref c) => &c.oid,
        }
    }

    /// Encode the control for attachment to a request.
    pub(crate) fn encode(&self) -> Result<Packet> {
        let (critical, value) = match *self {
            Control::Paging(ref c) => (false, Some(c.encode_value())),
            Control::ManageDsaIt(ref c) => (c.critical, None),
            Control::SubtreeDelete(ref c) => (c.critical, None),
            Control::SortRequest(ref c) => (c.critical, Some(c.encode_value())),
            Control::VlvRequest(ref c) => (c.critical, Some(c.encode_value())),
            Control::Generic(ref c) => (c.critical, c.value.clone()),
            Control::SortResponse(_)
            | Control::VlvResponse(_)
            | Control::PasswordPolicy(_)
            | Control::PasswordMustChange(_)
            | Control::PasswordExpiring(_) => {
                return Err(LdapError::Usage(format!(
                    "control {} is decode-only",
                    self.oid()
                )));
            }
        };
        let mut pkt = Packet::sequence().with_child(Packet::octet_string(self.oid()));
        if critical {
            pkt.push(Packet::boolean(true));
        }
        if let Some(value) = value {
            pkt.push(Packet::octet_string(value));
        }
        Ok(pkt)
    }
}

type ControlDecoder = fn(bool, Option<Vec<u8>>) -> Result<Control>;

static DECODERS: LazyLock<HashMap<&'static str, ControlDecoder>> = LazyLock::new(|| {
    HashMap::from([
        (PAGING_OID, Paging::decode as ControlDecoder),
        (MANAGE_DSA_IT_OID, ManageDsaIt::decode as ControlDecoder),
        (SUBTREE_DELETE_OID, SubtreeDelete::decode as ControlDecoder),
        (SORT_RESPONSE_OID, SortResponse::decode as ControlDecoder),
        (VLV_RESPONSE_OID, VlvResponse::decode as ControlDecoder),
        (PASSWORD_POLICY_OID, PasswordPolicy::decode as ControlDecoder),
        (
            PASSWORD_MUST_CHANGE_OID,
            PasswordMustChange::decode as ControlDecoder,
        ),
        (
            PASSWORD_EXPIRING_OID,
            PasswordExpiring::decode as ControlDecoder,
        ),
    ])
});

/// Decode one element of a response's control list:
/// `SEQUENCE { controlType, criticality BOOLEAN DEFAULT FALSE,
/// controlValue OCTET STRING OPTIONAL }`.
pub(crate) fn decode_control(raw: Packet) -> Result<Control> {
    let mut parts = raw
        .into_children()
        .ok_or(LdapError::Decoding("control is not constructed"))?
        .into_iter();
    let oid = parts
        .next()
        .and_then(|p| p.into_bytes())
        .map(String::from_utf8)
        .ok_or(LdapError::Decoding("missing control OID"))?
        .map_err(|_| LdapError::DecodingUTF8)?;
    let mut critical = false;
    let mut value = None;
    for part in parts {
        if part.has_tag(Class::Universal, Universal::Boolean as u64) {
            critical = part
                .read_bool()
                .ok_or(LdapError::Decoding("malformed criticality"))?;
        } else if part.has_tag(Class::Universal, Universal::OctetString as u64) {
            value = part.into_bytes();
        } else {
            return Err(LdapError::Decoding("unexpected control element"));
        }
    }
    match DECODERS.get(oid.as_str()) {
        Some(decoder) => decoder(critical, value),
        None => Ok(Control::Generic(GenericControl {
            oid,
            critical,
            value,
        })),
    }
}

// Shared helpers for the per-control modules.

fn encode_value(pkt: &Packet) -> Vec<u8> {
    write::encode_to_vec(pkt).expect("control value")
}

fn parse_value(value: Option<Vec<u8>>) -> Result<Packet> {
    let value = value.ok_or(LdapError::Decoding("missing control value"))?;
    match read::parse_packet(&value) {
        Ok((rest, pkt)) if rest.is_empty() => Ok(pkt),
        _ => Err(LdapError::Decoding("malformed control value")),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn round_trip(ctrl: &Control) -> Control {
        decode_control(ctrl.encode().unwrap()).unwrap()
    }

    #[test]
    fn paging_encode_bytes() {
        let ctrl = Control::Paging(Paging {
            size: 42,
            cookie: b"test".to_vec(),
        });
        let bytes = write::encode_to_vec(&ctrl.encode().unwrap()).unwrap();
        let mut expected = vec![0x30, 0x25, 0x04, 0x16];
        expected.extend_from_slice(b"1.2.840.113556.1.4.319");
        expected.extend_from_slice(&[0x04, 0x0B, 0x30, 0x09, 0x02, 0x01, 0x2A, 0x04, 0x04]);
        expected.extend_from_slice(b"test");
        assert_eq!(bytes, expected);
    }

    #[test]
    fn paging_round_trip() {
        let ctrl = Control::Paging(Paging {
            size: 500,
            cookie: b"opaque".to_vec(),
        });
        assert_eq!(round_trip(&ctrl), ctrl);
    }

    #[test]
    fn marker_controls() {
        let ctrl = Control::ManageDsaIt(ManageDsaIt { critical: true });
        assert_eq!(round_trip(&ctrl), ctrl);
        let ctrl = Control::SubtreeDelete(SubtreeDelete { critical: false });
        assert_eq!(round_trip(&ctrl), ctrl);
    }

    #[test]
    fn sort_request_encodes_response_decodes() {
        let req = Control::SortRequest(SortRequest {
            keys: vec![
                SortKey {
                    attr: "cn".into(),
                    ordering_rule: None,
                    reverse: false,
                },
                SortKey {
                    attr: "sn".into(),
                    ordering_rule: Some("2.5.13.3".into()),
                    reverse: true,
                },
            ],
            critical: false,
        });
        req.encode().unwrap();

        let value = encode_value(
            &Packet::sequence()
                .with_child(Packet::enumerated(0))
                .with_child(Packet::primitive(Class::Context, 0, b"cn".to_vec())),
        );
        let decoded = SortResponse::decode(false, Some(value)).unwrap();
        assert_eq!(
            decoded,
            Control::SortResponse(SortResponse {
                result: 0,
                attr: Some("cn".into()),
            })
        );
    }

    #[test]
    fn vlv_round_trip_request_value() {
        let req = VlvRequest {
            before: 0,
            after: 9,
            target: VlvTarget::Offset {
                offset: 1,
                content_count: 0,
            },
            context_id: None,
            critical: false,
        };
        let pkt = Control::VlvRequest(req).encode().unwrap();
        // value is a SEQUENCE { 0, 9, [0] { 1, 0 } }
        let value = pkt.children().unwrap()[1].bytes().unwrap().to_vec();
        let inner = parse_value(Some(value)).unwrap();
        assert_eq!(inner.children().unwrap().len(), 3);
    }

    #[test]
    fn vlv_response_decode() {
        let value = encode_value(
            &Packet::sequence()
                .with_child(Packet::integer(1))
                .with_child(Packet::integer(100))
                .with_child(Packet::enumerated(0))
                .with_child(Packet::octet_string("ctx")),
        );
        let decoded = VlvResponse::decode(false, Some(value)).unwrap();
        assert_eq!(
            decoded,
            Control::VlvResponse(VlvResponse {
                target_position: 1,
                content_count: 100,
                result: 0,
                context_id: Some(b"ctx".to_vec()),
            })
        );
    }

    #[test]
    fn behera_decode() {
        // warning [0] { graceAuthNsRemaining [1] 2 }, error [1] passwordExpired
        let value = encode_value(
            &Packet::sequence()
                .with_child(
                    Packet::constructed(Class::Context, 0)
                        .with_child(Packet::primitive(Class::Context, 1, vec![0x02])),
                )
                .with_child(Packet::primitive(Class::Context, 1, vec![0x00])),
        );
        let decoded = PasswordPolicy::decode(false, Some(value)).unwrap();
        assert_eq!(
            decoded,
            Control::PasswordPolicy(PasswordPolicy {
                warning: Some(PasswordPolicyWarning::GraceAuthnsRemaining(2)),
                error: Some(PasswordPolicyError::PasswordExpired),
            })
        );
    }

    #[test]
    fn vchu_decode() {
        let decoded = PasswordMustChange::decode(false, None).unwrap();
        assert_eq!(decoded, Control::PasswordMustChange(PasswordMustChange));
        let decoded = PasswordExpiring::decode(false, Some(b"1800".to_vec())).unwrap();
        assert_eq!(
            decoded,
            Control::PasswordExpiring(PasswordExpiring { seconds: 1800 })
        );
    }

    #[test]
    fn response_controls_refuse_encoding() {
        let err = Control::PasswordMustChange(PasswordMustChange)
            .encode()
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Usage);
    }

    #[test]
    fn unknown_oid_preserved() {
        let raw = Packet::sequence()
            .with_child(Packet::octet_string("1.2.3.4.5"))
            .with_child(Packet::boolean(true))
            .with_child(Packet::octet_string(vec![1, 2, 3]));
        let decoded = decode_control(raw).unwrap();
        assert_eq!(
            decoded,
            Control::Generic(GenericControl {
                oid: "1.2.3.4.5".into(),
                critical: true,
                value: Some(vec![1, 2, 3]),
            })
        );
    }
}
