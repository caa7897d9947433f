//! Tree-structured BER handling for LDAP.
//!
//! LDAPv3 frames every protocol message with the Basic Encoding Rules of
//! ASN.1, restricted to definite lengths. This crate models one BER node as a
//! [`Packet`](packet/struct.Packet.html): an identifier (class and tag
//! number) together with either primitive content octets or an ordered list
//! of child packets. The [`read`](read/index.html) module turns wire bytes
//! into packets with streaming `nom` parsers, and [`write`](write/index.html)
//! serializes a packet back into a byte buffer.
//!
//! The crate knows nothing about LDAP semantics; it is the framing layer
//! underneath an LDAP protocol implementation.

pub mod common;
pub mod packet;
pub mod read;
pub mod universal;
pub mod write;

pub use common::Class;
pub use packet::{Body, Packet};
pub use universal::Universal;

pub use nom::IResult;
