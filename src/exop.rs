//! Extended operation construction and parsing.
//!
//! A generic exop is represented by [`Exop`](struct.Exop.html). Operations
//! implemented by the library have a request struct convertible into `Exop`
//! with `into()`, and, where the response carries data, a response struct
//! implementing [`ExopParser`](trait.ExopParser.html).

use crate::result::{LdapError, Result};

use bertree::{Class, Packet};

mod passmod;
mod starttls;
mod whoami;

pub use passmod::{PasswordModify, PasswordModifyResp, PASSWORD_MODIFY_OID};
pub use whoami::{WhoAmI, WhoAmIResp, WHOAMI_OID};

// Not part of the public interface: StartTLS is only valid while nothing
// else is in flight, so the connection setup path is its sole caller.
pub(crate) use starttls::StartTls;

/// A generic extended operation: the OID naming it, and an opaque value.
/// Requests and responses share this shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Exop {
    /// OID of the operation (requestName / responseName).
    pub name: Option<String>,
    /// Raw operation value, if any.
    pub val: Option<Vec<u8>>,
}

/// Conversion of a response exop value into an operation-specific struct.
pub trait ExopParser: Sized {
    /// OID of the operation this parser decodes. A response naming a
    /// different OID is rejected before the value is looked at.
    const OID: &'static str;

    /// Parse the raw response value.
    fn parse(val: &[u8]) -> Result<Self>;
}

impl Exop {
    /// Parse the response value with an operation-specific parser.
    ///
    /// It is a usage error to call this on a response without a value, or
    /// on a response whose `responseName` names a different operation than
    /// the parser's. Servers may omit the name; an absent name is accepted.
    pub fn parse<T: ExopParser>(&self) -> Result<T> {
        if let Some(ref name) = self.name {
            if name != T::OID {
                return Err(LdapError::Usage(format!(
                    "extended response names {}, expected {}",
                    name,
                    T::OID
                )));
            }
        }
        match self.val {
            Some(ref val) => T::parse(val),
            None => Err(LdapError::Usage(String::from(
                "no value in extended response",
            ))),
        }
    }
}

/// Children of an ExtendedRequest: `requestName [0]`, `requestValue [1]`.
pub(crate) fn construct_exop(exop: Exop) -> Vec<Packet> {
    let mut parts = Vec::with_capacity(2);
    if let Some(name) = exop.name {
        parts.push(Packet::primitive(Class::Context, 0, name.into_bytes()));
    }
    if let Some(val) = exop.val {
        parts.push(Packet::primitive(Class::Context, 1, val));
    }
    parts
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn parse_checks_response_name() {
        let resp = Exop {
            name: Some(String::from("1.2.3.4")),
            val: Some(b"dn:cn=admin".to_vec()),
        };
        let err = resp.parse::<WhoAmIResp>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);

        let resp = Exop {
            name: Some(String::from(WHOAMI_OID)),
            val: Some(b"dn:cn=admin".to_vec()),
        };
        assert_eq!(resp.parse::<WhoAmIResp>().unwrap().authzid, "dn:cn=admin");

        // servers commonly omit the responseName
        let resp = Exop {
            name: None,
            val: Some(b"dn:cn=admin".to_vec()),
        };
        assert_eq!(resp.parse::<WhoAmIResp>().unwrap().authzid, "dn:cn=admin");
    }

    #[test]
    fn parse_without_value_is_usage_error() {
        let resp = Exop {
            name: Some(String::from(WHOAMI_OID)),
            val: None,
        };
        assert_eq!(
            resp.parse::<WhoAmIResp>().unwrap_err().kind(),
            ErrorKind::Usage
        );
    }
}
