use std::str;

use super::{Exop, ExopParser};
use crate::result::{LdapError, Result};

pub const WHOAMI_OID: &str = "1.3.6.1.4.1.4203.1.11.3";

/// Who Am I extended operation (RFC 4532).
///
/// Asks the server for the authorization identity of the current session.
#[derive(Clone, Debug)]
pub struct WhoAmI;

/// Who Am I response.
#[derive(Clone, Debug)]
pub struct WhoAmIResp {
    /// Authorization identity, e.g. `dn:uid=admin,dc=example,dc=org`.
    /// Empty for an anonymous session.
    pub authzid: String,
}

impl From<WhoAmI> for Exop {
    fn from(_: WhoAmI) -> Exop {
        Exop {
            name: Some(String::from(WHOAMI_OID)),
            val: None,
        }
    }
}

impl ExopParser for WhoAmIResp {
    const OID: &'static str = WHOAMI_OID;

    fn parse(val: &[u8]) -> Result<WhoAmIResp> {
        Ok(WhoAmIResp {
            authzid: str::from_utf8(val)
                .map_err(|_| LdapError::DecodingUTF8)?
                .to_owned(),
        })
    }
}
