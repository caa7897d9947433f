use super::Control;
use crate::result::Result;

pub const MANAGE_DSA_IT_OID: &str = "2.16.840.1.113730.3.4.2";
pub const SUBTREE_DELETE_OID: &str = "1.2.840.113556.1.4.805";

/// ManageDsaIT control (RFC 3296). No value; its presence makes the server
/// return referral objects as ordinary entries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ManageDsaIt {
    pub critical: bool,
}

impl ManageDsaIt {
    pub(crate) fn decode(critical: bool, _value: Option<Vec<u8>>) -> Result<Control> {
        Ok(Control::ManageDsaIt(ManageDsaIt { critical }))
    }
}

/// Subtree Delete control (draft-armijo-ldap-treedelete). No value; attached
/// to a Delete operation it removes the whole subtree under the target DN.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubtreeDelete {
    pub critical: bool,
}

impl SubtreeDelete {
    pub(crate) fn decode(critical: bool, _value: Option<Vec<u8>>) -> Result<Control> {
        Ok(Control::SubtreeDelete(SubtreeDelete { critical }))
    }
}
