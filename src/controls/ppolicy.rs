//! Password-policy response controls. All of these are decode-only: the
//! server attaches them to Bind (and sometimes other) responses, and a
//! client has no business sending them.

use super::{parse_value, Control};
use crate::result::{LdapError, Result};

use bertree::Class;

pub const PASSWORD_POLICY_OID: &str = "1.3.6.1.4.1.42.2.27.8.5.1";
pub const PASSWORD_MUST_CHANGE_OID: &str = "2.16.840.1.113730.3.4.4";
pub const PASSWORD_EXPIRING_OID: &str = "2.16.840.1.113730.3.4.5";

/// Warning component of a Behera password policy response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PasswordPolicyWarning {
    /// Seconds until the password expires.
    TimeBeforeExpiration(i64),
    /// Grace binds remaining after expiry.
    GraceAuthnsRemaining(i64),
}

/// Error component of a Behera password policy response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PasswordPolicyError {
    PasswordExpired,
    AccountLocked,
    ChangeAfterReset,
    PasswordModNotAllowed,
    MustSupplyOldPassword,
    InsufficientPasswordQuality,
    PasswordTooShort,
    PasswordTooYoung,
    PasswordInHistory,
}

impl PasswordPolicyError {
    fn from_u64(v: u64) -> Option<PasswordPolicyError> {
        use PasswordPolicyError::*;
        Some(match v {
            0 => PasswordExpired,
            1 => AccountLocked,
            2 => ChangeAfterReset,
            3 => PasswordModNotAllowed,
            4 => MustSupplyOldPassword,
            5 => InsufficientPasswordQuality,
            6 => PasswordTooShort,
            7 => PasswordTooYoung,
            8 => PasswordInHistory,
            _ => return None,
        })
    }
}

/// Behera password policy response control
/// (draft-behera-ldap-password-policy).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub warning: Option<PasswordPolicyWarning>,
    pub error: Option<PasswordPolicyError>,
}

impl PasswordPolicy {
    pub(crate) fn decode(_critical: bool, value: Option<Vec<u8>>) -> Result<Control> {
        let pkt = parse_value(value)?;
        let mut ctrl = PasswordPolicy::default();
        for part in pkt
            .children()
            .ok_or(LdapError::Decoding("password policy value"))?
        {
            if part.class != Class::Context {
                return Err(LdapError::Decoding("password policy element"));
            }
            match part.tag {
                0 => {
                    // warning: an explicitly tagged CHOICE of two integers
                    let choice = match part.children() {
                        Some([choice]) => choice,
                        _ => return Err(LdapError::Decoding("password policy warning")),
                    };
                    let n = choice
                        .read_int()
                        .ok_or(LdapError::Decoding("password policy warning"))?;
                    ctrl.warning = Some(match choice.tag {
                        0 => PasswordPolicyWarning::TimeBeforeExpiration(n),
                        1 => PasswordPolicyWarning::GraceAuthnsRemaining(n),
                        _ => return Err(LdapError::Decoding("password policy warning")),
                    });
                }
                1 => {
                    ctrl.error = Some(
                        part.read_uint()
                            .and_then(PasswordPolicyError::from_u64)
                            .ok_or(LdapError::Decoding("password policy error"))?,
                    );
                }
                _ => return Err(LdapError::Decoding("password policy element")),
            }
        }
        Ok(Control::PasswordPolicy(ctrl))
    }
}

/// Legacy VChu "password must change" control
/// (draft-vchu-ldap-pwd-policy). Presence is the whole message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PasswordMustChange;

impl PasswordMustChange {
    pub(crate) fn decode(_critical: bool, _value: Option<Vec<u8>>) -> Result<Control> {
        Ok(Control::PasswordMustChange(PasswordMustChange))
    }
}

/// Legacy VChu password expiry warning. The value is the number of seconds
/// left, as a decimal string.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PasswordExpiring {
    pub seconds: i64,
}

impl PasswordExpiring {
    pub(crate) fn decode(_critical: bool, value: Option<Vec<u8>>) -> Result<Control> {
        let value = value.ok_or(LdapError::Decoding("missing expiry value"))?;
        let seconds = std::str::from_utf8(&value)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(LdapError::Decoding("malformed expiry value"))?;
        Ok(Control::PasswordExpiring(PasswordExpiring { seconds }))
    }
}
