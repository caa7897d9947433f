use super::{Exop, ExopParser};
use crate::result::{LdapError, Result};

use bertree::{read, write, Class, Packet};

pub const PASSWORD_MODIFY_OID: &str = "1.3.6.1.4.1.4203.1.11.1";

/// Password Modify extended operation (RFC 3062).
///
/// All fields are optional; a server asked to change a password without
/// being given one will generate a password and return it in the response.
#[derive(Clone, Debug, Default)]
pub struct PasswordModify<'a> {
    /// Identity whose password is changed; the session's own when absent.
    pub user_id: Option<&'a str>,
    /// Current password.
    pub old_pass: Option<&'a str>,
    /// New password.
    pub new_pass: Option<&'a str>,
}

/// Password Modify response.
#[derive(Clone, Debug)]
pub struct PasswordModifyResp {
    /// Password generated by the server, if it was asked to.
    pub gen_password: Option<String>,
}

impl<'a> From<PasswordModify<'a>> for Exop {
    fn from(pm: PasswordModify) -> Exop {
        let mut value = Packet::sequence();
        if let Some(user_id) = pm.user_id {
            value.push(Packet::primitive(Class::Context, 0, user_id.into()));
        }
        if let Some(old_pass) = pm.old_pass {
            value.push(Packet::primitive(Class::Context, 1, old_pass.into()));
        }
        if let Some(new_pass) = pm.new_pass {
            value.push(Packet::primitive(Class::Context, 2, new_pass.into()));
        }
        Exop {
            name: Some(String::from(PASSWORD_MODIFY_OID)),
            val: Some(write::encode_to_vec(&value).expect("encoded value")),
        }
    }
}

impl ExopParser for PasswordModifyResp {
    const OID: &'static str = PASSWORD_MODIFY_OID;

    fn parse(val: &[u8]) -> Result<PasswordModifyResp> {
        let pkt = match read::parse_packet(val) {
            Ok((rest, pkt)) if rest.is_empty() => pkt,
            _ => return Err(LdapError::Decoding("password modify response")),
        };
        let mut gen_password = None;
        for part in pkt
            .children()
            .ok_or(LdapError::Decoding("password modify response"))?
        {
            if part.has_tag(Class::Context, 0) {
                gen_password = Some(
                    part.as_str()
                        .ok_or(LdapError::Decoding("generated password"))?
                        .to_owned(),
                );
            }
        }
        Ok(PasswordModifyResp { gen_password })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn request_value_shape() {
        let exop: Exop = PasswordModify {
            user_id: Some("uid=a,dc=x"),
            old_pass: Some("old"),
            new_pass: Some("new"),
        }
        .into();
        let val = exop.val.unwrap();
        let (_, pkt) = read::parse_packet(&val).unwrap();
        let children = pkt.children().unwrap();
        assert_eq!(children.len(), 3);
        assert!(children[0].has_tag(Class::Context, 0));
        assert!(children[2].has_tag(Class::Context, 2));
    }

    #[test]
    fn response_with_generated_password() {
        let val = write::encode_to_vec(
            &Packet::sequence().with_child(Packet::primitive(Class::Context, 0, b"s3cret".to_vec())),
        )
        .unwrap();
        let resp = PasswordModifyResp::parse(&val).unwrap();
        assert_eq!(resp.gen_password.as_deref(), Some("s3cret"));
    }
}
