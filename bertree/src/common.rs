/// BER tag class, held in the top two bits of the identifier octet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Class {
    /// Types defined by ASN.1 itself (INTEGER, OCTET STRING, ...).
    Universal = 0,
    /// Types defined by the enclosing protocol; LDAP operation PDUs.
    Application = 1,
    /// Context-specific tags, scoped to the enclosing constructed type.
    Context = 2,
    /// Privately assigned tags; unused by LDAP.
    Private = 3,
}

impl Class {
    pub fn from_u8(v: u8) -> Option<Class> {
        match v {
            0 => Some(Class::Universal),
            1 => Some(Class::Application),
            2 => Some(Class::Context),
            3 => Some(Class::Private),
            _ => None,
        }
    }
}
