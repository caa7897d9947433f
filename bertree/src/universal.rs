/// Universal tag numbers for the ASN.1 types LDAP actually uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum Universal {
    Boolean = 1,
    Integer = 2,
    OctetString = 4,
    Enumerated = 10,
    Sequence = 16,
    Set = 17,
}
