use super::Exop;

pub const STARTTLS_OID: &str = "1.3.6.1.4.1.1466.20037";

/// StartTLS extended operation (RFC 4511, section 4.14).
///
/// On success the connection machinery swaps the plain transport for a
/// TLS-wrapped one in place. The operation is only valid while nothing else
/// is in flight, which is why the library issues it exclusively during
/// connection setup, before the handle is handed to the caller.
#[derive(Clone, Debug)]
pub struct StartTls;

impl From<StartTls> for Exop {
    fn from(_: StartTls) -> Exop {
        Exop {
            name: Some(String::from(STARTTLS_OID)),
            val: None,
        }
    }
}
