//! Operation results and the library error type.
//!
//! Every terminating LDAP response carries an [`LdapResult`](struct.LdapResult.html):
//! a numeric result code, the matched DN, a diagnostic message, and optional
//! referrals and response controls. Failures anywhere in the library surface
//! as [`LdapError`](enum.LdapError.html); each error maps to a coarse
//! [`ErrorKind`](enum.ErrorKind.html), which is what callers should branch on
//! when they don't care about the precise variant.

use std::error::Error;
use std::fmt;
use std::io;
use std::result::Result as StdResult;

use crate::controls::Control;
use crate::entry::Entry;
use crate::exop::Exop;
use crate::search::parse_refs;

use bertree::{Class, Packet, Universal};

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time;

/// Type alias for the standard `Result` with the fixed `LdapError` error part.
pub type Result<T> = std::result::Result<T, LdapError>;

/// Coarse classification of library failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The transport failed, was closed, or the session is gone.
    Network,
    /// Malformed BER, envelope, or control payload received from the server.
    Decoding,
    /// The client attempted to build an illegal PDU.
    Encoding,
    /// A filter string failed to compile.
    FilterCompile,
    /// A filter subtree received from the wire failed to decompile.
    FilterDecompile,
    /// API misuse.
    Usage,
    /// A server result code from the RFC 4511 table.
    Result,
    /// A server result code outside the defined table.
    Unknown,
}

/// Error variants recognized by the library.
#[derive(Debug, Error)]
pub enum LdapError {
    /// No path given for a `ldapi://` URL.
    #[error("empty Unix domain socket path")]
    EmptyUnixPath,

    /// A `ldapi://` URL contains a port spec, which it shouldn't.
    #[error("the port must be empty in the ldapi scheme")]
    PortInUnixPath,

    /// Encapsulated I/O error.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    /// The connection driver is gone; the session is closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Error while receiving operation results from the connection driver.
    #[error("result recv error: {source}")]
    ResultRecv {
        #[from]
        source: oneshot::error::RecvError,
    },

    /// Operation or connection timeout.
    #[error("timeout: {elapsed}")]
    Timeout {
        #[from]
        elapsed: time::error::Elapsed,
    },

    /// Error parsing the string representation of a search filter.
    #[error("filter compile error")]
    FilterCompile,

    /// Error reconstructing a filter from its wire form.
    #[error("filter decompile error")]
    FilterDecompile,

    /// Premature end of a search stream.
    #[error("premature end of search stream")]
    EndOfStream,

    /// The server terminated the session with a Notice of Disconnection.
    #[error("server terminated the session: {result}")]
    Disconnected { result: LdapResult },

    /// URL parsing error.
    #[error("url parse error: {source}")]
    UrlParsing {
        #[from]
        source: url::ParseError,
    },

    /// Unknown LDAP URL scheme.
    #[error("unknown LDAP URL scheme: {0}")]
    UnknownScheme(String),

    #[cfg(feature = "tls")]
    /// Native TLS library error.
    #[error("native TLS error: {source}")]
    NativeTLS {
        #[from]
        source: native_tls::Error,
    },

    /// Malformed data received from the server.
    #[error("malformed response: {0}")]
    Decoding(&'static str),

    /// Error converting an octet- or percent-decoded string to UTF-8.
    #[error("utf8 decoding error")]
    DecodingUTF8,

    /// The client attempted to build an illegal PDU.
    #[error("cannot encode request: {0}")]
    Encoding(String),

    /// API misuse.
    #[error("usage error: {0}")]
    Usage(String),

    /// LDAP operation result with an error return code.
    #[error("LDAP operation result: {result}")]
    OpResult {
        #[from]
        result: LdapResult,
    },
}

impl LdapError {
    /// The coarse kind of this error.
    pub fn kind(&self) -> ErrorKind {
        use LdapError::*;
        match self {
            Io { .. } | ConnectionClosed | ResultRecv { .. } | Timeout { .. } | EndOfStream
            | Disconnected { .. } => ErrorKind::Network,
            #[cfg(feature = "tls")]
            NativeTLS { .. } => ErrorKind::Network,
            Decoding(_) | DecodingUTF8 => ErrorKind::Decoding,
            Encoding(_) => ErrorKind::Encoding,
            FilterCompile => ErrorKind::FilterCompile,
            FilterDecompile => ErrorKind::FilterDecompile,
            EmptyUnixPath | PortInUnixPath | UrlParsing { .. } | UnknownScheme(_) | Usage(_) => {
                ErrorKind::Usage
            }
            OpResult { result } => {
                if result_name(result.rc).is_some() {
                    ErrorKind::Result
                } else {
                    ErrorKind::Unknown
                }
            }
        }
    }
}

impl From<LdapError> for io::Error {
    fn from(le: LdapError) -> io::Error {
        match le {
            LdapError::Io { source, .. } => source,
            _ => io::Error::new(io::ErrorKind::Other, format!("{}", le)),
        }
    }
}

/// Common components of an LDAP operation result.
///
/// The structure faithfully replicates the components dictated by the
/// standard, relying on numeric codes for the indication of outcome. The
/// [`success()`](#method.success) and [`non_error()`](#method.non_error)
/// helpers cover the usual cases of checking it.
#[derive(Clone, Debug)]
pub struct LdapResult {
    /// Result code. Zero is success; see RFC 4511, appendix A.1 for the rest.
    pub rc: u32,
    /// Matched component DN, where applicable.
    pub matched: String,
    /// Additional diagnostic text.
    pub text: String,
    /// Referrals. Absence is represented by an empty vector.
    pub refs: Vec<String>,
    /// Response controls. Missing and empty are both an empty vector.
    pub ctrls: Vec<Control>,
}

impl Error for LdapResult {}

impl fmt::Display for LdapResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> StdResult<(), fmt::Error> {
        write!(
            f,
            "rc={} ({}), dn: \"{}\", text: \"{}\"",
            self.rc,
            result_name(self.rc).unwrap_or("unknown"),
            self.matched,
            self.text
        )
    }
}

impl Default for LdapResult {
    fn default() -> LdapResult {
        LdapResult::synthetic(0, "")
    }
}

/// The RFC 4511 appendix A.1 result code table, plus the client-side code
/// this library synthesizes for cancelled streams (88, abandoned).
pub fn result_name(rc: u32) -> Option<&'static str> {
    Some(match rc {
        0 => "success",
        1 => "operationsError",
        2 => "protocolError",
        3 => "timeLimitExceeded",
        4 => "sizeLimitExceeded",
        5 => "compareFalse",
        6 => "compareTrue",
        7 => "authMethodNotSupported",
        8 => "strongerAuthRequired",
        10 => "referral",
        11 => "adminLimitExceeded",
        12 => "unavailableCriticalExtension",
        13 => "confidentialityRequired",
        14 => "saslBindInProgress",
        16 => "noSuchAttribute",
        17 => "undefinedAttributeType",
        18 => "inappropriateMatching",
        19 => "constraintViolation",
        20 => "attributeOrValueExists",
        21 => "invalidAttributeSyntax",
        32 => "noSuchObject",
        33 => "aliasProblem",
        34 => "invalidDNSyntax",
        36 => "aliasDereferencingProblem",
        48 => "inappropriateAuthentication",
        49 => "invalidCredentials",
        50 => "insufficientAccessRights",
        51 => "busy",
        52 => "unavailable",
        53 => "unwillingToPerform",
        54 => "loopDetect",
        64 => "namingViolation",
        65 => "objectClassViolation",
        66 => "notAllowedOnNonLeaf",
        67 => "notAllowedOnRDN",
        68 => "entryAlreadyExists",
        69 => "objectClassModsProhibited",
        71 => "affectsMultipleDSAs",
        80 => "other",
        88 => "abandoned",
        122 => "assertionFailed",
        _ => return None,
    })
}

impl LdapResult {
    /// If the result code is zero, return the instance itself wrapped
    /// in `Ok()`, otherwise wrap the instance in an `LdapError`.
    pub fn success(self) -> Result<Self> {
        if self.rc == 0 {
            Ok(self)
        } else {
            Err(LdapError::from(self))
        }
    }

    /// If the result code is 0 or 10 (referral), return the instance
    /// itself wrapped in `Ok()`, otherwise wrap the instance in an
    /// `LdapError`.
    pub fn non_error(self) -> Result<Self> {
        if self.rc == 0 || self.rc == 10 {
            Ok(self)
        } else {
            Err(LdapError::from(self))
        }
    }

    pub(crate) fn synthetic(rc: u32, text: &str) -> LdapResult {
        LdapResult {
            rc,
            matched: String::new(),
            text: String::from(text),
            refs: vec![],
            ctrls: vec![],
        }
    }
}

/// Decoded form of a terminating response PDU: the shared LDAPResult
/// components plus the fields specific to bind and extended responses.
#[derive(Clone, Debug)]
pub(crate) struct RawResponse {
    pub result: LdapResult,
    pub exop: Exop,
    pub sasl_creds: Option<Vec<u8>>,
}

impl RawResponse {
    /// Synthetic success, used for operations the driver completes locally
    /// (unbind, abandon).
    pub(crate) fn local_success() -> RawResponse {
        RawResponse {
            result: LdapResult::synthetic(0, ""),
            exop: Exop {
                name: None,
                val: None,
            },
            sasl_creds: None,
        }
    }

    /// Parse a terminating response PDU. The operation packet is a
    /// constructed [APPLICATION n] whose leading children are
    /// `ENUMERATED resultCode, OCTET STRING matchedDN, OCTET STRING
    /// diagnosticMessage`, followed by context-tagged extras: [3] referral,
    /// [7] serverSaslCreds, [10] responseName, [11] responseValue.
    pub(crate) fn parse(op: Packet) -> Result<RawResponse> {
        let mut children = op
            .into_children()
            .ok_or(LdapError::Decoding("result PDU is not constructed"))?
            .into_iter();
        let rc = children
            .next()
            .filter(|p| p.has_tag(Class::Universal, Universal::Enumerated as u64))
            .and_then(|p| p.read_uint())
            .ok_or(LdapError::Decoding("missing result code"))? as u32;
        let matched = children
            .next()
            .and_then(|p| p.into_bytes())
            .map(String::from_utf8)
            .ok_or(LdapError::Decoding("missing matched DN"))?
            .map_err(|_| LdapError::DecodingUTF8)?;
        let text = children
            .next()
            .and_then(|p| p.into_bytes())
            .map(String::from_utf8)
            .ok_or(LdapError::Decoding("missing diagnostic message"))?
            .map_err(|_| LdapError::DecodingUTF8)?;
        let mut refs = Vec::new();
        let mut exop_name = None;
        let mut exop_val = None;
        let mut sasl_creds = None;
        for extra in children {
            if extra.class != Class::Context {
                continue;
            }
            match extra.tag {
                3 => refs.extend(parse_refs(extra)?),
                7 => {
                    sasl_creds = Some(
                        extra
                            .into_bytes()
                            .ok_or(LdapError::Decoding("constructed serverSaslCreds"))?,
                    )
                }
                10 => {
                    exop_name = Some(
                        extra
                            .into_bytes()
                            .map(String::from_utf8)
                            .ok_or(LdapError::Decoding("constructed responseName"))?
                            .map_err(|_| LdapError::DecodingUTF8)?,
                    )
                }
                11 => {
                    exop_val = Some(
                        extra
                            .into_bytes()
                            .ok_or(LdapError::Decoding("constructed responseValue"))?,
                    )
                }
                _ => (),
            }
        }
        Ok(RawResponse {
            result: LdapResult {
                rc,
                matched,
                text,
                refs,
                ctrls: vec![],
            },
            exop: Exop {
                name: exop_name,
                val: exop_val,
            },
            sasl_creds,
        })
    }
}

/// Result of a Search operation which returns all data at once.
#[derive(Clone, Debug, Default)]
pub struct SearchResult {
    /// Entries, in the order the server returned them.
    pub entries: Vec<Entry>,
    /// Continuation references, in the order the server returned them.
    pub referrals: Vec<String>,
    /// The terminating result, with any attached response controls.
    pub res: LdapResult,
}

impl SearchResult {
    /// If the result code is zero, return the instance wrapped in `Ok()`,
    /// otherwise wrap the `LdapResult` part in an `LdapError`.
    pub fn success(self) -> Result<SearchResult> {
        if self.res.rc == 0 {
            Ok(self)
        } else {
            Err(LdapError::from(self.res))
        }
    }

    /// Like [`success()`](#method.success), but also passing referral (10)
    /// results through.
    pub fn non_error(self) -> Result<SearchResult> {
        if self.res.rc == 0 || self.res.rc == 10 {
            Ok(self)
        } else {
            Err(LdapError::from(self.res))
        }
    }
}

/// Result of a Compare operation.
///
/// Compare uniquely has two non-zero codes for the outcome of a successful
/// comparison, 5 (compareFalse) and 6 (compareTrue).
#[derive(Clone, Debug)]
pub struct CompareResult(pub LdapResult);

impl CompareResult {
    /// If the result code is 5 or 6, return the corresponding boolean,
    /// otherwise wrap the `LdapResult` in an `LdapError`.
    pub fn equal(self) -> Result<bool> {
        match self.0.rc {
            5 => Ok(false),
            6 => Ok(true),
            _ => Err(LdapError::from(self.0)),
        }
    }

    /// If the result code is 5, 6, or 10 (referral), return the inner
    /// `LdapResult`, otherwise rewrap it in an `LdapError`.
    pub fn non_error(self) -> Result<LdapResult> {
        if matches!(self.0.rc, 5 | 6 | 10) {
            Ok(self.0)
        } else {
            Err(LdapError::from(self.0))
        }
    }
}

/// Result of an Extended operation: the response exop and the operation result.
#[derive(Clone, Debug)]
pub struct ExopResult(pub Exop, pub LdapResult);

impl ExopResult {
    /// If the result code is zero, return the components as a tuple wrapped
    /// in `Ok()`, otherwise wrap the `LdapResult` part in an `LdapError`.
    pub fn success(self) -> Result<(Exop, LdapResult)> {
        if self.1.rc == 0 {
            Ok((self.0, self.1))
        } else {
            Err(LdapError::from(self.1))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_known_code() {
        let res = LdapResult::synthetic(49, "invalid credentials");
        assert_eq!(
            format!("{}", res),
            "rc=49 (invalidCredentials), dn: \"\", text: \"invalid credentials\""
        );
    }

    #[test]
    fn kind_of_result_codes() {
        let err = LdapError::from(LdapResult::synthetic(4095, ""));
        assert_eq!(err.kind(), ErrorKind::Unknown);
        let err = LdapError::from(LdapResult::synthetic(32, ""));
        assert_eq!(err.kind(), ErrorKind::Result);
    }

    #[test]
    fn compare_outcomes() {
        assert!(!CompareResult(LdapResult::synthetic(5, "")).equal().unwrap());
        assert!(CompareResult(LdapResult::synthetic(6, "")).equal().unwrap());
        assert!(CompareResult(LdapResult::synthetic(49, "")).equal().is_err());
    }

    #[test]
    fn parse_result_pdu() {
        let op = Packet::constructed(Class::Application, 1)
            .with_child(Packet::enumerated(49))
            .with_child(Packet::octet_string("dc=example"))
            .with_child(Packet::octet_string("invalid credentials"));
        let raw = RawResponse::parse(op).unwrap();
        assert_eq!(raw.result.rc, 49);
        assert_eq!(raw.result.matched, "dc=example");
        assert_eq!(raw.result.text, "invalid credentials");
    }
}
