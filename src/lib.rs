//! A pure-Rust LDAPv3 client library using the Tokio stack.
//!
//! ## Summary
//!
//! The library multiplexes any number of concurrent LDAP operations over a
//! single server connection. [`LdapConnection`](struct.LdapConnection.html)
//! owns the transport and must be spawned on the active Tokio executor;
//! [`Ldap`](struct.Ldap.html) is the cloneable handle operations are invoked
//! on. With the default __sync__ feature, [`LdapConn`](struct.LdapConn.html)
//! wraps both in a blocking interface.
//!
//! The documentation assumes familiarity with LDAP concepts and
//! terminology, which it won't attempt to explain.
//!
//! ## Compile-time features
//!
//! * __sync__ (enabled by default): the synchronous interface.
//!
//! * __tls__ (enabled by default): TLS support, backed by the `native-tls`
//!   crate. Enables the __ldaps__ scheme and StartTLS.
//!
//! Without any features, plain TCP connections (and Unix domain sockets on
//! Unix-like platforms) are available.
//!
//! ## Examples
//!
//! ### Asynchronous search
//!
//! ```rust,no_run
//! use ldapmux::{LdapConnection, Scope, SearchRequest};
//! use ldapmux::result::Result;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let (conn, mut ldap) = LdapConnection::new("ldap://localhost:2389").await?;
//!     ldapmux::drive!(conn);
//!     let req = SearchRequest::new("ou=Places,dc=example,dc=org", "(&(objectClass=locality)(l=ma*))")
//!         .scope(Scope::Subtree)
//!         .attrs(["l"]);
//!     let res = ldap.search(&req).await?.success()?;
//!     for entry in res.entries {
//!         println!("{:?}", entry);
//!     }
//!     ldap.unbind().await
//! }
//! ```
//!
//! ### Synchronous search
//!
//! ```rust,no_run
//! use ldapmux::{LdapConn, Scope, SearchRequest};
//! use ldapmux::result::Result;
//!
//! fn main() -> Result<()> {
//!     let mut ldap = LdapConn::new("ldap://localhost:2389")?;
//!     let req = SearchRequest::new("ou=Places,dc=example,dc=org", "(&(objectClass=locality)(l=ma*))")
//!         .scope(Scope::Subtree)
//!         .attrs(["l"]);
//!     let res = ldap.search(&req)?.success()?;
//!     for entry in res.entries {
//!         println!("{:?}", entry);
//!     }
//!     ldap.unbind()
//! }
//! ```

#[doc(hidden)]
#[macro_use]
pub extern crate log;
#[doc(hidden)]
pub use tokio;

/// Type alias for the LDAP message ID.
pub type MessageId = i32;

pub mod asn1 {
    //! The BER layer, re-exported for building custom controls and
    //! extended operations.
    pub use bertree::packet::{Body, Packet};
    pub use bertree::read::{parse_int, parse_packet, parse_uint};
    pub use bertree::write::{encode_into, encode_to_vec};
    pub use bertree::{Class, IResult, Universal};
}

mod conn;
pub mod controls;
mod entry;
pub mod exop;
mod filter;
mod ldap;
mod protocol;
pub mod result;
mod search;
#[cfg(feature = "sync")]
mod sync;
mod util;

pub use conn::{LdapConnection, LdapSettings};
pub use entry::{Attribute, Entry};
pub use filter::{parse as parse_filter, Filter};
pub use ldap::{IntoControls, Ldap, Mod};
pub use result::{
    CompareResult, ErrorKind, ExopResult, LdapError, LdapResult, SearchResult,
};
pub use search::{
    DerefAliases, Scope, SearchRequest, SearchStream, StreamItem, StreamState,
};
#[cfg(feature = "sync")]
pub use sync::{EntryStream, LdapConn};
pub use util::{dn_escape, ldap_escape, ldap_unescape};
