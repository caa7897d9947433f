use std::time::Duration;

use crate::conn::{LdapConnection, LdapSettings};
use crate::exop::Exop;
use crate::ldap::{IntoControls, Ldap, Mod};
use crate::result::{CompareResult, ExopResult, LdapResult, Result, SearchResult};
use crate::search::{SearchRequest, SearchStream, StreamItem, StreamState};
use crate::MessageId;

use tokio::runtime::{self, Runtime};
use url::Url;

/// Synchronous connection to an LDAP server.
///
/// A thin blocking wrapper: the structure encapsulates a single-threaded
/// Tokio runtime together with the connection and an operation handle, and
/// every method waits for its operation to finish. The API mirrors
/// [`Ldap`](struct.Ldap.html); unlike the asynchronous handle, `LdapConn` is
/// not cloneable, so multiplexing from several threads needs separate
/// connections.
#[cfg_attr(docsrs, doc(cfg(feature = "sync")))]
#[derive(Debug)]
pub struct LdapConn {
    rt: Runtime,
    ldap: Ldap,
}

impl LdapConn {
    /// Open a connection to an LDAP server specified by `url`.
    ///
    /// See [LdapConnection::new()](struct.LdapConnection.html#method.new)
    /// for the supported URL formats.
    pub fn new(url: &str) -> Result<Self> {
        Self::with_settings(LdapSettings::new(), url)
    }

    /// Open a connection to an LDAP server specified by `url`, using
    /// `settings` to specify additional parameters.
    pub fn with_settings(settings: LdapSettings, url: &str) -> Result<Self> {
        let url = Url::parse(url)?;
        Self::from_url_with_settings(settings, &url)
    }

    /// Open a connection to an LDAP server specified by an already parsed
    /// `Url`, using `settings` to specify additional parameters.
    pub fn from_url_with_settings(settings: LdapSettings, url: &Url) -> Result<Self> {
        let rt = runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let ldap = rt.block_on(async move {
            let (conn, ldap) = LdapConnection::from_url_with_settings(settings, url).await?;
            super::drive!(conn);
            Ok::<Ldap, crate::result::LdapError>(ldap)
        })?;
        Ok(LdapConn { rt, ldap })
    }

    /// See [`Ldap::with_controls()`](struct.Ldap.html#method.with_controls).
    pub fn with_controls<C: IntoControls>(&mut self, ctrls: C) -> &mut Self {
        self.ldap.controls = Some(ctrls.into_controls());
        self
    }

    /// See [`Ldap::with_timeout()`](struct.Ldap.html#method.with_timeout).
    pub fn with_timeout(&mut self, duration: Duration) -> &mut Self {
        self.ldap.timeout = Some(duration);
        self
    }

    /// See [`Ldap::simple_bind()`](struct.Ldap.html#method.simple_bind).
    pub fn simple_bind(&mut self, bind_dn: &str, bind_pw: &str) -> Result<LdapResult> {
        let ldap = &mut self.ldap;
        self.rt
            .block_on(async move { ldap.simple_bind(bind_dn, bind_pw).await })
    }

    /// See [`Ldap::sasl_external_bind()`](struct.Ldap.html#method.sasl_external_bind).
    pub fn sasl_external_bind(&mut self) -> Result<LdapResult> {
        let ldap = &mut self.ldap;
        self.rt.block_on(async move { ldap.sasl_external_bind().await })
    }

    /// See [`Ldap::search()`](struct.Ldap.html#method.search).
    pub fn search(&mut self, req: &SearchRequest) -> Result<SearchResult> {
        let ldap = &mut self.ldap;
        self.rt.block_on(async move { ldap.search(req).await })
    }

    /// See [`Ldap::search_paged()`](struct.Ldap.html#method.search_paged).
    pub fn search_paged(&mut self, req: &SearchRequest, page_size: i32) -> Result<SearchResult> {
        let ldap = &mut self.ldap;
        self.rt
            .block_on(async move { ldap.search_paged(req, page_size).await })
    }

    /// See [`Ldap::streaming_search()`](struct.Ldap.html#method.streaming_search).
    /// The returned stream borrows the connection until it is dropped.
    pub fn streaming_search(&mut self, req: &SearchRequest) -> Result<EntryStream<'_>> {
        let ldap = &mut self.ldap;
        let rt = &self.rt;
        let stream = rt.block_on(async move { ldap.streaming_search(req).await })?;
        Ok(EntryStream { stream, rt })
    }

    /// See [`Ldap::add()`](struct.Ldap.html#method.add).
    pub fn add<S: AsRef<[u8]>>(&mut self, dn: &str, attrs: Vec<(S, Vec<S>)>) -> Result<LdapResult> {
        let ldap = &mut self.ldap;
        self.rt.block_on(async move { ldap.add(dn, attrs).await })
    }

    /// See [`Ldap::compare()`](struct.Ldap.html#method.compare).
    pub fn compare<B: AsRef<[u8]>>(
        &mut self,
        dn: &str,
        attr: &str,
        val: B,
    ) -> Result<CompareResult> {
        let ldap = &mut self.ldap;
        self.rt
            .block_on(async move { ldap.compare(dn, attr, val).await })
    }

    /// See [`Ldap::delete()`](struct.Ldap.html#method.delete).
    pub fn delete(&mut self, dn: &str) -> Result<LdapResult> {
        let ldap = &mut self.ldap;
        self.rt.block_on(async move { ldap.delete(dn).await })
    }

    /// See [`Ldap::modify()`](struct.Ldap.html#method.modify).
    pub fn modify<S: AsRef<[u8]>>(&mut self, dn: &str, mods: Vec<Mod<S>>) -> Result<LdapResult> {
        let ldap = &mut self.ldap;
        self.rt.block_on(async move { ldap.modify(dn, mods).await })
    }

    /// See [`Ldap::modifydn()`](struct.Ldap.html#method.modifydn).
    pub fn modifydn(
        &mut self,
        dn: &str,
        rdn: &str,
        delete_old: bool,
        new_superior: Option<&str>,
    ) -> Result<LdapResult> {
        let ldap = &mut self.ldap;
        self.rt
            .block_on(async move { ldap.modifydn(dn, rdn, delete_old, new_superior).await })
    }

    /// See [`Ldap::extended()`](struct.Ldap.html#method.extended).
    pub fn extended<E>(&mut self, exop: E) -> Result<ExopResult>
    where
        E: Into<Exop>,
    {
        let ldap = &mut self.ldap;
        self.rt.block_on(async move { ldap.extended(exop).await })
    }

    /// See [`Ldap::unbind()`](struct.Ldap.html#method.unbind).
    pub fn unbind(&mut self) -> Result<()> {
        let ldap = &mut self.ldap;
        self.rt.block_on(async move { ldap.unbind().await })
    }

    /// See [`Ldap::abandon()`](struct.Ldap.html#method.abandon).
    pub fn abandon(&mut self, msgid: MessageId) -> Result<()> {
        let ldap = &mut self.ldap;
        self.rt.block_on(async move { ldap.abandon(msgid).await })
    }

    /// See [`Ldap::last_id()`](struct.Ldap.html#method.last_id).
    pub fn last_id(&self) -> MessageId {
        self.ldap.last_id()
    }

    /// See [`Ldap::is_closed()`](struct.Ldap.html#method.is_closed).
    pub fn is_closed(&self) -> bool {
        self.ldap.is_closed()
    }
}

/// Blocking handle for a streaming search.
#[cfg_attr(docsrs, doc(cfg(feature = "sync")))]
#[derive(Debug)]
pub struct EntryStream<'a> {
    stream: SearchStream,
    rt: &'a Runtime,
}

impl EntryStream<'_> {
    /// See [`SearchStream::next()`](struct.SearchStream.html#method.next).
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<StreamItem>> {
        let stream = &mut self.stream;
        self.rt.block_on(async move { stream.next().await })
    }

    /// See [`SearchStream::finish()`](struct.SearchStream.html#method.finish).
    pub fn finish(&mut self) -> LdapResult {
        let stream = &mut self.stream;
        self.rt.block_on(async move { stream.finish().await })
    }

    /// See [`SearchStream::state()`](struct.SearchStream.html#method.state).
    pub fn state(&self) -> StreamState {
        self.stream.state()
    }
}
