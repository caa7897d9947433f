use std::time::Duration;

use crate::controls::{Control, Paging};
use crate::entry::Entry;
use crate::filter;
use crate::ldap::Ldap;
use crate::protocol::{app_tags, LdapOp, SearchItemReceiver, SEARCH_QUEUE_DEPTH};
use crate::result::{LdapError, LdapResult, RawResponse, Result, SearchResult};

use bertree::{Class, Packet};

use tokio::sync::mpsc;
use tokio::time;

/// Possible values for search scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    /// Base object; search only the object named in the base DN.
    Base = 0,
    /// Search the objects immediately below the base DN.
    OneLevel = 1,
    /// Search the object named in the base DN and the whole subtree below it.
    Subtree = 2,
}

/// Possible values for alias dereferencing during search.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DerefAliases {
    /// Never dereference.
    #[default]
    Never = 0,
    /// Dereference while retrieving objects according to search scope.
    Searching = 1,
    /// Dereference while finding the base object.
    Finding = 2,
    /// Always dereference.
    Always = 3,
}

/// Parameters of a Search operation.
///
/// Only the base DN and the filter have no usable defaults; everything else
/// can be adjusted through the builder methods. The attribute list selects
/// which attributes entries carry: empty means all user attributes, and the
/// special name `1.1` requests no attributes at all.
#[derive(Clone, Debug)]
pub struct SearchRequest {
    pub base: String,
    pub scope: Scope,
    pub deref: DerefAliases,
    /// Maximum number of entries; 0 is unbounded.
    pub size_limit: i32,
    /// Server-side time limit in seconds; 0 is unbounded.
    pub time_limit: i32,
    /// Return attribute names only, without values.
    pub types_only: bool,
    /// Filter in RFC 4515 string syntax; compiled when the request is sent.
    pub filter: String,
    pub attrs: Vec<String>,
    /// Controls attached to every request built from this value.
    pub controls: Vec<Control>,
}

impl SearchRequest {
    /// A subtree search with the given base and filter, no alias
    /// dereferencing, no limits, and the full attribute set.
    pub fn new<S: Into<String>, F: Into<String>>(base: S, filter: F) -> SearchRequest {
        SearchRequest {
            base: base.into(),
            scope: Scope::Subtree,
            deref: DerefAliases::Never,
            size_limit: 0,
            time_limit: 0,
            types_only: false,
            filter: filter.into(),
            attrs: vec![],
            controls: vec![],
        }
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn deref(mut self, deref: DerefAliases) -> Self {
        self.deref = deref;
        self
    }

    pub fn size_limit(mut self, limit: i32) -> Self {
        self.size_limit = limit;
        self
    }

    pub fn time_limit(mut self, limit: i32) -> Self {
        self.time_limit = limit;
        self
    }

    pub fn types_only(mut self, types_only: bool) -> Self {
        self.types_only = types_only;
        self
    }

    pub fn attrs<S: Into<String>, A: IntoIterator<Item = S>>(mut self, attrs: A) -> Self {
        self.attrs = attrs.into_iter().map(S::into).collect();
        self
    }

    pub fn controls<C: IntoIterator<Item = Control>>(mut self, controls: C) -> Self {
        self.controls = controls.into_iter().collect();
        self
    }

    pub(crate) fn to_packet(&self) -> Result<Packet> {
        let compiled = filter::parse(&self.filter)?;
        let mut attrs = Packet::sequence();
        for attr in &self.attrs {
            attrs.push(Packet::octet_string(attr.as_bytes()));
        }
        Ok(
            Packet::constructed(Class::Application, app_tags::SEARCH_REQUEST)
                .with_child(Packet::octet_string(self.base.as_bytes()))
                .with_child(Packet::enumerated(self.scope as i64))
                .with_child(Packet::enumerated(self.deref as i64))
                .with_child(Packet::integer(i64::from(self.size_limit)))
                .with_child(Packet::integer(i64::from(self.time_limit)))
                .with_child(Packet::boolean(self.types_only))
                .with_child(compiled.to_packet())
                .with_child(attrs),
        )
    }
}

/// An inbound search PDU, classified by the driver.
#[derive(Debug)]
pub(crate) enum SearchItem {
    Entry(Packet),
    Referral(Packet),
    Done(Packet),
}

/// One delivered element of a search stream.
#[derive(Clone, Debug)]
pub enum StreamItem {
    /// A result entry.
    Entry(Entry),
    /// The continuation references carried by one SearchResultReference PDU.
    Referral(Vec<String>),
}

/// Possible states of a [`SearchStream`](struct.SearchStream.html).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StreamState {
    /// Created, request not yet on the wire.
    Fresh,
    /// Request sent; items can be retrieved with `next()`.
    Active,
    /// The terminal SearchResultDone has been seen.
    Done,
    /// Finalized by `finish()`.
    Closed,
    /// A fallible operation failed.
    Error,
}

/// Handle for a streaming search.
///
/// Entries are delivered one by one through [`next()`](#method.next) until
/// it returns `Ok(None)`; the overall result is then collected with
/// [`finish()`](#method.finish). The delivery queue between the connection
/// driver and the stream is bounded: a consumer that stops reading
/// eventually blocks the driver, and with it every other operation on the
/// connection. Either drain the stream or call `finish()`, which abandons
/// the operation on the server if the terminal message hasn't arrived.
#[derive(Debug)]
pub struct SearchStream {
    ldap: Ldap,
    rx: Option<SearchItemReceiver>,
    state: StreamState,
    timeout: Option<Duration>,
    /// The terminal result, once the stream has seen it.
    pub res: Option<LdapResult>,
}

impl SearchStream {
    pub(crate) async fn start(mut ldap: Ldap, req: &SearchRequest) -> Result<SearchStream> {
        let pkt = req.to_packet()?;
        let mut controls = req.controls.clone();
        if let Some(extra) = ldap.controls.take() {
            controls.extend(extra);
        }
        if !controls.is_empty() {
            ldap.controls = Some(controls);
        }
        let timeout = ldap.timeout.or(ldap.op_timeout);
        let (tx, rx) = mpsc::channel(SEARCH_QUEUE_DEPTH);
        let mut stream = SearchStream {
            ldap,
            rx: Some(rx),
            state: StreamState::Fresh,
            timeout,
            res: None,
        };
        match stream.ldap.op_call(LdapOp::Search(tx), pkt).await {
            Ok(_) => {
                stream.state = StreamState::Active;
                Ok(stream)
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch the next item from the result stream.
    ///
    /// Returns `Ok(None)` at the end of the stream.
    #[allow(clippy::should_implement_trait)]
    pub async fn next(&mut self) -> Result<Option<StreamItem>> {
        if self.state != StreamState::Active {
            return Ok(None);
        }
        let rx = self.rx.as_mut().expect("active stream has a queue");
        let item = if let Some(timeout) = self.timeout {
            let res = time::timeout(timeout, rx.recv()).await;
            if res.is_err() {
                let _ = self.ldap.scrub_tx.send(self.ldap.last_id);
                self.state = StreamState::Error;
            }
            res?
        } else {
            rx.recv().await
        };
        let (item, ctrls) = match item {
            Some(item) => item,
            None => {
                // driver gone before SearchResultDone
                self.rx = None;
                self.state = StreamState::Error;
                return Err(LdapError::EndOfStream);
            }
        };
        match item {
            SearchItem::Entry(pkt) => match Entry::from_packet(pkt) {
                Ok(entry) => Ok(Some(StreamItem::Entry(entry))),
                Err(e) => {
                    self.state = StreamState::Error;
                    Err(e)
                }
            },
            SearchItem::Referral(pkt) => match parse_refs(pkt) {
                Ok(refs) => Ok(Some(StreamItem::Referral(refs))),
                Err(e) => {
                    self.state = StreamState::Error;
                    Err(e)
                }
            },
            SearchItem::Done(pkt) => {
                let mut raw = RawResponse::parse(pkt)?;
                raw.result.ctrls = ctrls;
                self.res = Some(raw.result);
                self.rx = None;
                self.state = StreamState::Done;
                Ok(None)
            }
        }
    }

    /// Return the overall result of the search and finalize the stream.
    ///
    /// When the stream has been read to the end, this is the result the
    /// server sent. Otherwise the operation is abandoned on the server and a
    /// synthetic rc=88 result is returned.
    pub async fn finish(&mut self) -> LdapResult {
        if self.state == StreamState::Closed {
            return LdapResult::synthetic(80, "stream already finalized");
        }
        if self.state != StreamState::Done {
            // Drop the queue first: the driver may be blocked on it, and the
            // abandon below goes through the same driver.
            self.rx = None;
            let last_id = self.ldap.last_id;
            if let Err(e) = self.ldap.abandon(last_id).await {
                debug!("abandon of msgid {} failed: {}", last_id, e);
            }
        }
        self.state = StreamState::Closed;
        self.rx = None;
        self.res
            .take()
            .unwrap_or_else(|| LdapResult::synthetic(88, "user cancelled"))
    }

    /// The current state of the stream.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// The `Ldap` handle of the stream.
    pub fn ldap_handle(&mut self) -> &mut Ldap {
        &mut self.ldap
    }
}

/// Parse a BER-encoded sequence of referral URIs.
pub(crate) fn parse_refs(pkt: Packet) -> Result<Vec<String>> {
    pkt.into_children()
        .ok_or(LdapError::Decoding("referral list is not constructed"))?
        .into_iter()
        .map(|uri| {
            uri.into_bytes()
                .map(String::from_utf8)
                .ok_or(LdapError::Decoding("constructed referral URI"))?
                .map_err(|_| LdapError::DecodingUTF8)
        })
        .collect()
}

impl Ldap {
    /// Perform a Search, returning all entries at once.
    ///
    /// This should be used when the result set is known to be of reasonable
    /// size; use [`streaming_search()`](#method.streaming_search) otherwise.
    pub async fn search(&mut self, req: &SearchRequest) -> Result<SearchResult> {
        let mut stream = self.streaming_search(req).await?;
        let mut entries = vec![];
        let mut referrals = vec![];
        loop {
            match stream.next().await? {
                Some(StreamItem::Entry(entry)) => entries.push(entry),
                Some(StreamItem::Referral(mut refs)) => referrals.append(&mut refs),
                None => break,
            }
        }
        let res = stream.finish().await;
        Ok(SearchResult {
            entries,
            referrals,
            res,
        })
    }

    /// Perform a Search, returning a stream handle for retrieving entries
    /// one by one. See [`SearchStream`](struct.SearchStream.html) for the
    /// protocol the handle must be driven with.
    pub async fn streaming_search(&mut self, req: &SearchRequest) -> Result<SearchStream> {
        let mut ldap = self.clone();
        ldap.controls = self.controls.take();
        ldap.timeout = self.timeout.take();
        SearchStream::start(ldap, req).await
    }

    /// Perform a paged Search (RFC 2696), repeatedly issuing `req` with a
    /// Paging control of `page_size` entries and accumulating the pages
    /// until the server returns an empty cookie.
    ///
    /// If `req` already carries a Paging control, its size must equal
    /// `page_size`; a mismatch is a usage error, reported before anything is
    /// sent. When paging stops before the cookie is exhausted, a final
    /// request with size zero and the last cookie is issued, telling the
    /// server to drop the result set.
    pub async fn search_paged(
        &mut self,
        req: &SearchRequest,
        page_size: i32,
    ) -> Result<SearchResult> {
        let mut paging = match req.controls.iter().find_map(|c| match c {
            Control::Paging(p) => Some(p),
            _ => None,
        }) {
            Some(p) if p.size != page_size => {
                return Err(LdapError::Usage(format!(
                    "paging size in request ({}) conflicts with requested page size ({})",
                    p.size, page_size
                )));
            }
            Some(p) => p.clone(),
            None => Paging::new(page_size),
        };
        let extra_controls: Vec<Control> = req
            .controls
            .iter()
            .filter(|c| !matches!(c, Control::Paging(_)))
            .cloned()
            .collect();
        let mut acc = SearchResult::default();
        let mut all_ctrls = vec![];
        loop {
            let mut page_req = req.clone();
            page_req.controls = extra_controls.clone();
            page_req.controls.push(Control::Paging(paging.clone()));
            let page = match self.search(&page_req).await {
                Ok(page) => page,
                Err(e) => {
                    self.abandon_paging(req, &extra_controls, &paging).await;
                    return Err(e);
                }
            };
            let page_cookie = page.res.ctrls.iter().find_map(|c| match c {
                Control::Paging(p) => Some(p.cookie.clone()),
                _ => None,
            });
            acc.entries.extend(page.entries);
            acc.referrals.extend(page.referrals);
            acc.res = page.res;
            all_ctrls.append(&mut acc.res.ctrls);
            if acc.res.rc != 0 {
                self.abandon_paging(req, &extra_controls, &paging).await;
                break;
            }
            match page_cookie {
                Some(cookie) if !cookie.is_empty() => paging.cookie = cookie,
                // empty cookie, or no paging control at all: the set is done
                _ => break,
            }
        }
        acc.res.ctrls = all_ctrls;
        Ok(acc)
    }

    // One best-effort size=0 page releasing the server-side result set.
    async fn abandon_paging(
        &mut self,
        req: &SearchRequest,
        extra_controls: &[Control],
        paging: &Paging,
    ) {
        if paging.cookie.is_empty() {
            return;
        }
        let mut final_req = req.clone();
        final_req.controls = extra_controls.to_vec();
        final_req.controls.push(Control::Paging(Paging {
            size: 0,
            cookie: paging.cookie.clone(),
        }));
        if let Err(e) = self.search(&final_req).await {
            debug!("paging abandon failed: {}", e);
        }
    }
}
