use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use crate::MessageId;
#[cfg(feature = "tls")]
use crate::exop::StartTls;
use crate::ldap::Ldap;
use crate::protocol::{app_tags, LdapCodec, LdapOp, OpExchange, ResultSender, SearchItemSender};
use crate::result::{LdapError, RawResponse, Result};
use crate::search::SearchItem;

use bertree::{Class, Packet};

use futures_util::sink::SinkExt;
#[cfg(feature = "tls")]
use futures_util::future::TryFutureExt;
#[cfg(feature = "tls")]
use native_tls::TlsConnector;
#[cfg(unix)]
use percent_encoding::percent_decode;
use tokio::io::{self, AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio::sync::mpsc;
#[cfg(feature = "tls")]
use tokio::sync::oneshot;
use tokio::time;
#[cfg(feature = "tls")]
use tokio_native_tls::{TlsConnector as TokioTlsConnector, TlsStream};
use tokio_stream::StreamExt;
use tokio_util::codec::{Decoder, Framed};
use url::Url;

// Unsolicited notification closing the session (RFC 4511, section 4.4.1).
const NOTICE_OF_DISCONNECTION_OID: &str = "1.3.6.1.4.1.1466.20036";

enum Transport {
    Tcp(TcpStream),
    #[cfg(feature = "tls")]
    Tls(TlsStream<TcpStream>),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context,
        buf: &mut ReadBuf,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(ts) => Pin::new(ts).poll_read(cx, buf),
            #[cfg(feature = "tls")]
            Transport::Tls(tls) => Pin::new(tls).poll_read(cx, buf),
            #[cfg(unix)]
            Transport::Unix(us) => Pin::new(us).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Transport::Tcp(ts) => Pin::new(ts).poll_write(cx, buf),
            #[cfg(feature = "tls")]
            Transport::Tls(tls) => Pin::new(tls).poll_write(cx, buf),
            #[cfg(unix)]
            Transport::Unix(us) => Pin::new(us).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(ts) => Pin::new(ts).poll_flush(cx),
            #[cfg(feature = "tls")]
            Transport::Tls(tls) => Pin::new(tls).poll_flush(cx),
            #[cfg(unix)]
            Transport::Unix(us) => Pin::new(us).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(ts) => Pin::new(ts).poll_shutdown(cx),
            #[cfg(feature = "tls")]
            Transport::Tls(tls) => Pin::new(tls).poll_shutdown(cx),
            #[cfg(unix)]
            Transport::Unix(us) => Pin::new(us).poll_shutdown(cx),
        }
    }
}

/// Additional settings for an LDAP connection.
///
/// An instance with default values is constructed by [`new()`](#method.new),
/// and individual settings are replaced through the builder-like interface.
#[derive(Clone, Default)]
pub struct LdapSettings {
    conn_timeout: Option<Duration>,
    op_timeout: Option<Duration>,
    #[cfg(feature = "tls")]
    connector: Option<TlsConnector>,
    #[cfg(feature = "tls")]
    starttls: bool,
    #[cfg(feature = "tls")]
    no_tls_verify: bool,
}

impl LdapSettings {
    /// Create an instance of the structure with default settings.
    pub fn new() -> LdapSettings {
        LdapSettings {
            ..Default::default()
        }
    }

    /// Set the connection timeout. If a connection to the server can't be
    /// established before it expires, an error is returned. Defaults to
    /// `None`, meaning an infinite timeout.
    pub fn set_conn_timeout(mut self, timeout: Duration) -> Self {
        self.conn_timeout = Some(timeout);
        self
    }

    /// Set the default timeout bounding every operation on the session.
    /// A per-operation [`with_timeout()`](struct.Ldap.html#method.with_timeout)
    /// takes precedence. Defaults to `None`, meaning no bound.
    pub fn set_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = Some(timeout);
        self
    }

    #[cfg(feature = "tls")]
    /// Set a custom TLS connector, for adjusting protocol or certificate
    /// options of the secure connection. The default of `None` uses a
    /// connector with default settings.
    pub fn set_connector(mut self, connector: TlsConnector) -> Self {
        self.connector = Some(connector);
        self
    }

    #[cfg(feature = "tls")]
    /// If `true`, upgrade a plain `ldap://` connection with the StartTLS
    /// extended operation immediately after connecting, before the handle is
    /// usable and anything else can be in flight. Defaults to `false`.
    pub fn set_starttls(mut self, starttls: bool) -> Self {
        self.starttls = starttls;
        self
    }

    #[cfg(feature = "tls")]
    pub fn starttls(&self) -> bool {
        self.starttls
    }

    #[cfg(not(feature = "tls"))]
    /// Always `false` when no TLS support is compiled in.
    pub fn starttls(&self) -> bool {
        false
    }

    #[cfg(feature = "tls")]
    /// If `true`, establish the TLS connection without certificate
    /// verification. Defaults to `false`.
    pub fn set_no_tls_verify(mut self, no_tls_verify: bool) -> Self {
        self.no_tls_verify = no_tls_verify;
        self
    }
}

enum LoopMode {
    #[allow(dead_code)]
    SingleOp,
    Continuous,
}

/// Asynchronous connection to an LDAP server.
///
/// Opening a connection with [`new()`](#method.new) returns a tuple of the
/// connection itself and an [`Ldap`](struct.Ldap.html) handle for performing
/// operations. The connection must be spawned on the active Tokio executor
/// before the handle is used; the [`drive!`](macro.drive.html) macro does
/// this in the common case, and custom lifecycle handling can call
/// [`drive()`](#method.drive) in its own task.
///
/// The connection owns the transport. A single reader demultiplexes inbound
/// PDUs to per-operation queues by message ID, and all writes are serialized
/// through the same task, so one PDU is never interleaved with another.
pub struct LdapConnection {
    msgmap: Arc<Mutex<(MessageId, HashSet<MessageId>)>>,
    singles: HashMap<MessageId, ResultSender>,
    searches: HashMap<MessageId, SearchItemSender>,
    rx: mpsc::UnboundedReceiver<OpExchange>,
    scrub_rx: mpsc::UnboundedReceiver<MessageId>,
    stream: Framed<Transport, LdapCodec>,
}

/// Spawn the connection on the current Tokio executor, logging the error
/// that ends it, if any.
#[macro_export]
macro_rules! drive {
    ($conn:expr) => {
        $crate::tokio::spawn(async move {
            if let Err(e) = $conn.drive().await {
                $crate::log::warn!("LDAP connection error: {}", e);
            }
        });
    };
}

impl LdapConnection {
    /// Open a connection to an LDAP server specified by `url`.
    ///
    /// The __ldap__ scheme, a plain TCP connection, is always available.
    /// Unix-like platforms also support __ldapi__, LDAP over a Unix domain
    /// socket. With the __tls__ feature, the __ldaps__ scheme and StartTLS
    /// over __ldap__ are additionally supported. Default ports are 389 for
    /// __ldap__ and 636 for __ldaps__.
    pub async fn new(url: &str) -> Result<(Self, Ldap)> {
        Self::with_settings(LdapSettings::new(), url).await
    }

    /// Open a connection to an LDAP server specified by `url`, using
    /// `settings` to specify additional parameters.
    pub async fn with_settings(settings: LdapSettings, url: &str) -> Result<(Self, Ldap)> {
        let url = Url::parse(url)?;
        Self::from_url_with_settings(settings, &url).await
    }

    /// Open a connection to an LDAP server specified by an already parsed
    /// `Url`, using `settings` to specify additional parameters.
    pub async fn from_url_with_settings(
        settings: LdapSettings,
        url: &Url,
    ) -> Result<(Self, Ldap)> {
        if url.scheme() == "ldapi" {
            return Self::new_unix(url, settings).await;
        }
        let mut settings = settings;
        let timeout = settings.conn_timeout.take();
        let conn_future = Self::new_tcp(url, settings);
        Ok(if let Some(timeout) = timeout {
            time::timeout(timeout, conn_future).await?
        } else {
            conn_future.await
        }?)
    }

    #[cfg(unix)]
    async fn new_unix(url: &Url, settings: LdapSettings) -> Result<(Self, Ldap)> {
        let path = url.host_str().unwrap_or("");
        if path.is_empty() {
            return Err(LdapError::EmptyUnixPath);
        }
        if path.contains(':') {
            return Err(LdapError::PortInUnixPath);
        }
        let dec_path = percent_decode(path.as_bytes()).decode_utf8_lossy();
        let stream = UnixStream::connect(dec_path.as_ref()).await?;
        Ok(Self::pair(Transport::Unix(stream), settings.op_timeout))
    }

    #[cfg(not(unix))]
    async fn new_unix(_url: &Url, _settings: LdapSettings) -> Result<(Self, Ldap)> {
        unimplemented!("no Unix domain sockets on non-Unix platforms");
    }

    #[allow(unused_mut)]
    async fn new_tcp(url: &Url, mut settings: LdapSettings) -> Result<(Self, Ldap)> {
        let mut port = 389;
        let scheme = match url.scheme() {
            s @ "ldap" => {
                if settings.starttls() {
                    "starttls"
                } else {
                    s
                }
            }
            #[cfg(feature = "tls")]
            s @ "ldaps" => {
                port = 636;
                s
            }
            s => return Err(LdapError::UnknownScheme(String::from(s))),
        };
        if let Some(url_port) = url.port() {
            port = url_port;
        }
        let (_hostname, host_port) = match url.host_str() {
            Some("") | None => ("localhost", format!("localhost:{}", port)),
            Some(h) => (h, format!("{}:{}", h, port)),
        };
        let stream = TcpStream::connect(host_port.as_str()).await?;
        let (mut conn, mut ldap) = Self::pair(Transport::Tcp(stream), settings.op_timeout);
        match scheme {
            "ldap" => (),
            #[cfg(feature = "tls")]
            s @ "ldaps" | s @ "starttls" => {
                if s == "starttls" {
                    let (tx, rx) = oneshot::channel();
                    tokio::spawn(async move {
                        conn.single_op(tx).await;
                    });
                    let res =
                        tokio::try_join!(rx.map_err(LdapError::from), ldap.extended(StartTls));
                    match res {
                        Ok((conn_res, res)) => {
                            conn = conn_res?;
                            res.success()?;
                        }
                        Err(e) => return Err(e),
                    }
                }
                let parts = conn.stream.into_parts();
                let tls_stream = if let Transport::Tcp(stream) = parts.io {
                    Self::tls_handshake(settings, _hostname, stream).await?
                } else {
                    panic!("underlying stream not TCP");
                };
                conn.stream = parts.codec.framed(Transport::Tls(tls_stream));
                ldap.has_tls = true;
            }
            _ => unreachable!("unhandled scheme"),
        }
        Ok((conn, ldap))
    }

    #[cfg(feature = "tls")]
    async fn tls_handshake(
        settings: LdapSettings,
        hostname: &str,
        stream: TcpStream,
    ) -> Result<TlsStream<TcpStream>> {
        let connector = match settings.connector {
            Some(connector) => connector,
            None => {
                let mut builder = TlsConnector::builder();
                if settings.no_tls_verify {
                    builder.danger_accept_invalid_certs(true);
                }
                builder.build()?
            }
        };
        TokioTlsConnector::from(connector)
            .connect(hostname, stream)
            .await
            .map_err(LdapError::from)
    }

    fn pair(transport: Transport, op_timeout: Option<Duration>) -> (Self, Ldap) {
        let codec = LdapCodec;
        let (tx, rx) = mpsc::unbounded_channel();
        let (scrub_tx, scrub_rx) = mpsc::unbounded_channel();
        let conn = LdapConnection {
            msgmap: Arc::new(Mutex::new((0, HashSet::new()))),
            singles: HashMap::new(),
            searches: HashMap::new(),
            rx,
            scrub_rx,
            stream: codec.framed(transport),
        };
        let ldap = Ldap {
            msgmap: conn.msgmap.clone(),
            tx,
            scrub_tx,
            has_tls: false,
            last_id: 0,
            timeout: None,
            op_timeout,
            controls: None,
        };
        (conn, ldap)
    }

    /// Repeatedly poll the connection until it exits.
    pub async fn drive(self) -> Result<()> {
        self.turn(LoopMode::Continuous).await.map(|_| ())
    }

    #[cfg(feature = "tls")]
    pub(crate) async fn single_op(self, tx: oneshot::Sender<Result<Self>>) {
        if tx.send(self.turn(LoopMode::SingleOp).await).is_err() {
            warn!("single op send error");
        }
    }

    // The multiplexer proper. One request channel in, one transport, and
    // per-operation queues out; everything the session does passes through
    // this loop, which is what makes PDU writes atomic.
    async fn turn(mut self, mode: LoopMode) -> Result<Self> {
        loop {
            tokio::select! {
                scrubbed_id = self.scrub_rx.recv() => {
                    if let Some(id) = scrubbed_id {
                        self.singles.remove(&id);
                        self.searches.remove(&id);
                        let mut msgmap = self.msgmap.lock().expect("msgmap mutex (scrub)");
                        msgmap.1.remove(&id);
                    }
                },
                op_tuple = self.rx.recv() => {
                    let (id, op, pkt, controls, tx) = match op_tuple {
                        Some(op_tuple) => op_tuple,
                        None => break,
                    };
                    if let LdapOp::Search(ref item_tx) = op {
                        self.searches.insert(id, item_tx.clone());
                    }
                    if let Err(e) = self.stream.send((id, pkt, controls)).await {
                        warn!("socket send error: {}", e);
                        return Err(LdapError::from(e));
                    }
                    match op {
                        LdapOp::Single => {
                            self.singles.insert(id, tx);
                            continue;
                        }
                        LdapOp::Search(_) => (),
                        LdapOp::Abandon(msgid) => {
                            self.singles.remove(&msgid);
                            self.searches.remove(&msgid);
                            let mut msgmap = self.msgmap.lock().expect("msgmap mutex (abandon)");
                            msgmap.1.remove(&id);
                        }
                        LdapOp::Unbind => {
                            if let Err(e) = self.stream.get_mut().shutdown().await {
                                warn!("socket shutdown error: {}", e);
                            }
                            if let Err(e) = self.stream.close().await {
                                warn!("socket close error: {}", e);
                            }
                        }
                    }
                    if tx.send((None, vec![])).is_err() {
                        warn!("local op ack send error");
                    }
                },
                resp = self.stream.next() => {
                    let (id, op, controls) = match resp {
                        None => break,
                        Some(Err(e)) => {
                            warn!("socket receive error: {}", e);
                            return Err(LdapError::from(e));
                        },
                        Some(Ok(resp)) => resp,
                    };
                    if id == 0 {
                        self.unsolicited(op)?;
                        continue;
                    }
                    if let Some(item_tx) = self.searches.get(&id).cloned() {
                        let item = match (op.class, op.tag) {
                            (Class::Application, app_tags::SEARCH_RESULT_ENTRY) => {
                                SearchItem::Entry(op)
                            }
                            (Class::Application, app_tags::SEARCH_RESULT_REFERENCE) => {
                                SearchItem::Referral(op)
                            }
                            (Class::Application, app_tags::SEARCH_RESULT_DONE) => {
                                SearchItem::Done(op)
                            }
                            (Class::Application, app_tags::INTERMEDIATE_RESPONSE) => {
                                debug!("ignoring intermediate response for msgid {}", id);
                                continue;
                            }
                            _ => {
                                warn!("unexpected PDU for search msgid {}", id);
                                continue;
                            }
                        };
                        let done = matches!(item, SearchItem::Done(_));
                        // Bounded queue: a slow consumer blocks the whole
                        // loop here, and with it the other operations.
                        if item_tx.send((item, controls)).await.is_err() {
                            debug!("search consumer for msgid {} is gone", id);
                            self.searches.remove(&id);
                        } else if done {
                            self.searches.remove(&id);
                        }
                    } else if let Some(tx) = self.singles.remove(&id) {
                        if tx.send((Some(op), controls)).is_err() {
                            warn!("result send error for msgid {}", id);
                        }
                        let mut msgmap = self.msgmap.lock().expect("msgmap mutex (response)");
                        msgmap.1.remove(&id);
                    } else {
                        debug!("dropping response for unknown msgid {}", id);
                    }
                },
            }
            if let LoopMode::SingleOp = mode {
                break;
            }
        }
        Ok(self)
    }

    fn unsolicited(&mut self, op: Packet) -> Result<()> {
        if op.has_tag(Class::Application, app_tags::EXTENDED_RESPONSE) {
            if let Ok(raw) = RawResponse::parse(op) {
                if raw.exop.name.as_deref() == Some(NOTICE_OF_DISCONNECTION_OID) {
                    warn!("server sent a notice of disconnection: {}", raw.result);
                    return Err(LdapError::Disconnected { result: raw.result });
                }
                debug!("ignoring unsolicited notification");
                return Ok(());
            }
        }
        debug!("ignoring unsolicited message");
        Ok(())
    }
}
