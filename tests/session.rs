//! End-to-end protocol exercises against a scripted in-process server.
//!
//! Each test binds a listener on a loopback port, spawns a task that plays
//! the server side of the exchange with hand-built PDUs, and drives the
//! client library against it.

use ldapmux::asn1::{encode_to_vec, parse_packet, Class, Packet};
use ldapmux::controls::{Control, Paging, PAGING_OID};
use ldapmux::{ErrorKind, LdapConnection, Scope, SearchRequest, StreamItem};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

struct ScriptedServer {
    socket: TcpStream,
    buf: Vec<u8>,
}

impl ScriptedServer {
    fn new(socket: TcpStream) -> ScriptedServer {
        ScriptedServer {
            socket,
            buf: Vec::new(),
        }
    }

    async fn read_pdu(&mut self) -> Packet {
        loop {
            let parsed = match parse_packet(&self.buf) {
                Ok((rest, pkt)) => Some((self.buf.len() - rest.len(), pkt)),
                Err(e) if e.is_incomplete() => None,
                Err(e) => panic!("malformed client PDU: {:?}", e),
            };
            if let Some((consumed, pkt)) = parsed {
                self.buf.drain(..consumed);
                return pkt;
            }
            let mut tmp = [0u8; 4096];
            let n = self.socket.read(&mut tmp).await.expect("server read");
            assert!(n > 0, "client closed the connection mid-script");
            self.buf.extend_from_slice(&tmp[..n]);
        }
    }

    async fn write_pdu(&mut self, pkt: &Packet) {
        let bytes = encode_to_vec(pkt).expect("server encode");
        self.socket.write_all(&bytes).await.expect("server write");
    }
}

async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ldap://127.0.0.1:{}", listener.local_addr().unwrap().port());
    (listener, url)
}

fn envelope(msgid: i64, op: Packet) -> Packet {
    Packet::sequence()
        .with_child(Packet::integer(msgid))
        .with_child(op)
}

fn envelope_with_control(msgid: i64, op: Packet, control: Packet) -> Packet {
    envelope(msgid, op).with_child(Packet::constructed(Class::Context, 0).with_child(control))
}

fn result_op(tag: u64, rc: i64) -> Packet {
    Packet::constructed(Class::Application, tag)
        .with_child(Packet::enumerated(rc))
        .with_child(Packet::octet_string(""))
        .with_child(Packet::octet_string(""))
}

fn entry_op(dn: &str, attrs: &[(&str, &[&str])]) -> Packet {
    let mut attr_list = Packet::sequence();
    for (name, values) in attrs {
        let mut value_set = Packet::set();
        for value in *values {
            value_set.push(Packet::octet_string(*value));
        }
        attr_list.push(
            Packet::sequence()
                .with_child(Packet::octet_string(*name))
                .with_child(value_set),
        );
    }
    Packet::constructed(Class::Application, 4)
        .with_child(Packet::octet_string(dn))
        .with_child(attr_list)
}

fn paging_control(size: i64, cookie: &[u8]) -> Packet {
    let value = encode_to_vec(
        &Packet::sequence()
            .with_child(Packet::integer(size))
            .with_child(Packet::octet_string(cookie)),
    )
    .unwrap();
    Packet::sequence()
        .with_child(Packet::octet_string(PAGING_OID))
        .with_child(Packet::octet_string(value))
}

fn msgid_of(env: &Packet) -> i64 {
    env.children().unwrap()[0].read_int().unwrap()
}

fn op_of(env: &Packet) -> &Packet {
    &env.children().unwrap()[1]
}

// The paging control of a request envelope, as (size, cookie).
fn request_paging(env: &Packet) -> Option<(i64, Vec<u8>)> {
    let wrapper = env.children().unwrap().get(2)?;
    for ctrl in wrapper.children().unwrap() {
        let parts = ctrl.children().unwrap();
        if parts[0].as_str() == Some(PAGING_OID) {
            let value = parts.last().unwrap().bytes().unwrap();
            let (_, inner) = parse_packet(value).unwrap();
            let inner = inner.children().unwrap();
            return Some((inner[0].read_int().unwrap(), inner[1].bytes().unwrap().to_vec()));
        }
    }
    None
}

#[tokio::test]
async fn bind_success() {
    let (listener, url) = listen().await;
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut server = ScriptedServer::new(socket);
        let env = server.read_pdu().await;
        let op = op_of(&env);
        assert!(op.has_tag(Class::Application, 0));
        let children = op.children().unwrap();
        assert_eq!(children[0].read_int(), Some(3));
        assert_eq!(children[1].as_str(), Some("cn=admin"));
        assert_eq!(children[2].bytes(), Some(&b"secret"[..]));
        server
            .write_pdu(&envelope(msgid_of(&env), result_op(1, 0)))
            .await;
    });
    let (conn, mut ldap) = LdapConnection::new(&url).await.unwrap();
    ldapmux::drive!(conn);
    let res = ldap.simple_bind("cn=admin", "secret").await.unwrap();
    assert_eq!(res.rc, 0);
    server.await.unwrap();
}

#[tokio::test]
async fn search_returns_entries_in_order() {
    let (listener, url) = listen().await;
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut server = ScriptedServer::new(socket);
        let env = server.read_pdu().await;
        let op = op_of(&env);
        assert!(op.has_tag(Class::Application, 3));
        assert_eq!(op.children().unwrap()[0].as_str(), Some("dc=x"));
        let id = msgid_of(&env);
        server
            .write_pdu(&envelope(id, entry_op("cn=a,dc=x", &[("cn", &["a"])])))
            .await;
        server
            .write_pdu(&envelope(id, entry_op("cn=b,dc=x", &[("cn", &["b"])])))
            .await;
        server.write_pdu(&envelope(id, result_op(5, 0))).await;
    });
    let (conn, mut ldap) = LdapConnection::new(&url).await.unwrap();
    ldapmux::drive!(conn);
    let req = SearchRequest::new("dc=x", "(objectClass=*)").scope(Scope::Subtree);
    let res = ldap.search(&req).await.unwrap().success().unwrap();
    let dns: Vec<&str> = res.entries.iter().map(|e| e.dn.as_str()).collect();
    assert_eq!(dns, ["cn=a,dc=x", "cn=b,dc=x"]);
    assert_eq!(res.entries[0].attr_values("cn"), ["a"]);
    server.await.unwrap();
}

#[tokio::test]
async fn overlapping_searches_stay_separate() {
    let (listener, url) = listen().await;
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut server = ScriptedServer::new(socket);
        let first = server.read_pdu().await;
        let second = server.read_pdu().await;
        // map message ids to the bases they asked for
        let base_of = |env: &Packet| op_of(env).children().unwrap()[0].as_str().unwrap().to_owned();
        let (one, two) = if base_of(&first) == "dc=one" {
            (msgid_of(&first), msgid_of(&second))
        } else {
            (msgid_of(&second), msgid_of(&first))
        };
        // interleave the two response streams on the wire
        server
            .write_pdu(&envelope(one, entry_op("cn=a1,dc=one", &[])))
            .await;
        server
            .write_pdu(&envelope(two, entry_op("cn=b1,dc=two", &[])))
            .await;
        server
            .write_pdu(&envelope(one, entry_op("cn=a2,dc=one", &[])))
            .await;
        server.write_pdu(&envelope(two, result_op(5, 0))).await;
        server.write_pdu(&envelope(one, result_op(5, 0))).await;
    });
    let (conn, ldap) = LdapConnection::new(&url).await.unwrap();
    ldapmux::drive!(conn);
    let mut l1 = ldap.clone();
    let mut l2 = ldap.clone();
    let mut s1 = l1
        .streaming_search(&SearchRequest::new("dc=one", "(objectClass=*)"))
        .await
        .unwrap();
    let mut s2 = l2
        .streaming_search(&SearchRequest::new("dc=two", "(objectClass=*)"))
        .await
        .unwrap();
    let mut dns1 = vec![];
    while let Some(StreamItem::Entry(e)) = s1.next().await.unwrap() {
        dns1.push(e.dn);
    }
    let mut dns2 = vec![];
    while let Some(StreamItem::Entry(e)) = s2.next().await.unwrap() {
        dns2.push(e.dn);
    }
    assert_eq!(dns1, ["cn=a1,dc=one", "cn=a2,dc=one"]);
    assert_eq!(dns2, ["cn=b1,dc=two"]);
    assert_eq!(s1.finish().await.rc, 0);
    assert_eq!(s2.finish().await.rc, 0);
    server.await.unwrap();
}

#[tokio::test]
async fn paged_search_stops_on_empty_cookie() {
    let (listener, url) = listen().await;
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut server = ScriptedServer::new(socket);

        let env = server.read_pdu().await;
        let id = msgid_of(&env);
        let (size, cookie) = request_paging(&env).expect("first page carries a paging control");
        assert_eq!(size, 2);
        assert!(cookie.is_empty());
        server.write_pdu(&envelope(id, entry_op("cn=1,dc=x", &[]))).await;
        server.write_pdu(&envelope(id, entry_op("cn=2,dc=x", &[]))).await;
        server
            .write_pdu(&envelope_with_control(
                id,
                result_op(5, 0),
                paging_control(0, b"k1"),
            ))
            .await;

        let env = server.read_pdu().await;
        let id = msgid_of(&env);
        let (size, cookie) = request_paging(&env).expect("second page carries a paging control");
        assert_eq!(size, 2);
        assert_eq!(cookie, b"k1");
        server.write_pdu(&envelope(id, entry_op("cn=3,dc=x", &[]))).await;
        server.write_pdu(&envelope(id, entry_op("cn=4,dc=x", &[]))).await;
        server
            .write_pdu(&envelope_with_control(
                id,
                result_op(5, 0),
                paging_control(0, b""),
            ))
            .await;

        // the very next PDU must be the unbind, not a third search or an
        // abandon page
        let env = server.read_pdu().await;
        assert!(op_of(&env).has_tag(Class::Application, 2));
    });
    let (conn, mut ldap) = LdapConnection::new(&url).await.unwrap();
    ldapmux::drive!(conn);
    let req = SearchRequest::new("dc=x", "(objectClass=*)");
    let res = ldap.search_paged(&req, 2).await.unwrap().success().unwrap();
    assert_eq!(res.entries.len(), 4);
    ldap.unbind().await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn paged_search_size_mismatch_is_usage_error() {
    let (listener, url) = listen().await;
    tokio::spawn(async move {
        let (_socket, _) = listener.accept().await.unwrap();
        // nothing must ever arrive here
    });
    let (conn, mut ldap) = LdapConnection::new(&url).await.unwrap();
    ldapmux::drive!(conn);
    let req = SearchRequest::new("dc=x", "(objectClass=*)")
        .controls([Control::Paging(Paging::new(10))]);
    let err = ldap.search_paged(&req, 2).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);
}

#[tokio::test]
async fn close_ends_open_stream_with_network_error() {
    let (listener, url) = listen().await;
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut server = ScriptedServer::new(socket);
        let env = server.read_pdu().await;
        let id = msgid_of(&env);
        server.write_pdu(&envelope(id, entry_op("cn=a,dc=x", &[]))).await;
        // keep the socket open; the client closes from its side
        let mut tmp = [0u8; 4096];
        while server.socket.read(&mut tmp).await.unwrap_or(0) > 0 {}
    });
    let (conn, ldap) = LdapConnection::new(&url).await.unwrap();
    ldapmux::drive!(conn);
    let mut searcher = ldap.clone();
    let mut closer = ldap.clone();
    let mut stream = searcher
        .streaming_search(&SearchRequest::new("dc=x", "(objectClass=*)"))
        .await
        .unwrap();
    match stream.next().await.unwrap() {
        Some(StreamItem::Entry(e)) => assert_eq!(e.dn, "cn=a,dc=x"),
        other => panic!("expected an entry, got {:?}", other),
    }
    closer.unbind().await.unwrap();
    let err = stream.next().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
    // closing again is a no-op
    closer.unbind().await.unwrap();
    assert!(closer.is_closed());
    // any further operation fails with a network-kind error
    let err = closer.simple_bind("cn=x", "y").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
}

#[tokio::test]
async fn notice_of_disconnection_fails_outstanding_ops() {
    let (listener, url) = listen().await;
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut server = ScriptedServer::new(socket);
        let _ = server.read_pdu().await;
        let notice = result_op(24, 52)
            .with_child(Packet::primitive(
                Class::Context,
                10,
                b"1.3.6.1.4.1.1466.20036".to_vec(),
            ));
        server.write_pdu(&envelope(0, notice)).await;
    });
    let (conn, mut ldap) = LdapConnection::new(&url).await.unwrap();
    ldapmux::drive!(conn);
    let mut stream = ldap
        .streaming_search(&SearchRequest::new("dc=x", "(objectClass=*)"))
        .await
        .unwrap();
    let err = stream.next().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
}
