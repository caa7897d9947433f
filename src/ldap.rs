use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::MessageId;
use crate::controls::Control;
use crate::exop::{construct_exop, Exop};
use crate::protocol::{app_tags, LdapOp, OpExchange};
use crate::result::{
    CompareResult, ExopResult, LdapError, LdapResult, RawResponse, Result,
};

use bertree::{Class, Packet};

use tokio::sync::{mpsc, oneshot};
use tokio::time;

/// Possible sub-operations for the Modify operation (RFC 4511 and, for
/// `Increment`, RFC 4525).
#[derive(Clone, Debug, PartialEq)]
pub enum Mod<S: AsRef<[u8]>> {
    /// Add an attribute, with at least one value.
    Add(S, Vec<S>),
    /// Delete the entire attribute, or the given values of an attribute.
    Delete(S, Vec<S>),
    /// Replace an existing attribute, setting its values to those in the
    /// list, or delete it if no values are given.
    Replace(S, Vec<S>),
    /// Increment the attribute by the given value.
    Increment(S, S),
}

/// Conversion trait for control arguments.
///
/// Operations accept a vector of controls, but attaching a single control is
/// the overwhelmingly common case; this trait lets both shapes be passed to
/// [`with_controls()`](struct.Ldap.html#method.with_controls).
pub trait IntoControls {
    fn into_controls(self) -> Vec<Control>;
}

impl IntoControls for Vec<Control> {
    fn into_controls(self) -> Vec<Control> {
        self
    }
}

impl IntoControls for Control {
    fn into_controls(self) -> Vec<Control> {
        vec![self]
    }
}

/// Asynchronous handle for LDAP operations.
///
/// All operations accept a series of request controls, attached by calling
/// [`with_controls()`](#method.with_controls) on the handle before invoking
/// the operation. A per-operation timeout is imposed the same way, with
/// [`with_timeout()`](#method.with_timeout); both settings are consumed by
/// the next operation.
///
/// The handle can be freely cloned. Each clone multiplexes its operations on
/// the same underlying connection, with responses routed back by message ID;
/// concurrent operations on different clones never observe each other.
/// Dropping the last handle closes the connection.
#[derive(Debug)]
pub struct Ldap {
    pub(crate) msgmap: Arc<Mutex<(MessageId, HashSet<MessageId>)>>,
    pub(crate) tx: mpsc::UnboundedSender<OpExchange>,
    pub(crate) scrub_tx: mpsc::UnboundedSender<MessageId>,
    pub(crate) has_tls: bool,
    pub(crate) last_id: MessageId,
    pub(crate) op_timeout: Option<Duration>,
    /// Timeout for the next operation.
    pub timeout: Option<Duration>,
    /// Controls for the next operation.
    pub controls: Option<Vec<Control>>,
}

impl Clone for Ldap {
    fn clone(&self) -> Self {
        Ldap {
            msgmap: self.msgmap.clone(),
            tx: self.tx.clone(),
            scrub_tx: self.scrub_tx.clone(),
            has_tls: self.has_tls,
            last_id: 0,
            op_timeout: self.op_timeout,
            timeout: None,
            controls: None,
        }
    }
}

fn sasl_bind_req(mech: &str, creds: Option<&[u8]>) -> Packet {
    let mut auth =
        Packet::constructed(Class::Context, 3).with_child(Packet::octet_string(mech.as_bytes()));
    if let Some(creds) = creds {
        auth.push(Packet::octet_string(creds));
    }
    Packet::constructed(Class::Application, app_tags::BIND_REQUEST)
        .with_child(Packet::integer(3))
        .with_child(Packet::octet_string(""))
        .with_child(auth)
}

impl Ldap {
    // Message IDs are 31-bit positive integers, unique for the lifetime of
    // the session; zero is reserved for unsolicited notifications. The
    // counter wraps at i32::MAX, skipping ids still in use.
    fn next_msgid(&mut self) -> MessageId {
        let mut msgmap = self.msgmap.lock().expect("msgmap mutex (next id)");
        let last_id = msgmap.0;
        let mut next_id = last_id;
        loop {
            next_id = if next_id == i32::MAX { 1 } else { next_id + 1 };
            if !msgmap.1.contains(&next_id) {
                break;
            }
            assert_ne!(
                next_id, last_id,
                "message id wraparound with no free slots"
            );
        }
        msgmap.0 = next_id;
        msgmap.1.insert(next_id);
        next_id
    }

    pub(crate) async fn op_call(
        &mut self,
        op: LdapOp,
        req: Packet,
    ) -> Result<(LdapResult, Exop, Option<Vec<u8>>)> {
        let controls = match self.controls.take() {
            Some(ctrls) => Some(
                ctrls
                    .iter()
                    .map(Control::encode)
                    .collect::<Result<Vec<_>>>()?,
            ),
            None => None,
        };
        let id = self.next_msgid();
        self.last_id = id;
        let (tx, rx) = oneshot::channel();
        self.tx
            .send((id, op, req, controls, tx))
            .map_err(|_| LdapError::ConnectionClosed)?;
        let response = if let Some(timeout) = self.timeout.take().or(self.op_timeout) {
            let res = time::timeout(timeout, rx).await;
            if res.is_err() {
                let _ = self.scrub_tx.send(self.last_id);
            }
            res??
        } else {
            rx.await?
        };
        let (pkt, ctrls) = response;
        let mut raw = match pkt {
            Some(pkt) => RawResponse::parse(pkt)?,
            None => RawResponse::local_success(),
        };
        raw.result.ctrls = ctrls;
        Ok((raw.result, raw.exop, raw.sasl_creds))
    }

    /// Pass the provided request control(s) to the next operation. Accepts
    /// a single [`Control`](controls/enum.Control.html) or a vector of them.
    pub fn with_controls<C: IntoControls>(&mut self, ctrls: C) -> &mut Self {
        self.controls = Some(ctrls.into_controls());
        self
    }

    /// Perform the next operation with the given timeout. For a Search, the
    /// timer is reset for each entry or referral received.
    ///
    /// A timed-out operation returns an error, but the connection remains
    /// usable.
    pub fn with_timeout(&mut self, duration: Duration) -> &mut Self {
        self.timeout = Some(duration);
        self
    }

    /// Do a simple Bind with the provided DN (`bind_dn`) and password
    /// (`bind_pw`).
    pub async fn simple_bind(&mut self, bind_dn: &str, bind_pw: &str) -> Result<LdapResult> {
        let req = Packet::constructed(Class::Application, app_tags::BIND_REQUEST)
            .with_child(Packet::integer(3))
            .with_child(Packet::octet_string(bind_dn.as_bytes()))
            .with_child(Packet::primitive(Class::Context, 0, bind_pw.into()));
        Ok(self.op_call(LdapOp::Single, req).await?.0)
    }

    /// Do an SASL EXTERNAL bind on the connection. The identity of the
    /// client must have already been established by transport-level means,
    /// as is the case for Unix domain sockets or TLS client certificates.
    /// The bind is made with an empty authzId.
    pub async fn sasl_external_bind(&mut self) -> Result<LdapResult> {
        let req = sasl_bind_req("EXTERNAL", Some(b""));
        Ok(self.op_call(LdapOp::Single, req).await?.0)
    }

    /// Add an entry named by `dn`, with the listed attributes and their
    /// values. No value list may be empty.
    pub async fn add<S: AsRef<[u8]>>(
        &mut self,
        dn: &str,
        attrs: Vec<(S, Vec<S>)>,
    ) -> Result<LdapResult> {
        let mut attr_list = Packet::sequence();
        for (name, values) in &attrs {
            if values.is_empty() {
                return Err(LdapError::Encoding(String::from(
                    "empty value list for Add",
                )));
            }
            let mut value_set = Packet::set();
            for value in values {
                value_set.push(Packet::octet_string(value.as_ref()));
            }
            attr_list.push(
                Packet::sequence()
                    .with_child(Packet::octet_string(name.as_ref()))
                    .with_child(value_set),
            );
        }
        let req = Packet::constructed(Class::Application, app_tags::ADD_REQUEST)
            .with_child(Packet::octet_string(dn.as_bytes()))
            .with_child(attr_list);
        Ok(self.op_call(LdapOp::Single, req).await?.0)
    }

    /// Compare the value(s) of the attribute `attr` within an entry named by
    /// `dn` with the value `val`. The wrapped result distinguishes
    /// compareTrue from compareFalse.
    pub async fn compare<B: AsRef<[u8]>>(
        &mut self,
        dn: &str,
        attr: &str,
        val: B,
    ) -> Result<CompareResult> {
        let req = Packet::constructed(Class::Application, app_tags::COMPARE_REQUEST)
            .with_child(Packet::octet_string(dn.as_bytes()))
            .with_child(
                Packet::sequence()
                    .with_child(Packet::octet_string(attr.as_bytes()))
                    .with_child(Packet::octet_string(val.as_ref())),
            );
        Ok(CompareResult(self.op_call(LdapOp::Single, req).await?.0))
    }

    /// Delete an entry named by `dn`.
    pub async fn delete(&mut self, dn: &str) -> Result<LdapResult> {
        let req = Packet::primitive(
            Class::Application,
            app_tags::DEL_REQUEST,
            dn.as_bytes().to_vec(),
        );
        Ok(self.op_call(LdapOp::Single, req).await?.0)
    }

    /// Modify an entry named by `dn` by sequentially applying the changes
    /// given in `mods`. See [`Mod`](enum.Mod.html) for the possible changes.
    pub async fn modify<S: AsRef<[u8]>>(
        &mut self,
        dn: &str,
        mods: Vec<Mod<S>>,
    ) -> Result<LdapResult> {
        let mut change_list = Packet::sequence();
        for m in &mods {
            let (op, attr, values) = match *m {
                Mod::Add(ref attr, ref values) => {
                    if values.is_empty() {
                        return Err(LdapError::Encoding(String::from(
                            "empty value list for Modify add",
                        )));
                    }
                    (0, attr, values.as_slice())
                }
                Mod::Delete(ref attr, ref values) => (1, attr, values.as_slice()),
                Mod::Replace(ref attr, ref values) => (2, attr, values.as_slice()),
                Mod::Increment(ref attr, ref value) => (3, attr, std::slice::from_ref(value)),
            };
            let mut value_set = Packet::set();
            for value in values {
                value_set.push(Packet::octet_string(value.as_ref()));
            }
            change_list.push(
                Packet::sequence()
                    .with_child(Packet::enumerated(op))
                    .with_child(
                        Packet::sequence()
                            .with_child(Packet::octet_string(attr.as_ref()))
                            .with_child(value_set),
                    ),
            );
        }
        let req = Packet::constructed(Class::Application, app_tags::MODIFY_REQUEST)
            .with_child(Packet::octet_string(dn.as_bytes()))
            .with_child(change_list);
        Ok(self.op_call(LdapOp::Single, req).await?.0)
    }

    /// Rename and/or move an entry named by `dn`. The new name is given by
    /// `rdn`. If `delete_old` is `true`, delete the previous value of the
    /// naming attribute. A new superior entry, if the entry is to be moved,
    /// is given in `new_superior`.
    pub async fn modifydn(
        &mut self,
        dn: &str,
        rdn: &str,
        delete_old: bool,
        new_superior: Option<&str>,
    ) -> Result<LdapResult> {
        let mut req = Packet::constructed(Class::Application, app_tags::MODDN_REQUEST)
            .with_child(Packet::octet_string(dn.as_bytes()))
            .with_child(Packet::octet_string(rdn.as_bytes()))
            .with_child(Packet::boolean(delete_old));
        if let Some(new_superior) = new_superior {
            req.push(Packet::primitive(Class::Context, 0, new_superior.into()));
        }
        Ok(self.op_call(LdapOp::Single, req).await?.0)
    }

    /// Perform an Extended operation. Implemented operations live in the
    /// [`exop`](exop/index.html) module; any other operation can be sent
    /// through a hand-built [`Exop`](exop/struct.Exop.html).
    pub async fn extended<E>(&mut self, exop: E) -> Result<ExopResult>
    where
        E: Into<Exop>,
    {
        let mut req = Packet::constructed(Class::Application, app_tags::EXTENDED_REQUEST);
        for part in construct_exop(exop.into()) {
            req.push(part);
        }
        self.op_call(LdapOp::Single, req)
            .await
            .map(|(result, exop, _)| ExopResult(exop, result))
    }

    /// Terminate the connection to the server. Closing is idempotent:
    /// calling this on an already closed connection is a no-op.
    pub async fn unbind(&mut self) -> Result<()> {
        if self.tx.is_closed() {
            return Ok(());
        }
        let req = Packet::primitive(
            Class::Application,
            app_tags::UNBIND_REQUEST,
            Vec::new(),
        );
        match self.op_call(LdapOp::Unbind, req).await {
            Ok(_) => Ok(()),
            // lost a race with another close; same outcome
            Err(LdapError::ConnectionClosed) | Err(LdapError::ResultRecv { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Ask the server to abandon an operation identified by `msgid`. The
    /// abandoned operation gets no further responses; its ID is retired.
    pub async fn abandon(&mut self, msgid: MessageId) -> Result<()> {
        let req = Packet::primitive(
            Class::Application,
            app_tags::ABANDON_REQUEST,
            Packet::integer(i64::from(msgid))
                .into_bytes()
                .expect("integer bytes"),
        );
        self.op_call(LdapOp::Abandon(msgid), req).await.map(|_| ())
    }

    /// The message ID of the last operation submitted through this handle.
    /// Zero before the first operation. Intended for passing a timed-out
    /// operation's ID to [`abandon()`](#method.abandon).
    pub fn last_id(&self) -> MessageId {
        self.last_id
    }

    /// Whether the underlying connection has been closed. This checks the
    /// channel to the connection driver, not the socket itself.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Whether the transport is TLS-wrapped (`ldaps://` or StartTLS).
    pub fn has_tls(&self) -> bool {
        self.has_tls
    }
}
