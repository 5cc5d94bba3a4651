// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client façade (spec §4.7): the public surface an RDMnet controller,
//! device, or EPT client instance is built on.
//!
//! Grounded in the teacher's `ServiceClient`
//! (`crates/hdds/src/rpc/client.rs`): a handle-keyed map of in-flight state
//! guarded by a lock (there, a `DashMap` of pending RPC calls; here, a
//! `parking_lot::RwLock` map of per-scope connections), a background poll
//! loop that resolves completions, and a `Drop` impl that tears everything
//! down. RDMnet has no request/response correlation to do at this layer
//! (that happens inside [`crate::connection::Connection`]) - what the
//! pattern buys here is the same shutdown-flag + background-thread
//! discipline applied to connection lifecycle instead of RPC replies.

use std::collections::HashMap;
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use crate::codec::broker::{
    AssignedDynamicUidListPdu, ClientEntry, ClientEntryData, ClientList, RPT_CLIENT_TYPE_CONTROLLER,
    RPT_CLIENT_TYPE_DEVICE,
};
use crate::codec::ept::{EptData, EptStatus};
use crate::codec::llrp::ProbeReply;
use crate::codec::rdm::RdmPacket;
use crate::codec::rpt::{RptMessage, RptStatus};
use crate::config::RuntimeConfig;
use crate::connection::{Connection, ConnectionEvent, ConnectionState};
use crate::discovery_adapter::{BrokerInfo, DiscoveryAdapter, DiscoveryListener};
use crate::error::{ConnectFailedReason, DisconnectReason, RdmnetError, RdmnetResult};
use crate::ids::{Cid, Scope, Uid};
use crate::llrp::target::UidDiscoveryTarget;
use crate::{debug, warn};

pub type ScopeHandle = u64;

/// What kind of RPT component this client instance presents as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientRole {
    Controller,
    Device,
    /// A second client protocol (spec §4.7 ambient addition): carries
    /// opaque, manufacturer-defined EPT sub-protocol data instead of RDM
    /// commands, addressed by CID rather than UID.
    Ept,
}

/// Typed callbacks delivered from the PollCore thread (spec §4.7). No
/// internal lock is held while these run; a callback may call back into
/// the `Client` that owns it, but must not destroy the scope whose
/// callback is in progress (it may only mark it for destruction).
pub trait ClientCallbacks: Send + Sync {
    fn connected(&self, _scope: ScopeHandle, _broker_cid: Cid) {}
    fn connect_failed(&self, _scope: ScopeHandle, _reason: ConnectFailedReason) {}
    fn disconnected(&self, _scope: ScopeHandle, _reason: DisconnectReason) {}
    /// An RPT Request arrived: a controller wants this device to execute an
    /// RDM command (device role only).
    fn rdm_command_received(&self, _scope: ScopeHandle, _message: RptMessage) {}
    /// An RPT Notification arrived: the response to a command this client
    /// sent (controller role only).
    fn rdm_response_received(&self, _scope: ScopeHandle, _message: RptMessage) {}
    /// The broker could not service a prior command (spec §4.3, §6).
    fn status_received(&self, _scope: ScopeHandle, _status: RptStatus) {}
    /// The broker's connected-client roster changed or was fetched.
    fn client_list_update(&self, _scope: ScopeHandle, _list: ClientList) {}
    /// The broker assigned or reported dynamic UIDs for binding CIDs this
    /// client requested.
    fn responder_ids_received(&self, _scope: ScopeHandle, _assignment: AssignedDynamicUidListPdu) {}
    /// An RDM command addressed to this component's LLRP target arrived
    /// over the LLRP UDP channel (as opposed to RPT over the broker
    /// connection). Invoked by the owner's LLRP receive loop, which is
    /// responsible for demultiplexing LLRP_RDM_CMD PDUs to the right
    /// `Client` - this trait method only carries the decoded RDM packet and
    /// the probe reply describing which target answered.
    fn llrp_rdm_command_received(&self, _target: ProbeReply, _command: RdmPacket) {}
    /// EPT Data addressed to this component (EPT role only).
    fn ept_data_received(&self, _scope: ScopeHandle, _data: EptData) {}
    /// EPT Status describing why a prior EPT Data could not be serviced.
    fn ept_status_received(&self, _scope: ScopeHandle, _status: EptStatus) {}
}

struct ScopeEntry {
    connection: Connection,
    stream: Option<TcpStream>,
    broker_addr: Option<SocketAddr>,
    discovery_adapter: Option<Arc<dyn DiscoveryAdapter>>,
}

/// One controller, device, or EPT-client instance. Owns a map of
/// `scope_handle -> (Connection, DiscoveryAdapter subscription)` plus a
/// single LLRP target representing this component on the discovery mesh.
pub struct Client {
    local_cid: Cid,
    role: ClientRole,
    uid: Uid,
    runtime: RuntimeConfig,
    callbacks: Arc<dyn ClientCallbacks>,
    scopes: RwLock<HashMap<ScopeHandle, ScopeEntry>>,
    next_handle: AtomicU64,
    llrp_target: RwLock<UidDiscoveryTarget>,
    shutdown: Arc<AtomicBool>,
}

struct ScopeListener {
    handle: ScopeHandle,
    pending_addr: Arc<RwLock<Option<SocketAddr>>>,
}

impl DiscoveryListener for ScopeListener {
    fn on_broker_found(&self, info: BrokerInfo) {
        if let Some(addr) = info.addrs.first() {
            *self.pending_addr.write() = Some(*addr);
            debug!("client: scope {} resolved broker at {addr}", self.handle);
        }
    }

    fn on_broker_lost(&self, _cid: Cid) {
        *self.pending_addr.write() = None;
    }
}

impl Client {
    pub fn new(role: ClientRole, uid: Uid, callbacks: Arc<dyn ClientCallbacks>) -> Self {
        let local_cid = Cid::new_random();
        let component_type = match role {
            ClientRole::Controller => crate::codec::llrp::ComponentType::RptController,
            ClientRole::Device => crate::codec::llrp::ComponentType::RptDevice,
            ClientRole::Ept => crate::codec::llrp::ComponentType::EptClient,
        };
        Self {
            local_cid,
            role,
            uid,
            runtime: RuntimeConfig::default(),
            callbacks,
            scopes: RwLock::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            llrp_target: RwLock::new(UidDiscoveryTarget::new(uid, local_cid, [0; 6], component_type)),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn local_cid(&self) -> Cid {
        self.local_cid
    }

    fn client_entry(&self) -> ClientEntry {
        let (client_protocol, data) = match self.role {
            ClientRole::Controller => (
                crate::codec::vector::CLIENT_PROTOCOL_RPT,
                ClientEntryData::Rpt {
                    client_uid: self.uid,
                    client_type: RPT_CLIENT_TYPE_CONTROLLER,
                    binding_cid: Cid::ZERO,
                },
            ),
            ClientRole::Device => (
                crate::codec::vector::CLIENT_PROTOCOL_RPT,
                ClientEntryData::Rpt {
                    client_uid: self.uid,
                    client_type: RPT_CLIENT_TYPE_DEVICE,
                    binding_cid: Cid::ZERO,
                },
            ),
            ClientRole::Ept => (
                crate::codec::vector::CLIENT_PROTOCOL_EPT,
                ClientEntryData::Ept {
                    protocols: Vec::new(),
                },
            ),
        };
        ClientEntry {
            client_protocol,
            client_cid: self.local_cid,
            data,
        }
    }

    /// Register interest in `scope`. If `static_broker` is `None`, the
    /// supplied discovery adapter is consulted for a broker address before
    /// any connect attempt begins (spec §4.7, "drives the DiscoveryAdapter
    /// on addScope").
    pub fn add_scope(
        &self,
        scope: Scope,
        static_broker: Option<SocketAddr>,
        discovery_adapter: Option<Arc<dyn DiscoveryAdapter>>,
    ) -> RdmnetResult<ScopeHandle> {
        if static_broker.is_none() && discovery_adapter.is_none() {
            return Err(RdmnetError::InvalidArg(
                "add_scope requires a static broker address or a discovery adapter",
            ));
        }
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let connection = Connection::new(self.local_cid, scope.clone(), self.client_entry());

        if let Some(adapter) = &discovery_adapter {
            let pending_addr = Arc::new(RwLock::new(static_broker));
            let listener = Arc::new(ScopeListener {
                handle,
                pending_addr: pending_addr.clone(),
            });
            adapter.register_scope(scope, listener);
        }

        self.scopes.write().insert(
            handle,
            ScopeEntry {
                connection,
                stream: None,
                broker_addr: static_broker,
                discovery_adapter,
            },
        );
        Ok(handle)
    }

    /// Drop a scope. Per spec §5, `destroy` is asynchronous-safe and
    /// idempotent - a handle that doesn't exist is not an error.
    pub fn remove_scope(&self, handle: ScopeHandle) {
        let mut scopes = self.scopes.write();
        if let Some(mut entry) = scopes.remove(&handle) {
            entry.connection.shutdown();
            if let Some(adapter) = entry.discovery_adapter.take() {
                adapter.unregister_scope(&Scope::default_scope());
            }
        }
    }

    /// Non-blocking: if a broker address is known and no connect attempt is
    /// already in flight, begin one.
    pub fn try_connect(&self, handle: ScopeHandle, now: Instant) -> RdmnetResult<()> {
        let mut scopes = self.scopes.write();
        let entry = scopes.get_mut(&handle).ok_or(RdmnetError::NotFound)?;
        if !entry.connection.ready_to_retry() || entry.stream.is_some() {
            return Ok(());
        }
        let Some(addr) = entry.broker_addr else {
            return Ok(());
        };
        match TcpStream::connect_timeout(&addr, self.runtime.connect_reply_timeout) {
            Ok(stream) => {
                stream.set_nonblocking(true).ok();
                entry.connection.begin_tcp_connect();
                entry.connection.on_tcp_connected();
                entry.stream = Some(stream);
                let _ = now;
                Ok(())
            }
            Err(e) => {
                warn!("client: TCP connect to {addr} failed: {e}");
                Ok(())
            }
        }
    }

    /// Drive one scope's connection forward: flush queued sends, read and
    /// dispatch inbound frames, apply time-driven transitions, and turn the
    /// resulting events into callbacks.
    pub fn poll_scope(&self, handle: ScopeHandle, now: Instant) -> RdmnetResult<()> {
        let mut scopes = self.scopes.write();
        let entry = scopes.get_mut(&handle).ok_or(RdmnetError::NotFound)?;
        let Some(stream) = entry.stream.as_mut() else {
            return Ok(());
        };

        let mut events = Vec::new();
        if let Ok(recv_events) = entry.connection.recv(stream) {
            events.extend(recv_events);
        }
        events.extend(entry.connection.tick(now));
        let _ = entry.connection.flush(stream);

        if entry.connection.state() == ConnectionState::Shutdown
            || entry.connection.state() == ConnectionState::BackoffPending
        {
            entry.stream = None;
        }
        drop(scopes);

        for event in events {
            self.dispatch(handle, event);
        }
        Ok(())
    }

    fn dispatch(&self, handle: ScopeHandle, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected { broker_cid } => {
                self.llrp_target.write().set_connected_to_broker(true);
                self.callbacks.connected(handle, broker_cid);
            }
            ConnectionEvent::ConnectFailed(reason) => self.callbacks.connect_failed(handle, reason),
            ConnectionEvent::Disconnected(reason) => {
                let still_connected = self
                    .scopes
                    .read()
                    .values()
                    .any(|entry| entry.connection.state() == ConnectionState::Heartbeat);
                self.llrp_target.write().set_connected_to_broker(still_connected);
                self.callbacks.disconnected(handle, reason);
            }
            ConnectionEvent::Redirected(addr) => {
                if let Some(entry) = self.scopes.write().get_mut(&handle) {
                    entry.broker_addr = Some(addr);
                }
            }
            ConnectionEvent::RptCommand(message) => self.callbacks.rdm_command_received(handle, message),
            ConnectionEvent::RptResponse(message) => self.callbacks.rdm_response_received(handle, message),
            ConnectionEvent::RptStatus(status) => self.callbacks.status_received(handle, status),
            ConnectionEvent::ClientList(list) => self.callbacks.client_list_update(handle, list),
            ConnectionEvent::DynamicUidAssignment(pdu) => self.callbacks.responder_ids_received(handle, pdu),
            ConnectionEvent::EptData(data) => self.callbacks.ept_data_received(handle, data),
            ConnectionEvent::EptStatus(status) => self.callbacks.ept_status_received(handle, status),
        }
    }

    /// Send an already-encoded RPT command/response on `handle`'s
    /// connection.
    pub fn send_rpt(&self, handle: ScopeHandle, rpt_vector: u32, rpt_data: &[u8]) -> RdmnetResult<()> {
        let mut scopes = self.scopes.write();
        let entry = scopes.get_mut(&handle).ok_or(RdmnetError::NotFound)?;
        entry.connection.send_rpt(rpt_vector, rpt_data);
        Ok(())
    }

    /// Send already-encoded EPT data/status on `handle`'s connection (EPT
    /// role only; RPT roles should use [`Client::send_rpt`]).
    pub fn send_ept(&self, handle: ScopeHandle, ept_vector: u32, ept_data: &[u8]) -> RdmnetResult<()> {
        let mut scopes = self.scopes.write();
        let entry = scopes.get_mut(&handle).ok_or(RdmnetError::NotFound)?;
        entry.connection.send_ept(ept_vector, ept_data);
        Ok(())
    }

    /// Feed an LLRP probe request addressed to this instance's target.
    pub fn on_llrp_probe(&self, req: &crate::codec::llrp::ProbeRequest, now: Instant) {
        self.llrp_target.write().on_probe_request(req, now);
    }

    /// Poll the LLRP target for a due reply.
    pub fn llrp_tick(&self, now: Instant) -> Option<crate::llrp::target::TargetEvent> {
        self.llrp_target.write().tick(now)
    }

    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut scopes = self.scopes.write();
        for (_, mut entry) in scopes.drain() {
            entry.connection.shutdown();
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingCallbacks {
        connected: Mutex<Vec<(ScopeHandle, Cid)>>,
    }

    impl ClientCallbacks for RecordingCallbacks {
        fn connected(&self, scope: ScopeHandle, broker_cid: Cid) {
            self.connected.lock().unwrap().push((scope, broker_cid));
        }
    }

    #[test]
    fn add_scope_requires_broker_source() {
        let client = Client::new(
            ClientRole::Controller,
            Uid::new(0x6574, 1),
            Arc::new(RecordingCallbacks { connected: Mutex::new(Vec::new()) }),
        );
        let result = client.add_scope(Scope::default_scope(), None, None);
        assert!(result.is_err());
    }

    #[test]
    fn add_scope_with_static_broker_succeeds_and_removal_is_idempotent() {
        let client = Client::new(
            ClientRole::Device,
            Uid::new(0x6574, 2),
            Arc::new(RecordingCallbacks { connected: Mutex::new(Vec::new()) }),
        );
        let addr: SocketAddr = "127.0.0.1:8888".parse().unwrap();
        let handle = client.add_scope(Scope::default_scope(), Some(addr), None).unwrap();
        client.remove_scope(handle);
        client.remove_scope(handle);
    }

    #[test]
    fn unknown_handle_operations_return_not_found() {
        let client = Client::new(
            ClientRole::Controller,
            Uid::new(0x6574, 3),
            Arc::new(RecordingCallbacks { connected: Mutex::new(Vec::new()) }),
        );
        assert_eq!(client.try_connect(999, Instant::now()), Err(RdmnetError::NotFound));
        assert_eq!(client.send_rpt(999, 0, &[]), Err(RdmnetError::NotFound));
    }
}
