// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RPT broker connection state machine (spec §4.4).
//!
//! Grounded in the teacher's `TcpConnection`
//! (`crates/hdds/src/transport/tcp/connection.rs`): a boxed byte stream, a
//! `VecDeque<Vec<u8>>` outbound queue with a partial-send cursor, a
//! `FlushResult` tri-state, and a `ConnectionState` enum with
//! `is_operational`/`is_terminal` helpers. The wire content and the state
//! table are RDMnet's (CONNECT/CONNECT_REPLY handshake, heartbeat,
//! redirect-with-cap, backoff-before-retry) rather than RTPS's.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::codec::broker::{
    self, AssignedDynamicUidListPdu, ClientEntry, ClientList, ConnectPdu, ConnectReplyPdu,
    DisconnectPdu, RedirectPdu,
};
use crate::codec::preamble::{pack_tcp_preamble, TCP_PREAMBLE_LEN};
use crate::codec::root::{pack_root_header, ROOT_LAYER_HEADER_LEN};
use crate::codec::ept::{EptData, EptStatus};
use crate::codec::rpt::{RptMessage, RptStatus};
use crate::codec::vector;
use crate::config::{
    CONNECT_BACKOFF_MAX, CONNECT_BACKOFF_MIN, CONNECT_REPLY_TIMEOUT, HEARTBEAT_SEND_INTERVAL,
    HEARTBEAT_TIMEOUT, MAX_REDIRECTS,
};
use crate::error::{ConnectFailedReason, ConnectStatus, DisconnectReason, DisconnectWireReason};
use crate::ids::{Cid, Scope};
use crate::message_buffer::MessageBuffer;
use crate::{debug, warn};

/// Anything a connection can read from and write to. Implemented for any
/// concrete `TcpStream`; tests use an in-memory double.
pub trait ByteStream: Read + Write + Send {}
impl<T: Read + Write + Send> ByteStream for T {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    NotConnected,
    TcpConnecting,
    RdmnetConnPending,
    Heartbeat,
    BackoffPending,
    Shutdown,
}

impl ConnectionState {
    pub fn is_operational(self) -> bool {
        matches!(self, Self::Heartbeat)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Shutdown)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotConnected => "not_connected",
            Self::TcpConnecting => "tcp_connecting",
            Self::RdmnetConnPending => "rdmnet_conn_pending",
            Self::Heartbeat => "heartbeat",
            Self::BackoffPending => "backoff_pending",
            Self::Shutdown => "shutdown",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushResult {
    /// Everything queued was written.
    Complete,
    /// The socket would block; some data remains queued.
    WouldBlock,
    /// Nothing was queued to begin with.
    Empty,
}

/// Events the state machine surfaces to its owner after feeding it bytes
/// or letting time pass; the owner (a `Client`) turns these into callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected { broker_cid: Cid },
    ConnectFailed(ConnectFailedReason),
    Disconnected(DisconnectReason),
    Redirected(SocketAddr),
    /// An RPT Request: a controller asking this device to execute an RDM
    /// command.
    RptCommand(RptMessage),
    /// An RPT Notification: a response to a command this client sent.
    RptResponse(RptMessage),
    /// An RPT Status PDU describing why a prior command could not be
    /// serviced (spec §4.3, §6).
    RptStatus(RptStatus),
    /// The broker's connected-client roster, in reply to a fetch or as an
    /// unsolicited add/remove/change notification (spec §4.2).
    ClientList(ClientList),
    /// Dynamic UID assignments returned by the broker (spec §4.2).
    DynamicUidAssignment(AssignedDynamicUidListPdu),
    /// EPT Data addressed to this component (spec §4.7 ambient addition).
    EptData(EptData),
    /// EPT Status describing why a prior EPT Data could not be serviced.
    EptStatus(EptStatus),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ConnectionStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub reconnect_count: u32,
}

pub struct Connection {
    state: ConnectionState,
    local_cid: Cid,
    scope: Scope,
    client_entry: ClientEntry,

    send_queue: VecDeque<Vec<u8>>,
    pending_send: Option<(Vec<u8>, usize)>,
    recv_buf: MessageBuffer,

    connect_deadline: Option<Instant>,
    last_send_time: Instant,
    last_recv_time: Instant,
    backoff_until: Option<Instant>,
    redirect_count: u32,
    ack_overflow: crate::codec::rdm::AckOverflowReassembler,

    pub stats: ConnectionStats,
}

impl Connection {
    pub fn new(local_cid: Cid, scope: Scope, client_entry: ClientEntry) -> Self {
        let now = Instant::now();
        Self {
            state: ConnectionState::NotConnected,
            local_cid,
            scope,
            client_entry,
            send_queue: VecDeque::new(),
            pending_send: None,
            recv_buf: MessageBuffer::new(),
            connect_deadline: None,
            last_send_time: now,
            last_recv_time: now,
            backoff_until: None,
            redirect_count: 0,
            ack_overflow: crate::codec::rdm::AckOverflowReassembler::new(),
            stats: ConnectionStats::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Caller has initiated a non-blocking TCP connect; record that we're
    /// waiting on the socket to become writable.
    pub fn begin_tcp_connect(&mut self) {
        self.state = ConnectionState::TcpConnecting;
    }

    /// The TCP socket became writable (connected). Builds and queues the
    /// CONNECT message, transitions to `RdmnetConnPending`.
    pub fn on_tcp_connected(&mut self) {
        let message = self.build_connect_message();
        self.queue_message(message);
        self.connect_deadline = Some(Instant::now() + CONNECT_REPLY_TIMEOUT);
        self.state = ConnectionState::RdmnetConnPending;
    }

    fn build_connect_message(&self) -> Vec<u8> {
        let pdu = ConnectPdu {
            client_cid: self.local_cid,
            scope: self.scope.clone(),
            e133_version: 1,
            connect_flags: 0,
            client_entry: self.client_entry.clone(),
        };
        let mut pdu_buf = vec![0u8; 512];
        let pdu_len = broker::pack_connect(&mut pdu_buf, &pdu).expect("fixed scratch buffer sized generously");
        self.wrap_broker_pdu(vector::BROKER_CONNECT, &pdu_buf[..pdu_len])
    }

    fn wrap_broker_pdu(&self, broker_vector: u16, broker_data: &[u8]) -> Vec<u8> {
        let mut broker_buf = vec![0u8; broker::BROKER_HEADER_LEN + broker_data.len()];
        broker::pack_broker_header(&mut broker_buf, broker_vector, broker_data.len()).unwrap();
        broker_buf[broker::BROKER_HEADER_LEN..].copy_from_slice(broker_data);

        let mut root_buf = vec![0u8; ROOT_LAYER_HEADER_LEN + broker_buf.len()];
        pack_root_header(&mut root_buf, vector::ROOT_BROKER, self.local_cid, broker_buf.len()).unwrap();
        root_buf[ROOT_LAYER_HEADER_LEN..].copy_from_slice(&broker_buf);

        let mut out = vec![0u8; TCP_PREAMBLE_LEN + root_buf.len()];
        pack_tcp_preamble(&mut out, root_buf.len() as u32).unwrap();
        out[TCP_PREAMBLE_LEN..].copy_from_slice(&root_buf);
        out
    }

    fn queue_message(&mut self, message: Vec<u8>) {
        self.send_queue.push_back(message);
        self.stats.messages_sent += 1;
    }

    /// Queue an already-framed RPT message for sending (built by the owning
    /// `Client` via `codec::rpt`).
    pub fn send_rpt(&mut self, rpt_vector: u32, rpt_data: &[u8]) {
        let mut rpt_buf = vec![0u8; crate::codec::rpt::RPT_PDU_HEADER_LEN + rpt_data.len()];
        crate::codec::rpt::pack_rpt_pdu_header(&mut rpt_buf, rpt_vector, rpt_data.len()).unwrap();
        rpt_buf[crate::codec::rpt::RPT_PDU_HEADER_LEN..].copy_from_slice(rpt_data);

        let mut root_buf = vec![0u8; ROOT_LAYER_HEADER_LEN + rpt_buf.len()];
        pack_root_header(&mut root_buf, vector::ROOT_RPT, self.local_cid, rpt_buf.len()).unwrap();
        root_buf[ROOT_LAYER_HEADER_LEN..].copy_from_slice(&rpt_buf);

        let mut out = vec![0u8; TCP_PREAMBLE_LEN + root_buf.len()];
        pack_tcp_preamble(&mut out, root_buf.len() as u32).unwrap();
        out[TCP_PREAMBLE_LEN..].copy_from_slice(&root_buf);
        self.queue_message(out);
    }

    fn queue_heartbeat(&mut self) {
        let message = self.wrap_broker_pdu(vector::BROKER_NULL, &[]);
        self.queue_message(message);
        self.last_send_time = Instant::now();
    }

    fn queue_disconnect(&mut self, reason: DisconnectWireReason) {
        let mut data = [0u8; 2];
        broker::pack_disconnect(&mut data, &DisconnectPdu { reason }).unwrap();
        let message = self.wrap_broker_pdu(vector::BROKER_DISCONNECT, &data);
        self.queue_message(message);
    }

    /// Drain as much of the send queue as the socket will accept.
    pub fn flush(&mut self, stream: &mut dyn ByteStream) -> io::Result<FlushResult> {
        if self.pending_send.is_none() && self.send_queue.is_empty() {
            return Ok(FlushResult::Empty);
        }
        loop {
            if self.pending_send.is_none() {
                match self.send_queue.pop_front() {
                    Some(bytes) => self.pending_send = Some((bytes, 0)),
                    None => return Ok(FlushResult::Complete),
                }
            }
            let (bytes, cursor) = self.pending_send.as_mut().unwrap();
            match stream.write(&bytes[*cursor..]) {
                Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0")),
                Ok(n) => {
                    *cursor += n;
                    self.stats.bytes_sent += n as u64;
                    if *cursor == bytes.len() {
                        self.pending_send = None;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(FlushResult::WouldBlock),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Read available bytes from the stream, feed the reassembler, and
    /// process every complete frame that falls out.
    pub fn recv(&mut self, stream: &mut dyn ByteStream) -> io::Result<Vec<ConnectionEvent>> {
        let mut scratch = [0u8; 4096];
        let mut events = Vec::new();
        loop {
            match stream.read(&mut scratch) {
                Ok(0) => {
                    events.push(self.fail(DisconnectReason::Socket));
                    return Ok(events);
                }
                Ok(n) => {
                    self.stats.bytes_received += n as u64;
                    self.last_recv_time = Instant::now();
                    if self.recv_buf.feed(&scratch[..n]).is_err() {
                        events.push(self.fail(DisconnectReason::Protocol));
                        return Ok(events);
                    }
                    events.extend(self.drain_frames());
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(events)
    }

    fn drain_frames(&mut self) -> Vec<ConnectionEvent> {
        let mut events = Vec::new();
        loop {
            match self.recv_buf.take_next() {
                Ok(Some(frame)) => {
                    self.stats.messages_received += 1;
                    if let Some(ev) = self.handle_frame(frame) {
                        events.push(ev);
                    }
                    if self.state == ConnectionState::Shutdown {
                        break;
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    events.push(self.fail(DisconnectReason::Protocol));
                    break;
                }
            }
        }
        events
    }

    fn handle_frame(&mut self, frame: crate::message_buffer::FramedMessage) -> Option<ConnectionEvent> {
        match frame.vector {
            v if v == vector::ROOT_BROKER => self.handle_broker_frame(&frame.data),
            v if v == vector::ROOT_RPT => self.handle_rpt_frame(&frame.data),
            v if v == vector::ROOT_EPT => self.handle_ept_frame(&frame.data),
            _ => {
                debug!("connection: dropping frame with unsupported root vector 0x{:08x}", frame.vector);
                None
            }
        }
    }

    fn handle_broker_frame(&mut self, data: &[u8]) -> Option<ConnectionEvent> {
        let ((broker_vector, _), hdr_len) = broker::parse_broker_header(data).ok()?;
        let body = &data[hdr_len..];
        match broker_vector {
            v if v == vector::BROKER_CONNECT_REPLY => self.handle_connect_reply(body),
            v if v == vector::BROKER_REDIRECT => self.handle_redirect(body),
            v if v == vector::BROKER_DISCONNECT => {
                let (pdu, _) = broker::parse_disconnect(body).ok()?;
                Some(self.fail(DisconnectReason::Remote(pdu.reason)))
            }
            v if v == vector::BROKER_NULL => {
                // Heartbeat: `last_recv_time` was already bumped in `recv`.
                None
            }
            v if v == vector::BROKER_CONNECTED_CLIENT_LIST
                || v == vector::BROKER_CLIENT_ADD
                || v == vector::BROKER_CLIENT_REMOVE
                || v == vector::BROKER_CLIENT_ENTRY_CHANGE =>
            {
                let (list, _) = broker::parse_client_list(body).ok()?;
                Some(ConnectionEvent::ClientList(list))
            }
            v if v == vector::BROKER_ASSIGNED_DYNAMIC_UID_LIST => {
                let (pdu, _) = broker::parse_assigned_dynamic_uid_list(body).ok()?;
                Some(ConnectionEvent::DynamicUidAssignment(pdu))
            }
            other => {
                warn!("connection: unhandled broker vector 0x{other:04x}");
                None
            }
        }
    }

    fn handle_connect_reply(&mut self, body: &[u8]) -> Option<ConnectionEvent> {
        let (pdu, _) = broker::parse_connect_reply(body).ok()?;
        if self.state != ConnectionState::RdmnetConnPending {
            return None;
        }
        self.connect_deadline = None;
        if pdu.connect_status.is_ok() {
            self.state = ConnectionState::Heartbeat;
            self.last_send_time = Instant::now();
            Some(ConnectionEvent::Connected { broker_cid: pdu.broker_cid })
        } else {
            Some(self.fail_connect(ConnectFailedReason::Rejected(pdu.connect_status)))
        }
    }

    fn handle_redirect(&mut self, body: &[u8]) -> Option<ConnectionEvent> {
        let pdu: RedirectPdu = if body.len() >= 18 {
            broker::parse_redirect_v6(body).ok()?.0
        } else {
            broker::parse_redirect_v4(body).ok()?.0
        };
        self.redirect_count += 1;
        if self.redirect_count > MAX_REDIRECTS {
            return Some(self.fail_connect(ConnectFailedReason::RedirectLoop));
        }
        Some(ConnectionEvent::Redirected(pdu.addr))
    }

    fn handle_rpt_frame(&mut self, data: &[u8]) -> Option<ConnectionEvent> {
        if self.state != ConnectionState::Heartbeat {
            return None;
        }
        let ((rpt_vector, _), hdr_len) = crate::codec::rpt::parse_rpt_pdu_header(data).ok()?;
        let body = &data[hdr_len..];
        if rpt_vector == vector::RPT_REQUEST {
            let (msg, _) = crate::codec::rpt::parse_rpt_message(body).ok()?;
            Some(ConnectionEvent::RptCommand(msg))
        } else if rpt_vector == vector::RPT_NOTIFICATION {
            let (msg, _) = crate::codec::rpt::parse_rpt_message(body).ok()?;
            self.handle_rpt_notification(msg)
        } else if rpt_vector == vector::RPT_STATUS {
            let (status, _) = crate::codec::rpt::parse_rpt_status(body).ok()?;
            Some(ConnectionEvent::RptStatus(status))
        } else {
            None
        }
    }

    /// Parses the one or more RDM response sub-PDUs packed into a
    /// Notification's data and feeds each through [`AckOverflowReassembler`],
    /// emitting exactly one `RptResponse` once a non-overflow terminator
    /// closes the chain (spec §4.1).
    fn handle_rpt_notification(&mut self, msg: RptMessage) -> Option<ConnectionEvent> {
        use crate::codec::rdm::{parse_rdm_packet, ReassembleOutcome};

        let mut offset = 0;
        let mut completed = None;
        while offset < msg.rdm_data.len() {
            let (pkt, consumed) = parse_rdm_packet(&msg.rdm_data[offset..]).ok()?;
            offset += consumed;
            match self.ack_overflow.feed(&pkt) {
                Ok(ReassembleOutcome::Pending) => {}
                Ok(ReassembleOutcome::Complete) => {
                    completed = Some(RptMessage {
                        address: msg.address,
                        rdm_data: self.ack_overflow.take(),
                    });
                }
                Err(_) => return Some(self.fail(DisconnectReason::Protocol)),
            }
        }
        completed.map(ConnectionEvent::RptResponse)
    }

    fn handle_ept_frame(&mut self, data: &[u8]) -> Option<ConnectionEvent> {
        if self.state != ConnectionState::Heartbeat {
            return None;
        }
        let ((ept_vector, _), hdr_len) = crate::codec::ept::parse_ept_pdu_header(data).ok()?;
        let body = &data[hdr_len..];
        if ept_vector == crate::codec::ept::EPT_VECTOR_DATA {
            let (pdu, _) = crate::codec::ept::parse_ept_data(body).ok()?;
            Some(ConnectionEvent::EptData(pdu))
        } else if ept_vector == crate::codec::ept::EPT_VECTOR_STATUS {
            let (pdu, _) = crate::codec::ept::parse_ept_status(body).ok()?;
            Some(ConnectionEvent::EptStatus(pdu))
        } else {
            None
        }
    }

    /// Queue an already-framed EPT message for sending (built by the owning
    /// `Client` via `codec::ept`).
    pub fn send_ept(&mut self, ept_vector: u32, ept_data: &[u8]) {
        let mut ept_buf = vec![0u8; crate::codec::ept::EPT_PDU_HEADER_LEN + ept_data.len()];
        crate::codec::ept::pack_ept_pdu_header(&mut ept_buf, ept_vector, ept_data.len()).unwrap();
        ept_buf[crate::codec::ept::EPT_PDU_HEADER_LEN..].copy_from_slice(ept_data);

        let mut root_buf = vec![0u8; ROOT_LAYER_HEADER_LEN + ept_buf.len()];
        pack_root_header(&mut root_buf, vector::ROOT_EPT, self.local_cid, ept_buf.len()).unwrap();
        root_buf[ROOT_LAYER_HEADER_LEN..].copy_from_slice(&ept_buf);

        let mut out = vec![0u8; TCP_PREAMBLE_LEN + root_buf.len()];
        pack_tcp_preamble(&mut out, root_buf.len() as u32).unwrap();
        out[TCP_PREAMBLE_LEN..].copy_from_slice(&root_buf);
        self.queue_message(out);
    }

    fn fail(&mut self, reason: DisconnectReason) -> ConnectionEvent {
        self.enter_backoff();
        ConnectionEvent::Disconnected(reason)
    }

    fn fail_connect(&mut self, reason: ConnectFailedReason) -> ConnectionEvent {
        self.enter_backoff();
        ConnectionEvent::ConnectFailed(reason)
    }

    fn enter_backoff(&mut self) {
        self.state = ConnectionState::BackoffPending;
        self.stats.reconnect_count += 1;
        self.send_queue.clear();
        self.pending_send = None;
        let span_ms = (CONNECT_BACKOFF_MAX - CONNECT_BACKOFF_MIN).as_millis() as u64;
        let jitter = if span_ms == 0 { 0 } else { fastrand::u64(0..=span_ms) };
        let delay = CONNECT_BACKOFF_MIN + Duration::from_millis(jitter);
        self.backoff_until = Some(Instant::now() + delay);
    }

    /// Time-driven transitions: heartbeat send/timeout, connect-reply
    /// timeout, backoff expiry. Call periodically (e.g. from `PollCore`'s
    /// timeout branch).
    pub fn tick(&mut self, now: Instant) -> Vec<ConnectionEvent> {
        let mut events = Vec::new();
        match self.state {
            ConnectionState::RdmnetConnPending => {
                if let Some(deadline) = self.connect_deadline {
                    if now >= deadline {
                        events.push(self.fail_connect(ConnectFailedReason::NoReply));
                    }
                }
            }
            ConnectionState::Heartbeat => {
                if now.duration_since(self.last_recv_time) >= HEARTBEAT_TIMEOUT {
                    events.push(self.fail(DisconnectReason::NoHeartbeat));
                } else if now.duration_since(self.last_send_time) >= HEARTBEAT_SEND_INTERVAL {
                    self.queue_heartbeat();
                }
            }
            ConnectionState::BackoffPending => {
                if let Some(until) = self.backoff_until {
                    if now >= until {
                        self.backoff_until = None;
                        self.state = ConnectionState::NotConnected;
                    }
                }
            }
            _ => {}
        }
        events
    }

    pub fn ready_to_retry(&self) -> bool {
        self.state == ConnectionState::NotConnected
    }

    pub fn shutdown(&mut self) {
        if self.state.is_operational() {
            self.queue_disconnect(DisconnectWireReason::Shutdown);
        }
        self.state = ConnectionState::Shutdown;
    }
}
