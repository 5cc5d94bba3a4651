// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end scenarios exercising the connection state machine and LLRP
//! discovery loop without a real socket, mirroring the teacher's
//! `discovery_integration.rs` / `mobility_e2e.rs` style of driving whole
//! subsystems through their public API from a `tests/` integration file.

use std::io::{self, Cursor, Read, Write};
use std::time::{Duration, Instant};

use rdmnet::codec::broker::{
    self, ClientEntry, ClientEntryData, ConnectReplyPdu, RedirectPdu, RPT_CLIENT_TYPE_CONTROLLER,
};
use rdmnet::codec::llrp::{ComponentType, ProbeReply};
use rdmnet::codec::rdm::{AckOverflowReassembler, CommandClass, ReassembleOutcome, RdmPacket, ResponseType};
use rdmnet::codec::root::pack_root_header;
use rdmnet::codec::preamble::{pack_tcp_preamble, TCP_PREAMBLE_LEN};
use rdmnet::codec::root::ROOT_LAYER_HEADER_LEN;
use rdmnet::codec::vector;
use rdmnet::config::HEARTBEAT_TIMEOUT;
use rdmnet::connection::{Connection, ConnectionEvent, ConnectionState};
use rdmnet::error::{ConnectStatus, DisconnectReason};
use rdmnet::ids::{Cid, Scope, Uid};
use rdmnet::llrp::manager::{ManagerEvent, UidDiscoveryManager};
use rdmnet::llrp::target::{TargetEvent, UidDiscoveryTarget};

struct DuplexStream {
    inbound: Cursor<Vec<u8>>,
    outbound: Vec<u8>,
}

impl DuplexStream {
    fn with_inbound(data: Vec<u8>) -> Self {
        Self { inbound: Cursor::new(data), outbound: Vec::new() }
    }
}

impl Read for DuplexStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inbound.read(buf)?;
        if n == 0 {
            Err(io::Error::new(io::ErrorKind::WouldBlock, "no more data"))
        } else {
            Ok(n)
        }
    }
}

impl Write for DuplexStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.outbound.extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn wrap_broker_pdu(sender_cid: Cid, broker_vector: u16, broker_data: &[u8]) -> Vec<u8> {
    let mut broker_buf = vec![0u8; broker::BROKER_HEADER_LEN + broker_data.len()];
    broker::pack_broker_header(&mut broker_buf, broker_vector, broker_data.len()).unwrap();
    broker_buf[broker::BROKER_HEADER_LEN..].copy_from_slice(broker_data);

    let mut root_buf = vec![0u8; ROOT_LAYER_HEADER_LEN + broker_buf.len()];
    pack_root_header(&mut root_buf, vector::ROOT_BROKER, sender_cid, broker_buf.len()).unwrap();
    root_buf[ROOT_LAYER_HEADER_LEN..].copy_from_slice(&broker_buf);

    let mut out = vec![0u8; TCP_PREAMBLE_LEN + root_buf.len()];
    pack_tcp_preamble(&mut out, root_buf.len() as u32).unwrap();
    out[TCP_PREAMBLE_LEN..].copy_from_slice(&root_buf);
    out
}

fn wrap_rpt_notification(sender_cid: Cid, address: &rdmnet::codec::rpt::RptAddress, rdm_data: &[u8]) -> Vec<u8> {
    let mut rpt_buf = vec![0u8; rdmnet::codec::rpt::RPT_ADDRESS_HEADER_LEN + rdm_data.len()];
    let n = rdmnet::codec::rpt::pack_rpt_address(&mut rpt_buf, address).unwrap();
    rpt_buf[n..].copy_from_slice(rdm_data);

    let mut framed_rpt = vec![0u8; rdmnet::codec::rpt::RPT_PDU_HEADER_LEN + rpt_buf.len()];
    rdmnet::codec::rpt::pack_rpt_pdu_header(&mut framed_rpt, vector::RPT_NOTIFICATION, rpt_buf.len()).unwrap();
    framed_rpt[rdmnet::codec::rpt::RPT_PDU_HEADER_LEN..].copy_from_slice(&rpt_buf);

    let mut root_buf = vec![0u8; ROOT_LAYER_HEADER_LEN + framed_rpt.len()];
    pack_root_header(&mut root_buf, vector::ROOT_RPT, sender_cid, framed_rpt.len()).unwrap();
    root_buf[ROOT_LAYER_HEADER_LEN..].copy_from_slice(&framed_rpt);

    let mut out = vec![0u8; TCP_PREAMBLE_LEN + root_buf.len()];
    pack_tcp_preamble(&mut out, root_buf.len() as u32).unwrap();
    out[TCP_PREAMBLE_LEN..].copy_from_slice(&root_buf);
    out
}

fn controller_entry(uid: Uid) -> ClientEntry {
    ClientEntry {
        client_protocol: vector::CLIENT_PROTOCOL_RPT,
        client_cid: Cid::new_random(),
        data: ClientEntryData::Rpt {
            client_uid: uid,
            client_type: RPT_CLIENT_TYPE_CONTROLLER,
            binding_cid: Cid::ZERO,
        },
    }
}

/// Scenario 1 (clean connect): CONNECT is sent, CONNECT_REPLY with Ok status
/// is accepted, the connection reaches `Heartbeat`.
#[test]
fn scenario_clean_connect() {
    let local_cid = Cid::new_random();
    let mut conn = Connection::new(local_cid, Scope::default_scope(), controller_entry(Uid::new(0x6574, 1)));
    conn.begin_tcp_connect();
    conn.on_tcp_connected();

    let broker_cid = Cid::new_random();
    let mut reply_body = vec![0u8; 26];
    broker::pack_connect_reply(
        &mut reply_body,
        &ConnectReplyPdu {
            connect_status: ConnectStatus::Ok,
            e133_version: 1,
            broker_cid,
            client_uid: Uid::new(0x6574, 1),
        },
    )
    .unwrap();
    let frame = wrap_broker_pdu(broker_cid, vector::BROKER_CONNECT_REPLY, &reply_body);

    let mut stream = DuplexStream::with_inbound(frame);
    let events = conn.recv(&mut stream).unwrap();
    assert_eq!(conn.state(), ConnectionState::Heartbeat);
    assert_eq!(events, vec![ConnectionEvent::Connected { broker_cid }]);
    assert!(conn.flush(&mut stream).is_ok());
}

/// Scenario 2 (connect redirect): a REDIRECT reply surfaces the new address
/// without tearing the connection down, and a redirect chain longer than
/// `MAX_REDIRECTS` is reported as `RedirectLoop`.
#[test]
fn scenario_connect_redirect_then_loop_detected() {
    let local_cid = Cid::new_random();
    let mut conn = Connection::new(local_cid, Scope::default_scope(), controller_entry(Uid::new(0x6574, 2)));
    conn.begin_tcp_connect();
    conn.on_tcp_connected();

    let redirect_addr: std::net::SocketAddr = "10.0.0.5:8888".parse().unwrap();
    let mut redirect_body = vec![0u8; 6];
    broker::pack_redirect(&mut redirect_body, &RedirectPdu { addr: redirect_addr }).unwrap();
    let frame = wrap_broker_pdu(Cid::new_random(), vector::BROKER_REDIRECT, &redirect_body);

    let mut stream = DuplexStream::with_inbound(frame);
    let events = conn.recv(&mut stream).unwrap();
    assert_eq!(events, vec![ConnectionEvent::Redirected(redirect_addr)]);
    assert_ne!(conn.state(), ConnectionState::Shutdown);

    for _ in 0..10 {
        let frame = wrap_broker_pdu(Cid::new_random(), vector::BROKER_REDIRECT, &redirect_body);
        let mut stream = DuplexStream::with_inbound(frame);
        let _ = conn.recv(&mut stream);
    }
    assert_eq!(conn.state(), ConnectionState::BackoffPending);
}

/// Scenario 3 (heartbeat timeout): no inbound bytes within
/// `HEARTBEAT_TIMEOUT` disconnects the connection with `NoHeartbeat`.
#[test]
fn scenario_heartbeat_timeout() {
    let local_cid = Cid::new_random();
    let mut conn = Connection::new(local_cid, Scope::default_scope(), controller_entry(Uid::new(0x6574, 3)));
    conn.begin_tcp_connect();
    conn.on_tcp_connected();

    let broker_cid = Cid::new_random();
    let mut reply_body = vec![0u8; 26];
    broker::pack_connect_reply(
        &mut reply_body,
        &ConnectReplyPdu {
            connect_status: ConnectStatus::Ok,
            e133_version: 1,
            broker_cid,
            client_uid: Uid::new(0x6574, 3),
        },
    )
    .unwrap();
    let frame = wrap_broker_pdu(broker_cid, vector::BROKER_CONNECT_REPLY, &reply_body);
    let mut stream = DuplexStream::with_inbound(frame);
    conn.recv(&mut stream).unwrap();
    assert_eq!(conn.state(), ConnectionState::Heartbeat);

    let future = Instant::now() + HEARTBEAT_TIMEOUT + Duration::from_millis(1);
    let events = conn.tick(future);
    assert_eq!(events, vec![ConnectionEvent::Disconnected(DisconnectReason::NoHeartbeat)]);
    assert_eq!(conn.state(), ConnectionState::BackoffPending);
}

/// Scenario 4 (LLRP discovery, three targets): a manager's discovery cycle
/// surfaces exactly three distinct targets and finishes.
#[test]
fn scenario_llrp_three_targets_discovered() {
    let mut manager = UidDiscoveryManager::new();
    let mut now = Instant::now();

    let targets_spec = [
        (Uid::new(0x6574, 1), Cid::new_random()),
        (Uid::new(0x6574, 2), Cid::new_random()),
        (Uid::new(0x6574, 3), Cid::new_random()),
    ];
    let mut targets: Vec<UidDiscoveryTarget> = targets_spec
        .iter()
        .map(|(uid, cid)| UidDiscoveryTarget::new(*uid, *cid, [0; 6], ComponentType::RptDevice))
        .collect();

    let send_probe = manager.start(0, now);
    run_probe_round(&send_probe, &mut targets, &mut manager, now);

    // Advance through LLRP_CLEAN_SENDS_THRESHOLD clean windows so the
    // manager retransmits twice, then advances the range to empty and
    // finishes (mirrors `clean_window_retransmits_twice_then_advances`).
    let mut finished = false;
    for _ in 0..4 {
        now += Duration::from_secs(4);
        if let Some(event) = manager.tick(now) {
            match event {
                ManagerEvent::SendProbe { .. } | ManagerEvent::Retransmit => {
                    if let ManagerEvent::SendProbe { .. } = &event {
                        run_probe_round(&event, &mut targets, &mut manager, now);
                    }
                }
                ManagerEvent::DiscoveryFinished => {
                    finished = true;
                    break;
                }
                ManagerEvent::TargetDiscovered { .. } => {}
            }
        }
    }

    assert!(finished, "expected discovery to finish within the test horizon");
    assert_eq!(manager.discovered_count(), 3);
}

fn run_probe_round(
    send_probe: &ManagerEvent,
    targets: &mut [UidDiscoveryTarget],
    manager: &mut UidDiscoveryManager,
    now: Instant,
) {
    let ManagerEvent::SendProbe { lower_uid, upper_uid, filter, known_uids } = send_probe else {
        panic!("expected SendProbe");
    };
    let req = rdmnet::codec::llrp::ProbeRequest {
        lower_uid: *lower_uid,
        upper_uid: *upper_uid,
        filter: *filter,
        known_uids: known_uids.clone(),
    };
    for target in targets.iter_mut() {
        target.on_probe_request(&req, now);
    }
    let later = now + Duration::from_millis(rdmnet::config::LLRP_MAX_BACKOFF_MS + 1);
    for target in targets.iter_mut() {
        if let Some(TargetEvent::SendReply(reply)) = target.tick(later) {
            manager.on_probe_reply(&reply);
        }
    }
}

/// Scenario 5 (same UID, different CID): two targets declaring the same
/// UID with distinct CIDs both surface as discovered, neither dropped.
#[test]
fn scenario_llrp_same_uid_different_cid_both_surface() {
    let mut manager = UidDiscoveryManager::new();
    let now = Instant::now();
    manager.start(0, now);

    let uid = Uid::new(0x6574, 1);
    let reply_a = ProbeReply {
        target_uid: uid,
        target_cid: Cid::new_random(),
        hardware_id: [0; 6],
        component_type: ComponentType::RptDevice,
    };
    let reply_b = ProbeReply {
        target_uid: uid,
        target_cid: Cid::new_random(),
        hardware_id: [0; 6],
        component_type: ComponentType::RptDevice,
    };

    let first = manager.on_probe_reply(&reply_a);
    let second = manager.on_probe_reply(&reply_b);
    assert!(matches!(first, Some(ManagerEvent::TargetDiscovered { .. })));
    assert!(matches!(second, Some(ManagerEvent::TargetDiscovered { .. })));
    assert_eq!(manager.discovered_count(), 2);
}

/// Scenario 6 (ACK_OVERFLOW reassembly): a chain of ACK_OVERFLOW responses
/// reassembles into one logical RDM response capped at the configured
/// maximum.
#[test]
fn scenario_ack_overflow_reassembly() {
    let mut reassembler = AckOverflowReassembler::new();
    let chunk_a = vec![0xAAu8; 20];
    let chunk_b = vec![0xBBu8; 15];

    let part1 = RdmPacket {
        dest_uid: Uid::new(0x6574, 1),
        source_uid: Uid::new(0x6574, 100),
        transaction_number: 9,
        response_type: ResponseType::AckOverflow,
        message_count: 0,
        sub_device: 0,
        command_class: CommandClass::GetCommandResponse,
        parameter_id: 0x0060,
        parameter_data: chunk_a.clone(),
    };
    let part2 = RdmPacket {
        response_type: ResponseType::Ack,
        parameter_data: chunk_b.clone(),
        ..part1.clone()
    };

    assert_eq!(reassembler.feed(&part1).unwrap(), ReassembleOutcome::Pending);
    assert_eq!(reassembler.feed(&part2).unwrap(), ReassembleOutcome::Complete);

    let data = reassembler.take();
    assert_eq!(data.len(), chunk_a.len() + chunk_b.len());
    assert_eq!(&data[..chunk_a.len()], &chunk_a[..]);
    assert_eq!(&data[chunk_a.len()..], &chunk_b[..]);
}

/// Scenario 6, end-to-end: a Notification PDU carrying four ACK_OVERFLOW
/// RDM responses (200 bytes each) and one terminating ACK (50 bytes) is fed
/// through `Connection::recv`; exactly one `RptResponse` event is delivered
/// with `rdm_data` equal to the concatenation of all five payloads.
#[test]
fn scenario_ack_overflow_reassembly_through_connection() {
    let local_cid = Cid::new_random();
    let mut conn = Connection::new(local_cid, Scope::default_scope(), controller_entry(Uid::new(0x6574, 1)));
    conn.begin_tcp_connect();
    conn.on_tcp_connected();

    let broker_cid = Cid::new_random();
    let mut reply_body = vec![0u8; 26];
    broker::pack_connect_reply(
        &mut reply_body,
        &ConnectReplyPdu {
            connect_status: ConnectStatus::Ok,
            e133_version: 1,
            broker_cid,
            client_uid: Uid::new(0x6574, 1),
        },
    )
    .unwrap();
    let frame = wrap_broker_pdu(broker_cid, vector::BROKER_CONNECT_REPLY, &reply_body);
    let mut stream = DuplexStream::with_inbound(frame);
    conn.recv(&mut stream).unwrap();
    assert_eq!(conn.state(), ConnectionState::Heartbeat);

    let source_uid = Uid::new(0x6574, 100);
    let dest_uid = Uid::new(0x6574, 1);
    let address = rdmnet::codec::rpt::RptAddress {
        source_uid,
        source_endpoint_id: 0,
        dest_uid,
        dest_endpoint_id: 0,
        sequence_number: 1,
    };

    let mut rdm_bytes = Vec::new();
    let mut expected = Vec::new();
    for chunk in [[0xAAu8; 200], [0xBBu8; 200], [0xCCu8; 200], [0xDDu8; 200]] {
        let pkt = RdmPacket {
            dest_uid,
            source_uid,
            transaction_number: 42,
            response_type: ResponseType::AckOverflow,
            message_count: 0,
            sub_device: 0,
            command_class: CommandClass::GetCommandResponse,
            parameter_id: 0x0060,
            parameter_data: chunk.to_vec(),
        };
        let mut buf = [0u8; 256];
        let n = rdmnet::codec::rdm::pack_rdm_packet(&mut buf, &pkt).unwrap();
        rdm_bytes.extend_from_slice(&buf[..n]);
        expected.extend_from_slice(&chunk);
    }
    let terminal_data = vec![0xEEu8; 50];
    let terminal = RdmPacket {
        dest_uid,
        source_uid,
        transaction_number: 42,
        response_type: ResponseType::Ack,
        message_count: 0,
        sub_device: 0,
        command_class: CommandClass::GetCommandResponse,
        parameter_id: 0x0060,
        parameter_data: terminal_data.clone(),
    };
    let mut buf = [0u8; 256];
    let n = rdmnet::codec::rdm::pack_rdm_packet(&mut buf, &terminal).unwrap();
    rdm_bytes.extend_from_slice(&buf[..n]);
    expected.extend_from_slice(&terminal_data);

    assert_eq!(expected.len(), 850);

    let frame = wrap_rpt_notification(broker_cid, &address, &rdm_bytes);
    let mut stream = DuplexStream::with_inbound(frame);
    let events = conn.recv(&mut stream).unwrap();

    assert_eq!(events.len(), 1);
    match &events[0] {
        ConnectionEvent::RptResponse(msg) => {
            assert_eq!(msg.rdm_data.len(), 850);
            assert_eq!(msg.rdm_data, expected);
        }
        other => panic!("expected RptResponse, got {other:?}"),
    }
}
