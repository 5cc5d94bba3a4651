// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! LLRP target: the passive side of discovery, one per RDM device/broker
//! component (spec §4.5).
//!
//! Grounded in the teacher's connection state machine
//! (`crates/rdmnet/src/connection.rs`, itself modeled on
//! `crates/hdds/src/transport/tcp/connection.rs`): a small explicit state
//! enum plus a `tick(now)` method the caller drives from its poll loop,
//! rather than spawning a timer thread per target. A target never answers
//! immediately - it schedules a randomized backoff so that many targets
//! matching the same probe don't collide on the reply multicast group.

use std::time::{Duration, Instant};

use crate::codec::llrp::{
    ComponentType, ProbeReply, ProbeRequest, PROBE_FILTER_BROKERS_ONLY,
    PROBE_FILTER_CLIENT_CONN_INACTIVE,
};
use crate::codec::rdm::RdmPacket;
use crate::config::LLRP_MAX_BACKOFF_MS;
use crate::ids::{Cid, Uid};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    Idle,
    ReplyPending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetEvent {
    /// A reply is now due; send it and return to `Idle`.
    SendReply(ProbeReply),
    /// An RDM command carried over LLRP arrived addressed to this target;
    /// deliver it upward and wait for the user's response (spec §4.5 final
    /// paragraph).
    DeliverRdmCommand {
        manager_cid: Cid,
        transaction_num: u32,
        command: RdmPacket,
    },
    /// The user answered a delivered command; send this back to the
    /// response multicast group with the same transaction number.
    SendRdmResponse {
        manager_cid: Cid,
        transaction_num: u32,
        response: RdmPacket,
    },
}

/// One target's view of LLRP discovery: its own identity plus a single
/// outstanding scheduled reply (a second matching probe while one is
/// already pending just reschedules it, it does not queue a second one -
/// a manager that probes again before the first backoff expired is
/// re-polling the same range, not asking for two replies).
pub struct UidDiscoveryTarget {
    uid: Uid,
    cid: Cid,
    hardware_id: [u8; 6],
    component_type: ComponentType,
    state: TargetState,
    reply_due_at: Option<Instant>,
    connected_to_broker: bool,
    /// The command this target is currently expected to answer, if any
    /// (spec §4.5: "Targets MUST NOT send unsolicited RDM").
    pending_rdm: Option<(Cid, u32)>,
}

impl UidDiscoveryTarget {
    pub fn new(uid: Uid, cid: Cid, hardware_id: [u8; 6], component_type: ComponentType) -> Self {
        Self {
            uid,
            cid,
            hardware_id,
            component_type,
            state: TargetState::Idle,
            reply_due_at: None,
            connected_to_broker: false,
            pending_rdm: None,
        }
    }

    pub fn state(&self) -> TargetState {
        self.state
    }

    /// Update broker-connection status as the owning client's RPT connection
    /// transitions, so a later Probe Request with `CLIENT_CONN_INACTIVE` set
    /// can be evaluated correctly (spec §4.5 step 4).
    pub fn set_connected_to_broker(&mut self, connected: bool) {
        self.connected_to_broker = connected;
    }

    /// Evaluate an incoming Probe Request against this target (spec §4.5
    /// steps 1-5: CID addressing is the caller's job, since it reads the
    /// LLRP PDU header before the Probe Request body is even parsed).
    ///
    /// Schedules a randomized reply if the probe matches; does nothing
    /// otherwise. `now` is supplied by the caller so target logic stays
    /// free of a hidden clock dependency.
    pub fn on_probe_request(&mut self, req: &ProbeRequest, now: Instant) {
        if req.filter & PROBE_FILTER_BROKERS_ONLY != 0 && self.component_type != ComponentType::Broker {
            return;
        }
        if req.filter & PROBE_FILTER_CLIENT_CONN_INACTIVE != 0 && self.connected_to_broker {
            return;
        }
        if self.uid.as_u64() < req.lower_uid.as_u64() || self.uid.as_u64() > req.upper_uid.as_u64() {
            return;
        }
        if req.known_uids.contains(&self.uid) {
            return;
        }
        let jitter_ms = fastrand::u64(0..=LLRP_MAX_BACKOFF_MS);
        self.reply_due_at = Some(now + Duration::from_millis(jitter_ms));
        self.state = TargetState::ReplyPending;
    }

    /// Return the due reply, if any, and reset to `Idle`.
    pub fn tick(&mut self, now: Instant) -> Option<TargetEvent> {
        let due = self.reply_due_at?;
        if now < due {
            return None;
        }
        self.reply_due_at = None;
        self.state = TargetState::Idle;
        Some(TargetEvent::SendReply(ProbeReply {
            target_uid: self.uid,
            target_cid: self.cid,
            hardware_id: self.hardware_id,
            component_type: self.component_type,
        }))
    }

    /// An RDM command carried over LLRP arrived addressed to this target's
    /// CID (header demultiplexing, like a probe's, is the caller's job).
    /// Records the transaction as pending and delivers it upward; the
    /// caller must answer through `respond_to_rdm_command`.
    pub fn on_rdm_command(
        &mut self,
        manager_cid: Cid,
        transaction_num: u32,
        command: RdmPacket,
    ) -> TargetEvent {
        self.pending_rdm = Some((manager_cid, transaction_num));
        TargetEvent::DeliverRdmCommand { manager_cid, transaction_num, command }
    }

    /// Answer the command currently awaiting a response. Returns `None`
    /// without arming a send if `transaction_num` doesn't match what's
    /// pending, so a stale or mismatched response never goes out
    /// unsolicited (spec §4.5).
    pub fn respond_to_rdm_command(&mut self, transaction_num: u32, response: RdmPacket) -> Option<TargetEvent> {
        let (manager_cid, pending_txn) = self.pending_rdm?;
        if pending_txn != transaction_num {
            return None;
        }
        self.pending_rdm = None;
        Some(TargetEvent::SendRdmResponse { manager_cid, transaction_num, response })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::rdm::{CommandClass, ResponseType};

    fn target() -> UidDiscoveryTarget {
        UidDiscoveryTarget::new(
            Uid::new(0x6574, 42),
            Cid::new_random(),
            [1, 2, 3, 4, 5, 6],
            ComponentType::RptDevice,
        )
    }

    fn request(lower: Uid, upper: Uid, filter: u16, known: Vec<Uid>) -> ProbeRequest {
        ProbeRequest {
            lower_uid: lower,
            upper_uid: upper,
            filter,
            known_uids: known,
        }
    }

    #[test]
    fn matches_probe_in_range_and_schedules_reply() {
        let mut t = target();
        let now = Instant::now();
        t.on_probe_request(&request(Uid::new(0, 0), Uid::BROADCAST, 0, vec![]), now);
        assert_eq!(t.state(), TargetState::ReplyPending);
        assert_eq!(t.tick(now), None);
        let later = now + Duration::from_millis(LLRP_MAX_BACKOFF_MS + 1);
        match t.tick(later) {
            Some(TargetEvent::SendReply(reply)) => assert_eq!(reply.target_uid, Uid::new(0x6574, 42)),
            other => panic!("expected SendReply, got {other:?}"),
        }
        assert_eq!(t.state(), TargetState::Idle);
    }

    #[test]
    fn ignores_probe_outside_uid_range() {
        let mut t = target();
        let now = Instant::now();
        t.on_probe_request(
            &request(Uid::new(0x9999, 0), Uid::new(0x9999, 100), 0, vec![]),
            now,
        );
        assert_eq!(t.state(), TargetState::Idle);
    }

    #[test]
    fn ignores_brokers_only_filter_when_not_a_broker() {
        let mut t = target();
        let now = Instant::now();
        t.on_probe_request(
            &request(Uid::new(0, 0), Uid::BROADCAST, PROBE_FILTER_BROKERS_ONLY, vec![]),
            now,
        );
        assert_eq!(t.state(), TargetState::Idle);
    }

    #[test]
    fn stays_silent_when_already_known() {
        let mut t = target();
        let now = Instant::now();
        t.on_probe_request(
            &request(Uid::new(0, 0), Uid::BROADCAST, 0, vec![Uid::new(0x6574, 42)]),
            now,
        );
        assert_eq!(t.state(), TargetState::Idle);
    }

    #[test]
    fn ignores_client_conn_inactive_filter_when_connected() {
        let mut t = target();
        t.set_connected_to_broker(true);
        let now = Instant::now();
        t.on_probe_request(
            &request(
                Uid::new(0, 0),
                Uid::BROADCAST,
                PROBE_FILTER_CLIENT_CONN_INACTIVE,
                vec![],
            ),
            now,
        );
        assert_eq!(t.state(), TargetState::Idle);
    }

    #[test]
    fn answers_client_conn_inactive_filter_when_disconnected() {
        let mut t = target();
        let now = Instant::now();
        t.on_probe_request(
            &request(
                Uid::new(0, 0),
                Uid::BROADCAST,
                PROBE_FILTER_CLIENT_CONN_INACTIVE,
                vec![],
            ),
            now,
        );
        assert_eq!(t.state(), TargetState::ReplyPending);
    }

    fn sample_command() -> RdmPacket {
        RdmPacket {
            dest_uid: Uid::new(0x6574, 42),
            source_uid: Uid::new(0x6574, 0x8001),
            transaction_number: 3,
            response_type: ResponseType::PortId(1),
            message_count: 0,
            sub_device: 0,
            command_class: CommandClass::GetCommand,
            parameter_id: 0x0060,
            parameter_data: vec![],
        }
    }

    #[test]
    fn rdm_command_round_trips_to_a_response() {
        let mut t = target();
        let manager_cid = Cid::new_random();
        let command = sample_command();
        match t.on_rdm_command(manager_cid, 7, command.clone()) {
            TargetEvent::DeliverRdmCommand { manager_cid: cid, transaction_num, command: cmd } => {
                assert_eq!(cid, manager_cid);
                assert_eq!(transaction_num, 7);
                assert_eq!(cmd, command);
            }
            other => panic!("expected DeliverRdmCommand, got {other:?}"),
        }

        let response = RdmPacket {
            response_type: ResponseType::Ack,
            command_class: CommandClass::GetCommandResponse,
            ..command
        };
        match t.respond_to_rdm_command(7, response.clone()) {
            Some(TargetEvent::SendRdmResponse { manager_cid: cid, transaction_num, response: resp }) => {
                assert_eq!(cid, manager_cid);
                assert_eq!(transaction_num, 7);
                assert_eq!(resp, response);
            }
            other => panic!("expected SendRdmResponse, got {other:?}"),
        }
    }

    #[test]
    fn rejects_response_to_a_transaction_that_was_never_delivered() {
        let mut t = target();
        assert_eq!(t.respond_to_rdm_command(1, sample_command()), None);
    }

    #[test]
    fn rejects_response_with_mismatched_transaction_number() {
        let mut t = target();
        t.on_rdm_command(Cid::new_random(), 7, sample_command());
        assert_eq!(t.respond_to_rdm_command(8, sample_command()), None);
    }
}
