// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! LLRP manager: binary-search UID discovery over the 48-bit RDM UID space
//! (spec §4.6).
//!
//! Grounded in the teacher's `DiscoveryFsm`
//! (`crates/hdds/src/core/discovery/multicast/fsm/discovery.rs`): a
//! participant database keyed by identity, callbacks fired as entries are
//! confirmed, driven by a caller-owned tick rather than an internal timer
//! thread. Here the "participant database" is `discovered`, keyed by UID
//! with a CID chain (the same UID legitimately resolving to more than one
//! component), and "confirmed" means surviving a full discovery window
//! instead of a liveliness count.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::codec::llrp::ProbeReply;
use crate::codec::rdm::{CommandClass, RdmPacket, ResponseType};
use crate::config::{LLRP_CLEAN_SENDS_THRESHOLD, LLRP_DISCOVERY_TIMER, LLRP_KNOWN_UID_SIZE};
use crate::ids::{Cid, Uid};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Idle,
    Discovering,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerEvent {
    /// Send this probe request now (manager transmits to the request
    /// multicast group; constructing the full PDU from `(low, high,
    /// known_uids, filter)` is the caller's job since it also owns the CID
    /// and transaction-number fields that live in the outer LLRP header).
    SendProbe {
        lower_uid: Uid,
        upper_uid: Uid,
        known_uids: Vec<Uid>,
        filter: u16,
    },
    /// A new (UID, CID) pair was confirmed this cycle.
    TargetDiscovered { uid: Uid, cid: Cid },
    /// The discovery window closed and the manager decided to re-send the
    /// same probe (packet-loss protection) rather than advance the range.
    Retransmit,
    /// The entire 48-bit space has been covered.
    DiscoveryFinished,
    /// Send this RDM command now (spec §4.6 final paragraph); constructing
    /// the outer LLRP header's `dest_cid`/`transaction_num` from the
    /// returned fields and transmitting to the request multicast group is
    /// the caller's job, same division as `SendProbe`.
    SendRdmCommand {
        dest_cid: Cid,
        transaction_num: u32,
        command: RdmPacket,
    },
    /// A response matching an outstanding transaction arrived.
    RdmResponseReceived { transaction_num: u32, response: RdmPacket },
}

/// Binary-search discovery state for one manager instance.
pub struct UidDiscoveryManager {
    filter: u16,
    state: ManagerState,
    low: Uid,
    high: Uid,
    clean_sends: u32,
    window_deadline: Option<Instant>,
    discovered: HashMap<Uid, Vec<Cid>>,
    next_transaction: u32,
    pending_rdm: HashSet<u32>,
}

impl UidDiscoveryManager {
    pub fn new() -> Self {
        Self {
            filter: 0,
            state: ManagerState::Idle,
            low: Uid::from_u64(0),
            high: Uid::BROADCAST,
            clean_sends: 0,
            window_deadline: None,
            discovered: HashMap::new(),
            next_transaction: 0,
            pending_rdm: HashSet::new(),
        }
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    pub fn discovered_count(&self) -> usize {
        self.discovered.values().map(Vec::len).sum()
    }

    /// Begin (or restart) a discovery cycle (step 1-3). Returns the first
    /// probe to send.
    pub fn start(&mut self, filter: u16, now: Instant) -> ManagerEvent {
        self.filter = filter;
        self.state = ManagerState::Discovering;
        self.low = Uid::from_u64(0);
        self.high = Uid::BROADCAST;
        self.clean_sends = 0;
        self.discovered.clear();
        self.window_deadline = Some(now + LLRP_DISCOVERY_TIMER);
        self.current_probe()
    }

    fn current_probe(&self) -> ManagerEvent {
        ManagerEvent::SendProbe {
            lower_uid: self.low,
            upper_uid: self.high,
            known_uids: self.known_uids_in_range(),
            filter: self.filter,
        }
    }

    fn uids_in_range(&self) -> impl Iterator<Item = &Uid> {
        self.discovered
            .keys()
            .filter(|uid| uid.as_u64() >= self.low.as_u64() && uid.as_u64() <= self.high.as_u64())
    }

    fn known_uids_in_range(&self) -> Vec<Uid> {
        let mut uids: Vec<Uid> = self.uids_in_range().copied().collect();
        uids.truncate(LLRP_KNOWN_UID_SIZE);
        uids
    }

    /// Record a probe reply received during the current window (step 4).
    /// Returns `Some` the first time this `(uid, cid)` pair is seen; a
    /// duplicate within the same window (retransmitted reply) is silently
    /// absorbed.
    pub fn on_probe_reply(&mut self, reply: &ProbeReply) -> Option<ManagerEvent> {
        if self.state != ManagerState::Discovering {
            return None;
        }
        let chain = self.discovered.entry(reply.target_uid).or_default();
        if chain.contains(&reply.target_cid) {
            return None;
        }
        chain.push(reply.target_cid);
        self.clean_sends = 0;
        Some(ManagerEvent::TargetDiscovered {
            uid: reply.target_uid,
            cid: reply.target_cid,
        })
    }

    /// Drive the discovery window forward (step 5). Returns `None` if the
    /// window has not yet elapsed.
    pub fn tick(&mut self, now: Instant) -> Option<ManagerEvent> {
        let deadline = self.window_deadline?;
        if now < deadline {
            return None;
        }
        if self.uids_in_range().count() > LLRP_KNOWN_UID_SIZE {
            let mid = (self.low.as_u64() + self.high.as_u64()) / 2;
            self.high = Uid::from_u64(mid);
            self.clean_sends = 0;
            self.window_deadline = Some(now + LLRP_DISCOVERY_TIMER);
            return Some(self.current_probe());
        }

        self.clean_sends += 1;
        if self.clean_sends < LLRP_CLEAN_SENDS_THRESHOLD {
            self.window_deadline = Some(now + LLRP_DISCOVERY_TIMER);
            return Some(ManagerEvent::Retransmit);
        }

        let next_low_u64 = self.high.as_u64().checked_add(1);
        self.clean_sends = 0;
        match next_low_u64 {
            Some(next_low) if next_low < Uid::BROADCAST.as_u64() => {
                self.low = Uid::from_u64(next_low);
                self.high = Uid::BROADCAST;
                self.window_deadline = Some(now + LLRP_DISCOVERY_TIMER);
                Some(self.current_probe())
            }
            _ => {
                self.state = ManagerState::Idle;
                self.window_deadline = None;
                Some(ManagerEvent::DiscoveryFinished)
            }
        }
    }

    /// Send an RDM command to `dest_uid` at `dest_cid` over LLRP (spec §4.6
    /// final paragraph). Assigns the next 32-bit transaction number and
    /// arms a response-match slot for it; the embedded RDM packet's source
    /// is `manager_uid`, its `transaction_number` is the LLRP transaction's
    /// low 8 bits, and `port_id` (carried in `response_type`) is always 1.
    pub fn send_rdm_command(
        &mut self,
        manager_uid: Uid,
        dest_cid: Cid,
        dest_uid: Uid,
        command_class: CommandClass,
        parameter_id: u16,
        parameter_data: Vec<u8>,
    ) -> ManagerEvent {
        let transaction_num = self.next_transaction;
        self.next_transaction = self.next_transaction.wrapping_add(1);
        self.pending_rdm.insert(transaction_num);
        let command = RdmPacket {
            dest_uid,
            source_uid: manager_uid,
            transaction_number: (transaction_num & 0xff) as u8,
            response_type: ResponseType::PortId(1),
            message_count: 0,
            sub_device: 0,
            command_class,
            parameter_id,
            parameter_data,
        };
        ManagerEvent::SendRdmCommand { dest_cid, transaction_num, command }
    }

    /// Correlate an incoming RDM-over-LLRP response against an armed slot.
    /// Returns `None` for a transaction this manager never sent or already
    /// closed out, so a stray or duplicate response is silently dropped
    /// rather than surfaced twice.
    pub fn on_rdm_response(&mut self, transaction_num: u32, response: RdmPacket) -> Option<ManagerEvent> {
        if !self.pending_rdm.remove(&transaction_num) {
            return None;
        }
        Some(ManagerEvent::RdmResponseReceived { transaction_num, response })
    }
}

impl Default for UidDiscoveryManager {
    fn default() -> Self {
        Self::new()
    }
}
