// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RDMnet/LLRP global configuration - single source of truth for wire
//! constants and runtime-tunable defaults.
//!
//! **Never hardcode these elsewhere.**
//!
//! - Level 1 (static): compile-time constants from E1.33/E1.20 (ports,
//!   multicast groups, timer defaults, size caps).
//! - Level 2 (dynamic): [`RuntimeConfig`], a small set of knobs an
//!   application may override before creating a [`crate::client::Client`].

use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

// ===========================================================================
// RDMnet broker TCP
// ===========================================================================

/// Default RDMnet broker TCP listen port (E1.33 Table 6-1).
pub const DEFAULT_BROKER_PORT: u16 = 8888;

/// TCP preamble, ACN convention: ASCII "ASC-E1.17" + three zero bytes.
pub const TCP_PREAMBLE: [u8; 12] = *b"ASC-E1.17\0\0\0";

/// Maximum RDM command/response payload (E1.20).
pub const MAX_RDM_DATA_LEN: usize = 231;

/// Cap on accumulated ACK_OVERFLOW sub-responses before a forced partial
/// emission (spec §4.1).
pub const MAX_SENT_ACK_OVERFLOW_RESPONSES: usize = 16;

/// Default size of one reassembly buffer slot (bytes) before growth.
pub const DEFAULT_MESSAGE_BUFFER_SIZE: usize = 1232;

/// Hard ceiling a single reassembled PDU may grow to before it's rejected
/// as `CodecError::MessageTooLarge`.
pub const MAX_MESSAGE_BUFFER_SIZE: usize = 1024 * 1024;

// ===========================================================================
// Connection timers
// ===========================================================================

/// Interval between broker heartbeat (Null PDU) sends while connected.
pub const HEARTBEAT_SEND_INTERVAL: Duration = Duration::from_secs(15);

/// Time without inbound bytes before a connection is declared dead.
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(45);

/// Time to wait for CONNECT_REPLY after sending Connect.
pub const CONNECT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Lower/upper bound of the uniform TCP-retry backoff distribution.
pub const CONNECT_BACKOFF_MIN: Duration = Duration::from_millis(3000);
pub const CONNECT_BACKOFF_MAX: Duration = Duration::from_millis(8000);

/// Maximum number of CONNECT_REPLY redirects followed before giving up.
pub const MAX_REDIRECTS: u32 = 5;

// ===========================================================================
// Broker-side outbound queue (BrokerQueue, spec §4.4)
// ===========================================================================

/// Default max queued messages per controller (broker + status + data lanes
/// combined budget is applied per-lane, this is the per-controller cap).
pub const DEFAULT_MAX_QUEUED_PER_CONTROLLER: usize = 500;

/// Default max queued messages per device.
pub const DEFAULT_MAX_QUEUED_PER_DEVICE: usize = 500;

// ===========================================================================
// PollCore
// ===========================================================================

/// Upper bound on how long a single `mio::Poll::poll` call blocks when no
/// timer deadline is sooner.
pub const POLL_MAX_WAIT: Duration = Duration::from_millis(100);

// ===========================================================================
// LLRP
// ===========================================================================

/// LLRP request multicast group, IPv4 (targets listen here).
pub const LLRP_REQUEST_GROUP_V4: Ipv4Addr = Ipv4Addr::new(239, 255, 250, 133);
/// LLRP response multicast group, IPv4 (managers listen here).
pub const LLRP_RESPONSE_GROUP_V4: Ipv4Addr = Ipv4Addr::new(239, 255, 250, 134);
/// LLRP request multicast group, IPv6.
pub const LLRP_REQUEST_GROUP_V6: Ipv6Addr = Ipv6Addr::new(0xFF18, 0, 0, 0, 0, 0x85, 0, 0);
/// LLRP response multicast group, IPv6.
pub const LLRP_RESPONSE_GROUP_V6: Ipv6Addr = Ipv6Addr::new(0xFF18, 0, 0, 0, 0, 0x86, 0, 0);

/// LLRP UDP port, both request and response groups.
pub const LLRP_PORT: u16 = 5569;

/// Max probe-reply backoff a target may draw, per spec §4.5.
pub const LLRP_MAX_BACKOFF_MS: u64 = 500;

/// How long an LLRP manager's discovery window stays open per probe.
pub const LLRP_DISCOVERY_TIMER: Duration = Duration::from_secs(3);

/// Number of consecutive clean (no-new-target) sends before a manager
/// advances its UID range, spec §4.6.
pub const LLRP_CLEAN_SENDS_THRESHOLD: u32 = 3;

/// Implementation cap on `known_uids` entries per probe request so the list
/// never overflows a single UDP datagram.
pub const LLRP_KNOWN_UID_SIZE: usize = 200;

/// Manufacturer-ID bit marking a UID as "dynamic, not yet assigned".
pub const UID_DYNAMIC_BIT: u16 = 0x8000;

/// Broadcast UID (both manufacturer and device id all-ones).
pub const UID_BROADCAST: u64 = 0xFFFF_FFFF_FFFF;

// ===========================================================================
// Runtime-tunable layer
// ===========================================================================

/// Small set of knobs an application may override before constructing a
/// [`crate::client::Client`]. Everything else above is a protocol constant
/// and is not meant to be tunable.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub heartbeat_send_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub connect_reply_timeout: Duration,
    pub max_queued_per_controller: usize,
    pub max_queued_per_device: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_send_interval: HEARTBEAT_SEND_INTERVAL,
            heartbeat_timeout: HEARTBEAT_TIMEOUT,
            connect_reply_timeout: CONNECT_REPLY_TIMEOUT,
            max_queued_per_controller: DEFAULT_MAX_QUEUED_PER_CONTROLLER,
            max_queued_per_device: DEFAULT_MAX_QUEUED_PER_DEVICE,
        }
    }
}
