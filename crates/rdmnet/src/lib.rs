// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # rdmnet - ANSI E1.33 RDMnet transport and LLRP discovery
//!
//! A Rust implementation of the RDMnet (ANSI E1.33) broker wire protocol,
//! RPT/EPT client connection state machine, and LLRP (Low Level Recovery
//! Protocol) discovery, for entertainment-lighting control networks.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use rdmnet::client::{Client, ClientCallbacks, ClientRole};
//! use rdmnet::ids::{Scope, Uid};
//! use std::sync::Arc;
//!
//! struct Logger;
//! impl ClientCallbacks for Logger {}
//!
//! let client = Client::new(ClientRole::Controller, Uid::new(0x6574, 1), Arc::new(Logger));
//! let handle = client
//!     .add_scope(Scope::default_scope(), Some("192.168.1.10:8888".parse().unwrap()), None)
//!     .unwrap();
//! let _ = handle;
//! ```
//!
//! ## Layering
//!
//! ```text
//! client        - scope map, typed callbacks, LLRP target ownership
//! connection    - CONNECT/heartbeat/redirect state machine per scope
//! broker_queue  - per-client outbound priority queues (broker-side)
//! llrp          - target (passive responder) and manager (discovery) FSMs
//! codec         - wire pack/parse for every PDU family
//! message_buffer- TCP stream reassembly into framed root-layer messages
//! poll_core     - mio-backed non-blocking event loop substrate
//! discovery_adapter - seam for broker resolution (DNS-SD is out of scope)
//! ```

/// Wire codec: pack/unpack every PDU defined by E1.33.
pub mod codec;
/// RDMnet/LLRP global configuration constants and runtime knobs.
pub mod config;
/// Error taxonomy: synchronous API errors and asynchronous callback reasons.
pub mod error;
/// Identifiers: CID, UID, Scope.
pub mod ids;
/// Compile-time configurable logging.
pub mod logging;

/// RPT broker connection state machine.
pub mod connection;
/// Streaming TCP reassembly into framed root-layer messages.
pub mod message_buffer;
/// mio-backed non-blocking event loop substrate.
pub mod poll_core;

/// Per-client outbound priority queues for a broker.
pub mod broker_queue;
/// Client façade: scope map, typed callbacks, LLRP target ownership.
pub mod client;
/// Broker discovery adapter seam.
pub mod discovery_adapter;
/// LLRP target and manager state machines.
pub mod llrp;

pub use client::{Client, ClientCallbacks, ClientRole};
pub use error::{RdmnetError, RdmnetResult};
pub use ids::{Cid, Scope, Uid};
