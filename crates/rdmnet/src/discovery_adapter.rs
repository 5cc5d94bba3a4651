// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker discovery adapter (spec §6).
//!
//! RDMnet brokers are ordinarily found via DNS-SD; that resolver is outside
//! this crate's scope (spec Non-goals), so [`DiscoveryAdapter`] is the seam
//! a caller plugs a real resolver into. Grounded in the teacher's
//! `DiscoveryListener` trait
//! (`crates/hdds/src/core/discovery/multicast/fsm/discovery.rs`): a
//! listener trait invoked on discovery events, registered per scope rather
//! than globally. `select_best_broker` mirrors that file's
//! `select_best_locator` - prefer a non-loopback address, fall back to
//! whatever is left - generalized with a CID tie-break for determinism
//! when two brokers are otherwise indistinguishable.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use crate::ids::{Cid, Scope};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerInfo {
    pub cid: Cid,
    pub scope: Scope,
    pub service_instance_name: String,
    pub addrs: Vec<SocketAddr>,
}

/// Receives broker discovery events for one registered scope.
pub trait DiscoveryListener: Send + Sync {
    fn on_broker_found(&self, info: BrokerInfo);
    fn on_broker_lost(&self, cid: Cid);
}

/// Resolves brokers for a scope. Implementations may be backed by DNS-SD,
/// a config file, or (as here) a static list supplied up front.
pub trait DiscoveryAdapter: Send + Sync {
    fn register_scope(&self, scope: Scope, listener: Arc<dyn DiscoveryListener>);
    fn unregister_scope(&self, scope: &Scope);
}

/// Prefer a non-loopback, non-unspecified address; among ties, prefer the
/// lowest CID so two callers resolving the same broker set agree on order.
pub fn select_best_broker(candidates: &[BrokerInfo]) -> Option<&BrokerInfo> {
    let routable = candidates.iter().find(|b| {
        b.addrs
            .iter()
            .any(|a| !a.ip().is_unspecified() && !a.ip().is_loopback())
    });
    routable
        .or_else(|| candidates.iter().min_by_key(|b| b.cid))
}

/// A fixed, caller-supplied broker list - no active resolution, just the
/// registration bookkeeping and an immediate callback of what's known.
#[derive(Default)]
pub struct StaticDiscoveryAdapter {
    known: RwLock<Vec<BrokerInfo>>,
    listeners: RwLock<HashMap<String, Arc<dyn DiscoveryListener>>>,
}

impl StaticDiscoveryAdapter {
    pub fn new(known: Vec<BrokerInfo>) -> Self {
        Self {
            known: RwLock::new(known),
            listeners: RwLock::new(HashMap::new()),
        }
    }

    /// Add or refresh a known broker, notifying any listener registered for
    /// its scope.
    pub fn announce(&self, info: BrokerInfo) {
        let scope_key = info.scope.as_str().to_string();
        {
            let mut known = self.known.write().unwrap();
            known.retain(|b| b.cid != info.cid);
            known.push(info.clone());
        }
        if let Some(listener) = self.listeners.read().unwrap().get(&scope_key) {
            listener.on_broker_found(info);
        }
    }

    pub fn withdraw(&self, cid: Cid, scope: &Scope) {
        self.known.write().unwrap().retain(|b| b.cid != cid);
        if let Some(listener) = self.listeners.read().unwrap().get(scope.as_str()) {
            listener.on_broker_lost(cid);
        }
    }
}

impl DiscoveryAdapter for StaticDiscoveryAdapter {
    fn register_scope(&self, scope: Scope, listener: Arc<dyn DiscoveryListener>) {
        for info in self.known.read().unwrap().iter().filter(|b| b.scope == scope) {
            listener.on_broker_found(info.clone());
        }
        self.listeners
            .write()
            .unwrap()
            .insert(scope.as_str().to_string(), listener);
    }

    fn unregister_scope(&self, scope: &Scope) {
        self.listeners.write().unwrap().remove(scope.as_str());
    }
}
