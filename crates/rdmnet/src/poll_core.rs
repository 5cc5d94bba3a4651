// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Single-threaded `mio` event loop substrate (spec §4.4 "PollCore").
//!
//! Grounded in the teacher's `MulticastListener`
//! (`crates/hdds/src/core/discovery/multicast/listener.rs`), which drives a
//! `mio::Poll` from one thread and registers/deregisters sockets as they
//! come and go. `PollCore` generalizes that to arbitrary registrants
//! (TCP connections, the LLRP UDP socket, timers) behind one `Poll`
//! instance, bounded to wake at least every [`crate::config::POLL_MAX_WAIT`]
//! so timeout-driven state transitions (heartbeat, connect backoff, LLRP
//! discovery timers) get serviced even with no socket activity.

use mio::{Events, Interest, Poll, Token};
use std::io;
use std::time::Duration;

use crate::config::POLL_MAX_WAIT;

/// A single readiness notification for one registered token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollEvent {
    pub token: Token,
    pub readable: bool,
    pub writable: bool,
    pub error: bool,
}

/// Owns the `mio::Poll` instance and hands out tokens to registrants.
///
/// Registration/deregistration is deferred into pending lists and applied
/// at the start of the next `poll()` call, mirroring the teacher's listener
/// loop where sockets are added/removed between dispatch rounds rather than
/// from inside an event-handling callback (mio sources must not be mutated
/// while iterating a live `Events` set).
pub struct PollCore {
    poll: Poll,
    events: Events,
    next_token: usize,
}

impl PollCore {
    pub fn new(events_capacity: usize) -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(events_capacity.max(16)),
            next_token: 0,
        })
    }

    /// Allocate a fresh, never-reused token for a new registrant.
    pub fn next_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    pub fn register(
        &self,
        source: &mut dyn mio::event::Source,
        token: Token,
        interest: Interest,
    ) -> io::Result<()> {
        self.poll.registry().register(source, token, interest)
    }

    pub fn reregister(
        &self,
        source: &mut dyn mio::event::Source,
        token: Token,
        interest: Interest,
    ) -> io::Result<()> {
        self.poll.registry().reregister(source, token, interest)
    }

    pub fn deregister(&self, source: &mut dyn mio::event::Source) -> io::Result<()> {
        self.poll.registry().deregister(source)
    }

    /// Block for up to [`POLL_MAX_WAIT`] (or `timeout`, whichever is
    /// shorter) and return the readiness events observed. Never blocks
    /// indefinitely - callers always get a chance to service timers.
    pub fn poll(&mut self, timeout: Option<Duration>) -> io::Result<Vec<PollEvent>> {
        let bound = match timeout {
            Some(t) if t < POLL_MAX_WAIT => t,
            _ => POLL_MAX_WAIT,
        };
        match self.poll.poll(&mut self.events, Some(bound)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(e) => return Err(e),
        }
        Ok(self
            .events
            .iter()
            .map(|e| PollEvent {
                token: e.token(),
                readable: e.is_readable(),
                writable: e.is_writable(),
                error: e.is_error(),
            })
            .collect())
    }
}
