// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Streaming TCP reassembly: turns a byte stream into framed root-layer
//! messages (spec §4.1, §4.4). Grounded in the teacher's `TcpConnection`
//! receive buffering (`crates/hdds/src/transport/tcp/connection.rs`), which
//! also grows a contiguous `Vec<u8>` as partial frames accumulate rather
//! than keeping a `VecDeque` of fragments.

use crate::codec::preamble::{parse_tcp_preamble, TCP_PREAMBLE_LEN};
use crate::codec::root::{parse_root_header, ROOT_LAYER_HEADER_LEN};
use crate::codec::{CodecError, CodecResult};
use crate::config::{DEFAULT_MESSAGE_BUFFER_SIZE, MAX_MESSAGE_BUFFER_SIZE};
use crate::ids::Cid;

/// One fully reassembled root-layer message: the vector and sender CID from
/// the root header, plus the nested PDU bytes that follow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramedMessage {
    pub vector: u32,
    pub sender_cid: Cid,
    pub data: Vec<u8>,
}

/// Incrementally reassembles [`FramedMessage`]s from a TCP byte stream.
///
/// Internally keeps one contiguous buffer holding unconsumed bytes; `feed`
/// appends, `take_next` parses a complete preamble+root-layer frame off the
/// front and compacts the buffer. The buffer starts at
/// [`DEFAULT_MESSAGE_BUFFER_SIZE`] capacity and is allowed to grow up to
/// [`MAX_MESSAGE_BUFFER_SIZE`]; a peer that tries to send a larger frame is
/// a protocol violation, not an allocation footgun.
pub struct MessageBuffer {
    buf: Vec<u8>,
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBuffer {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(DEFAULT_MESSAGE_BUFFER_SIZE),
        }
    }

    /// Append freshly read bytes. Errors if the buffered total would exceed
    /// [`MAX_MESSAGE_BUFFER_SIZE`] before a full frame can be drained.
    pub fn feed(&mut self, data: &[u8]) -> CodecResult<()> {
        if self.buf.len() + data.len() > MAX_MESSAGE_BUFFER_SIZE {
            return Err(CodecError::MessageTooLarge);
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Number of bytes currently buffered (for tests/metrics).
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Try to take the next complete framed message. Returns `Ok(None)` if
    /// not enough bytes have arrived yet - the caller should `feed` more and
    /// retry. Returns `Err` on a malformed preamble/header, which the
    /// caller should treat as a protocol-level disconnect.
    pub fn take_next(&mut self) -> CodecResult<Option<FramedMessage>> {
        if self.buf.len() < TCP_PREAMBLE_LEN {
            return Ok(None);
        }
        let (root_layer_len, _) = parse_tcp_preamble(&self.buf)?;
        let root_layer_len = root_layer_len as usize;
        if root_layer_len < ROOT_LAYER_HEADER_LEN {
            return Err(CodecError::LengthMismatch);
        }
        if root_layer_len > MAX_MESSAGE_BUFFER_SIZE {
            return Err(CodecError::MessageTooLarge);
        }
        let total_len = TCP_PREAMBLE_LEN + root_layer_len;
        if self.buf.len() < total_len {
            return Ok(None);
        }

        let root_layer = &self.buf[TCP_PREAMBLE_LEN..total_len];
        let (header, header_len) = parse_root_header(root_layer)?;
        let data = root_layer[header_len..].to_vec();
        let message = FramedMessage {
            vector: header.vector,
            sender_cid: header.sender_cid,
            data,
        };

        self.buf.drain(0..total_len);
        Ok(Some(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::preamble::pack_tcp_preamble;
    use crate::codec::root::pack_root_header;
    use crate::codec::vector;

    fn build_frame(cid: Cid, vec_val: u32, payload: &[u8]) -> Vec<u8> {
        let mut root = vec![0u8; ROOT_LAYER_HEADER_LEN + payload.len()];
        pack_root_header(&mut root, vec_val, cid, payload.len()).unwrap();
        root[ROOT_LAYER_HEADER_LEN..].copy_from_slice(payload);
        let mut out = vec![0u8; TCP_PREAMBLE_LEN];
        pack_tcp_preamble(&mut out, root.len() as u32).unwrap();
        out.extend_from_slice(&root);
        out
    }

    #[test]
    fn returns_none_until_full_frame_arrives() {
        let cid = Cid::new_random();
        let frame = build_frame(cid, vector::ROOT_BROKER, &[1, 2, 3]);
        let mut mb = MessageBuffer::new();
        mb.feed(&frame[..10]).unwrap();
        assert_eq!(mb.take_next().unwrap(), None);
        mb.feed(&frame[10..]).unwrap();
        let msg = mb.take_next().unwrap().unwrap();
        assert_eq!(msg.vector, vector::ROOT_BROKER);
        assert_eq!(msg.sender_cid, cid);
        assert_eq!(msg.data, vec![1, 2, 3]);
        assert_eq!(mb.buffered_len(), 0);
    }

    #[test]
    fn drains_two_back_to_back_frames() {
        let cid = Cid::new_random();
        let a = build_frame(cid, vector::ROOT_RPT, &[9]);
        let b = build_frame(cid, vector::ROOT_LLRP, &[8, 7]);
        let mut mb = MessageBuffer::new();
        mb.feed(&a).unwrap();
        mb.feed(&b).unwrap();
        let first = mb.take_next().unwrap().unwrap();
        assert_eq!(first.vector, vector::ROOT_RPT);
        let second = mb.take_next().unwrap().unwrap();
        assert_eq!(second.vector, vector::ROOT_LLRP);
        assert_eq!(mb.take_next().unwrap(), None);
    }

    #[test]
    fn rejects_frame_exceeding_max_size() {
        let mut mb = MessageBuffer::new();
        let mut preamble = [0u8; TCP_PREAMBLE_LEN];
        pack_tcp_preamble(&mut preamble, (MAX_MESSAGE_BUFFER_SIZE + 1) as u32).unwrap();
        mb.feed(&preamble).unwrap();
        assert_eq!(mb.take_next(), Err(CodecError::MessageTooLarge));
    }

    #[test]
    fn feed_enforces_buffer_cap() {
        let mut mb = MessageBuffer::new();
        let oversized = vec![0u8; MAX_MESSAGE_BUFFER_SIZE + 1];
        assert_eq!(mb.feed(&oversized), Err(CodecError::MessageTooLarge));
    }
}
