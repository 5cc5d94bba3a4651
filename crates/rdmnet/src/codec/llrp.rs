// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! LLRP PDUs (spec §4.5, §4.6, §6): ProbeRequest, ProbeReply, RDM Command.
//!
//! LLRP framing matches the root layer: `flags(1) | length(3) | vector(4) |
//! dest_cid(16) | data`, sent over UDP multicast with no TCP preamble. The
//! destination CID lets a target ignore probes it did not originate or is
//! not addressed by (broadcast CID `Cid::ZERO` addresses every target).

use super::rdm::{self, RdmPacket};
use super::{read_u16, read_u24, read_u32, write_u24, CodecError, CodecResult};
use crate::ids::{Cid, Uid};

pub const LLRP_HEADER_FLAGS: u8 = 0xf0;
/// `flags(1) | length(3) | vector(4) | dest_cid(16) | transaction_num(4)`
/// (spec §6, "LLRP header: destination CID + 32-bit transaction number").
pub const LLRP_PDU_HEADER_LEN: usize = 1 + 3 + 4 + 16 + 4;

pub fn pack_llrp_pdu_header(
    buf: &mut [u8],
    vector: u32,
    dest_cid: Cid,
    transaction_num: u32,
    data_len: usize,
) -> CodecResult<usize> {
    if buf.len() < LLRP_PDU_HEADER_LEN {
        return Err(CodecError::BufferTooSmall);
    }
    let total = LLRP_PDU_HEADER_LEN + data_len;
    buf[0] = LLRP_HEADER_FLAGS;
    write_u24(buf, 1, total as u32)?;
    buf[4..8].copy_from_slice(&vector.to_be_bytes());
    buf[8..24].copy_from_slice(dest_cid.as_bytes());
    buf[24..28].copy_from_slice(&transaction_num.to_be_bytes());
    Ok(LLRP_PDU_HEADER_LEN)
}

pub fn parse_llrp_pdu_header(buf: &[u8]) -> CodecResult<((u32, Cid, u32, u32), usize)> {
    if buf.len() < LLRP_PDU_HEADER_LEN {
        return Err(CodecError::TooShort);
    }
    if buf[0] & LLRP_HEADER_FLAGS != LLRP_HEADER_FLAGS {
        return Err(CodecError::BadPreamble);
    }
    let length = read_u24(buf, 1)?;
    if (length as usize) < LLRP_PDU_HEADER_LEN {
        return Err(CodecError::LengthMismatch);
    }
    let vector = read_u32(buf, 4)?;
    let mut cid_bytes = [0u8; 16];
    cid_bytes.copy_from_slice(&buf[8..24]);
    let transaction_num = read_u32(buf, 24)?;
    Ok((
        (vector, Cid::from_bytes(cid_bytes), transaction_num, length),
        LLRP_PDU_HEADER_LEN,
    ))
}

/// Filter bits carried in a Probe Request (spec §4.6).
pub const PROBE_FILTER_BROKERS_ONLY: u16 = 0x0001;
pub const PROBE_FILTER_CLIENT_CONN_INACTIVE: u16 = 0x0002;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub lower_uid: Uid,
    pub upper_uid: Uid,
    pub filter: u16,
    /// UIDs the manager already knows about; targets matching one of these
    /// stay silent (spec §4.6 step 4).
    pub known_uids: Vec<Uid>,
}

const PROBE_REQUEST_HEADER_LEN: usize = 6 + 6 + 2;

pub fn pack_probe_request(buf: &mut [u8], pdu: &ProbeRequest) -> CodecResult<usize> {
    let need = PROBE_REQUEST_HEADER_LEN + pdu.known_uids.len() * 6;
    if buf.len() < need {
        return Err(CodecError::BufferTooSmall);
    }
    buf[0..6].copy_from_slice(&pdu.lower_uid.to_wire());
    buf[6..12].copy_from_slice(&pdu.upper_uid.to_wire());
    buf[12..14].copy_from_slice(&pdu.filter.to_be_bytes());
    for (i, uid) in pdu.known_uids.iter().enumerate() {
        let off = PROBE_REQUEST_HEADER_LEN + i * 6;
        buf[off..off + 6].copy_from_slice(&uid.to_wire());
    }
    Ok(need)
}

pub fn parse_probe_request(buf: &[u8]) -> CodecResult<(ProbeRequest, usize)> {
    if buf.len() < PROBE_REQUEST_HEADER_LEN {
        return Err(CodecError::TooShort);
    }
    let mut lower = [0u8; 6];
    lower.copy_from_slice(&buf[0..6]);
    let mut upper = [0u8; 6];
    upper.copy_from_slice(&buf[6..12]);
    let filter = read_u16(buf, 12)?;
    let rest = &buf[PROBE_REQUEST_HEADER_LEN..];
    if rest.len() % 6 != 0 {
        return Err(CodecError::LengthMismatch);
    }
    let known_uids = rest
        .chunks_exact(6)
        .map(|c| {
            let mut bytes = [0u8; 6];
            bytes.copy_from_slice(c);
            Uid::from_wire(bytes)
        })
        .collect();
    Ok((
        ProbeRequest {
            lower_uid: Uid::from_wire(lower),
            upper_uid: Uid::from_wire(upper),
            filter,
            known_uids,
        },
        buf.len(),
    ))
}

/// Component type reported in a Probe Reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentType {
    RptDevice,
    RptController,
    Broker,
    EptClient,
    Unknown(u8),
}

impl ComponentType {
    pub fn from_wire(value: u8) -> Self {
        match value {
            0x00 => Self::RptDevice,
            0x01 => Self::RptController,
            0x02 => Self::Broker,
            0x03 => Self::EptClient,
            other => Self::Unknown(other),
        }
    }

    pub fn to_wire(self) -> u8 {
        match self {
            Self::RptDevice => 0x00,
            Self::RptController => 0x01,
            Self::Broker => 0x02,
            Self::EptClient => 0x03,
            Self::Unknown(v) => v,
        }
    }
}

const PROBE_REPLY_LEN: usize = 6 + 6 + 1 + 16;

/// A target's answer to a Probe Request: its own `(CID, UID, hardware_addr,
/// component_type)` (spec §4.5). `target_cid` is the target's own identity,
/// distinct from the `dest_cid` in the enclosing LLRP PDU header (which
/// carries the *manager's* CID, echoed back so the manager can correlate
/// the reply to its probe).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeReply {
    pub target_uid: Uid,
    pub target_cid: Cid,
    pub hardware_id: [u8; 6],
    pub component_type: ComponentType,
}

pub fn pack_probe_reply(buf: &mut [u8], pdu: &ProbeReply) -> CodecResult<usize> {
    if buf.len() < PROBE_REPLY_LEN {
        return Err(CodecError::BufferTooSmall);
    }
    buf[0..6].copy_from_slice(&pdu.target_uid.to_wire());
    buf[6..12].copy_from_slice(&pdu.hardware_id);
    buf[12] = pdu.component_type.to_wire();
    buf[13..29].copy_from_slice(pdu.target_cid.as_bytes());
    Ok(PROBE_REPLY_LEN)
}

pub fn parse_probe_reply(buf: &[u8]) -> CodecResult<(ProbeReply, usize)> {
    if buf.len() < PROBE_REPLY_LEN {
        return Err(CodecError::TooShort);
    }
    let mut uid_bytes = [0u8; 6];
    uid_bytes.copy_from_slice(&buf[0..6]);
    let mut hardware_id = [0u8; 6];
    hardware_id.copy_from_slice(&buf[6..12]);
    let mut cid_bytes = [0u8; 16];
    cid_bytes.copy_from_slice(&buf[13..29]);
    Ok((
        ProbeReply {
            target_uid: Uid::from_wire(uid_bytes),
            hardware_id,
            component_type: ComponentType::from_wire(buf[12]),
            target_cid: Cid::from_bytes(cid_bytes),
        },
        PROBE_REPLY_LEN,
    ))
}

/// An RDM command or response carried over LLRP (spec §4.5/§4.6 final
/// paragraphs): the generic LLRP header's `dest_cid`/`transaction_num`
/// wrapping one embedded RDM packet (reusing [`rdm::pack_rdm_packet`] /
/// [`rdm::parse_rdm_packet`] verbatim for the body - LLRP carries RDM, it
/// does not redefine it).
pub fn pack_llrp_rdm_cmd(
    buf: &mut [u8],
    dest_cid: Cid,
    transaction_num: u32,
    pkt: &RdmPacket,
) -> CodecResult<usize> {
    if pkt.parameter_data.len() > 255 {
        return Err(CodecError::MessageTooLarge);
    }
    let body_len = rdm::RDM_HEADER_LEN + pkt.parameter_data.len() + rdm::RDM_CHECKSUM_LEN;
    let hdr_len = pack_llrp_pdu_header(buf, super::vector::LLRP_RDM_CMD, dest_cid, transaction_num, body_len)?;
    let written = rdm::pack_rdm_packet(&mut buf[hdr_len..], pkt)?;
    Ok(hdr_len + written)
}

/// Returns `(dest_cid, transaction_num, packet)` plus bytes consumed.
/// Rejects a header whose vector isn't `LLRP_RDM_CMD` so a caller that
/// demultiplexes on vector first never reaches this by accident.
pub fn parse_llrp_rdm_cmd(buf: &[u8]) -> CodecResult<((Cid, u32, RdmPacket), usize)> {
    let ((vector, dest_cid, transaction_num, _length), hdr_len) = parse_llrp_pdu_header(buf)?;
    if vector != super::vector::LLRP_RDM_CMD {
        return Err(CodecError::BadPreamble);
    }
    let (pkt, consumed) = rdm::parse_rdm_packet(&buf[hdr_len..])?;
    Ok(((dest_cid, transaction_num, pkt), hdr_len + consumed))
}
