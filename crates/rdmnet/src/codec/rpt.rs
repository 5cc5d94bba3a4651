// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RPT-layer PDUs (spec §4.3, §6): Request, Status, Notification.
//!
//! RPT framing: `flags(1) | length(3) | vector(4) | rpt_header | data`,
//! nested inside a root-layer PDU whose vector is `vector::ROOT_RPT`.
//! `rpt_header` addresses the RDM command within the RPT mesh; `data` is
//! either raw RDM command/response bytes (Request, Notification) or an
//! RPT status code plus message string (Status).

use super::{read_bytes, read_u16, read_u24, read_u32, write_u24, CodecError, CodecResult};
use crate::ids::Uid;

pub const RPT_HEADER_FLAGS: u8 = 0xf0;
pub const RPT_PDU_HEADER_LEN: usize = 1 + 3 + 4;
pub const RPT_ADDRESS_HEADER_LEN: usize = 6 + 2 + 6 + 2 + 4 + 1;

pub fn pack_rpt_pdu_header(buf: &mut [u8], vector: u32, data_len: usize) -> CodecResult<usize> {
    if buf.len() < RPT_PDU_HEADER_LEN {
        return Err(CodecError::BufferTooSmall);
    }
    let total = RPT_PDU_HEADER_LEN + data_len;
    buf[0] = RPT_HEADER_FLAGS;
    write_u24(buf, 1, total as u32)?;
    buf[4..8].copy_from_slice(&vector.to_be_bytes());
    Ok(RPT_PDU_HEADER_LEN)
}

pub fn parse_rpt_pdu_header(buf: &[u8]) -> CodecResult<((u32, u32), usize)> {
    if buf.len() < RPT_PDU_HEADER_LEN {
        return Err(CodecError::TooShort);
    }
    if buf[0] & RPT_HEADER_FLAGS != RPT_HEADER_FLAGS {
        return Err(CodecError::BadPreamble);
    }
    let length = read_u24(buf, 1)?;
    if (length as usize) < RPT_PDU_HEADER_LEN {
        return Err(CodecError::LengthMismatch);
    }
    let vector = read_u32(buf, 4)?;
    Ok(((vector, length), RPT_PDU_HEADER_LEN))
}

/// Addresses an RDM command/response within the RPT mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RptAddress {
    pub source_uid: Uid,
    pub source_endpoint_id: u16,
    pub dest_uid: Uid,
    pub dest_endpoint_id: u16,
    pub sequence_number: u32,
}

pub fn pack_rpt_address(buf: &mut [u8], addr: &RptAddress) -> CodecResult<usize> {
    if buf.len() < RPT_ADDRESS_HEADER_LEN {
        return Err(CodecError::BufferTooSmall);
    }
    buf[0..6].copy_from_slice(&addr.source_uid.to_wire());
    buf[6..8].copy_from_slice(&addr.source_endpoint_id.to_be_bytes());
    buf[8..14].copy_from_slice(&addr.dest_uid.to_wire());
    buf[14..16].copy_from_slice(&addr.dest_endpoint_id.to_be_bytes());
    buf[16..20].copy_from_slice(&addr.sequence_number.to_be_bytes());
    buf[20] = 0;
    Ok(RPT_ADDRESS_HEADER_LEN)
}

pub fn parse_rpt_address(buf: &[u8]) -> CodecResult<(RptAddress, usize)> {
    let tail = read_bytes(buf, 0, RPT_ADDRESS_HEADER_LEN)?;
    let mut src = [0u8; 6];
    src.copy_from_slice(&tail[0..6]);
    let mut dst = [0u8; 6];
    dst.copy_from_slice(&tail[8..14]);
    Ok((
        RptAddress {
            source_uid: Uid::from_wire(src),
            source_endpoint_id: read_u16(tail, 6)?,
            dest_uid: Uid::from_wire(dst),
            dest_endpoint_id: read_u16(tail, 14)?,
            sequence_number: read_u32(tail, 16)?,
        },
        RPT_ADDRESS_HEADER_LEN,
    ))
}

/// RPT Request / Notification: an addressed, opaque RDM command/response
/// blob. The bytes are handed to [`super::rdm`] for further decoding and
/// ACK_OVERFLOW reassembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RptMessage {
    pub address: RptAddress,
    pub rdm_data: Vec<u8>,
}

pub fn pack_rpt_message(buf: &mut [u8], msg: &RptMessage) -> CodecResult<usize> {
    let n = pack_rpt_address(buf, &msg.address)?;
    let end = n + msg.rdm_data.len();
    let dst = buf.get_mut(n..end).ok_or(CodecError::BufferTooSmall)?;
    dst.copy_from_slice(&msg.rdm_data);
    Ok(end)
}

pub fn parse_rpt_message(buf: &[u8]) -> CodecResult<(RptMessage, usize)> {
    let (address, n) = parse_rpt_address(buf)?;
    Ok((
        RptMessage {
            address,
            rdm_data: buf[n..].to_vec(),
        },
        buf.len(),
    ))
}

/// RPT status codes (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RptStatusCode {
    UnknownRdmUid,
    RdmTimeout,
    RdmInvalidResponse,
    UnknownRptUid,
    UnknownEndpoint,
    BroadcastComplete,
    UnknownVector,
    InvalidMessage,
    InvalidCommandClass,
    Unknown(u16),
}

impl RptStatusCode {
    pub fn from_wire(value: u16) -> Self {
        match value {
            0x0000 => Self::UnknownRdmUid,
            0x0001 => Self::RdmTimeout,
            0x0002 => Self::RdmInvalidResponse,
            0x0003 => Self::UnknownRptUid,
            0x0004 => Self::UnknownEndpoint,
            0x0005 => Self::BroadcastComplete,
            0x0006 => Self::UnknownVector,
            0x0007 => Self::InvalidMessage,
            0x0008 => Self::InvalidCommandClass,
            other => Self::Unknown(other),
        }
    }

    pub fn to_wire(self) -> u16 {
        match self {
            Self::UnknownRdmUid => 0x0000,
            Self::RdmTimeout => 0x0001,
            Self::RdmInvalidResponse => 0x0002,
            Self::UnknownRptUid => 0x0003,
            Self::UnknownEndpoint => 0x0004,
            Self::BroadcastComplete => 0x0005,
            Self::UnknownVector => 0x0006,
            Self::InvalidMessage => 0x0007,
            Self::InvalidCommandClass => 0x0008,
            Self::Unknown(v) => v,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RptStatus {
    pub address: RptAddress,
    pub status_code: RptStatusCode,
    pub status_string: String,
}

pub fn pack_rpt_status(buf: &mut [u8], status: &RptStatus) -> CodecResult<usize> {
    let mut offset = pack_rpt_address(buf, &status.address)?;
    let code_dst = buf.get_mut(offset..offset + 2).ok_or(CodecError::BufferTooSmall)?;
    code_dst.copy_from_slice(&status.status_code.to_wire().to_be_bytes());
    offset += 2;
    let msg_bytes = status.status_string.as_bytes();
    let dst = buf
        .get_mut(offset..offset + msg_bytes.len())
        .ok_or(CodecError::BufferTooSmall)?;
    dst.copy_from_slice(msg_bytes);
    Ok(offset + msg_bytes.len())
}

pub fn parse_rpt_status(buf: &[u8]) -> CodecResult<(RptStatus, usize)> {
    let (address, offset) = parse_rpt_address(buf)?;
    let code = read_u16(buf, offset)?;
    let msg_bytes = &buf[offset + 2..];
    let status_string = String::from_utf8_lossy(msg_bytes).into_owned();
    Ok((
        RptStatus {
            address,
            status_code: RptStatusCode::from_wire(code),
            status_string,
        },
        buf.len(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpt_pdu_header_round_trip() {
        let mut buf = [0u8; RPT_PDU_HEADER_LEN];
        pack_rpt_pdu_header(&mut buf, super::super::vector::RPT_REQUEST, 0).unwrap();
        let ((vector, length), n) = parse_rpt_pdu_header(&buf).unwrap();
        assert_eq!(vector, super::super::vector::RPT_REQUEST);
        assert_eq!(length as usize, RPT_PDU_HEADER_LEN);
        assert_eq!(n, RPT_PDU_HEADER_LEN);
    }

    #[test]
    fn rpt_message_round_trip() {
        let msg = RptMessage {
            address: RptAddress {
                source_uid: Uid::new(0x1234, 1),
                source_endpoint_id: 0,
                dest_uid: Uid::new(0x5678, 2),
                dest_endpoint_id: 3,
                sequence_number: 42,
            },
            rdm_data: vec![1, 2, 3, 4, 5],
        };
        let mut buf = [0u8; 64];
        let n = pack_rpt_message(&mut buf, &msg).unwrap();
        let (parsed, consumed) = parse_rpt_message(&buf[..n]).unwrap();
        assert_eq!(consumed, n);
        assert_eq!(parsed, msg);
    }

    #[test]
    fn rpt_status_round_trip() {
        let status = RptStatus {
            address: RptAddress {
                source_uid: Uid::new(0x1234, 1),
                source_endpoint_id: 0,
                dest_uid: Uid::BROADCAST,
                dest_endpoint_id: 0,
                sequence_number: 1,
            },
            status_code: RptStatusCode::RdmTimeout,
            status_string: "timed out".to_string(),
        };
        let mut buf = [0u8; 64];
        let n = pack_rpt_status(&mut buf, &status).unwrap();
        let (parsed, consumed) = parse_rpt_status(&buf[..n]).unwrap();
        assert_eq!(consumed, n);
        assert_eq!(parsed, status);
    }

    #[test]
    fn never_reads_past_n_address() {
        for n in 0..RPT_ADDRESS_HEADER_LEN {
            let buf = vec![0u8; n];
            assert_eq!(parse_rpt_address(&buf), Err(CodecError::TooShort));
        }
    }
}
