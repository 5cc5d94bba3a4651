// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! EPT-layer PDUs (spec §4.3 open question, resolved: EPT is implemented as
//! a second client protocol alongside RPT). Mirrors `rpt.rs`'s framing but
//! addresses by CID (component) rather than UID (RDM device), and carries
//! opaque vendor sub-protocol data instead of RDM bytes.
//!
//! EPT framing: `flags(1) | length(3) | vector(4) | dest_cid(16) |
//! source_cid(16) | data`, nested inside a root-layer PDU whose vector is
//! `vector::ROOT_EPT`.

use super::{read_u16, read_u24, read_u32, write_u24, CodecError, CodecResult};
use crate::ids::Cid;

pub const EPT_HEADER_FLAGS: u8 = 0xf0;
pub const EPT_PDU_HEADER_LEN: usize = 1 + 3 + 4;
pub const EPT_ADDRESS_LEN: usize = 16 + 16;

pub const EPT_VECTOR_DATA: u32 = 0x0000_0001;
pub const EPT_VECTOR_STATUS: u32 = 0x0000_0002;

pub fn pack_ept_pdu_header(buf: &mut [u8], vector: u32, data_len: usize) -> CodecResult<usize> {
    if buf.len() < EPT_PDU_HEADER_LEN {
        return Err(CodecError::BufferTooSmall);
    }
    let total = EPT_PDU_HEADER_LEN + data_len;
    buf[0] = EPT_HEADER_FLAGS;
    write_u24(buf, 1, total as u32)?;
    buf[4..8].copy_from_slice(&vector.to_be_bytes());
    Ok(EPT_PDU_HEADER_LEN)
}

pub fn parse_ept_pdu_header(buf: &[u8]) -> CodecResult<((u32, u32), usize)> {
    if buf.len() < EPT_PDU_HEADER_LEN {
        return Err(CodecError::TooShort);
    }
    if buf[0] & EPT_HEADER_FLAGS != EPT_HEADER_FLAGS {
        return Err(CodecError::BadPreamble);
    }
    let length = read_u24(buf, 1)?;
    if (length as usize) < EPT_PDU_HEADER_LEN {
        return Err(CodecError::LengthMismatch);
    }
    let vector = read_u32(buf, 4)?;
    Ok(((vector, length), EPT_PDU_HEADER_LEN))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EptAddress {
    pub dest_cid: Cid,
    pub source_cid: Cid,
}

fn pack_ept_address(buf: &mut [u8], addr: &EptAddress) -> CodecResult<usize> {
    if buf.len() < EPT_ADDRESS_LEN {
        return Err(CodecError::BufferTooSmall);
    }
    buf[0..16].copy_from_slice(addr.dest_cid.as_bytes());
    buf[16..32].copy_from_slice(addr.source_cid.as_bytes());
    Ok(EPT_ADDRESS_LEN)
}

fn parse_ept_address(buf: &[u8]) -> CodecResult<(EptAddress, usize)> {
    if buf.len() < EPT_ADDRESS_LEN {
        return Err(CodecError::TooShort);
    }
    let mut dest = [0u8; 16];
    dest.copy_from_slice(&buf[0..16]);
    let mut src = [0u8; 16];
    src.copy_from_slice(&buf[16..32]);
    Ok((
        EptAddress {
            dest_cid: Cid::from_bytes(dest),
            source_cid: Cid::from_bytes(src),
        },
        EPT_ADDRESS_LEN,
    ))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EptData {
    pub address: EptAddress,
    pub sub_protocol_vector: u32,
    pub vendor_data: Vec<u8>,
}

pub fn pack_ept_data(buf: &mut [u8], pdu: &EptData) -> CodecResult<usize> {
    let mut offset = pack_ept_address(buf, &pdu.address)?;
    let dst = buf
        .get_mut(offset..offset + 4)
        .ok_or(CodecError::BufferTooSmall)?;
    dst.copy_from_slice(&pdu.sub_protocol_vector.to_be_bytes());
    offset += 4;
    let end = offset + pdu.vendor_data.len();
    let dst = buf.get_mut(offset..end).ok_or(CodecError::BufferTooSmall)?;
    dst.copy_from_slice(&pdu.vendor_data);
    Ok(end)
}

pub fn parse_ept_data(buf: &[u8]) -> CodecResult<(EptData, usize)> {
    let (address, mut offset) = parse_ept_address(buf)?;
    let sub_protocol_vector = read_u32(buf, offset)?;
    offset += 4;
    let vendor_data = buf[offset..].to_vec();
    Ok((
        EptData {
            address,
            sub_protocol_vector,
            vendor_data,
        },
        buf.len(),
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EptStatusCode {
    UnknownCid,
    UnknownVector,
    InvalidMessage,
    Unknown(u16),
}

impl EptStatusCode {
    pub fn from_wire(value: u16) -> Self {
        match value {
            0x0000 => Self::UnknownCid,
            0x0001 => Self::UnknownVector,
            0x0002 => Self::InvalidMessage,
            other => Self::Unknown(other),
        }
    }

    pub fn to_wire(self) -> u16 {
        match self {
            Self::UnknownCid => 0x0000,
            Self::UnknownVector => 0x0001,
            Self::InvalidMessage => 0x0002,
            Self::Unknown(v) => v,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EptStatus {
    pub address: EptAddress,
    pub status_code: EptStatusCode,
    pub status_string: String,
}

pub fn pack_ept_status(buf: &mut [u8], pdu: &EptStatus) -> CodecResult<usize> {
    let mut offset = pack_ept_address(buf, &pdu.address)?;
    let dst = buf
        .get_mut(offset..offset + 2)
        .ok_or(CodecError::BufferTooSmall)?;
    dst.copy_from_slice(&pdu.status_code.to_wire().to_be_bytes());
    offset += 2;
    let msg_bytes = pdu.status_string.as_bytes();
    let end = offset + msg_bytes.len();
    let dst = buf.get_mut(offset..end).ok_or(CodecError::BufferTooSmall)?;
    dst.copy_from_slice(msg_bytes);
    Ok(end)
}

pub fn parse_ept_status(buf: &[u8]) -> CodecResult<(EptStatus, usize)> {
    let (address, offset) = parse_ept_address(buf)?;
    let code = read_u16(buf, offset)?;
    let status_string = String::from_utf8_lossy(&buf[offset + 2..]).into_owned();
    Ok((
        EptStatus {
            address,
            status_code: EptStatusCode::from_wire(code),
            status_string,
        },
        buf.len(),
    ))
}
