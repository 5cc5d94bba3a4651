// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker-layer PDUs (spec §4.2, §6): Connect, ConnectReply, the client
//! list/add/remove/change family, dynamic UID assignment, Disconnect, Null.
//!
//! Broker PDU framing: `flags(1) | length(3) | vector(2) | data`, nested
//! inside a root-layer PDU whose vector is `vector::ROOT_BROKER`.

use super::{read_bytes, read_u16, read_u24, read_u32, write_u24, CodecError, CodecResult};
use crate::error::{ConnectStatus, DisconnectWireReason};
use crate::ids::{Cid, Scope, Uid};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

pub const BROKER_HEADER_FLAGS: u8 = 0xf0;
pub const BROKER_HEADER_LEN: usize = 1 + 3 + 2;

pub fn pack_broker_header(buf: &mut [u8], vector: u16, data_len: usize) -> CodecResult<usize> {
    if buf.len() < BROKER_HEADER_LEN {
        return Err(CodecError::BufferTooSmall);
    }
    let total = BROKER_HEADER_LEN + data_len;
    buf[0] = BROKER_HEADER_FLAGS;
    write_u24(buf, 1, total as u32)?;
    buf[4..6].copy_from_slice(&vector.to_be_bytes());
    Ok(BROKER_HEADER_LEN)
}

pub fn parse_broker_header(buf: &[u8]) -> CodecResult<((u16, u32), usize)> {
    if buf.len() < BROKER_HEADER_LEN {
        return Err(CodecError::TooShort);
    }
    if buf[0] & BROKER_HEADER_FLAGS != BROKER_HEADER_FLAGS {
        return Err(CodecError::BadPreamble);
    }
    let length = read_u24(buf, 1)?;
    if (length as usize) < BROKER_HEADER_LEN {
        return Err(CodecError::LengthMismatch);
    }
    let vector = read_u16(buf, 4)?;
    Ok(((vector, length), BROKER_HEADER_LEN))
}

/// The protocol-specific tail of a client entry (spec §4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEntryData {
    Rpt {
        client_uid: Uid,
        client_type: u8,
        binding_cid: Cid,
    },
    Ept {
        protocols: Vec<u32>,
    },
    /// Unrecognized client protocol; no protocol-specific fields decoded.
    Unknown,
}

pub const RPT_CLIENT_TYPE_CONTROLLER: u8 = 0x00;
pub const RPT_CLIENT_TYPE_DEVICE: u8 = 0x01;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientEntry {
    pub client_protocol: u32,
    pub client_cid: Cid,
    pub data: ClientEntryData,
}

const CLIENT_ENTRY_HEADER_LEN: usize = 4 + 16;
const RPT_ENTRY_DATA_LEN: usize = 6 + 1 + 16;

fn pack_client_entry(buf: &mut [u8], entry: &ClientEntry) -> CodecResult<usize> {
    if buf.len() < CLIENT_ENTRY_HEADER_LEN {
        return Err(CodecError::BufferTooSmall);
    }
    buf[0..4].copy_from_slice(&entry.client_protocol.to_be_bytes());
    buf[4..20].copy_from_slice(entry.client_cid.as_bytes());
    let mut offset = CLIENT_ENTRY_HEADER_LEN;
    match &entry.data {
        ClientEntryData::Rpt {
            client_uid,
            client_type,
            binding_cid,
        } => {
            let dst = buf
                .get_mut(offset..offset + RPT_ENTRY_DATA_LEN)
                .ok_or(CodecError::BufferTooSmall)?;
            dst[0..6].copy_from_slice(&client_uid.to_wire());
            dst[6] = *client_type;
            dst[7..23].copy_from_slice(binding_cid.as_bytes());
            offset += RPT_ENTRY_DATA_LEN;
        }
        ClientEntryData::Ept { protocols } => {
            let len = protocols.len() * 4;
            let dst = buf.get_mut(offset..offset + len).ok_or(CodecError::BufferTooSmall)?;
            for (i, p) in protocols.iter().enumerate() {
                dst[i * 4..i * 4 + 4].copy_from_slice(&p.to_be_bytes());
            }
            offset += len;
        }
        ClientEntryData::Unknown => {}
    }
    Ok(offset)
}

fn parse_client_entry(buf: &[u8]) -> CodecResult<(ClientEntry, usize)> {
    if buf.len() < CLIENT_ENTRY_HEADER_LEN {
        return Err(CodecError::TooShort);
    }
    let client_protocol = read_u32(buf, 0)?;
    let mut cid_bytes = [0u8; 16];
    cid_bytes.copy_from_slice(&buf[4..20]);
    let client_cid = Cid::from_bytes(cid_bytes);
    let mut offset = CLIENT_ENTRY_HEADER_LEN;

    let data = match client_protocol {
        super::vector::CLIENT_PROTOCOL_RPT => {
            let tail = read_bytes(buf, offset, RPT_ENTRY_DATA_LEN)?;
            let mut uid_bytes = [0u8; 6];
            uid_bytes.copy_from_slice(&tail[0..6]);
            let client_type = tail[6];
            let mut binding_bytes = [0u8; 16];
            binding_bytes.copy_from_slice(&tail[7..23]);
            offset += RPT_ENTRY_DATA_LEN;
            ClientEntryData::Rpt {
                client_uid: Uid::from_wire(uid_bytes),
                client_type,
                binding_cid: Cid::from_bytes(binding_bytes),
            }
        }
        super::vector::CLIENT_PROTOCOL_EPT => {
            // EPT client entries carry a list of sub-protocol IDs filling
            // the remainder of the buffer; caller slices to the PDU bound.
            let mut protocols = Vec::new();
            while offset + 4 <= buf.len() {
                protocols.push(read_u32(buf, offset)?);
                offset += 4;
            }
            ClientEntryData::Ept { protocols }
        }
        _ => ClientEntryData::Unknown,
    };

    Ok((
        ClientEntry {
            client_protocol,
            client_cid,
            data,
        },
        offset,
    ))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPdu {
    pub client_cid: Cid,
    pub scope: Scope,
    pub e133_version: u16,
    pub connect_flags: u8,
    pub client_entry: ClientEntry,
}

pub fn pack_connect(buf: &mut [u8], pdu: &ConnectPdu) -> CodecResult<usize> {
    let mut offset = 0;
    let header_len = 16 + 63 + 2 + 1;
    if buf.len() < header_len {
        return Err(CodecError::BufferTooSmall);
    }
    buf[offset..offset + 16].copy_from_slice(pdu.client_cid.as_bytes());
    offset += 16;
    let scope_bytes = pdu.scope.as_str().as_bytes();
    buf[offset..offset + scope_bytes.len()].copy_from_slice(scope_bytes);
    for b in &mut buf[offset + scope_bytes.len()..offset + 63] {
        *b = 0;
    }
    offset += 63;
    buf[offset..offset + 2].copy_from_slice(&pdu.e133_version.to_be_bytes());
    offset += 2;
    buf[offset] = pdu.connect_flags;
    offset += 1;
    offset += pack_client_entry(&mut buf[offset..], &pdu.client_entry)?;
    Ok(offset)
}

pub fn parse_connect(buf: &[u8]) -> CodecResult<(ConnectPdu, usize)> {
    let header_len = 16 + 63 + 2 + 1;
    if buf.len() < header_len {
        return Err(CodecError::TooShort);
    }
    let mut cid_bytes = [0u8; 16];
    cid_bytes.copy_from_slice(&buf[0..16]);
    let scope_raw = &buf[16..79];
    let nul = scope_raw.iter().position(|&b| b == 0).unwrap_or(scope_raw.len());
    let scope_str = std::str::from_utf8(&scope_raw[..nul]).map_err(|_| CodecError::LengthMismatch)?;
    let scope = Scope::new(scope_str).map_err(|_| CodecError::LengthMismatch)?;
    let e133_version = read_u16(buf, 79)?;
    let connect_flags = buf[81];
    let (client_entry, entry_len) = parse_client_entry(&buf[82..])?;
    Ok((
        ConnectPdu {
            client_cid: Cid::from_bytes(cid_bytes),
            scope,
            e133_version,
            connect_flags,
            client_entry,
        },
        82 + entry_len,
    ))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectReplyPdu {
    pub connect_status: ConnectStatus,
    pub e133_version: u16,
    pub broker_cid: Cid,
    pub client_uid: Uid,
}

const CONNECT_REPLY_LEN: usize = 2 + 2 + 16 + 6;

pub fn pack_connect_reply(buf: &mut [u8], pdu: &ConnectReplyPdu) -> CodecResult<usize> {
    if buf.len() < CONNECT_REPLY_LEN {
        return Err(CodecError::BufferTooSmall);
    }
    buf[0..2].copy_from_slice(&pdu.connect_status.to_wire().to_be_bytes());
    buf[2..4].copy_from_slice(&pdu.e133_version.to_be_bytes());
    buf[4..20].copy_from_slice(pdu.broker_cid.as_bytes());
    buf[20..26].copy_from_slice(&pdu.client_uid.to_wire());
    Ok(CONNECT_REPLY_LEN)
}

pub fn parse_connect_reply(buf: &[u8]) -> CodecResult<(ConnectReplyPdu, usize)> {
    if buf.len() < CONNECT_REPLY_LEN {
        return Err(CodecError::TooShort);
    }
    let connect_status = ConnectStatus::from_wire(read_u16(buf, 0)?);
    let e133_version = read_u16(buf, 2)?;
    let mut cid_bytes = [0u8; 16];
    cid_bytes.copy_from_slice(&buf[4..20]);
    let mut uid_bytes = [0u8; 6];
    uid_bytes.copy_from_slice(&buf[20..26]);
    Ok((
        ConnectReplyPdu {
            connect_status,
            e133_version,
            broker_cid: Cid::from_bytes(cid_bytes),
            client_uid: Uid::from_wire(uid_bytes),
        },
        CONNECT_REPLY_LEN,
    ))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientEntryUpdatePdu {
    pub connect_flags: u8,
    pub client_entry: ClientEntry,
}

pub fn pack_client_entry_update(buf: &mut [u8], pdu: &ClientEntryUpdatePdu) -> CodecResult<usize> {
    if buf.is_empty() {
        return Err(CodecError::BufferTooSmall);
    }
    buf[0] = pdu.connect_flags;
    let n = pack_client_entry(&mut buf[1..], &pdu.client_entry)?;
    Ok(1 + n)
}

pub fn parse_client_entry_update(buf: &[u8]) -> CodecResult<(ClientEntryUpdatePdu, usize)> {
    if buf.is_empty() {
        return Err(CodecError::TooShort);
    }
    let connect_flags = buf[0];
    let (client_entry, n) = parse_client_entry(&buf[1..])?;
    Ok((
        ClientEntryUpdatePdu {
            connect_flags,
            client_entry,
        },
        1 + n,
    ))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectPdu {
    pub addr: SocketAddr,
}

pub fn pack_redirect(buf: &mut [u8], pdu: &RedirectPdu) -> CodecResult<usize> {
    match pdu.addr.ip() {
        IpAddr::V4(v4) => {
            if buf.len() < 4 + 2 {
                return Err(CodecError::BufferTooSmall);
            }
            buf[0..4].copy_from_slice(&v4.octets());
            buf[4..6].copy_from_slice(&pdu.addr.port().to_be_bytes());
            Ok(6)
        }
        IpAddr::V6(v6) => {
            if buf.len() < 16 + 2 {
                return Err(CodecError::BufferTooSmall);
            }
            buf[0..16].copy_from_slice(&v6.octets());
            buf[16..18].copy_from_slice(&pdu.addr.port().to_be_bytes());
            Ok(18)
        }
    }
}

pub fn parse_redirect_v4(buf: &[u8]) -> CodecResult<(RedirectPdu, usize)> {
    if buf.len() < 6 {
        return Err(CodecError::TooShort);
    }
    let ip = Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]);
    let port = read_u16(buf, 4)?;
    Ok((
        RedirectPdu {
            addr: SocketAddr::new(IpAddr::V4(ip), port),
        },
        6,
    ))
}

pub fn parse_redirect_v6(buf: &[u8]) -> CodecResult<(RedirectPdu, usize)> {
    if buf.len() < 18 {
        return Err(CodecError::TooShort);
    }
    let mut octets = [0u8; 16];
    octets.copy_from_slice(&buf[0..16]);
    let ip = Ipv6Addr::from(octets);
    let port = read_u16(buf, 16)?;
    Ok((
        RedirectPdu {
            addr: SocketAddr::new(IpAddr::V6(ip), port),
        },
        18,
    ))
}

/// `ClientList` wraps the list PDUs that differ only in vector:
/// ConnectedClientList, ClientAdd, ClientRemove, ClientEntryChange.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientList {
    pub entries: Vec<ClientEntry>,
}

pub fn pack_client_list(buf: &mut [u8], list: &ClientList) -> CodecResult<usize> {
    let mut offset = 0;
    for entry in &list.entries {
        offset += pack_client_entry(&mut buf[offset..], entry)?;
    }
    Ok(offset)
}

pub fn parse_client_list(buf: &[u8]) -> CodecResult<(ClientList, usize)> {
    let mut offset = 0;
    let mut entries = Vec::new();
    while offset < buf.len() {
        let (entry, n) = parse_client_entry(&buf[offset..])?;
        entries.push(entry);
        offset += n;
    }
    Ok((ClientList { entries }, offset))
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestDynamicUidListPdu {
    pub cids: Vec<Cid>,
}

pub fn pack_request_dynamic_uid_list(buf: &mut [u8], pdu: &RequestDynamicUidListPdu) -> CodecResult<usize> {
    let need = pdu.cids.len() * 16;
    if buf.len() < need {
        return Err(CodecError::BufferTooSmall);
    }
    for (i, cid) in pdu.cids.iter().enumerate() {
        buf[i * 16..i * 16 + 16].copy_from_slice(cid.as_bytes());
    }
    Ok(need)
}

pub fn parse_request_dynamic_uid_list(buf: &[u8]) -> CodecResult<(RequestDynamicUidListPdu, usize)> {
    if buf.len() % 16 != 0 {
        return Err(CodecError::LengthMismatch);
    }
    let mut cids = Vec::new();
    for chunk in buf.chunks_exact(16) {
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(chunk);
        cids.push(Cid::from_bytes(bytes));
    }
    Ok((RequestDynamicUidListPdu { cids }, buf.len()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicUidMapping {
    pub uid: Uid,
    pub cid: Cid,
    pub status: ConnectStatus,
}

const DYNAMIC_MAPPING_LEN: usize = 6 + 16 + 2;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssignedDynamicUidListPdu {
    pub mappings: Vec<DynamicUidMapping>,
}

pub fn pack_assigned_dynamic_uid_list(buf: &mut [u8], pdu: &AssignedDynamicUidListPdu) -> CodecResult<usize> {
    let need = pdu.mappings.len() * DYNAMIC_MAPPING_LEN;
    if buf.len() < need {
        return Err(CodecError::BufferTooSmall);
    }
    for (i, m) in pdu.mappings.iter().enumerate() {
        let off = i * DYNAMIC_MAPPING_LEN;
        buf[off..off + 6].copy_from_slice(&m.uid.to_wire());
        buf[off + 6..off + 22].copy_from_slice(m.cid.as_bytes());
        buf[off + 22..off + 24].copy_from_slice(&m.status.to_wire().to_be_bytes());
    }
    Ok(need)
}

pub fn parse_assigned_dynamic_uid_list(buf: &[u8]) -> CodecResult<(AssignedDynamicUidListPdu, usize)> {
    if buf.len() % DYNAMIC_MAPPING_LEN != 0 {
        return Err(CodecError::LengthMismatch);
    }
    let mut mappings = Vec::new();
    for chunk in buf.chunks_exact(DYNAMIC_MAPPING_LEN) {
        let mut uid_bytes = [0u8; 6];
        uid_bytes.copy_from_slice(&chunk[0..6]);
        let mut cid_bytes = [0u8; 16];
        cid_bytes.copy_from_slice(&chunk[6..22]);
        let status = ConnectStatus::from_wire(u16::from_be_bytes([chunk[22], chunk[23]]));
        mappings.push(DynamicUidMapping {
            uid: Uid::from_wire(uid_bytes),
            cid: Cid::from_bytes(cid_bytes),
            status,
        });
    }
    Ok((AssignedDynamicUidListPdu { mappings }, buf.len()))
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchDynamicUidListPdu {
    pub uids: Vec<Uid>,
}

pub fn pack_fetch_dynamic_uid_list(buf: &mut [u8], pdu: &FetchDynamicUidListPdu) -> CodecResult<usize> {
    let need = pdu.uids.len() * 6;
    if buf.len() < need {
        return Err(CodecError::BufferTooSmall);
    }
    for (i, uid) in pdu.uids.iter().enumerate() {
        buf[i * 6..i * 6 + 6].copy_from_slice(&uid.to_wire());
    }
    Ok(need)
}

pub fn parse_fetch_dynamic_uid_list(buf: &[u8]) -> CodecResult<(FetchDynamicUidListPdu, usize)> {
    if buf.len() % 6 != 0 {
        return Err(CodecError::LengthMismatch);
    }
    let mut uids = Vec::new();
    for chunk in buf.chunks_exact(6) {
        let mut bytes = [0u8; 6];
        bytes.copy_from_slice(chunk);
        uids.push(Uid::from_wire(bytes));
    }
    Ok((FetchDynamicUidListPdu { uids }, buf.len()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisconnectPdu {
    pub reason: DisconnectWireReason,
}

pub fn pack_disconnect(buf: &mut [u8], pdu: &DisconnectPdu) -> CodecResult<usize> {
    if buf.len() < 2 {
        return Err(CodecError::BufferTooSmall);
    }
    buf[0..2].copy_from_slice(&pdu.reason.to_wire().to_be_bytes());
    Ok(2)
}

pub fn parse_disconnect(buf: &[u8]) -> CodecResult<(DisconnectPdu, usize)> {
    if buf.len() < 2 {
        return Err(CodecError::TooShort);
    }
    let reason = DisconnectWireReason::from_wire(read_u16(buf, 0)?);
    Ok((DisconnectPdu { reason }, 2))
}
