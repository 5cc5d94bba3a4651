// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RDM command/response codec and ACK_OVERFLOW reassembly (spec §4.3, §6).
//!
//! Wire format (ANSI E1.20, carried verbatim inside an RPT Request/Notification):
//! `start_code(1)=0xCC | sub_start_code(1)=0x01 | message_length(1) |
//!  dest_uid(6) | source_uid(6) | transaction_number(1) | port_id_or_resptype(1) |
//!  message_count(1) | sub_device(2) | command_class(1) | pid(2) | pdl(1) |
//!  parameter_data(pdl) | checksum(2)`.
//!
//! `message_length` covers everything from `start_code` through the last byte
//! of `parameter_data` (i.e. excludes the trailing checksum).

use super::{read_bytes, read_u16, CodecError, CodecResult};
use crate::config::{MAX_RDM_DATA_LEN, MAX_SENT_ACK_OVERFLOW_RESPONSES};
use crate::ids::Uid;

pub const RDM_START_CODE: u8 = 0xcc;
pub const RDM_SUB_START_CODE: u8 = 0x01;
pub const RDM_HEADER_LEN: usize = 1 + 1 + 1 + 6 + 6 + 1 + 1 + 1 + 2 + 1 + 2 + 1;
pub const RDM_CHECKSUM_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandClass {
    DiscoveryCommand,
    DiscoveryCommandResponse,
    GetCommand,
    GetCommandResponse,
    SetCommand,
    SetCommandResponse,
    Unknown(u8),
}

impl CommandClass {
    pub fn from_wire(value: u8) -> Self {
        match value {
            0x10 => Self::DiscoveryCommand,
            0x11 => Self::DiscoveryCommandResponse,
            0x20 => Self::GetCommand,
            0x21 => Self::GetCommandResponse,
            0x30 => Self::SetCommand,
            0x31 => Self::SetCommandResponse,
            other => Self::Unknown(other),
        }
    }

    pub fn to_wire(self) -> u8 {
        match self {
            Self::DiscoveryCommand => 0x10,
            Self::DiscoveryCommandResponse => 0x11,
            Self::GetCommand => 0x20,
            Self::GetCommandResponse => 0x21,
            Self::SetCommand => 0x30,
            Self::SetCommandResponse => 0x31,
            Self::Unknown(v) => v,
        }
    }
}

/// `port_id` on a command, `response_type` on a response; same wire byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    Ack,
    AckTimer,
    AckOverflow,
    NackReason,
    /// Command PDUs carry a port ID here rather than a response type.
    PortId(u8),
}

pub const RESPONSE_TYPE_ACK: u8 = 0x00;
pub const RESPONSE_TYPE_ACK_TIMER: u8 = 0x01;
pub const RESPONSE_TYPE_NACK_REASON: u8 = 0x02;
pub const RESPONSE_TYPE_ACK_OVERFLOW: u8 = 0x03;

impl ResponseType {
    pub fn from_response_wire(value: u8) -> Self {
        match value {
            RESPONSE_TYPE_ACK => Self::Ack,
            RESPONSE_TYPE_ACK_TIMER => Self::AckTimer,
            RESPONSE_TYPE_NACK_REASON => Self::NackReason,
            RESPONSE_TYPE_ACK_OVERFLOW => Self::AckOverflow,
            other => Self::PortId(other),
        }
    }

    pub fn to_wire(self) -> u8 {
        match self {
            Self::Ack => RESPONSE_TYPE_ACK,
            Self::AckTimer => RESPONSE_TYPE_ACK_TIMER,
            Self::NackReason => RESPONSE_TYPE_NACK_REASON,
            Self::AckOverflow => RESPONSE_TYPE_ACK_OVERFLOW,
            Self::PortId(v) => v,
        }
    }

    pub fn is_ack_overflow(self) -> bool {
        matches!(self, Self::AckOverflow)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdmPacket {
    pub dest_uid: Uid,
    pub source_uid: Uid,
    pub transaction_number: u8,
    pub response_type: ResponseType,
    pub message_count: u8,
    pub sub_device: u16,
    pub command_class: CommandClass,
    pub parameter_id: u16,
    pub parameter_data: Vec<u8>,
}

fn checksum(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0u16, |acc, &b| acc.wrapping_add(b as u16))
}

pub fn pack_rdm_packet(buf: &mut [u8], pkt: &RdmPacket) -> CodecResult<usize> {
    if pkt.parameter_data.len() > 255 {
        return Err(CodecError::MessageTooLarge);
    }
    let total = RDM_HEADER_LEN + pkt.parameter_data.len() + RDM_CHECKSUM_LEN;
    if buf.len() < total {
        return Err(CodecError::BufferTooSmall);
    }
    let message_length = (RDM_HEADER_LEN + pkt.parameter_data.len()) as u8;
    buf[0] = RDM_START_CODE;
    buf[1] = RDM_SUB_START_CODE;
    buf[2] = message_length;
    buf[3..9].copy_from_slice(&pkt.dest_uid.to_wire());
    buf[9..15].copy_from_slice(&pkt.source_uid.to_wire());
    buf[15] = pkt.transaction_number;
    buf[16] = pkt.response_type.to_wire();
    buf[17] = pkt.message_count;
    buf[18..20].copy_from_slice(&pkt.sub_device.to_be_bytes());
    buf[20] = pkt.command_class.to_wire();
    buf[21..23].copy_from_slice(&pkt.parameter_id.to_be_bytes());
    buf[23] = pkt.parameter_data.len() as u8;
    let data_end = RDM_HEADER_LEN + pkt.parameter_data.len();
    buf[RDM_HEADER_LEN..data_end].copy_from_slice(&pkt.parameter_data);
    let sum = checksum(&buf[0..data_end]);
    buf[data_end..data_end + 2].copy_from_slice(&sum.to_be_bytes());
    Ok(total)
}

pub fn parse_rdm_packet(buf: &[u8]) -> CodecResult<(RdmPacket, usize)> {
    if buf.len() < RDM_HEADER_LEN {
        return Err(CodecError::TooShort);
    }
    if buf[0] != RDM_START_CODE || buf[1] != RDM_SUB_START_CODE {
        return Err(CodecError::BadPreamble);
    }
    let pdl = buf[23] as usize;
    let total = RDM_HEADER_LEN + pdl + RDM_CHECKSUM_LEN;
    if buf.len() < total {
        return Err(CodecError::TooShort);
    }
    let declared_message_length = buf[2] as usize;
    if declared_message_length != RDM_HEADER_LEN + pdl {
        return Err(CodecError::LengthMismatch);
    }
    let sum = checksum(&buf[0..RDM_HEADER_LEN + pdl]);
    let wire_sum = read_u16(buf, RDM_HEADER_LEN + pdl)?;
    if sum != wire_sum {
        return Err(CodecError::LengthMismatch);
    }
    let mut dest_bytes = [0u8; 6];
    dest_bytes.copy_from_slice(&buf[3..9]);
    let mut src_bytes = [0u8; 6];
    src_bytes.copy_from_slice(&buf[9..15]);
    let parameter_data = read_bytes(buf, RDM_HEADER_LEN, pdl)?.to_vec();
    Ok((
        RdmPacket {
            dest_uid: Uid::from_wire(dest_bytes),
            source_uid: Uid::from_wire(src_bytes),
            transaction_number: buf[15],
            response_type: ResponseType::from_response_wire(buf[16]),
            message_count: buf[17],
            sub_device: read_u16(buf, 18)?,
            command_class: CommandClass::from_wire(buf[20]),
            parameter_id: read_u16(buf, 21)?,
            parameter_data,
        },
        total,
    ))
}

/// Reassembles a chain of ACK_OVERFLOW responses sharing one transaction
/// number into a single logical response, capped at
/// `MAX_SENT_ACK_OVERFLOW_RESPONSES * MAX_RDM_DATA_LEN` bytes (spec §4.3).
#[derive(Debug, Default)]
pub struct AckOverflowReassembler {
    transaction_number: Option<u8>,
    parts_received: usize,
    data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReassembleOutcome {
    /// More ACK_OVERFLOW parts are expected; keep feeding.
    Pending,
    /// The final (non-overflow) part arrived; reassembly is complete.
    Complete,
}

impl AckOverflowReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one RDM response. Returns `Complete` once a non-ACK_OVERFLOW
    /// response closes the chain, taking the reassembled bytes via
    /// [`Self::take`]. Errors if the chain's transaction number changes
    /// mid-reassembly or the cap is exceeded.
    pub fn feed(&mut self, pkt: &RdmPacket) -> CodecResult<ReassembleOutcome> {
        match self.transaction_number {
            Some(t) if t != pkt.transaction_number => {
                return Err(CodecError::LengthMismatch);
            }
            None => self.transaction_number = Some(pkt.transaction_number),
            _ => {}
        }
        if self.parts_received >= MAX_SENT_ACK_OVERFLOW_RESPONSES {
            return Err(CodecError::MessageTooLarge);
        }
        self.parts_received += 1;
        self.data.extend_from_slice(&pkt.parameter_data);
        if self.data.len() > MAX_SENT_ACK_OVERFLOW_RESPONSES * MAX_RDM_DATA_LEN {
            return Err(CodecError::MessageTooLarge);
        }
        if pkt.response_type.is_ack_overflow() {
            Ok(ReassembleOutcome::Pending)
        } else {
            Ok(ReassembleOutcome::Complete)
        }
    }

    /// Take the reassembled data, resetting state for the next chain.
    pub fn take(&mut self) -> Vec<u8> {
        self.transaction_number = None;
        self.parts_received = 0;
        std::mem::take(&mut self.data)
    }
}
