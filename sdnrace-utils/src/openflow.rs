//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut, TryGetError};
use derive_new::new;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::bytes::TLS_BUF;
use crate::mac_addr::MacAddr;

// Type aliases.
pub type DecodeResult<T> = Result<T, DecodeError>;

// OpenFlow protocol version implemented by this model.
pub const OFP_VERSION: u8 = 1;

// OpenFlow 1.0 message types.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, Hash, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum OfpType {
    Hello = 0,
    Error = 1,
    EchoRequest = 2,
    EchoReply = 3,
    Vendor = 4,
    FeaturesRequest = 5,
    FeaturesReply = 6,
    GetConfigRequest = 7,
    GetConfigReply = 8,
    SetConfig = 9,
    PacketIn = 10,
    FlowRemoved = 11,
    PortStatus = 12,
    PacketOut = 13,
    FlowMod = 14,
    PortMod = 15,
    StatsRequest = 16,
    StatsReply = 17,
    BarrierRequest = 18,
    BarrierReply = 19,
    QueueGetConfigRequest = 20,
    QueueGetConfigReply = 21,
}

//
// OpenFlow 1.0 message header.
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |    Version    |     Type      |            Length             |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                              XID                              |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[derive(Clone, Copy, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct OfpHeader {
    pub msg_type: OfpType,
    pub length: u16,
    pub xid: u32,
}

// Flow match wildcards.
//
// The NW_SRC/NW_DST fields are 6-bit wide counts of wildcarded low-order
// address bits; values of 32 or higher wildcard the entire address.
bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct Wildcards: u32 {
        const IN_PORT = 1 << 0;
        const DL_VLAN = 1 << 1;
        const DL_SRC = 1 << 2;
        const DL_DST = 1 << 3;
        const DL_TYPE = 1 << 4;
        const NW_PROTO = 1 << 5;
        const TP_SRC = 1 << 6;
        const TP_DST = 1 << 7;
        const NW_SRC_MASK = 0x3f << 8;
        const NW_DST_MASK = 0x3f << 14;
        const DL_VLAN_PCP = 1 << 20;
        const NW_TOS = 1 << 21;
    }
}

//
// OpenFlow 1.0 flow match structure (40 bytes on the wire).
//
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Match {
    pub wildcards: Wildcards,
    pub in_port: u16,
    pub dl_src: MacAddr,
    pub dl_dst: MacAddr,
    pub dl_vlan: u16,
    pub dl_vlan_pcp: u8,
    pub dl_type: u16,
    pub nw_tos: u8,
    pub nw_proto: u8,
    pub nw_src: Ipv4Addr,
    pub nw_dst: Ipv4Addr,
    pub tp_src: u16,
    pub tp_dst: u16,
}

// Flow mod commands.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, Hash, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum FlowModCommand {
    Add = 0,
    Modify = 1,
    ModifyStrict = 2,
    Delete = 3,
    DeleteStrict = 4,
}

// Flow mod flags.
bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct FlowModFlags: u16 {
        const SEND_FLOW_REM = 1 << 0;
        const CHECK_OVERLAP = 1 << 1;
        const EMERG = 1 << 2;
    }
}

// Flow actions. Only the output action is modelled structurally; other
// action types are carried opaquely so messages round-trip unchanged.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum Action {
    Output { port: u16, max_len: u16 },
    Other { action_type: u16, body: Bytes },
}

//
// OpenFlow 1.0 flow mod message (72 bytes plus actions on the wire,
// including the message header).
//
#[derive(Clone, Debug, Eq, Hash, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct FlowMod {
    #[new(default)]
    pub xid: u32,
    pub match_: Match,
    pub cookie: u64,
    pub command: FlowModCommand,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub priority: u16,
    pub buffer_id: u32,
    pub out_port: u16,
    pub flags: FlowModFlags,
    pub actions: Vec<Action>,
}

// A switch flow table, serialised as the concatenation of the flow-mod
// representations of its entries.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct FlowTable {
    pub flows: Vec<FlowMod>,
}

// OpenFlow decode errors.
#[derive(Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum DecodeError {
    IncompleteMessage,
    InvalidVersion(u8),
    UnknownMessageType(u8),
    UnexpectedMessageType(u8),
    InvalidLength(u16),
    UnknownFlowModCommand(u16),
    InvalidActionLength(u16),
    ReadOutOfBounds,
}

// ===== impl OfpType =====

impl std::fmt::Display for OfpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OfpType::Hello => "HELLO",
            OfpType::Error => "ERROR",
            OfpType::EchoRequest => "ECHO_REQUEST",
            OfpType::EchoReply => "ECHO_REPLY",
            OfpType::Vendor => "VENDOR",
            OfpType::FeaturesRequest => "FEATURES_REQUEST",
            OfpType::FeaturesReply => "FEATURES_REPLY",
            OfpType::GetConfigRequest => "GET_CONFIG_REQUEST",
            OfpType::GetConfigReply => "GET_CONFIG_REPLY",
            OfpType::SetConfig => "SET_CONFIG",
            OfpType::PacketIn => "PACKET_IN",
            OfpType::FlowRemoved => "FLOW_REMOVED",
            OfpType::PortStatus => "PORT_STATUS",
            OfpType::PacketOut => "PACKET_OUT",
            OfpType::FlowMod => "FLOW_MOD",
            OfpType::PortMod => "PORT_MOD",
            OfpType::StatsRequest => "STATS_REQUEST",
            OfpType::StatsReply => "STATS_REPLY",
            OfpType::BarrierRequest => "BARRIER_REQUEST",
            OfpType::BarrierReply => "BARRIER_REPLY",
            OfpType::QueueGetConfigRequest => "QUEUE_GET_CONFIG_REQUEST",
            OfpType::QueueGetConfigReply => "QUEUE_GET_CONFIG_REPLY",
        };
        write!(f, "{name}")
    }
}

// ===== impl FlowModCommand =====

impl std::fmt::Display for FlowModCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FlowModCommand::Add => "ADD",
            FlowModCommand::Modify => "MODIFY",
            FlowModCommand::ModifyStrict => "MODIFY_STRICT",
            FlowModCommand::Delete => "DELETE",
            FlowModCommand::DeleteStrict => "DELETE_STRICT",
        };
        write!(f, "{name}")
    }
}

// ===== impl OfpHeader =====

impl OfpHeader {
    pub const LENGTH: usize = 8;

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(OFP_VERSION);
        buf.put_u8(self.msg_type as u8);
        buf.put_u16(self.length);
        buf.put_u32(self.xid);
    }

    pub fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        let version = buf.try_get_u8()?;
        if version != OFP_VERSION {
            return Err(DecodeError::InvalidVersion(version));
        }
        let msg_type = buf.try_get_u8()?;
        let Some(msg_type) = OfpType::from_u8(msg_type) else {
            return Err(DecodeError::UnknownMessageType(msg_type));
        };
        let length = buf.try_get_u16()?;
        if (length as usize) < Self::LENGTH {
            return Err(DecodeError::InvalidLength(length));
        }
        let xid = buf.try_get_u32()?;

        Ok(OfpHeader {
            msg_type,
            length,
            xid,
        })
    }
}

// ===== impl Wildcards =====

impl Wildcards {
    pub const NW_SRC_SHIFT: u32 = 8;
    pub const NW_DST_SHIFT: u32 = 14;

    // Wildcards matching every field.
    pub fn wildcard_all() -> Wildcards {
        Wildcards::all()
    }

    // Number of wildcarded low-order bits of the source address.
    pub fn nw_src_wild_bits(&self) -> u32 {
        (self.bits() >> Self::NW_SRC_SHIFT) & 0x3f
    }

    // Number of wildcarded low-order bits of the destination address.
    pub fn nw_dst_wild_bits(&self) -> u32 {
        (self.bits() >> Self::NW_DST_SHIFT) & 0x3f
    }

    // Significant prefix length of the source address.
    pub fn nw_src_prefix_len(&self) -> u32 {
        32u32.saturating_sub(self.nw_src_wild_bits())
    }

    // Significant prefix length of the destination address.
    pub fn nw_dst_prefix_len(&self) -> u32 {
        32u32.saturating_sub(self.nw_dst_wild_bits())
    }
}

// ===== impl Match =====

impl Match {
    pub const LENGTH: usize = 40;

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.wildcards.bits());
        buf.put_u16(self.in_port);
        buf.put_slice(&self.dl_src.as_bytes());
        buf.put_slice(&self.dl_dst.as_bytes());
        buf.put_u16(self.dl_vlan);
        buf.put_u8(self.dl_vlan_pcp);
        buf.put_u8(0);
        buf.put_u16(self.dl_type);
        buf.put_u8(self.nw_tos);
        buf.put_u8(self.nw_proto);
        buf.put_u16(0);
        buf.put_u32(self.nw_src.into());
        buf.put_u32(self.nw_dst.into());
        buf.put_u16(self.tp_src);
        buf.put_u16(self.tp_dst);
    }

    pub fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        let wildcards = Wildcards::from_bits_retain(buf.try_get_u32()?);
        let in_port = buf.try_get_u16()?;
        let mut dl_src = [0; MacAddr::LENGTH];
        buf.try_copy_to_slice(&mut dl_src)?;
        let mut dl_dst = [0; MacAddr::LENGTH];
        buf.try_copy_to_slice(&mut dl_dst)?;
        let dl_vlan = buf.try_get_u16()?;
        let dl_vlan_pcp = buf.try_get_u8()?;
        let _ = buf.try_get_u8()?;
        let dl_type = buf.try_get_u16()?;
        let nw_tos = buf.try_get_u8()?;
        let nw_proto = buf.try_get_u8()?;
        let _ = buf.try_get_u16()?;
        let nw_src = Ipv4Addr::from(buf.try_get_u32()?);
        let nw_dst = Ipv4Addr::from(buf.try_get_u32()?);
        let tp_src = buf.try_get_u16()?;
        let tp_dst = buf.try_get_u16()?;

        Ok(Match {
            wildcards,
            in_port,
            dl_src: dl_src.into(),
            dl_dst: dl_dst.into(),
            dl_vlan,
            dl_vlan_pcp,
            dl_type,
            nw_tos,
            nw_proto,
            nw_src,
            nw_dst,
            tp_src,
            tp_dst,
        })
    }

    // Whether some packet can match both flow matches. Conservative: fields
    // whose relevance depends on other fields (e.g. transport ports without
    // a matching dl_type) are compared independently, which can only report
    // an overlap that a stricter interpretation would rule out.
    pub fn overlaps(&self, other: &Match) -> bool {
        fn both_constrain(a: &Match, b: &Match, flag: Wildcards) -> bool {
            !a.wildcards.contains(flag) && !b.wildcards.contains(flag)
        }

        if both_constrain(self, other, Wildcards::IN_PORT)
            && self.in_port != other.in_port
        {
            return false;
        }
        if both_constrain(self, other, Wildcards::DL_SRC)
            && self.dl_src != other.dl_src
        {
            return false;
        }
        if both_constrain(self, other, Wildcards::DL_DST)
            && self.dl_dst != other.dl_dst
        {
            return false;
        }
        if both_constrain(self, other, Wildcards::DL_VLAN)
            && self.dl_vlan != other.dl_vlan
        {
            return false;
        }
        if both_constrain(self, other, Wildcards::DL_VLAN_PCP)
            && self.dl_vlan_pcp != other.dl_vlan_pcp
        {
            return false;
        }
        if both_constrain(self, other, Wildcards::DL_TYPE)
            && self.dl_type != other.dl_type
        {
            return false;
        }
        if both_constrain(self, other, Wildcards::NW_TOS)
            && self.nw_tos != other.nw_tos
        {
            return false;
        }
        if both_constrain(self, other, Wildcards::NW_PROTO)
            && self.nw_proto != other.nw_proto
        {
            return false;
        }
        if both_constrain(self, other, Wildcards::TP_SRC)
            && self.tp_src != other.tp_src
        {
            return false;
        }
        if both_constrain(self, other, Wildcards::TP_DST)
            && self.tp_dst != other.tp_dst
        {
            return false;
        }

        let plen = std::cmp::min(
            self.wildcards.nw_src_prefix_len(),
            other.wildcards.nw_src_prefix_len(),
        );
        if plen > 0
            && (u32::from(self.nw_src) >> (32 - plen))
                != (u32::from(other.nw_src) >> (32 - plen))
        {
            return false;
        }

        let plen = std::cmp::min(
            self.wildcards.nw_dst_prefix_len(),
            other.wildcards.nw_dst_prefix_len(),
        );
        if plen > 0
            && (u32::from(self.nw_dst) >> (32 - plen))
                != (u32::from(other.nw_dst) >> (32 - plen))
        {
            return false;
        }

        true
    }
}

impl Default for Match {
    fn default() -> Match {
        Match {
            wildcards: Wildcards::wildcard_all(),
            in_port: 0,
            dl_src: MacAddr::default(),
            dl_dst: MacAddr::default(),
            dl_vlan: 0,
            dl_vlan_pcp: 0,
            dl_type: 0,
            nw_tos: 0,
            nw_proto: 0,
            nw_src: Ipv4Addr::UNSPECIFIED,
            nw_dst: Ipv4Addr::UNSPECIFIED,
            tp_src: 0,
            tp_dst: 0,
        }
    }
}

// ===== impl Action =====

impl Action {
    pub const TYPE_OUTPUT: u16 = 0;
    pub const HDR_LENGTH: usize = 4;

    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Action::Output { port, max_len } => {
                buf.put_u16(Self::TYPE_OUTPUT);
                buf.put_u16(8);
                buf.put_u16(*port);
                buf.put_u16(*max_len);
            }
            Action::Other { action_type, body } => {
                buf.put_u16(*action_type);
                buf.put_u16((Self::HDR_LENGTH + body.len()) as u16);
                buf.put_slice(body);
            }
        }
    }

    pub fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        let action_type = buf.try_get_u16()?;
        let length = buf.try_get_u16()?;
        if (length as usize) < Self::HDR_LENGTH
            || (length as usize - Self::HDR_LENGTH) > buf.remaining()
        {
            return Err(DecodeError::InvalidActionLength(length));
        }
        let body_len = length as usize - Self::HDR_LENGTH;

        let action = match action_type {
            Self::TYPE_OUTPUT => {
                if body_len != 4 {
                    return Err(DecodeError::InvalidActionLength(length));
                }
                let port = buf.try_get_u16()?;
                let max_len = buf.try_get_u16()?;
                Action::Output { port, max_len }
            }
            _ => {
                let body = buf.copy_to_bytes(body_len);
                Action::Other { action_type, body }
            }
        };

        Ok(action)
    }
}

// ===== impl FlowMod =====

impl FlowMod {
    pub const BASE_LENGTH: usize = OfpHeader::LENGTH + Match::LENGTH + 24;

    // Encodes the flow mod as a complete OpenFlow message, header included.
    pub fn encode(&self) -> BytesMut {
        TLS_BUF.with(|buf| {
            let mut buf = buf.borrow_mut();
            buf.clear();

            let header = OfpHeader::new(OfpType::FlowMod, 0, self.xid);
            header.encode(&mut buf);
            self.match_.encode(&mut buf);
            buf.put_u64(self.cookie);
            buf.put_u16(self.command as u16);
            buf.put_u16(self.idle_timeout);
            buf.put_u16(self.hard_timeout);
            buf.put_u16(self.priority);
            buf.put_u32(self.buffer_id);
            buf.put_u16(self.out_port);
            buf.put_u16(self.flags.bits());
            for action in &self.actions {
                action.encode(&mut buf);
            }

            // Initialize message length.
            let length = buf.len() as u16;
            buf[2..4].copy_from_slice(&length.to_be_bytes());
            buf.clone()
        })
    }

    // Decodes a flow mod from a complete OpenFlow message.
    pub fn decode(data: &[u8]) -> DecodeResult<Self> {
        let mut buf = Bytes::copy_from_slice(data);

        let header = OfpHeader::decode(&mut buf)?;
        if header.msg_type != OfpType::FlowMod {
            return Err(DecodeError::UnexpectedMessageType(
                header.msg_type as u8,
            ));
        }
        if (header.length as usize) < Self::BASE_LENGTH
            || (header.length as usize) > data.len()
        {
            return Err(DecodeError::InvalidLength(header.length));
        }

        let match_ = Match::decode(&mut buf)?;
        let cookie = buf.try_get_u64()?;
        let command = buf.try_get_u16()?;
        let Some(command) = FlowModCommand::from_u16(command) else {
            return Err(DecodeError::UnknownFlowModCommand(command));
        };
        let idle_timeout = buf.try_get_u16()?;
        let hard_timeout = buf.try_get_u16()?;
        let priority = buf.try_get_u16()?;
        let buffer_id = buf.try_get_u32()?;
        let out_port = buf.try_get_u16()?;
        let flags = FlowModFlags::from_bits_retain(buf.try_get_u16()?);

        let mut actions = vec![];
        let mut remaining = header.length as usize - Self::BASE_LENGTH;
        while remaining > 0 {
            let before = buf.remaining();
            actions.push(Action::decode(&mut buf)?);
            remaining = remaining.saturating_sub(before - buf.remaining());
        }

        Ok(FlowMod {
            xid: header.xid,
            match_,
            cookie,
            command,
            idle_timeout,
            hard_timeout,
            priority,
            buffer_id,
            out_port,
            flags,
            actions,
        })
    }
}

// ===== impl FlowTable =====

impl FlowTable {
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        for flow in &self.flows {
            buf.extend_from_slice(&flow.encode());
        }
        buf
    }

    pub fn decode(data: &[u8]) -> DecodeResult<Self> {
        let mut flows = vec![];
        let mut offset = 0;

        while offset < data.len() {
            let rest = &data[offset..];
            if rest.len() < OfpHeader::LENGTH {
                return Err(DecodeError::IncompleteMessage);
            }
            let length = u16::from_be_bytes([rest[2], rest[3]]) as usize;
            if length < OfpHeader::LENGTH || length > rest.len() {
                return Err(DecodeError::InvalidLength(length as u16));
            }
            flows.push(FlowMod::decode(&rest[..length])?);
            offset += length;
        }

        Ok(FlowTable { flows })
    }
}

// ===== impl DecodeError =====

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::IncompleteMessage => {
                write!(f, "Incomplete message")
            }
            DecodeError::InvalidVersion(version) => {
                write!(f, "Invalid OpenFlow version: {version}")
            }
            DecodeError::UnknownMessageType(msg_type) => {
                write!(f, "Unknown message type: {msg_type}")
            }
            DecodeError::UnexpectedMessageType(msg_type) => {
                write!(f, "Unexpected message type: {msg_type}")
            }
            DecodeError::InvalidLength(length) => {
                write!(f, "Invalid message length: {length}")
            }
            DecodeError::UnknownFlowModCommand(command) => {
                write!(f, "Unknown flow mod command: {command}")
            }
            DecodeError::InvalidActionLength(length) => {
                write!(f, "Invalid action length: {length}")
            }
            DecodeError::ReadOutOfBounds => {
                write!(f, "attempt to read out of bounds")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<TryGetError> for DecodeError {
    fn from(_error: TryGetError) -> DecodeError {
        DecodeError::ReadOutOfBounds
    }
}

// ===== global functions =====

// Extracts the message type from a raw OpenFlow message.
pub fn message_type(data: &[u8]) -> DecodeResult<OfpType> {
    let mut buf = Bytes::copy_from_slice(data);
    let header = OfpHeader::decode(&mut buf)?;
    Ok(header.msg_type)
}
