//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use bytes::Bytes;
use chrono::{DateTime, Utc};
use derive_new::new;
use enum_as_inner::EnumAsInner;
use sdnrace_utils::ids::{Dpid, EventId, HostId, MessageTag, PacketTag};
use sdnrace_utils::openflow::{FlowMod, FlowTable, OfpType};
use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;

//
// Logical happens-before events.
//
// Each event is written as one `type`-tagged JSON line to the trace file
// and inserted into the happens-before graph. Handle events are mutable
// between their begin and end simulator events, during which operations
// and successor links accrue; they are immutable after emission.
//
#[derive(Clone, Debug, EnumAsInner, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum HbEvent {
    #[serde(rename = "HbPacketHandle")]
    PacketHandle(PacketHandle),
    #[serde(rename = "HbPacketSend")]
    PacketSend(PacketSend),
    #[serde(rename = "HbMessageHandle")]
    MessageHandle(MessageHandle),
    #[serde(rename = "HbMessageSend")]
    MessageSend(MessageSend),
    #[serde(rename = "HbHostHandle")]
    HostHandle(HostHandle),
    #[serde(rename = "HbHostSend")]
    HostSend(HostSend),
    #[serde(rename = "HbAsyncFlowExpiry")]
    AsyncFlowExpiry(AsyncFlowExpiry),
    #[serde(rename = "HbControllerHandle")]
    ControllerHandle(ControllerHandle),
    #[serde(rename = "HbControllerSend")]
    ControllerSend(ControllerSend),
}

// A switch processing a dataplane packet.
#[serde_as]
#[derive(Clone, Debug, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct PacketHandle {
    pub eid: EventId,
    pub dpid: Dpid,
    pub pid_in: PacketTag,
    #[serde_as(as = "Base64")]
    pub packet: Bytes,
    pub in_port: u16,
    #[new(default)]
    pub pid_out: Vec<PacketTag>,
    #[new(default)]
    pub mid_out: Vec<MessageTag>,
    #[new(default)]
    pub operations: Vec<Operation>,
}

// A switch forwarding a dataplane packet.
#[serde_as]
#[derive(Clone, Debug, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct PacketSend {
    pub eid: EventId,
    pub dpid: Dpid,
    pub pid_in: PacketTag,
    pub pid_out: PacketTag,
    #[serde_as(as = "Base64")]
    pub packet: Bytes,
    pub out_port: u16,
}

// A switch processing a controller-to-switch OpenFlow message.
#[serde_as]
#[derive(Clone, Debug, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct MessageHandle {
    pub eid: EventId,
    pub dpid: Dpid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_id: Option<u64>,
    pub mid_in: MessageTag,
    pub msg_type: OfpType,
    #[serde_as(as = "Base64")]
    pub msg: Bytes,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::b64::opt_flow_mod"
    )]
    pub flow_mod: Option<FlowMod>,
    // Filled in from the buffered packet's tag when the handle performs a
    // buffer get.
    #[new(default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid_in: Option<PacketTag>,
    #[new(default)]
    pub mid_out: Vec<MessageTag>,
    #[new(default)]
    pub pid_out: Vec<PacketTag>,
    #[new(default)]
    pub operations: Vec<Operation>,
}

// A switch sending a switch-to-controller OpenFlow message.
#[serde_as]
#[derive(Clone, Debug, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct MessageSend {
    pub eid: EventId,
    pub dpid: Dpid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_id: Option<u64>,
    pub mid_in: MessageTag,
    pub mid_out: MessageTag,
    pub msg_type: OfpType,
    #[serde_as(as = "Base64")]
    pub msg: Bytes,
}

// A host processing a dataplane packet.
#[serde_as]
#[derive(Clone, Debug, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct HostHandle {
    pub eid: EventId,
    pub hid: HostId,
    pub pid_in: PacketTag,
    #[serde_as(as = "Base64")]
    pub packet: Bytes,
    pub in_port: u16,
    #[new(default)]
    pub pid_out: Vec<PacketTag>,
}

// A host sending a dataplane packet.
#[serde_as]
#[derive(Clone, Debug, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct HostSend {
    pub eid: EventId,
    pub hid: HostId,
    pub pid_in: PacketTag,
    pub pid_out: PacketTag,
    #[serde_as(as = "Base64")]
    pub packet: Bytes,
    pub out_port: u16,
}

// A switch autonomously expiring flow entries; the FLOW_REMOVED message
// sent inside the expiry bracket links here.
#[derive(Clone, Debug, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct AsyncFlowExpiry {
    pub eid: EventId,
    pub dpid: Dpid,
    #[new(default)]
    pub mid_out: Vec<MessageTag>,
}

// Synthetic controller-side events derived from controller
// instrumentation; always emitted as an adjacent handle/send pair bridging
// a switch's `HbMessageSend` to another switch's `HbMessageHandle`.
#[derive(Clone, Debug, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct ControllerHandle {
    pub eid: EventId,
    pub mid_in: MessageTag,
    pub mid_out: MessageTag,
}

#[derive(Clone, Debug, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct ControllerSend {
    pub eid: EventId,
    pub mid_in: MessageTag,
    pub mid_out: MessageTag,
}

//
// Flow-table and buffer operations nested inside handle events.
//
#[derive(Clone, Debug, EnumAsInner, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum Operation {
    FlowTableRead(FlowTableRead),
    FlowTableWrite(FlowTableWrite),
    FlowTableEntryExpiry(FlowTableEntryExpiry),
    BufferPut(BufferPut),
    BufferGet(BufferGet),
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct FlowTableRead {
    pub eid: EventId,
    pub time: DateTime<Utc>,
    #[serde_as(as = "Base64")]
    pub packet: Bytes,
    pub in_port: u16,
    #[serde(with = "crate::b64::flow_table")]
    pub flow_table: FlowTable,
    #[serde(with = "crate::b64::flow_mod")]
    pub flow_mod: FlowMod,
    pub touched_flow_bytes: u64,
    pub touched_flow_now: f64,
}

#[derive(Clone, Debug, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct FlowTableWrite {
    pub eid: EventId,
    pub time: DateTime<Utc>,
    #[serde(with = "crate::b64::flow_table")]
    pub flow_table: FlowTable,
    #[serde(with = "crate::b64::flow_mod")]
    pub flow_mod: FlowMod,
}

#[derive(Clone, Debug, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct FlowTableEntryExpiry {
    pub eid: EventId,
    pub time: DateTime<Utc>,
    #[serde(with = "crate::b64::flow_table")]
    pub flow_table: FlowTable,
    #[serde(with = "crate::b64::flow_mod")]
    pub removed: FlowMod,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct BufferPut {
    pub eid: EventId,
    pub time: DateTime<Utc>,
    #[serde_as(as = "Base64")]
    pub packet: Bytes,
    pub in_port: u16,
    pub buffer_id: u32,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct BufferGet {
    pub eid: EventId,
    pub time: DateTime<Utc>,
    #[serde_as(as = "Base64")]
    pub packet: Bytes,
    pub in_port: u16,
    pub buffer_id: u32,
}

// ===== impl HbEvent =====

impl HbEvent {
    pub fn eid(&self) -> EventId {
        match self {
            HbEvent::PacketHandle(e) => e.eid,
            HbEvent::PacketSend(e) => e.eid,
            HbEvent::MessageHandle(e) => e.eid,
            HbEvent::MessageSend(e) => e.eid,
            HbEvent::HostHandle(e) => e.eid,
            HbEvent::HostSend(e) => e.eid,
            HbEvent::AsyncFlowExpiry(e) => e.eid,
            HbEvent::ControllerHandle(e) => e.eid,
            HbEvent::ControllerSend(e) => e.eid,
        }
    }

    pub fn dpid(&self) -> Option<Dpid> {
        match self {
            HbEvent::PacketHandle(e) => Some(e.dpid),
            HbEvent::PacketSend(e) => Some(e.dpid),
            HbEvent::MessageHandle(e) => Some(e.dpid),
            HbEvent::MessageSend(e) => Some(e.dpid),
            HbEvent::AsyncFlowExpiry(e) => Some(e.dpid),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            HbEvent::PacketHandle(_) => "HbPacketHandle",
            HbEvent::PacketSend(_) => "HbPacketSend",
            HbEvent::MessageHandle(_) => "HbMessageHandle",
            HbEvent::MessageSend(_) => "HbMessageSend",
            HbEvent::HostHandle(_) => "HbHostHandle",
            HbEvent::HostSend(_) => "HbHostSend",
            HbEvent::AsyncFlowExpiry(_) => "HbAsyncFlowExpiry",
            HbEvent::ControllerHandle(_) => "HbControllerHandle",
            HbEvent::ControllerSend(_) => "HbControllerSend",
        }
    }

    // Operations attached to the event (empty for non-handle events).
    pub fn operations(&self) -> &[Operation] {
        match self {
            HbEvent::PacketHandle(e) => &e.operations,
            HbEvent::MessageHandle(e) => &e.operations,
            _ => &[],
        }
    }

    pub fn operations_mut(&mut self) -> Option<&mut Vec<Operation>> {
        match self {
            HbEvent::PacketHandle(e) => Some(&mut e.operations),
            HbEvent::MessageHandle(e) => Some(&mut e.operations),
            _ => None,
        }
    }

    // Packet tag consumed by the event, if any.
    pub fn pid_in(&self) -> Option<PacketTag> {
        match self {
            HbEvent::PacketHandle(e) => Some(e.pid_in),
            HbEvent::PacketSend(e) => Some(e.pid_in),
            HbEvent::MessageHandle(e) => e.pid_in,
            HbEvent::HostHandle(e) => Some(e.pid_in),
            HbEvent::HostSend(e) => Some(e.pid_in),
            _ => None,
        }
    }

    // Packet tags produced by the event.
    pub fn pid_out(&self) -> &[PacketTag] {
        match self {
            HbEvent::PacketHandle(e) => &e.pid_out,
            HbEvent::PacketSend(e) => std::slice::from_ref(&e.pid_out),
            HbEvent::MessageHandle(e) => &e.pid_out,
            HbEvent::HostHandle(e) => &e.pid_out,
            HbEvent::HostSend(e) => std::slice::from_ref(&e.pid_out),
            _ => &[],
        }
    }

    // Message tag consumed by the event, if any.
    pub fn mid_in(&self) -> Option<MessageTag> {
        match self {
            HbEvent::MessageHandle(e) => Some(e.mid_in),
            HbEvent::MessageSend(e) => Some(e.mid_in),
            HbEvent::ControllerHandle(e) => Some(e.mid_in),
            HbEvent::ControllerSend(e) => Some(e.mid_in),
            _ => None,
        }
    }

    // Message tags produced by the event.
    pub fn mid_out(&self) -> &[MessageTag] {
        match self {
            HbEvent::PacketHandle(e) => &e.mid_out,
            HbEvent::MessageHandle(e) => &e.mid_out,
            HbEvent::MessageSend(e) => std::slice::from_ref(&e.mid_out),
            HbEvent::AsyncFlowExpiry(e) => &e.mid_out,
            HbEvent::ControllerHandle(e) => std::slice::from_ref(&e.mid_out),
            HbEvent::ControllerSend(e) => std::slice::from_ref(&e.mid_out),
            _ => &[],
        }
    }

    // Links a successor's input packet tag into the event. Returns `false`
    // for event kinds that cannot produce packets.
    pub fn push_pid_out(&mut self, tag: PacketTag) -> bool {
        match self {
            HbEvent::PacketHandle(e) => e.pid_out.push(tag),
            HbEvent::MessageHandle(e) => e.pid_out.push(tag),
            HbEvent::HostHandle(e) => e.pid_out.push(tag),
            _ => return false,
        }
        true
    }

    // Links a successor's input message tag into the event. Returns `false`
    // for event kinds that cannot produce messages.
    pub fn push_mid_out(&mut self, tag: MessageTag) -> bool {
        match self {
            HbEvent::PacketHandle(e) => e.mid_out.push(tag),
            HbEvent::MessageHandle(e) => e.mid_out.push(tag),
            HbEvent::AsyncFlowExpiry(e) => e.mid_out.push(tag),
            _ => return false,
        }
        true
    }
}

impl std::fmt::Display for HbEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (eid {})", self.kind_name(), self.eid())
    }
}

// ===== impl Operation =====

impl Operation {
    pub fn eid(&self) -> EventId {
        match self {
            Operation::FlowTableRead(op) => op.eid,
            Operation::FlowTableWrite(op) => op.eid,
            Operation::FlowTableEntryExpiry(op) => op.eid,
            Operation::BufferPut(op) => op.eid,
            Operation::BufferGet(op) => op.eid,
        }
    }

    pub fn time(&self) -> DateTime<Utc> {
        match self {
            Operation::FlowTableRead(op) => op.time,
            Operation::FlowTableWrite(op) => op.time,
            Operation::FlowTableEntryExpiry(op) => op.time,
            Operation::BufferPut(op) => op.time,
            Operation::BufferGet(op) => op.time,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Operation::FlowTableRead(_) => "FlowTableRead",
            Operation::FlowTableWrite(_) => "FlowTableWrite",
            Operation::FlowTableEntryExpiry(_) => "FlowTableEntryExpiry",
            Operation::BufferPut(_) => "BufferPut",
            Operation::BufferGet(_) => "BufferGet",
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, Operation::FlowTableRead(_))
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Operation::FlowTableWrite(_))
    }
}
