//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use bytes::Bytes;
use derive_new::new;
use sdnrace_utils::ids::{Dpid, HostId, ObjectId};
use sdnrace_utils::openflow::{FlowMod, FlowTable};
use serde::{Deserialize, Serialize};

// A dataplane packet as handed over by the simulator: raw bytes plus the
// object-identity token the Object Registry keys on.
#[derive(Clone, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct TracedPacket {
    pub obj: ObjectId,
    pub data: Bytes,
}

// An OpenFlow message as handed over by the simulator.
#[derive(Clone, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct TracedMessage {
    pub obj: ObjectId,
    pub data: Bytes,
}

// Low-level simulator trace events consumed by the happens-before logger.
//
// Switch handle events arrive as begin/end brackets with the operations and
// sends performed inside the bracket interleaved in between; hosts are
// symmetric. The packet-update bracket marks an in-place packet mutation
// whose identity token changes while its lineage does not.
#[derive(Clone, Debug, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum TraceEvent {
    PacketHandleBegin {
        dpid: Dpid,
        packet: TracedPacket,
        in_port: u16,
    },
    PacketHandleEnd {
        dpid: Dpid,
    },
    MessageHandleBegin {
        dpid: Dpid,
        controller_id: Option<u64>,
        msg: TracedMessage,
        flow_mod: Option<FlowMod>,
    },
    MessageHandleEnd {
        dpid: Dpid,
    },
    MessageSend {
        dpid: Dpid,
        controller_id: Option<u64>,
        msg: TracedMessage,
    },
    PacketSend {
        dpid: Dpid,
        packet: TracedPacket,
        out_port: u16,
    },
    FlowTableRead {
        dpid: Dpid,
        packet: TracedPacket,
        in_port: u16,
        flow_table: FlowTable,
        flow_mod: FlowMod,
        touched_flow_bytes: u64,
        touched_flow_now: f64,
    },
    FlowTableWrite {
        dpid: Dpid,
        flow_table: FlowTable,
        flow_mod: FlowMod,
    },
    FlowTableEntryExpiry {
        dpid: Dpid,
        flow_table: FlowTable,
        removed: FlowMod,
    },
    BufferPut {
        dpid: Dpid,
        packet: TracedPacket,
        in_port: u16,
        buffer_id: u32,
    },
    BufferGet {
        dpid: Dpid,
        packet: TracedPacket,
        in_port: u16,
        buffer_id: u32,
    },
    PacketUpdateBegin {
        dpid: Dpid,
        packet: TracedPacket,
    },
    PacketUpdateEnd {
        dpid: Dpid,
        packet: TracedPacket,
    },
    AsyncFlowExpiryBegin {
        dpid: Dpid,
    },
    AsyncFlowExpiryEnd {
        dpid: Dpid,
    },
    HostPacketHandleBegin {
        hid: HostId,
        packet: TracedPacket,
        in_port: u16,
    },
    HostPacketHandleEnd {
        hid: HostId,
    },
    HostPacketSend {
        hid: HostId,
        packet: TracedPacket,
        out_port: u16,
    },
}

// ===== impl TraceEvent =====

impl TraceEvent {
    // The switch the event refers to, if any.
    pub fn dpid(&self) -> Option<Dpid> {
        match self {
            TraceEvent::PacketHandleBegin { dpid, .. }
            | TraceEvent::PacketHandleEnd { dpid }
            | TraceEvent::MessageHandleBegin { dpid, .. }
            | TraceEvent::MessageHandleEnd { dpid }
            | TraceEvent::MessageSend { dpid, .. }
            | TraceEvent::PacketSend { dpid, .. }
            | TraceEvent::FlowTableRead { dpid, .. }
            | TraceEvent::FlowTableWrite { dpid, .. }
            | TraceEvent::FlowTableEntryExpiry { dpid, .. }
            | TraceEvent::BufferPut { dpid, .. }
            | TraceEvent::BufferGet { dpid, .. }
            | TraceEvent::PacketUpdateBegin { dpid, .. }
            | TraceEvent::PacketUpdateEnd { dpid, .. }
            | TraceEvent::AsyncFlowExpiryBegin { dpid }
            | TraceEvent::AsyncFlowExpiryEnd { dpid } => Some(*dpid),
            _ => None,
        }
    }

    // The host the event refers to, if any.
    pub fn hid(&self) -> Option<HostId> {
        match self {
            TraceEvent::HostPacketHandleBegin { hid, .. }
            | TraceEvent::HostPacketHandleEnd { hid }
            | TraceEvent::HostPacketSend { hid, .. } => Some(*hid),
            _ => None,
        }
    }
}
