//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use chrono::Utc;
use sdnrace_trace::b64;
use sdnrace_trace::events::{TraceEvent, TracedMessage, TracedPacket};
use sdnrace_trace::hb::{
    AsyncFlowExpiry, BufferGet, BufferPut, FlowTableEntryExpiry,
    FlowTableRead, FlowTableWrite, HbEvent, HostHandle, HostSend,
    MessageHandle, MessageSend, Operation, PacketHandle, PacketSend,
};
use sdnrace_utils::ids::{Dpid, HostId};
use sdnrace_utils::openflow::{self, FlowMod};
use tracing::warn;

use crate::controller;
use crate::debug::Debug;
use crate::error::Error;
use crate::logger::HappensBeforeLogger;

// Processes one simulator trace event. Errors are reported to the caller,
// which logs them and keeps collecting; a single bad event never aborts
// the trace.
pub fn process_trace_event(
    logger: &mut HappensBeforeLogger,
    event: TraceEvent,
) -> Result<(), Error> {
    if !logger.is_open() {
        return Ok(());
    }
    Debug::TraceEventRx(&event).log();

    match event {
        TraceEvent::PacketHandleBegin {
            dpid,
            packet,
            in_port,
        } => process_packet_handle_begin(logger, dpid, packet, in_port),
        TraceEvent::PacketHandleEnd { dpid } => {
            logger.finish_switch_event(dpid)
        }
        TraceEvent::MessageHandleBegin {
            dpid,
            controller_id,
            msg,
            flow_mod,
        } => process_message_handle_begin(
            logger,
            dpid,
            controller_id,
            msg,
            flow_mod,
        ),
        TraceEvent::MessageHandleEnd { dpid } => {
            logger.finish_switch_event(dpid)
        }
        TraceEvent::MessageSend {
            dpid,
            controller_id,
            msg,
        } => process_message_send(logger, dpid, controller_id, msg),
        TraceEvent::PacketSend {
            dpid,
            packet,
            out_port,
        } => process_packet_send(logger, dpid, packet, out_port),
        TraceEvent::FlowTableRead {
            dpid,
            packet,
            in_port,
            flow_table,
            flow_mod,
            touched_flow_bytes,
            touched_flow_now,
        } => {
            let operation = FlowTableRead::new(
                logger.next_eid(),
                Utc::now(),
                packet.data,
                in_port,
                flow_table,
                flow_mod,
                touched_flow_bytes,
                touched_flow_now,
            );
            logger.add_operation_to_switch_event(
                dpid,
                Operation::FlowTableRead(operation),
            );
            Ok(())
        }
        TraceEvent::FlowTableWrite {
            dpid,
            flow_table,
            flow_mod,
        } => {
            let operation = FlowTableWrite::new(
                logger.next_eid(),
                Utc::now(),
                flow_table,
                flow_mod,
            );
            logger.add_operation_to_switch_event(
                dpid,
                Operation::FlowTableWrite(operation),
            );
            Ok(())
        }
        TraceEvent::FlowTableEntryExpiry {
            dpid,
            flow_table,
            removed,
        } => {
            let operation = FlowTableEntryExpiry::new(
                logger.next_eid(),
                Utc::now(),
                flow_table,
                removed,
            );
            logger.add_operation_to_switch_event(
                dpid,
                Operation::FlowTableEntryExpiry(operation),
            );
            Ok(())
        }
        TraceEvent::BufferPut {
            dpid,
            packet,
            in_port,
            buffer_id,
        } => process_buffer_put(logger, dpid, packet, in_port, buffer_id),
        TraceEvent::BufferGet {
            dpid,
            packet,
            in_port,
            buffer_id,
        } => process_buffer_get(logger, dpid, packet, in_port, buffer_id),
        TraceEvent::PacketUpdateBegin { dpid, packet } => {
            // Remember the tag so it survives the identity change.
            let tag = logger.pids.get_tag(packet.obj);
            logger.pending_packet_update.insert(dpid, tag);
            Ok(())
        }
        TraceEvent::PacketUpdateEnd { dpid, packet } => {
            let Some(tag) = logger.pending_packet_update.remove(&dpid) else {
                return Err(Error::PacketUpdateEndWithoutBegin(dpid));
            };
            if !logger.pids.replace_obj(tag, packet.obj) {
                return Err(Error::PacketUpdateTagMissing(dpid, tag));
            }
            Ok(())
        }
        TraceEvent::AsyncFlowExpiryBegin { dpid } => {
            let event = AsyncFlowExpiry::new(logger.next_eid(), dpid);
            logger.start_switch_event(dpid, HbEvent::AsyncFlowExpiry(event))
        }
        TraceEvent::AsyncFlowExpiryEnd { dpid } => {
            logger.finish_switch_event(dpid)
        }
        TraceEvent::HostPacketHandleBegin {
            hid,
            packet,
            in_port,
        } => process_host_packet_handle_begin(logger, hid, packet, in_port),
        TraceEvent::HostPacketHandleEnd { hid } => {
            logger.finish_host_event(hid)
        }
        TraceEvent::HostPacketSend {
            hid,
            packet,
            out_port,
        } => process_host_packet_send(logger, hid, packet, out_port),
    }
}

// ===== switch events =====

fn process_packet_handle_begin(
    logger: &mut HappensBeforeLogger,
    dpid: Dpid,
    packet: TracedPacket,
    in_port: u16,
) -> Result<(), Error> {
    // Matches a pid_out as the packet kept its identity across the link.
    let pid_in = logger.pids.get_tag(packet.obj);

    let event =
        PacketHandle::new(logger.next_eid(), dpid, pid_in, packet.data, in_port);
    logger.start_switch_event(dpid, HbEvent::PacketHandle(event))
}

fn process_message_handle_begin(
    logger: &mut HappensBeforeLogger,
    dpid: Dpid,
    controller_id: Option<u64>,
    msg: TracedMessage,
    flow_mod: Option<FlowMod>,
) -> Result<(), Error> {
    // Filled in, but never matches a mid_out directly; the link is
    // established by the controller instrumentation.
    let mid_in = logger.mids.get_tag(msg.obj);
    let msg_type = openflow::message_type(&msg.data)
        .map_err(|error| Error::MessageDecodeError(dpid, error))?;
    let b64msg = b64::encode(&msg.data);

    // Match with controller instrumentation lines read so far. This runs
    // before the handle event is allocated so a matched controller pair is
    // emitted with smaller event ids than the handle that consumes it.
    let matched =
        match controller::match_unmatched_msgout(logger, mid_in, dpid, &b64msg)
        {
            Ok(matched) => matched,
            Err(error) => {
                error.log();
                false
            }
        };
    if !matched {
        logger
            .controller
            .unmatched_msg_handle
            .entry(dpid)
            .or_default()
            .push((mid_in, b64msg));
    }

    let event = MessageHandle::new(
        logger.next_eid(),
        dpid,
        controller_id,
        mid_in,
        msg_type,
        msg.data,
        flow_mod,
    );
    logger.start_switch_event(dpid, HbEvent::MessageHandle(event))
}

fn process_message_send(
    logger: &mut HappensBeforeLogger,
    dpid: Dpid,
    controller_id: Option<u64>,
    msg: TracedMessage,
) -> Result<(), Error> {
    // The tag changes here: the outgoing message is a fresh lineage.
    let mid_in = logger.mids.new_tag(msg.obj);
    let mid_out = logger.mids.new_tag(msg.obj);

    // The message goes to the controller, where it cannot be matched by
    // identity anymore.
    logger.mids.remove_obj(msg.obj);

    let msg_type = openflow::message_type(&msg.data)
        .map_err(|error| Error::MessageDecodeError(dpid, error))?;
    let b64msg = b64::encode(&msg.data);

    let event = MessageSend::new(
        logger.next_eid(),
        dpid,
        controller_id,
        mid_in,
        mid_out,
        msg_type,
        msg.data,
    );
    logger.add_successor_to_switch_event(
        dpid,
        HbEvent::MessageSend(event),
        Some(mid_in),
        None,
    )?;

    // Record the outbound message for controller instrumentation. The send
    // is always observed here before the controller can print a line about
    // it, so nothing needs checking.
    logger
        .controller
        .unmatched_msg_send
        .entry(dpid)
        .or_default()
        .push((mid_out, b64msg));
    Ok(())
}

fn process_packet_send(
    logger: &mut HappensBeforeLogger,
    dpid: Dpid,
    packet: TracedPacket,
    out_port: u16,
) -> Result<(), Error> {
    // The tag changes here.
    let pid_in = logger.pids.new_tag(packet.obj);
    let pid_out = logger.pids.new_tag(packet.obj);

    let event = PacketSend::new(
        logger.next_eid(),
        dpid,
        pid_in,
        pid_out,
        packet.data,
        out_port,
    );
    logger.add_successor_to_switch_event(
        dpid,
        HbEvent::PacketSend(event),
        None,
        Some(pid_in),
    )
}

// ===== switch buffer operations =====

fn process_buffer_put(
    logger: &mut HappensBeforeLogger,
    dpid: Dpid,
    packet: TracedPacket,
    in_port: u16,
    buffer_id: u32,
) -> Result<(), Error> {
    if let Some(started) = logger.started_switch_event.get_mut(&dpid) {
        match started {
            HbEvent::PacketHandle(handle) => {
                // The tag should still be the one the handle started with,
                // as no successor has re-tagged the packet yet.
                if logger.pids.get_tag(packet.obj) != handle.pid_in {
                    warn!(
                        %dpid,
                        "buffered packet tag does not match the handle input"
                    );
                }
                // Generate a pid_out for the buffer write; the later buffer
                // get picks it up as its pid_in.
                let pid_out = logger.pids.new_tag(packet.obj);
                handle.pid_out.push(pid_out);
            }
            _ => {
                warn!(
                    %dpid,
                    kind = started.kind_name(),
                    "buffer put outside a packet handle"
                );
            }
        }
    }

    let operation = BufferPut::new(
        logger.next_eid(),
        Utc::now(),
        packet.data,
        in_port,
        buffer_id,
    );
    logger.add_operation_to_switch_event(dpid, Operation::BufferPut(operation));
    Ok(())
}

fn process_buffer_get(
    logger: &mut HappensBeforeLogger,
    dpid: Dpid,
    packet: TracedPacket,
    in_port: u16,
    buffer_id: u32,
) -> Result<(), Error> {
    if let Some(started) = logger.started_switch_event.get_mut(&dpid) {
        match started {
            HbEvent::MessageHandle(handle) => {
                // Update the pid_in of the current event using the packet
                // from the buffer.
                handle.pid_in = Some(logger.pids.get_tag(packet.obj));
            }
            _ => {
                warn!(
                    %dpid,
                    kind = started.kind_name(),
                    "buffer get outside a message handle"
                );
            }
        }
    }

    let operation = BufferGet::new(
        logger.next_eid(),
        Utc::now(),
        packet.data,
        in_port,
        buffer_id,
    );
    logger.add_operation_to_switch_event(dpid, Operation::BufferGet(operation));
    Ok(())
}

// ===== host events =====

fn process_host_packet_handle_begin(
    logger: &mut HappensBeforeLogger,
    hid: HostId,
    packet: TracedPacket,
    in_port: u16,
) -> Result<(), Error> {
    let pid_in = logger.pids.get_tag(packet.obj);

    let event =
        HostHandle::new(logger.next_eid(), hid, pid_in, packet.data, in_port);
    logger.start_host_event(hid, HbEvent::HostHandle(event))
}

fn process_host_packet_send(
    logger: &mut HappensBeforeLogger,
    hid: HostId,
    packet: TracedPacket,
    out_port: u16,
) -> Result<(), Error> {
    // The tag changes here.
    let pid_in = logger.pids.new_tag(packet.obj);
    let pid_out = logger.pids.new_tag(packet.obj);

    let event = HostSend::new(
        logger.next_eid(),
        hid,
        pid_in,
        pid_out,
        packet.data,
        out_port,
    );
    logger.add_successor_to_host_event(hid, HbEvent::HostSend(event), Some(pid_in))
}
