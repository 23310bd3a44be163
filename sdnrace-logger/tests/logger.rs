//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::path::PathBuf;

use bytes::Bytes;
use sdnrace_logger::controller::{self, ControllerLine};
use sdnrace_logger::events::process_trace_event;
use sdnrace_logger::logger::{Config, HappensBeforeLogger};
use sdnrace_trace::b64;
use sdnrace_trace::events::{TraceEvent, TracedMessage, TracedPacket};
use sdnrace_trace::hb::HbEvent;
use sdnrace_trace::writer;
use sdnrace_utils::ids::{Dpid, EventId, HostId, ObjectId, SwitchId};
use sdnrace_utils::openflow::{
    FlowMod, FlowModCommand, FlowModFlags, FlowTable, Match,
};

//
// Helper functions.
//

struct TestLogger {
    logger: HappensBeforeLogger,
    trace_path: PathBuf,
}

fn open_logger(name: &str) -> TestLogger {
    let dir = std::env::temp_dir()
        .join(format!("sdnrace-logger-{}-{}", std::process::id(), name));
    std::fs::create_dir_all(&dir).unwrap();
    let config = Config::new(&dir);

    let mut logger = HappensBeforeLogger::new();
    logger.open(&config).unwrap();
    TestLogger {
        logger,
        trace_path: dir.join(&config.output_filename),
    }
}

fn process(logger: &mut HappensBeforeLogger, event: TraceEvent) {
    process_trace_event(logger, event).unwrap();
}

fn line(logger: &mut HappensBeforeLogger, text: &str) {
    let line = ControllerLine::parse(text).unwrap();
    controller::process_controller_line(logger, line).unwrap();
}

fn packet(obj: u64) -> TracedPacket {
    TracedPacket::new(ObjectId(obj), Bytes::from_static(b"pkt"))
}

// A minimal OpenFlow message: header plus one marker byte to keep
// payloads distinguishable.
fn ofp_msg(obj: u64, msg_type: u8, marker: u8) -> TracedMessage {
    let data = vec![0x01, msg_type, 0x00, 0x09, 0x00, 0x00, 0x00, 0x00, marker];
    TracedMessage::new(ObjectId(obj), Bytes::from(data))
}

fn flow_mod() -> FlowMod {
    FlowMod::new(
        Match::default(),
        0x2a,
        FlowModCommand::Add,
        0,
        0,
        100,
        0xffff_ffff,
        0xffff,
        FlowModFlags::empty(),
        vec![],
    )
}

fn find_eid<F>(logger: &HappensBeforeLogger, predicate: F) -> EventId
where
    F: Fn(&HbEvent) -> bool,
{
    logger
        .graph
        .events()
        .find(|event| predicate(event))
        .map(|event| event.eid())
        .unwrap()
}

fn count_kind(logger: &HappensBeforeLogger, kind: &str) -> usize {
    logger
        .graph
        .events()
        .filter(|event| event.kind_name() == kind)
        .count()
}

//
// Tests.
//

// Input:
//  * Host 1 sends packet P; switch 1 handles it and sends a PACKET_IN;
//    the controller acknowledges it and replies with a FLOW_MOD, which
//    switch 1 handles with a flow-table write.
// Expected:
//  * Exactly one HbControllerHandle/HbControllerSend pair, emitted as
//    adjacent records, bridging the PACKET_IN send to the FLOW_MOD handle.
#[test]
fn test_packet_in_flow_mod_round_trip() {
    let TestLogger {
        mut logger,
        trace_path,
    } = open_logger("round-trip");
    let hid = HostId(1);
    let dpid = Dpid(1);

    process(&mut logger, TraceEvent::HostPacketHandleBegin {
        hid,
        packet: packet(1),
        in_port: 0,
    });
    process(&mut logger, TraceEvent::HostPacketSend {
        hid,
        packet: packet(1),
        out_port: 1,
    });
    process(&mut logger, TraceEvent::HostPacketHandleEnd { hid });

    process(&mut logger, TraceEvent::PacketHandleBegin {
        dpid,
        packet: packet(1),
        in_port: 1,
    });
    let packet_in = ofp_msg(2, 10, 0xaa);
    let packet_in_b64 = b64::encode(&packet_in.data);
    process(&mut logger, TraceEvent::MessageSend {
        dpid,
        controller_id: None,
        msg: packet_in,
    });
    process(&mut logger, TraceEvent::PacketHandleEnd { dpid });

    let flow_mod = flow_mod();
    let flow_mod_bytes = Bytes::from(flow_mod.encode().to_vec());
    let flow_mod_b64 = b64::encode(&flow_mod_bytes);
    line(
        &mut logger,
        &format!("HappensBefore-MessageIn-[1:{packet_in_b64}]"),
    );
    line(
        &mut logger,
        &format!(
            "HappensBefore-MessageOut-[1:{packet_in_b64}:1:{flow_mod_b64}]"
        ),
    );

    process(&mut logger, TraceEvent::MessageHandleBegin {
        dpid,
        controller_id: None,
        msg: TracedMessage::new(ObjectId(3), flow_mod_bytes),
        flow_mod: Some(flow_mod.clone()),
    });
    process(&mut logger, TraceEvent::FlowTableWrite {
        dpid,
        flow_table: FlowTable::default(),
        flow_mod,
    });
    process(&mut logger, TraceEvent::MessageHandleEnd { dpid });
    logger.shutdown();

    assert_eq!(count_kind(&logger, "HbControllerHandle"), 1);
    assert_eq!(count_kind(&logger, "HbControllerSend"), 1);

    // The pair is adjacent in the trace.
    let ch = find_eid(&logger, |ev| ev.as_controller_handle().is_some());
    let cs = find_eid(&logger, |ev| ev.as_controller_send().is_some());
    assert_eq!(cs.0, ch.0 + 1);

    // Full happens-before chain: host send -> packet handle -> packet-in
    // send -> controller -> flow-mod handle.
    let host_send = find_eid(&logger, |ev| ev.as_host_send().is_some());
    let msg_send = find_eid(&logger, |ev| ev.as_message_send().is_some());
    let msg_handle = find_eid(&logger, |ev| ev.as_message_handle().is_some());
    assert!(logger.graph.reachable(host_send, msg_send));
    assert!(logger.graph.reachable(msg_send, msg_handle));
    assert_eq!(logger.graph.predecessor_violations(), 0);

    // Trace records are emitted with strictly increasing event ids.
    let records = writer::read_events(&trace_path).unwrap();
    let eids = records.iter().map(|ev| ev.eid().0).collect::<Vec<_>>();
    let mut sorted = eids.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(eids, sorted);
}

// Input:
//  * Switch 1 buffers a packet during its packet handle, sends a
//    PACKET_IN, and later handles the controller's PACKET_OUT with a
//    buffer get.
// Expected:
//  * The packet handle carries a fresh pid_out for the buffer write and
//    the message handle picks it up as its pid_in, yielding a graph edge
//    from the packet handle to the message handle.
#[test]
fn test_buffered_packet_in() {
    let TestLogger { mut logger, .. } = open_logger("buffered");
    let dpid = Dpid(1);

    process(&mut logger, TraceEvent::PacketHandleBegin {
        dpid,
        packet: packet(1),
        in_port: 1,
    });
    process(&mut logger, TraceEvent::BufferPut {
        dpid,
        packet: packet(1),
        in_port: 1,
        buffer_id: 42,
    });
    process(&mut logger, TraceEvent::MessageSend {
        dpid,
        controller_id: None,
        msg: ofp_msg(2, 10, 0xaa),
    });
    process(&mut logger, TraceEvent::PacketHandleEnd { dpid });

    process(&mut logger, TraceEvent::MessageHandleBegin {
        dpid,
        controller_id: None,
        msg: ofp_msg(3, 13, 0xbb),
        flow_mod: None,
    });
    process(&mut logger, TraceEvent::BufferGet {
        dpid,
        packet: packet(1),
        in_port: 1,
        buffer_id: 42,
    });
    process(&mut logger, TraceEvent::MessageHandleEnd { dpid });
    logger.shutdown();

    let packet_handle = logger
        .graph
        .events()
        .find_map(|ev| ev.as_packet_handle())
        .unwrap();
    let message_handle = logger
        .graph
        .events()
        .find_map(|ev| ev.as_message_handle())
        .unwrap();

    // The buffer put produced a pid_out, and the buffer get adopted it.
    assert_eq!(packet_handle.pid_out.len(), 1);
    assert_eq!(message_handle.pid_in, Some(packet_handle.pid_out[0]));
    assert!(logger.graph.reachable(packet_handle.eid, message_handle.eid));
    assert_eq!(logger.graph.predecessor_violations(), 0);
}

// Input:
//  * Two switches send distinct PACKET_INs; the first controller line
//    references a switch id never seen before.
// Expected:
//  * The adapter discovers the dpid by scanning the outbound queues,
//    binds swid<->dpid, and subsequent lines resolve through the binding.
#[test]
fn test_unseen_swid_discovery() {
    let TestLogger { mut logger, .. } = open_logger("swid");

    let msg_a = ofp_msg(1, 10, 0xaa);
    let msg_b = ofp_msg(2, 10, 0xbb);
    let msg_b_b64 = b64::encode(&msg_b.data);
    process(&mut logger, TraceEvent::MessageSend {
        dpid: Dpid(1),
        controller_id: None,
        msg: msg_a,
    });
    process(&mut logger, TraceEvent::MessageSend {
        dpid: Dpid(2),
        controller_id: None,
        msg: msg_b.clone(),
    });

    // Controller names switch 2 as swid 7.
    line(&mut logger, &format!("HappensBefore-MessageIn-[7:{msg_b_b64}]"));

    // The reply is handled by switch 2 before the MessageOut line shows
    // up; the edge resolves through the established binding.
    let reply = ofp_msg(3, 13, 0xcc);
    let reply_b64 = b64::encode(&reply.data);
    process(&mut logger, TraceEvent::MessageHandleBegin {
        dpid: Dpid(2),
        controller_id: None,
        msg: reply,
        flow_mod: None,
    });
    process(&mut logger, TraceEvent::MessageHandleEnd { dpid: Dpid(2) });
    line(
        &mut logger,
        &format!("HappensBefore-MessageOut-[7:{msg_b_b64}:7:{reply_b64}]"),
    );
    logger.shutdown();

    assert_eq!(count_kind(&logger, "HbControllerHandle"), 1);
    let controller_handle = logger
        .graph
        .events()
        .find_map(|ev| ev.as_controller_handle())
        .unwrap();
    let message_send = logger
        .graph
        .events()
        .filter_map(|ev| ev.as_message_send())
        .find(|ev| ev.dpid == Dpid(2))
        .unwrap();
    assert_eq!(controller_handle.mid_in, message_send.mid_out);
}

// A MessageIn line whose message was never sent is a fatal-class trace
// bug and surfaces as an error.
#[test]
fn test_message_in_without_send() {
    let TestLogger { mut logger, .. } = open_logger("msg-in-unmatched");

    let parsed = ControllerLine::parse("HappensBefore-MessageIn-[1:AQID]");
    let parsed = parsed.unwrap();
    assert!(
        controller::process_controller_line(&mut logger, parsed).is_err()
    );
}

// Packet identity changes inside an update bracket keep their tag, so the
// happens-before chain across the bracket stays linked.
#[test]
fn test_packet_update_keeps_tag() {
    let TestLogger { mut logger, .. } = open_logger("update");
    let hid = HostId(1);
    let dpid = Dpid(1);

    process(&mut logger, TraceEvent::HostPacketHandleBegin {
        hid,
        packet: packet(1),
        in_port: 0,
    });
    process(&mut logger, TraceEvent::HostPacketSend {
        hid,
        packet: packet(1),
        out_port: 1,
    });
    process(&mut logger, TraceEvent::HostPacketHandleEnd { hid });

    // The switch rewrites the packet in place; its identity token changes
    // from 1 to 9 while the tag is preserved.
    process(&mut logger, TraceEvent::PacketUpdateBegin {
        dpid,
        packet: packet(1),
    });
    process(&mut logger, TraceEvent::PacketUpdateEnd {
        dpid,
        packet: packet(9),
    });
    process(&mut logger, TraceEvent::PacketHandleBegin {
        dpid,
        packet: packet(9),
        in_port: 1,
    });
    process(&mut logger, TraceEvent::PacketHandleEnd { dpid });
    logger.shutdown();

    let host_send = find_eid(&logger, |ev| ev.as_host_send().is_some());
    let packet_handle =
        find_eid(&logger, |ev| ev.as_packet_handle().is_some());
    assert!(logger.graph.reachable(host_send, packet_handle));
}

// Trace inconsistencies never abort the run: a second begin emits the
// stale handle best-effort, an end without begin reports an error, and
// operations without a handle are skipped.
#[test]
fn test_trace_inconsistencies() {
    let TestLogger { mut logger, .. } = open_logger("inconsistent");
    let dpid = Dpid(1);

    // Operation with no started handle.
    process(&mut logger, TraceEvent::FlowTableWrite {
        dpid,
        flow_table: FlowTable::default(),
        flow_mod: flow_mod(),
    });

    // Second begin while a handle is started.
    process(&mut logger, TraceEvent::PacketHandleBegin {
        dpid,
        packet: packet(1),
        in_port: 1,
    });
    process(&mut logger, TraceEvent::PacketHandleBegin {
        dpid,
        packet: packet(2),
        in_port: 2,
    });
    process(&mut logger, TraceEvent::PacketHandleEnd { dpid });
    assert_eq!(count_kind(&logger, "HbPacketHandle"), 2);

    // End without begin.
    assert!(
        process_trace_event(&mut logger, TraceEvent::PacketHandleEnd {
            dpid
        })
        .is_err()
    );
    logger.shutdown();
}

// The event loop aggregates both input channels onto one task and shuts
// the logger down once they close.
#[tokio::test]
async fn test_event_loop() {
    let TestLogger { logger, .. } = open_logger("event-loop");
    let (trace_tx, trace_rx) = tokio::sync::mpsc::channel(16);
    let (lines_tx, lines_rx) = tokio::sync::mpsc::channel(16);

    let handle =
        tokio::spawn(sdnrace_logger::instance::run(logger, trace_rx, lines_rx));

    trace_tx
        .send(TraceEvent::PacketHandleBegin {
            dpid: Dpid(1),
            packet: packet(1),
            in_port: 1,
        })
        .await
        .unwrap();
    trace_tx
        .send(TraceEvent::PacketHandleEnd { dpid: Dpid(1) })
        .await
        .unwrap();
    drop(trace_tx);
    drop(lines_tx);

    let logger = handle.await.unwrap();
    assert_eq!(count_kind(&logger, "HbPacketHandle"), 1);
    assert!(!logger.is_open());
}

// The reader task filters instrumentation lines out of the controller
// pipe and forwards them parsed.
#[tokio::test]
async fn test_controller_reader_task() {
    let (lines_tx, mut lines_rx) = tokio::sync::mpsc::channel(16);
    let pipe: &'static [u8] =
        b"some unrelated log line\nHappensBefore-MessageIn-[1:AQID]\n";

    let _task = sdnrace_logger::tasks::controller_reader(pipe, &lines_tx);
    drop(lines_tx);

    let parsed = lines_rx.recv().await.unwrap();
    assert_eq!(parsed, ControllerLine::MessageIn {
        swid: SwitchId(1),
        b64msg: "AQID".to_owned(),
    });
    assert!(lines_rx.recv().await.is_none());
}

// Controller line parsing accepts only the two instrumentation tokens
// with well-formed payloads.
#[test]
fn test_controller_line_parse() {
    assert_eq!(
        ControllerLine::parse("prefix HappensBefore-MessageIn-[3:AQID]"),
        Some(ControllerLine::MessageIn {
            swid: SwitchId(3),
            b64msg: "AQID".to_owned(),
        })
    );
    assert_eq!(
        ControllerLine::parse("HappensBefore-MessageOut-[1:aa:2:bb]"),
        Some(ControllerLine::MessageOut {
            in_swid: SwitchId(1),
            in_b64msg: "aa".to_owned(),
            out_swid: SwitchId(2),
            out_b64msg: "bb".to_owned(),
        })
    );
    assert_eq!(ControllerLine::parse("unrelated log line"), None);
    assert_eq!(
        ControllerLine::parse("HappensBefore-MessageIn-[no-brackets"),
        None
    );
    assert_eq!(
        ControllerLine::parse("HappensBefore-MessageIn-[1:2:3]"),
        None
    );
}
