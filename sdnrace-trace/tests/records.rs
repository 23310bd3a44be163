//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::path::PathBuf;

use bytes::Bytes;
use chrono::Utc;
use sdnrace_trace::hb::{
    FlowTableWrite, HbEvent, MessageHandle, Operation, PacketHandle,
};
use sdnrace_trace::writer::{self, TraceWriter};
use sdnrace_utils::ids::{Dpid, EventId, MessageTag, PacketTag};
use sdnrace_utils::openflow::{
    FlowMod, FlowModCommand, FlowModFlags, FlowTable, Match, OfpType,
    Wildcards,
};

//
// Helper functions.
//

fn test_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir()
        .join(format!("sdnrace-trace-{}-{}", std::process::id(), name));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn flow_mod() -> FlowMod {
    FlowMod::new(
        Match {
            wildcards: Wildcards::wildcard_all()
                .difference(Wildcards::NW_DST_MASK),
            nw_dst: Ipv4Addr::new(10, 0, 0, 1),
            ..Default::default()
        },
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

fn message_handle() -> HbEvent {
    let flow_mod = flow_mod();
    let mut event = MessageHandle::new(
        EventId(3),
        Dpid(1),
        None,
        MessageTag(7),
        OfpType::FlowMod,
        Bytes::from(flow_mod.encode().to_vec()),
        Some(flow_mod.clone()),
    );
    event.operations.push(Operation::FlowTableWrite(FlowTableWrite::new(
        EventId(4),
        Utc::now(),
        FlowTable { flows: vec![] },
        flow_mod,
    )));
    HbEvent::MessageHandle(event)
}

//
// Tests.
//

#[test]
fn test_record_type_tag() {
    let event = HbEvent::PacketHandle(PacketHandle::new(
        EventId(1),
        Dpid(1),
        PacketTag(2),
        Bytes::from_static(b"\x01\x02\x03"),
        1,
    ));

    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["type"], "HbPacketHandle");
    assert_eq!(value["eid"], 1);
    // Binary fields are base64-encoded.
    assert_eq!(value["packet"], "AQID");
}

#[test]
fn test_record_roundtrip() {
    let event = message_handle();

    let line = serde_json::to_string(&event).unwrap();
    let parsed: HbEvent = serde_json::from_str(&line).unwrap();
    assert_eq!(event, parsed);

    // The nested operation keeps its own type tag.
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["type"], "HbMessageHandle");
    assert_eq!(value["operations"][0]["type"], "FlowTableWrite");
}

#[test]
fn test_writer_roundtrip() {
    let dir = test_dir("writer");
    let mut writer = TraceWriter::create(&dir, "hb.json").unwrap();

    let events = vec![
        HbEvent::PacketHandle(PacketHandle::new(
            EventId(1),
            Dpid(1),
            PacketTag(2),
            Bytes::from_static(b"pkt"),
            1,
        )),
        message_handle(),
    ];
    for event in &events {
        writer.write_event(event).unwrap();
    }

    let read_back = writer::read_events(writer.path()).unwrap();
    assert_eq!(events, read_back);
}

#[test]
fn test_reader_skips_bad_lines() {
    let dir = test_dir("reader");
    let path = dir.join("hb.json");
    let event = message_handle();
    let line = serde_json::to_string(&event).unwrap();
    std::fs::write(&path, format!("{line}\nnot json\n")).unwrap();

    let read_back = writer::read_events(&path).unwrap();
    assert_eq!(read_back, vec![event]);
}
