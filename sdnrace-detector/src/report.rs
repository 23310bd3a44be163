//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::io::Write;

use sdnrace_trace::hb::Operation;
use sdnrace_utils::ids::EventId;

use crate::detector::{Race, RaceDetector};

// Writes the race report: one framed block per race with both events'
// ids, both operations' ids and timestamps and the operation detail,
// followed by the operation list and the totals.
pub fn print_races<W: Write>(
    detector: &RaceDetector<'_>,
    out: &mut W,
) -> std::io::Result<()> {
    for race in &detector.races_commute {
        write_race(out, race, true)?;
    }
    for race in &detector.races_harmful {
        write_race(out, race, false)?;
    }

    writeln!(out, "+-------------------------------------------+")?;
    for (eid, _) in detector.read_operations() {
        let kind = event_kind(detector, *eid);
        writeln!(out, "| {eid:>4}: {kind:28} (read) |")?;
    }
    for (eid, _) in detector.write_operations() {
        let kind = event_kind(detector, *eid);
        writeln!(out, "| {eid:>4}: {kind:27} (write) |")?;
    }
    writeln!(out, "| Total operations:      {:<18} |", detector.total_operations)?;
    writeln!(out, "|-------------------------------------------|")?;
    writeln!(out, "| Total commuting races: {:<18} |", detector.total_commute)?;
    writeln!(out, "| Total harmful races:   {:<18} |", detector.total_harmful)?;
    writeln!(out, "| Total filtered races:  {:<18} |", detector.total_filtered)?;
    writeln!(out, "+-------------------------------------------+")
}

// Convenience wrapper writing the report to stdout.
pub fn print_races_stdout(
    detector: &RaceDetector<'_>,
) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    print_races(detector, &mut out)
}

// ===== helper functions =====

fn write_race<W: Write>(
    out: &mut W,
    race: &Race,
    commute: bool,
) -> std::io::Result<()> {
    writeln!(out, "+-------------------------------------------+")?;
    if commute {
        writeln!(
            out,
            "| Commuting ({}):     {:>4} <---> {:>4}      |",
            race.kind, race.i_event, race.k_event
        )?;
    } else {
        writeln!(
            out,
            "| Harmful   ({}):     {:>4} >-!-< {:>4}      |",
            race.kind, race.i_event, race.k_event
        )?;
    }
    writeln!(out, "+-------------------------------------------+")?;
    write_op(out, &race.i_op)?;
    write_op(out, &race.k_op)?;
    Ok(())
}

fn write_op<W: Write>(out: &mut W, op: &Operation) -> std::io::Result<()> {
    let time = op.time().format("%Y-%m-%d %H:%M:%S%.6f").to_string();
    let time = format!("{time:<26}");
    writeln!(out, "| op # {:<8} t={}|", op.eid(), time)?;
    writeln!(out, "+-------------------------------------------+")?;
    writeln!(out, "| {}", op_summary(op))?;
    writeln!(out, "+-------------------------------------------+")
}

fn op_summary(op: &Operation) -> String {
    match op {
        Operation::FlowTableRead(op) => format!(
            "FlowTableRead in_port={} matched priority={} cookie={:#x}",
            op.in_port, op.flow_mod.priority, op.flow_mod.cookie
        ),
        Operation::FlowTableWrite(op) => format!(
            "FlowTableWrite {} priority={} cookie={:#x}",
            op.flow_mod.command, op.flow_mod.priority, op.flow_mod.cookie
        ),
        Operation::FlowTableEntryExpiry(op) => format!(
            "FlowTableEntryExpiry priority={} cookie={:#x}",
            op.removed.priority, op.removed.cookie
        ),
        Operation::BufferPut(op) => {
            format!("BufferPut buffer_id={}", op.buffer_id)
        }
        Operation::BufferGet(op) => {
            format!("BufferGet buffer_id={}", op.buffer_id)
        }
    }
}

fn event_kind(detector: &RaceDetector<'_>, eid: EventId) -> &'static str {
    detector
        .graph()
        .event(eid)
        .map(|event| event.kind_name())
        .unwrap_or("?")
}
