//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::HashMap;

use sdnrace_trace::hb::{ControllerHandle, ControllerSend, HbEvent};
use sdnrace_utils::ids::{Dpid, MessageTag, SwitchId};

use crate::debug::Debug;
use crate::error::Error;
use crate::logger::HappensBeforeLogger;

// Tokens the controller prefixes its instrumentation lines with.
pub const MSG_IN_TOKEN: &str = "HappensBefore-MessageIn";
pub const MSG_OUT_TOKEN: &str = "HappensBefore-MessageOut";

// A parsed controller instrumentation line. The payload follows the token
// as `[field:field:...]`, with messages carried as base64 of the raw
// OpenFlow bytes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ControllerLine {
    // The controller received a switch-to-controller message.
    MessageIn {
        swid: SwitchId,
        b64msg: String,
    },
    // The controller replied `out_b64msg` to `out_swid` as a causal
    // consequence of `in_b64msg` received from `in_swid`.
    MessageOut {
        in_swid: SwitchId,
        in_b64msg: String,
        out_swid: SwitchId,
        out_b64msg: String,
    },
}

// Cross-process matching state. Outbound lookups always succeed (the
// switch records every send before the controller can mention it);
// inbound lookups may have to wait for the reply's MessageHandle and are
// retried from `match_unmatched_msgout`.
#[derive(Debug, Default)]
pub struct ControllerState {
    // dpid -> [(mid_out, b64msg)] for sends the controller hasn't named.
    pub(crate) unmatched_msg_send: HashMap<Dpid, Vec<(MessageTag, String)>>,
    // dpid -> [(mid_in, b64msg)] for handles the controller hasn't named.
    pub(crate) unmatched_msg_handle: HashMap<Dpid, Vec<(MessageTag, String)>>,
    // (swid, b64msg) -> mid_out cache filled by MessageIn lines.
    pub(crate) msgin_to_mid_out: HashMap<(SwitchId, String), MessageTag>,
    // MessageOut lines whose inbound side hasn't been observed yet.
    pub(crate) unmatched_msgout_lines: Vec<MsgOutLine>,
    pub(crate) swid_to_dpid: HashMap<SwitchId, Dpid>,
    pub(crate) dpid_to_swid: HashMap<Dpid, SwitchId>,
}

#[derive(Clone, Debug)]
pub(crate) struct MsgOutLine {
    pub in_swid: SwitchId,
    pub in_b64msg: String,
    pub out_swid: SwitchId,
    pub out_b64msg: String,
}

// ===== impl ControllerLine =====

impl ControllerLine {
    // Parses a controller stdout line. Lines without a known token or with
    // a malformed payload yield `None`.
    pub fn parse(line: &str) -> Option<ControllerLine> {
        if let Some(pos) = line.find(MSG_IN_TOKEN) {
            let fields = payload_fields(&line[pos + MSG_IN_TOKEN.len()..])?;
            let [swid, b64msg] = fields.as_slice() else {
                return None;
            };
            let swid = SwitchId(swid.parse().ok()?);
            Some(ControllerLine::MessageIn {
                swid,
                b64msg: (*b64msg).to_owned(),
            })
        } else if let Some(pos) = line.find(MSG_OUT_TOKEN) {
            let fields = payload_fields(&line[pos + MSG_OUT_TOKEN.len()..])?;
            let [in_swid, in_b64msg, out_swid, out_b64msg] = fields.as_slice()
            else {
                return None;
            };
            let in_swid = SwitchId(in_swid.parse().ok()?);
            let out_swid = SwitchId(out_swid.parse().ok()?);
            Some(ControllerLine::MessageOut {
                in_swid,
                in_b64msg: (*in_b64msg).to_owned(),
                out_swid,
                out_b64msg: (*out_b64msg).to_owned(),
            })
        } else {
            None
        }
    }
}

// ===== impl ControllerState =====

impl ControllerState {
    // Resolves the mid_out of the send the controller received as
    // `(swid, b64msg)`. Returns `None` when no unmatched send carries the
    // message, which callers treat as a trace bug.
    pub(crate) fn find_packet_in(
        &mut self,
        swid: SwitchId,
        b64msg: &str,
    ) -> Option<MessageTag> {
        if let Some(&mid_out) =
            self.msgin_to_mid_out.get(&(swid, b64msg.to_owned()))
        {
            return Some(mid_out);
        }

        match self.swid_to_dpid.get(&swid).copied() {
            Some(dpid) => self.take_unmatched_send(dpid, b64msg),
            None => {
                // First time this swid appears: the send of the message
                // must already be recorded under some dpid with no swid
                // binding yet.
                let dpid = self
                    .unmatched_msg_send
                    .iter()
                    .find(|(dpid, queue)| {
                        !self.dpid_to_swid.contains_key(dpid)
                            && queue.iter().any(|(_, b64)| b64 == b64msg)
                    })
                    .map(|(dpid, _)| *dpid)?;
                self.bind(swid, dpid);
                self.take_unmatched_send(dpid, b64msg)
            }
        }
    }

    // Resolves the mid_in of the handle that received the controller reply
    // `(swid, b64msg)`. Returns `None` when the reply hasn't reached the
    // switch yet.
    pub(crate) fn find_packet_out(
        &mut self,
        swid: SwitchId,
        b64msg: &str,
    ) -> Option<MessageTag> {
        match self.swid_to_dpid.get(&swid).copied() {
            Some(dpid) => self.take_unmatched_handle(dpid, b64msg),
            None => {
                let dpid = self
                    .unmatched_msg_handle
                    .iter()
                    .find(|(dpid, queue)| {
                        !self.dpid_to_swid.contains_key(dpid)
                            && queue.iter().any(|(_, b64)| b64 == b64msg)
                    })
                    .map(|(dpid, _)| *dpid)?;
                self.bind(swid, dpid);
                self.take_unmatched_handle(dpid, b64msg)
            }
        }
    }

    fn take_unmatched_send(
        &mut self,
        dpid: Dpid,
        b64msg: &str,
    ) -> Option<MessageTag> {
        let queue = self.unmatched_msg_send.get_mut(&dpid)?;
        let pos = queue.iter().position(|(_, b64)| b64 == b64msg)?;
        Some(queue.remove(pos).0)
    }

    fn take_unmatched_handle(
        &mut self,
        dpid: Dpid,
        b64msg: &str,
    ) -> Option<MessageTag> {
        let queue = self.unmatched_msg_handle.get_mut(&dpid)?;
        let pos = queue.iter().position(|(_, b64)| b64 == b64msg)?;
        Some(queue.remove(pos).0)
    }

    fn bind(&mut self, swid: SwitchId, dpid: Dpid) {
        self.swid_to_dpid.insert(swid, dpid);
        self.dpid_to_swid.insert(dpid, swid);
        Debug::SwidBound(swid, dpid).log();
    }
}

// ===== global functions =====

// Processes one parsed controller instrumentation line.
pub fn process_controller_line(
    logger: &mut HappensBeforeLogger,
    line: ControllerLine,
) -> Result<(), Error> {
    if !logger.is_open() {
        return Ok(());
    }
    Debug::ControllerLineRx(&line).log();

    match line {
        ControllerLine::MessageIn { swid, b64msg } => {
            process_message_in(logger, swid, b64msg)
        }
        ControllerLine::MessageOut {
            in_swid,
            in_b64msg,
            out_swid,
            out_b64msg,
        } => process_message_out(
            logger, in_swid, in_b64msg, out_swid, out_b64msg,
        ),
    }
}

fn process_message_in(
    logger: &mut HappensBeforeLogger,
    swid: SwitchId,
    b64msg: String,
) -> Result<(), Error> {
    match logger.controller.find_packet_in(swid, &b64msg) {
        Some(mid_out) => {
            // Possibly overwrite; only the newest mapping matters.
            logger
                .controller
                .msgin_to_mid_out
                .insert((swid, b64msg), mid_out);
            Ok(())
        }
        None => Err(Error::UnmatchedControllerMsgIn(swid)),
    }
}

fn process_message_out(
    logger: &mut HappensBeforeLogger,
    in_swid: SwitchId,
    in_b64msg: String,
    out_swid: SwitchId,
    out_b64msg: String,
) -> Result<(), Error> {
    let Some(mid_out) = logger.controller.find_packet_in(in_swid, &in_b64msg)
    else {
        return Err(Error::UnmatchedControllerMsgIn(in_swid));
    };

    match logger.controller.find_packet_out(out_swid, &out_b64msg) {
        Some(mid_in) => add_controller_edge(logger, mid_out, mid_in),
        None => {
            // The reply hasn't reached the switch yet; the edge is added
            // when its MessageHandle begins.
            logger.controller.unmatched_msgout_lines.push(MsgOutLine {
                in_swid,
                in_b64msg,
                out_swid,
                out_b64msg,
            });
            Ok(())
        }
    }
}

// Emits the synthetic HbControllerHandle/HbControllerSend pair bridging a
// switch send to the handle of the controller's reply. The two records are
// always adjacent in the trace.
pub(crate) fn add_controller_edge(
    logger: &mut HappensBeforeLogger,
    mid_out: MessageTag,
    mid_in: MessageTag,
) -> Result<(), Error> {
    let temporary_tag = logger.mids.generate_unused_tag();

    let handle =
        ControllerHandle::new(logger.next_eid(), mid_out, temporary_tag);
    logger.write_event(HbEvent::ControllerHandle(handle))?;
    let send = ControllerSend::new(logger.next_eid(), temporary_tag, mid_in);
    logger.write_event(HbEvent::ControllerSend(send))?;

    Debug::ControllerEdge(mid_out, mid_in).log();
    Ok(())
}

// Matches a just-started MessageHandle against MessageOut lines buffered
// before the reply reached the switch. Returns whether an edge was added.
pub(crate) fn match_unmatched_msgout(
    logger: &mut HappensBeforeLogger,
    mid_in: MessageTag,
    dpid: Dpid,
    out_b64msg: &str,
) -> Result<bool, Error> {
    let state = &mut logger.controller;
    let mut swid = state.dpid_to_swid.get(&dpid).copied();
    let mut matched = None;

    if swid.is_none() {
        // No swid binding for this dpid yet; the first buffered line
        // replying with this message determines it.
        if let Some(pos) = state
            .unmatched_msgout_lines
            .iter()
            .position(|line| line.out_b64msg == out_b64msg)
        {
            let line_swid = state.unmatched_msgout_lines[pos].out_swid;
            state.bind(line_swid, dpid);
            swid = Some(line_swid);
            matched = Some(pos);
        }
    }
    if swid.is_some() && matched.is_none() {
        matched = state
            .unmatched_msgout_lines
            .iter()
            .position(|line| line.out_b64msg == out_b64msg);
    }

    let Some(pos) = matched else {
        return Ok(false);
    };
    let line = state.unmatched_msgout_lines.remove(pos);
    let Some(mid_out) = state.find_packet_in(line.in_swid, &line.in_b64msg)
    else {
        return Err(Error::UnmatchedControllerMsgIn(line.in_swid));
    };

    add_controller_edge(logger, mid_out, mid_in)?;
    Ok(true)
}

// ===== helper functions =====

fn payload_fields(rest: &str) -> Option<Vec<&str>> {
    let start = rest.find('[')? + 1;
    let end = rest.find(']')?;
    if end < start {
        return None;
    }
    Some(rest[start..end].split(':').collect())
}
