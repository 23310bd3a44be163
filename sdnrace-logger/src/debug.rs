//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use sdnrace_trace::events::TraceEvent;
use sdnrace_trace::hb::HbEvent;
use sdnrace_utils::ids::{Dpid, MessageTag, SwitchId};
use tracing::{debug, trace};

use crate::controller::ControllerLine;

// Logger debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    TraceEventRx(&'a TraceEvent),
    EventEmitted(&'a HbEvent),
    ControllerLineRx(&'a ControllerLine),
    ControllerEdge(MessageTag, MessageTag),
    SwidBound(SwitchId, Dpid),
}

// ===== impl Debug =====

impl Debug<'_> {
    // Log debug message using the tracing API.
    pub(crate) fn log(&self) {
        match self {
            Debug::TraceEventRx(event) => {
                trace!(?event, "{}", self);
            }
            Debug::EventEmitted(event) => {
                debug!(%event, "{}", self);
            }
            Debug::ControllerLineRx(line) => {
                debug!(?line, "{}", self);
            }
            Debug::ControllerEdge(mid_out, mid_in) => {
                debug!(%mid_out, %mid_in, "{}", self);
            }
            Debug::SwidBound(swid, dpid) => {
                debug!(%swid, %dpid, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::TraceEventRx(..) => {
                write!(f, "trace event")
            }
            Debug::EventEmitted(..) => {
                write!(f, "event emitted")
            }
            Debug::ControllerLineRx(..) => {
                write!(f, "controller line")
            }
            Debug::ControllerEdge(..) => {
                write!(f, "controller edge added")
            }
            Debug::SwidBound(..) => {
                write!(f, "switch id bound to dpid")
            }
        }
    }
}
