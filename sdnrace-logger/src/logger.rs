//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::HashMap;
use std::path::PathBuf;

use sdnrace_graph::HappensBeforeGraph;
use sdnrace_trace::hb::{HbEvent, Operation};
use sdnrace_trace::writer::{DEFAULT_TRACE_FILENAME, TraceWriter};
use sdnrace_utils::ids::{
    Dpid, EventId, EventIdAllocator, HostId, MessageTag, PacketTag,
};
use sdnrace_utils::registry::ObjectRegistry;
use serde::Deserialize;
use tracing::{info, warn};

use crate::controller::ControllerState;
use crate::debug::Debug;
use crate::error::{Error, IoError};

// Logger configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub results_dir: PathBuf,
    #[serde(default = "default_output_filename")]
    pub output_filename: String,
}

// Assembles logical happens-before events out of the simulator trace.
//
// Per switch there is at most one started handle event plus a FIFO of
// pending successor events emitted after the handle's end; hosts are
// symmetric. All state is mutated from a single task.
#[derive(Debug)]
pub struct HappensBeforeLogger {
    // Object registries (packet obj -> pid, message obj -> mid).
    pub(crate) pids: ObjectRegistry<PacketTag>,
    pub(crate) mids: ObjectRegistry<MessageTag>,
    // Event id allocator.
    pub(crate) eids: EventIdAllocator,
    // State for linking of events.
    pub(crate) started_switch_event: HashMap<Dpid, HbEvent>,
    pub(crate) started_host_event: HashMap<HostId, HbEvent>,
    pub(crate) new_switch_events: HashMap<Dpid, Vec<HbEvent>>,
    pub(crate) new_host_events: HashMap<HostId, Vec<HbEvent>>,
    pub(crate) pending_packet_update: HashMap<Dpid, PacketTag>,
    // State for linking of controller events.
    pub(crate) controller: ControllerState,
    // Trace output.
    writer: Option<TraceWriter>,
    pub graph: HappensBeforeGraph,
}

// ===== impl Config =====

impl Config {
    pub fn new(results_dir: impl Into<PathBuf>) -> Config {
        Config {
            results_dir: results_dir.into(),
            output_filename: default_output_filename(),
        }
    }
}

// ===== impl HappensBeforeLogger =====

impl HappensBeforeLogger {
    pub fn new() -> HappensBeforeLogger {
        HappensBeforeLogger {
            pids: ObjectRegistry::new(),
            mids: ObjectRegistry::new(),
            eids: EventIdAllocator::new(),
            started_switch_event: HashMap::new(),
            started_host_event: HashMap::new(),
            new_switch_events: HashMap::new(),
            new_host_events: HashMap::new(),
            pending_packet_update: HashMap::new(),
            controller: ControllerState::default(),
            writer: None,
            graph: HappensBeforeGraph::new(),
        }
    }

    // Starts a trace.
    pub fn open(&mut self, config: &Config) -> Result<(), Error> {
        let writer =
            TraceWriter::create(&config.results_dir, &config.output_filename)
                .map_err(IoError::TraceFileOpen)?;
        self.writer = Some(writer);
        self.graph = HappensBeforeGraph::new();
        Ok(())
    }

    // Ends a trace.
    pub fn close(&mut self) {
        self.writer = None;
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    // Flushes open handles and queued successors best-effort, discards
    // buffered unmatched controller lines and closes the trace file.
    pub fn shutdown(&mut self) {
        let dpids = self.started_switch_event.keys().copied().collect::<Vec<_>>();
        for dpid in dpids {
            warn!(%dpid, "switch handle still open at shutdown");
            if let Err(error) = self.finish_switch_event(dpid) {
                error.log();
            }
        }
        let hids = self.started_host_event.keys().copied().collect::<Vec<_>>();
        for hid in hids {
            warn!(%hid, "host handle still open at shutdown");
            if let Err(error) = self.finish_host_event(hid) {
                error.log();
            }
        }

        let unmatched = self.controller.unmatched_msgout_lines.len();
        if unmatched > 0 {
            warn!(
                count = unmatched,
                "discarding unmatched controller MessageOut lines"
            );
            self.controller.unmatched_msgout_lines.clear();
        }

        self.close();
    }

    pub(crate) fn next_eid(&mut self) -> EventId {
        self.eids.next_eid()
    }

    // Emits one event: appends it to the trace file and inserts it into the
    // happens-before graph.
    pub(crate) fn write_event(&mut self, event: HbEvent) -> Result<(), Error> {
        Debug::EventEmitted(&event).log();
        let Some(writer) = &mut self.writer else {
            return Err(Error::TraceNotOpen);
        };
        writer.write_event(&event).map_err(IoError::TraceFileWrite)?;
        self.graph.add_event(event);
        Ok(())
    }

    //
    // Switch helper functions.
    //

    pub(crate) fn start_switch_event(
        &mut self,
        dpid: Dpid,
        event: HbEvent,
    ) -> Result<(), Error> {
        // Flush successors queued while no handle was active.
        if let Some(pending) = self.new_switch_events.remove(&dpid) {
            for event in pending {
                self.write_event(event)?;
            }
        }

        // A still-started handle means the trace lost an end event; emit
        // the stale handle best-effort and carry on.
        if let Some(stale) = self.started_switch_event.remove(&dpid) {
            warn!(%dpid, "switch handle begin while another is started");
            self.write_event(stale)?;
        }

        self.started_switch_event.insert(dpid, event);
        Ok(())
    }

    pub(crate) fn finish_switch_event(
        &mut self,
        dpid: Dpid,
    ) -> Result<(), Error> {
        let Some(event) = self.started_switch_event.remove(&dpid) else {
            return Err(Error::HandleEndWithoutBegin(dpid));
        };

        self.write_event(event)?;
        if let Some(pending) = self.new_switch_events.remove(&dpid) {
            for event in pending {
                self.write_event(event)?;
            }
        }
        Ok(())
    }

    pub(crate) fn is_switch_event_started(&self, dpid: Dpid) -> bool {
        self.started_switch_event.contains_key(&dpid)
    }

    pub(crate) fn add_operation_to_switch_event(
        &mut self,
        dpid: Dpid,
        operation: Operation,
    ) {
        match self.started_switch_event.get_mut(&dpid) {
            Some(event) => match event.operations_mut() {
                Some(operations) => operations.push(operation),
                None => {
                    warn!(
                        %dpid,
                        kind = event.kind_name(),
                        "handle kind cannot carry operations; ignoring"
                    );
                }
            },
            None => {
                // Ignore this operation, as there is no started switch
                // event yet.
                info!(
                    %dpid,
                    "ignoring switch operation without an associated begin event"
                );
            }
        }
    }

    // Enqueues a successor event behind the started handle, linking the
    // successor's input tags into the handle's output tags. Without a
    // started handle the successor is emitted directly.
    pub(crate) fn add_successor_to_switch_event(
        &mut self,
        dpid: Dpid,
        event: HbEvent,
        mid_in: Option<MessageTag>,
        pid_in: Option<PacketTag>,
    ) -> Result<(), Error> {
        match self.started_switch_event.get_mut(&dpid) {
            Some(started) => {
                if let Some(tag) = mid_in
                    && !started.push_mid_out(tag)
                {
                    warn!(
                        %dpid,
                        kind = started.kind_name(),
                        "handle kind cannot produce messages"
                    );
                }
                if let Some(tag) = pid_in
                    && !started.push_pid_out(tag)
                {
                    warn!(
                        %dpid,
                        kind = started.kind_name(),
                        "handle kind cannot produce packets"
                    );
                }
                self.new_switch_events.entry(dpid).or_default().push(event);
                Ok(())
            }
            None => {
                // Output the event directly as we missed the preceding
                // begin event.
                info!(
                    %dpid,
                    "writing switch event without an associated begin event"
                );
                self.write_event(event)
            }
        }
    }

    //
    // Host helper functions.
    //

    pub(crate) fn start_host_event(
        &mut self,
        hid: HostId,
        event: HbEvent,
    ) -> Result<(), Error> {
        if let Some(pending) = self.new_host_events.remove(&hid) {
            for event in pending {
                self.write_event(event)?;
            }
        }

        if let Some(stale) = self.started_host_event.remove(&hid) {
            warn!(%hid, "host handle begin while another is started");
            self.write_event(stale)?;
        }

        self.started_host_event.insert(hid, event);
        Ok(())
    }

    pub(crate) fn finish_host_event(&mut self, hid: HostId) -> Result<(), Error> {
        let Some(event) = self.started_host_event.remove(&hid) else {
            return Err(Error::HostHandleEndWithoutBegin(hid));
        };

        self.write_event(event)?;
        if let Some(pending) = self.new_host_events.remove(&hid) {
            for event in pending {
                self.write_event(event)?;
            }
        }
        Ok(())
    }

    pub(crate) fn add_successor_to_host_event(
        &mut self,
        hid: HostId,
        event: HbEvent,
        pid_in: Option<PacketTag>,
    ) -> Result<(), Error> {
        match self.started_host_event.get_mut(&hid) {
            Some(started) => {
                if let Some(tag) = pid_in
                    && !started.push_pid_out(tag)
                {
                    warn!(
                        %hid,
                        kind = started.kind_name(),
                        "handle kind cannot produce packets"
                    );
                }
                self.new_host_events.entry(hid).or_default().push(event);
                Ok(())
            }
            None => {
                info!(
                    %hid,
                    "writing host event without an associated begin event"
                );
                self.write_event(event)
            }
        }
    }
}

impl Default for HappensBeforeLogger {
    fn default() -> HappensBeforeLogger {
        HappensBeforeLogger::new()
    }
}

// ===== helper functions =====

fn default_output_filename() -> String {
    DEFAULT_TRACE_FILENAME.to_owned()
}
