//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;

use derive_new::new;
use itertools::Itertools;
use sdnrace_graph::HappensBeforeGraph;
use sdnrace_trace::hb::{FlowTableRead, FlowTableWrite, Operation};
use sdnrace_utils::ids::EventId;
use serde::Deserialize;
use tracing::info;

use crate::commute::{CommutativityChecker, FlowModCommutativity};

// Race detector configuration.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    // Filter r/w candidate pairs with no common ancestor in the graph.
    pub filter_rw: bool,
    pub verbose: bool,
}

// Race candidate type.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RaceKind {
    WriteWrite,
    ReadWrite,
}

// A pair of flow-table operations whose handles are concurrent on the same
// switch.
#[derive(Clone, Debug, new)]
pub struct Race {
    pub kind: RaceKind,
    pub i_event: EventId,
    pub i_op: Operation,
    pub k_event: EventId,
    pub k_op: Operation,
}

// Enumerates read/write candidate pairs over an immutable happens-before
// graph snapshot and classifies the HB-unordered ones through the
// commutativity oracle.
pub struct RaceDetector<'a> {
    graph: &'a HappensBeforeGraph,
    checker: Box<dyn CommutativityChecker + Send + Sync>,
    config: Config,
    read_operations: Vec<(EventId, FlowTableRead)>,
    write_operations: Vec<(EventId, FlowTableWrite)>,
    pub races_harmful: Vec<Race>,
    pub races_commute: Vec<Race>,
    pub racing_events: BTreeSet<EventId>,
    pub racing_events_harmful: BTreeSet<EventId>,
    pub total_operations: usize,
    pub total_harmful: usize,
    pub total_commute: usize,
    pub total_filtered: usize,
    pub total_races: usize,
}

// ===== impl RaceKind =====

impl std::fmt::Display for RaceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RaceKind::WriteWrite => write!(f, "w/w"),
            RaceKind::ReadWrite => write!(f, "r/w"),
        }
    }
}

// ===== impl RaceDetector =====

impl<'a> RaceDetector<'a> {
    pub fn new(graph: &'a HappensBeforeGraph, config: Config) -> Self {
        Self::with_checker(graph, config, Box::new(FlowModCommutativity))
    }

    pub fn with_checker(
        graph: &'a HappensBeforeGraph,
        config: Config,
        checker: Box<dyn CommutativityChecker + Send + Sync>,
    ) -> Self {
        RaceDetector {
            graph,
            checker,
            config,
            read_operations: vec![],
            write_operations: vec![],
            races_harmful: vec![],
            races_commute: vec![],
            racing_events: BTreeSet::new(),
            racing_events_harmful: BTreeSet::new(),
            total_operations: 0,
            total_harmful: 0,
            total_commute: 0,
            total_filtered: 0,
            total_races: 0,
        }
    }

    pub fn graph(&self) -> &HappensBeforeGraph {
        self.graph
    }

    pub fn read_operations(&self) -> &[(EventId, FlowTableRead)] {
        &self.read_operations
    }

    pub fn write_operations(&self) -> &[(EventId, FlowTableWrite)] {
        &self.write_operations
    }

    // Detects all races that involve `event`, or all races when `event` is
    // `None`. Running twice on the same graph yields identical sets.
    pub fn detect_races(&mut self, event: Option<EventId>) {
        self.collect_operations();

        if self.config.verbose {
            info!(
                writes = self.write_operations.len(),
                reads = self.read_operations.len(),
                "collected flow-table operations"
            );
        }

        self.races_harmful = vec![];
        self.races_commute = vec![];
        self.racing_events = BTreeSet::new();
        self.racing_events_harmful = BTreeSet::new();
        self.total_filtered = 0;

        self.detect_ww_races(event);
        self.detect_rw_races(event);

        self.total_operations =
            self.write_operations.len() + self.read_operations.len();
        self.total_harmful = self.races_harmful.len();
        self.total_commute = self.races_commute.len();
        self.total_races = self.total_harmful + self.total_commute;
    }

    // Extracts read and write operations from the graph's handle events.
    fn collect_operations(&mut self) {
        self.read_operations = vec![];
        self.write_operations = vec![];

        for event in self.graph.events() {
            for operation in event.operations() {
                match operation {
                    Operation::FlowTableWrite(op) => self
                        .write_operations
                        .push((event.eid(), op.clone())),
                    Operation::FlowTableRead(op) => {
                        self.read_operations.push((event.eid(), op.clone()))
                    }
                    _ => (),
                }
            }
        }
    }

    fn detect_ww_races(&mut self, event: Option<EventId>) {
        if self.config.verbose {
            let candidates = ncr2(self.write_operations.len());
            info!(candidates, "processing w/w combinations");
        }

        for (i, k) in
            (0..self.write_operations.len()).tuple_combinations::<(_, _)>()
        {
            let (i_event, i_op) = &self.write_operations[i];
            let (k_event, k_op) = &self.write_operations[k];
            let (i_event, k_event) = (*i_event, *k_event);

            if !self.is_candidate_pair(event, i_event, k_event) {
                continue;
            }

            let (Some(i_ev), Some(k_ev)) =
                (self.graph.event(i_event), self.graph.event(k_event))
            else {
                continue;
            };

            let race = Race::new(
                RaceKind::WriteWrite,
                i_event,
                Operation::FlowTableWrite(i_op.clone()),
                k_event,
                Operation::FlowTableWrite(k_op.clone()),
            );
            if self.checker.commutes_ww(i_ev, i_op, k_ev, k_op) {
                self.races_commute.push(race);
            } else {
                self.races_harmful.push(race);
                self.racing_events_harmful.insert(i_event);
                self.racing_events_harmful.insert(k_event);
            }
            self.racing_events.insert(i_event);
            self.racing_events.insert(k_event);
        }
    }

    fn detect_rw_races(&mut self, event: Option<EventId>) {
        if self.config.verbose {
            let candidates =
                self.read_operations.len() * self.write_operations.len();
            info!(candidates, "processing r/w combinations");
        }

        for i in 0..self.read_operations.len() {
            for k in 0..self.write_operations.len() {
                let (i_event, i_op) = &self.read_operations[i];
                let (k_event, k_op) = &self.write_operations[k];
                let (i_event, k_event) = (*i_event, *k_event);

                if !self.is_candidate_pair(event, i_event, k_event) {
                    continue;
                }

                if self.config.filter_rw
                    && !self.graph.has_common_ancestor(i_event, k_event)
                {
                    self.total_filtered += 1;
                    continue;
                }

                let (Some(i_ev), Some(k_ev)) =
                    (self.graph.event(i_event), self.graph.event(k_event))
                else {
                    continue;
                };

                let race = Race::new(
                    RaceKind::ReadWrite,
                    i_event,
                    Operation::FlowTableRead(i_op.clone()),
                    k_event,
                    Operation::FlowTableWrite(k_op.clone()),
                );
                if self.checker.commutes_rw(i_ev, i_op, k_ev, k_op) {
                    self.races_commute.push(race);
                } else {
                    self.races_harmful.push(race);
                    self.racing_events_harmful.insert(i_event);
                    self.racing_events_harmful.insert(k_event);
                }
                self.racing_events.insert(i_event);
                self.racing_events.insert(k_event);
            }
        }
    }

    // Applies the shared candidate filters: distinct handles, the optional
    // incremental-mode event, per-switch flow tables, and HB-unordered
    // handles.
    fn is_candidate_pair(
        &self,
        event: Option<EventId>,
        i_event: EventId,
        k_event: EventId,
    ) -> bool {
        if i_event == k_event {
            return false;
        }
        if let Some(event) = event
            && event != i_event
            && event != k_event
        {
            return false;
        }

        let i_dpid = self.graph.event(i_event).and_then(|ev| ev.dpid());
        let k_dpid = self.graph.event(k_event).and_then(|ev| ev.dpid());
        if i_dpid.is_none() || i_dpid != k_dpid {
            return false;
        }

        !self.graph.ordered(i_event, k_event)
    }
}

// ===== helper functions =====

fn ncr2(n: usize) -> usize {
    n * n.saturating_sub(1) / 2
}
