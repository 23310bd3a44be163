//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use sdnrace_trace::hb::HbEvent;
use sdnrace_utils::ids::{EventId, MessageTag, PacketTag};
use tracing::warn;

// Relation carried by a graph edge. Race detection considers only `Hb`
// edges; the other relations are advisory and kept for visualisation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EdgeRel {
    Hb,
    Time,
    DepRaw,
    Race,
}

// The persisted happens-before DAG over logical events.
//
// Nodes are HB events keyed by `eid`. Insertion links a new event backward
// to existing events whose output tags match its input tags, and forward to
// existing events whose input tags match its output tags; the forward
// direction is needed because controller handle/send pairs may be emitted
// after the `HbMessageHandle` they precede.
#[derive(Debug, Default)]
pub struct HappensBeforeGraph {
    events: BTreeMap<EventId, HbEvent>,
    succs: HashMap<EventId, Vec<(EventId, EdgeRel)>>,
    preds: HashMap<EventId, Vec<(EventId, EdgeRel)>>,
    pid_in_index: HashMap<PacketTag, Vec<EventId>>,
    pid_out_index: HashMap<PacketTag, Vec<EventId>>,
    mid_in_index: HashMap<MessageTag, Vec<EventId>>,
    mid_out_index: HashMap<MessageTag, Vec<EventId>>,
    predecessor_violations: u64,
}

// Closed set of valid predecessor kinds per event kind. Any other
// predecessor indicates a trace bug.
fn valid_predecessor(pred: &HbEvent, succ: &HbEvent) -> bool {
    use HbEvent::*;

    match succ {
        AsyncFlowExpiry(_) => matches!(pred, MessageSend(_)),
        PacketHandle(_) => matches!(pred, PacketSend(_) | HostSend(_)),
        PacketSend(_) => matches!(pred, PacketHandle(_) | MessageHandle(_)),
        MessageHandle(_) => matches!(
            pred,
            MessageHandle(_)
                | ControllerSend(_)
                | PacketHandle(_)
                | MessageSend(_)
        ),
        MessageSend(_) => matches!(
            pred,
            AsyncFlowExpiry(_) | PacketHandle(_) | MessageHandle(_)
        ),
        HostHandle(_) => matches!(pred, PacketSend(_)),
        HostSend(_) => matches!(pred, HostHandle(_)),
        ControllerHandle(_) => matches!(pred, MessageSend(_)),
        ControllerSend(_) => matches!(pred, ControllerHandle(_)),
    }
}

// ===== impl HappensBeforeGraph =====

impl HappensBeforeGraph {
    pub fn new() -> HappensBeforeGraph {
        HappensBeforeGraph::default()
    }

    // Parses one trace line and inserts the event.
    pub fn add_line(&mut self, line: &str) -> Result<(), serde_json::Error> {
        let event = serde_json::from_str(line)?;
        self.add_event(event);
        Ok(())
    }

    // Inserts an event, deriving its happens-before edges from the tag
    // indices. The event must be fully assembled (immutable from here on).
    pub fn add_event(&mut self, event: HbEvent) {
        let eid = event.eid();

        // Backward links: existing producers of our input tags.
        let mut pred_eids = vec![];
        if let Some(tag) = event.pid_in() {
            if let Some(eids) = self.pid_out_index.get(&tag) {
                pred_eids.extend(eids.iter().copied());
            }
        }
        if let Some(tag) = event.mid_in() {
            if let Some(eids) = self.mid_out_index.get(&tag) {
                pred_eids.extend(eids.iter().copied());
            }
        }

        // Forward links: existing consumers of our output tags.
        let mut succ_eids = vec![];
        for tag in event.pid_out() {
            if let Some(eids) = self.pid_in_index.get(tag) {
                succ_eids.extend(eids.iter().copied());
            }
        }
        for tag in event.mid_out() {
            if let Some(eids) = self.mid_in_index.get(tag) {
                succ_eids.extend(eids.iter().copied());
            }
        }

        // Index the event's tags.
        if let Some(tag) = event.pid_in() {
            self.pid_in_index.entry(tag).or_default().push(eid);
        }
        if let Some(tag) = event.mid_in() {
            self.mid_in_index.entry(tag).or_default().push(eid);
        }
        for tag in event.pid_out() {
            self.pid_out_index.entry(*tag).or_default().push(eid);
        }
        for tag in event.mid_out() {
            self.mid_out_index.entry(*tag).or_default().push(eid);
        }

        self.events.insert(eid, event);

        for pred in pred_eids {
            self.add_edge(pred, eid, EdgeRel::Hb);
        }
        for succ in succ_eids {
            self.add_edge(eid, succ, EdgeRel::Hb);
        }
    }

    // Adds a directed edge. Happens-before edges are checked against the
    // predecessor whitelist; a violation is logged and counted, but the
    // edge is still added so detection can proceed on a best-effort graph.
    pub fn add_edge(&mut self, from: EventId, to: EventId, rel: EdgeRel) {
        if from == to {
            return;
        }

        if rel == EdgeRel::Hb
            && let (Some(pred), Some(succ)) =
                (self.events.get(&from), self.events.get(&to))
            && !valid_predecessor(pred, succ)
        {
            self.predecessor_violations += 1;
            warn!(
                pred = pred.kind_name(),
                succ = succ.kind_name(),
                %from,
                %to,
                "invalid predecessor kind"
            );
        }

        self.succs.entry(from).or_default().push((to, rel));
        self.preds.entry(to).or_default().push((from, rel));
    }

    pub fn event(&self, eid: EventId) -> Option<&HbEvent> {
        self.events.get(&eid)
    }

    pub fn events(&self) -> impl Iterator<Item = &HbEvent> {
        self.events.values()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn predecessor_violations(&self) -> u64 {
        self.predecessor_violations
    }

    // Whether a directed path of happens-before edges leads from `from` to
    // `to`. An event trivially reaches itself.
    pub fn reachable(&self, from: EventId, to: EventId) -> bool {
        if from == to {
            return self.events.contains_key(&from);
        }

        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::from([from]);
        while let Some(eid) = queue.pop_front() {
            if !visited.insert(eid) {
                continue;
            }
            if let Some(succs) = self.succs.get(&eid) {
                for (succ, rel) in succs {
                    if *rel != EdgeRel::Hb {
                        continue;
                    }
                    if *succ == to {
                        return true;
                    }
                    queue.push_back(*succ);
                }
            }
        }

        false
    }

    // Whether the happens-before relation orders the two events either way.
    // Both directions need checking because controller instrumentation can
    // emit edges against emission order.
    pub fn ordered(&self, a: EventId, b: EventId) -> bool {
        self.reachable(a, b) || self.reachable(b, a)
    }

    // All events with a happens-before path to `eid`, inclusive of `eid`
    // itself.
    pub fn ancestors(&self, eid: EventId) -> BTreeSet<EventId> {
        let mut ancestors = BTreeSet::new();
        let mut queue = VecDeque::from([eid]);
        while let Some(eid) = queue.pop_front() {
            if !ancestors.insert(eid) {
                continue;
            }
            if let Some(preds) = self.preds.get(&eid) {
                queue.extend(
                    preds
                        .iter()
                        .filter(|(_, rel)| *rel == EdgeRel::Hb)
                        .map(|(pred, _)| *pred),
                );
            }
        }

        ancestors
    }

    // Whether the two events share some ancestor (or one is an ancestor of
    // the other).
    pub fn has_common_ancestor(&self, a: EventId, b: EventId) -> bool {
        let ancestors_a = self.ancestors(a);
        let ancestors_b = self.ancestors(b);
        !ancestors_a.is_disjoint(&ancestors_b)
    }
}
