//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use sdnrace_trace::hb::{FlowTableRead, FlowTableWrite, HbEvent};
use sdnrace_utils::openflow::{FlowModCommand, FlowModFlags};

// Commutativity oracle over pairs of flow-table operations.
//
// Two operations commute when their composed effect on the flow table and
// on subsequent reads is identical under either order. The oracle is a
// pure function over the two operations' data; the embedding system can
// substitute richer OpenFlow semantics through this trait.
pub trait CommutativityChecker {
    fn commutes_ww(
        &self,
        i_event: &HbEvent,
        i_op: &FlowTableWrite,
        k_event: &HbEvent,
        k_op: &FlowTableWrite,
    ) -> bool;

    fn commutes_rw(
        &self,
        r_event: &HbEvent,
        r_op: &FlowTableRead,
        w_event: &HbEvent,
        w_op: &FlowTableWrite,
    ) -> bool;
}

// Default oracle over flow-mod matches, priorities, cookies and overlap
// flags. Deliberately conservative: uncertainty is reported as
// non-commuting.
#[derive(Debug, Default)]
pub struct FlowModCommutativity;

// ===== impl FlowModCommutativity =====

impl CommutativityChecker for FlowModCommutativity {
    fn commutes_ww(
        &self,
        _i_event: &HbEvent,
        i_op: &FlowTableWrite,
        _k_event: &HbEvent,
        k_op: &FlowTableWrite,
    ) -> bool {
        let a = &i_op.flow_mod;
        let b = &k_op.flow_mod;

        // Writes on disjoint match regions cannot affect the same entries
        // or the same packets.
        if !a.match_.overlaps(&b.match_) {
            return true;
        }

        // Overlap checking makes insertion order observable: whichever add
        // runs second fails.
        if a.flags.contains(FlowModFlags::CHECK_OVERLAP)
            || b.flags.contains(FlowModFlags::CHECK_OVERLAP)
        {
            return false;
        }

        use FlowModCommand::*;
        match (a.command, b.command) {
            // Identical additions replace each other with the same entry.
            // Any other overlapping pair leaves the insertion order
            // observable, either through the final table contents or
            // through lookups on the overlap region.
            (Add, Add) => {
                a.match_ == b.match_
                    && a.priority == b.priority
                    && a.actions == b.actions
                    && a.cookie == b.cookie
            }
            // Removals compose to the same table in either order.
            (Delete | DeleteStrict, Delete | DeleteStrict) => true,
            _ => false,
        }
    }

    fn commutes_rw(
        &self,
        _r_event: &HbEvent,
        r_op: &FlowTableRead,
        _w_event: &HbEvent,
        w_op: &FlowTableWrite,
    ) -> bool {
        let write = &w_op.flow_mod;
        let matched = &r_op.flow_mod;

        // A write on a disjoint match region can neither modify the entry
        // the read matched nor install one capturing its packets.
        if !write.match_.overlaps(&matched.match_) {
            return true;
        }

        // A lower-priority add or strict modification loses the lookup to
        // the matched entry, and its strict (match, priority) region
        // cannot be the matched entry itself. Non-strict deletes and
        // modifies ignore priority and may still remove or rewrite the
        // entry.
        use FlowModCommand::*;
        matches!(write.command, Add | ModifyStrict | DeleteStrict)
            && write.priority < matched.priority
    }
}
