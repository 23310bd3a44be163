//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use serde::{Deserialize, Serialize};

// Switch datapath identifier (simulator-assigned).
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct Dpid(pub u64);

// Controller-assigned switch identifier, distinct from the DPID. The
// correspondence between the two is learned at runtime through the
// controller instrumentation lines.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct SwitchId(pub u64);

// Host identifier (simulator-assigned).
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct HostId(pub u64);

// Monotonic event identifier, assigned at event creation and never reused.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct EventId(pub u64);

// Packet identifier tag, stable per packet lineage.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct PacketTag(pub u64);

// Message identifier tag, stable per OpenFlow message lineage.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct MessageTag(pub u64);

// Opaque object-identity token. The simulator attaches one to every packet
// and message payload it hands over; the Object Registry keys on it instead
// of memory addresses or object contents.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct ObjectId(pub u64);

// Allocator for monotonically increasing event identifiers.
#[derive(Debug, Default)]
pub struct EventIdAllocator {
    next: u64,
}

// ===== impl EventIdAllocator =====

impl EventIdAllocator {
    pub fn new() -> EventIdAllocator {
        EventIdAllocator::default()
    }

    // Returns the next unused event identifier.
    pub fn next_eid(&mut self) -> EventId {
        let eid = EventId(self.next);
        self.next += 1;
        eid
    }
}

// ===== global functions / impls =====

macro_rules! impl_id_display {
    ($($id:ident),+) => {
        $(
            impl std::fmt::Display for $id {
                fn fmt(
                    &self,
                    f: &mut std::fmt::Formatter<'_>,
                ) -> std::fmt::Result {
                    std::fmt::Display::fmt(&self.0, f)
                }
            }

            impl From<u64> for $id {
                fn from(value: u64) -> $id {
                    $id(value)
                }
            }
        )+
    };
}

impl_id_display!(
    Dpid, SwitchId, HostId, EventId, PacketTag, MessageTag, ObjectId
);
