//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use sdnrace_utils::ids::{ObjectId, PacketTag};
use sdnrace_utils::registry::ObjectRegistry;

#[test]
fn test_get_tag_is_stable() {
    let mut registry = ObjectRegistry::<PacketTag>::new();

    let tag = registry.get_tag(ObjectId(1));
    assert_eq!(registry.get_tag(ObjectId(1)), tag);
    assert_ne!(registry.get_tag(ObjectId(2)), tag);
}

#[test]
fn test_new_tag_breaks_lineage() {
    let mut registry = ObjectRegistry::<PacketTag>::new();

    let old = registry.get_tag(ObjectId(1));
    let new = registry.new_tag(ObjectId(1));
    assert_ne!(old, new);
    assert_eq!(registry.get_tag(ObjectId(1)), new);

    // Old tags are never reused.
    assert_ne!(registry.new_tag(ObjectId(2)), old);
}

#[test]
fn test_replace_obj_preserves_tag() {
    let mut registry = ObjectRegistry::<PacketTag>::new();

    let tag = registry.get_tag(ObjectId(1));
    assert!(registry.replace_obj(tag, ObjectId(9)));
    assert_eq!(registry.get_tag(ObjectId(9)), tag);

    // The old identity no longer holds the tag.
    assert_ne!(registry.get_tag(ObjectId(1)), tag);
}

#[test]
fn test_replace_obj_unknown_tag() {
    let mut registry = ObjectRegistry::<PacketTag>::new();
    assert!(!registry.replace_obj(PacketTag(42), ObjectId(1)));
}

#[test]
fn test_remove_obj() {
    let mut registry = ObjectRegistry::<PacketTag>::new();

    let tag = registry.get_tag(ObjectId(1));
    registry.remove_obj(ObjectId(1));
    assert_ne!(registry.get_tag(ObjectId(1)), tag);
}

#[test]
fn test_generate_unused_tag() {
    let mut registry = ObjectRegistry::<PacketTag>::new();

    let bound = registry.get_tag(ObjectId(1));
    let unused = registry.generate_unused_tag();
    assert_ne!(bound, unused);

    // The unused tag is bound to no object.
    assert!(!registry.replace_obj(unused, ObjectId(2)));
    assert_ne!(registry.get_tag(ObjectId(2)), unused);
}
