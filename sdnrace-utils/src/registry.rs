//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::HashMap;
use std::hash::Hash;

use crate::ids::ObjectId;

// Stable tag allocation for tracked objects.
//
// Packets and messages undergo in-place field mutation between trace events,
// so a tag must stay attached to an object identity for as long as its
// lineage is unbroken. Copies and clones break lineage and are re-tagged
// explicitly. A tag is held by at most one live object, and tags handed out
// by `new_tag` are never reused.
#[derive(Debug)]
pub struct ObjectRegistry<T> {
    next: u64,
    obj_to_tag: HashMap<ObjectId, T>,
    tag_to_obj: HashMap<T, ObjectId>,
}

// ===== impl ObjectRegistry =====

impl<T> ObjectRegistry<T>
where
    T: Copy + Eq + Hash + From<u64>,
{
    pub fn new() -> ObjectRegistry<T> {
        ObjectRegistry {
            next: 0,
            obj_to_tag: HashMap::new(),
            tag_to_obj: HashMap::new(),
        }
    }

    // Returns the tag associated to the given object identity, allocating a
    // fresh one if the object isn't registered yet.
    pub fn get_tag(&mut self, obj: ObjectId) -> T {
        if let Some(&tag) = self.obj_to_tag.get(&obj) {
            return tag;
        }

        let tag = self.alloc();
        self.bind(tag, obj);
        tag
    }

    // Allocates and assigns a fresh tag to the given object identity,
    // detaching any prior tag. Used on lineage breaks.
    pub fn new_tag(&mut self, obj: ObjectId) -> T {
        self.remove_obj(obj);
        let tag = self.alloc();
        self.bind(tag, obj);
        tag
    }

    // Rebinds an existing tag to a new object identity, preserving the tag
    // across an identity change. Returns `false` if the tag isn't bound to
    // any object.
    pub fn replace_obj(&mut self, tag: T, obj: ObjectId) -> bool {
        let Some(old_obj) = self.tag_to_obj.get(&tag).copied() else {
            return false;
        };

        self.obj_to_tag.remove(&old_obj);
        self.remove_obj(obj);
        self.bind(tag, obj);
        true
    }

    // Detaches the tag bound to the given object identity, if any. Used when
    // the object leaves the process boundary.
    pub fn remove_obj(&mut self, obj: ObjectId) {
        if let Some(tag) = self.obj_to_tag.remove(&obj) {
            self.tag_to_obj.remove(&tag);
        }
    }

    // Allocates a tag bound to no object.
    pub fn generate_unused_tag(&mut self) -> T {
        self.alloc()
    }

    fn alloc(&mut self) -> T {
        let tag = T::from(self.next);
        self.next += 1;
        tag
    }

    fn bind(&mut self, tag: T, obj: ObjectId) {
        self.obj_to_tag.insert(obj, tag);
        self.tag_to_obj.insert(tag, obj);
    }
}

impl<T> Default for ObjectRegistry<T>
where
    T: Copy + Eq + Hash + From<u64>,
{
    fn default() -> ObjectRegistry<T> {
        ObjectRegistry::new()
    }
}
