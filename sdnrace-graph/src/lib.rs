//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

mod graph;

pub use graph::{EdgeRel, HappensBeforeGraph};
