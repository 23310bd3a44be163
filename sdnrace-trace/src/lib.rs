//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod b64;
pub mod events;
pub mod hb;
pub mod writer;
