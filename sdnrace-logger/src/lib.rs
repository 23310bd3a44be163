//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod controller;
pub mod debug;
pub mod error;
pub mod events;
pub mod instance;
pub mod logger;
pub mod tasks;
