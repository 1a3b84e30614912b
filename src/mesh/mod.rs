// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Mesh path selection: the HWMP engine and its forwarding table.
//!
//! Unlike the client and AP state machines there is no owning MLME object here;
//! `HwmpState` and `PathTable` are explicit and threaded through every call, and
//! each operation returns the frames to transmit instead of talking to a device.

pub mod hwmp;
pub mod path_table;

pub use hwmp::{
    handle_hwmp_action, handle_hwmp_timeout, hwmp_seqno_lt, initiate_path_discovery, HwmpState,
};

use crate::MacAddr;

/// Timed events of the HWMP engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimedEvent {
    PathDiscoveryRetry(MacAddr),
}
