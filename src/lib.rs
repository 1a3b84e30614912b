// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! This crate implements IEEE Std 802.11-2016 MLME as a library for hardware that supports
//! SoftMAC. The implementation is broadly divided between client and AP stations, a channel
//! scanner, and HWMP mesh path discovery, with shared timer and frame-codec infrastructure.
//! See the [`client`], [`ap`] and [`mesh`] modules.
//!
//! The crate is purely event-driven: the embedder owns the dispatch loop and delivers
//! incoming frames, service messages and timer expirations serially. No method suspends.
//!
//! [`ap`]: crate::ap
//! [`client`]: crate::client
//! [`mesh`]: crate::mesh

pub mod ap;
mod buffer_reader;
pub mod client;
pub mod device;
pub mod error;
pub mod ie;
pub mod mac;
pub mod mesh;
pub mod sequence;
pub mod service;
#[cfg(test)]
pub mod test_utils;
pub mod time;
pub mod timer;

pub use error::Error;

/// An IEEE 802.11 MAC address.
pub type MacAddr = [u8; 6];

/// The broadcast MAC address.
pub const BCAST_ADDR: MacAddr = [0xFF; 6];
