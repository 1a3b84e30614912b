// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The boundary to the radio driver. All calls are synchronous and never suspend;
//! the driver either accepts the operation or reports a definite failure.

use {
    crate::{error::Error, service::MlmeEvent, time::TimeUnit, MacAddr},
    std::fmt,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cbw {
    Cbw20,
    Cbw40,
    Cbw40Below,
    Cbw80,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    pub primary: u8,
    pub cbw: Cbw,
}

impl Channel {
    pub fn new(primary: u8, cbw: Cbw) -> Self {
        Channel { primary, cbw }
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?}", self.primary, self.cbw)
    }
}

/// Receive metadata attached to every inbound WLAN frame.
#[derive(Debug, Clone, Copy)]
pub struct RxInfo {
    pub channel: Channel,
    pub rssi_dbm: i8,
    pub snr_db: i16,
}

/// Key installation config, handed to the driver verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct Key {
    pub key_type: crate::service::KeyType,
    pub address: MacAddr,
    pub key_id: u16,
    pub key: Vec<u8>,
    pub rsc: u64,
    pub cipher_oui: [u8; 3],
    pub cipher_type: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BssType {
    Infrastructure,
    Independent,
    Mesh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BssConfig {
    pub bssid: MacAddr,
    pub bss_type: BssType,
    /// False when this device itself hosts the BSS.
    pub remote: bool,
}

/// The negotiated capabilities for one association, pushed to the driver when an
/// association completes. Immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct AssocContext {
    pub addr: MacAddr,
    pub aid: u16,
    pub rates: Vec<u8>,
    pub ht_cap: Option<Vec<u8>>,
    pub ht_op: Option<Vec<u8>>,
    pub vht_cap: Option<Vec<u8>>,
    pub vht_op: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Down,
    Up,
}

pub trait Device {
    fn channel(&self) -> Channel;
    fn set_channel(&mut self, channel: Channel) -> Result<(), Error>;
    /// Transmits a WLAN MAC frame. Ownership of the buffer transfers to the driver.
    fn send_wlan(&mut self, frame: Vec<u8>) -> Result<(), Error>;
    /// Delivers a decapsulated frame to the host's Ethernet data path.
    fn send_eth(&mut self, frame: Vec<u8>) -> Result<(), Error>;
    /// Sends a confirm or indication to the SME.
    fn send_mlme_event(&mut self, event: MlmeEvent) -> Result<(), Error>;
    fn set_key(&mut self, key: Key) -> Result<(), Error>;
    fn configure_bss(&mut self, cfg: BssConfig) -> Result<(), Error>;
    fn configure_assoc(&mut self, assoc: AssocContext) -> Result<(), Error>;
    fn clear_assoc(&mut self, addr: &MacAddr) -> Result<(), Error>;
    /// Hands a beacon template to the hardware beacon offload.
    fn enable_beaconing(&mut self, frame: Vec<u8>, beacon_interval: TimeUnit) -> Result<(), Error>;
    /// Replaces the template of an already enabled beacon offload.
    fn configure_beacon(&mut self, frame: Vec<u8>) -> Result<(), Error>;
    fn disable_beaconing(&mut self) -> Result<(), Error>;
    fn set_link_status(&mut self, status: LinkStatus);
}

#[cfg(test)]
pub use test_utils::FakeDevice;
