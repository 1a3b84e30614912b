// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Beacon templates and probe responses for a running BSS. Periodic emission is
//! offloaded to the hardware; this module only builds the frames.

use {
    super::Context,
    crate::{
        device::Device,
        error::Error,
        ie,
        mac::{self, BeaconHdr, CapabilityInfo, FrameControl, SequenceControl},
        time::TimeUnit,
        MacAddr, BCAST_ADDR,
    },
    zerocopy::AsBytes,
};

pub struct BeaconSender {
    ssid: Vec<u8>,
    beacon_period: TimeUnit,
    dtim_period: u8,
    capabilities: CapabilityInfo,
    rates: Vec<u8>,
    channel: u8,
    rsne: Option<Vec<u8>>,
}

impl BeaconSender {
    pub fn new(
        ssid: Vec<u8>,
        beacon_period: TimeUnit,
        dtim_period: u8,
        capabilities: CapabilityInfo,
        rates: Vec<u8>,
        channel: u8,
        rsne: Option<Vec<u8>>,
    ) -> Self {
        BeaconSender { ssid, beacon_period, dtim_period, capabilities, rates, channel, rsne }
    }

    pub fn start<D: Device>(&self, ctx: &mut Context<D>, bssid: MacAddr) -> Result<(), Error> {
        let mut frame = vec![];
        self.write_beacon_frame(&mut frame, bssid)?;
        ctx.device.enable_beaconing(frame, self.beacon_period)
    }

    /// The sequence number is left zero; the hardware offload stamps its own.
    fn write_beacon_frame(&self, buf: &mut Vec<u8>, bssid: MacAddr) -> Result<(), Error> {
        let frame_ctrl = FrameControl(0)
            .with_frame_type(mac::FRAME_TYPE_MGMT)
            .with_frame_subtype(mac::MGMT_SUBTYPE_BEACON);
        let mgmt_hdr =
            mac::mgmt_hdr_from_ap(frame_ctrl, BCAST_ADDR, bssid, SequenceControl(0));
        buf.extend_from_slice(mgmt_hdr.as_bytes());
        self.write_beacon_body(buf, true)
    }

    pub fn send_probe_resp<D: Device>(
        &self,
        ctx: &mut Context<D>,
        bssid: MacAddr,
        client_addr: MacAddr,
    ) -> Result<(), Error> {
        let frame_ctrl = FrameControl(0)
            .with_frame_type(mac::FRAME_TYPE_MGMT)
            .with_frame_subtype(mac::MGMT_SUBTYPE_PROBE_RESP);
        let seq_ctrl = SequenceControl(0).with_seq_num(ctx.seq_mgr.next_sns1(&client_addr) as u16);
        let mut frame = vec![];
        frame.extend_from_slice(
            mac::mgmt_hdr_from_ap(frame_ctrl, client_addr, bssid, seq_ctrl).as_bytes(),
        );
        self.write_beacon_body(&mut frame, false)?;
        ctx.device.send_wlan(frame)
    }

    fn write_beacon_body(&self, buf: &mut Vec<u8>, include_tim: bool) -> Result<(), Error> {
        let bcn_hdr = BeaconHdr {
            timestamp: 0.into(),
            beacon_interval: self.beacon_period.0.into(),
            capabilities: self.capabilities.0.into(),
        };
        buf.extend_from_slice(bcn_hdr.as_bytes());
        ie::write_ssid(buf, &self.ssid)?;
        ie::write_supported_rates(buf, &self.rates)?;
        ie::write_dsss_param_set(buf, self.channel)?;
        if include_tim {
            let tim_hdr = ie::TimHeader {
                dtim_count: 0,
                dtim_period: self.dtim_period,
                bmp_ctrl: 0,
            };
            ie::write_tim(buf, tim_hdr, &[0])?;
        }
        if let Some(rsne) = &self.rsne {
            if rsne.len() > 255 {
                return Err(Error::WritingFrame("RSNE body too long"));
            }
            buf.extend_from_slice(&[ie::Id::RSNE.0, rsne.len() as u8]);
            buf.extend_from_slice(rsne);
        }
        Ok(())
    }
}
