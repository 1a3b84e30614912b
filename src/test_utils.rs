// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Test support: variant assertions and builders for receive-direction frames.

use {
    crate::{
        mac::{
            self, AssocRespHdr, AuthHdr, BeaconHdr, DataHdr, DeauthHdr, DisassocHdr, FrameControl,
            MgmtHdr, SequenceControl,
        },
        service::{BssDescription, BssType},
        MacAddr,
    },
    zerocopy::{byteorder::U16, AsBytes},
};

macro_rules! assert_variant {
    ($expr:expr, $pat:pat => $then:expr) => {
        match $expr {
            $pat => $then,
            _ => panic!("unexpected variant: {}", stringify!($pat)),
        }
    };
    ($expr:expr, $pat:pat) => {
        assert_variant!($expr, $pat => {})
    };
}
pub(crate) use assert_variant;

pub fn fake_bss_description(bssid: MacAddr, ssid: &[u8]) -> BssDescription {
    BssDescription {
        bssid,
        ssid: ssid.to_vec(),
        bss_type: BssType::Infrastructure,
        beacon_period: 100,
        capability_info: mac::CapabilityInfo(0).with_ess(true).0,
        channel: 11,
        rssi_dbm: 0,
        snr_db: 0,
        rates: vec![0x82, 0x84, 0x8b, 0x96],
        rsne: None,
    }
}

fn mgmt_frame(subtype: u16, addr1: MacAddr, addr2: MacAddr, bssid: MacAddr, body: &[u8]) -> Vec<u8> {
    let hdr = MgmtHdr {
        frame_ctrl: FrameControl(0)
            .with_frame_type(mac::FRAME_TYPE_MGMT)
            .with_frame_subtype(subtype),
        duration: 0,
        addr1,
        addr2,
        addr3: bssid,
        seq_ctrl: SequenceControl(0).with_seq_num(1),
    };
    let mut frame = hdr.as_bytes().to_vec();
    frame.extend_from_slice(body);
    frame
}

pub fn beacon_frame(bssid: MacAddr, ssid: &[u8], channel: u8) -> Vec<u8> {
    let mut body = BeaconHdr {
        timestamp: 0.into(),
        beacon_interval: 100.into(),
        capabilities: U16::new(mac::CapabilityInfo(0).with_ess(true).0),
    }
    .as_bytes()
    .to_vec();
    crate::ie::write_ssid(&mut body, ssid).unwrap();
    crate::ie::write_supported_rates(&mut body, &[0x82, 0x84, 0x8b, 0x96]).unwrap();
    crate::ie::write_dsss_param_set(&mut body, channel).unwrap();
    mgmt_frame(mac::MGMT_SUBTYPE_BEACON, crate::BCAST_ADDR, bssid, bssid, &body)
}

pub fn open_auth_frame(bssid: MacAddr, client: MacAddr, txn_seq: u16, status: u16) -> Vec<u8> {
    let body = AuthHdr {
        auth_alg_num: mac::AUTH_ALGORITHM_OPEN.into(),
        auth_txn_seq_num: txn_seq.into(),
        status_code: status.into(),
    };
    mgmt_frame(mac::MGMT_SUBTYPE_AUTH, client, bssid, bssid, body.as_bytes())
}

pub fn assoc_resp_frame(bssid: MacAddr, client: MacAddr, status: u16, aid: u16) -> Vec<u8> {
    let body = AssocRespHdr {
        capabilities: U16::new(mac::CapabilityInfo(0).with_ess(true).0),
        status_code: status.into(),
        aid: aid.into(),
    };
    mgmt_frame(mac::MGMT_SUBTYPE_ASSOC_RESP, client, bssid, bssid, body.as_bytes())
}

pub fn assoc_req_frame(bssid: MacAddr, client: MacAddr, ssid: &[u8]) -> Vec<u8> {
    let mut body = crate::mac::AssocReqHdr {
        capabilities: U16::new(mac::CapabilityInfo(0).with_ess(true).0),
        listen_interval: 10.into(),
    }
    .as_bytes()
    .to_vec();
    crate::ie::write_ssid(&mut body, ssid).unwrap();
    crate::ie::write_supported_rates(&mut body, &[0x82, 0x84, 0x8b, 0x96]).unwrap();
    mgmt_frame(mac::MGMT_SUBTYPE_ASSOC_REQ, bssid, client, bssid, &body)
}

pub fn deauth_frame(bssid: MacAddr, client: MacAddr, reason: u16) -> Vec<u8> {
    let body = DeauthHdr { reason_code: reason.into() };
    mgmt_frame(mac::MGMT_SUBTYPE_DEAUTH, client, bssid, bssid, body.as_bytes())
}

pub fn disassoc_frame(bssid: MacAddr, client: MacAddr, reason: u16) -> Vec<u8> {
    let body = DisassocHdr { reason_code: reason.into() };
    mgmt_frame(mac::MGMT_SUBTYPE_DISASSOC, client, bssid, bssid, body.as_bytes())
}

/// A from-DS data frame carrying an LLC/SNAP payload, as a client receives it
/// from its AP.
pub fn data_frame_from_ap(
    bssid: MacAddr,
    client: MacAddr,
    src_addr: MacAddr,
    ether_type: u16,
    payload: &[u8],
) -> Vec<u8> {
    let hdr = DataHdr {
        frame_ctrl: FrameControl(0).with_frame_type(mac::FRAME_TYPE_DATA).with_from_ds(true),
        duration: 0,
        addr1: client,
        addr2: bssid,
        addr3: src_addr,
        seq_ctrl: SequenceControl(0).with_seq_num(2),
    };
    let mut frame = hdr.as_bytes().to_vec();
    frame.extend_from_slice(mac::llc_snap_hdr(ether_type).as_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// A to-DS data frame carrying an LLC/SNAP payload, as an AP receives it from
/// a client.
pub fn data_frame_to_ap(
    bssid: MacAddr,
    client: MacAddr,
    dst_addr: MacAddr,
    ether_type: u16,
    payload: &[u8],
) -> Vec<u8> {
    let hdr = DataHdr {
        frame_ctrl: FrameControl(0).with_frame_type(mac::FRAME_TYPE_DATA).with_to_ds(true),
        duration: 0,
        addr1: bssid,
        addr2: client,
        addr3: dst_addr,
        seq_ctrl: SequenceControl(0).with_seq_num(2),
    };
    let mut frame = hdr.as_bytes().to_vec();
    frame.extend_from_slice(mac::llc_snap_hdr(ether_type).as_bytes());
    frame.extend_from_slice(payload);
    frame
}

pub fn null_data_frame(transmitter: MacAddr, bssid: MacAddr, pwr_mgmt: bool) -> Vec<u8> {
    let hdr = DataHdr {
        frame_ctrl: FrameControl(0)
            .with_frame_type(mac::FRAME_TYPE_DATA)
            .with_frame_subtype(mac::BITMASK_NULL)
            .with_to_ds(true)
            .with_power_mgmt(pwr_mgmt),
        duration: 0,
        addr1: bssid,
        addr2: transmitter,
        addr3: bssid,
        seq_ctrl: SequenceControl(0).with_seq_num(3),
    };
    hdr.as_bytes().to_vec()
}

pub fn eth_frame(dst: MacAddr, src: MacAddr, ether_type: u16, payload: &[u8]) -> Vec<u8> {
    let hdr = mac::EthernetIIHdr { da: dst, sa: src, ether_type: U16::new(ether_type) };
    let mut frame = hdr.as_bytes().to_vec();
    frame.extend_from_slice(payload);
    frame
}
