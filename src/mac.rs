// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! IEEE Std 802.11-2016 MAC frame headers and parse views.
//!
//! All views borrow the frame bytes they were parsed from; nothing here owns a frame.
//! Multi-byte numeric wire fields use explicit little-endian types; the single-word
//! bitfield wrappers (`FrameControl` and friends) hold host-order values and are
//! serialized through the packed header structs.

use {
    crate::{buffer_reader::BufferReader, MacAddr},
    num_derive::{FromPrimitive, ToPrimitive},
    zerocopy::{
        byteorder::{BigEndian, LittleEndian, U16, U64},
        AsBytes, ByteSlice, FromBytes, LayoutVerified, Unaligned,
    },
};

// IEEE Std 802.11-2016, 9.2.4.1.3
// Frame types:
pub const FRAME_TYPE_MGMT: u16 = 0;
pub const FRAME_TYPE_DATA: u16 = 2;
// Management subtypes:
pub const MGMT_SUBTYPE_ASSOC_REQ: u16 = 0x00;
pub const MGMT_SUBTYPE_ASSOC_RESP: u16 = 0x01;
pub const MGMT_SUBTYPE_PROBE_REQ: u16 = 0x04;
pub const MGMT_SUBTYPE_PROBE_RESP: u16 = 0x05;
pub const MGMT_SUBTYPE_BEACON: u16 = 0x08;
pub const MGMT_SUBTYPE_DISASSOC: u16 = 0x0A;
pub const MGMT_SUBTYPE_AUTH: u16 = 0x0B;
pub const MGMT_SUBTYPE_DEAUTH: u16 = 0x0C;
pub const MGMT_SUBTYPE_ACTION: u16 = 0x0D;

// IEEE Std 802.11-2016, 9.2.4.1.3, Table 9-1
pub const BITMASK_NULL: u16 = 1 << 2;
pub const BITMASK_QOS: u16 = 1 << 3;

// IEEE Std 802.11-2016, 9.4.1.11, Table 9-47
pub const ACTION_CATEGORY_MESH: u8 = 13;
// IEEE Std 802.11-2016, 9.6.17.1, Table 9-365
pub const MESH_ACTION_HWMP_PATH_SELECTION: u8 = 1;

// RFC 1042
pub const LLC_SNAP_EXTENSION: u8 = 0xAA;
pub const LLC_SNAP_UNNUMBERED_INFO: u8 = 0x03;
pub const LLC_SNAP_OUI: [u8; 3] = [0, 0, 0];

// https://www.iana.org/assignments/ieee-802-numbers/ieee-802-numbers.xhtml
pub const ETHER_TYPE_EAPOL: u16 = 0x888E;

pub const MAX_ETH_FRAME_LEN: usize = 2048;

macro_rules! bit {
    ($getter:ident, $setter:ident, $builder:ident, $bit:expr) => {
        pub fn $getter(self) -> bool {
            self.0 & (1 << $bit) != 0
        }
        pub fn $setter(&mut self, val: bool) {
            self.0 = (self.0 & !(1 << $bit)) | ((val as u16) << $bit);
        }
        pub fn $builder(mut self, val: bool) -> Self {
            self.$setter(val);
            self
        }
    };
}

// IEEE Std 802.11-2016, 9.2.4.1.1
#[derive(AsBytes, FromBytes, PartialEq, Eq, Clone, Copy, Debug, Default)]
#[repr(C)]
pub struct FrameControl(pub u16);

impl FrameControl {
    pub fn protocol_version(self) -> u16 {
        self.0 & 0b11
    }
    pub fn frame_type(self) -> u16 {
        (self.0 >> 2) & 0b11
    }
    pub fn frame_subtype(self) -> u16 {
        (self.0 >> 4) & 0b1111
    }
    pub fn with_frame_type(mut self, frame_type: u16) -> Self {
        self.0 = (self.0 & !(0b11 << 2)) | ((frame_type & 0b11) << 2);
        self
    }
    pub fn with_frame_subtype(mut self, subtype: u16) -> Self {
        self.0 = (self.0 & !(0b1111 << 4)) | ((subtype & 0b1111) << 4);
        self
    }
    bit!(to_ds, set_to_ds, with_to_ds, 8);
    bit!(from_ds, set_from_ds, with_from_ds, 9);
    bit!(more_fragments, set_more_fragments, with_more_fragments, 10);
    bit!(retry, set_retry, with_retry, 11);
    bit!(power_mgmt, set_power_mgmt, with_power_mgmt, 12);
    bit!(more_data, set_more_data, with_more_data, 13);
    bit!(protected, set_protected, with_protected, 14);
    bit!(htc_order, set_htc_order, with_htc_order, 15);
}

// IEEE Std 802.11-2016, 9.2.4.4
#[derive(AsBytes, FromBytes, PartialEq, Eq, Clone, Copy, Debug, Default)]
#[repr(C)]
pub struct SequenceControl(pub u16);

impl SequenceControl {
    pub fn frag_num(self) -> u16 {
        self.0 & 0b1111
    }
    pub fn seq_num(self) -> u16 {
        self.0 >> 4
    }
    pub fn with_seq_num(mut self, seq_num: u16) -> Self {
        self.0 = (self.0 & 0b1111) | (seq_num << 4);
        self
    }
}

// IEEE Std 802.11-2016, 9.4.1.4
#[derive(AsBytes, FromBytes, PartialEq, Eq, Clone, Copy, Debug, Default)]
#[repr(C)]
pub struct CapabilityInfo(pub u16);

impl CapabilityInfo {
    bit!(ess, set_ess, with_ess, 0);
    bit!(ibss, set_ibss, with_ibss, 1);
    bit!(privacy, set_privacy, with_privacy, 4);
    bit!(short_preamble, set_short_preamble, with_short_preamble, 5);
}

// IEEE Std 802.11-2016, 9.3.3.2
#[derive(FromBytes, AsBytes, Unaligned, PartialEq, Eq, Clone, Copy, Debug)]
#[repr(C, packed)]
pub struct MgmtHdr {
    pub frame_ctrl: FrameControl,
    pub duration: u16,
    pub addr1: MacAddr,
    pub addr2: MacAddr,
    pub addr3: MacAddr,
    pub seq_ctrl: SequenceControl,
}

/// Builds a management header addressed from a client to its AP.
pub fn mgmt_hdr_to_ap(
    frame_ctrl: FrameControl,
    bssid: MacAddr,
    client_addr: MacAddr,
    seq_ctrl: SequenceControl,
) -> MgmtHdr {
    MgmtHdr { frame_ctrl, duration: 0, addr1: bssid, addr2: client_addr, addr3: bssid, seq_ctrl }
}

/// Builds a management header addressed from an AP to one of its clients.
pub fn mgmt_hdr_from_ap(
    frame_ctrl: FrameControl,
    client_addr: MacAddr,
    bssid: MacAddr,
    seq_ctrl: SequenceControl,
) -> MgmtHdr {
    MgmtHdr { frame_ctrl, duration: 0, addr1: client_addr, addr2: bssid, addr3: bssid, seq_ctrl }
}

// IEEE Std 802.11-2016, 9.3.2.1
#[derive(FromBytes, AsBytes, Unaligned, PartialEq, Eq, Clone, Copy, Debug)]
#[repr(C, packed)]
pub struct DataHdr {
    pub frame_ctrl: FrameControl,
    pub duration: u16,
    pub addr1: MacAddr,
    pub addr2: MacAddr,
    pub addr3: MacAddr,
    pub seq_ctrl: SequenceControl,
}

// IEEE Std 802.11-2016, Table 9-26 defines DA, SA, RA, TA, BSSID
pub fn data_dst_addr(hdr: &DataHdr) -> MacAddr {
    if hdr.frame_ctrl.to_ds() {
        hdr.addr3
    } else {
        hdr.addr1
    }
}

pub fn data_src_addr(hdr: &DataHdr, addr4: Option<MacAddr>) -> Option<MacAddr> {
    match (hdr.frame_ctrl.to_ds(), hdr.frame_ctrl.from_ds()) {
        (_, false) => Some(hdr.addr2),
        (false, true) => Some(hdr.addr3),
        (true, true) => addr4,
    }
}

pub fn data_bssid(hdr: &DataHdr) -> Option<MacAddr> {
    match (hdr.frame_ctrl.to_ds(), hdr.frame_ctrl.from_ds()) {
        (false, false) => Some(hdr.addr3),
        (false, true) => Some(hdr.addr2),
        (true, false) => Some(hdr.addr1),
        (true, true) => None,
    }
}

// IEEE Std 802.11-2016, 9.3.3.3
#[derive(FromBytes, AsBytes, Unaligned, Clone, Copy, Debug)]
#[repr(C, packed)]
pub struct BeaconHdr {
    pub timestamp: U64<LittleEndian>,
    pub beacon_interval: U16<LittleEndian>,
    // IEEE Std 802.11-2016, 9.4.1.4
    pub capabilities: U16<LittleEndian>,
}

// IEEE Std 802.11-2016, 9.4.1.1
pub const AUTH_ALGORITHM_OPEN: u16 = 0;

// IEEE Std 802.11-2016, 9.3.3.12
#[derive(FromBytes, AsBytes, Unaligned, Clone, Copy, Debug)]
#[repr(C, packed)]
pub struct AuthHdr {
    pub auth_alg_num: U16<LittleEndian>,
    pub auth_txn_seq_num: U16<LittleEndian>,
    pub status_code: U16<LittleEndian>,
}

// IEEE Std 802.11-2016, 9.3.3.13
#[derive(FromBytes, AsBytes, Unaligned, Clone, Copy, Debug)]
#[repr(C, packed)]
pub struct DeauthHdr {
    pub reason_code: U16<LittleEndian>,
}

// IEEE Std 802.11-2016, 9.3.3.6
#[derive(FromBytes, AsBytes, Unaligned, Clone, Copy, Debug)]
#[repr(C, packed)]
pub struct AssocReqHdr {
    pub capabilities: U16<LittleEndian>,
    pub listen_interval: U16<LittleEndian>,
}

// IEEE Std 802.11-2016, 9.3.3.7
#[derive(FromBytes, AsBytes, Unaligned, Clone, Copy, Debug)]
#[repr(C, packed)]
pub struct AssocRespHdr {
    pub capabilities: U16<LittleEndian>,
    pub status_code: U16<LittleEndian>,
    pub aid: U16<LittleEndian>,
}

// IEEE Std 802.11-2016, 9.3.3.5
#[derive(FromBytes, AsBytes, Unaligned, Clone, Copy, Debug)]
#[repr(C, packed)]
pub struct DisassocHdr {
    pub reason_code: U16<LittleEndian>,
}

// IEEE Std 802.11-2016, 9.6.17: mesh action frames carry category and action before
// their information elements.
#[derive(FromBytes, AsBytes, Unaligned, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C, packed)]
pub struct MeshActionHdr {
    pub category: u8,
    pub action: u8,
}

#[derive(FromBytes, AsBytes, Unaligned, Clone, Copy, Debug)]
#[repr(C, packed)]
pub struct EthernetIIHdr {
    pub da: MacAddr,
    pub sa: MacAddr,
    pub ether_type: U16<BigEndian>,
}

#[derive(FromBytes, AsBytes, Unaligned, Clone, Copy, Debug)]
#[repr(C, packed)]
pub struct LlcHdr {
    pub dsap: u8,
    pub ssap: u8,
    pub control: u8,
    pub oui: [u8; 3],
    pub protocol_id: U16<BigEndian>,
}

pub fn llc_snap_hdr(ether_type: u16) -> LlcHdr {
    LlcHdr {
        dsap: LLC_SNAP_EXTENSION,
        ssap: LLC_SNAP_EXTENSION,
        control: LLC_SNAP_UNNUMBERED_INFO,
        oui: LLC_SNAP_OUI,
        protocol_id: U16::new(ether_type),
    }
}

/// IEEE Std 802.11-2016, 9.4.1.9, Table 9-46
#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive, ToPrimitive)]
#[repr(u16)]
pub enum StatusCode {
    Success = 0,
    RefusedReasonUnspecified = 1,
    RefusedCapabilitiesMismatch = 10,
    RefusedNotAuthenticated = 11,
    RefusedApOutOfMemory = 17,
    RefusedBasicRatesMismatch = 18,
    RefusedTemporarily = 30,
}

/// IEEE Std 802.11-2016, 9.4.1.7, Table 9-45
#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive, ToPrimitive)]
#[repr(u16)]
pub enum ReasonCode {
    UnspecifiedReason = 1,
    InvalidAuthentication = 2,
    LeavingNetworkDeauth = 3,
    ReasonInactivity = 4,
    InvalidClass2Frame = 6,
    InvalidClass3Frame = 7,
    LeavingNetworkDisassoc = 8,
    NotAuthenticated = 9,
}

pub enum MacFrame<B> {
    Mgmt {
        mgmt_hdr: LayoutVerified<B, MgmtHdr>,
        body: B,
    },
    Data {
        data_hdr: LayoutVerified<B, DataHdr>,
        addr4: Option<MacAddr>,
        body: B,
    },
    Unsupported {
        frame_type: u16,
    },
}

impl<B: ByteSlice + Default> MacFrame<B> {
    pub fn parse(bytes: B) -> Option<MacFrame<B>> {
        if bytes.len() < 2 {
            return None;
        }
        let frame_ctrl = FrameControl(u16::from_le_bytes([bytes[0], bytes[1]]));
        let mut reader = BufferReader::new(bytes);
        match frame_ctrl.frame_type() {
            FRAME_TYPE_MGMT => {
                let mgmt_hdr = reader.read::<MgmtHdr>()?;
                if frame_ctrl.htc_order() {
                    reader.read_bytes(4)?;
                }
                Some(MacFrame::Mgmt { mgmt_hdr, body: reader.into_remaining() })
            }
            FRAME_TYPE_DATA => {
                let data_hdr = reader.read::<DataHdr>()?;
                let addr4 = if frame_ctrl.to_ds() && frame_ctrl.from_ds() {
                    Some(*reader.read::<MacAddr>()?)
                } else {
                    None
                };
                if frame_ctrl.frame_subtype() & BITMASK_QOS != 0 {
                    reader.read_bytes(2)?;
                }
                if frame_ctrl.htc_order() {
                    reader.read_bytes(4)?;
                }
                Some(MacFrame::Data { data_hdr, addr4, body: reader.into_remaining() })
            }
            frame_type => Some(MacFrame::Unsupported { frame_type }),
        }
    }
}

/// The body of a parsed management frame, discriminated by subtype. `elements` holds the
/// unparsed information elements trailing the fixed fields.
pub enum MgmtBody<B> {
    Beacon { bcn_hdr: LayoutVerified<B, BeaconHdr>, elements: B },
    ProbeReq { elements: B },
    ProbeResp { bcn_hdr: LayoutVerified<B, BeaconHdr>, elements: B },
    Authentication { auth_hdr: LayoutVerified<B, AuthHdr>, elements: B },
    AssociationReq { assoc_req_hdr: LayoutVerified<B, AssocReqHdr>, elements: B },
    AssociationResp { assoc_resp_hdr: LayoutVerified<B, AssocRespHdr>, elements: B },
    Deauthentication { deauth_hdr: LayoutVerified<B, DeauthHdr> },
    Disassociation { disassoc_hdr: LayoutVerified<B, DisassocHdr> },
    Action { action_hdr: LayoutVerified<B, MeshActionHdr>, elements: B },
    Unsupported { subtype: u16 },
}

impl<B: ByteSlice + Default> MgmtBody<B> {
    pub fn parse(subtype: u16, bytes: B) -> Option<MgmtBody<B>> {
        let mut reader = BufferReader::new(bytes);
        match subtype {
            MGMT_SUBTYPE_BEACON => {
                let bcn_hdr = reader.read()?;
                Some(MgmtBody::Beacon { bcn_hdr, elements: reader.into_remaining() })
            }
            MGMT_SUBTYPE_PROBE_REQ => Some(MgmtBody::ProbeReq { elements: reader.into_remaining() }),
            MGMT_SUBTYPE_PROBE_RESP => {
                let bcn_hdr = reader.read()?;
                Some(MgmtBody::ProbeResp { bcn_hdr, elements: reader.into_remaining() })
            }
            MGMT_SUBTYPE_AUTH => {
                let auth_hdr = reader.read()?;
                Some(MgmtBody::Authentication { auth_hdr, elements: reader.into_remaining() })
            }
            MGMT_SUBTYPE_ASSOC_REQ => {
                let assoc_req_hdr = reader.read()?;
                Some(MgmtBody::AssociationReq { assoc_req_hdr, elements: reader.into_remaining() })
            }
            MGMT_SUBTYPE_ASSOC_RESP => {
                let assoc_resp_hdr = reader.read()?;
                Some(MgmtBody::AssociationResp {
                    assoc_resp_hdr,
                    elements: reader.into_remaining(),
                })
            }
            MGMT_SUBTYPE_DEAUTH => {
                let deauth_hdr = reader.read()?;
                Some(MgmtBody::Deauthentication { deauth_hdr })
            }
            MGMT_SUBTYPE_DISASSOC => {
                let disassoc_hdr = reader.read()?;
                Some(MgmtBody::Disassociation { disassoc_hdr })
            }
            MGMT_SUBTYPE_ACTION => {
                let action_hdr = reader.read()?;
                Some(MgmtBody::Action { action_hdr, elements: reader.into_remaining() })
            }
            subtype => Some(MgmtBody::Unsupported { subtype }),
        }
    }
}

/// A data frame body with a null subtype carries no payload; the client answers these
/// with a keep-alive response.
pub fn is_null_data(frame_ctrl: FrameControl) -> bool {
    frame_ctrl.frame_type() == FRAME_TYPE_DATA && frame_ctrl.frame_subtype() & BITMASK_NULL != 0
}
