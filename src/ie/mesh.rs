// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Mesh path selection (HWMP) and mesh peering management elements.
//!
//! Byte layouts follow IEEE Std 802.11-2016, 9.4.2.102 and 9.4.2.113 through
//! 9.4.2.115: one-byte flags, hop count and TTL fields, little-endian four-byte
//! discovery ids, sequence numbers, lifetimes and metrics.

use {
    super::{write_ie_hdr, Header, Id},
    crate::{
        buffer_reader::BufferReader,
        error::{Error, FrameParseError},
        MacAddr,
    },
    std::mem::size_of,
    zerocopy::{
        byteorder::{LittleEndian, U16, U32},
        AsBytes, ByteSlice, FromBytes, LayoutVerified, Unaligned,
    },
};

// IEEE Std 802.11-2016, 9.4.2.113, Figure 9-478
#[repr(C)]
#[derive(FromBytes, AsBytes, Unaligned, Clone, Copy, Debug, PartialEq, Eq)]
pub struct PreqFlags(pub u8);

impl PreqFlags {
    pub fn addr_ext(self) -> bool {
        self.0 & (1 << 6) != 0
    }
    pub fn with_addr_ext(mut self, val: bool) -> Self {
        self.0 = (self.0 & !(1 << 6)) | ((val as u8) << 6);
        self
    }
}

/// Fixed fields of the PREQ element preceding the optional originator
/// external address.
#[repr(C, packed)]
#[derive(FromBytes, AsBytes, Unaligned, Clone, Copy, Debug)]
pub struct PreqHeader {
    pub flags: PreqFlags,
    pub hop_count: u8,
    pub element_ttl: u8,
    pub path_discovery_id: U32<LittleEndian>,
    pub originator_addr: MacAddr,
    pub originator_hwmp_seqno: U32<LittleEndian>,
}

/// Fixed fields of the PREQ element between the optional originator external
/// address and the per-target list.
#[repr(C, packed)]
#[derive(FromBytes, AsBytes, Unaligned, Clone, Copy, Debug)]
pub struct PreqMiddle {
    pub lifetime: U32<LittleEndian>,
    pub metric: U32<LittleEndian>,
    pub target_count: u8,
}

// IEEE Std 802.11-2016, 9.4.2.113, Figure 9-479
#[repr(C)]
#[derive(FromBytes, AsBytes, Unaligned, Clone, Copy, Debug, PartialEq, Eq)]
pub struct PreqPerTargetFlags(pub u8);

impl PreqPerTargetFlags {
    pub fn target_only(self) -> bool {
        self.0 & 1 != 0
    }
    pub fn usn(self) -> bool {
        self.0 & (1 << 2) != 0
    }
    pub fn with_target_only(mut self, val: bool) -> Self {
        self.0 = (self.0 & !1) | val as u8;
        self
    }
    pub fn with_usn(mut self, val: bool) -> Self {
        self.0 = (self.0 & !(1 << 2)) | ((val as u8) << 2);
        self
    }
}

#[repr(C, packed)]
#[derive(FromBytes, AsBytes, Unaligned, Clone, Copy, Debug)]
pub struct PreqPerTarget {
    pub flags: PreqPerTargetFlags,
    pub target_addr: MacAddr,
    pub target_hwmp_seqno: U32<LittleEndian>,
}

pub struct PreqView<B> {
    pub header: LayoutVerified<B, PreqHeader>,
    pub originator_external_addr: Option<LayoutVerified<B, MacAddr>>,
    pub middle: LayoutVerified<B, PreqMiddle>,
    pub targets: LayoutVerified<B, [PreqPerTarget]>,
}

pub fn parse_preq<B: ByteSlice>(body: B) -> Result<PreqView<B>, FrameParseError> {
    let mut reader = BufferReader::new(body);
    let header = reader
        .read::<PreqHeader>()
        .ok_or(FrameParseError::InvalidFieldValue("PREQ header too short"))?;
    let originator_external_addr = if header.flags.addr_ext() {
        Some(
            reader
                .read::<MacAddr>()
                .ok_or(FrameParseError::InvalidFieldValue("missing originator external addr"))?,
        )
    } else {
        None
    };
    let middle = reader
        .read::<PreqMiddle>()
        .ok_or(FrameParseError::InvalidFieldValue("PREQ middle too short"))?;
    let target_bytes = reader
        .read_bytes(middle.target_count as usize * size_of::<PreqPerTarget>())
        .ok_or(FrameParseError::InvalidFieldValue("PREQ target list too short"))?;
    // Length is a multiple of the element size by construction.
    let targets = LayoutVerified::new_slice_unaligned(target_bytes)
        .ok_or(FrameParseError::InvalidFieldValue("PREQ target list"))?;
    Ok(PreqView { header, originator_external_addr, middle, targets })
}

pub fn write_preq(
    buf: &mut Vec<u8>,
    header: &PreqHeader,
    originator_external_addr: Option<&MacAddr>,
    middle: &PreqMiddle,
    targets: &[PreqPerTarget],
) -> Result<(), Error> {
    if header.flags.addr_ext() != originator_external_addr.is_some() {
        return Err(Error::WritingFrame("PREQ addr_ext flag disagrees with external addr"));
    }
    if middle.target_count as usize != targets.len() {
        return Err(Error::WritingFrame("PREQ target_count disagrees with target list"));
    }
    let body_len = size_of::<PreqHeader>()
        + originator_external_addr.map_or(0, |_| size_of::<MacAddr>())
        + size_of::<PreqMiddle>()
        + targets.len() * size_of::<PreqPerTarget>();
    write_ie_hdr(buf, Id::PREQ, body_len)?;
    buf.extend_from_slice(header.as_bytes());
    if let Some(ext_addr) = originator_external_addr {
        buf.extend_from_slice(ext_addr);
    }
    buf.extend_from_slice(middle.as_bytes());
    buf.extend_from_slice(targets.as_bytes());
    Ok(())
}

// IEEE Std 802.11-2016, 9.4.2.114
#[repr(C)]
#[derive(FromBytes, AsBytes, Unaligned, Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrepFlags(pub u8);

impl PrepFlags {
    pub fn addr_ext(self) -> bool {
        self.0 & (1 << 6) != 0
    }
    pub fn with_addr_ext(mut self, val: bool) -> Self {
        self.0 = (self.0 & !(1 << 6)) | ((val as u8) << 6);
        self
    }
}

/// Fixed fields of the PREP element preceding the optional target external
/// address.
#[repr(C, packed)]
#[derive(FromBytes, AsBytes, Unaligned, Clone, Copy, Debug)]
pub struct PrepHeader {
    pub flags: PrepFlags,
    pub hop_count: u8,
    pub element_ttl: u8,
    pub target_addr: MacAddr,
    pub target_hwmp_seqno: U32<LittleEndian>,
}

/// Fixed fields of the PREP element following the optional target external
/// address.
#[repr(C, packed)]
#[derive(FromBytes, AsBytes, Unaligned, Clone, Copy, Debug)]
pub struct PrepTail {
    pub lifetime: U32<LittleEndian>,
    pub metric: U32<LittleEndian>,
    pub originator_addr: MacAddr,
    pub originator_hwmp_seqno: U32<LittleEndian>,
}

pub struct PrepView<B> {
    pub header: LayoutVerified<B, PrepHeader>,
    pub target_external_addr: Option<LayoutVerified<B, MacAddr>>,
    pub tail: LayoutVerified<B, PrepTail>,
}

pub fn parse_prep<B: ByteSlice>(body: B) -> Result<PrepView<B>, FrameParseError> {
    let mut reader = BufferReader::new(body);
    let header = reader
        .read::<PrepHeader>()
        .ok_or(FrameParseError::InvalidFieldValue("PREP header too short"))?;
    let target_external_addr = if header.flags.addr_ext() {
        Some(
            reader
                .read::<MacAddr>()
                .ok_or(FrameParseError::InvalidFieldValue("missing target external addr"))?,
        )
    } else {
        None
    };
    let tail = reader
        .read::<PrepTail>()
        .ok_or(FrameParseError::InvalidFieldValue("PREP tail too short"))?;
    Ok(PrepView { header, target_external_addr, tail })
}

pub fn write_prep(
    buf: &mut Vec<u8>,
    header: &PrepHeader,
    target_external_addr: Option<&MacAddr>,
    tail: &PrepTail,
) -> Result<(), Error> {
    if header.flags.addr_ext() != target_external_addr.is_some() {
        return Err(Error::WritingFrame("PREP addr_ext flag disagrees with external addr"));
    }
    let body_len = size_of::<PrepHeader>()
        + target_external_addr.map_or(0, |_| size_of::<MacAddr>())
        + size_of::<PrepTail>();
    write_ie_hdr(buf, Id::PREP, body_len)?;
    buf.extend_from_slice(header.as_bytes());
    if let Some(ext_addr) = target_external_addr {
        buf.extend_from_slice(ext_addr);
    }
    buf.extend_from_slice(tail.as_bytes());
    Ok(())
}

// IEEE Std 802.11-2016, 9.4.2.115
#[repr(C, packed)]
#[derive(FromBytes, AsBytes, Unaligned, Clone, Copy, Debug)]
pub struct PerrHeader {
    pub element_ttl: u8,
    pub num_destinations: u8,
}

// IEEE Std 802.11-2016, 9.4.2.115, Figure 9-483
#[repr(C)]
#[derive(FromBytes, AsBytes, Unaligned, Clone, Copy, Debug, PartialEq, Eq)]
pub struct PerrDestinationFlags(pub u8);

impl PerrDestinationFlags {
    pub fn addr_ext(self) -> bool {
        self.0 & (1 << 6) != 0
    }
    pub fn with_addr_ext(mut self, val: bool) -> Self {
        self.0 = (self.0 & !(1 << 6)) | ((val as u8) << 6);
        self
    }
}

/// Fixed fields of a per-destination chunk preceding the optional destination
/// external address.
#[repr(C, packed)]
#[derive(FromBytes, AsBytes, Unaligned, Clone, Copy, Debug)]
pub struct PerrDestinationHeader {
    pub flags: PerrDestinationFlags,
    pub dest_addr: MacAddr,
    pub hwmp_seqno: U32<LittleEndian>,
}

pub struct PerrDestinationView<B> {
    pub header: LayoutVerified<B, PerrDestinationHeader>,
    pub ext_addr: Option<LayoutVerified<B, MacAddr>>,
    pub reason_code: LayoutVerified<B, U16<LittleEndian>>,
}

pub struct PerrView<B> {
    pub header: LayoutVerified<B, PerrHeader>,
    pub destinations: PerrDestinationListView<B>,
}

pub struct PerrDestinationListView<B>(pub B);

impl<B: ByteSlice> IntoIterator for PerrDestinationListView<B> {
    type Item = PerrDestinationView<B>;
    type IntoIter = PerrDestinationIter<B>;

    fn into_iter(self) -> Self::IntoIter {
        PerrDestinationIter(BufferReader::new(self.0))
    }
}

pub struct PerrDestinationIter<B>(BufferReader<B>);

impl<B: ByteSlice> Iterator for PerrDestinationIter<B> {
    type Item = PerrDestinationView<B>;

    fn next(&mut self) -> Option<Self::Item> {
        let have_ext_addr = self.0.peek::<PerrDestinationHeader>()?.flags.addr_ext();
        let dest_len = size_of::<PerrDestinationHeader>()
            + if have_ext_addr { size_of::<MacAddr>() } else { 0 }
            + size_of::<U16<LittleEndian>>();
        if self.0.bytes_remaining() < dest_len {
            return None;
        }
        let header = self.0.read()?;
        let ext_addr = if have_ext_addr { Some(self.0.read()?) } else { None };
        let reason_code = self.0.read()?;
        Some(PerrDestinationView { header, ext_addr, reason_code })
    }
}

pub fn parse_perr<B: ByteSlice + Default>(body: B) -> Result<PerrView<B>, FrameParseError> {
    let mut reader = BufferReader::new(body);
    let header = reader
        .read::<PerrHeader>()
        .ok_or(FrameParseError::InvalidFieldValue("PERR header too short"))?;
    Ok(PerrView { header, destinations: PerrDestinationListView(reader.into_remaining()) })
}

/// An owned per-destination entry, for building outgoing PERR elements.
#[derive(Clone, Copy, Debug)]
pub struct PerrDestination {
    pub dest_addr: MacAddr,
    pub ext_addr: Option<MacAddr>,
    pub hwmp_seqno: u32,
    pub reason_code: u16,
}

pub fn write_perr(
    buf: &mut Vec<u8>,
    element_ttl: u8,
    destinations: &[PerrDestination],
) -> Result<(), Error> {
    if destinations.is_empty() || destinations.len() > u8::MAX as usize {
        return Err(Error::WritingFrame("invalid number of PERR destinations"));
    }
    let body_len = size_of::<PerrHeader>()
        + destinations
            .iter()
            .map(|dest| {
                size_of::<PerrDestinationHeader>()
                    + dest.ext_addr.map_or(0, |_| size_of::<MacAddr>())
                    + size_of::<u16>()
            })
            .sum::<usize>();
    write_ie_hdr(buf, Id::PERR, body_len)?;
    buf.extend_from_slice(
        PerrHeader { element_ttl, num_destinations: destinations.len() as u8 }.as_bytes(),
    );
    for dest in destinations {
        let header = PerrDestinationHeader {
            flags: PerrDestinationFlags(0).with_addr_ext(dest.ext_addr.is_some()),
            dest_addr: dest.dest_addr,
            hwmp_seqno: U32::new(dest.hwmp_seqno),
        };
        buf.extend_from_slice(header.as_bytes());
        if let Some(ext_addr) = &dest.ext_addr {
            buf.extend_from_slice(ext_addr);
        }
        buf.extend_from_slice(&dest.reason_code.to_le_bytes());
    }
    Ok(())
}

// IEEE Std 802.11-2016, 9.4.2.102, Table 9-222
pub const MPM_PROTOCOL_MPM: u16 = 0;
pub const MPM_PROTOCOL_AMPE: u16 = 1;

/// Fixed part of the mesh peering management element.
#[repr(C, packed)]
#[derive(FromBytes, AsBytes, Unaligned, Clone, Copy, Debug)]
pub struct MpmHeader {
    pub protocol: U16<LittleEndian>,
    pub local_link_id: U16<LittleEndian>,
}

/// Optional PMKID part of the MPM element.
#[repr(C)]
#[derive(FromBytes, AsBytes, Unaligned, Clone, Copy, Debug, PartialEq, Eq)]
pub struct MpmPmk(pub [u8; 16]);

/// MPM element as carried in a mesh peering open frame.
pub struct MpmOpenView<B> {
    pub header: LayoutVerified<B, MpmHeader>,
    pub pmk: Option<LayoutVerified<B, MpmPmk>>,
}

/// MPM element as carried in a mesh peering confirm frame.
pub struct MpmConfirmView<B> {
    pub header: LayoutVerified<B, MpmHeader>,
    pub peer_link_id: LayoutVerified<B, U16<LittleEndian>>,
    pub pmk: Option<LayoutVerified<B, MpmPmk>>,
}

fn read_optional_pmk<B: ByteSlice>(
    reader: &mut BufferReader<B>,
) -> Result<Option<LayoutVerified<B, MpmPmk>>, FrameParseError> {
    match reader.bytes_remaining() {
        0 => Ok(None),
        n if n == size_of::<MpmPmk>() => {
            Ok(Some(reader.read().ok_or(FrameParseError::InvalidFieldValue("MPM PMK"))?))
        }
        _ => Err(FrameParseError::InvalidFieldValue("MPM trailing bytes")),
    }
}

pub fn parse_mpm_open<B: ByteSlice>(body: B) -> Result<MpmOpenView<B>, FrameParseError> {
    let mut reader = BufferReader::new(body);
    let header = reader
        .read::<MpmHeader>()
        .ok_or(FrameParseError::InvalidFieldValue("MPM header too short"))?;
    let pmk = read_optional_pmk(&mut reader)?;
    Ok(MpmOpenView { header, pmk })
}

pub fn parse_mpm_confirm<B: ByteSlice>(body: B) -> Result<MpmConfirmView<B>, FrameParseError> {
    let mut reader = BufferReader::new(body);
    let header = reader
        .read::<MpmHeader>()
        .ok_or(FrameParseError::InvalidFieldValue("MPM header too short"))?;
    let peer_link_id = reader
        .read::<U16<LittleEndian>>()
        .ok_or(FrameParseError::InvalidFieldValue("MPM peer link id"))?;
    let pmk = read_optional_pmk(&mut reader)?;
    Ok(MpmConfirmView { header, peer_link_id, pmk })
}

pub fn write_mpm_open(
    buf: &mut Vec<u8>,
    header: &MpmHeader,
    pmk: Option<&MpmPmk>,
) -> Result<(), Error> {
    let body_len = size_of::<MpmHeader>() + pmk.map_or(0, |_| size_of::<MpmPmk>());
    write_ie_hdr(buf, Id::MESH_PEERING_MGMT, body_len)?;
    buf.extend_from_slice(header.as_bytes());
    if let Some(pmk) = pmk {
        buf.extend_from_slice(pmk.as_bytes());
    }
    Ok(())
}

pub fn write_mpm_confirm(
    buf: &mut Vec<u8>,
    header: &MpmHeader,
    peer_link_id: u16,
    pmk: Option<&MpmPmk>,
) -> Result<(), Error> {
    let body_len =
        size_of::<MpmHeader>() + size_of::<u16>() + pmk.map_or(0, |_| size_of::<MpmPmk>());
    write_ie_hdr(buf, Id::MESH_PEERING_MGMT, body_len)?;
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(&peer_link_id.to_le_bytes());
    if let Some(pmk) = pmk {
        buf.extend_from_slice(pmk.as_bytes());
    }
    Ok(())
}

/// Strips the element header off an outgoing element buffer, returning `(id, body)`.
/// Intended for tests and for callers that embed elements in action frames.
pub fn split_ie(buf: &[u8]) -> Option<(Id, &[u8])> {
    let mut reader = BufferReader::new(buf);
    let header = reader.read::<Header>()?;
    let body = reader.read_bytes(header.body_len as usize)?;
    Some((header.id, body))
}
