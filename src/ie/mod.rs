// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Information element ids, the element reader, and writers for the elements this
//! MLME produces. Mesh path selection elements live in the `mesh` submodule.

pub mod mesh;

use {
    crate::{buffer_reader::BufferReader, error::Error},
    std::mem::size_of,
    zerocopy::{AsBytes, ByteSlice, FromBytes, LayoutVerified, Unaligned},
};

/// IEEE Std 802.11-2016, 9.4.2.1, Table 9-77
#[repr(C)]
#[derive(FromBytes, AsBytes, Unaligned, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Id(pub u8);

impl Id {
    pub const SSID: Id = Id(0);
    pub const SUPPORTED_RATES: Id = Id(1);
    pub const DSSS_PARAM_SET: Id = Id(3);
    pub const TIM: Id = Id(5);
    pub const RSNE: Id = Id(48);
    pub const MESH_PEERING_MGMT: Id = Id(117);
    pub const PREQ: Id = Id(130);
    pub const PREP: Id = Id(131);
    pub const PERR: Id = Id(132);
}

#[repr(C, packed)]
#[derive(FromBytes, AsBytes, Unaligned, Clone, Copy)]
pub struct Header {
    pub id: Id,
    pub body_len: u8,
}

pub const SSID_MAX_LEN: usize = 32;
pub const SUPPORTED_RATES_MAX_LEN: usize = 8;

/// Iterates over the `(id, body)` pairs of a run of information elements.
/// Stops at the first element whose declared length overruns the buffer.
pub struct Reader<B>(BufferReader<B>);

impl<B: ByteSlice> Reader<B> {
    pub fn new(bytes: B) -> Self {
        Reader(BufferReader::new(bytes))
    }
}

impl<B: ByteSlice> Iterator for Reader<B> {
    type Item = (Id, B);

    fn next(&mut self) -> Option<Self::Item> {
        let header = self.0.peek::<Header>()?;
        let body_len = header.body_len as usize;
        if self.0.bytes_remaining() < size_of::<Header>() + body_len {
            return None;
        }
        let header = self.0.read::<Header>()?;
        let body = self.0.read_bytes(body_len)?;
        Some((header.id, body))
    }
}

/// Returns the body of the first element with the given id, if present.
pub fn find<B: ByteSlice>(elements: B, id: Id) -> Option<B> {
    Reader::new(elements).find(|(elem_id, _)| *elem_id == id).map(|(_, body)| body)
}

fn write_ie_hdr(buf: &mut Vec<u8>, id: Id, body_len: usize) -> Result<(), Error> {
    if body_len > u8::MAX as usize {
        return Err(Error::WritingFrame("element body exceeds 255 bytes"));
    }
    buf.extend_from_slice(Header { id, body_len: body_len as u8 }.as_bytes());
    Ok(())
}

pub fn write_ssid(buf: &mut Vec<u8>, ssid: &[u8]) -> Result<(), Error> {
    if ssid.len() > SSID_MAX_LEN {
        return Err(Error::WritingFrame("SSID longer than 32 bytes"));
    }
    write_ie_hdr(buf, Id::SSID, ssid.len())?;
    buf.extend_from_slice(ssid);
    Ok(())
}

pub fn write_supported_rates(buf: &mut Vec<u8>, rates: &[u8]) -> Result<(), Error> {
    if rates.is_empty() || rates.len() > SUPPORTED_RATES_MAX_LEN {
        return Err(Error::WritingFrame("invalid number of supported rates"));
    }
    write_ie_hdr(buf, Id::SUPPORTED_RATES, rates.len())?;
    buf.extend_from_slice(rates);
    Ok(())
}

pub fn write_dsss_param_set(buf: &mut Vec<u8>, channel: u8) -> Result<(), Error> {
    write_ie_hdr(buf, Id::DSSS_PARAM_SET, 1)?;
    buf.push(channel);
    Ok(())
}

// IEEE Std 802.11-2016, 9.4.2.6
#[repr(C, packed)]
#[derive(FromBytes, AsBytes, Unaligned, Clone, Copy)]
pub struct TimHeader {
    pub dtim_count: u8,
    pub dtim_period: u8,
    pub bmp_ctrl: u8,
}

pub struct TimView<B> {
    pub header: LayoutVerified<B, TimHeader>,
    pub bitmap: B,
}

pub fn parse_tim<B: ByteSlice + Default>(body: B) -> Option<TimView<B>> {
    let mut reader = BufferReader::new(body);
    let header = reader.read::<TimHeader>()?;
    let bitmap = reader.into_remaining();
    if bitmap.is_empty() {
        return None;
    }
    Some(TimView { header, bitmap })
}

pub fn write_tim(buf: &mut Vec<u8>, header: TimHeader, bitmap: &[u8]) -> Result<(), Error> {
    if bitmap.is_empty() {
        return Err(Error::WritingFrame("TIM bitmap is empty"));
    }
    write_ie_hdr(buf, Id::TIM, size_of::<TimHeader>() + bitmap.len())?;
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(bitmap);
    Ok(())
}
