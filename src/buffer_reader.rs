// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    std::mem::size_of,
    zerocopy::{ByteSlice, FromBytes, LayoutVerified, Unaligned},
};

/// Parses typed views out of a borrowed byte slice, front to back. Reads past the end
/// return `None` and leave the reader drained; callers treat that as a malformed frame.
pub struct BufferReader<B> {
    buf: Option<B>,
    bytes_read: usize,
}

impl<B: ByteSlice> BufferReader<B> {
    pub fn new(bytes: B) -> Self {
        Self { buf: Some(bytes), bytes_read: 0 }
    }

    pub fn read<T: FromBytes + Unaligned>(&mut self) -> Option<LayoutVerified<B, T>> {
        if self.bytes_remaining() < size_of::<T>() {
            return None;
        }
        let buf = self.buf.take()?;
        let (parsed, rest) = LayoutVerified::new_unaligned_from_prefix(buf)?;
        self.buf = Some(rest);
        self.bytes_read += size_of::<T>();
        Some(parsed)
    }

    pub fn peek<T: FromBytes + Unaligned>(&self) -> Option<LayoutVerified<&[u8], T>> {
        let buf = self.buf.as_ref()?;
        LayoutVerified::new_unaligned_from_prefix(&buf[..]).map(|(parsed, _rest)| parsed)
    }

    pub fn read_value<T: FromBytes + Unaligned + Copy>(&mut self) -> Option<T> {
        self.read::<T>().map(|parsed| *parsed)
    }

    pub fn read_bytes(&mut self, len: usize) -> Option<B> {
        if self.bytes_remaining() < len {
            return None;
        }
        let buf = self.buf.take()?;
        let (head, rest) = buf.split_at(len);
        self.buf = Some(rest);
        self.bytes_read += len;
        Some(head)
    }

    pub fn bytes_remaining(&self) -> usize {
        self.buf.as_ref().map_or(0, |buf| buf.len())
    }

    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }

    pub fn into_remaining(self) -> B
    where
        B: Default,
    {
        self.buf.unwrap_or_default()
    }

    pub fn peek_remaining(&self) -> &[u8] {
        self.buf.as_ref().map_or(&[], |buf| &buf[..])
    }
}
