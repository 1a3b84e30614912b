// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {crate::MacAddr, std::collections::HashMap};

/// IEEE Std 802.11-2016, 10.3.2.11.2: SNS1 counter space, one modulo-4096 sequence
/// number per receiver address.
const SEQ_NUM_MODULO: u32 = 4096;

/// Assigns transmit sequence numbers per peer.
#[derive(Default)]
pub struct SequenceManager {
    sns1: HashMap<MacAddr, u32>,
}

impl SequenceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_sns1(&mut self, sta_addr: &MacAddr) -> u32 {
        let seq = self.sns1.entry(*sta_addr).or_insert(0);
        *seq = (*seq + 1) % SEQ_NUM_MODULO;
        *seq
    }
}
