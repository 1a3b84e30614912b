// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! HWMP path discovery: PREQ/PREP/PERR handling per IEEE Std 802.11-2016, 14.10.

use {
    super::{path_table::PathTable, path_table::PathUpdate, TimedEvent},
    crate::{
        error::Error,
        ie::{
            self,
            mesh::{
                parse_prep, parse_preq, write_prep, write_preq, PrepHeader, PrepTail, PreqFlags,
                PreqHeader, PreqMiddle, PreqPerTarget, PreqPerTargetFlags, PrepFlags,
            },
        },
        mac::{self, FrameControl, MeshActionHdr, SequenceControl},
        sequence::SequenceManager,
        timer::{EventId, Timer},
        MacAddr, BCAST_ADDR,
    },
    log::debug,
    std::{collections::HashMap, time::Duration},
    zerocopy::{AsBytes, ByteSlice},
};

// IEEE Std 802.11-2016, C.3: dot11MeshHWMPactivePathTimeout and dot11MeshTTL
// defaults.
const PATH_LIFETIME_TU: u32 = 5000;
const ELEMENT_TTL: u8 = 31;
// dot11MeshHWMPpreqMinInterval: the shortest gap between two PREQs for the same
// target, used as the retry deadline.
const PATH_DISCOVERY_RETRY_TU: u32 = 100;

fn times_tu(count: u32) -> Duration {
    Duration::from_micros(count as u64 * crate::time::TimeUnit::MICROS_PER_TIME_UNIT)
}

/// `b` is greater than `a` on the 32-bit sequence number ring iff their distance
/// is in the open interval (0, 2^31). The antipodal distance of exactly 2^31 is
/// not less-than in either direction.
pub fn hwmp_seqno_lt(a: u32, b: u32) -> bool {
    let distance = b.wrapping_sub(a);
    distance > 0 && distance < 1 << 31
}

/// Per-mesh-interface HWMP state: our own sequence number, the discovery id
/// counter and the set of outstanding path discoveries.
pub struct HwmpState {
    our_hwmp_seqno: u32,
    next_path_discovery_id: u32,
    discoveries: HashMap<MacAddr, EventId>,
}

impl HwmpState {
    pub fn new() -> Self {
        HwmpState { our_hwmp_seqno: 0, next_path_discovery_id: 0, discoveries: HashMap::new() }
    }

    pub fn our_hwmp_seqno(&self) -> u32 {
        self.our_hwmp_seqno
    }

    fn advance_seqno_past(&mut self, peer_seqno: u32) -> u32 {
        if hwmp_seqno_lt(self.our_hwmp_seqno, peer_seqno) {
            self.our_hwmp_seqno = peer_seqno;
        }
        self.our_hwmp_seqno = self.our_hwmp_seqno.wrapping_add(1);
        self.our_hwmp_seqno
    }

    fn next_seqno(&mut self) -> u32 {
        self.our_hwmp_seqno = self.our_hwmp_seqno.wrapping_add(1);
        self.our_hwmp_seqno
    }

    fn next_path_discovery_id(&mut self) -> u32 {
        self.next_path_discovery_id = self.next_path_discovery_id.wrapping_add(1);
        self.next_path_discovery_id
    }
}

impl Default for HwmpState {
    fn default() -> Self {
        HwmpState::new()
    }
}

/// Handles the information elements of one HWMP mesh action frame and returns
/// the frames to transmit in response.
#[allow(clippy::too_many_arguments)]
pub fn handle_hwmp_action<B: ByteSlice + Default>(
    state: &mut HwmpState,
    path_table: &mut PathTable,
    timer: &mut Timer<TimedEvent>,
    seq_mgr: &mut SequenceManager,
    self_addr: MacAddr,
    transmitter: MacAddr,
    transmitter_metric: u32,
    elements: B,
) -> Result<Vec<Vec<u8>>, Error> {
    let mut out_frames = vec![];
    for (id, body) in ie::Reader::new(elements) {
        match id {
            ie::Id::PREQ => {
                let preq = parse_preq(body)?;
                handle_preq(
                    state,
                    path_table,
                    timer,
                    seq_mgr,
                    self_addr,
                    transmitter,
                    transmitter_metric,
                    &preq,
                    &mut out_frames,
                )?;
            }
            ie::Id::PREP => {
                let prep = parse_prep(body)?;
                handle_prep(
                    state,
                    path_table,
                    timer,
                    transmitter,
                    transmitter_metric,
                    &prep,
                );
            }
            ie::Id::PERR => {
                let perr = ie::mesh::parse_perr(body)?;
                handle_perr(path_table, timer.now(), transmitter, perr);
            }
            other => debug!("unexpected element {:?} in HWMP action frame", other),
        }
    }
    Ok(out_frames)
}

#[allow(clippy::too_many_arguments)]
fn handle_preq<B: ByteSlice>(
    state: &mut HwmpState,
    path_table: &mut PathTable,
    timer: &mut Timer<TimedEvent>,
    seq_mgr: &mut SequenceManager,
    self_addr: MacAddr,
    transmitter: MacAddr,
    transmitter_metric: u32,
    preq: &ie::mesh::PreqView<B>,
    out_frames: &mut Vec<Vec<u8>>,
) -> Result<(), Error> {
    let now = timer.now();
    let lifetime = times_tu(preq.middle.lifetime.get());
    update_two_hop_paths(
        path_table,
        now,
        transmitter,
        transmitter_metric,
        lifetime,
        preq.header.originator_addr,
        preq.header.originator_hwmp_seqno.get(),
        preq.middle.metric.get(),
        preq.header.hop_count,
    );
    for target in preq.targets.iter() {
        if target.target_addr != self_addr {
            continue;
        }
        let target_seqno = state.advance_seqno_past(target.target_hwmp_seqno.get());
        let mut frame = vec![];
        write_prep_frame(
            &mut frame,
            seq_mgr,
            self_addr,
            transmitter,
            &PrepHeader {
                flags: PrepFlags(0),
                hop_count: 0,
                element_ttl: ELEMENT_TTL,
                target_addr: self_addr,
                target_hwmp_seqno: target_seqno.into(),
            },
            &PrepTail {
                // The reply accumulates its own metric on the return path; the
                // request's remaining lifetime is carried over unchanged.
                lifetime: preq.middle.lifetime,
                metric: 0.into(),
                originator_addr: preq.header.originator_addr,
                originator_hwmp_seqno: preq.header.originator_hwmp_seqno,
            },
        )?;
        out_frames.push(frame);
    }
    Ok(())
}

fn handle_prep<B: ByteSlice>(
    state: &mut HwmpState,
    path_table: &mut PathTable,
    timer: &mut Timer<TimedEvent>,
    transmitter: MacAddr,
    transmitter_metric: u32,
    prep: &ie::mesh::PrepView<B>,
) {
    let now = timer.now();
    let lifetime = times_tu(prep.tail.lifetime.get());
    update_two_hop_paths(
        path_table,
        now,
        transmitter,
        transmitter_metric,
        lifetime,
        prep.header.target_addr,
        prep.header.target_hwmp_seqno.get(),
        prep.tail.metric.get(),
        prep.header.hop_count,
    );
    let target = prep.header.target_addr;
    if let Some(timeout) = state.discoveries.remove(&target) {
        timer.cancel_event(timeout);
    }
}

fn handle_perr<B: ByteSlice>(
    path_table: &mut PathTable,
    now: crate::time::Time,
    transmitter: MacAddr,
    perr: ie::mesh::PerrView<B>,
) {
    for destination in perr.destinations {
        let dest = destination.header.dest_addr;
        let via_transmitter = path_table
            .path_to(&dest, now)
            .map_or(false, |entry| entry.next_hop == transmitter);
        if via_transmitter {
            path_table.remove(&dest);
        }
    }
}

/// Records the two entries every received PREQ/PREP yields: one for the
/// immediate transmitter, one for the frame's remote endpoint.
#[allow(clippy::too_many_arguments)]
fn update_two_hop_paths(
    path_table: &mut PathTable,
    now: crate::time::Time,
    transmitter: MacAddr,
    transmitter_metric: u32,
    lifetime: Duration,
    remote_addr: MacAddr,
    remote_seqno: u32,
    remote_metric: u32,
    remote_hop_count: u8,
) {
    path_table.update_hwmp_path(
        transmitter,
        PathUpdate {
            next_hop: transmitter,
            hwmp_seqno: None,
            lifetime,
            metric: transmitter_metric,
            hop_count: 1,
        },
        now,
    );
    if remote_addr != transmitter {
        path_table.update_hwmp_path(
            remote_addr,
            PathUpdate {
                next_hop: transmitter,
                hwmp_seqno: Some(remote_seqno),
                lifetime,
                metric: transmitter_metric.saturating_add(remote_metric),
                hop_count: remote_hop_count.saturating_add(1),
            },
            now,
        );
    }
}

/// Emits a broadcast PREQ for `target` and arms a retry deadline.
pub fn initiate_path_discovery(
    state: &mut HwmpState,
    timer: &mut Timer<TimedEvent>,
    seq_mgr: &mut SequenceManager,
    self_addr: MacAddr,
    target: MacAddr,
) -> Result<Vec<Vec<u8>>, Error> {
    let frame = write_preq_discovery_frame(state, seq_mgr, self_addr, target)?;
    arm_retry(state, timer, target)?;
    Ok(vec![frame])
}

/// A path discovery retry deadline fired. Re-emits the PREQ with fresh ids
/// unless a path to the target has been established in the meantime.
pub fn handle_hwmp_timeout(
    state: &mut HwmpState,
    path_table: &mut PathTable,
    timer: &mut Timer<TimedEvent>,
    seq_mgr: &mut SequenceManager,
    self_addr: MacAddr,
    target: MacAddr,
) -> Result<Vec<Vec<u8>>, Error> {
    if !state.discoveries.contains_key(&target) {
        return Ok(vec![]);
    }
    if path_table.path_to(&target, timer.now()).is_some() {
        state.discoveries.remove(&target);
        return Ok(vec![]);
    }
    let frame = write_preq_discovery_frame(state, seq_mgr, self_addr, target)?;
    arm_retry(state, timer, target)?;
    Ok(vec![frame])
}

fn arm_retry(
    state: &mut HwmpState,
    timer: &mut Timer<TimedEvent>,
    target: MacAddr,
) -> Result<(), Error> {
    let timeout = timer
        .schedule_after(times_tu(PATH_DISCOVERY_RETRY_TU), TimedEvent::PathDiscoveryRetry(target))?;
    if let Some(old) = state.discoveries.insert(target, timeout) {
        timer.cancel_event(old);
    }
    Ok(())
}

fn write_preq_discovery_frame(
    state: &mut HwmpState,
    seq_mgr: &mut SequenceManager,
    self_addr: MacAddr,
    target: MacAddr,
) -> Result<Vec<u8>, Error> {
    let path_discovery_id = state.next_path_discovery_id();
    let originator_hwmp_seqno = state.next_seqno();
    let mut frame = vec![];
    write_mesh_action_hdr(&mut frame, seq_mgr, BCAST_ADDR, self_addr, BCAST_ADDR);
    write_preq(
        &mut frame,
        &PreqHeader {
            flags: PreqFlags(0),
            hop_count: 0,
            element_ttl: ELEMENT_TTL,
            path_discovery_id: path_discovery_id.into(),
            originator_addr: self_addr,
            originator_hwmp_seqno: originator_hwmp_seqno.into(),
        },
        None,
        &PreqMiddle { lifetime: PATH_LIFETIME_TU.into(), metric: 0.into(), target_count: 1 },
        &[PreqPerTarget {
            // The target's current sequence number is unknown.
            flags: PreqPerTargetFlags(0).with_usn(true),
            target_addr: target,
            target_hwmp_seqno: 0.into(),
        }],
    )?;
    Ok(frame)
}

fn write_prep_frame(
    buf: &mut Vec<u8>,
    seq_mgr: &mut SequenceManager,
    self_addr: MacAddr,
    next_hop: MacAddr,
    header: &PrepHeader,
    tail: &PrepTail,
) -> Result<(), Error> {
    write_mesh_action_hdr(buf, seq_mgr, next_hop, self_addr, tail.originator_addr);
    write_prep(buf, header, None, tail)
}

fn write_mesh_action_hdr(
    buf: &mut Vec<u8>,
    seq_mgr: &mut SequenceManager,
    addr1: MacAddr,
    addr2: MacAddr,
    addr3: MacAddr,
) {
    let frame_ctrl = FrameControl(0)
        .with_frame_type(mac::FRAME_TYPE_MGMT)
        .with_frame_subtype(mac::MGMT_SUBTYPE_ACTION);
    let mgmt_hdr = mac::MgmtHdr {
        frame_ctrl,
        duration: 0,
        addr1,
        addr2,
        addr3,
        seq_ctrl: SequenceControl(0).with_seq_num(seq_mgr.next_sns1(&addr1) as u16),
    };
    buf.extend_from_slice(mgmt_hdr.as_bytes());
    let action_hdr = MeshActionHdr {
        category: mac::ACTION_CATEGORY_MESH,
        action: mac::MESH_ACTION_HWMP_PATH_SELECTION,
    };
    buf.extend_from_slice(action_hdr.as_bytes());
}
