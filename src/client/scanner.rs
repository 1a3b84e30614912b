// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Passive and active channel scans. One scan at a time; discovered BSS are
//! deduplicated by BSSID with first-seen fields retained.

use {
    super::{Context, TimedEvent},
    crate::{
        device::{Cbw, Channel, Device, RxInfo},
        error::Error,
        ie,
        mac::{self, MacFrame, MgmtBody},
        service::{
            BssDescription, BssType, MlmeEvent, ScanConfirm, ScanRequest, ScanResultCode, ScanType,
        },
        time::TimeUnit,
        MacAddr,
    },
    log::{error, warn},
    std::time::Duration,
    thiserror::Error,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScanError {
    #[error("scanner is busy")]
    Busy,
    #[error("empty channel list")]
    EmptyChannelList,
    #[error("max channel time < min channel time")]
    MaxChannelTimeLtMin,
    #[error("SSID too long")]
    SsidTooLong,
}

impl From<&ScanError> for ScanResultCode {
    fn from(e: &ScanError) -> Self {
        match e {
            ScanError::Busy => ScanResultCode::NotSupported,
            ScanError::EmptyChannelList
            | ScanError::MaxChannelTimeLtMin
            | ScanError::SsidTooLong => ScanResultCode::InvalidArgs,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Phase {
    MinChannelTime,
    ProbeDelay,
    MaxChannelTime,
}

struct OngoingScan {
    req: ScanRequest,
    channel_index: usize,
    phase: Phase,
    // Insertion order is report order; the first sighting of a BSSID wins.
    results: Vec<BssDescription>,
}

pub struct Scanner {
    iface_mac: MacAddr,
    ongoing: Option<OngoingScan>,
}

impl Scanner {
    pub fn new(iface_mac: MacAddr) -> Self {
        Scanner { iface_mac, ongoing: None }
    }

    pub fn is_scanning(&self) -> bool {
        self.ongoing.is_some()
    }

    /// Starts a scan, or immediately confirms failure for invalid arguments or
    /// when a scan is already running.
    pub fn on_sme_scan<D: Device>(&mut self, ctx: &mut Context<D>, req: ScanRequest) {
        if let Err(e) = self.try_start(ctx, req) {
            warn!("scan not started: {}", e);
        }
    }

    fn try_start<D: Device>(
        &mut self,
        ctx: &mut Context<D>,
        req: ScanRequest,
    ) -> Result<(), Error> {
        let txn_id = req.txn_id;
        if let Err(e) = validate(&req, self.is_scanning()) {
            send_scan_confirm(ctx, txn_id, (&e).into(), vec![]);
            return Err(e.into());
        }
        // The list is non-empty; validated above.
        if let Err(e) = ctx.device.set_channel(Channel::new(req.channel_list[0], Cbw::Cbw20)) {
            send_scan_confirm(ctx, txn_id, ScanResultCode::InternalError, vec![]);
            return Err(e);
        }
        ctx.timer.schedule_after(times_tu(req.min_channel_time), TimedEvent::Scanner)?;
        self.ongoing =
            Some(OngoingScan { req, channel_index: 0, phase: Phase::MinChannelTime, results: vec![] });
        Ok(())
    }

    /// Folds a received beacon or probe response into the result set.
    pub fn handle_mac_frame(&mut self, frame: &[u8], rx_info: RxInfo) {
        let ongoing = match &mut self.ongoing {
            Some(ongoing) => ongoing,
            None => return,
        };
        let (mgmt_hdr, body) = match MacFrame::parse(frame) {
            Some(MacFrame::Mgmt { mgmt_hdr, body }) => (mgmt_hdr, body),
            _ => return,
        };
        let subtype = { mgmt_hdr.frame_ctrl }.frame_subtype();
        match MgmtBody::parse(subtype, body) {
            Some(MgmtBody::Beacon { bcn_hdr, elements })
            | Some(MgmtBody::ProbeResp { bcn_hdr, elements }) => {
                let bssid = mgmt_hdr.addr3;
                if !ongoing.results.iter().any(|bss| bss.bssid == bssid) {
                    ongoing.results.push(bss_description(bssid, &bcn_hdr, elements, rx_info));
                }
            }
            _ => (),
        }
    }

    pub fn handle_timeout<D: Device>(&mut self, ctx: &mut Context<D>) {
        let mut ongoing = match self.ongoing.take() {
            Some(ongoing) => ongoing,
            None => return,
        };
        match ongoing.phase {
            Phase::MinChannelTime => {
                let next = if ongoing.req.scan_type == ScanType::Active {
                    (Phase::ProbeDelay, times_tu(ongoing.req.probe_delay))
                } else {
                    (Phase::MaxChannelTime, remaining_max_time(&ongoing.req))
                };
                self.continue_scan(ctx, ongoing, next.0, next.1);
            }
            Phase::ProbeDelay => {
                self.send_probe_req(ctx, &ongoing.req.ssid);
                let duration = remaining_max_time(&ongoing.req);
                self.continue_scan(ctx, ongoing, Phase::MaxChannelTime, duration);
            }
            Phase::MaxChannelTime => {
                let next_index = ongoing.channel_index + 1;
                if next_index >= ongoing.req.channel_list.len() {
                    send_scan_confirm(
                        ctx,
                        ongoing.req.txn_id,
                        ScanResultCode::Success,
                        ongoing.results,
                    );
                    return;
                }
                ongoing.channel_index = next_index;
                let channel = Channel::new(ongoing.req.channel_list[next_index], Cbw::Cbw20);
                if let Err(e) = ctx.device.set_channel(channel) {
                    error!("failed switching scan channel: {}", e);
                    send_scan_confirm(ctx, ongoing.req.txn_id, ScanResultCode::InternalError, vec![]);
                    return;
                }
                let duration = times_tu(ongoing.req.min_channel_time);
                self.continue_scan(ctx, ongoing, Phase::MinChannelTime, duration);
            }
        }
    }

    fn continue_scan<D: Device>(
        &mut self,
        ctx: &mut Context<D>,
        mut ongoing: OngoingScan,
        phase: Phase,
        duration: Duration,
    ) {
        match ctx.timer.schedule_after(duration, TimedEvent::Scanner) {
            Ok(_id) => {
                ongoing.phase = phase;
                self.ongoing = Some(ongoing);
            }
            Err(e) => {
                error!("failed arming scan timer: {}", e);
                send_scan_confirm(ctx, ongoing.req.txn_id, ScanResultCode::InternalError, vec![]);
            }
        }
    }

    fn send_probe_req<D: Device>(&self, ctx: &mut Context<D>, ssid: &[u8]) {
        let mut probe_req = vec![];
        match super::write_probe_req_frame(&mut probe_req, self.iface_mac, ssid, &mut ctx.seq_mgr) {
            Ok(()) => {
                if let Err(e) = ctx.device.send_wlan(probe_req) {
                    error!("failed sending probe request: {}", e);
                }
            }
            Err(e) => error!("failed writing probe request: {}", e),
        }
    }
}

fn validate(req: &ScanRequest, busy: bool) -> Result<(), ScanError> {
    if busy {
        Err(ScanError::Busy)
    } else if req.channel_list.is_empty() {
        Err(ScanError::EmptyChannelList)
    } else if req.max_channel_time < req.min_channel_time {
        Err(ScanError::MaxChannelTimeLtMin)
    } else if req.ssid.len() > ie::SSID_MAX_LEN {
        Err(ScanError::SsidTooLong)
    } else {
        Ok(())
    }
}

fn times_tu(count: u32) -> Duration {
    Duration::from_micros(count as u64 * TimeUnit::MICROS_PER_TIME_UNIT)
}

fn remaining_max_time(req: &ScanRequest) -> Duration {
    times_tu(req.max_channel_time.saturating_sub(req.min_channel_time))
}

fn send_scan_confirm<D: Device>(
    ctx: &mut Context<D>,
    txn_id: u64,
    result_code: ScanResultCode,
    bss_description_set: Vec<BssDescription>,
) {
    let conf = ScanConfirm { txn_id, result_code, bss_description_set };
    if let Err(e) = ctx.device.send_mlme_event(MlmeEvent::ScanConf(conf)) {
        error!("failed sending scan confirm: {}", e);
    }
}

fn bss_description<B: zerocopy::ByteSlice>(
    bssid: MacAddr,
    bcn_hdr: &mac::BeaconHdr,
    elements: B,
    rx_info: RxInfo,
) -> BssDescription {
    let mut ssid = vec![];
    let mut rates = vec![];
    let mut channel = rx_info.channel.primary;
    let mut rsne = None;
    for (id, body) in ie::Reader::new(&elements[..]) {
        match id {
            ie::Id::SSID => ssid = body.to_vec(),
            ie::Id::SUPPORTED_RATES => rates = body.to_vec(),
            ie::Id::DSSS_PARAM_SET => {
                if let Some(&chan) = body.first() {
                    channel = chan;
                }
            }
            ie::Id::RSNE => rsne = Some(body.to_vec()),
            _ => (),
        }
    }
    let capability_info = bcn_hdr.capabilities.get();
    let bss_type = if mac::CapabilityInfo(capability_info).ess() {
        BssType::Infrastructure
    } else {
        BssType::Independent
    };
    BssDescription {
        bssid,
        ssid,
        bss_type,
        beacon_period: bcn_hdr.beacon_interval.get(),
        capability_info,
        channel,
        rssi_dbm: rx_info.rssi_dbm,
        snr_db: rx_info.snr_db,
        rates,
        rsne,
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            client::test_helpers,
            device::FakeDevice,
            test_utils::{self, assert_variant},
            timer::FakeScheduler,
        },
    };

    const IFACE_MAC: MacAddr = [7; 6];
    const BSSID: MacAddr = [0x62, 0x73, 0x73, 0x62, 0x73, 0x73];
    const BSSID2: MacAddr = [0x26, 0x37, 0x37, 0x26, 0x37, 0x37];

    struct MockObjects {
        ctx: Context<FakeDevice>,
        device: FakeDevice,
        scheduler: FakeScheduler,
    }

    impl MockObjects {
        fn new() -> Self {
            let (ctx, device, scheduler) = test_helpers::make_ctx();
            MockObjects { ctx, device, scheduler }
        }
    }

    fn passive_request() -> ScanRequest {
        ScanRequest {
            txn_id: 1337,
            scan_type: ScanType::Passive,
            channel_list: vec![6],
            ssid: vec![],
            probe_delay: 0,
            min_channel_time: 100,
            max_channel_time: 300,
        }
    }

    fn rx_info(channel: u8) -> RxInfo {
        RxInfo { channel: Channel::new(channel, Cbw::Cbw20), rssi_dbm: -40, snr_db: 30 }
    }

    fn advance_and_deliver(scanner: &mut Scanner, m: &mut MockObjects, duration: Duration) {
        m.scheduler.advance(duration);
        let now = m.ctx.timer.now();
        while let Some((_id, event)) = m.ctx.timer.next_due(now) {
            assert_eq!(event, TimedEvent::Scanner);
            scanner.handle_timeout(&mut m.ctx);
        }
    }

    #[test]
    fn empty_channel_list_rejected() {
        let mut m = MockObjects::new();
        let mut scanner = Scanner::new(IFACE_MAC);
        let req = ScanRequest { channel_list: vec![], ..passive_request() };
        scanner.on_sme_scan(&mut m.ctx, req);

        let event = m.device.next_mlme_event().expect("no scan confirm");
        assert_variant!(event, MlmeEvent::ScanConf(conf) => {
            assert_eq!(conf.txn_id, 1337);
            assert_eq!(conf.result_code, ScanResultCode::InvalidArgs);
            assert!(conf.bss_description_set.is_empty());
        });
        assert!(!scanner.is_scanning());
    }

    #[test]
    fn min_greater_than_max_rejected() {
        let mut m = MockObjects::new();
        let mut scanner = Scanner::new(IFACE_MAC);
        let req = ScanRequest { min_channel_time: 300, max_channel_time: 100, ..passive_request() };
        scanner.on_sme_scan(&mut m.ctx, req);

        let event = m.device.next_mlme_event().expect("no scan confirm");
        assert_variant!(event, MlmeEvent::ScanConf(conf) => {
            assert_eq!(conf.result_code, ScanResultCode::InvalidArgs);
        });
    }

    #[test]
    fn scan_while_busy_rejected() {
        let mut m = MockObjects::new();
        let mut scanner = Scanner::new(IFACE_MAC);
        scanner.on_sme_scan(&mut m.ctx, passive_request());
        assert!(m.device.next_mlme_event().is_none());

        scanner.on_sme_scan(&mut m.ctx, ScanRequest { txn_id: 1338, ..passive_request() });
        let event = m.device.next_mlme_event().expect("no scan confirm");
        assert_variant!(event, MlmeEvent::ScanConf(conf) => {
            assert_eq!(conf.txn_id, 1338);
            assert_eq!(conf.result_code, ScanResultCode::NotSupported);
        });
        // The original scan is unaffected.
        assert!(scanner.is_scanning());
    }

    #[test]
    fn passive_scan_collects_and_dedupes_beacons() {
        let mut m = MockObjects::new();
        let mut scanner = Scanner::new(IFACE_MAC);
        scanner.on_sme_scan(&mut m.ctx, passive_request());
        assert_eq!(m.device.channel().primary, 6);

        let beacon = test_utils::beacon_frame(BSSID, b"ssid", 6);
        scanner.handle_mac_frame(&beacon, rx_info(6));
        // Same BSSID again: first sighting wins.
        scanner.handle_mac_frame(&beacon, rx_info(6));
        let beacon2 = test_utils::beacon_frame(BSSID2, b"other", 6);
        scanner.handle_mac_frame(&beacon2, rx_info(6));

        advance_and_deliver(&mut scanner, &mut m, times_tu(100));
        assert!(scanner.is_scanning());
        advance_and_deliver(&mut scanner, &mut m, times_tu(200));
        assert!(!scanner.is_scanning());

        let event = m.device.next_mlme_event().expect("no scan confirm");
        assert_variant!(event, MlmeEvent::ScanConf(conf) => {
            assert_eq!(conf.result_code, ScanResultCode::Success);
            assert_eq!(conf.bss_description_set.len(), 2);
            assert_eq!(conf.bss_description_set[0].bssid, BSSID);
            assert_eq!(conf.bss_description_set[0].ssid, b"ssid".to_vec());
            assert_eq!(conf.bss_description_set[0].channel, 6);
            assert_eq!(conf.bss_description_set[0].rssi_dbm, -40);
            assert_eq!(conf.bss_description_set[0].snr_db, 30);
            assert_eq!(conf.bss_description_set[1].bssid, BSSID2);
        });
    }

    #[test]
    fn multi_channel_scan_advances_channels() {
        let mut m = MockObjects::new();
        let mut scanner = Scanner::new(IFACE_MAC);
        let req = ScanRequest { channel_list: vec![1, 6, 11], ..passive_request() };
        scanner.on_sme_scan(&mut m.ctx, req);
        assert_eq!(m.device.channel().primary, 1);

        advance_and_deliver(&mut scanner, &mut m, times_tu(300));
        assert_eq!(m.device.channel().primary, 6);
        advance_and_deliver(&mut scanner, &mut m, times_tu(300));
        assert_eq!(m.device.channel().primary, 11);
        advance_and_deliver(&mut scanner, &mut m, times_tu(300));
        assert!(!scanner.is_scanning());
        let event = m.device.next_mlme_event().expect("no scan confirm");
        assert_variant!(event, MlmeEvent::ScanConf(conf) => {
            assert_eq!(conf.result_code, ScanResultCode::Success);
        });
    }

    #[test]
    fn active_scan_emits_probe_request_after_probe_delay() {
        let mut m = MockObjects::new();
        let mut scanner = Scanner::new(IFACE_MAC);
        let req = ScanRequest {
            scan_type: ScanType::Active,
            ssid: b"ssid".to_vec(),
            probe_delay: 5,
            ..passive_request()
        };
        scanner.on_sme_scan(&mut m.ctx, req);

        advance_and_deliver(&mut scanner, &mut m, times_tu(100));
        assert!(m.device.state().wlan_queue.is_empty());
        advance_and_deliver(&mut scanner, &mut m, times_tu(5));
        let frames: Vec<Vec<u8>> = m.device.state().wlan_queue.drain(..).collect();
        assert_eq!(frames.len(), 1);
        // Probe request to the broadcast address carrying the scanned SSID.
        assert_eq!(frames[0][4..10], crate::BCAST_ADDR);
        assert!(frames[0].windows(4).any(|w| w == b"ssid"));

        advance_and_deliver(&mut scanner, &mut m, times_tu(200));
        assert!(!scanner.is_scanning());
    }

    #[test]
    fn frames_ignored_while_idle() {
        let mut m = MockObjects::new();
        let mut scanner = Scanner::new(IFACE_MAC);
        let beacon = test_utils::beacon_frame(BSSID, b"ssid", 6);
        scanner.handle_mac_frame(&beacon, rx_info(6));
        assert!(m.device.next_mlme_event().is_none());
    }
}
