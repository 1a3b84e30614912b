// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Client station: join, authenticate, associate and the associated data path.

pub mod channel_scheduler;
pub mod scanner;

use {
    crate::{
        device::{AssocContext, Cbw, Channel, Device, Key, LinkStatus, RxInfo},
        error::Error,
        ie,
        mac::{
            self, AssocRespHdr, AuthHdr, DataHdr, DeauthHdr, DisassocHdr, FrameControl, LlcHdr,
            MacFrame, MgmtBody, MgmtHdr, SequenceControl, StatusCode,
        },
        sequence::SequenceManager,
        service::{
            AssociateConfirm, AssociateRequest, AssociateResultCode, AuthenticateConfirm,
            AuthenticateRequest, AuthenticateResultCode, AuthenticationType,
            DeauthenticateConfirm, DeauthenticateIndication, DeauthenticateRequest,
            DisassociateIndication, EapolConfirm, EapolIndication, EapolRequest, EapolResultCode,
            JoinConfirm, JoinRequest, JoinResultCode, MlmeEvent, MlmeRequest,
            SetKeysRequest,
        },
        time::TimeUnit,
        timer::{EventId, Scheduler, Timer},
        MacAddr, BCAST_ADDR,
    },
    channel_scheduler::{ChannelListener, ChannelScheduler, OffChannelRequest},
    log::{debug, error, warn},
    num_traits::FromPrimitive,
    scanner::Scanner,
    std::mem,
    zerocopy::AsBytes,
};

/// IEEE Std 802.11-2016, 11.3.5.3: no dedicated association timeout arrives over
/// the service transport; a fixed number of beacon periods is used instead.
const ASSOC_TIMEOUT_BCN_PERIODS: u32 = 20;

pub const DEFAULT_CLIENT_RATES: [u8; 8] = [0x82, 0x84, 0x8b, 0x96, 0x24, 0x30, 0x48, 0x6c];

/// Timed events of the client MLME, dispatched by `ClientMlme::handle_timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimedEvent {
    ChannelScheduler,
    Scanner,
    Join,
    Authenticating,
    Associating,
}

/// Everything the client state machines need access to: the device, the interface
/// timer and the transmit sequence numbers.
pub struct Context<D> {
    pub device: D,
    pub timer: Timer<TimedEvent>,
    pub seq_mgr: SequenceManager,
}

fn send_mlme<D: Device>(ctx: &mut Context<D>, event: MlmeEvent) {
    if let Err(e) = ctx.device.send_mlme_event(event) {
        error!("failed sending MLME event: {}", e);
    }
}

// --- Frame writers ---

pub fn write_open_auth_frame(
    buf: &mut Vec<u8>,
    bssid: MacAddr,
    client_addr: MacAddr,
    seq_mgr: &mut SequenceManager,
) -> Result<(), Error> {
    let frame_ctrl = FrameControl(0)
        .with_frame_type(mac::FRAME_TYPE_MGMT)
        .with_frame_subtype(mac::MGMT_SUBTYPE_AUTH);
    let seq_ctrl = SequenceControl(0).with_seq_num(seq_mgr.next_sns1(&bssid) as u16);
    buf.extend_from_slice(mac::mgmt_hdr_to_ap(frame_ctrl, bssid, client_addr, seq_ctrl).as_bytes());
    let auth_hdr = AuthHdr {
        auth_alg_num: mac::AUTH_ALGORITHM_OPEN.into(),
        auth_txn_seq_num: 1.into(),
        status_code: 0.into(),
    };
    buf.extend_from_slice(auth_hdr.as_bytes());
    Ok(())
}

pub fn write_deauth_frame(
    buf: &mut Vec<u8>,
    bssid: MacAddr,
    client_addr: MacAddr,
    reason_code: u16,
    seq_mgr: &mut SequenceManager,
) -> Result<(), Error> {
    let frame_ctrl = FrameControl(0)
        .with_frame_type(mac::FRAME_TYPE_MGMT)
        .with_frame_subtype(mac::MGMT_SUBTYPE_DEAUTH);
    let seq_ctrl = SequenceControl(0).with_seq_num(seq_mgr.next_sns1(&bssid) as u16);
    buf.extend_from_slice(mac::mgmt_hdr_to_ap(frame_ctrl, bssid, client_addr, seq_ctrl).as_bytes());
    buf.extend_from_slice(DeauthHdr { reason_code: reason_code.into() }.as_bytes());
    Ok(())
}

pub fn write_assoc_req_frame(
    buf: &mut Vec<u8>,
    bssid: MacAddr,
    client_addr: MacAddr,
    seq_mgr: &mut SequenceManager,
    capability_info: u16,
    ssid: &[u8],
    rates: &[u8],
    rsne: Option<&[u8]>,
) -> Result<(), Error> {
    let frame_ctrl = FrameControl(0)
        .with_frame_type(mac::FRAME_TYPE_MGMT)
        .with_frame_subtype(mac::MGMT_SUBTYPE_ASSOC_REQ);
    let seq_ctrl = SequenceControl(0).with_seq_num(seq_mgr.next_sns1(&bssid) as u16);
    buf.extend_from_slice(mac::mgmt_hdr_to_ap(frame_ctrl, bssid, client_addr, seq_ctrl).as_bytes());
    let assoc_req_hdr = mac::AssocReqHdr {
        capabilities: capability_info.into(),
        listen_interval: 0.into(),
    };
    buf.extend_from_slice(assoc_req_hdr.as_bytes());
    ie::write_ssid(buf, ssid)?;
    ie::write_supported_rates(buf, rates)?;
    if let Some(rsne) = rsne {
        buf.extend_from_slice(&[ie::Id::RSNE.0, rsne.len() as u8]);
        buf.extend_from_slice(rsne);
    }
    Ok(())
}

pub fn write_keep_alive_resp_frame(
    buf: &mut Vec<u8>,
    bssid: MacAddr,
    client_addr: MacAddr,
    seq_mgr: &mut SequenceManager,
) -> Result<(), Error> {
    let data_hdr = DataHdr {
        frame_ctrl: FrameControl(0)
            .with_frame_type(mac::FRAME_TYPE_DATA)
            .with_frame_subtype(mac::BITMASK_NULL)
            .with_to_ds(true),
        duration: 0,
        addr1: bssid,
        addr2: client_addr,
        addr3: bssid,
        seq_ctrl: SequenceControl(0).with_seq_num(seq_mgr.next_sns1(&bssid) as u16),
    };
    buf.extend_from_slice(data_hdr.as_bytes());
    Ok(())
}

pub fn write_probe_req_frame(
    buf: &mut Vec<u8>,
    client_addr: MacAddr,
    ssid: &[u8],
    seq_mgr: &mut SequenceManager,
) -> Result<(), Error> {
    let frame_ctrl = FrameControl(0)
        .with_frame_type(mac::FRAME_TYPE_MGMT)
        .with_frame_subtype(mac::MGMT_SUBTYPE_PROBE_REQ);
    let seq_ctrl = SequenceControl(0).with_seq_num(seq_mgr.next_sns1(&BCAST_ADDR) as u16);
    let mgmt_hdr = MgmtHdr {
        frame_ctrl,
        duration: 0,
        addr1: BCAST_ADDR,
        addr2: client_addr,
        addr3: BCAST_ADDR,
        seq_ctrl,
    };
    buf.extend_from_slice(mgmt_hdr.as_bytes());
    ie::write_ssid(buf, ssid)?;
    ie::write_supported_rates(buf, &DEFAULT_CLIENT_RATES)?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn write_data_frame(
    buf: &mut Vec<u8>,
    seq_mgr: &mut SequenceManager,
    bssid: MacAddr,
    src: MacAddr,
    dst: MacAddr,
    protected: bool,
    ether_type: u16,
    payload: &[u8],
) -> Result<(), Error> {
    let data_hdr = DataHdr {
        frame_ctrl: FrameControl(0)
            .with_frame_type(mac::FRAME_TYPE_DATA)
            .with_to_ds(true)
            .with_protected(protected),
        duration: 0,
        addr1: bssid,
        addr2: src,
        addr3: dst,
        seq_ctrl: SequenceControl(0).with_seq_num(seq_mgr.next_sns1(&bssid) as u16),
    };
    buf.extend_from_slice(data_hdr.as_bytes());
    buf.extend_from_slice(mac::llc_snap_hdr(ether_type).as_bytes());
    buf.extend_from_slice(payload);
    Ok(())
}

pub fn write_eth_frame(
    buf: &mut Vec<u8>,
    dst: MacAddr,
    src: MacAddr,
    ether_type: u16,
    payload: &[u8],
) -> Result<(), Error> {
    let hdr = mac::EthernetIIHdr { da: dst, sa: src, ether_type: ether_type.into() };
    buf.extend_from_slice(hdr.as_bytes());
    buf.extend_from_slice(payload);
    Ok(())
}

// --- Station state machine ---

/// The part of a `BssDescription` the station needs after joining.
#[derive(Debug, Clone)]
struct JoinedBss {
    bssid: MacAddr,
    ssid: Vec<u8>,
    beacon_period: TimeUnit,
    rates: Vec<u8>,
    protected: bool,
}

impl JoinedBss {
    fn from_description(bss: &crate::service::BssDescription) -> Self {
        JoinedBss {
            bssid: bss.bssid,
            ssid: bss.ssid.clone(),
            beacon_period: TimeUnit(bss.beacon_period),
            rates: bss.rates.clone(),
            protected: bss.rsne.is_some(),
        }
    }
}

#[derive(Debug)]
enum State {
    Unjoined,
    Joining { bss: JoinedBss, timeout: EventId },
    Joined { bss: JoinedBss },
    Authenticating { bss: JoinedBss, timeout: EventId },
    Authenticated { bss: JoinedBss },
    Associating { bss: JoinedBss, timeout: EventId },
    Associated { bss: JoinedBss, aid: u16, controlled_port_open: bool },
}

pub struct Station {
    iface_mac: MacAddr,
    state: State,
}

impl Station {
    pub fn new(iface_mac: MacAddr) -> Self {
        Station { iface_mac, state: State::Unjoined }
    }

    fn bss(&self) -> Option<&JoinedBss> {
        match &self.state {
            State::Unjoined => None,
            State::Joining { bss, .. }
            | State::Joined { bss }
            | State::Authenticating { bss, .. }
            | State::Authenticated { bss }
            | State::Associating { bss, .. }
            | State::Associated { bss, .. } => Some(bss),
        }
    }

    fn cancel_state_timer<D: Device>(&self, ctx: &mut Context<D>) {
        match &self.state {
            State::Joining { timeout, .. }
            | State::Authenticating { timeout, .. }
            | State::Associating { timeout, .. } => ctx.timer.cancel_event(*timeout),
            _ => (),
        }
    }

    /// A later join resets the station to `Joining` without tearing down any
    /// existing flow with the old BSS.
    pub fn on_sme_join<D: Device>(
        &mut self,
        ctx: &mut Context<D>,
        req: JoinRequest,
    ) -> Result<(), Error> {
        self.cancel_state_timer(ctx);
        let bss = JoinedBss::from_description(&req.selected_bss);
        let duration = bss.beacon_period.into_duration_times(req.join_failure_timeout);
        match ctx.timer.schedule_after(duration, TimedEvent::Join) {
            Ok(timeout) => {
                self.state = State::Joining { bss, timeout };
                Ok(())
            }
            Err(e) => {
                self.state = State::Unjoined;
                Err(e)
            }
        }
    }

    pub fn on_sme_authenticate<D: Device>(
        &mut self,
        ctx: &mut Context<D>,
        req: AuthenticateRequest,
    ) -> Result<(), Error> {
        let refused = |ctx: &mut Context<D>| {
            send_mlme(
                ctx,
                MlmeEvent::AuthenticateConf(AuthenticateConfirm {
                    peer_sta_address: req.peer_sta_address,
                    auth_type: req.auth_type,
                    result_code: AuthenticateResultCode::Refused,
                }),
            );
        };
        if req.auth_type != AuthenticationType::OpenSystem {
            refused(ctx);
            return Ok(());
        }
        let bss = match mem::replace(&mut self.state, State::Unjoined) {
            State::Joined { bss } => bss,
            other => {
                self.state = other;
                refused(ctx);
                return Ok(());
            }
        };
        let mut frame = vec![];
        write_open_auth_frame(&mut frame, bss.bssid, self.iface_mac, &mut ctx.seq_mgr)?;
        if let Err(e) = ctx.device.send_wlan(frame) {
            warn!("failed sending authentication frame: {}", e);
            refused(ctx);
            self.state = State::Joined { bss };
            return Ok(());
        }
        let duration = bss.beacon_period.into_duration_times(req.auth_failure_timeout);
        let timeout = ctx.timer.schedule_after(duration, TimedEvent::Authenticating)?;
        self.state = State::Authenticating { bss, timeout };
        Ok(())
    }

    pub fn on_sme_associate<D: Device>(
        &mut self,
        ctx: &mut Context<D>,
        req: AssociateRequest,
    ) -> Result<(), Error> {
        let bss = match mem::replace(&mut self.state, State::Unjoined) {
            State::Authenticated { bss } => bss,
            other => {
                self.state = other;
                send_mlme(
                    ctx,
                    MlmeEvent::AssociateConf(AssociateConfirm {
                        result_code: AssociateResultCode::RefusedNotAuthenticated,
                        association_id: 0,
                    }),
                );
                return Ok(());
            }
        };
        let capability_info = mac::CapabilityInfo(0)
            .with_ess(true)
            .with_privacy(bss.protected)
            .0;
        let rates = if req.rates.is_empty() { &bss.rates } else { &req.rates };
        let mut frame = vec![];
        write_assoc_req_frame(
            &mut frame,
            bss.bssid,
            self.iface_mac,
            &mut ctx.seq_mgr,
            capability_info,
            &bss.ssid,
            rates,
            req.rsne.as_deref(),
        )?;
        if let Err(e) = ctx.device.send_wlan(frame) {
            warn!("failed sending association request: {}", e);
            send_mlme(
                ctx,
                MlmeEvent::AssociateConf(AssociateConfirm {
                    result_code: AssociateResultCode::RefusedReasonUnspecified,
                    association_id: 0,
                }),
            );
            self.state = State::Authenticated { bss };
            return Ok(());
        }
        let duration = bss.beacon_period.into_duration_times(ASSOC_TIMEOUT_BCN_PERIODS);
        let timeout = ctx.timer.schedule_after(duration, TimedEvent::Associating)?;
        self.state = State::Associating { bss, timeout };
        Ok(())
    }

    pub fn on_sme_deauthenticate<D: Device>(
        &mut self,
        ctx: &mut Context<D>,
        req: DeauthenticateRequest,
    ) -> Result<(), Error> {
        self.cancel_state_timer(ctx);
        let bss = match mem::replace(&mut self.state, State::Unjoined) {
            State::Unjoined => {
                return Err(Error::status("cannot deauthenticate: no BSS joined"));
            }
            State::Associated { bss, .. } => {
                ctx.device.clear_assoc(&bss.bssid)?;
                ctx.device.set_link_status(LinkStatus::Down);
                bss
            }
            State::Joining { bss, .. }
            | State::Joined { bss }
            | State::Authenticating { bss, .. }
            | State::Authenticated { bss }
            | State::Associating { bss, .. } => bss,
        };
        let mut frame = vec![];
        write_deauth_frame(&mut frame, bss.bssid, self.iface_mac, req.reason_code, &mut ctx.seq_mgr)?;
        if let Err(e) = ctx.device.send_wlan(frame) {
            warn!("failed sending deauthentication frame: {}", e);
        }
        self.state = State::Joined { bss };
        send_mlme(
            ctx,
            MlmeEvent::DeauthenticateConf(DeauthenticateConfirm {
                peer_sta_address: req.peer_sta_address,
            }),
        );
        Ok(())
    }

    pub fn on_sme_set_keys<D: Device>(
        &mut self,
        ctx: &mut Context<D>,
        req: SetKeysRequest,
    ) -> Result<(), Error> {
        for desc in req.keylist {
            ctx.device.set_key(Key {
                key_type: desc.key_type,
                address: desc.address,
                key_id: desc.key_id,
                key: desc.key,
                rsc: desc.rsc,
                cipher_oui: desc.cipher_suite_oui,
                cipher_type: desc.cipher_suite_type,
            })?;
        }
        if let State::Associated { bss, controlled_port_open, .. } = &mut self.state {
            if bss.protected && !*controlled_port_open {
                *controlled_port_open = true;
                ctx.device.set_link_status(LinkStatus::Up);
            }
        }
        Ok(())
    }

    pub fn on_sme_eapol<D: Device>(
        &mut self,
        ctx: &mut Context<D>,
        req: EapolRequest,
    ) -> Result<(), Error> {
        let bssid = match self.bss() {
            Some(bss) => bss.bssid,
            None => {
                send_mlme(
                    ctx,
                    MlmeEvent::EapolConf(EapolConfirm {
                        result_code: EapolResultCode::TransmissionFailure,
                    }),
                );
                return Ok(());
            }
        };
        let mut frame = vec![];
        write_data_frame(
            &mut frame,
            &mut ctx.seq_mgr,
            bssid,
            req.src_addr,
            req.dst_addr,
            false,
            mac::ETHER_TYPE_EAPOL,
            &req.data,
        )?;
        let result_code = match ctx.device.send_wlan(frame) {
            Ok(()) => EapolResultCode::Success,
            Err(e) => {
                warn!("failed sending EAPOL frame: {}", e);
                EapolResultCode::TransmissionFailure
            }
        };
        send_mlme(ctx, MlmeEvent::EapolConf(EapolConfirm { result_code }));
        Ok(())
    }

    pub fn handle_timeout<D: Device>(&mut self, ctx: &mut Context<D>, event: TimedEvent) {
        match (event, mem::replace(&mut self.state, State::Unjoined)) {
            (TimedEvent::Join, State::Joining { .. }) => {
                send_mlme(
                    ctx,
                    MlmeEvent::JoinConf(JoinConfirm {
                        result_code: JoinResultCode::JoinFailureTimeout,
                    }),
                );
            }
            (TimedEvent::Authenticating, State::Authenticating { bss, .. }) => {
                send_mlme(
                    ctx,
                    MlmeEvent::AuthenticateConf(AuthenticateConfirm {
                        peer_sta_address: bss.bssid,
                        auth_type: AuthenticationType::OpenSystem,
                        result_code: AuthenticateResultCode::AuthFailureTimeout,
                    }),
                );
                self.state = State::Joined { bss };
            }
            // No distinct timeout code exists for association; peers are told to
            // retry later.
            (TimedEvent::Associating, State::Associating { bss, .. }) => {
                send_mlme(
                    ctx,
                    MlmeEvent::AssociateConf(AssociateConfirm {
                        result_code: AssociateResultCode::RefusedTemporarily,
                        association_id: 0,
                    }),
                );
                self.state = State::Authenticated { bss };
            }
            (_, state) => self.state = state,
        }
    }

    pub fn on_mac_frame<D: Device>(&mut self, ctx: &mut Context<D>, frame: &[u8]) {
        match MacFrame::parse(frame) {
            Some(MacFrame::Mgmt { mgmt_hdr, body }) => {
                if mgmt_hdr.addr1 != self.iface_mac && mgmt_hdr.addr1 != BCAST_ADDR {
                    return;
                }
                let bssid = match self.bss() {
                    Some(bss) => bss.bssid,
                    None => return,
                };
                if mgmt_hdr.addr3 != bssid {
                    debug!("dropping management frame from foreign BSS");
                    return;
                }
                let subtype = { mgmt_hdr.frame_ctrl }.frame_subtype();
                match MgmtBody::parse(subtype, body) {
                    Some(MgmtBody::Beacon { .. }) => self.on_beacon(ctx),
                    Some(MgmtBody::Authentication { auth_hdr, .. }) => {
                        self.on_auth_frame(ctx, &auth_hdr)
                    }
                    Some(MgmtBody::AssociationResp { assoc_resp_hdr, .. }) => {
                        self.on_assoc_resp_frame(ctx, &assoc_resp_hdr)
                    }
                    Some(MgmtBody::Deauthentication { deauth_hdr }) => {
                        self.on_deauth_frame(ctx, &deauth_hdr)
                    }
                    Some(MgmtBody::Disassociation { disassoc_hdr }) => {
                        self.on_disassoc_frame(ctx, &disassoc_hdr)
                    }
                    _ => (),
                }
            }
            Some(MacFrame::Data { data_hdr, addr4, body }) => {
                self.on_data_frame(ctx, &data_hdr, addr4, body)
            }
            _ => (),
        }
    }

    fn on_beacon<D: Device>(&mut self, ctx: &mut Context<D>) {
        if let State::Joining { bss, timeout } = mem::replace(&mut self.state, State::Unjoined) {
            ctx.timer.cancel_event(timeout);
            self.state = State::Joined { bss };
            send_mlme(
                ctx,
                MlmeEvent::JoinConf(JoinConfirm { result_code: JoinResultCode::Success }),
            );
        }
    }

    fn on_auth_frame<D: Device>(&mut self, ctx: &mut Context<D>, auth_hdr: &AuthHdr) {
        let (bss, timeout) = match mem::replace(&mut self.state, State::Unjoined) {
            State::Authenticating { bss, timeout } => (bss, timeout),
            other => {
                self.state = other;
                return;
            }
        };
        ctx.timer.cancel_event(timeout);
        let success = auth_hdr.auth_alg_num.get() == mac::AUTH_ALGORITHM_OPEN
            && auth_hdr.auth_txn_seq_num.get() == 2
            && auth_hdr.status_code.get() == 0;
        let (result_code, state) = if success {
            (AuthenticateResultCode::Success, State::Authenticated { bss: bss.clone() })
        } else {
            (AuthenticateResultCode::Refused, State::Joined { bss: bss.clone() })
        };
        self.state = state;
        send_mlme(
            ctx,
            MlmeEvent::AuthenticateConf(AuthenticateConfirm {
                peer_sta_address: bss.bssid,
                auth_type: AuthenticationType::OpenSystem,
                result_code,
            }),
        );
    }

    fn on_assoc_resp_frame<D: Device>(&mut self, ctx: &mut Context<D>, resp: &AssocRespHdr) {
        let (bss, timeout) = match mem::replace(&mut self.state, State::Unjoined) {
            State::Associating { bss, timeout } => (bss, timeout),
            other => {
                self.state = other;
                return;
            }
        };
        ctx.timer.cancel_event(timeout);
        let status = resp.status_code.get();
        if status != 0 {
            self.state = State::Authenticated { bss };
            send_mlme(
                ctx,
                MlmeEvent::AssociateConf(AssociateConfirm {
                    result_code: assoc_result_from_status(status),
                    association_id: 0,
                }),
            );
            return;
        }
        // The two MSBs of the AID field are always set on the wire.
        let aid = resp.aid.get() & 0x3FFF;
        let assoc = AssocContext {
            addr: bss.bssid,
            aid,
            rates: bss.rates.clone(),
            ht_cap: None,
            ht_op: None,
            vht_cap: None,
            vht_op: None,
        };
        if let Err(e) = ctx.device.configure_assoc(assoc) {
            error!("failed pushing association context: {}", e);
            self.state = State::Authenticated { bss };
            send_mlme(
                ctx,
                MlmeEvent::AssociateConf(AssociateConfirm {
                    result_code: AssociateResultCode::RefusedReasonUnspecified,
                    association_id: 0,
                }),
            );
            return;
        }
        let controlled_port_open = !bss.protected;
        if controlled_port_open {
            ctx.device.set_link_status(LinkStatus::Up);
        }
        self.state = State::Associated { bss, aid, controlled_port_open };
        send_mlme(
            ctx,
            MlmeEvent::AssociateConf(AssociateConfirm {
                result_code: AssociateResultCode::Success,
                association_id: aid,
            }),
        );
    }

    fn on_deauth_frame<D: Device>(&mut self, ctx: &mut Context<D>, deauth_hdr: &DeauthHdr) {
        self.cancel_state_timer(ctx);
        let bss = match mem::replace(&mut self.state, State::Unjoined) {
            State::Unjoined => return,
            State::Associated { bss, .. } => {
                if let Err(e) = ctx.device.clear_assoc(&bss.bssid) {
                    error!("failed clearing association: {}", e);
                }
                ctx.device.set_link_status(LinkStatus::Down);
                bss
            }
            State::Joining { bss, .. }
            | State::Joined { bss }
            | State::Authenticating { bss, .. }
            | State::Authenticated { bss }
            | State::Associating { bss, .. } => bss,
        };
        send_mlme(
            ctx,
            MlmeEvent::DeauthenticateInd(DeauthenticateIndication {
                peer_sta_address: bss.bssid,
                reason_code: deauth_hdr.reason_code.get(),
            }),
        );
        self.state = State::Joined { bss };
    }

    fn on_disassoc_frame<D: Device>(&mut self, ctx: &mut Context<D>, disassoc_hdr: &DisassocHdr) {
        let bss = match mem::replace(&mut self.state, State::Unjoined) {
            State::Associated { bss, .. } => bss,
            other => {
                self.state = other;
                return;
            }
        };
        if let Err(e) = ctx.device.clear_assoc(&bss.bssid) {
            error!("failed clearing association: {}", e);
        }
        ctx.device.set_link_status(LinkStatus::Down);
        send_mlme(
            ctx,
            MlmeEvent::DisassociateInd(DisassociateIndication {
                peer_sta_address: bss.bssid,
                reason_code: disassoc_hdr.reason_code.get(),
            }),
        );
        self.state = State::Authenticated { bss };
    }

    fn on_data_frame<D: Device>(
        &mut self,
        ctx: &mut Context<D>,
        data_hdr: &DataHdr,
        addr4: Option<MacAddr>,
        body: &[u8],
    ) {
        let (bssid, controlled_port_open) = match &self.state {
            State::Associated { bss, controlled_port_open, .. } => {
                (bss.bssid, *controlled_port_open)
            }
            _ => return,
        };
        if mac::data_bssid(data_hdr) != Some(bssid) {
            return;
        }
        if data_hdr.addr1 != self.iface_mac && data_hdr.addr1[0] & 0x01 == 0 {
            return;
        }
        let frame_ctrl = data_hdr.frame_ctrl;
        if mac::is_null_data(frame_ctrl) && body.is_empty() {
            let mut resp = vec![];
            if write_keep_alive_resp_frame(&mut resp, bssid, self.iface_mac, &mut ctx.seq_mgr)
                .is_ok()
            {
                if let Err(e) = ctx.device.send_wlan(resp) {
                    error!("failed sending keep alive response: {}", e);
                }
            }
            return;
        }
        let mut reader = crate::buffer_reader::BufferReader::new(body);
        let llc_hdr = match reader.read::<LlcHdr>() {
            Some(llc_hdr) => llc_hdr,
            None => return,
        };
        let payload = reader.into_remaining();
        let dst = mac::data_dst_addr(data_hdr);
        let src = match mac::data_src_addr(data_hdr, addr4) {
            Some(src) => src,
            None => return,
        };
        let ether_type = llc_hdr.protocol_id.get();
        if ether_type == mac::ETHER_TYPE_EAPOL {
            send_mlme(
                ctx,
                MlmeEvent::EapolInd(EapolIndication {
                    src_addr: src,
                    dst_addr: dst,
                    data: payload.to_vec(),
                }),
            );
            return;
        }
        if !controlled_port_open {
            return;
        }
        let mut eth_frame = vec![];
        if write_eth_frame(&mut eth_frame, dst, src, ether_type, payload).is_ok() {
            if let Err(e) = ctx.device.send_eth(eth_frame) {
                error!("failed delivering ethernet frame: {}", e);
            }
        }
    }

    pub fn on_eth_frame<D: Device>(&mut self, ctx: &mut Context<D>, frame: &[u8]) -> Result<(), Error> {
        let (bssid, protected, controlled_port_open) = match &self.state {
            State::Associated { bss, controlled_port_open, .. } => {
                (bss.bssid, bss.protected, *controlled_port_open)
            }
            _ => return Err(Error::status("dropping ethernet frame: not associated")),
        };
        if !controlled_port_open {
            return Err(Error::status("dropping ethernet frame: controlled port closed"));
        }
        let mut reader = crate::buffer_reader::BufferReader::new(frame);
        let eth_hdr = reader
            .read::<mac::EthernetIIHdr>()
            .ok_or(crate::error::FrameParseError::FrameTooShort {
                expected: std::mem::size_of::<mac::EthernetIIHdr>(),
                actual: frame.len(),
            })
            .map_err(Error::from)?;
        let mut wlan_frame = vec![];
        write_data_frame(
            &mut wlan_frame,
            &mut ctx.seq_mgr,
            bssid,
            eth_hdr.sa,
            eth_hdr.da,
            protected,
            eth_hdr.ether_type.get(),
            reader.peek_remaining(),
        )?;
        ctx.device.send_wlan(wlan_frame)
    }
}

impl<D: Device> ChannelListener<D> for Station {
    fn pre_switch_off_channel(&mut self, _ctx: &mut Context<D>) {}

    fn begin_off_channel_time(&mut self, _ctx: &mut Context<D>) {}

    fn handle_off_channel_frame(&mut self, _ctx: &mut Context<D>, _frame: &[u8], _rx_info: RxInfo) {
        debug!("dropping frame received off channel");
    }

    fn end_off_channel_time(
        &mut self,
        _ctx: &mut Context<D>,
        _interrupted: bool,
    ) -> Option<OffChannelRequest> {
        None
    }

    fn returned_on_channel(&mut self, _ctx: &mut Context<D>) {}

    fn handle_on_channel_frame(&mut self, ctx: &mut Context<D>, frame: &[u8], _rx_info: RxInfo) {
        self.on_mac_frame(ctx, frame);
    }
}

fn assoc_result_from_status(status: u16) -> AssociateResultCode {
    match StatusCode::from_u16(status) {
        Some(StatusCode::Success) => AssociateResultCode::Success,
        Some(StatusCode::RefusedNotAuthenticated) => AssociateResultCode::RefusedNotAuthenticated,
        Some(StatusCode::RefusedCapabilitiesMismatch) => {
            AssociateResultCode::RefusedCapabilitiesMismatch
        }
        Some(StatusCode::RefusedApOutOfMemory) => AssociateResultCode::RefusedApOutOfMemory,
        Some(StatusCode::RefusedBasicRatesMismatch) => {
            AssociateResultCode::RefusedBasicRatesMismatch
        }
        Some(StatusCode::RefusedTemporarily) => AssociateResultCode::RefusedTemporarily,
        _ => AssociateResultCode::RefusedReasonUnspecified,
    }
}

// --- Top level client MLME ---

/// Owns the client-side components and routes frames, service messages and
/// timeouts between them.
pub struct ClientMlme<D: Device> {
    ctx: Context<D>,
    scanner: Scanner,
    chan_sched: ChannelScheduler,
    sta: Station,
}

impl<D: Device> ClientMlme<D> {
    pub fn new(device: D, scheduler: Box<dyn Scheduler>, iface_mac: MacAddr) -> Self {
        let main_channel = device.channel();
        ClientMlme {
            ctx: Context {
                device,
                timer: Timer::new(scheduler),
                seq_mgr: SequenceManager::new(),
            },
            scanner: Scanner::new(iface_mac),
            chan_sched: ChannelScheduler::new(main_channel),
            sta: Station::new(iface_mac),
        }
    }

    pub fn handle_mlme_msg(&mut self, msg: MlmeRequest) -> Result<(), Error> {
        match msg {
            MlmeRequest::Scan(req) => {
                self.scanner.on_sme_scan(&mut self.ctx, req);
                Ok(())
            }
            MlmeRequest::Join(req) => {
                let channel = Channel::new(req.selected_bss.channel, Cbw::Cbw20);
                self.chan_sched.set_channel(&mut self.ctx, channel)?;
                self.sta.on_sme_join(&mut self.ctx, req)
            }
            MlmeRequest::Authenticate(req) => self.sta.on_sme_authenticate(&mut self.ctx, req),
            MlmeRequest::Associate(req) => self.sta.on_sme_associate(&mut self.ctx, req),
            MlmeRequest::Deauthenticate(req) => self.sta.on_sme_deauthenticate(&mut self.ctx, req),
            MlmeRequest::SetKeys(req) => self.sta.on_sme_set_keys(&mut self.ctx, req),
            MlmeRequest::Eapol(req) => self.sta.on_sme_eapol(&mut self.ctx, req),
            other => Err(Error::status(format!("unsupported request for client: {:?}", other))),
        }
    }

    pub fn on_mac_frame(&mut self, frame: &[u8], rx_info: RxInfo) {
        if self.scanner.is_scanning() {
            self.scanner.handle_mac_frame(frame, rx_info);
            return;
        }
        self.chan_sched.handle_frame(&mut self.ctx, &mut self.sta, frame, rx_info);
    }

    pub fn on_eth_frame(&mut self, frame: &[u8]) -> Result<(), Error> {
        self.sta.on_eth_frame(&mut self.ctx, frame)
    }

    pub fn handle_timeout(&mut self) -> Result<(), Error> {
        let now = self.ctx.timer.now();
        while let Some((_id, event)) = self.ctx.timer.next_due(now) {
            match event {
                TimedEvent::ChannelScheduler => {
                    self.chan_sched.handle_timeout(&mut self.ctx, &mut self.sta)?
                }
                TimedEvent::Scanner => self.scanner.handle_timeout(&mut self.ctx),
                event => self.sta.handle_timeout(&mut self.ctx, event),
            }
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            device::FakeDevice,
            service::{KeyDescriptor, KeyType, ScanRequest, ScanResultCode, ScanType},
            test_utils::{self, assert_variant},
            timer::FakeScheduler,
        },
    };

    const IFACE_MAC: MacAddr = [2; 6];
    const BSSID: MacAddr = [3; 6];

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

    fn join_request() -> JoinRequest {
        JoinRequest {
            selected_bss: test_utils::fake_bss_description(BSSID, b"ssid"),
            join_failure_timeout: 10,
        }
    }

    fn auth_request() -> AuthenticateRequest {
        AuthenticateRequest {
            peer_sta_address: BSSID,
            auth_type: AuthenticationType::OpenSystem,
            auth_failure_timeout: 10,
        }
    }

    fn assoc_request() -> AssociateRequest {
        AssociateRequest { peer_sta_address: BSSID, rates: vec![], rsne: None }
    }

    fn join_station(sta: &mut Station, m: &mut MockObjects) {
        sta.on_sme_join(&mut m.ctx, join_request()).expect("join failed");
        sta.on_mac_frame(&mut m.ctx, &test_utils::beacon_frame(BSSID, b"ssid", 11));
        assert_variant!(m.device.next_mlme_event().expect("no event"), MlmeEvent::JoinConf(_));
    }

    fn authenticate_station(sta: &mut Station, m: &mut MockObjects) {
        join_station(sta, m);
        sta.on_sme_authenticate(&mut m.ctx, auth_request()).expect("auth failed");
        m.device.state().wlan_queue.clear();
        sta.on_mac_frame(&mut m.ctx, &test_utils::open_auth_frame(BSSID, IFACE_MAC, 2, 0));
        assert_variant!(
            m.device.next_mlme_event().expect("no event"),
            MlmeEvent::AuthenticateConf(conf) => {
                assert_eq!(conf.result_code, AuthenticateResultCode::Success)
            }
        );
    }

    fn associate_station(sta: &mut Station, m: &mut MockObjects) {
        authenticate_station(sta, m);
        sta.on_sme_associate(&mut m.ctx, assoc_request()).expect("assoc failed");
        m.device.state().wlan_queue.clear();
        sta.on_mac_frame(&mut m.ctx, &test_utils::assoc_resp_frame(BSSID, IFACE_MAC, 0, 0xC001));
        assert_variant!(
            m.device.next_mlme_event().expect("no event"),
            MlmeEvent::AssociateConf(conf) => {
                assert_eq!(conf.result_code, AssociateResultCode::Success);
                assert_eq!(conf.association_id, 1);
            }
        );
    }

    #[test]
    fn open_auth_frame_bytes() {
        let mut buf = vec![];
        let mut seq_mgr = SequenceManager::new();
        write_open_auth_frame(&mut buf, BSSID, IFACE_MAC, &mut seq_mgr).expect("write failed");
        #[rustfmt::skip]
        assert_eq!(&buf[..], &[
            // Mgmt header
            0b10110000, 0, // Frame Control
            0, 0, // Duration
            3, 3, 3, 3, 3, 3, // addr1
            2, 2, 2, 2, 2, 2, // addr2
            3, 3, 3, 3, 3, 3, // addr3
            0x10, 0, // Sequence Control
            // Auth header
            0, 0, // auth algorithm
            1, 0, // auth txn seq num
            0, 0, // status code
        ][..]);
    }

    #[test]
    fn deauth_frame_bytes() {
        let mut buf = vec![];
        let mut seq_mgr = SequenceManager::new();
        write_deauth_frame(&mut buf, BSSID, IFACE_MAC, 3, &mut seq_mgr).expect("write failed");
        #[rustfmt::skip]
        assert_eq!(&buf[..], &[
            0b11000000, 0, // Frame Control
            0, 0, // Duration
            3, 3, 3, 3, 3, 3, // addr1
            2, 2, 2, 2, 2, 2, // addr2
            3, 3, 3, 3, 3, 3, // addr3
            0x10, 0, // Sequence Control
            3, 0, // reason code
        ][..]);
    }

    #[test]
    fn keep_alive_resp_frame_bytes() {
        let mut buf = vec![];
        let mut seq_mgr = SequenceManager::new();
        write_keep_alive_resp_frame(&mut buf, BSSID, IFACE_MAC, &mut seq_mgr).expect("write failed");
        #[rustfmt::skip]
        assert_eq!(&buf[..], &[
            0b01001000, 0b00000001, // Frame Control: null data, to_ds
            0, 0, // Duration
            3, 3, 3, 3, 3, 3, // addr1
            2, 2, 2, 2, 2, 2, // addr2
            3, 3, 3, 3, 3, 3, // addr3
            0x10, 0, // Sequence Control
        ][..]);
    }

    #[test]
    fn data_frame_bytes() {
        let mut buf = vec![];
        let mut seq_mgr = SequenceManager::new();
        write_data_frame(&mut buf, &mut seq_mgr, BSSID, IFACE_MAC, [4; 6], false, 0x1234, &[1, 2, 3])
            .expect("write failed");
        #[rustfmt::skip]
        assert_eq!(&buf[..], &[
            0b00001000, 0b00000001, // Frame Control: data, to_ds
            0, 0, // Duration
            3, 3, 3, 3, 3, 3, // addr1
            2, 2, 2, 2, 2, 2, // addr2
            4, 4, 4, 4, 4, 4, // addr3
            0x10, 0, // Sequence Control
            0xAA, 0xAA, 0x03, // LLC SNAP
            0, 0, 0, // OUI
            0x12, 0x34, // Protocol ID
            1, 2, 3, // payload
        ][..]);
    }

    #[test]
    fn eth_frame_bytes() {
        let mut buf = vec![];
        write_eth_frame(&mut buf, [1; 6], [2; 6], 0x888E, &[7, 7]).expect("write failed");
        #[rustfmt::skip]
        assert_eq!(&buf[..], &[
            1, 1, 1, 1, 1, 1, // dst
            2, 2, 2, 2, 2, 2, // src
            0x88, 0x8E, // ether type
            7, 7, // payload
        ][..]);
    }

    #[test]
    fn join_succeeds_on_matching_beacon() {
        let mut m = MockObjects::new();
        let mut sta = Station::new(IFACE_MAC);
        sta.on_sme_join(&mut m.ctx, join_request()).expect("join failed");
        assert!(m.device.next_mlme_event().is_none());

        // A beacon from another BSS does not complete the join.
        sta.on_mac_frame(&mut m.ctx, &test_utils::beacon_frame([9; 6], b"other", 11));
        assert!(m.device.next_mlme_event().is_none());

        sta.on_mac_frame(&mut m.ctx, &test_utils::beacon_frame(BSSID, b"ssid", 11));
        assert_variant!(
            m.device.next_mlme_event().expect("no event"),
            MlmeEvent::JoinConf(conf) => assert_eq!(conf.result_code, JoinResultCode::Success)
        );
        // The join timeout was canceled; advancing time produces no further event.
        m.scheduler.advance(TimeUnit(100).into_duration_times(20));
        let now = m.ctx.timer.now();
        assert!(m.ctx.timer.next_due(now).is_none());
    }

    #[test]
    fn join_timeout() {
        let mut m = MockObjects::new();
        let mut sta = Station::new(IFACE_MAC);
        sta.on_sme_join(&mut m.ctx, join_request()).expect("join failed");

        m.scheduler.advance(TimeUnit(100).into_duration_times(10));
        let now = m.ctx.timer.now();
        while let Some((_id, event)) = m.ctx.timer.next_due(now) {
            sta.handle_timeout(&mut m.ctx, event);
        }
        assert_variant!(
            m.device.next_mlme_event().expect("no event"),
            MlmeEvent::JoinConf(conf) => {
                assert_eq!(conf.result_code, JoinResultCode::JoinFailureTimeout)
            }
        );
    }

    #[test]
    fn authenticate_flow() {
        let mut m = MockObjects::new();
        let mut sta = Station::new(IFACE_MAC);
        join_station(&mut sta, &mut m);

        sta.on_sme_authenticate(&mut m.ctx, auth_request()).expect("auth failed");
        let frames: Vec<Vec<u8>> = m.device.state().wlan_queue.drain(..).collect();
        assert_eq!(frames.len(), 1);
        // Open system, sequence number 1.
        assert_eq!(&frames[0][24..], &[0, 0, 1, 0, 0, 0]);

        sta.on_mac_frame(&mut m.ctx, &test_utils::open_auth_frame(BSSID, IFACE_MAC, 2, 0));
        assert_variant!(
            m.device.next_mlme_event().expect("no event"),
            MlmeEvent::AuthenticateConf(conf) => {
                assert_eq!(conf.peer_sta_address, BSSID);
                assert_eq!(conf.result_code, AuthenticateResultCode::Success);
            }
        );
    }

    #[test]
    fn authenticate_refused_by_peer() {
        let mut m = MockObjects::new();
        let mut sta = Station::new(IFACE_MAC);
        join_station(&mut sta, &mut m);
        sta.on_sme_authenticate(&mut m.ctx, auth_request()).expect("auth failed");
        m.device.state().wlan_queue.clear();

        sta.on_mac_frame(&mut m.ctx, &test_utils::open_auth_frame(BSSID, IFACE_MAC, 2, 1));
        assert_variant!(
            m.device.next_mlme_event().expect("no event"),
            MlmeEvent::AuthenticateConf(conf) => {
                assert_eq!(conf.result_code, AuthenticateResultCode::Refused)
            }
        );
        // Fell back to Joined: a new authenticate request is accepted.
        sta.on_sme_authenticate(&mut m.ctx, auth_request()).expect("auth failed");
        assert_eq!(m.device.state().wlan_queue.len(), 1);
    }

    #[test]
    fn authenticate_timeout() {
        let mut m = MockObjects::new();
        let mut sta = Station::new(IFACE_MAC);
        join_station(&mut sta, &mut m);
        sta.on_sme_authenticate(&mut m.ctx, auth_request()).expect("auth failed");

        m.scheduler.advance(TimeUnit(100).into_duration_times(10));
        let now = m.ctx.timer.now();
        while let Some((_id, event)) = m.ctx.timer.next_due(now) {
            sta.handle_timeout(&mut m.ctx, event);
        }
        assert_variant!(
            m.device.next_mlme_event().expect("no event"),
            MlmeEvent::AuthenticateConf(conf) => {
                assert_eq!(conf.result_code, AuthenticateResultCode::AuthFailureTimeout)
            }
        );
    }

    #[test]
    fn authenticate_rejected_when_not_joined() {
        let mut m = MockObjects::new();
        let mut sta = Station::new(IFACE_MAC);
        sta.on_sme_authenticate(&mut m.ctx, auth_request()).expect("auth failed");
        assert_variant!(
            m.device.next_mlme_event().expect("no event"),
            MlmeEvent::AuthenticateConf(conf) => {
                assert_eq!(conf.result_code, AuthenticateResultCode::Refused)
            }
        );
    }

    #[test]
    fn associate_success() {
        let mut m = MockObjects::new();
        let mut sta = Station::new(IFACE_MAC);
        associate_station(&mut sta, &mut m);

        // Association context was pushed and the link is up for the open BSS.
        let state = m.device.state();
        assert_eq!(state.assocs.len(), 1);
        assert_eq!(state.assocs[0].aid, 1);
        assert_eq!(state.link_status, LinkStatus::Up);
    }

    #[test]
    fn associate_refused_by_peer() {
        let mut m = MockObjects::new();
        let mut sta = Station::new(IFACE_MAC);
        authenticate_station(&mut sta, &mut m);
        sta.on_sme_associate(&mut m.ctx, assoc_request()).expect("assoc failed");
        m.device.state().wlan_queue.clear();

        // Status 30: refused temporarily.
        sta.on_mac_frame(&mut m.ctx, &test_utils::assoc_resp_frame(BSSID, IFACE_MAC, 30, 0));
        assert_variant!(
            m.device.next_mlme_event().expect("no event"),
            MlmeEvent::AssociateConf(conf) => {
                assert_eq!(conf.result_code, AssociateResultCode::RefusedTemporarily);
                assert_eq!(conf.association_id, 0);
            }
        );
        assert!(m.device.state().assocs.is_empty());
    }

    #[test]
    fn associate_timeout_reports_refused_temporarily() {
        let mut m = MockObjects::new();
        let mut sta = Station::new(IFACE_MAC);
        authenticate_station(&mut sta, &mut m);
        sta.on_sme_associate(&mut m.ctx, assoc_request()).expect("assoc failed");

        m.scheduler.advance(TimeUnit(100).into_duration_times(ASSOC_TIMEOUT_BCN_PERIODS));
        let now = m.ctx.timer.now();
        while let Some((_id, event)) = m.ctx.timer.next_due(now) {
            sta.handle_timeout(&mut m.ctx, event);
        }
        assert_variant!(
            m.device.next_mlme_event().expect("no event"),
            MlmeEvent::AssociateConf(conf) => {
                assert_eq!(conf.result_code, AssociateResultCode::RefusedTemporarily);
                assert_eq!(conf.association_id, 0);
            }
        );
        // Fell back to Authenticated: another associate attempt is accepted.
        m.device.state().wlan_queue.clear();
        sta.on_sme_associate(&mut m.ctx, assoc_request()).expect("assoc failed");
        assert_eq!(m.device.state().wlan_queue.len(), 1);
    }

    #[test]
    fn successive_join_resets_station() {
        let mut m = MockObjects::new();
        let mut sta = Station::new(IFACE_MAC);
        associate_station(&mut sta, &mut m);

        // A new join while associated resets to Joining without any teardown frame.
        let other_bss = JoinRequest {
            selected_bss: test_utils::fake_bss_description([9; 6], b"other"),
            join_failure_timeout: 10,
        };
        sta.on_sme_join(&mut m.ctx, other_bss).expect("join failed");
        assert!(m.device.state().wlan_queue.is_empty());

        sta.on_mac_frame(&mut m.ctx, &test_utils::beacon_frame([9; 6], b"other", 11));
        assert_variant!(
            m.device.next_mlme_event().expect("no event"),
            MlmeEvent::JoinConf(conf) => assert_eq!(conf.result_code, JoinResultCode::Success)
        );
    }

    #[test]
    fn foreign_bss_mgmt_frames_dropped() {
        let mut m = MockObjects::new();
        let mut sta = Station::new(IFACE_MAC);
        authenticate_station(&mut sta, &mut m);
        sta.on_sme_associate(&mut m.ctx, assoc_request()).expect("assoc failed");
        m.device.state().wlan_queue.clear();

        sta.on_mac_frame(&mut m.ctx, &test_utils::assoc_resp_frame([9; 6], IFACE_MAC, 0, 0xC001));
        assert!(m.device.next_mlme_event().is_none());
    }

    #[test]
    fn keep_alive_response_to_null_data() {
        let mut m = MockObjects::new();
        let mut sta = Station::new(IFACE_MAC);
        associate_station(&mut sta, &mut m);

        // A null-data frame from the AP; addressed from-DS to the client.
        let mut null_data = test_utils::null_data_frame(BSSID, BSSID, false);
        // Rewrite into a from-DS frame addressed at the client.
        null_data[1] = 0b00000010;
        null_data[4..10].copy_from_slice(&IFACE_MAC);
        null_data[10..16].copy_from_slice(&BSSID);
        null_data[16..22].copy_from_slice(&BSSID);
        sta.on_mac_frame(&mut m.ctx, &null_data);

        let frames: Vec<Vec<u8>> = m.device.state().wlan_queue.drain(..).collect();
        assert_eq!(frames.len(), 1);
        // Null data keep alive to the AP.
        assert_eq!(frames[0][0], 0b01001000);
        assert_eq!(&frames[0][4..10], &BSSID);
    }

    #[test]
    fn data_frames_forwarded_to_ethernet() {
        let mut m = MockObjects::new();
        let mut sta = Station::new(IFACE_MAC);
        associate_station(&mut sta, &mut m);

        let frame = test_utils::data_frame_from_ap(BSSID, IFACE_MAC, [9; 6], 0x0800, &[1, 2, 3]);
        sta.on_mac_frame(&mut m.ctx, &frame);
        let eth: Vec<Vec<u8>> = m.device.state().eth_queue.drain(..).collect();
        assert_eq!(eth.len(), 1);
        assert_eq!(&eth[0][0..6], &IFACE_MAC);
        assert_eq!(&eth[0][6..12], &[9; 6]);
        assert_eq!(&eth[0][12..14], &[0x08, 0x00]);
        assert_eq!(&eth[0][14..], &[1, 2, 3]);
    }

    #[test]
    fn eapol_frames_indicated_not_forwarded() {
        let mut m = MockObjects::new();
        let mut sta = Station::new(IFACE_MAC);
        associate_station(&mut sta, &mut m);

        let frame =
            test_utils::data_frame_from_ap(BSSID, IFACE_MAC, BSSID, mac::ETHER_TYPE_EAPOL, &[5, 5]);
        sta.on_mac_frame(&mut m.ctx, &frame);
        assert!(m.device.state().eth_queue.is_empty());
        assert_variant!(
            m.device.next_mlme_event().expect("no event"),
            MlmeEvent::EapolInd(ind) => {
                assert_eq!(ind.dst_addr, IFACE_MAC);
                assert_eq!(ind.data, vec![5, 5]);
            }
        );
    }

    #[test]
    fn protected_bss_gates_data_until_keys_installed() {
        let mut m = MockObjects::new();
        let mut sta = Station::new(IFACE_MAC);
        // Join a protected BSS.
        let mut bss = test_utils::fake_bss_description(BSSID, b"ssid");
        bss.rsne = Some(vec![1, 0, 0x00, 0x0F, 0xAC, 0x04]);
        sta.on_sme_join(&mut m.ctx, JoinRequest { selected_bss: bss, join_failure_timeout: 10 })
            .expect("join failed");
        sta.on_mac_frame(&mut m.ctx, &test_utils::beacon_frame(BSSID, b"ssid", 11));
        m.device.next_mlme_event();
        sta.on_sme_authenticate(&mut m.ctx, auth_request()).expect("auth failed");
        sta.on_mac_frame(&mut m.ctx, &test_utils::open_auth_frame(BSSID, IFACE_MAC, 2, 0));
        m.device.next_mlme_event();
        sta.on_sme_associate(&mut m.ctx, assoc_request()).expect("assoc failed");
        sta.on_mac_frame(&mut m.ctx, &test_utils::assoc_resp_frame(BSSID, IFACE_MAC, 0, 0xC001));
        m.device.next_mlme_event();
        m.device.state().wlan_queue.clear();

        // Controlled port still closed: no link up, inbound data dropped.
        assert_eq!(m.device.state().link_status, LinkStatus::Down);
        let frame = test_utils::data_frame_from_ap(BSSID, IFACE_MAC, [9; 6], 0x0800, &[1]);
        sta.on_mac_frame(&mut m.ctx, &frame);
        assert!(m.device.state().eth_queue.is_empty());
        assert!(sta.on_eth_frame(&mut m.ctx, &test_utils::eth_frame([9; 6], IFACE_MAC, 0x0800, &[1])).is_err());

        // Installing a key opens the port.
        let keys = SetKeysRequest {
            keylist: vec![KeyDescriptor {
                key: vec![0xAB; 16],
                key_id: 0,
                key_type: KeyType::Pairwise,
                address: BSSID,
                rsc: 0,
                cipher_suite_oui: [0x00, 0x0F, 0xAC],
                cipher_suite_type: 4,
            }],
        };
        sta.on_sme_set_keys(&mut m.ctx, keys).expect("set keys failed");
        assert_eq!(m.device.state().keys.len(), 1);
        assert_eq!(m.device.state().link_status, LinkStatus::Up);

        sta.on_mac_frame(&mut m.ctx, &frame);
        assert_eq!(m.device.state().eth_queue.len(), 1);
        // Outbound frames now carry the protected bit.
        sta.on_eth_frame(&mut m.ctx, &test_utils::eth_frame([9; 6], IFACE_MAC, 0x0800, &[1]))
            .expect("eth frame failed");
        let frames: Vec<Vec<u8>> = m.device.state().wlan_queue.drain(..).collect();
        assert_eq!(frames.len(), 1);
        assert!(FrameControl(u16::from_le_bytes([frames[0][0], frames[0][1]])).protected());
    }

    #[test]
    fn deauth_frame_resets_to_joined() {
        let mut m = MockObjects::new();
        let mut sta = Station::new(IFACE_MAC);
        associate_station(&mut sta, &mut m);

        sta.on_mac_frame(&mut m.ctx, &test_utils::deauth_frame(BSSID, IFACE_MAC, 3));
        assert_variant!(
            m.device.next_mlme_event().expect("no event"),
            MlmeEvent::DeauthenticateInd(ind) => {
                assert_eq!(ind.peer_sta_address, BSSID);
                assert_eq!(ind.reason_code, 3);
            }
        );
        assert_eq!(m.device.state().assocs_cleared, vec![BSSID]);
        assert_eq!(m.device.state().link_status, LinkStatus::Down);
        // Back in Joined: authentication is accepted again.
        sta.on_sme_authenticate(&mut m.ctx, auth_request()).expect("auth failed");
        assert_eq!(m.device.state().wlan_queue.len(), 1);
    }

    #[test]
    fn disassoc_frame_falls_back_to_authenticated() {
        let mut m = MockObjects::new();
        let mut sta = Station::new(IFACE_MAC);
        associate_station(&mut sta, &mut m);

        sta.on_mac_frame(&mut m.ctx, &test_utils::disassoc_frame(BSSID, IFACE_MAC, 8));
        assert_variant!(
            m.device.next_mlme_event().expect("no event"),
            MlmeEvent::DisassociateInd(ind) => assert_eq!(ind.reason_code, 8)
        );
        // Authenticated: an associate request is accepted without re-authenticating.
        m.device.state().wlan_queue.clear();
        sta.on_sme_associate(&mut m.ctx, assoc_request()).expect("assoc failed");
        assert_eq!(m.device.state().wlan_queue.len(), 1);
    }

    #[test]
    fn sme_deauthenticate() {
        let mut m = MockObjects::new();
        let mut sta = Station::new(IFACE_MAC);
        associate_station(&mut sta, &mut m);

        let req = DeauthenticateRequest { peer_sta_address: BSSID, reason_code: 3 };
        sta.on_sme_deauthenticate(&mut m.ctx, req).expect("deauth failed");
        let frames: Vec<Vec<u8>> = m.device.state().wlan_queue.drain(..).collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0][0], 0b11000000);
        assert_variant!(
            m.device.next_mlme_event().expect("no event"),
            MlmeEvent::DeauthenticateConf(conf) => assert_eq!(conf.peer_sta_address, BSSID)
        );
        assert_eq!(m.device.state().assocs_cleared, vec![BSSID]);
    }

    #[test]
    fn eapol_request_sends_frame_and_confirms() {
        let mut m = MockObjects::new();
        let mut sta = Station::new(IFACE_MAC);
        associate_station(&mut sta, &mut m);

        let req = EapolRequest { src_addr: IFACE_MAC, dst_addr: BSSID, data: vec![1, 2] };
        sta.on_sme_eapol(&mut m.ctx, req).expect("eapol failed");
        let frames: Vec<Vec<u8>> = m.device.state().wlan_queue.drain(..).collect();
        assert_eq!(frames.len(), 1);
        // LLC protocol id is EAPOL.
        assert_eq!(&frames[0][30..32], &[0x88, 0x8E]);
        assert_variant!(
            m.device.next_mlme_event().expect("no event"),
            MlmeEvent::EapolConf(conf) => assert_eq!(conf.result_code, EapolResultCode::Success)
        );
    }

    #[test]
    fn mlme_dispatches_scan_and_join() {
        let mut device = FakeDevice::new();
        let scheduler = FakeScheduler::new();
        let device_handle = device.clone();
        device.set_channel(Channel::new(1, Cbw::Cbw20)).expect("set_channel failed");
        let mut mlme = ClientMlme::new(device, Box::new(scheduler.clone()), IFACE_MAC);

        let scan = ScanRequest {
            txn_id: 1,
            scan_type: ScanType::Passive,
            channel_list: vec![6],
            ssid: vec![],
            probe_delay: 0,
            min_channel_time: 10,
            max_channel_time: 20,
        };
        mlme.handle_mlme_msg(MlmeRequest::Scan(scan)).expect("scan failed");
        assert_eq!(device_handle.channel().primary, 6);

        // Beacons are routed to the scanner while scanning.
        let rx = RxInfo { channel: Channel::new(6, Cbw::Cbw20), rssi_dbm: -30, snr_db: 20 };
        mlme.on_mac_frame(&test_utils::beacon_frame(BSSID, b"ssid", 6), rx);
        // Min channel time elapses first, then max channel time.
        scheduler.advance(std::time::Duration::from_secs(1));
        mlme.handle_timeout().expect("timeout failed");
        scheduler.advance(std::time::Duration::from_secs(1));
        mlme.handle_timeout().expect("timeout failed");
        assert_variant!(
            device_handle.next_mlme_event().expect("no event"),
            MlmeEvent::ScanConf(conf) => {
                assert_eq!(conf.result_code, ScanResultCode::Success);
                assert_eq!(conf.bss_description_set.len(), 1);
            }
        );

        // Join switches the main channel and completes on a beacon.
        mlme.handle_mlme_msg(MlmeRequest::Join(join_request())).expect("join failed");
        assert_eq!(device_handle.channel().primary, 11);
        mlme.on_mac_frame(&test_utils::beacon_frame(BSSID, b"ssid", 11), rx);
        assert_variant!(
            device_handle.next_mlme_event().expect("no event"),
            MlmeEvent::JoinConf(conf) => assert_eq!(conf.result_code, JoinResultCode::Success)
        );
    }
}
