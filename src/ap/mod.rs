// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Access point: BSS lifecycle, per-client state and the AP data path.

mod beacon_sender;
mod remote_client;

use {
    crate::{
        device::{BssConfig, BssType, Device},
        error::Error,
        mac::{
            self, AuthHdr, DataHdr, FrameControl, MacFrame, MgmtBody, SequenceControl, StatusCode,
        },
        sequence::SequenceManager,
        service::{
            AssociateResponse, AuthenticateResponse, DeauthenticateRequest, EapolConfirm,
            EapolRequest, EapolResultCode, MlmeEvent, MlmeRequest, SetKeysRequest, StartConfirm,
            StartRequest, StartResultCode,
        },
        time::TimeUnit,
        timer::{Scheduler, Timer},
        MacAddr, BCAST_ADDR,
    },
    beacon_sender::BeaconSender,
    log::{debug, error, warn},
    remote_client::RemoteClient,
    std::collections::HashMap,
    zerocopy::AsBytes,
};

/// Clients that never complete an SME-driven handshake are expired after this
/// many beacon periods.
const CLIENT_TIMEOUT_BCN_PERIODS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimedEvent {
    ClientExpiration(MacAddr),
}

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

/// One running infrastructure BSS: its published parameters and the map of
/// known clients.
pub struct InfraBss {
    pub ssid: Vec<u8>,
    pub rsne: Option<Vec<u8>>,
    pub beacon_period: TimeUnit,
    pub rates: Vec<u8>,
    pub channel: u8,
    clients: HashMap<MacAddr, RemoteClient>,
    beacon_sender: BeaconSender,
}

impl InfraBss {
    fn start<D: Device>(
        ctx: &mut Context<D>,
        bssid: MacAddr,
        req: &StartRequest,
    ) -> Result<Self, Error> {
        ctx.device.configure_bss(BssConfig {
            bssid,
            bss_type: BssType::Infrastructure,
            remote: false,
        })?;
        let beacon_sender = BeaconSender::new(
            req.ssid.clone(),
            TimeUnit(req.beacon_period),
            req.dtim_period,
            capabilities(req.rsne.is_some()),
            req.rates.clone(),
            req.channel,
            req.rsne.clone(),
        );
        beacon_sender.start(ctx, bssid)?;
        Ok(InfraBss {
            ssid: req.ssid.clone(),
            rsne: req.rsne.clone(),
            beacon_period: TimeUnit(req.beacon_period),
            rates: req.rates.clone(),
            channel: req.channel,
            clients: HashMap::new(),
            beacon_sender,
        })
    }

    pub fn protected(&self) -> bool {
        self.rsne.is_some()
    }

    fn client_timeout_duration(&self) -> std::time::Duration {
        self.beacon_period.into_duration_times(CLIENT_TIMEOUT_BCN_PERIODS)
    }

    fn handle_mgmt_frame<D: Device>(
        &mut self,
        ctx: &mut Context<D>,
        bssid: MacAddr,
        client_addr: MacAddr,
        subtype: u16,
        body: &[u8],
    ) {
        match MgmtBody::parse(subtype, body) {
            Some(MgmtBody::ProbeReq { .. }) => {
                if let Err(e) = self.beacon_sender.send_probe_resp(ctx, bssid, client_addr) {
                    error!("failed sending probe response: {}", e);
                }
            }
            Some(MgmtBody::Authentication { auth_hdr, .. }) => {
                self.handle_auth_frame(ctx, bssid, client_addr, &auth_hdr)
            }
            Some(MgmtBody::AssociationReq { assoc_req_hdr, elements }) => {
                let listen_interval = assoc_req_hdr.listen_interval.get();
                self.handle_assoc_req_frame(ctx, bssid, client_addr, listen_interval, elements)
            }
            Some(MgmtBody::Deauthentication { deauth_hdr }) => {
                let reason_code = deauth_hdr.reason_code.get();
                self.remove_client(ctx, client_addr, |client| {
                    client.deauthenticate_indication(reason_code)
                });
            }
            Some(MgmtBody::Disassociation { disassoc_hdr }) => {
                let reason_code = disassoc_hdr.reason_code.get();
                self.remove_client(ctx, client_addr, |client| {
                    client.disassociate_indication(reason_code)
                });
            }
            _ => (),
        }
    }

    fn handle_auth_frame<D: Device>(
        &mut self,
        ctx: &mut Context<D>,
        bssid: MacAddr,
        client_addr: MacAddr,
        auth_hdr: &AuthHdr,
    ) {
        if auth_hdr.auth_alg_num.get() != mac::AUTH_ALGORITHM_OPEN
            || auth_hdr.auth_txn_seq_num.get() != 1
        {
            let mut frame = vec![];
            let write = write_auth_resp_frame(
                &mut frame,
                client_addr,
                bssid,
                StatusCode::RefusedReasonUnspecified,
                &mut ctx.seq_mgr,
            );
            if write.is_ok() {
                if let Err(e) = ctx.device.send_wlan(frame) {
                    error!("failed refusing authentication: {}", e);
                }
            }
            return;
        }
        let timeout_duration = self.client_timeout_duration();
        let client = self
            .clients
            .entry(client_addr)
            .or_insert_with(|| RemoteClient::new(client_addr));
        if let Err(e) = client.handle_auth_frame(ctx, timeout_duration) {
            warn!("client {:02x?} authentication not started: {}", client_addr, e);
            self.clients.remove(&client_addr);
        }
    }

    fn handle_assoc_req_frame<D: Device>(
        &mut self,
        ctx: &mut Context<D>,
        bssid: MacAddr,
        client_addr: MacAddr,
        listen_interval: u16,
        elements: &[u8],
    ) {
        let timeout_duration = self.client_timeout_duration();
        match self.clients.get_mut(&client_addr) {
            Some(client) => {
                if let Err(e) =
                    client.handle_assoc_req_frame(ctx, listen_interval, elements, timeout_duration)
                {
                    warn!("client {:02x?} association not started: {}", client_addr, e);
                }
            }
            None => {
                // Class 2 frame from an unknown station.
                let mut frame = vec![];
                let write = write_deauth_frame_from_ap(
                    &mut frame,
                    client_addr,
                    bssid,
                    mac::ReasonCode::InvalidClass2Frame as u16,
                    &mut ctx.seq_mgr,
                );
                if write.is_ok() {
                    if let Err(e) = ctx.device.send_wlan(frame) {
                        error!("failed sending deauthentication: {}", e);
                    }
                }
            }
        }
    }

    fn handle_data_frame<D: Device>(
        &mut self,
        ctx: &mut Context<D>,
        bssid: MacAddr,
        data_hdr: &DataHdr,
        body: &[u8],
    ) {
        let client_addr = data_hdr.addr2;
        let protected_bss = self.protected();
        let client = match self.clients.get_mut(&client_addr) {
            Some(client) => client,
            None => {
                debug!("dropping data frame from unknown client");
                return;
            }
        };
        client.handle_data_frame(ctx, bssid, protected_bss, data_hdr, body);
    }

    fn handle_eth_frame<D: Device>(
        &mut self,
        ctx: &mut Context<D>,
        bssid: MacAddr,
        dst: MacAddr,
        src: MacAddr,
        ether_type: u16,
        body: &[u8],
    ) -> Result<(), Error> {
        if dst[0] & 0x01 != 0 {
            // Group addressed traffic is never buffered for power save.
            let mut frame = vec![];
            write_data_frame_from_ap(
                &mut frame,
                &mut ctx.seq_mgr,
                bssid,
                dst,
                src,
                self.protected(),
                false,
                ether_type,
                body,
            )?;
            return ctx.device.send_wlan(frame);
        }
        let protected_bss = self.protected();
        match self.clients.get_mut(&dst) {
            Some(client) => client.handle_eth_frame(ctx, bssid, protected_bss, dst, src, ether_type, body),
            None => Err(Error::status("dropping ethernet frame: unknown destination")),
        }
    }

    fn handle_authenticate_response<D: Device>(
        &mut self,
        ctx: &mut Context<D>,
        bssid: MacAddr,
        resp: AuthenticateResponse,
    ) -> Result<(), Error> {
        let client = self
            .clients
            .get_mut(&resp.peer_sta_address)
            .ok_or_else(|| Error::status("authenticate response for unknown client"))?;
        let keep = client.handle_authenticate_response(ctx, bssid, resp.result_code)?;
        if !keep {
            self.clients.remove(&resp.peer_sta_address);
        }
        Ok(())
    }

    fn handle_associate_response<D: Device>(
        &mut self,
        ctx: &mut Context<D>,
        bssid: MacAddr,
        resp: AssociateResponse,
    ) -> Result<(), Error> {
        let rates = self.rates.clone();
        let capabilities = capabilities(self.protected());
        let client = self
            .clients
            .get_mut(&resp.peer_sta_address)
            .ok_or_else(|| Error::status("associate response for unknown client"))?;
        client.handle_associate_response(
            ctx,
            bssid,
            capabilities,
            &rates,
            resp.result_code,
            resp.association_id,
        )
    }

    fn handle_deauthenticate_req<D: Device>(
        &mut self,
        ctx: &mut Context<D>,
        bssid: MacAddr,
        req: DeauthenticateRequest,
    ) -> Result<(), Error> {
        if !self.clients.contains_key(&req.peer_sta_address) {
            return Err(Error::status("cannot deauthenticate: unknown client"));
        }
        let mut frame = vec![];
        write_deauth_frame_from_ap(
            &mut frame,
            req.peer_sta_address,
            bssid,
            req.reason_code,
            &mut ctx.seq_mgr,
        )?;
        if let Err(e) = ctx.device.send_wlan(frame) {
            warn!("failed sending deauthentication frame: {}", e);
        }
        self.remove_client(ctx, req.peer_sta_address, RemoteClient::deauthenticate_confirm);
        Ok(())
    }

    fn handle_set_keys<D: Device>(
        &mut self,
        ctx: &mut Context<D>,
        req: SetKeysRequest,
    ) -> Result<(), Error> {
        for desc in req.keylist {
            if desc.address[0] & 0x01 == 0 {
                let client = self
                    .clients
                    .get_mut(&desc.address)
                    .filter(|client| client.associated())
                    .ok_or_else(|| Error::status("cannot set key: client not associated"))?;
                client.establish_rsna();
            }
            ctx.device.set_key(crate::device::Key {
                key_type: desc.key_type,
                address: desc.address,
                key_id: desc.key_id,
                key: desc.key,
                rsc: desc.rsc,
                cipher_oui: desc.cipher_suite_oui,
                cipher_type: desc.cipher_suite_type,
            })?;
        }
        Ok(())
    }

    fn handle_eapol_req<D: Device>(
        &mut self,
        ctx: &mut Context<D>,
        bssid: MacAddr,
        req: EapolRequest,
    ) -> Result<(), Error> {
        let mut frame = vec![];
        write_data_frame_from_ap(
            &mut frame,
            &mut ctx.seq_mgr,
            bssid,
            req.dst_addr,
            req.src_addr,
            false,
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

    fn handle_client_expiration<D: Device>(
        &mut self,
        ctx: &mut Context<D>,
        client_addr: MacAddr,
    ) {
        let expired = match self.clients.get(&client_addr) {
            Some(client) => client.handshake_pending(),
            None => false,
        };
        if expired {
            debug!("client {:02x?} expired before completing handshake", client_addr);
            self.remove_client(ctx, client_addr, |_| None);
        }
    }

    /// Removes a client record, clearing any installed association context and
    /// dropping its power save queue. `indication` may produce one final MLME
    /// event describing the removal.
    fn remove_client<D: Device>(
        &mut self,
        ctx: &mut Context<D>,
        client_addr: MacAddr,
        indication: impl FnOnce(&RemoteClient) -> Option<MlmeEvent>,
    ) {
        let client = match self.clients.remove(&client_addr) {
            Some(client) => client,
            None => return,
        };
        client.cancel_timeout(ctx);
        if client.associated() {
            if let Err(e) = ctx.device.clear_assoc(&client_addr) {
                error!("failed clearing association: {}", e);
            }
        }
        if let Some(event) = indication(&client) {
            send_mlme(ctx, event);
        }
    }

    fn stop<D: Device>(&mut self, ctx: &mut Context<D>) {
        if let Err(e) = ctx.device.disable_beaconing() {
            error!("failed disabling beaconing: {}", e);
        }
        for (addr, client) in self.clients.drain() {
            client.cancel_timeout(ctx);
            if client.associated() {
                if let Err(e) = ctx.device.clear_assoc(&addr) {
                    error!("failed clearing association: {}", e);
                }
            }
        }
    }
}

fn capabilities(protected: bool) -> mac::CapabilityInfo {
    mac::CapabilityInfo(0).with_ess(true).with_privacy(protected)
}

/// Top level access point MLME: owns the context and at most one running BSS.
pub struct Ap<D: Device> {
    ctx: Context<D>,
    bssid: MacAddr,
    bss: Option<InfraBss>,
}

impl<D: Device> Ap<D> {
    pub fn new(device: D, scheduler: Box<dyn Scheduler>, bssid: MacAddr) -> Self {
        Ap {
            ctx: Context {
                device,
                timer: Timer::new(scheduler),
                seq_mgr: SequenceManager::new(),
            },
            bssid,
            bss: None,
        }
    }

    pub fn handle_mlme_msg(&mut self, msg: MlmeRequest) -> Result<(), Error> {
        match msg {
            MlmeRequest::Start(req) => {
                self.handle_start_req(req);
                Ok(())
            }
            MlmeRequest::AuthenticateResponse(resp) => match &mut self.bss {
                Some(bss) => bss.handle_authenticate_response(&mut self.ctx, self.bssid, resp),
                None => Err(Error::status("no BSS started")),
            },
            MlmeRequest::AssociateResponse(resp) => match &mut self.bss {
                Some(bss) => bss.handle_associate_response(&mut self.ctx, self.bssid, resp),
                None => Err(Error::status("no BSS started")),
            },
            MlmeRequest::Deauthenticate(req) => match &mut self.bss {
                Some(bss) => bss.handle_deauthenticate_req(&mut self.ctx, self.bssid, req),
                None => Err(Error::status("no BSS started")),
            },
            MlmeRequest::SetKeys(req) => match &mut self.bss {
                Some(bss) => bss.handle_set_keys(&mut self.ctx, req),
                None => Err(Error::status("no BSS started")),
            },
            MlmeRequest::Eapol(req) => match &mut self.bss {
                Some(bss) => bss.handle_eapol_req(&mut self.ctx, self.bssid, req),
                None => Err(Error::status("no BSS started")),
            },
            other => Err(Error::status(format!("unsupported request for AP: {:?}", other))),
        }
    }

    fn handle_start_req(&mut self, req: StartRequest) {
        let result_code = if self.bss.is_some() {
            StartResultCode::BssAlreadyStartedOrJoined
        } else if req.bss_type != crate::service::BssType::Infrastructure
            || req.ssid.len() > crate::ie::SSID_MAX_LEN
        {
            StartResultCode::NotSupported
        } else {
            match InfraBss::start(&mut self.ctx, self.bssid, &req) {
                Ok(bss) => {
                    self.bss = Some(bss);
                    StartResultCode::Success
                }
                Err(e) => {
                    error!("failed starting BSS: {}", e);
                    StartResultCode::InternalError
                }
            }
        };
        send_mlme(&mut self.ctx, MlmeEvent::StartConf(StartConfirm { result_code }));
    }

    pub fn stop(&mut self) {
        if let Some(mut bss) = self.bss.take() {
            bss.stop(&mut self.ctx);
        }
    }

    pub fn on_mac_frame(&mut self, frame: &[u8]) {
        let bss = match &mut self.bss {
            Some(bss) => bss,
            None => return,
        };
        match MacFrame::parse(frame) {
            Some(MacFrame::Mgmt { mgmt_hdr, body }) => {
                if mgmt_hdr.addr1 != self.bssid && mgmt_hdr.addr1 != BCAST_ADDR {
                    return;
                }
                if mgmt_hdr.addr3 != self.bssid && mgmt_hdr.addr3 != BCAST_ADDR {
                    return;
                }
                let subtype = { mgmt_hdr.frame_ctrl }.frame_subtype();
                let client_addr = mgmt_hdr.addr2;
                bss.handle_mgmt_frame(&mut self.ctx, self.bssid, client_addr, subtype, body);
            }
            Some(MacFrame::Data { data_hdr, body, .. }) => {
                if mac::data_bssid(&data_hdr) != Some(self.bssid) {
                    return;
                }
                bss.handle_data_frame(&mut self.ctx, self.bssid, &data_hdr, body);
            }
            _ => (),
        }
    }

    pub fn on_eth_frame(&mut self, frame: &[u8]) -> Result<(), Error> {
        let bss = match &mut self.bss {
            Some(bss) => bss,
            None => return Err(Error::status("dropping ethernet frame: no BSS started")),
        };
        let mut reader = crate::buffer_reader::BufferReader::new(frame);
        let eth_hdr = reader.read::<mac::EthernetIIHdr>().ok_or(
            crate::error::FrameParseError::FrameTooShort {
                expected: std::mem::size_of::<mac::EthernetIIHdr>(),
                actual: frame.len(),
            },
        )?;
        bss.handle_eth_frame(
            &mut self.ctx,
            self.bssid,
            eth_hdr.da,
            eth_hdr.sa,
            eth_hdr.ether_type.get(),
            reader.peek_remaining(),
        )
    }

    pub fn handle_timeout(&mut self) {
        let now = self.ctx.timer.now();
        while let Some((_id, event)) = self.ctx.timer.next_due(now) {
            match event {
                TimedEvent::ClientExpiration(addr) => {
                    if let Some(bss) = &mut self.bss {
                        bss.handle_client_expiration(&mut self.ctx, addr);
                    }
                }
            }
        }
    }
}

// --- Frame writers ---

pub fn write_auth_resp_frame(
    buf: &mut Vec<u8>,
    client_addr: MacAddr,
    bssid: MacAddr,
    status: StatusCode,
    seq_mgr: &mut SequenceManager,
) -> Result<(), Error> {
    let frame_ctrl = FrameControl(0)
        .with_frame_type(mac::FRAME_TYPE_MGMT)
        .with_frame_subtype(mac::MGMT_SUBTYPE_AUTH);
    let seq_ctrl = SequenceControl(0).with_seq_num(seq_mgr.next_sns1(&client_addr) as u16);
    buf.extend_from_slice(
        mac::mgmt_hdr_from_ap(frame_ctrl, client_addr, bssid, seq_ctrl).as_bytes(),
    );
    let auth_hdr = AuthHdr {
        auth_alg_num: mac::AUTH_ALGORITHM_OPEN.into(),
        auth_txn_seq_num: 2.into(),
        status_code: (status as u16).into(),
    };
    buf.extend_from_slice(auth_hdr.as_bytes());
    Ok(())
}

pub fn write_assoc_resp_frame(
    buf: &mut Vec<u8>,
    client_addr: MacAddr,
    bssid: MacAddr,
    capabilities: mac::CapabilityInfo,
    status: StatusCode,
    aid: u16,
    rates: &[u8],
    seq_mgr: &mut SequenceManager,
) -> Result<(), Error> {
    let frame_ctrl = FrameControl(0)
        .with_frame_type(mac::FRAME_TYPE_MGMT)
        .with_frame_subtype(mac::MGMT_SUBTYPE_ASSOC_RESP);
    let seq_ctrl = SequenceControl(0).with_seq_num(seq_mgr.next_sns1(&client_addr) as u16);
    buf.extend_from_slice(
        mac::mgmt_hdr_from_ap(frame_ctrl, client_addr, bssid, seq_ctrl).as_bytes(),
    );
    let assoc_resp_hdr = mac::AssocRespHdr {
        capabilities: capabilities.0.into(),
        status_code: (status as u16).into(),
        aid: aid.into(),
    };
    buf.extend_from_slice(assoc_resp_hdr.as_bytes());
    crate::ie::write_supported_rates(buf, rates)?;
    Ok(())
}

pub fn write_deauth_frame_from_ap(
    buf: &mut Vec<u8>,
    client_addr: MacAddr,
    bssid: MacAddr,
    reason_code: u16,
    seq_mgr: &mut SequenceManager,
) -> Result<(), Error> {
    let frame_ctrl = FrameControl(0)
        .with_frame_type(mac::FRAME_TYPE_MGMT)
        .with_frame_subtype(mac::MGMT_SUBTYPE_DEAUTH);
    let seq_ctrl = SequenceControl(0).with_seq_num(seq_mgr.next_sns1(&client_addr) as u16);
    buf.extend_from_slice(
        mac::mgmt_hdr_from_ap(frame_ctrl, client_addr, bssid, seq_ctrl).as_bytes(),
    );
    buf.extend_from_slice(mac::DeauthHdr { reason_code: reason_code.into() }.as_bytes());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn write_data_frame_from_ap(
    buf: &mut Vec<u8>,
    seq_mgr: &mut SequenceManager,
    bssid: MacAddr,
    dst: MacAddr,
    src: MacAddr,
    protected: bool,
    more_data: bool,
    ether_type: u16,
    payload: &[u8],
) -> Result<(), Error> {
    let data_hdr = DataHdr {
        frame_ctrl: FrameControl(0)
            .with_frame_type(mac::FRAME_TYPE_DATA)
            .with_from_ds(true)
            .with_protected(protected)
            .with_more_data(more_data),
        duration: 0,
        addr1: dst,
        addr2: bssid,
        addr3: src,
        seq_ctrl: SequenceControl(0).with_seq_num(seq_mgr.next_sns1(&dst) as u16),
    };
    buf.extend_from_slice(data_hdr.as_bytes());
    buf.extend_from_slice(mac::llc_snap_hdr(ether_type).as_bytes());
    buf.extend_from_slice(payload);
    Ok(())
}
