// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! State kept by an AP for one peer station.

use {
    super::{send_mlme, write_assoc_resp_frame, write_auth_resp_frame, write_data_frame_from_ap, Context, TimedEvent},
    crate::{
        buffer_reader::BufferReader,
        device::{AssocContext, Device},
        error::Error,
        ie,
        mac::{self, DataHdr, LlcHdr, StatusCode},
        service::{
            AssociateIndication, AssociateResultCode, AuthenticateIndication,
            AuthenticateResultCode, AuthenticationType, DeauthenticateConfirm,
            DeauthenticateIndication, DisassociateIndication, EapolIndication, MlmeEvent,
        },
        timer::EventId,
        MacAddr,
    },
    log::{debug, error},
    std::{collections::VecDeque, mem, time::Duration},
};

struct BufferedFrame {
    dst: MacAddr,
    src: MacAddr,
    ether_type: u16,
    payload: Vec<u8>,
}

enum State {
    Authenticating { timeout: EventId },
    Authenticated,
    Associating { timeout: EventId },
    Associated { aid: u16, dozing: bool, rsna_established: bool, ps_queue: VecDeque<BufferedFrame> },
}

pub struct RemoteClient {
    pub addr: MacAddr,
    state: Option<State>,
}

impl RemoteClient {
    pub fn new(addr: MacAddr) -> Self {
        RemoteClient { addr, state: None }
    }

    pub fn associated(&self) -> bool {
        matches!(self.state, Some(State::Associated { .. }))
    }

    pub fn handshake_pending(&self) -> bool {
        matches!(self.state, Some(State::Authenticating { .. }) | Some(State::Associating { .. }))
    }

    pub fn cancel_timeout<D: Device>(&self, ctx: &mut Context<D>) {
        match &self.state {
            Some(State::Authenticating { timeout }) | Some(State::Associating { timeout }) => {
                ctx.timer.cancel_event(*timeout)
            }
            _ => (),
        }
    }

    fn schedule_expiration<D: Device>(
        &self,
        ctx: &mut Context<D>,
        duration: Duration,
    ) -> Result<EventId, Error> {
        ctx.timer.schedule_after(duration, TimedEvent::ClientExpiration(self.addr))
    }

    /// A valid open authentication frame arrived. Raises an indication and waits
    /// for the SME to accept or refuse the peer.
    pub fn handle_auth_frame<D: Device>(
        &mut self,
        ctx: &mut Context<D>,
        timeout_duration: Duration,
    ) -> Result<(), Error> {
        self.cancel_timeout(ctx);
        let timeout = self.schedule_expiration(ctx, timeout_duration)?;
        self.state = Some(State::Authenticating { timeout });
        send_mlme(
            ctx,
            MlmeEvent::AuthenticateInd(AuthenticateIndication {
                peer_sta_address: self.addr,
                auth_type: AuthenticationType::OpenSystem,
            }),
        );
        Ok(())
    }

    /// Returns false when the client record should be dropped.
    pub fn handle_authenticate_response<D: Device>(
        &mut self,
        ctx: &mut Context<D>,
        bssid: MacAddr,
        result_code: AuthenticateResultCode,
    ) -> Result<bool, Error> {
        match self.state.take() {
            Some(State::Authenticating { timeout }) => ctx.timer.cancel_event(timeout),
            other => {
                self.state = other;
                return Err(Error::status("client is not authenticating"));
            }
        }
        let accepted = result_code == AuthenticateResultCode::Success;
        let status = if accepted { StatusCode::Success } else { StatusCode::RefusedReasonUnspecified };
        let mut frame = vec![];
        write_auth_resp_frame(&mut frame, self.addr, bssid, status, &mut ctx.seq_mgr)?;
        ctx.device.send_wlan(frame)?;
        if accepted {
            self.state = Some(State::Authenticated);
        }
        Ok(accepted)
    }

    pub fn handle_assoc_req_frame<D: Device>(
        &mut self,
        ctx: &mut Context<D>,
        listen_interval: u16,
        elements: &[u8],
        timeout_duration: Duration,
    ) -> Result<(), Error> {
        match self.state {
            Some(State::Authenticated) => (),
            _ => return Err(Error::status("client is not authenticated")),
        }
        let ssid = ie::find(elements, ie::Id::SSID).map(|body| body.to_vec());
        let rsne = ie::find(elements, ie::Id::RSNE).map(|body| body.to_vec());
        let timeout = self.schedule_expiration(ctx, timeout_duration)?;
        self.state = Some(State::Associating { timeout });
        send_mlme(
            ctx,
            MlmeEvent::AssociateInd(AssociateIndication {
                peer_sta_address: self.addr,
                listen_interval,
                ssid,
                rsne,
            }),
        );
        Ok(())
    }

    pub fn handle_associate_response<D: Device>(
        &mut self,
        ctx: &mut Context<D>,
        bssid: MacAddr,
        capabilities: mac::CapabilityInfo,
        rates: &[u8],
        result_code: AssociateResultCode,
        association_id: u16,
    ) -> Result<(), Error> {
        match self.state.take() {
            Some(State::Associating { timeout }) => ctx.timer.cancel_event(timeout),
            other => {
                self.state = other;
                return Err(Error::status("client is not associating"));
            }
        }
        let accepted = result_code == AssociateResultCode::Success;
        let (status, wire_aid) = if accepted {
            (StatusCode::Success, association_id | 0xC000)
        } else {
            (assoc_refusal_status(result_code), 0)
        };
        let mut frame = vec![];
        write_assoc_resp_frame(
            &mut frame,
            self.addr,
            bssid,
            capabilities,
            status,
            wire_aid,
            rates,
            &mut ctx.seq_mgr,
        )?;
        ctx.device.send_wlan(frame)?;
        if accepted {
            ctx.device.configure_assoc(AssocContext {
                addr: self.addr,
                aid: association_id,
                rates: rates.to_vec(),
                ht_cap: None,
                ht_op: None,
                vht_cap: None,
                vht_op: None,
            })?;
            self.state = Some(State::Associated {
                aid: association_id,
                dozing: false,
                rsna_established: false,
                ps_queue: VecDeque::new(),
            });
        } else {
            self.state = Some(State::Authenticated);
        }
        Ok(())
    }

    pub fn establish_rsna(&mut self) {
        if let Some(State::Associated { rsna_established, .. }) = &mut self.state {
            *rsna_established = true;
        }
    }

    fn controlled_port_open(&self, protected_bss: bool) -> bool {
        match &self.state {
            Some(State::Associated { rsna_established, .. }) => {
                !protected_bss || *rsna_established
            }
            _ => false,
        }
    }

    pub fn handle_data_frame<D: Device>(
        &mut self,
        ctx: &mut Context<D>,
        bssid: MacAddr,
        protected_bss: bool,
        data_hdr: &DataHdr,
        body: &[u8],
    ) {
        if !self.associated() {
            debug!("dropping data frame from non-associated client");
            return;
        }
        let frame_ctrl = data_hdr.frame_ctrl;
        self.set_dozing(ctx, bssid, protected_bss, frame_ctrl.power_mgmt());
        if mac::is_null_data(frame_ctrl) {
            return;
        }
        let mut reader = BufferReader::new(body);
        let llc_hdr = match reader.read::<LlcHdr>() {
            Some(llc_hdr) => llc_hdr,
            None => return,
        };
        let payload = reader.into_remaining();
        let dst = mac::data_dst_addr(data_hdr);
        let ether_type = llc_hdr.protocol_id.get();
        if ether_type == mac::ETHER_TYPE_EAPOL {
            send_mlme(
                ctx,
                MlmeEvent::EapolInd(EapolIndication {
                    src_addr: self.addr,
                    dst_addr: dst,
                    data: payload.to_vec(),
                }),
            );
            return;
        }
        if !self.controlled_port_open(protected_bss) {
            return;
        }
        let mut eth_frame = vec![];
        if crate::client::write_eth_frame(&mut eth_frame, dst, self.addr, ether_type, payload)
            .is_ok()
        {
            if let Err(e) = ctx.device.send_eth(eth_frame) {
                error!("failed delivering ethernet frame: {}", e);
            }
        }
    }

    /// Buffers or transmits an outbound frame depending on the client's power
    /// save state.
    pub fn handle_eth_frame<D: Device>(
        &mut self,
        ctx: &mut Context<D>,
        bssid: MacAddr,
        protected_bss: bool,
        dst: MacAddr,
        src: MacAddr,
        ether_type: u16,
        body: &[u8],
    ) -> Result<(), Error> {
        if !self.controlled_port_open(protected_bss) {
            return Err(Error::status("dropping ethernet frame: controlled port closed"));
        }
        let (dozing, rsna_established, ps_queue) = match &mut self.state {
            Some(State::Associated { dozing, rsna_established, ps_queue, .. }) => {
                (*dozing, *rsna_established, ps_queue)
            }
            _ => return Err(Error::status("client not associated")),
        };
        if dozing {
            ps_queue.push_back(BufferedFrame { dst, src, ether_type, payload: body.to_vec() });
            return Ok(());
        }
        let protect = protected_bss && rsna_established;
        let mut frame = vec![];
        write_data_frame_from_ap(
            &mut frame,
            &mut ctx.seq_mgr,
            bssid,
            dst,
            src,
            protect,
            false,
            ether_type,
            body,
        )?;
        ctx.device.send_wlan(frame)
    }

    fn set_dozing<D: Device>(
        &mut self,
        ctx: &mut Context<D>,
        bssid: MacAddr,
        protected_bss: bool,
        dozing: bool,
    ) {
        let (was_dozing, rsna_established, ps_queue) = match &mut self.state {
            Some(State::Associated { dozing: d, rsna_established, ps_queue, .. }) => {
                let was = *d;
                *d = dozing;
                (was, *rsna_established, ps_queue)
            }
            _ => return,
        };
        if !(was_dozing && !dozing) {
            return;
        }
        // Flush in FIFO order; every frame but the last announces more data.
        let protect = protected_bss && rsna_established;
        let mut queue = mem::take(ps_queue);
        while let Some(buffered) = queue.pop_front() {
            let more_data = !queue.is_empty();
            let mut frame = vec![];
            let write = write_data_frame_from_ap(
                &mut frame,
                &mut ctx.seq_mgr,
                bssid,
                buffered.dst,
                buffered.src,
                protect,
                more_data,
                buffered.ether_type,
                &buffered.payload,
            );
            if write.is_ok() {
                if let Err(e) = ctx.device.send_wlan(frame) {
                    error!("failed flushing buffered frame: {}", e);
                }
            }
        }
    }

    pub fn deauthenticate_indication(&self, reason_code: u16) -> Option<MlmeEvent> {
        Some(MlmeEvent::DeauthenticateInd(DeauthenticateIndication {
            peer_sta_address: self.addr,
            reason_code,
        }))
    }

    pub fn disassociate_indication(&self, reason_code: u16) -> Option<MlmeEvent> {
        Some(MlmeEvent::DisassociateInd(DisassociateIndication {
            peer_sta_address: self.addr,
            reason_code,
        }))
    }

    pub fn deauthenticate_confirm(&self) -> Option<MlmeEvent> {
        Some(MlmeEvent::DeauthenticateConf(DeauthenticateConfirm { peer_sta_address: self.addr }))
    }
}

fn assoc_refusal_status(result_code: AssociateResultCode) -> StatusCode {
    match result_code {
        AssociateResultCode::Success => StatusCode::Success,
        AssociateResultCode::RefusedNotAuthenticated => StatusCode::RefusedNotAuthenticated,
        AssociateResultCode::RefusedCapabilitiesMismatch => StatusCode::RefusedCapabilitiesMismatch,
        AssociateResultCode::RefusedApOutOfMemory => StatusCode::RefusedApOutOfMemory,
        AssociateResultCode::RefusedBasicRatesMismatch => StatusCode::RefusedBasicRatesMismatch,
        AssociateResultCode::RefusedTemporarily => StatusCode::RefusedTemporarily,
        AssociateResultCode::RefusedReasonUnspecified
        | AssociateResultCode::RefusedExternalReason => StatusCode::RefusedReasonUnspecified,
    }
}
