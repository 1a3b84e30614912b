// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Typed messages exchanged with the SME over the service transport.
//!
//! Requests flow from the SME into the MLME; confirms and indications flow back
//! wrapped in [`MlmeEvent`] and handed to `Device::send_mlme_event`. Result codes
//! round-trip bit-for-bit through `FromPrimitive`/`ToPrimitive`.

use {
    crate::MacAddr,
    num_derive::{FromPrimitive, ToPrimitive},
};

#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive, ToPrimitive)]
pub enum JoinResultCode {
    Success = 0,
    JoinFailureTimeout = 1,
}

#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive, ToPrimitive)]
pub enum AuthenticateResultCode {
    Success = 0,
    Refused = 1,
    AntiCloggingTokenRequired = 2,
    FiniteCyclicGroupNotSupported = 3,
    AuthFailureTimeout = 4,
}

#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive, ToPrimitive)]
pub enum AssociateResultCode {
    Success = 0,
    RefusedReasonUnspecified = 1,
    RefusedNotAuthenticated = 2,
    RefusedCapabilitiesMismatch = 3,
    RefusedExternalReason = 4,
    RefusedApOutOfMemory = 5,
    RefusedBasicRatesMismatch = 6,
    RefusedTemporarily = 7,
}

#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive, ToPrimitive)]
pub enum ScanResultCode {
    Success = 0,
    NotSupported = 1,
    InvalidArgs = 2,
    InternalError = 3,
}

#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive, ToPrimitive)]
pub enum StartResultCode {
    Success = 0,
    BssAlreadyStartedOrJoined = 1,
    InternalError = 2,
    NotSupported = 3,
}

#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive, ToPrimitive)]
pub enum EapolResultCode {
    Success = 0,
    TransmissionFailure = 1,
}

#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive, ToPrimitive)]
pub enum AuthenticationType {
    OpenSystem = 1,
    SharedKey = 2,
    FastBssTransition = 3,
    Sae = 4,
}

#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive, ToPrimitive)]
pub enum KeyType {
    Group = 1,
    Pairwise = 2,
    PeerKey = 3,
    Igtk = 4,
}

#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive, ToPrimitive)]
pub enum ScanType {
    Active = 1,
    Passive = 2,
}

#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive, ToPrimitive)]
pub enum BssType {
    Infrastructure = 1,
    Personal = 2,
    Independent = 3,
    Mesh = 4,
}

/// One discovered BSS, as reported in a scan confirm.
#[derive(Debug, Clone, PartialEq)]
pub struct BssDescription {
    pub bssid: MacAddr,
    pub ssid: Vec<u8>,
    pub bss_type: BssType,
    pub beacon_period: u16,
    pub capability_info: u16,
    pub channel: u8,
    pub rssi_dbm: i8,
    pub snr_db: i16,
    pub rates: Vec<u8>,
    pub rsne: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub selected_bss: BssDescription,
    /// In beacon periods of the selected BSS.
    pub join_failure_timeout: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinConfirm {
    pub result_code: JoinResultCode,
}

#[derive(Debug, Clone)]
pub struct AuthenticateRequest {
    pub peer_sta_address: MacAddr,
    pub auth_type: AuthenticationType,
    /// In beacon periods of the joined BSS.
    pub auth_failure_timeout: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticateConfirm {
    pub peer_sta_address: MacAddr,
    pub auth_type: AuthenticationType,
    pub result_code: AuthenticateResultCode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticateIndication {
    pub peer_sta_address: MacAddr,
    pub auth_type: AuthenticationType,
}

#[derive(Debug, Clone)]
pub struct AuthenticateResponse {
    pub peer_sta_address: MacAddr,
    pub result_code: AuthenticateResultCode,
}

#[derive(Debug, Clone)]
pub struct AssociateRequest {
    pub peer_sta_address: MacAddr,
    pub rates: Vec<u8>,
    pub rsne: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssociateConfirm {
    pub result_code: AssociateResultCode,
    pub association_id: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssociateIndication {
    pub peer_sta_address: MacAddr,
    pub listen_interval: u16,
    pub ssid: Option<Vec<u8>>,
    pub rsne: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct AssociateResponse {
    pub peer_sta_address: MacAddr,
    pub result_code: AssociateResultCode,
    pub association_id: u16,
}

#[derive(Debug, Clone)]
pub struct DeauthenticateRequest {
    pub peer_sta_address: MacAddr,
    pub reason_code: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeauthenticateConfirm {
    pub peer_sta_address: MacAddr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeauthenticateIndication {
    pub peer_sta_address: MacAddr,
    pub reason_code: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisassociateIndication {
    pub peer_sta_address: MacAddr,
    pub reason_code: u16,
}

#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub txn_id: u64,
    pub scan_type: ScanType,
    pub channel_list: Vec<u8>,
    pub ssid: Vec<u8>,
    /// All channel times in 802.11 time units.
    pub probe_delay: u32,
    pub min_channel_time: u32,
    pub max_channel_time: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfirm {
    pub txn_id: u64,
    pub result_code: ScanResultCode,
    pub bss_description_set: Vec<BssDescription>,
}

#[derive(Debug, Clone)]
pub struct KeyDescriptor {
    pub key: Vec<u8>,
    pub key_id: u16,
    pub key_type: KeyType,
    pub address: MacAddr,
    pub rsc: u64,
    pub cipher_suite_oui: [u8; 3],
    pub cipher_suite_type: u8,
}

#[derive(Debug, Clone)]
pub struct SetKeysRequest {
    pub keylist: Vec<KeyDescriptor>,
}

#[derive(Debug, Clone)]
pub struct EapolRequest {
    pub src_addr: MacAddr,
    pub dst_addr: MacAddr,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EapolConfirm {
    pub result_code: EapolResultCode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EapolIndication {
    pub src_addr: MacAddr,
    pub dst_addr: MacAddr,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct StartRequest {
    pub ssid: Vec<u8>,
    pub bss_type: BssType,
    /// In 802.11 time units.
    pub beacon_period: u16,
    pub dtim_period: u8,
    pub channel: u8,
    pub rates: Vec<u8>,
    pub rsne: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StartConfirm {
    pub result_code: StartResultCode,
}

/// Incoming message from the SME.
#[derive(Debug, Clone)]
pub enum MlmeRequest {
    Scan(ScanRequest),
    Join(JoinRequest),
    Authenticate(AuthenticateRequest),
    AuthenticateResponse(AuthenticateResponse),
    Associate(AssociateRequest),
    AssociateResponse(AssociateResponse),
    Deauthenticate(DeauthenticateRequest),
    SetKeys(SetKeysRequest),
    Eapol(EapolRequest),
    Start(StartRequest),
}

/// Outgoing message to the SME.
#[derive(Debug, Clone, PartialEq)]
pub enum MlmeEvent {
    JoinConf(JoinConfirm),
    AuthenticateConf(AuthenticateConfirm),
    AuthenticateInd(AuthenticateIndication),
    AssociateConf(AssociateConfirm),
    AssociateInd(AssociateIndication),
    DeauthenticateConf(DeauthenticateConfirm),
    DeauthenticateInd(DeauthenticateIndication),
    DisassociateInd(DisassociateIndication),
    ScanConf(ScanConfirm),
    EapolConf(EapolConfirm),
    EapolInd(EapolIndication),
    StartConf(StartConfirm),
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        num_traits::{FromPrimitive, ToPrimitive},
    };

    #[test]
    fn result_codes_round_trip() {
        for code in [
            AssociateResultCode::Success,
            AssociateResultCode::RefusedReasonUnspecified,
            AssociateResultCode::RefusedNotAuthenticated,
            AssociateResultCode::RefusedCapabilitiesMismatch,
            AssociateResultCode::RefusedExternalReason,
            AssociateResultCode::RefusedApOutOfMemory,
            AssociateResultCode::RefusedBasicRatesMismatch,
            AssociateResultCode::RefusedTemporarily,
        ] {
            let raw = code.to_u8().expect("no raw value");
            assert_eq!(AssociateResultCode::from_u8(raw), Some(code));
        }
        assert_eq!(AssociateResultCode::from_u8(200), None);
    }

    #[test]
    fn scan_result_code_values() {
        assert_eq!(ScanResultCode::Success.to_u8(), Some(0));
        assert_eq!(ScanResultCode::NotSupported.to_u8(), Some(1));
        assert_eq!(ScanResultCode::InvalidArgs.to_u8(), Some(2));
        assert_eq!(ScanResultCode::InternalError.to_u8(), Some(3));
    }
}
