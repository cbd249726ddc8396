// Copyright 2023, The Android Open Source Project
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Shared fixtures: mock NCI core, mock framework, activation builders.

#![allow(dead_code)]

use bytes::Bytes;
use nci_adapter::adapter::Adapter;
use nci_adapter::framework::{
    AdapterParam, Framework, HostId, NfcMode, ParamIsoDepPollA, ParamIsoDepPollB, ParamListenF,
    ParamNfcDepInitiator, ParamNfcDepTarget, ParamPoll, ParamPollA, ParamPollB, ParamPollF,
    PeerId, TagId, TransmitStatus,
};
use nci_adapter::nci::{
    ActivationParam, IntfActivationNtf, IsoDepPollA, IsoDepPollB, ModeParam, NciCore, NciMode,
    NciParam, NciParamKey, NciParamValue, NciTech, NfcDepListen, NfcDepPoll, OpMode, PollA, PollB,
    RfInterface, RfProtocol, RfState, SendId,
};

/// Outbound request recorded by [`MockNci`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NciCommand {
    SetState(RfState),
    SetTech(NciTech),
    SetOpMode(OpMode),
    SendData { conn_id: u8, payload: Vec<u8>, id: SendId },
    Cancel(SendId),
    SetParams { params: Vec<NciParam>, reset: bool },
}

pub struct MockNci {
    pub current_state: RfState,
    pub next_state: RfState,
    pub supported_techs: NciTech,
    pub commands: Vec<NciCommand>,
    pub refuse_sends: bool,
    pub la_nfcid1: Option<Vec<u8>>,
    next_send_id: u32,
}

impl MockNci {
    pub fn new() -> MockNci {
        MockNci {
            current_state: RfState::Idle,
            next_state: RfState::Idle,
            supported_techs: NciTech::ALL,
            commands: vec![],
            refuse_sends: false,
            la_nfcid1: None,
            next_send_id: 0,
        }
    }

    /// Last send handle given out.
    pub fn last_send_id(&self) -> SendId {
        SendId(self.next_send_id)
    }

    pub fn sent_payloads(&self) -> Vec<Vec<u8>> {
        self.commands
            .iter()
            .filter_map(|cmd| match cmd {
                NciCommand::SendData { payload, .. } => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count_set_state(&self, state: RfState) -> usize {
        self.commands.iter().filter(|cmd| **cmd == NciCommand::SetState(state)).count()
    }

    pub fn last_set_tech(&self) -> Option<NciTech> {
        self.commands
            .iter()
            .rev()
            .find_map(|cmd| match cmd {
                NciCommand::SetTech(tech) => Some(*tech),
                _ => None,
            })
    }
}

impl NciCore for MockNci {
    fn current_state(&self) -> RfState {
        self.current_state
    }
    fn next_state(&self) -> RfState {
        self.next_state
    }
    fn set_state(&mut self, state: RfState) {
        self.commands.push(NciCommand::SetState(state));
    }
    fn get_tech(&self) -> NciTech {
        self.supported_techs
    }
    fn set_tech(&mut self, tech: NciTech) {
        self.commands.push(NciCommand::SetTech(tech));
    }
    fn set_op_mode(&mut self, op_mode: OpMode) {
        self.commands.push(NciCommand::SetOpMode(op_mode));
    }
    fn send_data(&mut self, conn_id: u8, payload: Bytes) -> Option<SendId> {
        if self.refuse_sends {
            return None;
        }
        self.next_send_id += 1;
        let id = SendId(self.next_send_id);
        self.commands.push(NciCommand::SendData { conn_id, payload: payload.to_vec(), id });
        Some(id)
    }
    fn cancel(&mut self, id: SendId) {
        self.commands.push(NciCommand::Cancel(id));
    }
    fn get_param(&mut self, key: NciParamKey) -> Option<NciParamValue> {
        match key {
            NciParamKey::LaNfcid1 => self.la_nfcid1.clone().map(NciParamValue::Nfcid1),
        }
    }
    fn set_params(&mut self, params: &[NciParam], reset: bool) {
        self.commands.push(NciCommand::SetParams { params: params.to_vec(), reset });
    }
}

/// Framework call recorded by [`MockFramework`].
#[derive(Clone, Debug, PartialEq)]
pub enum FwEvent {
    TagT2(Option<ParamPollA>),
    TagT4a(Option<ParamPollA>, Option<ParamIsoDepPollA>),
    TagT4b(Option<ParamPollB>, Option<ParamIsoDepPollB>),
    OtherTag(Option<ParamPoll>),
    PeerInitiatorA(Option<ParamPollA>, Option<ParamNfcDepInitiator>),
    PeerInitiatorF(Option<ParamPollF>, Option<ParamNfcDepInitiator>),
    PeerTargetA(Option<ParamNfcDepTarget>),
    PeerTargetF(Option<ParamListenF>, Option<ParamNfcDepTarget>),
    Host,
    TargetGone,
    TargetReactivated,
    InitiatorGone,
    InitiatorReactivated,
    TransmitDone(TransmitStatus, Vec<u8>),
    ModeNotify(NfcMode, bool),
    ParamChange(AdapterParam),
}

#[derive(Default)]
pub struct MockFramework {
    pub events: Vec<FwEvent>,
    pub refuse_tags: bool,
    pub refuse_peers: bool,
    pub refuse_hosts: bool,
    next_id: u32,
}

impl MockFramework {
    pub fn new() -> MockFramework {
        Default::default()
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    pub fn count(&self, event: &FwEvent) -> usize {
        self.events.iter().filter(|e| *e == event).count()
    }

    pub fn count_reactivated(&self) -> usize {
        self.count(&FwEvent::InitiatorReactivated)
    }
}

impl Framework for MockFramework {
    fn add_tag_t2(&mut self, poll_a: Option<&ParamPollA>) -> Option<TagId> {
        self.events.push(FwEvent::TagT2(poll_a.cloned()));
        (!self.refuse_tags).then(|| TagId(self.next_id()))
    }
    fn add_tag_t4a(
        &mut self,
        poll_a: Option<&ParamPollA>,
        iso_dep: Option<&ParamIsoDepPollA>,
    ) -> Option<TagId> {
        self.events.push(FwEvent::TagT4a(poll_a.cloned(), iso_dep.cloned()));
        (!self.refuse_tags).then(|| TagId(self.next_id()))
    }
    fn add_tag_t4b(
        &mut self,
        poll_b: Option<&ParamPollB>,
        iso_dep: Option<&ParamIsoDepPollB>,
    ) -> Option<TagId> {
        self.events.push(FwEvent::TagT4b(poll_b.cloned(), iso_dep.cloned()));
        (!self.refuse_tags).then(|| TagId(self.next_id()))
    }
    fn add_other_tag(&mut self, poll: Option<&ParamPoll>) -> Option<TagId> {
        self.events.push(FwEvent::OtherTag(poll.cloned()));
        (!self.refuse_tags).then(|| TagId(self.next_id()))
    }
    fn add_peer_initiator_a(
        &mut self,
        poll_a: Option<&ParamPollA>,
        nfc_dep: Option<&ParamNfcDepInitiator>,
    ) -> Option<PeerId> {
        self.events.push(FwEvent::PeerInitiatorA(poll_a.cloned(), nfc_dep.cloned()));
        (!self.refuse_peers).then(|| PeerId(self.next_id()))
    }
    fn add_peer_initiator_f(
        &mut self,
        poll_f: Option<&ParamPollF>,
        nfc_dep: Option<&ParamNfcDepInitiator>,
    ) -> Option<PeerId> {
        self.events.push(FwEvent::PeerInitiatorF(poll_f.cloned(), nfc_dep.cloned()));
        (!self.refuse_peers).then(|| PeerId(self.next_id()))
    }
    fn add_peer_target_a(&mut self, nfc_dep: Option<&ParamNfcDepTarget>) -> Option<PeerId> {
        self.events.push(FwEvent::PeerTargetA(nfc_dep.cloned()));
        (!self.refuse_peers).then(|| PeerId(self.next_id()))
    }
    fn add_peer_target_f(
        &mut self,
        listen_f: Option<&ParamListenF>,
        nfc_dep: Option<&ParamNfcDepTarget>,
    ) -> Option<PeerId> {
        self.events.push(FwEvent::PeerTargetF(listen_f.cloned(), nfc_dep.cloned()));
        (!self.refuse_peers).then(|| PeerId(self.next_id()))
    }
    fn add_host(&mut self) -> Option<HostId> {
        self.events.push(FwEvent::Host);
        (!self.refuse_hosts).then(|| HostId(self.next_id()))
    }

    fn target_gone(&mut self) {
        self.events.push(FwEvent::TargetGone);
    }
    fn target_reactivated(&mut self) {
        self.events.push(FwEvent::TargetReactivated);
    }
    fn initiator_gone(&mut self) {
        self.events.push(FwEvent::InitiatorGone);
    }
    fn initiator_reactivated(&mut self) {
        self.events.push(FwEvent::InitiatorReactivated);
    }
    fn transmit_done(&mut self, status: TransmitStatus, payload: &[u8]) {
        self.events.push(FwEvent::TransmitDone(status, payload.to_vec()));
    }
    fn mode_notify(&mut self, mode: NfcMode, confirmed: bool) {
        self.events.push(FwEvent::ModeNotify(mode, confirmed));
    }
    fn param_change_notify(&mut self, param: AdapterParam) {
        self.events.push(FwEvent::ParamChange(param));
    }
}

pub type TestAdapter = Adapter<MockNci, MockFramework>;

pub fn test_adapter() -> TestAdapter {
    let mut adapter = Adapter::new(MockNci::new(), MockFramework::new());
    adapter.set_powered(true);
    adapter
}

/*==========================================================================*
 * Activation builders
 *==========================================================================*/

pub fn t2_ntf(nfcid1: &[u8]) -> IntfActivationNtf {
    let pa = PollA { sens_res: [0x44, 0x00], nfcid1: nfcid1.to_vec(), sel_res: Some(0x00) };
    IntfActivationNtf {
        rf_intf: RfInterface::Frame,
        protocol: RfProtocol::T2t,
        mode: NciMode::PassivePollA,
        mode_param_bytes: nfcid1.to_vec(),
        mode_param: Some(ModeParam::PollA(pa)),
        activation_param_bytes: vec![],
        activation_param: None,
    }
}

pub fn t4a_ntf(nfcid1: &[u8]) -> IntfActivationNtf {
    let pa = PollA { sens_res: [0x04, 0x00], nfcid1: nfcid1.to_vec(), sel_res: Some(0x20) };
    IntfActivationNtf {
        rf_intf: RfInterface::IsoDep,
        protocol: RfProtocol::IsoDep,
        mode: NciMode::PassivePollA,
        mode_param_bytes: nfcid1.to_vec(),
        mode_param: Some(ModeParam::PollA(pa)),
        activation_param_bytes: vec![0x78, 0x80, 0x70, 0x02],
        activation_param: Some(ActivationParam::IsoDepPollA(IsoDepPollA {
            fsc: 256,
            t0: 0x78,
            ta: 0x80,
            tb: 0x70,
            tc: 0x02,
            t1: vec![],
        })),
    }
}

pub fn t4b_ntf(nfcid0: [u8; 4]) -> IntfActivationNtf {
    let pb = PollB { nfcid0, fsc: 256, app_data: [0; 4], prot_info: vec![0x81, 0xc1] };
    IntfActivationNtf {
        rf_intf: RfInterface::IsoDep,
        protocol: RfProtocol::IsoDep,
        mode: NciMode::PassivePollB,
        mode_param_bytes: nfcid0.to_vec(),
        mode_param: Some(ModeParam::PollB(pb)),
        activation_param_bytes: vec![0x00],
        activation_param: Some(ActivationParam::IsoDepPollB(IsoDepPollB {
            mbli: 0,
            did: 0,
            hlr: vec![],
        })),
    }
}

/// Poll side NFC-DEP peer.
pub fn nfc_dep_poll_ntf() -> IntfActivationNtf {
    let pa = PollA {
        sens_res: [0x44, 0x00],
        nfcid1: vec![0x08, 0x01, 0x02, 0x03],
        sel_res: Some(0x40),
    };
    IntfActivationNtf {
        rf_intf: RfInterface::NfcDep,
        protocol: RfProtocol::NfcDep,
        mode: NciMode::PassivePollA,
        mode_param_bytes: vec![0x08, 0x01, 0x02, 0x03],
        mode_param: Some(ModeParam::PollA(pa)),
        activation_param_bytes: vec![0x46, 0x66, 0x6d],
        activation_param: Some(ActivationParam::NfcDepPoll(NfcDepPoll {
            g: vec![0x46, 0x66, 0x6d],
        })),
    }
}

/// Listen side card emulation activation over the given technology mode.
pub fn ce_listen_ntf(mode: NciMode) -> IntfActivationNtf {
    IntfActivationNtf {
        rf_intf: RfInterface::IsoDep,
        protocol: RfProtocol::IsoDep,
        mode,
        mode_param_bytes: vec![],
        mode_param: None,
        activation_param_bytes: vec![0xe0, 0x80],
        activation_param: None,
    }
}

/// Listen side NFC-DEP peer activation.
pub fn nfc_dep_listen_ntf() -> IntfActivationNtf {
    IntfActivationNtf {
        rf_intf: RfInterface::NfcDep,
        protocol: RfProtocol::NfcDep,
        mode: NciMode::PassiveListenA,
        mode_param_bytes: vec![],
        mode_param: None,
        activation_param_bytes: vec![0x46, 0x66, 0x6d],
        activation_param: Some(ActivationParam::NfcDepListen(NfcDepListen {
            g: vec![0x46, 0x66, 0x6d],
        })),
    }
}

/// Activation the detector cannot make sense of.
pub fn unknown_ntf() -> IntfActivationNtf {
    IntfActivationNtf {
        rf_intf: RfInterface::Proprietary,
        protocol: RfProtocol::Proprietary,
        mode: NciMode::PassivePollA,
        mode_param_bytes: vec![],
        mode_param: None,
        activation_param_bytes: vec![],
        activation_param: None,
    }
}

/// Feed an activation with the RF state set up the way the NCI core would
/// report it for an established poll side interface.
pub fn activate_poll(adapter: &mut TestAdapter, ntf: &IntfActivationNtf) {
    adapter.nci_mut().current_state = RfState::PollActive;
    adapter.nci_mut().next_state = RfState::PollActive;
    adapter.intf_activated(ntf);
}

/// Feed an activation for an established listen side interface.
pub fn activate_listen(adapter: &mut TestAdapter, ntf: &IntfActivationNtf) {
    adapter.nci_mut().current_state = RfState::ListenActive;
    adapter.nci_mut().next_state = RfState::ListenActive;
    adapter.intf_activated(ntf);
}

/// Drive the NCI state towards discovery the way the core reports a remote
/// deactivation: next state first, then the current state follows.
pub fn deactivate_to_discovery(adapter: &mut TestAdapter) {
    adapter.nci_mut().next_state = RfState::Discovery;
    adapter.next_state_changed();
    adapter.nci_mut().current_state = RfState::Discovery;
    adapter.current_state_changed();
}

/// Invariants that must hold in every reachable steady state.
pub fn assert_invariants(adapter: &TestAdapter) {
    use nci_adapter::InternalState;

    // Target and initiator are mutually exclusive.
    assert!(!(adapter.has_target() && adapter.has_initiator()));
    // The activation snapshot exists exactly while not idle.
    assert_eq!(adapter.active_intf().is_some(), adapter.internal_state() != InternalState::Idle);
    // Observed framework objects imply a live endpoint.
    if adapter.tag().is_some() || adapter.peer().is_some() || adapter.host().is_some() {
        assert!(adapter.has_target() || adapter.has_initiator());
    }
    // A locked technology mask implies a live initiator.
    if adapter.active_tech_mask() != NciTech::ALL {
        assert!(adapter.has_initiator());
    }
}
