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

//! Adapter state machine reconciling the NCI RF state with the logical
//! endpoint model of the NFC daemon framework.
//!
//! ```text
//!              Poll side                         Listen side
//!              ---------                         -----------
//!
//!                              +------+
//!        /---------+---------> | IDLE | <------------------------------\
//!        |         |           +------+                     card       |
//!        |         |            |    ^                    emulation ---|--v
//!        |         |            |    |                    (ISO-DEP)    |  |
//!        |         |            |    |     Does the          /         |  |
//!        |         |            | Unknown  interface ---- yes          |  |
//!        |   Deactivation       |  object  info match?       \         |  |
//!        |         |            v    |    /       |        Anything    |  |
//!        |         |      Activation |   no    Activation    else      |  |
//!        |         |        ^    \   /  /         ^           |        |  |
//!        |         |       /      \ /  /          |           v        |  |
//!        |  +-------------+      Object        +----------------+      |  |
//!        |  | HAVE_TARGET | <-- detection ---> | HAVE_INITIATOR |      |  |
//!        |  +-------------+        ^           +----------------+      |  |
//!        |         |     ^         |                   |               |  |
//!        |         |      \        |                   v               |  |
//!        |         |       \       |              Deactivation         |  |
//!        |  daemon-initiated|      |                /      \           |  |
//!        |   reactivation   |      |               /        \          |  |
//!        |         |        |      |             Card       Anything --+  |
//!        |         |        |      |           emulation      else    /   |
//! daemon-initiated |        |      |           (ISO-DEP)             /    |
//!   deactivation   |        |      |               |          Timeout     |
//!        ^         |        |      |               |             ^        |
//!        |         v        |      |               v             |        |
//!  +---------------------+  |      |            +-----------------+       |
//!  | REACTIVATING_TARGET |  |      |            | REACTIVATING_CE |       |
//!  +---------------------+  ^      |            +-----------------+       |
//!             |            /       |              |              ^        |
//!             v           /        ^              v              |        |
//!        Activation      /        / \        Activation          |        |
//!             |         /        /   no        /                 |        |
//!             |       yes       /      \      /             Deactivation  |
//!           Does the  /        /       Does the                  |        |
//!           interface ------- no       interface --- Activation  |        |
//!           info match?                info match?       ^       |        |
//!                                             |          |       |        |
//!                                             |     +----------------+    |
//!                                            yes--->| REACTIVATED_CE |<---/
//!                                                   +----------------+
//! ```

use crate::framework::{
    AdapterParam, AdapterParamSetting, AdapterParamValue, Framework, HostId, NfcMode, ObjectId,
    ParamIsoDepPollA, ParamIsoDepPollB, ParamListenF, ParamNfcDepInitiator, ParamNfcDepTarget,
    ParamPoll, ParamPollA, ParamPollB, ParamPollF, PeerId, SequenceFlags, TagId, Technology,
    TechnologyMask, TransmitStatus, NFCID1_MAX_LEN,
};
use crate::intf::IntfInfo;
use crate::nci::{
    ActivationParam, IntfActivationNtf, ModeParam, NciCore, NciMode, NciParam, NciParamKey,
    NciParamValue, NciTech, OpMode, RfInterface, RfProtocol, RfState, SendId,
};
use crate::target::{Target, TransmitKind};
use bytes::Bytes;
use log::{debug, info, warn};
use std::time::Duration;

/// Period of the presence check loop.
pub const PRESENCE_CHECK_PERIOD: Duration = Duration::from_millis(250);

/// How long a card emulation host is kept alive waiting for the external
/// reader to reactivate the interface.
pub const CE_REACTIVATION_TIMEOUT: Duration = Duration::from_millis(1500);

/// Internal state of the adapter state machine.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum InternalState {
    Idle,
    HaveTarget,
    HaveInitiator,
    ReactivatingTarget,
    ReactivatingCe,
    ReactivatedCe,
}

/// Listen side endpoint, owned by the adapter. The framework objects built
/// on top of it (peer target or card emulation host) are only observed.
#[derive(Copy, Clone, Debug)]
pub struct Initiator {
    /// Technology the remote initiator activated us on.
    pub technology: Technology,
}

impl Initiator {
    fn from_activation(ntf: &IntfActivationNtf) -> Option<Initiator> {
        let technology = match ntf.mode {
            NciMode::PassiveListenA | NciMode::ActiveListenA => Technology::A,
            NciMode::PassiveListenB => Technology::B,
            NciMode::PassiveListenF | NciMode::ActiveListenF => Technology::F,
            _ => return None,
        };
        Some(Initiator { technology })
    }
}

/// Timer bookkeeping exposed to the event loop driver. The adapter only
/// records which deferred work is armed; the driver owns the clocks.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TimerControl {
    /// Presence check loop runs at [`PRESENCE_CHECK_PERIOD`].
    pub presence_armed: bool,
    /// CE reactivation one-shot runs at [`CE_REACTIVATION_TIMEOUT`].
    pub ce_armed: bool,
    /// Bumped every time the CE timer is started or restarted.
    pub ce_generation: u64,
    /// Deadline of the transmission in flight, if it has one.
    pub transmit_timeout: Option<Duration>,
    /// Bumped every time a transmission is started.
    pub transmit_generation: u64,
}

/// The adapter. Owns the NCI core handle and the poll side data path,
/// observes the framework objects built from its activations.
pub struct Adapter<N: NciCore, F: Framework> {
    nci: N,
    framework: F,
    enabled: bool,
    powered: bool,
    internal_state: InternalState,
    active_intf: Option<IntfInfo>,
    target: Option<Target>,
    initiator: Option<Initiator>,
    tag: Option<TagId>,
    peer: Option<PeerId>,
    host: Option<HostId>,
    desired_mode: NfcMode,
    current_mode: NfcMode,
    mode_change_pending: bool,
    mode_check_scheduled: bool,
    supported_techs: NciTech,
    active_techs: NciTech,
    active_tech_mask: NciTech,
    presence_timer_armed: bool,
    ce_timer_armed: bool,
    ce_timer_generation: u64,
    transmit_generation: u64,
}

impl<N: NciCore, F: Framework> Adapter<N, F> {
    /// Create an adapter over an NCI core and a framework. The adapter
    /// starts unpowered with all technologies allowed.
    pub fn new(nci: N, framework: F) -> Adapter<N, F> {
        let supported_techs = nci.get_tech();
        Adapter {
            nci,
            framework,
            enabled: true,
            powered: false,
            internal_state: InternalState::Idle,
            active_intf: None,
            target: None,
            initiator: None,
            tag: None,
            peer: None,
            host: None,
            desired_mode: NfcMode::NONE,
            current_mode: NfcMode::NONE,
            mode_change_pending: false,
            mode_check_scheduled: false,
            supported_techs,
            active_techs: supported_techs,
            active_tech_mask: NciTech::ALL,
            presence_timer_armed: false,
            ce_timer_armed: false,
            ce_timer_generation: 0,
            transmit_generation: 0,
        }
    }

    /// Access the NCI core handle.
    pub fn nci(&self) -> &N {
        &self.nci
    }

    /// Mutable access to the NCI core handle.
    pub fn nci_mut(&mut self) -> &mut N {
        &mut self.nci
    }

    /// Access the framework handle.
    pub fn framework(&self) -> &F {
        &self.framework
    }

    /// Mutable access to the framework handle.
    pub fn framework_mut(&mut self) -> &mut F {
        &mut self.framework
    }

    #[allow(missing_docs)]
    pub fn internal_state(&self) -> InternalState {
        self.internal_state
    }

    /// Snapshot of the activation the current endpoint was created from.
    pub fn active_intf(&self) -> Option<&IntfInfo> {
        self.active_intf.as_ref()
    }

    #[allow(missing_docs)]
    pub fn has_target(&self) -> bool {
        self.target.is_some()
    }

    #[allow(missing_docs)]
    pub fn has_initiator(&self) -> bool {
        self.initiator.is_some()
    }

    /// Observed framework tag, if alive.
    pub fn tag(&self) -> Option<TagId> {
        self.tag
    }

    /// Observed framework peer, if alive.
    pub fn peer(&self) -> Option<PeerId> {
        self.peer
    }

    /// Observed card emulation host, if alive.
    pub fn host(&self) -> Option<HostId> {
        self.host
    }

    #[allow(missing_docs)]
    pub fn active_tech_mask(&self) -> NciTech {
        self.active_tech_mask
    }

    /// Deferred work bookkeeping for the event loop driver.
    pub fn timer_control(&self) -> TimerControl {
        TimerControl {
            presence_armed: self.presence_timer_armed,
            ce_armed: self.ce_timer_armed,
            ce_generation: self.ce_timer_generation,
            transmit_timeout: self
                .target
                .as_ref()
                .filter(|t| t.transmit_in_flight().is_some())
                .and_then(|t| t.transmit_timeout()),
            transmit_generation: self.transmit_generation,
        }
    }

    /// A mode check was scheduled and has not run yet.
    pub fn mode_check_scheduled(&self) -> bool {
        self.mode_check_scheduled
    }

    /// Power up or down. The RF state machine is kicked back into
    /// discovery if it settled in idle while powered.
    pub fn set_powered(&mut self, powered: bool) {
        if self.powered != powered {
            self.powered = powered;
            self.state_check();
        }
    }

    #[allow(missing_docs)]
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            self.enabled = enabled;
            self.state_check();
        }
    }

    /// Release everything before the NCI core goes away. Outstanding user
    /// transmits complete with an error, endpoints are reported gone.
    pub fn shutdown(&mut self) {
        self.drop_all();
        self.mode_check_scheduled = false;
    }

    /*======================================================================*
     * State machine events
     *======================================================================*/

    /// RF_INTF_ACTIVATED_NTF entry point.
    pub fn intf_activated(&mut self, ntf: &IntfActivationNtf) {
        // Any activation stops the CE reactivation timer if it's running.
        self.ce_timer_armed = false;

        // Update the adapter state.
        match self.internal_state {
            // Continue to object detection.
            InternalState::Idle => (),
            InternalState::HaveTarget => {
                self.set_internal_state(InternalState::Idle);
                self.drop_target();
                // Continue to object detection.
            }
            InternalState::HaveInitiator => {
                if self.active_intf_matches(ntf) {
                    if self.host.is_some() {
                        debug!("CE host spontaneously reactivated");
                        self.set_internal_state(InternalState::ReactivatedCe);
                        self.framework.initiator_reactivated();
                    } else {
                        debug!("Keeping initiator alive");
                    }
                } else {
                    debug!("Different initiator has arrived, dropping the old one");
                    self.set_internal_state(InternalState::Idle);
                    self.drop_initiator();
                    // Continue to object detection.
                }
            }
            InternalState::ReactivatingCe | InternalState::ReactivatedCe => {
                if self.active_intf_matches(ntf) {
                    if self.internal_state == InternalState::ReactivatedCe {
                        debug!("Keeping CE initiator alive");
                    } else {
                        debug!("CE initiator reactivated");
                        self.set_internal_state(InternalState::ReactivatedCe);
                    }
                    self.framework.initiator_reactivated();
                } else {
                    debug!("Different initiator has arrived, dropping the old one");
                    self.set_internal_state(InternalState::Idle);
                    self.drop_initiator();
                    // Continue to object detection.
                }
            }
            InternalState::ReactivatingTarget => {
                if self.active_intf_matches(ntf) {
                    debug!("Target reactivated");
                    self.set_internal_state(InternalState::HaveTarget);
                    self.framework.target_reactivated();
                } else {
                    debug!("Different tag has arrived, dropping the old one");
                    self.set_internal_state(InternalState::Idle);
                    self.drop_target();
                    // Continue to object detection.
                }
            }
        }

        // Object detection.
        if self.target.is_none() && self.initiator.is_none() {
            if let Some(target) = Target::from_activation(ntf) {
                self.target = Some(target);
                self.set_internal_state(InternalState::HaveTarget);
                self.active_intf = Some(IntfInfo::new(ntf));

                // Check if it's a peer interface, otherwise assume a tag.
                if self.create_peer_initiator(ntf).is_none()
                    && self.create_known_tag(ntf).is_none()
                {
                    self.tag = self.framework.add_other_tag(poll_params(ntf).as_ref());
                }
            } else if let Some(initiator) = Initiator::from_activation(ntf) {
                if self.create_peer_target(ntf).is_some() || self.create_host(ntf).is_some() {
                    // Keep the initiator.
                    self.initiator = Some(initiator);
                    self.active_intf = Some(IntfInfo::new(ntf));
                    self.set_internal_state(InternalState::HaveInitiator);
                }
            }
        }

        // Start or stop periodic presence checks.
        if self.need_presence_checks() {
            self.presence_timer_armed = true;
        } else {
            self.presence_timer_armed = false;
        }

        // If we don't know what this is, switch back to IDLE so that
        // discovery restarts.
        if self.target.is_none() && self.initiator.is_none() {
            debug!("No idea what this is");
            self.nci.set_state(RfState::Idle);
        }
    }

    /// Current RF state callback.
    pub fn current_state_changed(&mut self) {
        self.state_check();
        self.mode_check();
    }

    /// Pending RF state callback. Derives the deactivation input of the
    /// state machine.
    pub fn next_state_changed(&mut self) {
        match self.nci.next_state() {
            RfState::Idle => {
                if self.nci.current_state() != RfState::Idle {
                    self.deactivation();
                }
            }
            RfState::Discovery => {
                if self.nci.current_state() != RfState::Idle {
                    self.deactivation();
                }
            }
            RfState::W4AllDiscoveries
            | RfState::W4HostSelect
            | RfState::PollActive
            | RfState::ListenActive
            | RfState::ListenSleep => (),
        }
        self.state_check();
        self.mode_check();
    }

    /// NCI configuration parameter change callback.
    pub fn param_changed(&mut self, key: NciParamKey) {
        match key {
            NciParamKey::LaNfcid1 => self.framework.param_change_notify(AdapterParam::LaNfcid1),
        }
    }

    fn deactivation(&mut self) {
        match self.internal_state {
            // Daemon initiated reactivation in progress, expected.
            InternalState::ReactivatingTarget => (),
            // Most likely a reset to lock the CE tech.
            InternalState::ReactivatingCe => (),
            InternalState::ReactivatedCe => {
                self.set_internal_state(InternalState::ReactivatingCe);
                self.start_ce_reactivation_timer();
            }
            InternalState::HaveInitiator if self.host.is_some() => {
                // Lock the card emulation tech.
                let ce_tech = match self.initiator.map(|i| i.technology) {
                    Some(Technology::A) => NciTech::A_LISTEN,
                    Some(Technology::B) => NciTech::B_LISTEN,
                    _ => NciTech::NONE,
                };

                self.set_internal_state(InternalState::ReactivatingCe);
                self.start_ce_reactivation_timer();

                // The same technology must be used for reactivation,
                // otherwise the peer may not (and most likely won't)
                // recognize us as the same card.
                if !ce_tech.is_empty() {
                    let tech = self.active_techs & ce_tech;
                    self.active_tech_mask = ce_tech;
                    self.nci.set_tech(tech);
                }
            }
            InternalState::Idle | InternalState::HaveTarget | InternalState::HaveInitiator => {
                self.set_internal_state(InternalState::Idle);
                self.drop_all();
            }
        }
    }

    /// CE reactivation one-shot expired without a matching activation.
    pub fn ce_reactivation_timeout(&mut self) {
        if !self.ce_timer_armed {
            return;
        }
        debug!("CE reactivation timeout has expired");
        self.ce_timer_armed = false;
        self.set_internal_state(InternalState::Idle);
        self.drop_all();
    }

    fn start_ce_reactivation_timer(&mut self) {
        debug!(
            "{} CE reactivation timer",
            if self.ce_timer_armed { "Restarting" } else { "Starting" }
        );
        self.ce_timer_armed = true;
        self.ce_timer_generation += 1;
    }

    fn state_check(&mut self) {
        if self.nci.current_state() == RfState::Idle
            && self.nci.next_state() == RfState::Idle
            && self.enabled
            && self.powered
        {
            // The state machine may have switched to idle in the process of
            // changing the operation mode or the active technologies. Kick
            // it back to discovery.
            self.nci.set_state(RfState::Discovery);
        }
    }

    fn set_internal_state(&mut self, state: InternalState) {
        if self.internal_state != state {
            debug!("Internal state {:?} => {:?}", self.internal_state, state);
            self.internal_state = state;
        }
    }

    fn active_intf_matches(&self, ntf: &IntfActivationNtf) -> bool {
        self.active_intf.as_ref().is_some_and(|info| info.matches(ntf))
    }

    /*======================================================================*
     * Endpoint lifecycle
     *======================================================================*/

    /// Deliberately reactivate the poll side endpoint, e.g. to reselect a
    /// tag. Only allowed while the endpoint is fully active.
    pub fn reactivate_target(&mut self) -> bool {
        if self.target.is_some()
            && self.active_intf.is_some()
            && self.internal_state == InternalState::HaveTarget
            && ((self.nci.current_state() == RfState::PollActive
                && self.nci.next_state() == RfState::PollActive)
                || (self.nci.current_state() == RfState::ListenActive
                    && self.nci.next_state() == RfState::ListenActive))
        {
            debug!("Reactivating the interface");
            self.set_internal_state(InternalState::ReactivatingTarget);
            // Stop presence checks for the time being.
            self.presence_timer_armed = false;
            // Switch to discovery and expect the same target to reappear.
            self.nci.set_state(RfState::Discovery);
            true
        } else {
            warn!("Can't reactivate the tag in this state");
            false
        }
    }

    /// Drop the poll side endpoint and resume discovery.
    pub fn deactivate_target(&mut self) {
        if self.target.is_some() {
            self.drop_target();
            if self.powered {
                self.nci.set_state(RfState::Discovery);
            }
        }
    }

    /// Drop the listen side endpoint and resume discovery.
    pub fn deactivate_initiator(&mut self) {
        if self.initiator.is_some() {
            self.drop_initiator();
            if self.powered {
                self.nci.set_state(RfState::Discovery);
            }
        }
    }

    /// A framework object the adapter was observing has been destroyed.
    /// Clearing an already cleared observation is a no-op.
    pub fn object_destroyed(&mut self, object: ObjectId) {
        match object {
            ObjectId::Tag(id) if self.tag == Some(id) => self.tag = None,
            ObjectId::Peer(id) if self.peer == Some(id) => self.peer = None,
            ObjectId::Host(id) if self.host == Some(id) => self.host = None,
            _ => (),
        }
    }

    fn drop_target(&mut self) {
        if let Some(mut target) = self.target.take() {
            self.tag = None;
            self.peer = None;
            self.active_intf = None;
            self.presence_timer_armed = false;
            let in_flight = target.transmit_in_flight();
            target.cancel_transmit(&mut self.nci);
            if in_flight == Some(TransmitKind::User) {
                self.framework.transmit_done(TransmitStatus::Error, &[]);
            }
            self.set_internal_state(InternalState::Idle);
            info!("Target is gone");
            self.framework.target_gone();
        }
    }

    fn drop_initiator(&mut self) {
        if self.initiator.take().is_some() {
            self.peer = None;
            self.host = None;
            self.active_intf = None;
            self.active_tech_mask = NciTech::ALL;
            self.ce_timer_armed = false;
            self.nci.set_tech(self.active_techs);
            self.set_internal_state(InternalState::Idle);
            info!("Initiator is gone");
            self.framework.initiator_gone();
        }
    }

    fn drop_all(&mut self) {
        self.drop_target();
        self.drop_initiator();
    }

    /*======================================================================*
     * Object detection
     *======================================================================*/

    fn create_peer_initiator(&mut self, ntf: &IntfActivationNtf) -> Option<PeerId> {
        let mp = ntf.mode_param.as_ref();
        let ap = ntf.activation_param.as_ref();
        self.peer = match (ntf.protocol, ntf.rf_intf, ntf.mode) {
            (
                RfProtocol::NfcDep,
                RfInterface::NfcDep,
                NciMode::PassivePollA | NciMode::ActivePollA,
            ) => self
                .framework
                .add_peer_initiator_a(param_poll_a(mp).as_ref(), param_nfc_dep_poll(ap).as_ref()),
            (
                RfProtocol::NfcDep,
                RfInterface::NfcDep,
                NciMode::PassivePollF | NciMode::ActivePollF,
            ) => self
                .framework
                .add_peer_initiator_f(param_poll_f(mp).as_ref(), param_nfc_dep_poll(ap).as_ref()),
            _ => None,
        };
        self.peer
    }

    fn create_known_tag(&mut self, ntf: &IntfActivationNtf) -> Option<TagId> {
        let mp = ntf.mode_param.as_ref();
        let ap = ntf.activation_param.as_ref();
        self.tag = match (ntf.protocol, ntf.rf_intf, ntf.mode) {
            // Type 2 tag.
            (RfProtocol::T2t, RfInterface::Frame, NciMode::PassivePollA | NciMode::ActivePollA) => {
                self.framework.add_tag_t2(param_poll_a(mp).as_ref())
            }
            // ISO-DEP Type 4A.
            (RfProtocol::IsoDep, RfInterface::IsoDep, NciMode::PassivePollA) => self
                .framework
                .add_tag_t4a(param_poll_a(mp).as_ref(), param_iso_dep_poll_a(ap).as_ref()),
            // ISO-DEP Type 4B.
            (RfProtocol::IsoDep, RfInterface::IsoDep, NciMode::PassivePollB) => self
                .framework
                .add_tag_t4b(param_poll_b(mp).as_ref(), param_iso_dep_poll_b(ap).as_ref()),
            _ => None,
        };
        self.tag
    }

    fn create_peer_target(&mut self, ntf: &IntfActivationNtf) -> Option<PeerId> {
        let mp = ntf.mode_param.as_ref();
        let ap = ntf.activation_param.as_ref();
        self.peer = match (ntf.rf_intf, ntf.mode) {
            (RfInterface::NfcDep, NciMode::PassiveListenA | NciMode::ActiveListenA) => {
                self.framework.add_peer_target_a(param_nfc_dep_listen(ap).as_ref())
            }
            (RfInterface::NfcDep, NciMode::PassiveListenF | NciMode::ActiveListenF) => self
                .framework
                .add_peer_target_f(param_listen_f(mp).as_ref(), param_nfc_dep_listen(ap).as_ref()),
            _ => None,
        };
        self.peer
    }

    fn create_host(&mut self, ntf: &IntfActivationNtf) -> Option<HostId> {
        self.host = match ntf.rf_intf {
            RfInterface::IsoDep => self.framework.add_host(),
            _ => None,
        };
        self.host
    }

    /*======================================================================*
     * Presence checks
     *======================================================================*/

    fn need_presence_checks(&self) -> bool {
        // NFC-DEP presence checks are done at the LLCP level by the
        // NFC core.
        self.target.is_some()
            && self.active_intf.as_ref().is_some_and(|i| i.protocol != RfProtocol::NfcDep)
    }

    /// Presence check timer tick.
    pub fn presence_tick(&mut self) {
        if !self.presence_timer_armed {
            return;
        }
        let Some(target) = self.target.as_mut() else {
            self.presence_timer_armed = false;
            return;
        };
        let allowed = target
            .sequence()
            .map_or(true, |seq| seq.contains(SequenceFlags::ALLOW_PRESENCE_CHECK));
        if target.transmit_in_flight().is_some() || !allowed {
            debug!("Skipped presence check");
            return;
        }
        if target.start_presence_check(&mut self.nci) {
            self.transmit_generation += 1;
        } else {
            debug!("Failed to start presence check");
            self.presence_timer_armed = false;
            self.nci.set_state(RfState::Discovery);
        }
    }

    fn presence_check_done(&mut self, ok: bool) {
        debug!("Presence check {}", if ok { "ok" } else { "failed" });
        if !ok {
            self.deactivate_target();
        }
    }

    /*======================================================================*
     * Target data path
     *======================================================================*/

    /// Transmit application data to the poll side endpoint. Completion is
    /// reported through [`Framework::transmit_done`].
    pub fn transmit(&mut self, payload: &[u8]) -> bool {
        let Some(target) = self.target.as_mut() else {
            warn!("Transmit without an active target");
            return false;
        };
        if target.transmit_in_flight().is_some() {
            warn!("Transmit while another one is in progress");
            debug_assert!(false);
            return false;
        }
        if target.transmit(&mut self.nci, Bytes::copy_from_slice(payload), TransmitKind::User) {
            self.transmit_generation += 1;
            true
        } else {
            false
        }
    }

    /// Abort the transmit in progress. No completion is reported.
    pub fn cancel_transmit(&mut self) {
        if let Some(target) = self.target.as_mut() {
            target.cancel_transmit(&mut self.nci);
        }
    }

    /// Attach or detach the framework transaction sequence of the target.
    /// The sequence flags decide whether presence checks may interleave.
    pub fn set_target_sequence(&mut self, sequence: Option<SequenceFlags>) {
        if let Some(target) = self.target.as_mut() {
            target.set_sequence(sequence);
        }
    }

    /// Inbound data packet callback, keyed by connection id.
    pub fn data_packet(&mut self, conn_id: u8, payload: Bytes) {
        let Some(target) = self.target.as_mut() else {
            debug!("Unhandled data packet, cid={:#04x} {} byte(s)", conn_id, payload.len());
            return;
        };
        if let Some((kind, status, data)) = target.data_packet(conn_id, payload) {
            self.finish_transmit(kind, status, data);
        }
    }

    /// Send completion callback for a handle returned by
    /// [`NciCore::send_data`].
    pub fn send_complete(&mut self, id: SendId, ok: bool) {
        let Some(target) = self.target.as_mut() else {
            return;
        };
        if let Some((kind, status, data)) = target.send_complete(id, ok) {
            self.finish_transmit(kind, status, data);
        }
    }

    /// The transmit deadline reported through [`TimerControl`] expired.
    pub fn transmit_timeout_expired(&mut self) {
        let Some(target) = self.target.as_mut() else {
            return;
        };
        match target.timeout_expired(&mut self.nci) {
            Some(TransmitKind::User) => {
                debug!("Transmit timed out");
                self.framework.transmit_done(TransmitStatus::Timeout, &[]);
            }
            Some(TransmitKind::Probe) => self.presence_check_done(false),
            None => (),
        }
    }

    fn finish_transmit(&mut self, kind: TransmitKind, status: TransmitStatus, data: Bytes) {
        match kind {
            TransmitKind::User => self.framework.transmit_done(status, &data),
            TransmitKind::Probe => self.presence_check_done(status == TransmitStatus::Ok),
        }
    }

    /*======================================================================*
     * Mode and technology management
     *======================================================================*/

    /// Request the set of operating modes. The request is acknowledged
    /// asynchronously through [`Framework::mode_notify`].
    pub fn submit_mode_request(&mut self, mode: NfcMode) -> bool {
        let mut op_mode = OpMode::NONE;
        if mode.contains(NfcMode::READER_WRITER) {
            op_mode |= OpMode::RW | OpMode::POLL;
        }
        if mode.contains(NfcMode::P2P_INITIATOR) {
            op_mode |= OpMode::PEER | OpMode::POLL;
        }
        if mode.contains(NfcMode::P2P_TARGET) {
            op_mode |= OpMode::PEER | OpMode::LISTEN;
        }
        if mode.contains(NfcMode::CARD_EMULATION) {
            op_mode |= OpMode::CE | OpMode::LISTEN;
        }

        self.desired_mode = mode;
        self.mode_change_pending = true;
        self.nci.set_op_mode(op_mode);
        if op_mode != OpMode::NONE && self.powered {
            self.nci.set_state(RfState::Discovery);
        }
        self.schedule_mode_check();
        true
    }

    /// Withdraw a pending mode request.
    pub fn cancel_mode_request(&mut self) {
        self.mode_change_pending = false;
        self.schedule_mode_check();
    }

    /// Technologies the controller supports, in framework terms.
    pub fn get_supported_techs(&self) -> TechnologyMask {
        let mut techs = TechnologyMask::NONE;
        if self.supported_techs.intersects(NciTech::A) {
            techs |= TechnologyMask::A;
        }
        if self.supported_techs.intersects(NciTech::B) {
            techs |= TechnologyMask::B;
        }
        if self.supported_techs.intersects(NciTech::F) {
            techs |= TechnologyMask::F;
        }
        techs
    }

    /// Restrict discovery to a subset of the A/B/F technologies. Other
    /// supported technologies are unaffected.
    pub fn set_allowed_techs(&mut self, techs: TechnologyMask) {
        let affected = NciTech::A | NciTech::B | NciTech::F;

        self.active_techs = self.supported_techs & !affected;
        if techs.contains(TechnologyMask::A) {
            self.active_techs |= self.supported_techs & NciTech::A;
        }
        if techs.contains(TechnologyMask::B) {
            self.active_techs |= self.supported_techs & NciTech::B;
        }
        if techs.contains(TechnologyMask::F) {
            self.active_techs |= self.supported_techs & NciTech::F;
        }
        self.nci.set_tech(self.active_techs & self.active_tech_mask);
    }

    fn schedule_mode_check(&mut self) {
        self.mode_check_scheduled = true;
    }

    /// Run the deferred mode check. The driver calls this when the loop
    /// goes idle; running it cancels the scheduled check.
    pub fn run_mode_check(&mut self) {
        self.mode_check();
    }

    fn mode_check(&mut self) {
        let mode = if self.nci.current_state() != RfState::Idle {
            self.desired_mode
        } else {
            NfcMode::NONE
        };

        self.mode_check_scheduled = false;
        if self.mode_change_pending {
            if mode == self.desired_mode {
                self.mode_change_pending = false;
                self.current_mode = mode;
                self.framework.mode_notify(mode, true);
            }
        } else if self.current_mode != mode {
            self.current_mode = mode;
            self.framework.mode_notify(mode, false);
        }
    }

    /*======================================================================*
     * Parameters
     *======================================================================*/

    /// Adapter parameters this adapter recognizes.
    pub fn list_params(&self) -> Vec<AdapterParam> {
        vec![AdapterParam::LaNfcid1]
    }

    /// Read an adapter parameter.
    pub fn get_param(&mut self, id: AdapterParam) -> Option<AdapterParamValue> {
        match id {
            AdapterParam::LaNfcid1 => match self.nci.get_param(NciParamKey::LaNfcid1) {
                Some(NciParamValue::Nfcid1(mut bytes)) => {
                    bytes.truncate(NFCID1_MAX_LEN);
                    Some(AdapterParamValue::Nfcid1(bytes))
                }
                None => None,
            },
        }
    }

    /// Write adapter parameters. With `reset`, parameters not in the list
    /// revert to their defaults.
    pub fn set_params(&mut self, params: &[AdapterParamSetting], reset: bool) {
        let mut la_nfcid1 = None;
        for param in params {
            match (&param.id, &param.value) {
                (AdapterParam::LaNfcid1, AdapterParamValue::Nfcid1(bytes)) => {
                    la_nfcid1 = Some(bytes.clone());
                }
            }
        }

        if let Some(mut bytes) = la_nfcid1 {
            bytes.truncate(NFCID1_MAX_LEN);
            let nci_params =
                [NciParam { key: NciParamKey::LaNfcid1, value: NciParamValue::Nfcid1(bytes) }];
            self.nci.set_params(&nci_params, reset);
        } else if reset {
            self.nci.set_params(&[], true);
        }
    }
}

/*==========================================================================*
 * Mode parameter converters
 *==========================================================================*/

fn param_poll_a(mp: Option<&ModeParam>) -> Option<ParamPollA> {
    match mp {
        Some(ModeParam::PollA(pa)) => {
            Some(ParamPollA { sel_res: pa.sel_res, nfcid1: pa.nfcid1.clone() })
        }
        _ => None,
    }
}

fn param_poll_b(mp: Option<&ModeParam>) -> Option<ParamPollB> {
    match mp {
        Some(ModeParam::PollB(pb)) => Some(ParamPollB {
            fsc: pb.fsc,
            nfcid0: pb.nfcid0,
            app_data: pb.app_data,
            prot_info: pb.prot_info.clone(),
        }),
        _ => None,
    }
}

fn param_poll_f(mp: Option<&ModeParam>) -> Option<ParamPollF> {
    match mp {
        Some(ModeParam::PollF(pf)) => Some(ParamPollF {
            bitrate: match pf.bitrate {
                1 => 212,
                2 => 424,
                // The remaining codes are RFU in [NCI] 1.0.
                _ => 0,
            },
            nfcid2: pf.nfcid2.to_vec(),
        }),
        _ => None,
    }
}

fn param_listen_f(mp: Option<&ModeParam>) -> Option<ParamListenF> {
    match mp {
        Some(ModeParam::ListenF(lf)) => Some(ParamListenF { nfcid2: lf.nfcid2.clone() }),
        _ => None,
    }
}

fn param_iso_dep_poll_a(ap: Option<&ActivationParam>) -> Option<ParamIsoDepPollA> {
    match ap {
        Some(ActivationParam::IsoDepPollA(src)) => Some(ParamIsoDepPollA {
            fsc: src.fsc,
            t0: src.t0,
            ta: src.ta,
            tb: src.tb,
            tc: src.tc,
            t1: src.t1.clone(),
        }),
        _ => None,
    }
}

fn param_iso_dep_poll_b(ap: Option<&ActivationParam>) -> Option<ParamIsoDepPollB> {
    match ap {
        Some(ActivationParam::IsoDepPollB(src)) => {
            Some(ParamIsoDepPollB { mbli: src.mbli, did: src.did, hlr: src.hlr.clone() })
        }
        _ => None,
    }
}

fn param_nfc_dep_poll(ap: Option<&ActivationParam>) -> Option<ParamNfcDepInitiator> {
    match ap {
        Some(ActivationParam::NfcDepPoll(src)) => {
            Some(ParamNfcDepInitiator { atr_res_g: src.g.clone() })
        }
        _ => None,
    }
}

fn param_nfc_dep_listen(ap: Option<&ActivationParam>) -> Option<ParamNfcDepTarget> {
    match ap {
        Some(ActivationParam::NfcDepListen(src)) => {
            Some(ParamNfcDepTarget { atr_req_g: src.g.clone() })
        }
        _ => None,
    }
}

fn poll_params(ntf: &IntfActivationNtf) -> Option<ParamPoll> {
    match ntf.mode {
        NciMode::PassivePollA => param_poll_a(ntf.mode_param.as_ref()).map(ParamPoll::A),
        NciMode::PassivePollB => param_poll_b(ntf.mode_param.as_ref()).map(ParamPoll::B),
        _ => None,
    }
}
