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

//! Interface to the NFC daemon framework above the adapter.
//!
//! The framework owns the user visible tag, peer and host objects; the
//! adapter only observes them through opaque registration ids and is told
//! about their destruction with [`crate::adapter::Adapter::object_destroyed`].

use std::ops::{BitOr, BitOrAssign};

/// Longest NFCID1 defined by [DIGITAL] (double size NFCID1).
pub const NFCID1_MAX_LEN: usize = 10;

/// Operating modes of the adapter as seen by the framework.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NfcMode(u8);

impl NfcMode {
    #[allow(missing_docs)]
    pub const NONE: NfcMode = NfcMode(0);
    /// Tag reading and writing.
    pub const READER_WRITER: NfcMode = NfcMode(0x01);
    /// Peer-to-peer, local side polls.
    pub const P2P_INITIATOR: NfcMode = NfcMode(0x02);
    /// Peer-to-peer, local side listens.
    pub const P2P_TARGET: NfcMode = NfcMode(0x04);
    /// Card emulation.
    pub const CARD_EMULATION: NfcMode = NfcMode(0x08);

    /// Check that all bits of `other` are set in `self`.
    pub const fn contains(self, other: NfcMode) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for NfcMode {
    type Output = NfcMode;
    fn bitor(self, rhs: NfcMode) -> NfcMode {
        NfcMode(self.0 | rhs.0)
    }
}

impl BitOrAssign for NfcMode {
    fn bitor_assign(&mut self, rhs: NfcMode) {
        self.0 |= rhs.0;
    }
}

/// RF technology of an endpoint, in framework terms.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Technology {
    A,
    B,
    F,
}

/// Mask of technologies, used for the allowed-technology setting.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TechnologyMask(u8);

impl TechnologyMask {
    #[allow(missing_docs)]
    pub const NONE: TechnologyMask = TechnologyMask(0);
    #[allow(missing_docs)]
    pub const A: TechnologyMask = TechnologyMask(0x01);
    #[allow(missing_docs)]
    pub const B: TechnologyMask = TechnologyMask(0x02);
    #[allow(missing_docs)]
    pub const F: TechnologyMask = TechnologyMask(0x04);

    /// Check that all bits of `other` are set in `self`.
    pub const fn contains(self, other: TechnologyMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for TechnologyMask {
    type Output = TechnologyMask;
    fn bitor(self, rhs: TechnologyMask) -> TechnologyMask {
        TechnologyMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for TechnologyMask {
    fn bitor_assign(&mut self, rhs: TechnologyMask) {
        self.0 |= rhs.0;
    }
}

/// Tag protocol of a poll side endpoint, in framework terms.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum NfcProtocol {
    T1Tag,
    T2Tag,
    T3Tag,
    T4aTag,
    T4bTag,
    NfcDep,
}

/// Outcome of a transmit reported back to the framework.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum TransmitStatus {
    Ok,
    Error,
    Timeout,
}

/// Flags of the framework transaction sequence currently attached to the
/// target. The only flag the adapter cares about is whether presence
/// checks may be interleaved with the sequence's transmissions.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SequenceFlags(u8);

impl SequenceFlags {
    #[allow(missing_docs)]
    pub const NONE: SequenceFlags = SequenceFlags(0);
    /// Presence checks may run between the sequence's transmissions.
    pub const ALLOW_PRESENCE_CHECK: SequenceFlags = SequenceFlags(0x01);

    /// Check that all bits of `other` are set in `self`.
    pub const fn contains(self, other: SequenceFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Registration id of a framework owned tag object.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TagId(pub u32);

/// Registration id of a framework owned peer object.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PeerId(pub u32);

/// Registration id of a framework owned card emulation host object.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HostId(pub u32);

/// Any framework owned object the adapter may be observing.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ObjectId {
    Tag(TagId),
    Peer(PeerId),
    Host(HostId),
}

/// NFC-A poll parameters handed to tag and peer factories.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct ParamPollA {
    pub sel_res: Option<u8>,
    pub nfcid1: Vec<u8>,
}

/// NFC-B poll parameters handed to tag factories.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct ParamPollB {
    pub fsc: u16,
    pub nfcid0: [u8; 4],
    pub app_data: [u8; 4],
    pub prot_info: Vec<u8>,
}

/// NFC-F poll parameters handed to peer factories.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParamPollF {
    /// Bit rate in kbit/s (212 or 424, 0 when unknown).
    pub bitrate: u16,
    #[allow(missing_docs)]
    pub nfcid2: Vec<u8>,
}

/// NFC-F listen parameters handed to peer factories.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct ParamListenF {
    pub nfcid2: Vec<u8>,
}

/// ISO-DEP activation parameters of a Type 4A tag.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct ParamIsoDepPollA {
    pub fsc: u16,
    pub t0: u8,
    pub ta: u8,
    pub tb: u8,
    pub tc: u8,
    pub t1: Vec<u8>,
}

/// ISO-DEP activation parameters of a Type 4B tag.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct ParamIsoDepPollB {
    pub mbli: u8,
    pub did: u8,
    pub hlr: Vec<u8>,
}

/// NFC-DEP parameters of a poll side peer.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct ParamNfcDepInitiator {
    pub atr_res_g: Vec<u8>,
}

/// NFC-DEP parameters of a listen side peer.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct ParamNfcDepTarget {
    pub atr_req_g: Vec<u8>,
}

/// Minimal poll parameter snapshot for tags with no dedicated factory.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ParamPoll {
    A(ParamPollA),
    B(ParamPollB),
}

/// Adapter parameters exposed to the framework.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AdapterParam {
    /// NFCID1 used in passive listen A mode.
    LaNfcid1,
}

/// Value of an adapter parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdapterParamValue {
    /// NFCID1 bytes, at most [`NFCID1_MAX_LEN`] of them.
    Nfcid1(Vec<u8>),
}

/// Parameter assignment for [`crate::adapter::Adapter::set_params`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct AdapterParamSetting {
    pub id: AdapterParam,
    pub value: AdapterParamValue,
}

/// Factories and notifications of the NFC daemon framework.
///
/// Factory methods return the registration id of the created object, or
/// `None` if the framework declined the activation (for example because no
/// service is interested in the endpoint type). The notification methods
/// refer to the single endpoint currently held by the adapter.
pub trait Framework {
    /// Register a Type 2 tag.
    fn add_tag_t2(&mut self, poll_a: Option<&ParamPollA>) -> Option<TagId>;
    /// Register a Type 4A tag.
    fn add_tag_t4a(
        &mut self,
        poll_a: Option<&ParamPollA>,
        iso_dep: Option<&ParamIsoDepPollA>,
    ) -> Option<TagId>;
    /// Register a Type 4B tag.
    fn add_tag_t4b(
        &mut self,
        poll_b: Option<&ParamPollB>,
        iso_dep: Option<&ParamIsoDepPollB>,
    ) -> Option<TagId>;
    /// Register a tag of an otherwise unrecognized kind.
    fn add_other_tag(&mut self, poll: Option<&ParamPoll>) -> Option<TagId>;
    /// Register a poll side peer discovered over NFC-A.
    fn add_peer_initiator_a(
        &mut self,
        poll_a: Option<&ParamPollA>,
        nfc_dep: Option<&ParamNfcDepInitiator>,
    ) -> Option<PeerId>;
    /// Register a poll side peer discovered over NFC-F.
    fn add_peer_initiator_f(
        &mut self,
        poll_f: Option<&ParamPollF>,
        nfc_dep: Option<&ParamNfcDepInitiator>,
    ) -> Option<PeerId>;
    /// Register a listen side peer reached over NFC-A.
    fn add_peer_target_a(&mut self, nfc_dep: Option<&ParamNfcDepTarget>) -> Option<PeerId>;
    /// Register a listen side peer reached over NFC-F.
    fn add_peer_target_f(
        &mut self,
        listen_f: Option<&ParamListenF>,
        nfc_dep: Option<&ParamNfcDepTarget>,
    ) -> Option<PeerId>;
    /// Register a card emulation host.
    fn add_host(&mut self) -> Option<HostId>;

    /// The poll side endpoint left the field for good.
    fn target_gone(&mut self);
    /// The poll side endpoint was reactivated after a deliberate
    /// reactivation request.
    fn target_reactivated(&mut self);
    /// The listen side endpoint is gone for good.
    fn initiator_gone(&mut self);
    /// The listen side endpoint reactivated the interface.
    fn initiator_reactivated(&mut self);
    /// A transmit on the poll side endpoint finished.
    fn transmit_done(&mut self, status: TransmitStatus, payload: &[u8]);
    /// Operating mode update. `confirmed` is set when the update completes
    /// a mode request, clear when the mode drifted on its own.
    fn mode_notify(&mut self, mode: NfcMode, confirmed: bool);
    /// An adapter parameter changed below the framework.
    fn param_change_notify(&mut self, param: AdapterParam);
}
