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

//! NCI-side vocabulary and the interface to the NCI core.
//!
//! The NCI core itself (RF discovery state machine, packet framing, HAL
//! transport) lives below this crate. It is represented here by the
//! [`NciCore`] trait for outbound requests and the [`NciEvent`] enum for
//! inbound callbacks delivered on the main loop.

use bytes::Bytes;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

/// Conn ID of the static RF connection between the DH and a remote
/// NFC endpoint.
pub const STATIC_RF_CONN_ID: u8 = 0x00;

/// [NCI] Table 131: Status Codes.
pub const STATUS_OK: u8 = 0x00;
/// RF frame was received with errors detected by the NFCC.
pub const STATUS_RF_FRAME_CORRUPTED: u8 = 0x02;
/// [NCI] 8.2 Frame RF Interface: status appended to short frames in NFC-A,
/// where 'n' is the number of bits in the frame.
pub const STATUS_OK_1_BIT: u8 = 0x0b;
#[allow(missing_docs)]
pub const STATUS_OK_2_BIT: u8 = 0x0c;
#[allow(missing_docs)]
pub const STATUS_OK_3_BIT: u8 = 0x0d;
#[allow(missing_docs)]
pub const STATUS_OK_4_BIT: u8 = 0x0e;
#[allow(missing_docs)]
pub const STATUS_OK_5_BIT: u8 = 0x0f;
#[allow(missing_docs)]
pub const STATUS_OK_6_BIT: u8 = 0x10;
#[allow(missing_docs)]
pub const STATUS_OK_7_BIT: u8 = 0x11;

/// RF interface selected by the NFCC for an activated remote endpoint.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum RfInterface {
    NfceeDirect,
    Frame,
    IsoDep,
    NfcDep,
    Proprietary,
}

/// RF protocol of an activated remote endpoint.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum RfProtocol {
    Undetermined,
    T1t,
    T2t,
    T3t,
    T5t,
    IsoDep,
    NfcDep,
    Proprietary,
}

/// Activation RF technology and mode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum NciMode {
    PassivePollA,
    PassivePollB,
    PassivePollF,
    ActivePollA,
    ActivePollF,
    PassivePollV,
    PassiveListenA,
    PassiveListenB,
    PassiveListenF,
    ActiveListenA,
    ActiveListenF,
    PassiveListenV,
}

/// State of the RF discovery state machine of the NCI core.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum RfState {
    Idle,
    Discovery,
    W4AllDiscoveries,
    W4HostSelect,
    PollActive,
    ListenActive,
    ListenSleep,
}

/// Mask of RF technologies, with separate poll and listen side bits.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NciTech(u16);

impl NciTech {
    #[allow(missing_docs)]
    pub const NONE: NciTech = NciTech(0);
    #[allow(missing_docs)]
    pub const A_POLL: NciTech = NciTech(0x0001);
    #[allow(missing_docs)]
    pub const A_LISTEN: NciTech = NciTech(0x0002);
    #[allow(missing_docs)]
    pub const A: NciTech = NciTech(Self::A_POLL.0 | Self::A_LISTEN.0);
    #[allow(missing_docs)]
    pub const B_POLL: NciTech = NciTech(0x0004);
    #[allow(missing_docs)]
    pub const B_LISTEN: NciTech = NciTech(0x0008);
    #[allow(missing_docs)]
    pub const B: NciTech = NciTech(Self::B_POLL.0 | Self::B_LISTEN.0);
    #[allow(missing_docs)]
    pub const F_POLL: NciTech = NciTech(0x0010);
    #[allow(missing_docs)]
    pub const F_LISTEN: NciTech = NciTech(0x0020);
    #[allow(missing_docs)]
    pub const F: NciTech = NciTech(Self::F_POLL.0 | Self::F_LISTEN.0);
    #[allow(missing_docs)]
    pub const V_POLL: NciTech = NciTech(0x0040);
    #[allow(missing_docs)]
    pub const V: NciTech = Self::V_POLL;
    #[allow(missing_docs)]
    pub const ALL: NciTech = NciTech(Self::A.0 | Self::B.0 | Self::F.0 | Self::V.0);

    /// Check that all bits of `other` are set in `self`.
    pub const fn contains(self, other: NciTech) -> bool {
        self.0 & other.0 == other.0
    }

    /// Check that at least one bit of `other` is set in `self`.
    pub const fn intersects(self, other: NciTech) -> bool {
        self.0 & other.0 != 0
    }

    /// Check for the empty mask.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for NciTech {
    type Output = NciTech;
    fn bitor(self, rhs: NciTech) -> NciTech {
        NciTech(self.0 | rhs.0)
    }
}

impl BitOrAssign for NciTech {
    fn bitor_assign(&mut self, rhs: NciTech) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for NciTech {
    type Output = NciTech;
    fn bitand(self, rhs: NciTech) -> NciTech {
        NciTech(self.0 & rhs.0)
    }
}

impl Not for NciTech {
    type Output = NciTech;
    fn not(self) -> NciTech {
        NciTech(!self.0)
    }
}

/// Mask of operation modes submitted to the NCI core, deciding which
/// discovery configurations it generates.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OpMode(u8);

impl OpMode {
    #[allow(missing_docs)]
    pub const NONE: OpMode = OpMode(0);
    /// Reader/writer role.
    pub const RW: OpMode = OpMode(0x01);
    /// Peer-to-peer role.
    pub const PEER: OpMode = OpMode(0x02);
    /// Card emulation role.
    pub const CE: OpMode = OpMode(0x04);
    /// Poll side enabled.
    pub const POLL: OpMode = OpMode(0x08);
    /// Listen side enabled.
    pub const LISTEN: OpMode = OpMode(0x10);

    /// Check that all bits of `other` are set in `self`.
    pub const fn contains(self, other: OpMode) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for OpMode {
    type Output = OpMode;
    fn bitor(self, rhs: OpMode) -> OpMode {
        OpMode(self.0 | rhs.0)
    }
}

impl BitOrAssign for OpMode {
    fn bitor_assign(&mut self, rhs: OpMode) {
        self.0 |= rhs.0;
    }
}

/// NFC-A technology specific parameters from a poll response.
/// [NCI] Table 54: Specific Parameters for NFC-A Poll Mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollA {
    /// SENS_RES response, 2 octets.
    pub sens_res: [u8; 2],
    /// NFCID1 (4, 7 or 10 bytes).
    pub nfcid1: Vec<u8>,
    /// SEL_RES response, absent if SEL_RES_LEN was zero.
    pub sel_res: Option<u8>,
}

/// NFC-B technology specific parameters from a SENSB_RES.
/// [NCI] Table 56: Specific Parameters for NFC-B Poll Mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollB {
    /// NFCID0, 4 octets.
    pub nfcid0: [u8; 4],
    /// Maximum frame size coded in the SENSB_RES.
    pub fsc: u16,
    /// Application Data bytes of the SENSB_RES.
    pub app_data: [u8; 4],
    /// Protocol Info bytes of the SENSB_RES.
    pub prot_info: Vec<u8>,
}

/// NFC-F technology specific parameters from a SENSF_RES.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollF {
    /// Bit rate code (1 = 212 kbit/s, 2 = 424 kbit/s).
    pub bitrate: u8,
    /// NFCID2, 8 octets.
    pub nfcid2: [u8; 8],
}

/// NFC-F technology specific parameters in listen mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenF {
    /// Local NFCID2 selected by the remote initiator, may be empty.
    pub nfcid2: Vec<u8>,
}

/// Parsed technology specific parameters of an activation notification.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ModeParam {
    PollA(PollA),
    PollB(PollB),
    PollF(PollF),
    ListenF(ListenF),
}

/// ISO-DEP poll mode activation parameters (RATS response).
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct IsoDepPollA {
    pub fsc: u16,
    pub t0: u8,
    pub ta: u8,
    pub tb: u8,
    pub tc: u8,
    /// Historical bytes.
    pub t1: Vec<u8>,
}

/// ISO-DEP poll mode activation parameters (ATTRIB response).
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct IsoDepPollB {
    pub mbli: u8,
    pub did: u8,
    /// Higher layer response.
    pub hlr: Vec<u8>,
}

/// NFC-DEP poll mode activation parameters (ATR_RES).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NfcDepPoll {
    /// ATR_RES general bytes.
    pub g: Vec<u8>,
}

/// NFC-DEP listen mode activation parameters (ATR_REQ).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NfcDepListen {
    /// ATR_REQ general bytes.
    pub g: Vec<u8>,
}

/// Parsed interface specific parameters of an activation notification.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ActivationParam {
    IsoDepPollA(IsoDepPollA),
    IsoDepPollB(IsoDepPollB),
    NfcDepPoll(NfcDepPoll),
    NfcDepListen(NfcDepListen),
}

/// RF_INTF_ACTIVATED_NTF as decoded by the NCI core. Carries both the raw
/// parameter bytes and the parsed forms; the raw bytes are what interface
/// matching falls back to for modes without dedicated comparison rules.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntfActivationNtf {
    #[allow(missing_docs)]
    pub rf_intf: RfInterface,
    #[allow(missing_docs)]
    pub protocol: RfProtocol,
    #[allow(missing_docs)]
    pub mode: NciMode,
    /// Raw RF technology specific parameters.
    pub mode_param_bytes: Vec<u8>,
    /// Parsed RF technology specific parameters, if the mode has a parser.
    pub mode_param: Option<ModeParam>,
    /// Raw activation parameters.
    pub activation_param_bytes: Vec<u8>,
    /// Parsed activation parameters, if the interface has a parser.
    pub activation_param: Option<ActivationParam>,
}

/// Opaque handle of a data send accepted by the NCI core. Completion is
/// reported back through [`NciEvent::SendComplete`] with the same handle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SendId(pub u32);

/// Key of an NCI core configuration parameter exposed to the adapter.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NciParamKey {
    /// LA_NFCID1 (NFCID1 used in passive listen A mode).
    LaNfcid1,
}

/// Value of an NCI core configuration parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NciParamValue {
    /// NFCID1 bytes (4, 7 or 10 bytes).
    Nfcid1(Vec<u8>),
}

/// Key/value pair for [`NciCore::set_params`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct NciParam {
    pub key: NciParamKey,
    pub value: NciParamValue,
}

/// Requests the adapter submits to the NCI core.
///
/// `set_state` is a request for the RF state machine to move towards the
/// given state; the actual transitions are reported back through
/// [`NciEvent::CurrentStateChanged`] and [`NciEvent::NextStateChanged`].
pub trait NciCore {
    /// Current state of the RF state machine.
    fn current_state(&self) -> RfState;
    /// State the RF state machine is transitioning to. Equals
    /// [`current_state`](Self::current_state) when no transition is running.
    fn next_state(&self) -> RfState;
    /// Request a transition of the RF state machine.
    fn set_state(&mut self, state: RfState);
    /// Technologies supported by the controller.
    fn get_tech(&self) -> NciTech;
    /// Restrict discovery to the given technologies.
    fn set_tech(&mut self, tech: NciTech);
    /// Configure the discovery operation modes.
    fn set_op_mode(&mut self, op_mode: OpMode);
    /// Queue a data packet on the given connection. Returns a handle to
    /// wait for [`NciEvent::SendComplete`] on, or `None` if the send could
    /// not be queued.
    fn send_data(&mut self, conn_id: u8, payload: Bytes) -> Option<SendId>;
    /// Cancel a queued send. Cancelling an already completed handle is
    /// a no-op.
    fn cancel(&mut self, id: SendId);
    /// Read a configuration parameter.
    fn get_param(&mut self, key: NciParamKey) -> Option<NciParamValue>;
    /// Write configuration parameters. With `reset`, parameters not in the
    /// list revert to their defaults.
    fn set_params(&mut self, params: &[NciParam], reset: bool);
}

/// Callbacks from the NCI core, delivered in FIFO order on the main loop.
#[derive(Clone, Debug)]
pub enum NciEvent {
    /// The current RF state changed.
    CurrentStateChanged,
    /// The pending RF state changed.
    NextStateChanged,
    /// RF_INTF_ACTIVATED_NTF received.
    IntfActivated(IntfActivationNtf),
    /// Data packet received on a logical connection.
    DataPacket {
        #[allow(missing_docs)]
        conn_id: u8,
        #[allow(missing_docs)]
        payload: Bytes,
    },
    /// A send accepted by [`NciCore::send_data`] completed.
    SendComplete {
        #[allow(missing_docs)]
        id: SendId,
        #[allow(missing_docs)]
        ok: bool,
    },
    /// A configuration parameter changed.
    ParamChanged(NciParamKey),
}
