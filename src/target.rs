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

//! Data path object for a remote endpoint activated in poll mode.
//!
//! A [`Target`] carries the strategies selected at activation time: how to
//! probe the endpoint for presence (by protocol) and how to interpret an
//! inbound data packet that completes a transmission (by RF interface).

use crate::framework::{NfcProtocol, SequenceFlags, Technology, TransmitStatus};
use crate::nci::{
    IntfActivationNtf, NciCore, NciMode, RfInterface, RfProtocol, SendId, STATIC_RF_CONN_ID,
    STATUS_OK, STATUS_OK_1_BIT, STATUS_OK_7_BIT, STATUS_RF_FRAME_CORRUPTED,
};
use bytes::Bytes;
use log::debug;
use std::time::Duration;

/// Type 2 tag READ command code.
const T2T_CMD_READ: u8 = 0x30;

/// Default transmit timeout the Frame RF interface inherits.
pub const DEFAULT_TRANSMIT_TIMEOUT: Duration = Duration::from_millis(500);

/// With some ISO-DEP cards, CORE_INTERFACE_ERROR_NTF with RF_TIMEOUT_ERROR
/// may take up to 15 seconds to arrive (observed with an MRTD equipped with
/// a Type 4B NFC tag). That's way too long. On the other hand, the default
/// timeout appears to be too short for slow ISO-DEP cards (also reported to
/// happen in real life). Use a longer but still reasonable timeout when the
/// ISO-DEP interface is activated.
pub const ISO_DEP_TRANSMIT_TIMEOUT: Duration = Duration::from_millis(2500);

/// Who started the transmission currently going through the data path.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransmitKind {
    /// Application transmit, completion goes to the framework.
    User,
    /// Presence check probe, completion stays in the adapter.
    Probe,
}

/// Presence probe strategy, selected by protocol.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum PresenceCheck {
    /// Type 2 tags answer a READ of block 0.
    T2Read,
    /// ISO-DEP endpoints answer an empty I-frame.
    T4EmptyFrame,
}

/// Transmission completion strategy, selected by RF interface.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum TransmitFinish {
    Frame,
    IsoDep,
    NfcDep,
}

/// Completed transmission, ready to be routed by the adapter.
pub type TransmitResult = (TransmitKind, TransmitStatus, Bytes);

/// Poll side data path endpoint.
#[derive(Debug)]
pub struct Target {
    technology: Technology,
    protocol: NfcProtocol,
    presence_check: Option<PresenceCheck>,
    transmit_finish: TransmitFinish,
    transmit_timeout: Option<Duration>,
    sequence: Option<SequenceFlags>,
    send_in_progress: Option<SendId>,
    transmit_in_progress: Option<TransmitKind>,
    /// Reply that arrived before the send completed.
    pending_reply: Option<Bytes>,
}

impl Target {
    /// Build the data path object for an activation, selecting the
    /// presence check and transmit completion strategies. Returns `None`
    /// for listen mode activations and for combinations of protocol and
    /// RF interface that have no poll side data path.
    pub fn from_activation(ntf: &IntfActivationNtf) -> Option<Target> {
        let technology = match ntf.mode {
            NciMode::PassivePollA | NciMode::ActivePollA => Technology::A,
            NciMode::PassivePollB => Technology::B,
            NciMode::PassivePollF | NciMode::ActivePollF => Technology::F,
            _ => return None,
        };

        let (protocol, presence_check) = match ntf.protocol {
            RfProtocol::T1t => (NfcProtocol::T1Tag, None),
            RfProtocol::T2t => (NfcProtocol::T2Tag, Some(PresenceCheck::T2Read)),
            RfProtocol::T3t => (NfcProtocol::T3Tag, None),
            RfProtocol::IsoDep => {
                let protocol = match technology {
                    Technology::A => NfcProtocol::T4aTag,
                    Technology::B => NfcProtocol::T4bTag,
                    Technology::F => {
                        debug!("Unexpected ISO-DEP technology");
                        return None;
                    }
                };
                (protocol, Some(PresenceCheck::T4EmptyFrame))
            }
            RfProtocol::NfcDep => (NfcProtocol::NfcDep, None),
            protocol => {
                debug!("Unsupported protocol {:?}", protocol);
                return None;
            }
        };

        let (transmit_finish, transmit_timeout) = match ntf.rf_intf {
            RfInterface::Frame => match ntf.protocol {
                RfProtocol::NfcDep => {
                    debug!("Frame interface not supported for NFC-DEP");
                    return None;
                }
                RfProtocol::IsoDep => {
                    debug!("Frame interface not supported for ISO-DEP");
                    return None;
                }
                _ => (TransmitFinish::Frame, Some(DEFAULT_TRANSMIT_TIMEOUT)),
            },
            RfInterface::IsoDep => (TransmitFinish::IsoDep, Some(ISO_DEP_TRANSMIT_TIMEOUT)),
            // Rely on CORE_INTERFACE_ERROR_NTF.
            RfInterface::NfcDep => (TransmitFinish::NfcDep, None),
            rf_intf => {
                debug!("Unsupported RF interface {:?}", rf_intf);
                return None;
            }
        };

        Some(Target {
            technology,
            protocol,
            presence_check,
            transmit_finish,
            transmit_timeout,
            sequence: None,
            send_in_progress: None,
            transmit_in_progress: None,
            pending_reply: None,
        })
    }

    /// Technology the endpoint was discovered on.
    pub fn technology(&self) -> Technology {
        self.technology
    }

    /// Framework protocol of the endpoint.
    pub fn protocol(&self) -> NfcProtocol {
        self.protocol
    }

    /// Transmit timeout for the active RF interface, `None` when interface
    /// level error notifications are relied upon instead.
    pub fn transmit_timeout(&self) -> Option<Duration> {
        self.transmit_timeout
    }

    pub(crate) fn sequence(&self) -> Option<SequenceFlags> {
        self.sequence
    }

    pub(crate) fn set_sequence(&mut self, sequence: Option<SequenceFlags>) {
        self.sequence = sequence;
    }

    pub(crate) fn transmit_in_flight(&self) -> Option<TransmitKind> {
        self.transmit_in_progress
    }

    pub(crate) fn can_presence_check(&self) -> bool {
        self.presence_check.is_some()
    }

    /// Queue a transmission on the static RF connection.
    pub(crate) fn transmit<N: NciCore>(
        &mut self,
        nci: &mut N,
        payload: Bytes,
        kind: TransmitKind,
    ) -> bool {
        debug_assert!(self.send_in_progress.is_none());
        debug_assert!(self.transmit_in_progress.is_none());
        if self.send_in_progress.is_some() || self.transmit_in_progress.is_some() {
            return false;
        }
        match nci.send_data(STATIC_RF_CONN_ID, payload) {
            Some(id) => {
                self.send_in_progress = Some(id);
                self.transmit_in_progress = Some(kind);
                true
            }
            None => false,
        }
    }

    /// Issue the protocol specific presence probe through the transmit
    /// path. Returns false if the protocol has no probe or the probe could
    /// not be queued.
    pub(crate) fn start_presence_check<N: NciCore>(&mut self, nci: &mut N) -> bool {
        let payload = match self.presence_check {
            Some(PresenceCheck::T2Read) => Bytes::from_static(&[T2T_CMD_READ, 0x00]),
            Some(PresenceCheck::T4EmptyFrame) => Bytes::new(),
            None => return false,
        };
        self.transmit(nci, payload, TransmitKind::Probe)
    }

    /// Send completion callback. Returns the finished transmission if a
    /// reply had already been buffered waiting for this completion.
    pub(crate) fn send_complete(&mut self, id: SendId, ok: bool) -> Option<TransmitResult> {
        if self.send_in_progress != Some(id) {
            return None;
        }
        self.send_in_progress = None;
        if !ok {
            debug!("Send failed");
        }
        if let Some(reply) = self.pending_reply.take() {
            // We have been waiting for this send to complete.
            debug!("Send completed");
            Some(self.finish(reply))
        } else {
            None
        }
    }

    /// Inbound data packet callback. Returns the finished transmission, or
    /// `None` when the packet was buffered or ignored.
    pub(crate) fn data_packet(&mut self, conn_id: u8, payload: Bytes) -> Option<TransmitResult> {
        if conn_id == STATIC_RF_CONN_ID
            && self.transmit_in_progress.is_some()
            && self.pending_reply.is_none()
        {
            if self.send_in_progress.is_some() {
                // Due to the multi-threaded nature of some HAL drivers and
                // services, incoming reply transactions sometimes get
                // handled before the send completion callback has been
                // invoked. Postpone transfer completion until then.
                debug!("Waiting for send to complete");
                self.pending_reply = Some(payload);
                None
            } else {
                Some(self.finish(payload))
            }
        } else {
            debug!("Unhandled data packet, cid={:#04x} {} byte(s)", conn_id, payload.len());
            None
        }
    }

    /// Abandon the transmission in progress, if any. Returns its kind so
    /// the caller can fail it towards the right party.
    pub(crate) fn timeout_expired<N: NciCore>(&mut self, nci: &mut N) -> Option<TransmitKind> {
        let kind = self.transmit_in_progress.take()?;
        self.cancel_send(nci);
        Some(kind)
    }

    pub(crate) fn cancel_transmit<N: NciCore>(&mut self, nci: &mut N) {
        self.transmit_in_progress = None;
        self.cancel_send(nci);
    }

    fn cancel_send<N: NciCore>(&mut self, nci: &mut N) {
        if let Some(id) = self.send_in_progress.take() {
            nci.cancel(id);
        }
        self.pending_reply = None;
    }

    fn finish(&mut self, payload: Bytes) -> TransmitResult {
        let kind = self.transmit_in_progress.take().unwrap_or(TransmitKind::User);
        match self.transmit_finish {
            // [NCI] 8.2 Frame RF Interface
            // 8.2.1.2 Data from RF to the DH
            //
            // For NFC-A and NFC-B the Data Message SHALL correspond to the
            // payload defined in [DIGITAL] followed by a Status field of
            // one octet.
            TransmitFinish::Frame => {
                if payload.is_empty() {
                    return (kind, TransmitStatus::Error, Bytes::new());
                }
                let status = payload[payload.len() - 1];
                if status == STATUS_RF_FRAME_CORRUPTED {
                    debug!("Transmission status {:#04x}", status);
                    return (kind, TransmitStatus::Error, Bytes::new());
                }
                match status {
                    // STATUS_OK_n_BIT marks a short frame of n bits.
                    STATUS_OK | STATUS_OK_1_BIT..=STATUS_OK_7_BIT => (),
                    status => debug!("Hmm... transmission status {:#04x}", status),
                }
                (kind, TransmitStatus::Ok, payload.slice(..payload.len() - 1))
            }
            // [NCI] 8.3.1.2 and 8.4.1.2: ISO-DEP and NFC-DEP data messages
            // carry the upper layer payload verbatim.
            TransmitFinish::IsoDep | TransmitFinish::NfcDep => {
                (kind, TransmitStatus::Ok, payload)
            }
        }
    }
}
