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

//! Snapshot of an interface activation and the match predicate deciding
//! whether a later activation refers to the same physical endpoint.

use crate::nci::{IntfActivationNtf, ModeParam, NciMode, PollA, PollB, RfInterface, RfProtocol};

const RANDOM_UID_SIZE: usize = 4;
const RANDOM_UID_START_BYTE: u8 = 0x08;

/// Deep copy of the identifying fields of an activation notification.
/// Kept by the adapter as the reference for reactivation matching.
#[derive(Clone, Debug)]
pub struct IntfInfo {
    #[allow(missing_docs)]
    pub rf_intf: RfInterface,
    #[allow(missing_docs)]
    pub protocol: RfProtocol,
    #[allow(missing_docs)]
    pub mode: NciMode,
    mode_param_bytes: Vec<u8>,
    activation_param_bytes: Vec<u8>,
    mode_param: Option<ModeParam>,
}

impl IntfInfo {
    /// Snapshot an activation notification.
    pub fn new(ntf: &IntfActivationNtf) -> IntfInfo {
        IntfInfo {
            rf_intf: ntf.rf_intf,
            protocol: ntf.protocol,
            mode: ntf.mode,
            mode_param_bytes: ntf.mode_param_bytes.clone(),
            activation_param_bytes: ntf.activation_param_bytes.clone(),
            mode_param: ntf.mode_param.clone(),
        }
    }

    /// Decide whether `ntf` activates the same physical endpoint this
    /// snapshot was taken from.
    pub fn matches(&self, ntf: &IntfActivationNtf) -> bool {
        self.rf_intf == ntf.rf_intf
            && self.protocol == ntf.protocol
            && self.mode == ntf.mode
            && self.mode_params_match(ntf)
            && self.activation_param_bytes == ntf.activation_param_bytes
    }

    fn mode_params_match(&self, ntf: &IntfActivationNtf) -> bool {
        if let (Some(old), Some(new)) = (self.mode_param.as_ref(), ntf.mode_param.as_ref()) {
            // Mode param criteria depend on the type of tag.
            match (ntf.mode, ntf.rf_intf) {
                // Type 2 tag or ISO-DEP Type 4A.
                (NciMode::PassivePollA, RfInterface::Frame | RfInterface::IsoDep) => {
                    if let (ModeParam::PollA(old), ModeParam::PollA(new)) = (old, new) {
                        return poll_a_match(old, new);
                    }
                }
                // ISO-DEP Type 4B.
                (NciMode::PassivePollB, RfInterface::IsoDep) => {
                    if let (ModeParam::PollB(old), ModeParam::PollB(new)) = (old, new) {
                        return poll_b_match(old, new);
                    }
                }
                _ => (),
            }
        }
        // Full match is expected in other cases.
        self.mode_param_bytes == ntf.mode_param_bytes
    }
}

fn poll_a_match(pa1: &PollA, pa2: &PollA) -> bool {
    if pa1.sel_res == pa2.sel_res
        && pa1.nfcid1.len() == pa2.nfcid1.len()
        && pa1.sens_res == pa2.sens_res
    {
        // As specified in NFCForum-TS-DigitalProtocol-1.0, in case of
        // a single size NFCID1 (4 bytes), a value of nfcid10 set to 08h
        // indicates that nfcid11 to nfcid13 SHALL be dynamically generated.
        if pa1.nfcid1.len() == RANDOM_UID_SIZE
            && pa1.nfcid1.first() == Some(&RANDOM_UID_START_BYTE)
            && pa2.nfcid1.first() == Some(&RANDOM_UID_START_BYTE)
        {
            true
        } else {
            // Otherwise the UID must fully match.
            pa1.nfcid1 == pa2.nfcid1
        }
    } else {
        false
    }
}

fn poll_b_match(pb1: &PollB, pb2: &PollB) -> bool {
    // Compare all fields except the UID because the UID may change after
    // the card loses the field.
    pb1.fsc == pb2.fsc && pb1.app_data == pb2.app_data && pb1.prot_info == pb2.prot_info
}
