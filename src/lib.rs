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

//! Glue state machine between an NCI protocol stack and an NFC daemon
//! framework.
//!
//! The adapter translates NCI RF discovery transitions and interface
//! activation notifications into the daemon's logical endpoint model (tags,
//! peers, card emulation hosts), keeps a physical endpoint alive across
//! brief RF losses (presence checks, card emulation reactivation), and
//! marshals application data through the NCI data path with the framing
//! rules of the active RF interface.
//!
//! The NCI core below and the framework above are both represented by
//! traits ([`nci::NciCore`], [`framework::Framework`]); the crate itself
//! holds no I/O. [`exec::run`] provides the single threaded cooperative
//! loop that feeds NCI callbacks and timer expirations into the adapter.

#![warn(missing_docs)]

pub mod adapter;
pub mod exec;
pub mod framework;
pub mod intf;
pub mod nci;
pub mod target;

pub use adapter::{Adapter, InternalState, CE_REACTIVATION_TIMEOUT, PRESENCE_CHECK_PERIOD};
pub use framework::Framework;
pub use intf::IntfInfo;
pub use nci::{NciCore, NciEvent};
pub use target::Target;
