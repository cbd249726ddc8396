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

//! Cooperative event loop driving an [`Adapter`].
//!
//! NCI callbacks arrive on an unbounded channel and are dispatched in FIFO
//! order. The adapter's deferred work (presence check period, CE
//! reactivation one-shot, transmit deadline, idle mode check) is tracked as
//! plain data on the adapter; this loop turns it into actual sleeps.

use crate::adapter::{Adapter, CE_REACTIVATION_TIMEOUT, PRESENCE_CHECK_PERIOD};
use crate::framework::Framework;
use crate::nci::{NciCore, NciEvent};
use anyhow::Result;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

/// Run the adapter until the NCI event channel closes.
pub async fn run<N: NciCore, F: Framework>(
    adapter: &mut Adapter<N, F>,
    mut events: mpsc::UnboundedReceiver<NciEvent>,
) -> Result<()> {
    let mut presence_deadline: Option<Instant> = None;
    let mut ce_deadline: Option<Instant> = None;
    let mut ce_generation = adapter.timer_control().ce_generation;
    let mut transmit_deadline: Option<Instant> = None;
    let mut transmit_generation = adapter.timer_control().transmit_generation;

    loop {
        // Refresh the sleep deadlines from the adapter's bookkeeping.
        let timers = adapter.timer_control();
        if timers.presence_armed {
            if presence_deadline.is_none() {
                presence_deadline = Some(Instant::now() + PRESENCE_CHECK_PERIOD);
            }
        } else {
            presence_deadline = None;
        }
        if timers.ce_armed {
            if ce_deadline.is_none() || ce_generation != timers.ce_generation {
                ce_deadline = Some(Instant::now() + CE_REACTIVATION_TIMEOUT);
                ce_generation = timers.ce_generation;
            }
        } else {
            ce_deadline = None;
            ce_generation = timers.ce_generation;
        }
        match timers.transmit_timeout {
            Some(timeout) => {
                if transmit_deadline.is_none() || transmit_generation != timers.transmit_generation
                {
                    transmit_deadline = Some(Instant::now() + timeout);
                    transmit_generation = timers.transmit_generation;
                }
            }
            None => {
                transmit_deadline = None;
                transmit_generation = timers.transmit_generation;
            }
        }

        tokio::select! {
            event = events.recv() => {
                let event = event.ok_or_else(|| anyhow::anyhow!("nci event channel closed"))?;
                dispatch(adapter, event);
            }
            _ = sleep_until(presence_deadline) => {
                presence_deadline = None;
                adapter.presence_tick();
            }
            _ = sleep_until(ce_deadline) => {
                ce_deadline = None;
                adapter.ce_reactivation_timeout();
            }
            _ = sleep_until(transmit_deadline) => {
                transmit_deadline = None;
                adapter.transmit_timeout_expired();
            }
        }

        // Deferred work runs once the loop goes idle.
        if adapter.mode_check_scheduled() {
            adapter.run_mode_check();
        }
    }
}

fn dispatch<N: NciCore, F: Framework>(adapter: &mut Adapter<N, F>, event: NciEvent) {
    match event {
        NciEvent::CurrentStateChanged => adapter.current_state_changed(),
        NciEvent::NextStateChanged => adapter.next_state_changed(),
        NciEvent::IntfActivated(ntf) => adapter.intf_activated(&ntf),
        NciEvent::DataPacket { conn_id, payload } => adapter.data_packet(conn_id, payload),
        NciEvent::SendComplete { id, ok } => adapter.send_complete(id, ok),
        NciEvent::ParamChanged(key) => adapter.param_changed(key),
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
