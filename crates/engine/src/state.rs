// RDB - Remote Program Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Per-program debug state, partitioned so that operations on different
//! programs never serialize behind each other.
//!
//! Each program carries two locks with distinct roles:
//!
//! - the **control lock** (short-held, never across an await point) guards
//!   the execution status together with the breakpoint set, so a Busy check
//!   and a breakpoint mutation are atomic with respect to a concurrent
//!   `start` on the same program;
//! - the **run lock** (a tokio mutex, held for the duration of a run loop)
//!   guards the cursor and variable context. Holding it only blocks tasks
//!   touching the *same* program, which the attachment invariant already
//!   makes impossible for well-behaved sessions.

use std::{collections::BTreeSet, sync::Arc};

use dashmap::DashMap;
use parking_lot::Mutex;
use rdb_common::{ExecStatus, ValContext};
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

/// Status and breakpoints, guarded together.
#[derive(Debug)]
pub struct Control {
    /// Current execution status
    pub status: ExecStatus,
    /// Registered breakpoint line numbers (1-based, physical)
    pub breakpoints: BTreeSet<usize>,
}

/// Resumable cursor state: the index of the next statement to execute and
/// the variable bindings of the current run.
#[derive(Debug, Default)]
pub struct RunState {
    /// 0-based index of the next physical line to execute
    pub cursor: usize,
    /// Variable bindings of the current run
    pub context: ValContext,
}

/// Debug state of one program.
#[derive(Debug)]
pub struct ProgramState {
    /// Short-held control lock: status + breakpoints
    pub control: Mutex<Control>,
    /// Run lock: cursor + context, held across a whole run loop
    pub run: AsyncMutex<RunState>,
}

impl Default for ProgramState {
    fn default() -> Self {
        Self {
            control: Mutex::new(Control {
                status: ExecStatus::Idle,
                breakpoints: BTreeSet::new(),
            }),
            run: AsyncMutex::new(RunState::default()),
        }
    }
}

impl ProgramState {
    /// Snapshot the current status under the control lock.
    pub fn status(&self) -> ExecStatus {
        self.control.lock().status
    }
}

/// The shared, program-keyed state partition.
///
/// Entries are created lazily on first attach and live for the process
/// lifetime; the map itself is sharded, so touching one program never
/// contends with another.
#[derive(Debug, Default)]
pub struct ProgramStates {
    states: DashMap<String, Arc<ProgramState>>,
}

impl ProgramStates {
    /// Create an empty partition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the state for `program`, creating an idle one if absent.
    pub fn ensure(&self, program: &str) -> Arc<ProgramState> {
        self.states.entry(program.to_string()).or_default().clone()
    }

    /// Get the state for `program` if it has ever been initialized.
    pub fn get(&self, program: &str) -> Option<Arc<ProgramState>> {
        self.states.get(program).map(|entry| entry.value().clone())
    }

    /// Drop any running/paused marker for `program`, leaving cursor and
    /// context intact. Called when the attached session goes away; the
    /// program becomes attachable and its breakpoints editable again, but
    /// a resumed `continue` is impossible until a fresh `start`.
    pub fn clear_busy(&self, program: &str) {
        if let Some(state) = self.get(program) {
            let mut control = state.control.lock();
            if control.status.is_busy() {
                debug!(program, status = %control.status, "Clearing busy marker");
                control.status = ExecStatus::Idle;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_is_idempotent() {
        let states = ProgramStates::new();
        let a = states.ensure("demo");
        let b = states.ensure("demo");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_clear_busy_resets_running_and_paused_only() {
        let states = ProgramStates::new();
        let state = states.ensure("demo");

        state.control.lock().status = ExecStatus::Paused;
        states.clear_busy("demo");
        assert_eq!(state.status(), ExecStatus::Idle);

        state.control.lock().status = ExecStatus::Finished;
        states.clear_busy("demo");
        assert_eq!(state.status(), ExecStatus::Finished);
    }

    #[test]
    fn test_clear_busy_on_unknown_program_is_a_noop() {
        let states = ProgramStates::new();
        states.clear_busy("ghost");
        assert!(states.get("ghost").is_none());
    }
}
