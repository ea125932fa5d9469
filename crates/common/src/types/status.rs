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

use std::fmt;

use serde::{Deserialize, Serialize};

/// Execution status of one program.
///
/// Legal transitions: `Idle -> Running` (start), `Running -> Paused`
/// (breakpoint), `Running -> Finished` (exhaustion), `Running -> Errored`
/// (interpreter failure), `Paused -> Running` (continue), and any state
/// `-> Running` via a fresh start. Detaching while running or paused drops
/// the status back to `Idle` without touching the stored cursor/context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecStatus {
    /// No run in flight (either never started, or cleared by a detach)
    Idle,
    /// The run loop is executing statements
    Running,
    /// Stopped at a breakpoint, resumable via `continue`
    Paused,
    /// The statement sequence ran to exhaustion
    Finished,
    /// The interpreter failed on a statement
    Errored,
}

impl ExecStatus {
    /// Whether the program is in a state that blocks breakpoint mutation
    /// and a competing attach-time reset.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }
}

impl fmt::Display for ExecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Finished => "finished",
            Self::Errored => "errored",
        };
        write!(f, "{s}")
    }
}
