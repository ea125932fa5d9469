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

//! RDB Engine - the session and execution coordination core
//!
//! The engine tracks which client session is attached to which program,
//! enforces legal execution-state transitions, guards breakpoint mutation
//! against concurrent execution, and serializes access to per-program state
//! across simultaneously connected clients. The statement language itself is
//! an injected capability (see [`interp::Interpreter`]); the engine never
//! inspects statement contents beyond skipping blank and comment lines.

pub mod attachment;
pub use attachment::*;

pub mod breakpoints;
pub use breakpoints::*;

pub mod catalog;
pub use catalog::*;

pub mod dispatch;
pub use dispatch::*;

pub mod execution;
pub use execution::*;

pub mod interp;
pub use interp::*;

pub mod server;
pub use server::*;

pub mod state;
pub use state::*;
