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

//! Command dispatcher: parses one request line into an operation, routes it
//! to the coordinator components, and renders exactly one text response.
//!
//! Every recoverable error (protocol, not-found, state, execution) is
//! converted to a response line here; nothing below this boundary reaches
//! the connection loop as an `Err`.

use std::sync::Arc;

use itertools::Itertools;
use rdb_common::{DebugError, SessionId};
use tracing::debug;

use crate::{
    AttachmentRegistry, BreakpointStore, ExecutionController, Interpreter, ProgramCatalog,
    ProgramStates,
};

const HELP_TEXT: &str = "\
Available Commands:
  help                               - Shows this help message.
  list_programs                      - Lists all loaded program names.
  list_breakpoints <program>         - Lists breakpoints for a program.
  add_breakpoint <program> <line>    - Sets a breakpoint (not available during execution).
  rmv_breakpoint <program> <line>    - Removes a breakpoint (not available during execution).
  attach <program>                   - Attaches the debugger to a program.
  detach                             - Detaches the debugger from the current program.
  start                              - Starts or restarts execution from the beginning (requires attachment).
  continue                           - Continues execution from a breakpoint (requires program to be paused).
  get_var <var_name>                 - Gets the value of a variable in the current context (requires attachment).
  set_var <var_name> <value>         - Sets the value of a variable in the current context (requires attachment).";

/// Routes parsed commands to the attachment registry, breakpoint store,
/// and execution controller.
#[derive(Debug)]
pub struct CommandDispatcher {
    catalog: Arc<ProgramCatalog>,
    attachments: AttachmentRegistry,
    breakpoints: BreakpointStore,
    execution: ExecutionController,
}

impl CommandDispatcher {
    /// Wire up a dispatcher over a catalog and an interpreter capability.
    pub fn new(catalog: ProgramCatalog, interp: Arc<dyn Interpreter>) -> Self {
        let catalog = Arc::new(catalog);
        let states = Arc::new(ProgramStates::new());
        Self {
            attachments: AttachmentRegistry::new(catalog.clone(), states.clone()),
            breakpoints: BreakpointStore::new(catalog.clone(), states.clone()),
            execution: ExecutionController::new(catalog.clone(), states, interp),
            catalog,
        }
    }

    /// Handle one request line for `session`, producing the response line.
    pub async fn dispatch(&self, session: SessionId, line: &str) -> String {
        match self.try_dispatch(session, line.trim()).await {
            Ok(response) => response,
            Err(err) => err.to_response(),
        }
    }

    async fn try_dispatch(&self, session: SessionId, line: &str) -> Result<String, DebugError> {
        let (name, args) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name.to_lowercase(), rest.trim()),
            None if !line.is_empty() => (line.to_lowercase(), ""),
            None => return Err(DebugError::Protocol("Invalid command.".to_string())),
        };
        debug!(%session, command = %name, "Dispatching");

        match name.as_str() {
            "help" => Ok(HELP_TEXT.to_string()),

            "list_programs" => {
                let names = self
                    .catalog
                    .names()
                    .iter()
                    .map(|name| serde_json::to_string(name).unwrap_or_else(|_| "\"\"".to_string()))
                    .join(", ");
                Ok(format!("Programs: [{names}]"))
            }

            "list_breakpoints" => {
                let lines = self.breakpoints.list(args)?;
                let rendered = lines.iter().join(", ");
                Ok(format!("Breakpoints in '{args}': [{rendered}]"))
            }

            "add_breakpoint" => {
                let (program, line) = two_args(args, "Format add_breakpoint <program> <line>")?;
                let number = self.breakpoints.add(program, line)?;
                Ok(format!("Breakpoint set at line {number} in '{program}'."))
            }

            "rmv_breakpoint" => {
                let (program, line) = two_args(args, "Format rmv_breakpoint <program> <line>")?;
                let number = self.breakpoints.remove(program, line)?;
                Ok(format!("Breakpoint removed from line {number} in '{program}'."))
            }

            "attach" => {
                self.attachments.attach(session, args)?;
                Ok(format!("Attached to '{args}'"))
            }

            "detach" => match self.attachments.detach(session) {
                Some(program) => Ok(format!("Detached from '{program}'")),
                None => Ok("Not attached.".to_string()),
            },

            "start" | "continue" | "get_var" | "set_var" => {
                let Some(program) = self.attachments.lookup(session) else {
                    return Err(DebugError::State(format!("'{name}' needs attachment.")));
                };
                self.attached_command(&name, args, &program).await
            }

            _ => Err(DebugError::Protocol(format!("Unknown command '{name}'"))),
        }
    }

    /// Commands whose implicit target is the session's attached program.
    async fn attached_command(
        &self,
        name: &str,
        args: &str,
        program: &str,
    ) -> Result<String, DebugError> {
        match name {
            "start" => self.execution.start(program).await,
            "continue" => self.execution.resume(program).await,
            "get_var" => Ok(self.execution.get_var(program, args).await),
            "set_var" => {
                let (var, expr) = two_args_loose(args, "Format set_var <name> <value>")?;
                self.execution.set_var(program, var, expr).await
            }
            _ => unreachable!("attached_command called with '{name}'"),
        }
    }

    /// Access to the attachment registry, for the connection coordinator's
    /// disconnect cleanup.
    pub fn attachments(&self) -> &AttachmentRegistry {
        &self.attachments
    }
}

/// Split into exactly two whitespace-separated tokens.
fn two_args<'a>(args: &'a str, usage: &str) -> Result<(&'a str, &'a str), DebugError> {
    let mut parts = args.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), None) => Ok((a, b)),
        _ => Err(DebugError::Protocol(usage.to_string())),
    }
}

/// Split into a first token and the remaining text (which may itself
/// contain whitespace, e.g. a `set_var` expression).
fn two_args_loose<'a>(args: &'a str, usage: &str) -> Result<(&'a str, &'a str), DebugError> {
    match args.split_once(char::is_whitespace) {
        Some((a, b)) if !b.trim().is_empty() => Ok((a, b.trim())),
        _ => Err(DebugError::Protocol(usage.to_string())),
    }
}
