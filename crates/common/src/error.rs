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

//! Error taxonomy for the debugger core.
//!
//! Everything here is *recoverable*: each variant is rendered as a one-line
//! text response at the command-dispatch boundary and the connection stays
//! open. Transport failures are not modeled here; the connection coordinator
//! treats those as fatal for the affected connection only.

use thiserror::Error;

/// A recoverable failure of one debugger command.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DebugError {
    /// Malformed command line, wrong argument count, or unknown command name.
    #[error("{0}")]
    Protocol(String),

    /// The named program does not exist in the catalog.
    #[error("Program '{0}' not found.")]
    UnknownProgram(String),

    /// Illegal state transition: breakpoint edit while busy, `continue`
    /// without a pause, double attachment, or a command that needs an
    /// attachment issued without one.
    #[error("{0}")]
    State(String),

    /// The statement interpreter failed on a statement or expression.
    /// `line` is the 1-based line number when the failure happened inside
    /// a run loop.
    #[error("{message}")]
    Execution {
        /// 1-based source line of the failing statement, if known
        line: Option<usize>,
        /// Interpreter failure message, surfaced verbatim
        message: String,
    },
}

impl DebugError {
    /// Convenience constructor for interpreter failures outside a run loop.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution { line: None, message: message.into() }
    }

    /// Render the error as the single-line wire response.
    pub fn to_response(&self) -> String {
        match self {
            Self::Execution { line: Some(n), message } => format!("Error on line {n}: {message}"),
            other => format!("Error: {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_program_response() {
        let err = DebugError::UnknownProgram("demo".to_string());
        assert_eq!(err.to_response(), "Error: Program 'demo' not found.");
    }

    #[test]
    fn test_run_loop_error_names_the_line() {
        let err = DebugError::Execution { line: Some(2), message: "division by zero".to_string() };
        assert_eq!(err.to_response(), "Error on line 2: division by zero");
    }

    #[test]
    fn test_expression_error_without_line() {
        let err = DebugError::execution("name 'q' is not defined");
        assert_eq!(err.to_response(), "Error: name 'q' is not defined");
    }
}
