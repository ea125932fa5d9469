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

//! Breakpoint store: per-program sets of line numbers where execution must
//! pause.
//!
//! Mutation is rejected while the target program is running or paused. The
//! Busy check and the mutation happen under the same control lock as the
//! status transition in `start`, so they cannot interleave with a
//! concurrent run starting on the same program.

use std::sync::Arc;

use rdb_common::DebugError;
use tracing::debug;

use crate::{ProgramCatalog, ProgramStates};

/// Guarded access to each program's breakpoint set.
#[derive(Debug)]
pub struct BreakpointStore {
    catalog: Arc<ProgramCatalog>,
    states: Arc<ProgramStates>,
}

impl BreakpointStore {
    /// Create a store over the given catalog and program-state partition.
    pub fn new(catalog: Arc<ProgramCatalog>, states: Arc<ProgramStates>) -> Self {
        Self { catalog, states }
    }

    /// Sorted breakpoint lines for `program`.
    pub fn list(&self, program: &str) -> Result<Vec<usize>, DebugError> {
        if !self.catalog.contains(program) {
            return Err(DebugError::UnknownProgram(program.to_string()));
        }
        let Some(state) = self.states.get(program) else {
            return Ok(Vec::new());
        };
        let lines = state.control.lock().breakpoints.iter().copied().collect();
        Ok(lines)
    }

    /// Register a breakpoint at `line` (a 1-based line number token).
    /// Idempotent: re-adding a present line succeeds.
    pub fn add(&self, program: &str, line: &str) -> Result<usize, DebugError> {
        self.mutate(program, line, |set, n| {
            set.insert(n);
        })
    }

    /// Remove the breakpoint at `line`. Removing an absent line is a no-op
    /// success.
    pub fn remove(&self, program: &str, line: &str) -> Result<usize, DebugError> {
        self.mutate(program, line, |set, n| {
            set.remove(&n);
        })
    }

    fn mutate(
        &self,
        program: &str,
        line: &str,
        apply: impl FnOnce(&mut std::collections::BTreeSet<usize>, usize),
    ) -> Result<usize, DebugError> {
        if !self.catalog.contains(program) {
            return Err(DebugError::UnknownProgram(program.to_string()));
        }

        let state = self.states.ensure(program);
        let mut control = state.control.lock();
        if control.status.is_busy() {
            return Err(DebugError::State(format!("'{program}' is currently executing.")));
        }

        // A breakpoint beyond the end of the program parses fine; it is
        // simply never reached.
        let number: usize =
            line.parse().map_err(|_| DebugError::Protocol("Line must be integer.".to_string()))?;

        apply(&mut control.breakpoints, number);
        debug!(program, line = number, "Breakpoint set updated");
        Ok(number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdb_common::ExecStatus;

    fn store() -> (BreakpointStore, Arc<ProgramStates>) {
        let mut catalog = ProgramCatalog::new();
        catalog.insert("demo", "x = 1\ny = 2\nx = x + y");
        let states = Arc::new(ProgramStates::new());
        (BreakpointStore::new(Arc::new(catalog), states.clone()), states)
    }

    #[test]
    fn test_add_and_list_sorted() {
        let (store, _) = store();
        store.add("demo", "3").unwrap();
        store.add("demo", "2").unwrap();
        assert_eq!(store.list("demo").unwrap(), vec![2, 3]);
    }

    #[test]
    fn test_add_is_idempotent() {
        let (store, _) = store();
        store.add("demo", "2").unwrap();
        store.add("demo", "2").unwrap();
        assert_eq!(store.list("demo").unwrap(), vec![2]);
    }

    #[test]
    fn test_remove_absent_line_is_noop_success() {
        let (store, _) = store();
        store.remove("demo", "5").unwrap();
        assert_eq!(store.list("demo").unwrap(), Vec::<usize>::new());
    }

    #[test]
    fn test_unknown_program() {
        let (store, _) = store();
        assert!(matches!(store.add("ghost", "1"), Err(DebugError::UnknownProgram(_))));
        assert!(matches!(store.list("ghost"), Err(DebugError::UnknownProgram(_))));
    }

    #[test]
    fn test_invalid_line_token() {
        let (store, _) = store();
        let err = store.add("demo", "two").unwrap_err();
        assert_eq!(err, DebugError::Protocol("Line must be integer.".to_string()));
    }

    #[test]
    fn test_mutation_rejected_while_busy() {
        let (store, states) = store();
        for status in [ExecStatus::Running, ExecStatus::Paused] {
            states.ensure("demo").control.lock().status = status;
            let err = store.add("demo", "2").unwrap_err();
            assert_eq!(err, DebugError::State("'demo' is currently executing.".to_string()));
            let err = store.remove("demo", "2").unwrap_err();
            assert_eq!(err, DebugError::State("'demo' is currently executing.".to_string()));
        }

        states.ensure("demo").control.lock().status = ExecStatus::Finished;
        assert!(store.add("demo", "2").is_ok());
    }

    #[test]
    fn test_list_on_program_without_breakpoints() {
        let (store, _) = store();
        assert_eq!(store.list("demo").unwrap(), Vec::<usize>::new());
    }
}
