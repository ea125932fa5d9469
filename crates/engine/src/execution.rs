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

//! Execution state machine: drives the run loop of one program from its
//! stored cursor to a breakpoint, completion, or error.
//!
//! Breakpoint accounting works on physical line numbers: the cursor
//! indexes *physical* lines (blank and comment lines advance it too), and
//! after each *executed* statement the 1-based physical line number of
//! the next line is checked against the breakpoint set. Two consequences
//! follow: a breakpoint on line 1 never hits, and a breakpoint
//! immediately preceded by a blank or comment line never hits.

use std::sync::Arc;

use itertools::Itertools;
use rdb_common::{DebugError, ExecStatus, Value};
use tracing::{debug, info};

use crate::{Interpreter, ProgramCatalog, ProgramState, ProgramStates, RunState};

/// Outcome of one run-loop invocation, already rendered for the wire.
type RunResult = Result<String, DebugError>;

/// Per-program run/pause/finish/error coordinator.
pub struct ExecutionController {
    catalog: Arc<ProgramCatalog>,
    states: Arc<ProgramStates>,
    interp: Arc<dyn Interpreter>,
    /// Optional bound on statements executed per run-loop invocation.
    /// `None` (the default) preserves the unbounded blocking semantics;
    /// nothing in the shipped binary sets it.
    budget: Option<usize>,
}

impl std::fmt::Debug for ExecutionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionController").field("budget", &self.budget).finish()
    }
}

impl ExecutionController {
    /// Create a controller over the shared catalog and state partition.
    pub fn new(
        catalog: Arc<ProgramCatalog>,
        states: Arc<ProgramStates>,
        interp: Arc<dyn Interpreter>,
    ) -> Self {
        Self { catalog, states, interp, budget: None }
    }

    /// Like [`ExecutionController::new`], with a cap on the number of
    /// statements one `start`/`continue` may execute before erroring out.
    pub fn new_with_budget(
        catalog: Arc<ProgramCatalog>,
        states: Arc<ProgramStates>,
        interp: Arc<dyn Interpreter>,
        budget: usize,
    ) -> Self {
        Self { catalog, states, interp, budget: Some(budget) }
    }

    /// Start (or restart) `program` from the beginning: fresh context,
    /// cursor 0, then run synchronously until breakpoint, completion, or
    /// error. Any prior state is discarded regardless of status.
    pub async fn start(&self, program: &str) -> RunResult {
        let state = self.states.ensure(program);
        state.control.lock().status = ExecStatus::Running;

        let mut run = state.run.lock().await;
        run.cursor = 0;
        run.context.clear();
        info!(program, "Starting run");
        self.run_loop(program, &state, &mut run)
    }

    /// Resume `program` from its stored cursor. Valid only when paused.
    pub async fn resume(&self, program: &str) -> RunResult {
        let state = self.states.ensure(program);
        {
            let mut control = state.control.lock();
            if control.status != ExecStatus::Paused {
                return Err(DebugError::State(format!(
                    "'{program}' is not paused at a breakpoint. Use 'start' first."
                )));
            }
            control.status = ExecStatus::Running;
        }

        let mut run = state.run.lock().await;
        info!(program, cursor = run.cursor, "Resuming run");
        self.run_loop(program, &state, &mut run)
    }

    /// Look up a variable in `program`'s current context.
    pub async fn get_var(&self, program: &str, name: &str) -> String {
        let state = self.states.ensure(program);
        let run = state.run.lock().await;
        match run.context.get(name) {
            Some(value) => format!("{name} = {value}"),
            None => format!("{name} not found."),
        }
    }

    /// Evaluate `expr` against `program`'s current context and bind the
    /// result to `name`.
    pub async fn set_var(&self, program: &str, name: &str, expr: &str) -> RunResult {
        let state = self.states.ensure(program);
        let mut run = state.run.lock().await;
        let value = self.interp.evaluate(expr, &mut run.context)?;
        run.context.insert(name.to_string(), value.clone());
        Ok(format!("{name} set to {value}"))
    }

    /// Execute statements from the stored cursor until a breakpoint,
    /// exhaustion, or an interpreter failure. The caller holds the run
    /// lock; the control lock is only taken in short bursts for status
    /// transitions and breakpoint lookups.
    fn run_loop(&self, program: &str, state: &ProgramState, run: &mut RunState) -> RunResult {
        let lines = self
            .catalog
            .statements(program)
            .ok_or_else(|| DebugError::UnknownProgram(program.to_string()))?;

        let mut executed = 0usize;
        while run.cursor < lines.len() {
            let statement = lines[run.cursor].trim();
            run.cursor += 1;

            if statement.is_empty() || statement.starts_with('#') {
                continue;
            }

            if let Some(budget) = self.budget {
                if executed >= budget {
                    state.control.lock().status = ExecStatus::Errored;
                    run.cursor -= 1;
                    return Err(DebugError::Execution {
                        line: Some(run.cursor + 1),
                        message: "statement budget exhausted".to_string(),
                    });
                }
            }

            if let Err(err) = self.interp.execute(statement, &mut run.context) {
                state.control.lock().status = ExecStatus::Errored;
                // Leave the cursor pointing at the failing statement
                run.cursor -= 1;
                let line = run.cursor + 1;
                let message = match err {
                    DebugError::Execution { message, .. } => message,
                    other => other.to_string(),
                };
                debug!(program, line, %message, "Statement failed");
                return Err(DebugError::Execution { line: Some(line), message });
            }
            executed += 1;

            let next_line = run.cursor + 1;
            let mut control = state.control.lock();
            if control.breakpoints.contains(&next_line) {
                control.status = ExecStatus::Paused;
                drop(control);
                let upcoming =
                    lines.get(run.cursor).map(|l| l.trim()).unwrap_or("end of program");
                info!(program, line = next_line, "Paused at breakpoint");
                return Ok(format!("Breakpoint at line {next_line}: {upcoming}"));
            }
        }

        state.control.lock().status = ExecStatus::Finished;
        let vars = run
            .context
            .iter()
            .filter(|(name, _)| !name.starts_with("__"))
            .map(|(name, value)| format!("{name} = {value}"))
            .join(", ");
        info!(program, "Run finished");
        Ok(format!("Finished '{program}'. Vars: {vars}"))
    }

    /// Current status of `program` (idle if it was never attached).
    pub fn status(&self, program: &str) -> ExecStatus {
        self.states.get(program).map(|s| s.status()).unwrap_or(ExecStatus::Idle)
    }

    /// Read a single variable without rendering, for tests and callers
    /// that need the typed value.
    pub async fn peek_var(&self, program: &str, name: &str) -> Option<Value> {
        let state = self.states.get(program)?;
        let run = state.run.lock().await;
        run.context.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MiniInterpreter;

    fn controller(source: &str) -> (ExecutionController, Arc<ProgramStates>) {
        let mut catalog = ProgramCatalog::new();
        catalog.insert("demo", source);
        let states = Arc::new(ProgramStates::new());
        let controller = ExecutionController::new(
            Arc::new(catalog),
            states.clone(),
            Arc::new(MiniInterpreter::new()),
        );
        (controller, states)
    }

    #[tokio::test]
    async fn test_start_runs_to_completion() {
        let (controller, _) = controller("x = 1\ny = 2\nx = x + y");
        let response = controller.start("demo").await.unwrap();
        assert_eq!(response, "Finished 'demo'. Vars: x = 3, y = 2");
        assert_eq!(controller.status("demo"), ExecStatus::Finished);
    }

    #[tokio::test]
    async fn test_breakpoint_pauses_before_next_statement() {
        let (controller, states) = controller("x = 1\ny = 2\nx = x + y");
        states.ensure("demo").control.lock().breakpoints.insert(2);

        let response = controller.start("demo").await.unwrap();
        assert_eq!(response, "Breakpoint at line 2: y = 2");
        assert_eq!(controller.status("demo"), ExecStatus::Paused);
        // Line 1 has run, line 2 has not
        assert_eq!(controller.peek_var("demo", "x").await, Some(Value::Int(1)));
        assert_eq!(controller.peek_var("demo", "y").await, None);

        let response = controller.resume("demo").await.unwrap();
        assert_eq!(response, "Finished 'demo'. Vars: x = 3, y = 2");
    }

    #[tokio::test]
    async fn test_continue_requires_pause() {
        let (controller, _) = controller("x = 1");
        let err = controller.resume("demo").await.unwrap_err();
        assert_eq!(
            err,
            DebugError::State(
                "'demo' is not paused at a breakpoint. Use 'start' first.".to_string()
            )
        );

        controller.start("demo").await.unwrap();
        assert!(controller.resume("demo").await.is_err());
    }

    #[tokio::test]
    async fn test_start_resets_context() {
        let (controller, _) = controller("x = 1\ny = 2");
        controller.start("demo").await.unwrap();
        controller.set_var("demo", "z", "99").await.unwrap();

        controller.start("demo").await.unwrap();
        assert_eq!(controller.peek_var("demo", "z").await, None);
    }

    #[tokio::test]
    async fn test_error_names_line_and_stops() {
        let (controller, _) = controller("x = 1\ny = q + 1\nz = 3");
        let err = controller.start("demo").await.unwrap_err();
        assert_eq!(
            err,
            DebugError::Execution {
                line: Some(2),
                message: "name 'q' is not defined".to_string()
            }
        );
        assert_eq!(controller.status("demo"), ExecStatus::Errored);
        // Did not advance past the failing statement
        assert_eq!(controller.peek_var("demo", "z").await, None);
    }

    #[tokio::test]
    async fn test_blank_and_comment_lines_are_skipped_but_counted() {
        let (controller, states) = controller("x = 1\n\n# setup done\ny = 2");
        // Line 4 is "y = 2"; its preceding physical line is a comment, so a
        // breakpoint there never hits.
        states.ensure("demo").control.lock().breakpoints.insert(4);
        let response = controller.start("demo").await.unwrap();
        assert!(response.starts_with("Finished 'demo'."));
    }

    #[tokio::test]
    async fn test_out_of_range_breakpoint_is_never_reached() {
        let (controller, states) = controller("x = 1\ny = 2");
        states.ensure("demo").control.lock().breakpoints.insert(99);
        let response = controller.start("demo").await.unwrap();
        assert!(response.starts_with("Finished 'demo'."));
    }

    #[tokio::test]
    async fn test_breakpoints_visited_in_ascending_order() {
        let (controller, states) = controller("a = 1\nb = 2\nc = 3\nd = 4");
        {
            let state = states.ensure("demo");
            let mut control = state.control.lock();
            control.breakpoints.extend([2, 4]);
        }

        let mut hits = Vec::new();
        let mut response = controller.start("demo").await.unwrap();
        while response.starts_with("Breakpoint at line ") {
            let line: usize = response
                .strip_prefix("Breakpoint at line ")
                .and_then(|rest| rest.split(':').next())
                .and_then(|n| n.parse().ok())
                .unwrap();
            hits.push(line);
            response = controller.resume("demo").await.unwrap();
        }

        assert_eq!(hits, vec![2, 4]);
        assert!(response.starts_with("Finished 'demo'."));
    }

    #[tokio::test]
    async fn test_get_var_on_never_run_program() {
        let (controller, _) = controller("x = 1");
        assert_eq!(controller.get_var("demo", "z").await, "z not found.");
    }

    #[tokio::test]
    async fn test_set_var_evaluates_against_context() {
        let (controller, _) = controller("x = 1\ny = 2");
        controller.start("demo").await.unwrap();
        let response = controller.set_var("demo", "z", "x + y").await.unwrap();
        assert_eq!(response, "z set to 3");
        assert_eq!(controller.get_var("demo", "z").await, "z = 3");
    }

    #[tokio::test]
    async fn test_set_var_surfaces_interpreter_error() {
        let (controller, _) = controller("x = 1");
        let err = controller.set_var("demo", "z", "q + 1").await.unwrap_err();
        assert_eq!(err.to_response(), "Error: name 'q' is not defined");
    }

    #[tokio::test]
    async fn test_budget_bounds_a_run() {
        let mut catalog = ProgramCatalog::new();
        catalog.insert("demo", "a = 1\nb = 2\nc = 3");
        let states = Arc::new(ProgramStates::new());
        let controller = ExecutionController::new_with_budget(
            Arc::new(catalog),
            states,
            Arc::new(MiniInterpreter::new()),
            2,
        );

        let err = controller.start("demo").await.unwrap_err();
        assert_eq!(
            err,
            DebugError::Execution {
                line: Some(3),
                message: "statement budget exhausted".to_string()
            }
        );
    }
}
