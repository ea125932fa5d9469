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

//! Attachment registry: the exclusive 1:1 relation between connected
//! sessions and the programs they debug.
//!
//! Both directions of the relation live under one short-held mutex, so a
//! concurrent double-attach race resolves to exactly one winner.

use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use rdb_common::{DebugError, SessionId};
use tracing::{debug, info};

use crate::{ProgramCatalog, ProgramStates};

#[derive(Debug, Default)]
struct Relations {
    by_session: HashMap<SessionId, String>,
    by_program: HashMap<String, SessionId>,
}

/// Tracks which session is attached to which program.
#[derive(Debug)]
pub struct AttachmentRegistry {
    catalog: Arc<ProgramCatalog>,
    states: Arc<ProgramStates>,
    relations: Mutex<Relations>,
}

impl AttachmentRegistry {
    /// Create a registry over the given catalog and program-state partition.
    pub fn new(catalog: Arc<ProgramCatalog>, states: Arc<ProgramStates>) -> Self {
        Self { catalog, states, relations: Mutex::new(Relations::default()) }
    }

    /// Attach `session` to `program`.
    ///
    /// Fails when the program is unknown, when the program already has an
    /// attached session, or when the session already holds a different
    /// attachment. On first attach the program's execution state is lazily
    /// initialized (idle, cursor 0, empty context).
    pub fn attach(&self, session: SessionId, program: &str) -> Result<(), DebugError> {
        if program.is_empty() || !self.catalog.contains(program) {
            return Err(DebugError::UnknownProgram(program.to_string()));
        }

        let mut relations = self.relations.lock();
        if relations.by_program.contains_key(program) {
            return Err(DebugError::State(format!("'{program}' is already debugged.")));
        }
        if let Some(current) = relations.by_session.get(&session) {
            return Err(DebugError::State(format!("You are already debugging '{current}'.")));
        }

        relations.by_session.insert(session, program.to_string());
        relations.by_program.insert(program.to_string(), session);
        drop(relations);

        self.states.ensure(program);
        info!(%session, program, "Attached");
        Ok(())
    }

    /// Detach `session` from its program, if any.
    ///
    /// Clears any running/paused marker for that program so it becomes
    /// attachable (and its breakpoints editable) again. The stored
    /// cursor/context survive; only a fresh `start` can reach them.
    pub fn detach(&self, session: SessionId) -> Option<String> {
        let mut relations = self.relations.lock();
        let program = relations.by_session.remove(&session)?;
        relations.by_program.remove(&program);
        drop(relations);

        self.states.clear_busy(&program);
        info!(%session, program, "Detached");
        Some(program)
    }

    /// The program `session` is attached to, if any. Used by the dispatcher
    /// to resolve the implicit target of attachment-scoped commands.
    pub fn lookup(&self, session: SessionId) -> Option<String> {
        self.relations.lock().by_session.get(&session).cloned()
    }

    /// Disconnect handling: same as [`AttachmentRegistry::detach`], invoked
    /// by the connection coordinator when a session's handling loop exits.
    pub fn release(&self, session: SessionId) {
        if let Some(program) = self.detach(session) {
            debug!(%session, program, "Released stale attachment on disconnect");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(programs: &[&str]) -> AttachmentRegistry {
        let mut catalog = ProgramCatalog::new();
        for name in programs {
            catalog.insert(*name, "x = 1");
        }
        AttachmentRegistry::new(Arc::new(catalog), Arc::new(ProgramStates::new()))
    }

    #[test]
    fn test_attach_unknown_program() {
        let registry = registry_with(&["demo"]);
        let session = SessionId::next();
        let err = registry.attach(session, "ghost").unwrap_err();
        assert_eq!(err, DebugError::UnknownProgram("ghost".to_string()));
        assert_eq!(registry.lookup(session), None);
    }

    #[test]
    fn test_program_is_exclusive() {
        let registry = registry_with(&["demo"]);
        let first = SessionId::next();
        let second = SessionId::next();

        registry.attach(first, "demo").unwrap();
        let err = registry.attach(second, "demo").unwrap_err();
        assert_eq!(err, DebugError::State("'demo' is already debugged.".to_string()));
    }

    #[test]
    fn test_session_holds_at_most_one_attachment() {
        let registry = registry_with(&["demo", "other"]);
        let session = SessionId::next();

        registry.attach(session, "demo").unwrap();
        let err = registry.attach(session, "other").unwrap_err();
        assert_eq!(err, DebugError::State("You are already debugging 'demo'.".to_string()));
    }

    #[test]
    fn test_detach_frees_the_program() {
        let registry = registry_with(&["demo"]);
        let first = SessionId::next();
        let second = SessionId::next();

        registry.attach(first, "demo").unwrap();
        assert_eq!(registry.detach(first), Some("demo".to_string()));
        assert_eq!(registry.detach(first), None);

        registry.attach(second, "demo").unwrap();
        assert_eq!(registry.lookup(second), Some("demo".to_string()));
    }

    #[test]
    fn test_concurrent_attach_has_one_winner() {
        let registry = Arc::new(registry_with(&["demo"]));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.attach(SessionId::next(), "demo").is_ok())
            })
            .collect();

        let wins = handles.into_iter().map(|h| h.join().unwrap()).filter(|&won| won).count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn test_release_clears_paused_marker() {
        let mut catalog = ProgramCatalog::new();
        catalog.insert("demo", "x = 1");
        let states = Arc::new(ProgramStates::new());
        let registry = AttachmentRegistry::new(Arc::new(catalog), states.clone());

        let session = SessionId::next();
        registry.attach(session, "demo").unwrap();
        states.ensure("demo").control.lock().status = rdb_common::ExecStatus::Paused;

        registry.release(session);
        assert_eq!(states.ensure("demo").status(), rdb_common::ExecStatus::Idle);
        assert!(registry.attach(SessionId::next(), "demo").is_ok());
    }
}
