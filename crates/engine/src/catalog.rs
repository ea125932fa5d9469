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

//! Program catalog: the immutable mapping from program name to its ordered
//! sequence of source lines.
//!
//! The catalog is loaded once at startup and read-only afterwards, so it
//! needs no synchronization beyond publication behind an `Arc`.

use std::{collections::HashMap, fs, path::Path};

use eyre::Result;
use tracing::{info, warn};

/// Immutable, name-keyed collection of debuggable programs.
///
/// Each program is stored as its *physical* source lines, blank and comment
/// lines included; the run loop skips those at execution time but they still
/// occupy line positions for breakpoint accounting.
#[derive(Debug, Clone, Default)]
pub struct ProgramCatalog {
    programs: HashMap<String, Vec<String>>,
}

impl ProgramCatalog {
    /// Create an empty catalog. Mostly useful in tests; production code
    /// loads from a directory via [`ProgramCatalog::load_dir`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a program from its full source text, split into physical lines.
    pub fn insert(&mut self, name: impl Into<String>, source: &str) {
        self.programs.insert(name.into(), source.lines().map(str::to_string).collect());
    }

    /// Load every `*.txt` file in `dir` as a program named after the file
    /// stem. A missing directory is a warning, not an error: the server can
    /// run with an empty catalog.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut catalog = Self::new();
        if !dir.is_dir() {
            warn!(dir = %dir.display(), "Programs directory not found");
            return Ok(catalog);
        }

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let source = fs::read_to_string(&path)?;
            catalog.insert(name, &source);
            info!(program = name, "Loaded program");
        }

        Ok(catalog)
    }

    /// Whether a program with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.programs.contains_key(name)
    }

    /// All program names, sorted for deterministic listings.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.programs.keys().cloned().collect();
        names.sort();
        names
    }

    /// The physical source lines of a program, in order.
    pub fn statements(&self, name: &str) -> Option<&[String]> {
        self.programs.get(name).map(|v| v.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_preserves_physical_lines() {
        let mut catalog = ProgramCatalog::new();
        catalog.insert("demo", "x = 1\n\n# comment\ny = 2");

        let lines = catalog.statements("demo").unwrap();
        assert_eq!(lines, &["x = 1", "", "# comment", "y = 2"]);
    }

    #[test]
    fn test_names_are_sorted() {
        let mut catalog = ProgramCatalog::new();
        catalog.insert("zeta", "x = 1");
        catalog.insert("alpha", "y = 2");
        assert_eq!(catalog.names(), vec!["alpha".to_string(), "zeta".to_string()]);
    }

    #[test]
    fn test_load_dir_reads_txt_files_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("demo.txt"), "x = 1\ny = 2\n").unwrap();
        fs::write(dir.path().join("notes.md"), "ignored").unwrap();

        let catalog = ProgramCatalog::load_dir(dir.path()).unwrap();
        assert!(catalog.contains("demo"));
        assert!(!catalog.contains("notes"));
        assert_eq!(catalog.statements("demo").unwrap().len(), 2);
    }

    #[test]
    fn test_load_dir_missing_is_empty_not_error() {
        let catalog = ProgramCatalog::load_dir(Path::new("/nonexistent/rdb-programs")).unwrap();
        assert!(catalog.names().is_empty());
    }
}
