// ENC - Edit-and-Continue Engine
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

use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use enc_common::{ModuleId, ProjectId};
use thiserror::Error;

/// Immutable view of one project at some point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSnapshot {
    /// Project identity.
    pub id: ProjectId,
    /// Display name.
    pub name: String,
    /// Monotonic content version; bumps on every source change.
    pub version: u64,
    /// Path of the compiled module the project produces.
    pub output_path: PathBuf,
}

/// Immutable view of the whole solution at some point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolutionSnapshot {
    /// Monotonic solution version.
    pub version: u64,
    /// Projects keyed by id.
    pub projects: BTreeMap<ProjectId, ProjectSnapshot>,
}

impl SolutionSnapshot {
    /// Look up a project.
    pub fn project(&self, id: ProjectId) -> Option<&ProjectSnapshot> {
        self.projects.get(&id)
    }
}

/// Source of solution snapshots.
pub trait Workspace: Send + Sync {
    /// The latest solution snapshot.
    fn current_solution(&self) -> Arc<SolutionSnapshot>;

    /// Whether project loading was deferred when the solution was opened.
    fn is_solution_load_deferred(&self) -> bool {
        false
    }
}

/// Errors reading the module identity from a compiled output.
#[derive(Debug, Error)]
pub enum IdentityReadError {
    /// The output could not be read (missing, locked, ...).
    #[error("failed to read module output: {0}")]
    Io(#[from] io::Error),

    /// The output exists but does not carry a readable module identity.
    #[error("malformed module output: {0}")]
    Malformed(String),
}

/// Reads the module version identifier out of a compiled binary.
pub trait ModuleIdentityReader: Send + Sync {
    /// Read the MVID stored in `output_path`.
    fn read_module_id(&self, output_path: &Path) -> Result<ModuleId, IdentityReadError>;
}
