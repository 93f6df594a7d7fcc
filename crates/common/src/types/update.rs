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

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{ExceptionRegionUpdate, InstructionId, LinePositionSpan, ModuleId, ThreadId};

/// A single sequence point line move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineChange {
    /// Line in the previous generation.
    pub old_line: i32,
    /// Line in the new generation.
    pub new_line: i32,
}

/// All sequence point line moves of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencePointUpdates {
    /// Document whose sequence points moved.
    pub document: PathBuf,
    /// Line moves, in document order.
    pub line_updates: Vec<LineChange>,
}

/// Moves an active statement to its new location after an edit.
///
/// The owning thread is informational; the debuggee remaps by instruction id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActiveStatementRemap {
    /// Instruction in the previous generation.
    pub old_instruction: InstructionId,
    /// Span of the statement in the new generation.
    pub new_span: LinePositionSpan,
    /// Thread that was stopped at the statement.
    pub thread: ThreadId,
}

/// Everything pushed into the debuggee for one module and one generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleUpdate {
    /// Patched module.
    pub module: ModuleId,
    /// IL delta bytes.
    pub il_delta: Vec<u8>,
    /// Metadata delta bytes.
    pub metadata_delta: Vec<u8>,
    /// Symbol (PDB) delta bytes.
    pub pdb_delta: Vec<u8>,
    /// Method definition tokens whose bodies changed.
    pub updated_methods: Vec<u32>,
    /// Line-number edits per document.
    pub sequence_points: Vec<SequencePointUpdates>,
    /// Remapped exception handler ranges.
    pub exception_regions: Vec<ExceptionRegionUpdate>,
    /// Remapped active statements.
    pub active_statements: Vec<ActiveStatementRemap>,
}
