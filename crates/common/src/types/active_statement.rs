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

use std::{collections::BTreeSet, path::PathBuf};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{InstructionId, LinePositionSpan, ThreadId};

bitflags! {
    /// Properties of a suspended frame as reported by the debuggee.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ActiveStatementFlags: u8 {
        /// The frame is the top frame of its thread.
        const IS_LEAF_FRAME = 0b0000_0001;
        /// The frame is a caller frame of some thread.
        const IS_NON_LEAF_FRAME = 0b0000_0010;
        /// The instruction pointer is in the middle of a statement.
        const PARTIALLY_EXECUTED = 0b0000_0100;
        /// The frame executes the latest committed version of its method.
        const METHOD_UP_TO_DATE = 0b0000_1000;
        /// The frame belongs to code the user did not write.
        const NON_USER_CODE = 0b0001_0000;
    }
}

impl ActiveStatementFlags {
    /// Flags that may legitimately differ between threads stopped at the same instruction.
    pub const PER_THREAD: Self = Self::IS_LEAF_FRAME;

    /// The flags that must agree across every frame sharing an instruction id.
    pub fn instruction_invariant(self) -> Self {
        self.difference(Self::PER_THREAD)
    }
}

/// Source location an instruction resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourcePosition {
    /// Path of the source document.
    pub document: PathBuf,
    /// Span of the statement within the document.
    pub span: LinePositionSpan,
}

/// A statement some thread is currently suspended at.
///
/// Threads stopped at exactly the same instruction collapse into a single
/// entry whose [`threads`](Self::threads) lists all of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveStatement {
    /// Instruction the threads are stopped at.
    pub instruction: InstructionId,
    /// Document containing the statement.
    pub document: PathBuf,
    /// Statement span in the document.
    pub span: LinePositionSpan,
    /// Aggregated frame flags (OR over all threads).
    pub flags: ActiveStatementFlags,
    /// Threads stopped at this instruction.
    pub threads: BTreeSet<ThreadId>,
}

impl ActiveStatement {
    /// Whether any thread has this statement as its top frame.
    pub fn is_leaf(&self) -> bool {
        self.flags.contains(ActiveStatementFlags::IS_LEAF_FRAME)
    }

    /// Whether the statement is in a method body older than the committed one.
    pub fn is_stale(&self) -> bool {
        !self.flags.contains(ActiveStatementFlags::METHOD_UP_TO_DATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_invariant_ignores_leaf_flag() {
        let leaf = ActiveStatementFlags::IS_LEAF_FRAME | ActiveStatementFlags::METHOD_UP_TO_DATE;
        let caller = ActiveStatementFlags::METHOD_UP_TO_DATE;
        assert_eq!(leaf.instruction_invariant(), caller.instruction_invariant());

        let non_user = caller | ActiveStatementFlags::NON_USER_CODE;
        assert_ne!(non_user.instruction_invariant(), caller.instruction_invariant());
    }
}
