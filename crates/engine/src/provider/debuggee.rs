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

use enc_common::{ActiveStatementFlags, InstructionId, ProcessId, SourcePosition, ThreadId};
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

/// One frame of a suspended thread that maps to managed code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoppedFrame {
    /// Instruction the frame is suspended at.
    pub instruction: InstructionId,
    /// Frame flags.
    pub flags: ActiveStatementFlags,
}

/// A suspended thread and its managed frames, leaf first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoppedThread {
    /// Thread identity.
    pub thread: ThreadId,
    /// Managed frames.
    pub frames: Vec<StoppedFrame>,
}

/// A managed runtime hosted by a debuggee process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeInstance {
    /// Threads stopped in this runtime.
    pub threads: Vec<StoppedThread>,
}

/// A live debuggee process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebuggeeProcess {
    /// Process identity.
    pub id: ProcessId,
    /// Runtimes loaded into the process.
    pub runtimes: Vec<RuntimeInstance>,
}

/// The program under the debugger.
pub trait Debuggee: Send + Sync {
    /// Every live process with its runtimes and stopped threads.
    fn processes(&self) -> Vec<DebuggeeProcess>;

    /// Resolve an instruction to its source statement.
    ///
    /// `Ok(None)` means the instruction has no source mapping. The request
    /// should stop early once `cancel` fires.
    fn resolve_source_position(
        &self,
        instruction: InstructionId,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, eyre::Result<Option<SourcePosition>>>;
}
