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

//! Active statement tracking.
//!
//! When the debuggee breaks, every managed frame of every stopped thread is
//! collected and grouped by instruction. Each distinct instruction is then
//! resolved to a source span exactly once; the resolutions run concurrently
//! and the whole batch can be cancelled.

use std::{collections::BTreeSet, sync::Arc};

use enc_common::{enc_assert, ActiveStatement, ActiveStatementFlags, InstructionId, ThreadId};
use futures::future::join_all;
use itertools::Itertools;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::provider::{Debuggee, DebuggeeProcess};

/// Errors produced while tracking active statements.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    /// Tracking was cancelled before every instruction resolved.
    #[error("active statement tracking was cancelled")]
    Cancelled,

    /// Two frames at the same instruction disagree on instruction-level flags.
    #[error("frames at {instruction} disagree on flags: {first:?} vs {second:?}")]
    InconsistentFrameFlags {
        /// Shared instruction.
        instruction: InstructionId,
        /// Flags of the first frame seen.
        first: ActiveStatementFlags,
        /// Flags of the conflicting frame.
        second: ActiveStatementFlags,
    },
}

/// All frames stopped at one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionGroup {
    /// Shared instruction.
    pub instruction: InstructionId,
    /// Union of the frames' flags.
    pub flags: ActiveStatementFlags,
    /// Threads with a frame at the instruction.
    pub threads: BTreeSet<ThreadId>,
}

/// Group the frames of every stopped thread by instruction.
///
/// Frames sharing an instruction must agree on every flag except the
/// per-thread ones; those are unioned.
pub fn group_frames(
    processes: &[DebuggeeProcess],
) -> Result<Vec<InstructionGroup>, TrackerError> {
    let frames = processes
        .iter()
        .flat_map(|process| &process.runtimes)
        .flat_map(|runtime| &runtime.threads)
        .flat_map(|thread| thread.frames.iter().map(move |frame| (thread.thread, *frame)))
        .sorted_by_key(|(_, frame)| frame.instruction);

    let mut groups = Vec::new();
    for (instruction, mut frames) in &frames.chunk_by(|(_, frame)| frame.instruction) {
        let Some((thread, frame)) = frames.next() else { continue };
        let mut group =
            InstructionGroup { instruction, flags: frame.flags, threads: BTreeSet::from([thread]) };

        for (thread, frame) in frames {
            let consistent =
                group.flags.instruction_invariant() == frame.flags.instruction_invariant();
            enc_assert!(consistent, "inconsistent frame flags at {instruction}");
            if !consistent {
                return Err(TrackerError::InconsistentFrameFlags {
                    instruction,
                    first: group.flags,
                    second: frame.flags,
                });
            }

            group.flags |= frame.flags;
            group.threads.insert(thread);
        }
        groups.push(group);
    }

    Ok(groups)
}

/// Collects and resolves the active statements of a stopped debuggee.
#[derive(Clone)]
pub struct ActiveStatementTracker {
    debuggee: Arc<dyn Debuggee>,
}

impl std::fmt::Debug for ActiveStatementTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveStatementTracker").finish_non_exhaustive()
    }
}

impl ActiveStatementTracker {
    /// Tracker over `debuggee`.
    pub fn new(debuggee: Arc<dyn Debuggee>) -> Self {
        Self { debuggee }
    }

    /// Collect the active statements of every stopped thread.
    ///
    /// Instructions that fail to resolve, or have no source mapping, are
    /// left out. Fails with [`TrackerError::Cancelled`] once `cancel` fires,
    /// abandoning the outstanding resolutions.
    pub async fn collect(
        &self,
        cancel: CancellationToken,
    ) -> Result<Vec<ActiveStatement>, TrackerError> {
        let groups = group_frames(&self.debuggee.processes())?;
        debug!(instructions = groups.len(), "Resolving active statements");

        let resolutions = join_all(groups.iter().map(|group| {
            self.debuggee.resolve_source_position(group.instruction, cancel.child_token())
        }));

        let resolved = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TrackerError::Cancelled),
            resolved = resolutions => resolved,
        };

        let statements = groups
            .into_iter()
            .zip(resolved)
            .filter_map(|(group, resolution)| match resolution {
                Ok(Some(position)) => Some(ActiveStatement {
                    instruction: group.instruction,
                    document: position.document,
                    span: position.span,
                    flags: group.flags,
                    threads: group.threads,
                }),
                Ok(None) => None,
                Err(err) => {
                    warn!(instruction = %group.instruction, "Failed to resolve active statement: {err}");
                    None
                }
            })
            .collect();

        Ok(statements)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        path::PathBuf,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use enc_common::{LinePositionSpan, MethodId, ModuleId, ProcessId, SourcePosition};
    use futures::{future::BoxFuture, FutureExt};

    use super::*;
    use crate::provider::{RuntimeInstance, StoppedFrame, StoppedThread};

    fn instruction(offset: u32) -> InstructionId {
        InstructionId::new(MethodId::new(ModuleId::from_bytes([9; 16]), 0x0600_0001, 1), offset)
    }

    fn thread(id: u64, frames: Vec<StoppedFrame>) -> StoppedThread {
        StoppedThread { thread: ThreadId(id), frames }
    }

    fn frame(offset: u32, flags: ActiveStatementFlags) -> StoppedFrame {
        StoppedFrame { instruction: instruction(offset), flags }
    }

    fn process(threads: Vec<StoppedThread>) -> DebuggeeProcess {
        DebuggeeProcess { id: ProcessId(1), runtimes: vec![RuntimeInstance { threads }] }
    }

    struct FakeDebuggee {
        processes: Vec<DebuggeeProcess>,
        resolutions: AtomicUsize,
        hang: bool,
    }

    impl Debuggee for FakeDebuggee {
        fn processes(&self) -> Vec<DebuggeeProcess> {
            self.processes.clone()
        }

        fn resolve_source_position(
            &self,
            instruction: InstructionId,
            cancel: CancellationToken,
        ) -> BoxFuture<'static, eyre::Result<Option<SourcePosition>>> {
            self.resolutions.fetch_add(1, Ordering::SeqCst);
            let hang = self.hang;
            async move {
                if hang {
                    cancel.cancelled().await;
                    eyre::bail!("cancelled");
                }
                match instruction.il_offset {
                    0xBAD => eyre::bail!("no symbols"),
                    0x404 => Ok(None),
                    offset => Ok(Some(SourcePosition {
                        document: PathBuf::from("a.cs"),
                        span: LinePositionSpan::new(offset as i32, 0, offset as i32, 4),
                    })),
                }
            }
            .boxed()
        }
    }

    fn tracker(processes: Vec<DebuggeeProcess>, hang: bool) -> (Arc<FakeDebuggee>, ActiveStatementTracker) {
        enc_common::logging::ensure_test_logging(None);
        let debuggee =
            Arc::new(FakeDebuggee { processes, resolutions: AtomicUsize::new(0), hang });
        (debuggee.clone(), ActiveStatementTracker::new(debuggee))
    }

    #[tokio::test]
    async fn test_shared_instruction_resolves_once() {
        let leaf = ActiveStatementFlags::IS_LEAF_FRAME;
        let non_leaf = ActiveStatementFlags::IS_NON_LEAF_FRAME;
        let (debuggee, tracker) = tracker(
            vec![process(vec![
                thread(1, vec![frame(10, leaf), frame(20, non_leaf)]),
                thread(2, vec![frame(10, leaf)]),
            ])],
            false,
        );

        let statements = tracker.collect(CancellationToken::new()).await.unwrap();
        assert_eq!(debuggee.resolutions.load(Ordering::SeqCst), 2);
        assert_eq!(statements.len(), 2);

        let shared = statements.iter().find(|s| s.instruction == instruction(10)).unwrap();
        assert_eq!(shared.threads, BTreeSet::from([ThreadId(1), ThreadId(2)]));
        assert_eq!(shared.span.start.line, 10);
    }

    #[tokio::test]
    async fn test_failed_resolutions_are_omitted() {
        let flags = ActiveStatementFlags::IS_NON_LEAF_FRAME;
        let (_, tracker) = tracker(
            vec![process(vec![thread(1, vec![frame(0xBAD, flags), frame(0x404, flags), frame(3, flags)])])],
            false,
        );

        let statements = tracker.collect(CancellationToken::new()).await.unwrap();
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].instruction, instruction(3));
    }

    #[tokio::test]
    async fn test_cancellation_abandons_resolution() {
        let flags = ActiveStatementFlags::IS_LEAF_FRAME;
        let (_, tracker) = tracker(vec![process(vec![thread(1, vec![frame(1, flags)])])], true);

        let cancel = CancellationToken::new();
        let pending = tokio::spawn({
            let cancel = cancel.clone();
            async move { tracker.collect(cancel).await }
        });
        cancel.cancel();

        assert_eq!(pending.await.unwrap(), Err(TrackerError::Cancelled));
    }

    #[test]
    fn test_per_thread_flags_union() {
        let processes = vec![process(vec![
            thread(1, vec![frame(1, ActiveStatementFlags::IS_LEAF_FRAME | ActiveStatementFlags::PARTIALLY_EXECUTED)]),
            thread(2, vec![frame(1, ActiveStatementFlags::PARTIALLY_EXECUTED)]),
        ])];

        let groups = group_frames(&processes).unwrap();
        assert_eq!(groups.len(), 1);
        assert!(groups[0].flags.contains(ActiveStatementFlags::IS_LEAF_FRAME));
        assert_eq!(groups[0].threads.len(), 2);
    }

    #[test]
    fn test_inconsistent_flags_are_rejected() {
        let processes = vec![process(vec![
            thread(1, vec![frame(1, ActiveStatementFlags::METHOD_UP_TO_DATE)]),
            thread(2, vec![frame(1, ActiveStatementFlags::empty())]),
        ])];

        assert!(matches!(
            group_frames(&processes),
            Err(TrackerError::InconsistentFrameFlags { .. })
        ));
    }
}
