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

use std::{collections::HashMap, fmt, sync::Arc};

use enc_common::{
    ActiveStatement, BuildState, DebugSessionId, Diagnostic, DiagnosticKey, EditSessionId,
    MethodId, NonRemappableRegion, ProjectId, ReadOnlyReason,
};
use futures::{
    future::{BoxFuture, Shared},
    FutureExt,
};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    ledger::NonRemappableRegionLedger,
    provider::{RudeEditKind, SolutionSnapshot},
    session::EditSessionTelemetry,
    tracker::TrackerError,
};

/// Active statements of an edit session, computed at most once.
pub type SharedActiveStatements =
    Shared<BoxFuture<'static, Result<Arc<Vec<ActiveStatement>>, TrackerError>>>;

/// Regions committed by one generation.
pub type GenerationRegions = Vec<(MethodId, NonRemappableRegion)>;

/// One break-state period in which edits may be applied.
pub struct EditSession {
    id: EditSessionId,
    debug_session: DebugSessionId,
    base_solution: Arc<SolutionSnapshot>,
    read_only: HashMap<ProjectId, ReadOnlyReason>,
    stopped_at_exception: bool,
    prior_regions: NonRemappableRegionLedger,
    active_statements: SharedActiveStatements,
    tracking: CancellationToken,
    generations: Mutex<Vec<GenerationRegions>>,
    telemetry: Mutex<EditSessionTelemetry>,
}

impl fmt::Debug for EditSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditSession")
            .field("id", &self.id)
            .field("debug_session", &self.debug_session)
            .field("solution_version", &self.base_solution.version)
            .field("read_only", &self.read_only)
            .field("stopped_at_exception", &self.stopped_at_exception)
            .finish_non_exhaustive()
    }
}

impl EditSession {
    pub(crate) fn new(
        id: EditSessionId,
        debug_session: DebugSessionId,
        base_solution: Arc<SolutionSnapshot>,
        read_only: HashMap<ProjectId, ReadOnlyReason>,
        stopped_at_exception: bool,
        prior_regions: NonRemappableRegionLedger,
        active_statements: BoxFuture<'static, Result<Arc<Vec<ActiveStatement>>, TrackerError>>,
        tracking: CancellationToken,
    ) -> Self {
        Self {
            id,
            debug_session,
            base_solution,
            read_only,
            stopped_at_exception,
            prior_regions,
            active_statements: active_statements.shared(),
            tracking,
            generations: Mutex::new(Vec::new()),
            telemetry: Mutex::new(EditSessionTelemetry::new(id)),
        }
    }

    /// Edit session identity.
    pub fn id(&self) -> EditSessionId {
        self.id
    }

    /// Owning debug session.
    pub fn debug_session(&self) -> DebugSessionId {
        self.debug_session
    }

    /// Key under which this session's diagnostics are reported.
    pub fn diagnostic_key(&self) -> DiagnosticKey {
        DiagnosticKey { debug_session: self.debug_session, edit_session: self.id }
    }

    /// Solution snapshot taken when the first participant entered break state.
    pub fn base_solution(&self) -> &Arc<SolutionSnapshot> {
        &self.base_solution
    }

    /// Why edits to `project` are rejected in this session, if they are.
    pub fn read_only_reason(&self, project: ProjectId) -> ReadOnlyReason {
        self.read_only.get(&project).copied().unwrap_or_default()
    }

    /// Whether the debuggee stopped on an unhandled exception.
    pub fn stopped_at_exception(&self) -> bool {
        self.stopped_at_exception
    }

    /// The session's active statements.
    pub async fn active_statements(&self) -> Result<Arc<Vec<ActiveStatement>>, TrackerError> {
        self.active_statements.clone().await
    }

    /// Start resolving the active statements on the current runtime. Without
    /// a runtime the first caller of [`active_statements`](Self::active_statements)
    /// drives the resolution.
    pub(crate) fn start_tracking(&self) {
        let Ok(runtime) = Handle::try_current() else {
            debug!(edit_session = %self.id, "No runtime, active statements resolve on first use");
            return;
        };

        let statements = self.active_statements.clone();
        let id = self.id;
        runtime.spawn(async move {
            match statements.await {
                Ok(statements) => {
                    debug!(edit_session = %id, count = statements.len(), "Active statements ready")
                }
                Err(err) => debug!(edit_session = %id, "Active statement tracking stopped: {err}"),
            }
        });
    }

    /// Whether the session has ended.
    pub fn is_ended(&self) -> bool {
        self.tracking.is_cancelled()
    }

    /// Regions committed in earlier edit sessions, followed by those committed
    /// in this one so far.
    pub fn non_remappable_regions(&self) -> NonRemappableRegionLedger {
        let mut ledger = self.prior_regions.clone();
        for generation in self.generations.lock().iter() {
            ledger.merge(generation.iter().copied());
        }
        ledger
    }

    /// Number of generations committed so far.
    pub fn committed_generations(&self) -> usize {
        self.generations.lock().len()
    }

    /// Snapshot of the session's counters.
    pub fn telemetry(&self) -> EditSessionTelemetry {
        self.telemetry.lock().clone()
    }

    pub(crate) fn push_generation(&self, regions: GenerationRegions) {
        self.generations.lock().push(regions);
        self.telemetry.lock().record_applied();
    }

    pub(crate) fn record_analysis(&self, state: BuildState, rude_edits: &[RudeEditKind]) {
        self.telemetry.lock().record_analysis(state, rude_edits);
    }

    pub(crate) fn record_emit_errors(&self, diagnostics: &[Diagnostic]) {
        self.telemetry.lock().record_emit_errors(diagnostics);
    }

    /// Stop tracking and hand back the committed regions, oldest generation
    /// first, with the final counters.
    pub(crate) fn end(&self) -> (GenerationRegions, EditSessionTelemetry) {
        self.tracking.cancel();
        let regions = std::mem::take(&mut *self.generations.lock()).into_iter().flatten().collect();
        (regions, self.telemetry())
    }
}
