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

//! Delta application.
//!
//! Per module the coordinator answers three questions of the host:
//!
//! 1. What changed? ([`build_state`](DeltaApplicationCoordinator::build_state))
//! 2. Push the changes into the debuggee. ([`apply`](DeltaApplicationCoordinator::apply))
//! 3. The debuggee accepted them. ([`commit`](DeltaApplicationCoordinator::commit))
//!
//! Nothing committed changes until step 3; an apply only stages the next
//! baseline and its non-remappable regions on the [`ModuleRecord`].

use std::{path::PathBuf, sync::Arc};

use dashmap::DashMap;
use enc_common::{
    enc_assert_eq, enc_assert_ne, ActiveStatement, BuildState, Diagnostic, DiagnosticKey,
    EditSessionId, ModuleId, ModuleUpdate, ProjectId,
};
use itertools::Itertools;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::{
    baseline::{BaselineCache, BaselineError, EmitBaseline},
    ledger::NonRemappableRegionLedger,
    provider::{
        push_module_update, AnalysisRequest, Delta, DeltaEmitter, DiagnosticSink,
        EditSessionAnalyzer, UpdateSink, Workspace,
    },
    session::{EditSession, GenerationRegions},
    tracker::TrackerError,
};

/// Errors produced while querying, applying or committing changes.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// No edit session is active.
    #[error("no edit session is active")]
    NoEditSession,

    /// The project has no debuggable module in this debug session.
    #[error("{0} has no debuggable module")]
    NotDebuggable(ProjectId),

    /// The project disappeared from the workspace.
    #[error("{0} is no longer part of the solution")]
    ProjectRemoved(ProjectId),

    /// The debuggee is stopped on an unhandled exception.
    #[error("changes cannot be applied while stopped at an unhandled exception")]
    StoppedAtException,

    /// Changes were already applied to the module in this break cycle.
    #[error("changes were already applied to {0} in this break state")]
    AlreadyApplied(ProjectId),

    /// The last queried build state does not allow applying.
    #[error("build state {0} cannot be applied")]
    NotApplicable(BuildState),

    /// The module was unloaded from the debuggee.
    #[error("module {0} has been unloaded")]
    ModuleUnloaded(ModuleId),

    /// The emitter reported errors.
    #[error("emit failed for module {module} with {} error(s)", diagnostics.len())]
    EmitFailed {
        /// Module being emitted.
        module: ModuleId,
        /// Error diagnostics of the emit.
        diagnostics: Vec<Diagnostic>,
    },

    /// The emitter succeeded without producing a baseline.
    #[error("emitter returned no baseline for module {0}")]
    MissingBaseline(ModuleId),

    /// Nothing is staged for the module.
    #[error("no update is pending for {0}")]
    NothingPending(ProjectId),

    /// The baseline could not be created.
    #[error(transparent)]
    Baseline(#[from] BaselineError),

    /// The active statements could not be collected.
    #[error(transparent)]
    ActiveStatements(#[from] TrackerError),

    /// The analyzer failed.
    #[error("analysis failed: {0:#}")]
    Analyzer(eyre::Report),

    /// The emitter failed.
    #[error("emit failed: {0:#}")]
    Emitter(eyre::Report),

    /// The debuggee rejected the update.
    #[error("failed to push update into the debuggee: {0:#}")]
    Sink(eyre::Report),
}

impl ApplyError {
    /// Whether the error is a normal outcome rather than an internal failure.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::NoEditSession
                | Self::NotDebuggable(_)
                | Self::StoppedAtException
                | Self::AlreadyApplied(_)
                | Self::NotApplicable(_)
                | Self::ModuleUnloaded(_)
                | Self::EmitFailed { .. }
                | Self::NothingPending(_)
        )
    }
}

/// Build state last reported for a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CachedSummary {
    edit_session: EditSessionId,
    state: BuildState,
}

/// Update pushed into the debuggee but not yet accepted.
#[derive(Debug)]
struct PendingUpdate {
    edit_session: EditSessionId,
    baseline: EmitBaseline,
    regions: GenerationRegions,
}

/// Per-module apply state of a debuggable project.
#[derive(Debug)]
pub struct ModuleRecord {
    project: ProjectId,
    module: ModuleId,
    output_path: PathBuf,
    committed: Option<EmitBaseline>,
    pending: Option<PendingUpdate>,
    applied_in: Option<EditSessionId>,
    summary: Option<CachedSummary>,
}

impl ModuleRecord {
    fn new(project: ProjectId, module: ModuleId, output_path: PathBuf) -> Self {
        Self {
            project,
            module,
            output_path,
            committed: None,
            pending: None,
            applied_in: None,
            summary: None,
        }
    }

    /// Owning project.
    pub fn project(&self) -> ProjectId {
        self.project
    }

    /// Module identity.
    pub fn module(&self) -> ModuleId {
        self.module
    }

    /// Compiled output the identity was read from.
    pub fn output_path(&self) -> &PathBuf {
        &self.output_path
    }

    /// Baseline of the last committed generation.
    pub fn committed_baseline(&self) -> Option<&EmitBaseline> {
        self.committed.as_ref()
    }

    /// Whether an update is staged.
    pub fn has_pending_update(&self) -> bool {
        self.pending.is_some()
    }

    /// Whether changes were applied during `edit_session`.
    pub fn changes_applied_in(&self, edit_session: EditSessionId) -> bool {
        self.applied_in == Some(edit_session)
    }
}

/// Result of a successful apply.
#[derive(Debug, Clone)]
pub struct AppliedUpdate {
    /// Owning project.
    pub project: ProjectId,
    /// Generation the update produces.
    pub generation: u32,
    /// What was pushed into the debuggee.
    pub update: ModuleUpdate,
}

/// Split a delta into the debuggee-facing update and the regions to commit later.
///
/// `committed` holds the regions of earlier generations. The handler ranges of
/// every method the delta touches are published in full, earlier generations
/// first. Remaps of active statements that lie in a committed non-exception
/// region are dropped.
fn into_module_update(
    module: ModuleId,
    delta: Delta,
    committed: &NonRemappableRegionLedger,
    statements: &[ActiveStatement],
) -> (ModuleUpdate, GenerationRegions) {
    let current = &delta.non_remappable_regions;
    let exception_regions = current
        .iter()
        .map(|(method, _)| *method)
        .unique()
        .flat_map(move |method| {
            let earlier = committed.exception_regions(&method).copied();
            let now = current.iter().filter(move |(m, _)| *m == method).map(|(_, region)| *region);
            earlier.chain(now).filter_map(move |region| region.exception_region_update(method))
        })
        .collect();

    let active_statements = delta
        .active_statements
        .into_iter()
        .filter(|remap| {
            let instruction = remap.old_instruction;
            let remappable = statements
                .iter()
                .find(|statement| statement.instruction == instruction)
                .is_none_or(|statement| {
                    committed.is_remappable(&instruction.method, statement.span.start.line)
                });
            if !remappable {
                debug!(%instruction, "Active statement lies in a non-remappable region");
            }
            remappable
        })
        .collect();

    let update = ModuleUpdate {
        module,
        il_delta: delta.il_delta,
        metadata_delta: delta.metadata_delta,
        pdb_delta: delta.pdb_delta,
        updated_methods: delta.updated_methods,
        sequence_points: delta.sequence_points,
        exception_regions,
        active_statements,
    };
    (update, delta.non_remappable_regions)
}

/// Drives analysis, emit and commit for every debuggable module.
pub struct DeltaApplicationCoordinator {
    workspace: Arc<dyn Workspace>,
    analyzer: Arc<dyn EditSessionAnalyzer>,
    emitter: Arc<dyn DeltaEmitter>,
    diagnostics: Arc<dyn DiagnosticSink>,
    baselines: BaselineCache,
    stopped_at_exception_is_rude: bool,
    records: DashMap<ProjectId, Arc<AsyncMutex<ModuleRecord>>>,
}

impl std::fmt::Debug for DeltaApplicationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaApplicationCoordinator")
            .field("records", &self.records.len())
            .finish_non_exhaustive()
    }
}

impl DeltaApplicationCoordinator {
    pub(crate) fn new(
        workspace: Arc<dyn Workspace>,
        analyzer: Arc<dyn EditSessionAnalyzer>,
        emitter: Arc<dyn DeltaEmitter>,
        diagnostics: Arc<dyn DiagnosticSink>,
        baselines: BaselineCache,
        stopped_at_exception_is_rude: bool,
    ) -> Self {
        Self {
            workspace,
            analyzer,
            emitter,
            diagnostics,
            baselines,
            stopped_at_exception_is_rude,
            records: DashMap::new(),
        }
    }

    pub(crate) fn register(&self, project: ProjectId, module: ModuleId, output_path: PathBuf) {
        let record = ModuleRecord::new(project, module, output_path);
        self.records.insert(project, Arc::new(AsyncMutex::new(record)));
    }

    pub(crate) fn unregister(&self, project: ProjectId) {
        self.records.remove(&project);
    }

    pub(crate) fn clear(&self) {
        self.records.clear();
    }

    /// The record of `project`, if it is debuggable.
    pub fn record(&self, project: ProjectId) -> Option<Arc<AsyncMutex<ModuleRecord>>> {
        self.records.get(&project).map(|record| record.value().clone())
    }

    /// Summarize the changes of `project` since the edit session started.
    pub async fn build_state(
        &self,
        edit: &EditSession,
        project: ProjectId,
    ) -> Result<BuildState, ApplyError> {
        let Some(record) = self.record(project) else { return Ok(BuildState::NoChanges) };
        if !edit.read_only_reason(project).allows_edits() {
            return Ok(BuildState::NoChanges);
        }

        let mut record = record.lock().await;
        if record.changes_applied_in(edit.id()) {
            return Ok(BuildState::NoChanges);
        }

        let solution = self.workspace.current_solution();
        let Some(snapshot) = solution.project(project).cloned() else {
            record.summary = None;
            return Ok(BuildState::NoChanges);
        };

        let active_statements = match edit.active_statements().await {
            Ok(statements) => statements,
            // The edit session ended while we waited.
            Err(TrackerError::Cancelled) => return Ok(BuildState::NoChanges),
            Err(err) => return Err(err.into()),
        };

        let analysis = self
            .analyzer
            .analyze(AnalysisRequest {
                edit_session: edit.id(),
                base_solution: edit.base_solution().clone(),
                project: snapshot,
                active_statements,
                non_remappable_regions: Arc::new(edit.non_remappable_regions()),
            })
            .await
            .map_err(ApplyError::Analyzer)?;

        let mut state = analysis.state;
        if edit.stopped_at_exception() && self.stopped_at_exception_is_rude && state.has_changes() {
            state = BuildState::RudeEdits;
        }

        let key = edit.diagnostic_key();
        if analysis.diagnostics.is_empty() {
            self.diagnostics.clear(key, record.module);
        } else {
            self.diagnostics.report(key, record.module, analysis.diagnostics);
        }

        edit.record_analysis(state, &analysis.rude_edits);
        record.summary = Some(CachedSummary { edit_session: edit.id(), state });
        debug!(%project, ?state, "Build state computed");
        Ok(state)
    }

    /// Emit the changes of `project` and push them into the debuggee.
    ///
    /// On success the next baseline is staged until [`commit`](Self::commit).
    /// On failure nothing committed changes.
    pub async fn apply(
        &self,
        edit: &EditSession,
        project: ProjectId,
        sink: &mut dyn UpdateSink,
    ) -> Result<AppliedUpdate, ApplyError> {
        if edit.stopped_at_exception() {
            return Err(ApplyError::StoppedAtException);
        }

        let record = self.record(project).ok_or(ApplyError::NotDebuggable(project))?;
        let mut record = record.lock().await;
        if record.changes_applied_in(edit.id()) {
            return Err(ApplyError::AlreadyApplied(project));
        }

        let state = record
            .summary
            .filter(|summary| summary.edit_session == edit.id())
            .map(|summary| summary.state)
            .unwrap_or_default();
        if !state.is_applicable() {
            return Err(ApplyError::NotApplicable(state));
        }

        let key = edit.diagnostic_key();
        let module = record.module;

        let baseline = match &record.committed {
            Some(baseline) => baseline.clone(),
            None => match self.baselines.get_or_create(module).await {
                Ok(Some(cached)) => EmitBaseline::initial(cached),
                Ok(None) | Err(BaselineError::ModuleUnloaded(_)) => {
                    return Err(self.module_unloaded(key, module))
                }
                Err(err) => return Err(err.into()),
            },
        };
        if baseline.ensure_alive().is_err() {
            return Err(self.module_unloaded(key, module));
        }

        let snapshot = self
            .workspace
            .current_solution()
            .project(project)
            .cloned()
            .ok_or(ApplyError::ProjectRemoved(project))?;

        let statements = match edit.active_statements().await {
            Ok(statements) => statements,
            Err(TrackerError::Cancelled) => return Err(ApplyError::NoEditSession),
            Err(err) => return Err(err.into()),
        };

        let mut delta =
            self.emitter.emit_delta(snapshot, baseline.clone()).await.map_err(ApplyError::Emitter)?;

        if !delta.emit_result.success {
            let errors: Vec<Diagnostic> = std::mem::take(&mut delta.emit_result.diagnostics)
                .into_iter()
                .filter(Diagnostic::is_error)
                .collect();
            edit.record_emit_errors(&errors);
            self.diagnostics.report(key, module, errors.clone());
            warn!(%project, %module, errors = errors.len(), "Emit failed");
            return Err(ApplyError::EmitFailed { module, diagnostics: errors });
        }

        let next = delta.emit_result.baseline.take().ok_or(ApplyError::MissingBaseline(module))?;

        // From here on the debuggee is mutated; nothing below awaits.
        if baseline.ensure_alive().is_err() {
            return Err(self.module_unloaded(key, module));
        }

        let committed = edit.non_remappable_regions();
        let (update, regions) = into_module_update(module, delta, &committed, &statements);
        push_module_update(sink, &update).map_err(ApplyError::Sink)?;
        self.diagnostics.clear(key, module);

        let generation = next.generation();
        record.pending = Some(PendingUpdate { edit_session: edit.id(), baseline: next, regions });
        info!(%project, %module, generation, "Update pushed into debuggee");

        Ok(AppliedUpdate { project, generation, update })
    }

    /// Accept the update staged for `project`.
    ///
    /// Returns the committed generation.
    pub async fn commit(&self, edit: &EditSession, project: ProjectId) -> Result<u32, ApplyError> {
        let record = self.record(project).ok_or(ApplyError::NotDebuggable(project))?;
        let mut record = record.lock().await;

        let pending = match record.pending.take() {
            Some(pending) if pending.edit_session == edit.id() => pending,
            _ => return Err(ApplyError::NothingPending(project)),
        };

        let generation = pending.baseline.generation();
        enc_assert_ne!(generation, 0, "initial baseline staged as an update");
        enc_assert_eq!(
            generation,
            record.committed.as_ref().map_or(1, |committed| committed.generation() + 1),
            "generations of {} must be committed in order",
            record.module,
        );
        record.committed = Some(pending.baseline);
        record.applied_in = Some(edit.id());
        edit.push_generation(pending.regions);

        info!(%project, module = %record.module, generation, "Update committed");
        Ok(generation)
    }

    /// Drop the update staged for `project`. Returns whether one was staged.
    pub async fn discard(&self, project: ProjectId) -> bool {
        let Some(record) = self.record(project) else { return false };
        let discarded = record.lock().await.pending.take().is_some();
        if discarded {
            debug!(%project, "Discarded pending update");
        }
        discarded
    }

    fn module_unloaded(&self, key: DiagnosticKey, module: ModuleId) -> ApplyError {
        warn!(%module, "Module unloaded before changes could be applied");
        self.diagnostics.report(key, module, vec![Diagnostic::module_unloaded(module)]);
        ApplyError::ModuleUnloaded(module)
    }
}
