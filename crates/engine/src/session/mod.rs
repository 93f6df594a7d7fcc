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

//! Debug session controller.
//!
//! Every participating project reports the debugger's transitions on its
//! own: Start, Enter break, Exit break, Stop. The controller counts the
//! participants whose module is debuggable and, under a single lock, starts
//! one [`EditSession`] when the last of them arrives in break state. The
//! session lasts until the last of them leaves break state; only then are its
//! committed regions merged into the ledger.

mod edit_session;
pub use edit_session::*;

mod telemetry;
pub use telemetry::*;

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use enc_common::{
    ActiveStatement, BuildState, DebugSessionId, DebuggingState, EditSessionId, ModuleId,
    ProjectId, ReadOnlyReason,
};
use futures::{
    future::{self, BoxFuture},
    FutureExt,
};
use parking_lot::Mutex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    affinity::{AffinityError, ReaderWorker},
    baseline::BaselineCache,
    config::EngineConfig,
    coordinator::{AppliedUpdate, ApplyError, DeltaApplicationCoordinator},
    ledger::NonRemappableRegionLedger,
    provider::{
        Debuggee, DeltaEmitter, DiagnosticSink, EditSessionAnalyzer, FaultReporter,
        IdentityReadError, ModuleIdentityReader, ModuleMetadataProvider, SolutionSnapshot,
        UpdateSink, Workspace,
    },
    tracker::{ActiveStatementTracker, TrackerError},
};

/// Errors produced by debug session transitions.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No debug session is active.
    #[error("no debug session is active")]
    NoDebugSession,

    /// The project is not part of the solution.
    #[error("{0} is not part of the solution")]
    UnknownProject(ProjectId),

    /// The project already started debugging.
    #[error("{0} is already being debugged")]
    AlreadyDebugging(ProjectId),

    /// The project did not start debugging.
    #[error("{0} is not participating in the debug session")]
    NotParticipating(ProjectId),

    /// The project already entered break state.
    #[error("{0} is already in break state")]
    AlreadyInBreak(ProjectId),

    /// The project is not in break state.
    #[error("{0} is not in break state")]
    NotInBreak(ProjectId),

    /// The symbol reader worker could not be started.
    #[error(transparent)]
    Affinity(#[from] AffinityError),
}

impl SessionError {
    /// Whether the error reflects a host calling out of order rather than an
    /// internal failure.
    pub fn is_expected(&self) -> bool {
        !matches!(self, Self::Affinity(_))
    }
}

/// The engine's external collaborators.
#[derive(Clone)]
pub struct Collaborators {
    /// Source of solution snapshots.
    pub workspace: Arc<dyn Workspace>,
    /// The program being debugged.
    pub debuggee: Arc<dyn Debuggee>,
    /// Loaded module metadata and symbols.
    pub metadata: Arc<dyn ModuleMetadataProvider>,
    /// Change classification.
    pub analyzer: Arc<dyn EditSessionAnalyzer>,
    /// Delta emission.
    pub emitter: Arc<dyn DeltaEmitter>,
    /// Module identity reading.
    pub identity_reader: Arc<dyn ModuleIdentityReader>,
    /// Diagnostics destination.
    pub diagnostics: Arc<dyn DiagnosticSink>,
    /// Destination of swallowed internal failures.
    pub faults: Arc<dyn FaultReporter>,
}

/// What the host knows about a break.
#[derive(Debug, Clone, Default)]
pub struct BreakContext {
    /// The debuggee stopped on an unhandled exception.
    pub stopped_at_exception: bool,
    /// Active statements the host already collected.
    pub active_statements: Option<Vec<ActiveStatement>>,
}

impl BreakContext {
    /// Break on an unhandled exception.
    pub fn unhandled_exception() -> Self {
        Self { stopped_at_exception: true, active_statements: None }
    }

    /// Use `statements` instead of querying the debuggee.
    pub fn with_active_statements(mut self, statements: Vec<ActiveStatement>) -> Self {
        self.active_statements = Some(statements);
        self
    }
}

#[derive(Debug)]
struct Participant {
    module: Option<ModuleId>,
    in_break: bool,
}

/// What the participants reported since the last edit session.
#[derive(Debug, Default)]
struct BreakArrivals {
    solution: Option<Arc<SolutionSnapshot>>,
    read_only: HashMap<ProjectId, ReadOnlyReason>,
    stopped_at_exception: bool,
    active_statements: Option<Vec<ActiveStatement>>,
}

#[derive(Debug)]
struct DebugSession {
    id: DebugSessionId,
    participants: HashMap<ProjectId, Participant>,
    run_count: usize,
    break_count: usize,
    arrivals: BreakArrivals,
    edit_session: Option<Arc<EditSession>>,
    ledger: NonRemappableRegionLedger,
    telemetry: DebugSessionTelemetry,
}

impl DebugSession {
    fn new(id: DebugSessionId) -> Self {
        Self {
            id,
            participants: HashMap::new(),
            run_count: 0,
            break_count: 0,
            arrivals: BreakArrivals::default(),
            edit_session: None,
            ledger: NonRemappableRegionLedger::new(),
            telemetry: DebugSessionTelemetry::new(id),
        }
    }

    fn participant(&mut self, project: ProjectId) -> Result<&mut Participant, SessionError> {
        self.participants.get_mut(&project).ok_or(SessionError::NotParticipating(project))
    }

    fn barrier_reached(&self) -> bool {
        self.run_count > 0 && self.break_count == self.run_count
    }

    /// Whether the debuggable `project` runs again while others are still in break.
    fn resumed(&self, project: ProjectId) -> bool {
        self.participants
            .get(&project)
            .is_some_and(|participant| participant.module.is_some() && !participant.in_break)
    }
}

/// Owns the debug session state shared by every participating project.
pub struct DebugSessionController {
    config: EngineConfig,
    collaborators: Collaborators,
    baselines: BaselineCache,
    tracker: ActiveStatementTracker,
    coordinator: DeltaApplicationCoordinator,
    state: Mutex<Option<DebugSession>>,
    next_debug_session: AtomicU64,
    next_edit_session: AtomicU64,
}

impl std::fmt::Debug for DebugSessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugSessionController")
            .field("config", &self.config)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl DebugSessionController {
    /// Create a controller and start its symbol reader worker.
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Result<Self, SessionError> {
        let worker = ReaderWorker::spawn(config.reader_worker_name.clone())?;
        let baselines = BaselineCache::new(collaborators.metadata.clone(), worker);
        let tracker = ActiveStatementTracker::new(collaborators.debuggee.clone());
        let coordinator = DeltaApplicationCoordinator::new(
            collaborators.workspace.clone(),
            collaborators.analyzer.clone(),
            collaborators.emitter.clone(),
            collaborators.diagnostics.clone(),
            baselines.clone(),
            config.stopped_at_exception_is_rude,
        );

        Ok(Self {
            config,
            collaborators,
            baselines,
            tracker,
            coordinator,
            state: Mutex::new(None),
            next_debug_session: AtomicU64::new(1),
            next_edit_session: AtomicU64::new(1),
        })
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Where swallowed internal failures go.
    pub fn faults(&self) -> &Arc<dyn FaultReporter> {
        &self.collaborators.faults
    }

    /// Where diagnostics go.
    pub fn diagnostics(&self) -> &Arc<dyn DiagnosticSink> {
        &self.collaborators.diagnostics
    }

    /// The module baseline cache.
    pub fn baselines(&self) -> &BaselineCache {
        &self.baselines
    }

    /// The delta application coordinator.
    pub fn coordinator(&self) -> &DeltaApplicationCoordinator {
        &self.coordinator
    }

    /// `project` starts debugging.
    pub fn start_debugging(&self, project: ProjectId) -> Result<(), SessionError> {
        let solution = self.collaborators.workspace.current_solution();
        let snapshot = solution.project(project).ok_or(SessionError::UnknownProject(project))?;

        let module = match self.collaborators.identity_reader.read_module_id(&snapshot.output_path)
        {
            Ok(module) => Some(module),
            Err(IdentityReadError::Io(err)) => {
                debug!(%project, path = ?snapshot.output_path, "Output not readable, not debuggable: {err}");
                None
            }
            Err(err) => {
                self.collaborators.faults.report_fault("start_debugging", &eyre::Report::new(err));
                None
            }
        };

        let mut state = self.state.lock();
        let session = state.get_or_insert_with(|| {
            let id = DebugSessionId(self.next_debug_session.fetch_add(1, Ordering::Relaxed));
            info!(debug_session = %id, "Debug session started");
            DebugSession::new(id)
        });

        if session.participants.contains_key(&project) {
            return Err(SessionError::AlreadyDebugging(project));
        }
        session.participants.insert(project, Participant { module, in_break: false });

        if let Some(module) = module {
            session.run_count += 1;
            self.coordinator.register(project, module, snapshot.output_path.clone());
        }
        self.reconcile(session);

        info!(%project, debuggable = module.is_some(), run_count = session.run_count, "Project started debugging");
        Ok(())
    }

    /// `project` enters break state.
    pub async fn enter_break_state(
        &self,
        project: ProjectId,
        context: BreakContext,
    ) -> Result<(), SessionError> {
        let (debug_session, module) = {
            let mut state = self.state.lock();
            let session = state.as_mut().ok_or(SessionError::NoDebugSession)?;
            let participant = session.participant(project)?;
            if participant.in_break {
                return Err(SessionError::AlreadyInBreak(project));
            }
            let module = participant.module;

            if session.arrivals.solution.is_none() {
                session.arrivals.solution = Some(self.collaborators.workspace.current_solution());
            }
            (session.id, module)
        };

        let reason = match module {
            Some(module) => match self.baselines.get_or_create(module).await {
                Ok(Some(_)) => ReadOnlyReason::None,
                Ok(None) => ReadOnlyReason::NotLoaded,
                Err(err) => {
                    warn!(%project, %module, "Baseline unavailable: {err}");
                    ReadOnlyReason::MetadataNotAvailable
                }
            },
            None => ReadOnlyReason::None,
        };

        let mut state = self.state.lock();
        let session = state
            .as_mut()
            .filter(|session| session.id == debug_session)
            .ok_or(SessionError::NoDebugSession)?;
        let participant = session.participant(project)?;
        if participant.in_break {
            return Err(SessionError::AlreadyInBreak(project));
        }
        participant.in_break = true;

        if module.is_some() {
            session.break_count += 1;
            session.arrivals.read_only.insert(project, reason);
        }
        session.arrivals.stopped_at_exception |= context.stopped_at_exception;
        if let Some(statements) = context.active_statements {
            session.arrivals.active_statements.get_or_insert_with(Vec::new).extend(statements);
        }

        debug!(%project, ?reason, break_count = session.break_count, run_count = session.run_count, "Project entered break state");
        self.reconcile(session);
        Ok(())
    }

    /// `project` leaves break state. The last one ends the edit session.
    pub fn exit_break_state(&self, project: ProjectId) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        let session = state.as_mut().ok_or(SessionError::NoDebugSession)?;
        let participant = session.participant(project)?;
        if !participant.in_break {
            return Err(SessionError::NotInBreak(project));
        }
        participant.in_break = false;

        if participant.module.is_some() {
            session.break_count -= 1;
        }
        self.reconcile(session);
        if session.break_count == 0 {
            session.arrivals = BreakArrivals::default();
        }

        debug!(%project, break_count = session.break_count, "Project left break state");
        Ok(())
    }

    /// `project` stops debugging. The last one ends the debug session.
    pub fn stop_debugging(&self, project: ProjectId) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        let session = state.as_mut().ok_or(SessionError::NoDebugSession)?;
        let participant =
            session.participants.remove(&project).ok_or(SessionError::NotParticipating(project))?;

        if participant.module.is_some() {
            session.run_count -= 1;
            if participant.in_break {
                session.break_count -= 1;
            }
            self.coordinator.unregister(project);
        }
        info!(%project, run_count = session.run_count, "Project stopped debugging");

        if !session.participants.is_empty() {
            self.reconcile(session);
            return Ok(());
        }

        if let Some(mut session) = state.take() {
            self.end_edit_session(&mut session);
            self.coordinator.clear();
            self.baselines.clear();
            session.ledger.clear();

            info!(debug_session = %session.id, "Debug session ended");
            if self.config.log_telemetry {
                session.telemetry.log();
            }
        }
        Ok(())
    }

    /// Summarize the pending changes of `project`.
    pub async fn get_build_state(&self, project: ProjectId) -> Result<BuildState, ApplyError> {
        match self.edit_session_in_break(project) {
            Some(edit) => self.coordinator.build_state(&edit, project).await,
            None => Ok(BuildState::NoChanges),
        }
    }

    /// Emit the changes of `project` and push them into the debuggee through `sink`.
    pub async fn build_for_enc(
        &self,
        project: ProjectId,
        sink: &mut dyn UpdateSink,
    ) -> Result<AppliedUpdate, ApplyError> {
        let edit = self.edit_session_in_break(project).ok_or(ApplyError::NoEditSession)?;
        self.coordinator.apply(&edit, project, sink).await
    }

    /// The host activated the update pushed for `project`.
    ///
    /// Accepted as long as the edit session lasts, even if `project` already
    /// left break state.
    pub async fn apply_succeeded(&self, project: ProjectId) -> Result<u32, ApplyError> {
        let edit = self.edit_session().ok_or(ApplyError::NoEditSession)?;
        self.coordinator.commit(&edit, project).await
    }

    /// The host could not activate the update pushed for `project`.
    pub async fn discard_update(&self, project: ProjectId) -> bool {
        self.coordinator.discard(project).await
    }

    /// Current debugging state.
    pub fn debugging_state(&self) -> DebuggingState {
        match self.state.lock().as_ref() {
            None => DebuggingState::Design,
            Some(session) if session.edit_session.is_some() => DebuggingState::Break,
            Some(_) => DebuggingState::Run,
        }
    }

    /// Module of `project`, if it participates and is debuggable.
    pub fn module_of(&self, project: ProjectId) -> Option<ModuleId> {
        let state = self.state.lock();
        state.as_ref()?.participants.get(&project)?.module
    }

    /// Active debug session.
    pub fn debug_session_id(&self) -> Option<DebugSessionId> {
        self.state.lock().as_ref().map(|session| session.id)
    }

    /// Participants in run state and in break state, counting debuggable modules only.
    pub fn participant_counts(&self) -> Option<(usize, usize)> {
        self.state.lock().as_ref().map(|session| (session.run_count, session.break_count))
    }

    /// Active edit session.
    pub fn edit_session(&self) -> Option<Arc<EditSession>> {
        self.state.lock().as_ref().and_then(|session| session.edit_session.clone())
    }

    /// Snapshot of the non-remappable region ledger.
    pub fn ledger(&self) -> NonRemappableRegionLedger {
        self.state.lock().as_ref().map(|session| session.ledger.clone()).unwrap_or_default()
    }

    /// Telemetry of the active debug session so far.
    pub fn telemetry(&self) -> Option<DebugSessionTelemetry> {
        self.state.lock().as_ref().map(|session| session.telemetry.clone())
    }

    /// Whether the sources of `project` may be edited right now.
    pub fn edit_permission(&self, project: ProjectId) -> Result<(), ReadOnlyReason> {
        let state = self.state.lock();
        let Some(session) = state.as_ref() else { return Ok(()) };
        let Some(edit) = session.edit_session.as_ref() else {
            return Err(ReadOnlyReason::Running);
        };
        if session.resumed(project) {
            return Err(ReadOnlyReason::Running);
        }

        if edit.stopped_at_exception() {
            return Err(ReadOnlyReason::StoppedAtException);
        }
        match edit.read_only_reason(project) {
            ReadOnlyReason::None => Ok(()),
            reason => Err(reason),
        }
    }

    /// User-facing explanation when edits to `project` are rejected.
    pub fn read_only_message(&self, project: ProjectId) -> Option<&'static str> {
        let reason = self.edit_permission(project).err()?;
        reason.message(self.collaborators.workspace.is_solution_load_deferred())
    }

    /// The edit session, unless `project` already resumed running in it.
    fn edit_session_in_break(&self, project: ProjectId) -> Option<Arc<EditSession>> {
        let state = self.state.lock();
        let session = state.as_ref()?;
        if session.resumed(project) {
            return None;
        }
        session.edit_session.clone()
    }

    /// Start the edit session when the barrier is reached and end it when no
    /// participant is left in break state.
    fn reconcile(&self, session: &mut DebugSession) {
        match session.edit_session {
            None if session.barrier_reached() => self.begin_edit_session(session),
            Some(_) if session.break_count == 0 => self.end_edit_session(session),
            _ => {}
        }
    }

    fn begin_edit_session(&self, session: &mut DebugSession) {
        let arrivals = std::mem::take(&mut session.arrivals);
        let solution =
            arrivals.solution.unwrap_or_else(|| self.collaborators.workspace.current_solution());
        let id = EditSessionId(self.next_edit_session.fetch_add(1, Ordering::Relaxed));
        let tracking = CancellationToken::new();

        let active_statements: BoxFuture<'static, Result<Arc<Vec<ActiveStatement>>, TrackerError>> =
            match arrivals.active_statements {
                Some(statements) => future::ready(Ok(Arc::new(statements))).boxed(),
                None => {
                    let tracker = self.tracker.clone();
                    let cancel = tracking.clone();
                    async move { tracker.collect(cancel).await.map(Arc::new) }.boxed()
                }
            };

        info!(
            edit_session = %id,
            solution_version = solution.version,
            stopped_at_exception = arrivals.stopped_at_exception,
            "Edit session started"
        );
        let edit = Arc::new(EditSession::new(
            id,
            session.id,
            solution,
            arrivals.read_only,
            arrivals.stopped_at_exception,
            session.ledger.clone(),
            active_statements,
            tracking,
        ));
        edit.start_tracking();
        session.edit_session = Some(edit);
    }

    fn end_edit_session(&self, session: &mut DebugSession) {
        let Some(edit) = session.edit_session.take() else { return };

        let (regions, telemetry) = edit.end();
        let merged = regions.len();
        session.ledger.merge(regions);
        if self.config.log_telemetry {
            telemetry.log();
        }
        session.telemetry.record_edit_session(telemetry);
        session.arrivals = BreakArrivals::default();

        info!(edit_session = %edit.id(), merged_regions = merged, "Edit session ended");
    }
}
