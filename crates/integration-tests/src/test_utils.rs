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

//! Test utilities for integration tests

use std::sync::Arc;

use parking_lot::Mutex;

/// Initialization utilities for tests
pub mod init {
    /// Initialize logging once per test binary
    pub fn init_test_environment() {
        enc_common::logging::ensure_test_logging(None);
    }
}

/// Logging capture utilities for tests
pub mod logging {
    use super::*;
    use tracing::Level;
    use tracing_subscriber::layer::SubscriberExt;

    /// One captured log event
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct CapturedEvent {
        /// Event level
        pub level: Level,
        /// Event target
        pub target: String,
        /// Formatted message
        pub message: String,
    }

    /// A tracing layer that records every event it sees
    #[derive(Clone, Default)]
    pub struct EventCapture {
        events: Arc<Mutex<Vec<CapturedEvent>>>,
    }

    impl EventCapture {
        /// Create a new EventCapture instance
        pub fn new() -> Self {
            Self::default()
        }

        /// Every captured event, oldest first
        pub fn events(&self) -> Vec<CapturedEvent> {
            self.events.lock().clone()
        }

        /// Messages of events logged under `target`
        pub fn messages_for(&self, target: &str) -> Vec<String> {
            self.events
                .lock()
                .iter()
                .filter(|event| event.target == target)
                .map(|event| event.message.clone())
                .collect()
        }

        /// Messages of error-level events
        pub fn errors(&self) -> Vec<String> {
            self.events
                .lock()
                .iter()
                .filter(|event| event.level == Level::ERROR)
                .map(|event| event.message.clone())
                .collect()
        }
    }

    impl<S> tracing_subscriber::Layer<S> for EventCapture
    where
        S: tracing::Subscriber,
    {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            struct MessageVisitor {
                message: String,
            }

            impl tracing::field::Visit for MessageVisitor {
                fn record_debug(
                    &mut self,
                    field: &tracing::field::Field,
                    value: &dyn std::fmt::Debug,
                ) {
                    if field.name() == "message" {
                        self.message = format!("{value:?}");
                    }
                }

                fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
                    if field.name() == "message" {
                        self.message = value.to_string();
                    }
                }
            }

            let mut visitor = MessageVisitor { message: String::new() };
            event.record(&mut visitor);

            self.events.lock().push(CapturedEvent {
                level: *event.metadata().level(),
                target: event.metadata().target().to_string(),
                message: visitor.message,
            });
        }
    }

    /// Run `body` on the current thread with every event captured
    pub fn capture_events<R>(body: impl FnOnce() -> R) -> (R, EventCapture) {
        let capture = EventCapture::new();
        let subscriber = tracing_subscriber::registry().with(capture.clone());
        let result = tracing::subscriber::with_default(subscriber, body);
        (result, capture)
    }
}

/// Scripted stand-ins for the engine's collaborators
pub mod fakes {
    use std::{
        collections::{BTreeSet, HashMap, HashSet},
        io,
        path::{Path, PathBuf},
        sync::atomic::{AtomicBool, AtomicUsize, Ordering},
        time::Duration,
    };

    use enc_common::{
        ActiveStatementRemap, Diagnostic, ExceptionRegionUpdate, InstructionId, LinePositionSpan,
        MethodId, ModuleId, NonRemappableRegion, ProcessId, ProjectId, SequencePointUpdates,
        SourcePosition, ThreadId,
    };
    use enc_engine::{
        AnalysisRequest, BaselineModuleInfo, Debuggee, DebuggeeProcess, Delta, DeltaEmitter,
        EditSessionAnalyzer, EmitBaseline, EmitResult, FaultReporter, IdentityReadError,
        MetadataError, MetadataSnapshot, ModuleIdentityReader, ModuleMetadataProvider,
        PortableSymbols, ProjectAnalysis, ProjectSnapshot, RuntimeInstance, SolutionSnapshot,
        StoppedFrame, StoppedThread, SymbolSource, UnloadCallback, UpdateSink, Workspace,
    };
    use futures::{
        future::{self, BoxFuture},
        FutureExt,
    };
    use parking_lot::RwLock;
    use tokio_util::sync::CancellationToken;

    use super::*;

    /// Snapshot of a project whose output lives under `bin/`
    pub fn project_snapshot(id: ProjectId, name: &str) -> ProjectSnapshot {
        ProjectSnapshot {
            id,
            name: name.to_string(),
            version: 1,
            output_path: PathBuf::from(format!("bin/{name}.dll")),
        }
    }

    /// Workspace whose solution the test edits directly
    #[derive(Debug, Default)]
    pub struct FakeWorkspace {
        solution: RwLock<Arc<SolutionSnapshot>>,
        load_deferred: AtomicBool,
    }

    impl FakeWorkspace {
        /// Empty solution
        pub fn new() -> Self {
            Self::default()
        }

        /// Add or replace a project
        pub fn add_project(&self, project: ProjectSnapshot) {
            self.update(|solution| {
                solution.projects.insert(project.id, project);
            });
        }

        /// Simulate a source edit of `project`
        pub fn edit(&self, project: ProjectId) {
            self.update(|solution| {
                if let Some(snapshot) = solution.projects.get_mut(&project) {
                    snapshot.version += 1;
                }
            });
        }

        /// Remove a project from the solution
        pub fn remove_project(&self, project: ProjectId) {
            self.update(|solution| {
                solution.projects.remove(&project);
            });
        }

        /// Version of the latest solution snapshot
        pub fn current_solution_version(&self) -> u64 {
            self.solution.read().version
        }

        /// Mark the solution load as deferred
        pub fn set_load_deferred(&self, deferred: bool) {
            self.load_deferred.store(deferred, Ordering::SeqCst);
        }

        fn update(&self, change: impl FnOnce(&mut SolutionSnapshot)) {
            let mut current = self.solution.write();
            let mut next = SolutionSnapshot::clone(&current);
            change(&mut next);
            next.version += 1;
            *current = Arc::new(next);
        }
    }

    impl Workspace for FakeWorkspace {
        fn current_solution(&self) -> Arc<SolutionSnapshot> {
            self.solution.read().clone()
        }

        fn is_solution_load_deferred(&self) -> bool {
            self.load_deferred.load(Ordering::SeqCst)
        }
    }

    /// What a compiled output looks like on disk
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum OutputState {
        /// A module with a readable identity
        Module(ModuleId),
        /// The file is locked
        Locked,
        /// The file exists but is not a module
        Malformed,
    }

    /// Identity reader backed by an in-memory file table
    #[derive(Debug, Default)]
    pub struct FakeIdentityReader {
        outputs: Mutex<HashMap<PathBuf, OutputState>>,
        reads: AtomicUsize,
    }

    impl FakeIdentityReader {
        /// Empty file table
        pub fn new() -> Self {
            Self::default()
        }

        /// Set what `path` contains
        pub fn set_output(&self, path: impl Into<PathBuf>, state: OutputState) {
            self.outputs.lock().insert(path.into(), state);
        }

        /// Number of reads so far
        pub fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    impl ModuleIdentityReader for FakeIdentityReader {
        fn read_module_id(&self, output_path: &Path) -> Result<ModuleId, IdentityReadError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            match self.outputs.lock().get(output_path) {
                Some(OutputState::Module(module)) => Ok(*module),
                Some(OutputState::Malformed) => Err(IdentityReadError::Malformed(format!(
                    "{} has no module header",
                    output_path.display()
                ))),
                Some(OutputState::Locked) => Err(IdentityReadError::Io(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    "file is locked",
                ))),
                None => Err(IdentityReadError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    "no such file",
                ))),
            }
        }
    }

    /// A debuggee with one process and one runtime
    #[derive(Debug, Default)]
    pub struct FakeDebuggee {
        threads: Mutex<Vec<StoppedThread>>,
        positions: Mutex<HashMap<InstructionId, SourcePosition>>,
        resolutions: AtomicUsize,
        latency: Mutex<Duration>,
    }

    impl FakeDebuggee {
        /// No stopped thread
        pub fn new() -> Self {
            Self::default()
        }

        /// Report `thread` as stopped with `frames`, leaf first
        pub fn stop_thread(&self, thread: ThreadId, frames: Vec<StoppedFrame>) {
            self.threads.lock().push(StoppedThread { thread, frames });
        }

        /// Map an instruction to a source statement
        pub fn map(&self, instruction: InstructionId, document: &str, span: LinePositionSpan) {
            self.positions
                .lock()
                .insert(instruction, SourcePosition { document: PathBuf::from(document), span });
        }

        /// Number of resolution requests so far
        pub fn resolutions(&self) -> usize {
            self.resolutions.load(Ordering::SeqCst)
        }

        /// Make every resolution take `latency` unless cancelled first
        pub fn set_latency(&self, latency: Duration) {
            *self.latency.lock() = latency;
        }
    }

    impl Debuggee for FakeDebuggee {
        fn processes(&self) -> Vec<DebuggeeProcess> {
            vec![DebuggeeProcess {
                id: ProcessId(1),
                runtimes: vec![RuntimeInstance { threads: self.threads.lock().clone() }],
            }]
        }

        fn resolve_source_position(
            &self,
            instruction: InstructionId,
            cancel: CancellationToken,
        ) -> BoxFuture<'static, eyre::Result<Option<SourcePosition>>> {
            self.resolutions.fetch_add(1, Ordering::SeqCst);
            let position = self.positions.lock().get(&instruction).cloned();
            let latency = *self.latency.lock();
            if latency.is_zero() {
                return future::ready(Ok(position)).boxed();
            }

            async move {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        Err(eyre::eyre!("resolution of {instruction} cancelled"))
                    }
                    _ = tokio::time::sleep(latency) => Ok(position),
                }
            }
            .boxed()
        }
    }

    enum LoadedModule {
        Loaded { bytes: Arc<[u8]>, symbols: Option<Arc<PortableSymbols>> },
        Broken(String),
    }

    /// Runtime metadata provider with explicit load and unload
    #[derive(Default)]
    pub struct FakeMetadataProvider {
        modules: Mutex<HashMap<ModuleId, LoadedModule>>,
        callbacks: Mutex<HashMap<ModuleId, Vec<UnloadCallback>>>,
        lookups: AtomicUsize,
        latency: Mutex<Duration>,
    }

    impl std::fmt::Debug for FakeMetadataProvider {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("FakeMetadataProvider")
                .field("modules", &self.modules.lock().len())
                .field("lookups", &self.lookups())
                .finish()
        }
    }

    impl FakeMetadataProvider {
        /// Nothing loaded
        pub fn new() -> Self {
            Self::default()
        }

        /// Load `module` without symbols
        pub fn load(&self, module: ModuleId) {
            self.load_with_symbols(module, None);
        }

        /// Load `module` with portable symbols
        pub fn load_with_symbols(&self, module: ModuleId, symbols: Option<PortableSymbols>) {
            let bytes: Arc<[u8]> = Arc::from(module.as_bytes().to_vec());
            self.modules
                .lock()
                .insert(module, LoadedModule::Loaded { bytes, symbols: symbols.map(Arc::new) });
        }

        /// Load `module` with metadata that cannot be read
        pub fn load_broken(&self, module: ModuleId, reason: &str) {
            self.modules.lock().insert(module, LoadedModule::Broken(reason.to_string()));
        }

        /// Unload `module`, release its bytes and fire the registered callbacks
        pub fn unload(&self, module: ModuleId) {
            self.modules.lock().remove(&module);
            let callbacks = self.callbacks.lock().remove(&module).unwrap_or_default();
            for callback in callbacks {
                callback();
            }
        }

        /// Make every lookup take `latency`
        pub fn set_latency(&self, latency: Duration) {
            *self.latency.lock() = latency;
        }

        /// Number of lookups so far
        pub fn lookups(&self) -> usize {
            self.lookups.load(Ordering::SeqCst)
        }

        /// Number of unload callbacks waiting for `module`
        pub fn pending_callbacks(&self, module: ModuleId) -> usize {
            self.callbacks.lock().get(&module).map_or(0, Vec::len)
        }
    }

    impl ModuleMetadataProvider for FakeMetadataProvider {
        fn try_get_baseline_module_info(
            &self,
            module: ModuleId,
        ) -> Result<Option<BaselineModuleInfo>, MetadataError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            let latency = *self.latency.lock();
            if !latency.is_zero() {
                std::thread::sleep(latency);
            }

            match self.modules.lock().get(&module) {
                None => Ok(None),
                Some(LoadedModule::Broken(reason)) => Err(MetadataError::Unavailable(reason.clone())),
                Some(LoadedModule::Loaded { bytes, symbols }) => Ok(Some(BaselineModuleInfo {
                    metadata: MetadataSnapshot::new(bytes),
                    symbols: symbols.clone().map_or(SymbolSource::None, SymbolSource::Portable),
                })),
            }
        }

        fn on_module_unloaded(&self, module: ModuleId, callback: UnloadCallback) {
            self.callbacks.lock().entry(module).or_default().push(callback);
        }
    }

    /// Analyzer answering with a per-project script
    #[derive(Debug, Default)]
    pub struct ScriptedAnalyzer {
        outcomes: Mutex<HashMap<ProjectId, ProjectAnalysis>>,
        failing: Mutex<HashSet<ProjectId>>,
        requests: Mutex<Vec<AnalysisRequest>>,
    }

    impl ScriptedAnalyzer {
        /// Every project reports no changes
        pub fn new() -> Self {
            Self::default()
        }

        /// Script the analysis of `project`
        pub fn set(&self, project: ProjectId, analysis: ProjectAnalysis) {
            self.outcomes.lock().insert(project, analysis);
        }

        /// Script only the build state of `project`
        pub fn set_state(&self, project: ProjectId, state: enc_common::BuildState) {
            self.set(project, ProjectAnalysis { state, ..Default::default() });
        }

        /// Make the analysis of `project` fail
        pub fn fail(&self, project: ProjectId) {
            self.failing.lock().insert(project);
        }

        /// Requests received so far
        pub fn requests(&self) -> Vec<AnalysisRequest> {
            self.requests.lock().clone()
        }
    }

    impl EditSessionAnalyzer for ScriptedAnalyzer {
        fn analyze(
            &self,
            request: AnalysisRequest,
        ) -> BoxFuture<'static, eyre::Result<ProjectAnalysis>> {
            let project = request.project.id;
            self.requests.lock().push(request);

            if self.failing.lock().contains(&project) {
                return future::ready(Err(eyre::eyre!("analyzer crashed on {project}"))).boxed();
            }
            let outcome = self.outcomes.lock().get(&project).cloned().unwrap_or_default();
            future::ready(Ok(outcome)).boxed()
        }
    }

    /// What the emitter produces for a project
    #[derive(Debug, Clone, Default)]
    pub struct EmitPlan {
        /// Error diagnostics; a non-empty list fails the emit
        pub errors: Vec<Diagnostic>,
        /// Method tokens whose bodies changed
        pub updated_methods: Vec<u32>,
        /// Regions reported for the generation
        pub regions: Vec<(MethodId, NonRemappableRegion)>,
        /// Sequence point edits
        pub sequence_points: Vec<SequencePointUpdates>,
        /// Active statement remaps
        pub active_statements: Vec<ActiveStatementRemap>,
    }

    /// Runs while the emitter is working
    pub type EmitHook = Arc<dyn Fn() + Send + Sync>;

    /// Emitter answering with a per-project plan
    ///
    /// Successful emits hand out the next baseline carrying the project
    /// version they were emitted from.
    #[derive(Default)]
    pub struct ScriptedEmitter {
        plans: Mutex<HashMap<ProjectId, EmitPlan>>,
        hooks: Mutex<HashMap<ProjectId, EmitHook>>,
        emitted: Mutex<Vec<(ProjectId, u32)>>,
    }

    impl std::fmt::Debug for ScriptedEmitter {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("ScriptedEmitter").field("emitted", &*self.emitted.lock()).finish()
        }
    }

    impl ScriptedEmitter {
        /// Every emit succeeds with an empty delta
        pub fn new() -> Self {
            Self::default()
        }

        /// Script the emit of `project`
        pub fn set_plan(&self, project: ProjectId, plan: EmitPlan) {
            self.plans.lock().insert(project, plan);
        }

        /// Run `hook` during every emit of `project`
        pub fn set_hook(&self, project: ProjectId, hook: EmitHook) {
            self.hooks.lock().insert(project, hook);
        }

        /// `(project, base generation)` of every emit so far
        pub fn emitted(&self) -> Vec<(ProjectId, u32)> {
            self.emitted.lock().clone()
        }
    }

    impl DeltaEmitter for ScriptedEmitter {
        fn emit_delta(
            &self,
            project: ProjectSnapshot,
            baseline: EmitBaseline,
        ) -> BoxFuture<'static, eyre::Result<Delta>> {
            self.emitted.lock().push((project.id, baseline.generation()));
            let plan = self.plans.lock().get(&project.id).cloned().unwrap_or_default();
            let hook = self.hooks.lock().get(&project.id).cloned();
            if let Some(hook) = hook {
                hook();
            }

            let success = plan.errors.is_empty();
            let marker = baseline.generation() as u8 + 1;
            let delta = Delta {
                module: baseline.module_id(),
                il_delta: vec![marker],
                metadata_delta: vec![marker],
                pdb_delta: vec![marker],
                updated_methods: plan.updated_methods,
                sequence_points: plan.sequence_points,
                active_statements: plan.active_statements,
                non_remappable_regions: plan.regions,
                emit_result: EmitResult {
                    success,
                    diagnostics: plan.errors,
                    baseline: success.then(|| baseline.next(Arc::new(project.version))),
                },
            };
            future::ready(Ok(delta)).boxed()
        }
    }

    /// Update sink recording what reached the debuggee
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        /// Calls in order
        pub calls: Vec<&'static str>,
        /// Modules patched
        pub modules: Vec<ModuleId>,
        /// IL deltas pushed
        pub il_deltas: Vec<Vec<u8>>,
        /// Exception ranges pushed
        pub exception_regions: Vec<ExceptionRegionUpdate>,
        /// Active statement remaps pushed
        pub active_statements: Vec<ActiveStatementRemap>,
        /// Reject the named call
        pub fail_at: Option<&'static str>,
    }

    impl RecordingSink {
        /// Sink accepting everything
        pub fn new() -> Self {
            Self::default()
        }

        /// Sink rejecting the named call
        pub fn failing_at(call: &'static str) -> Self {
            Self { fail_at: Some(call), ..Default::default() }
        }

        fn step(&mut self, call: &'static str) -> eyre::Result<()> {
            if self.fail_at == Some(call) {
                eyre::bail!("debuggee rejected {call}");
            }
            self.calls.push(call);
            Ok(())
        }
    }

    impl UpdateSink for RecordingSink {
        fn set_deltas(
            &mut self,
            module: ModuleId,
            il_delta: &[u8],
            _metadata_delta: &[u8],
            _pdb_delta: &[u8],
            _updated_methods: &[u32],
        ) -> eyre::Result<()> {
            self.step("set_deltas")?;
            self.modules.push(module);
            self.il_deltas.push(il_delta.to_vec());
            Ok(())
        }

        fn set_sequence_points(&mut self, _updates: &[SequencePointUpdates]) -> eyre::Result<()> {
            self.step("set_sequence_points")
        }

        fn set_exception_regions(
            &mut self,
            regions: &[ExceptionRegionUpdate],
        ) -> eyre::Result<()> {
            self.step("set_exception_regions")?;
            self.exception_regions.extend_from_slice(regions);
            Ok(())
        }

        fn set_active_statements(&mut self, remaps: &[ActiveStatementRemap]) -> eyre::Result<()> {
            self.step("set_active_statements")?;
            self.active_statements.extend_from_slice(remaps);
            Ok(())
        }
    }

    /// Fault reporter remembering every report
    #[derive(Debug, Default)]
    pub struct RecordingFaultReporter {
        faults: Mutex<Vec<(String, String)>>,
    }

    impl RecordingFaultReporter {
        /// No fault yet
        pub fn new() -> Self {
            Self::default()
        }

        /// `(operation, message)` of every fault
        pub fn faults(&self) -> Vec<(String, String)> {
            self.faults.lock().clone()
        }

        /// Operations that reported a fault, deduplicated
        pub fn operations(&self) -> BTreeSet<String> {
            self.faults.lock().iter().map(|(operation, _)| operation.clone()).collect()
        }
    }

    impl FaultReporter for RecordingFaultReporter {
        fn report_fault(&self, operation: &str, error: &eyre::Report) {
            self.faults.lock().push((operation.to_string(), format!("{error:#}")));
        }
    }
}

/// A controller wired to fakes
pub mod harness {
    use enc_common::{ModuleId, ProjectId};
    use enc_engine::{
        Collaborators, DebugSessionController, DiagnosticStore, EngineConfig, HostFacade,
    };

    use super::{fakes::*, *};

    /// A [`DebugSessionController`] and the fakes behind it
    pub struct Harness {
        /// The controller under test
        pub controller: Arc<DebugSessionController>,
        /// Workspace
        pub workspace: Arc<FakeWorkspace>,
        /// Identity reader
        pub identity: Arc<FakeIdentityReader>,
        /// Debuggee
        pub debuggee: Arc<FakeDebuggee>,
        /// Metadata provider
        pub metadata: Arc<FakeMetadataProvider>,
        /// Analyzer
        pub analyzer: Arc<ScriptedAnalyzer>,
        /// Emitter
        pub emitter: Arc<ScriptedEmitter>,
        /// Diagnostics
        pub diagnostics: Arc<DiagnosticStore>,
        /// Faults
        pub faults: Arc<RecordingFaultReporter>,
    }

    impl Harness {
        /// Harness with telemetry logging off
        pub fn new() -> Self {
            Self::with_config(EngineConfig::default().with_log_telemetry(false))
        }

        /// Harness with `config`
        pub fn with_config(config: EngineConfig) -> Self {
            super::init::init_test_environment();

            let workspace = Arc::new(FakeWorkspace::new());
            let identity = Arc::new(FakeIdentityReader::new());
            let debuggee = Arc::new(FakeDebuggee::new());
            let metadata = Arc::new(FakeMetadataProvider::new());
            let analyzer = Arc::new(ScriptedAnalyzer::new());
            let emitter = Arc::new(ScriptedEmitter::new());
            let diagnostics = Arc::new(DiagnosticStore::new());
            let faults = Arc::new(RecordingFaultReporter::new());

            let collaborators = Collaborators {
                workspace: workspace.clone(),
                debuggee: debuggee.clone(),
                metadata: metadata.clone(),
                analyzer: analyzer.clone(),
                emitter: emitter.clone(),
                identity_reader: identity.clone(),
                diagnostics: diagnostics.clone(),
                faults: faults.clone(),
            };
            let controller = Arc::new(
                DebugSessionController::new(config, collaborators)
                    .expect("reader worker should start"),
            );

            Self {
                controller,
                workspace,
                identity,
                debuggee,
                metadata,
                analyzer,
                emitter,
                diagnostics,
                faults,
            }
        }

        /// Module id derived from a project id
        pub fn module_for(project: ProjectId) -> ModuleId {
            let mut bytes = [0u8; 16];
            bytes[..4].copy_from_slice(&project.0.to_be_bytes());
            bytes[15] = 0xEC;
            ModuleId::from_bytes(bytes)
        }

        /// Add a project whose module is built and loaded
        pub fn add_project(&self, id: u32, name: &str) -> (ProjectId, ModuleId) {
            let project = ProjectId(id);
            let module = Self::module_for(project);
            let snapshot = project_snapshot(project, name);
            self.identity.set_output(snapshot.output_path.clone(), OutputState::Module(module));
            self.workspace.add_project(snapshot);
            self.metadata.load(module);
            (project, module)
        }

        /// Add a project whose output cannot be read
        pub fn add_unbuilt_project(&self, id: u32, name: &str) -> ProjectId {
            let project = ProjectId(id);
            self.workspace.add_project(project_snapshot(project, name));
            project
        }

        /// Host facade of `project`
        pub fn facade(&self, project: ProjectId) -> HostFacade {
            HostFacade::new(self.controller.clone(), project)
        }
    }

    impl Default for Harness {
        fn default() -> Self {
            Self::new()
        }
    }
}
