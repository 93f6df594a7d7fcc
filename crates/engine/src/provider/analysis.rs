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

use std::sync::Arc;

use derive_more::{Display, From};
use enc_common::{
    ActiveStatement, ActiveStatementRemap, BuildState, Diagnostic, EditSessionId, MethodId,
    ModuleId, NonRemappableRegion, SequencePointUpdates,
};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::{
    baseline::EmitBaseline,
    ledger::NonRemappableRegionLedger,
    provider::{ProjectSnapshot, SolutionSnapshot},
};

/// Numeric kind of an edit the runtime cannot apply in place.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    From,
    Serialize,
    Deserialize,
)]
#[display("rude#{_0}")]
pub struct RudeEditKind(pub u16);

/// Input of one project analysis.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    /// Edit session the analysis belongs to.
    pub edit_session: EditSessionId,
    /// Solution as it was when the debuggee broke.
    pub base_solution: Arc<SolutionSnapshot>,
    /// Current state of the analyzed project.
    pub project: ProjectSnapshot,
    /// Active statements of the edit session.
    pub active_statements: Arc<Vec<ActiveStatement>>,
    /// Regions committed by earlier generations of this debug session.
    pub non_remappable_regions: Arc<NonRemappableRegionLedger>,
}

/// Outcome of analyzing one project against the edit session base.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectAnalysis {
    /// Summary of the changes.
    pub state: BuildState,
    /// Kinds of the rude edits found, one entry per occurrence.
    pub rude_edits: Vec<RudeEditKind>,
    /// Diagnostics produced by the analysis.
    pub diagnostics: Vec<Diagnostic>,
}

/// Classifies source changes of a project.
pub trait EditSessionAnalyzer: Send + Sync {
    /// Analyze `request.project` against the base solution.
    fn analyze(&self, request: AnalysisRequest) -> BoxFuture<'static, eyre::Result<ProjectAnalysis>>;
}

/// Result of emitting a delta.
#[derive(Debug, Clone, Default)]
pub struct EmitResult {
    /// Whether emit succeeded.
    pub success: bool,
    /// Emit diagnostics, errors included.
    pub diagnostics: Vec<Diagnostic>,
    /// Baseline for the next generation. Present on success.
    pub baseline: Option<EmitBaseline>,
}

/// Bytes and side tables of one emitted generation.
#[derive(Debug, Clone)]
pub struct Delta {
    /// Module the delta patches.
    pub module: ModuleId,
    /// IL delta bytes.
    pub il_delta: Vec<u8>,
    /// Metadata delta bytes.
    pub metadata_delta: Vec<u8>,
    /// Symbol delta bytes.
    pub pdb_delta: Vec<u8>,
    /// Method definition tokens whose bodies changed.
    pub updated_methods: Vec<u32>,
    /// Sequence point line edits.
    pub sequence_points: Vec<SequencePointUpdates>,
    /// Remapped active statements.
    pub active_statements: Vec<ActiveStatementRemap>,
    /// Regions of old method versions that cannot be remapped.
    pub non_remappable_regions: Vec<(MethodId, NonRemappableRegion)>,
    /// Emit outcome.
    pub emit_result: EmitResult,
}

/// Emits deltas against a baseline.
pub trait DeltaEmitter: Send + Sync {
    /// Emit the changes of `project` on top of `baseline`.
    fn emit_delta(
        &self,
        project: ProjectSnapshot,
        baseline: EmitBaseline,
    ) -> BoxFuture<'static, eyre::Result<Delta>>;
}
