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

use enc_common::{
    ActiveStatementRemap, Diagnostic, DiagnosticKey, ExceptionRegionUpdate, ModuleId,
    ModuleUpdate, SequencePointUpdates,
};
use tracing::error;

/// Host-provided channel into the live debuggee.
///
/// The pieces of one update arrive in call order: deltas, sequence points,
/// exception regions, then active statements.
pub trait UpdateSink {
    /// Push the IL, metadata and symbol deltas.
    fn set_deltas(
        &mut self,
        module: ModuleId,
        il_delta: &[u8],
        metadata_delta: &[u8],
        pdb_delta: &[u8],
        updated_methods: &[u32],
    ) -> eyre::Result<()>;

    /// Push the sequence point line edits.
    fn set_sequence_points(&mut self, updates: &[SequencePointUpdates]) -> eyre::Result<()>;

    /// Push the remapped exception handler ranges.
    fn set_exception_regions(&mut self, regions: &[ExceptionRegionUpdate]) -> eyre::Result<()>;

    /// Push the remapped active statements.
    fn set_active_statements(&mut self, remaps: &[ActiveStatementRemap]) -> eyre::Result<()>;
}

/// Push every piece of `update` into `sink`, stopping at the first failure.
pub fn push_module_update(sink: &mut dyn UpdateSink, update: &ModuleUpdate) -> eyre::Result<()> {
    sink.set_deltas(
        update.module,
        &update.il_delta,
        &update.metadata_delta,
        &update.pdb_delta,
        &update.updated_methods,
    )?;
    sink.set_sequence_points(&update.sequence_points)?;
    sink.set_exception_regions(&update.exception_regions)?;
    sink.set_active_statements(&update.active_statements)?;
    Ok(())
}

/// Receives per-module diagnostics.
pub trait DiagnosticSink: Send + Sync {
    /// Replace the diagnostics of `module` under `key`.
    fn report(&self, key: DiagnosticKey, module: ModuleId, diagnostics: Vec<Diagnostic>);

    /// Remove the diagnostics of `module` under `key`.
    fn clear(&self, key: DiagnosticKey, module: ModuleId);
}

/// Receives unexpected failures the engine swallowed.
pub trait FaultReporter: Send + Sync {
    /// Report a failure of `operation`.
    fn report_fault(&self, operation: &str, error: &eyre::Report);
}

/// Reports faults to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingFaultReporter;

impl FaultReporter for TracingFaultReporter {
    fn report_fault(&self, operation: &str, error: &eyre::Report) {
        error!(operation, "Non-fatal fault: {error:?}");
    }
}
