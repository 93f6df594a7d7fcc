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

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use enc_common::{BuildState, DebugSessionId, Diagnostic, EditSessionId};
use serde::Serialize;
use tracing::{info, warn};

use crate::provider::RudeEditKind;

/// Counters of one edit session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EditSessionTelemetry {
    /// Edit session the counters belong to.
    pub edit_session: Option<EditSessionId>,
    /// Some analysis reported compilation errors.
    pub had_compilation_errors: bool,
    /// Some analysis reported rude edits.
    pub had_rude_edits: bool,
    /// Some analysis reported applicable changes.
    pub had_valid_changes: bool,
    /// Some analysis reported changes that do not affect generated code.
    pub had_valid_insignificant_changes: bool,
    /// Occurrences of each rude edit kind.
    pub rude_edits: BTreeMap<u16, u32>,
    /// Ids of errors reported by failed emits.
    pub emit_error_ids: BTreeSet<String>,
    /// Generations committed.
    pub applied_generations: u32,
}

impl EditSessionTelemetry {
    pub(crate) fn new(edit_session: EditSessionId) -> Self {
        Self { edit_session: Some(edit_session), ..Default::default() }
    }

    pub(crate) fn record_analysis(&mut self, state: BuildState, rude_edits: &[RudeEditKind]) {
        match state {
            BuildState::NoChanges => {}
            BuildState::CompilationErrors => self.had_compilation_errors = true,
            BuildState::RudeEdits => self.had_rude_edits = true,
            BuildState::ValidChanges => self.had_valid_changes = true,
            BuildState::ValidInsignificantChanges => self.had_valid_insignificant_changes = true,
        }
        for kind in rude_edits {
            *self.rude_edits.entry(kind.0).or_default() += 1;
        }
    }

    pub(crate) fn record_emit_errors(&mut self, diagnostics: &[Diagnostic]) {
        self.emit_error_ids
            .extend(diagnostics.iter().filter(|d| d.is_error()).map(|d| d.id.clone()));
    }

    pub(crate) fn record_applied(&mut self) {
        self.applied_generations += 1;
    }

    /// Whether the session saw no change at all.
    pub fn is_empty(&self) -> bool {
        !(self.had_compilation_errors
            || self.had_rude_edits
            || self.had_valid_changes
            || self.had_valid_insignificant_changes)
    }

    /// Write the counters to the log as JSON.
    pub fn log(&self) {
        log_json("edit session", self);
    }
}

/// Counters of one debug session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugSessionTelemetry {
    /// Debug session the counters belong to.
    pub debug_session: DebugSessionId,
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// Edit sessions started.
    pub edit_session_count: u32,
    /// Edit sessions that saw no change.
    pub empty_edit_session_count: u32,
    /// Generations committed across every edit session.
    pub applied_generations: u32,
    /// Counters of the non-empty edit sessions.
    pub edit_sessions: Vec<EditSessionTelemetry>,
}

impl DebugSessionTelemetry {
    pub(crate) fn new(debug_session: DebugSessionId) -> Self {
        Self {
            debug_session,
            started_at: Utc::now(),
            edit_session_count: 0,
            empty_edit_session_count: 0,
            applied_generations: 0,
            edit_sessions: Vec::new(),
        }
    }

    pub(crate) fn record_edit_session(&mut self, edit_session: EditSessionTelemetry) {
        self.edit_session_count += 1;
        self.applied_generations += edit_session.applied_generations;
        if edit_session.is_empty() {
            self.empty_edit_session_count += 1;
        } else {
            self.edit_sessions.push(edit_session);
        }
    }

    /// Write the counters to the log as JSON.
    pub fn log(&self) {
        log_json("debug session", self);
    }
}

fn log_json(kind: &str, counters: &impl Serialize) {
    match serde_json::to_string(counters) {
        Ok(json) => info!(target: "enc::telemetry", kind, "{json}"),
        Err(err) => warn!("Failed to serialize {kind} telemetry: {err}"),
    }
}
