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

use std::{fmt, path::PathBuf};

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{DebugSessionId, EditSessionId, LinePositionSpan, ModuleId};

/// Diagnostic id reported when the module being patched has been unloaded.
pub const MODULE_UNLOADED_ID: &str = "ENC1001";

/// Diagnostic id reported when applying changes failed for an internal reason.
pub const CANNOT_APPLY_CHANGES_ID: &str = "ENC1002";

/// Diagnostic severity, ordered from least to most severe.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Severity {
    /// Not shown to the user.
    Hidden,
    /// Informational.
    Info,
    /// Warning.
    Warning,
    /// Error.
    Error,
}

/// A message produced by the emitter or by the engine itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable diagnostic identifier.
    pub id: String,
    /// Severity.
    pub severity: Severity,
    /// Human readable message.
    pub message: String,
    /// Document the diagnostic points at, if any.
    pub document: Option<PathBuf>,
    /// Span within `document`.
    pub span: Option<LinePositionSpan>,
}

impl Diagnostic {
    /// Create an error diagnostic without a location.
    pub fn error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            severity: Severity::Error,
            message: message.into(),
            document: None,
            span: None,
        }
    }

    /// Attach a source location.
    pub fn with_location(mut self, document: impl Into<PathBuf>, span: LinePositionSpan) -> Self {
        self.document = Some(document.into());
        self.span = Some(span);
        self
    }

    /// The module can no longer be patched because it was unloaded.
    pub fn module_unloaded(module: ModuleId) -> Self {
        Self::error(
            MODULE_UNLOADED_ID,
            format!("Changes can't be applied: module {module} has been unloaded."),
        )
    }

    /// Generic failure carrying the text of an internal error.
    pub fn cannot_apply_changes(details: impl fmt::Display) -> Self {
        Self::error(CANNOT_APPLY_CHANGES_ID, format!("Could not apply changes: {details}"))
    }

    /// Whether the diagnostic is an error.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Key under which diagnostics are stored for later display and logging.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct DiagnosticKey {
    /// Debug session the diagnostics belong to.
    pub debug_session: DebugSessionId,
    /// Edit session the diagnostics belong to.
    pub edit_session: EditSessionId,
}

impl fmt::Display for DiagnosticKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.debug_session, self.edit_session)
    }
}
