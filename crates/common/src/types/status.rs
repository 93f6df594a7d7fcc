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

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Debugging state of the host, one value per debug session.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DebuggingState {
    /// No program is being debugged.
    #[default]
    Design,
    /// The debuggee is executing.
    Run,
    /// The debuggee is suspended.
    Break,
}

/// Outcome of analysing the pending source changes of a project.
///
/// `ValidChanges` and `ValidInsignificantChanges` behave identically; the
/// distinction only shows up in telemetry.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildState {
    /// Nothing to apply.
    #[default]
    NoChanges,
    /// The changed code does not compile.
    CompilationErrors,
    /// The changes cannot be applied to a running process.
    RudeEdits,
    /// The changes can be applied.
    ValidChanges,
    /// The changes can be applied but do not affect generated code.
    ValidInsignificantChanges,
}

impl BuildState {
    /// Whether a delta may be built for this state.
    pub fn is_applicable(self) -> bool {
        matches!(self, Self::ValidChanges | Self::ValidInsignificantChanges)
    }

    /// Whether the state represents some kind of change.
    pub fn has_changes(self) -> bool {
        self != Self::NoChanges
    }
}

/// Why edits to a project's sources are currently rejected.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadOnlyReason {
    /// Edits are allowed once the session reaches break state.
    #[default]
    None,
    /// The debuggee is executing.
    Running,
    /// The debuggee stopped on an unhandled exception.
    StoppedAtException,
    /// The project's metadata could not be read from the debuggee.
    MetadataNotAvailable,
    /// The project's module was not loaded when debugging started.
    NotLoaded,
}

impl ReadOnlyReason {
    /// Whether edits are permitted.
    pub fn allows_edits(self) -> bool {
        self == Self::None
    }

    /// User-facing explanation for a rejected edit, or `None` when edits are
    /// allowed. `solution_load_deferred` selects the wording for `NotLoaded`.
    pub fn message(self, solution_load_deferred: bool) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Running => Some(
                "Changes are not allowed while code is running or if debugging was started \
                 with Edit and Continue disabled.",
            ),
            Self::StoppedAtException => Some(
                "Changes are not allowed when the debugger has been stopped at an unhandled \
                 exception.",
            ),
            Self::MetadataNotAvailable => Some(
                "Changes are not allowed because the project was not built when debugging \
                 started.",
            ),
            Self::NotLoaded if solution_load_deferred => Some(
                "Changes are not allowed because the project was not loaded when debugging \
                 started and the solution load is deferred.",
            ),
            Self::NotLoaded => Some(
                "Changes are not allowed because the project's module was not loaded when \
                 debugging started.",
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_state_applicability() {
        assert!(BuildState::ValidChanges.is_applicable());
        assert!(BuildState::ValidInsignificantChanges.is_applicable());
        assert!(!BuildState::RudeEdits.is_applicable());
        assert!(!BuildState::CompilationErrors.is_applicable());
        assert!(!BuildState::NoChanges.has_changes());
    }

    #[test]
    fn test_read_only_messages_are_reason_specific() {
        assert!(ReadOnlyReason::None.message(false).is_none());
        let running = ReadOnlyReason::Running.message(false).unwrap();
        let exception = ReadOnlyReason::StoppedAtException.message(false).unwrap();
        assert!(running.contains("running"));
        assert!(exception.contains("unhandled exception"));
        assert_ne!(
            ReadOnlyReason::NotLoaded.message(true),
            ReadOnlyReason::NotLoaded.message(false)
        );
    }
}
