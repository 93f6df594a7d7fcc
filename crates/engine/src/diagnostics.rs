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

use dashmap::DashMap;
use enc_common::{DebugSessionId, Diagnostic, DiagnosticKey, ModuleId};
use tracing::{debug, warn};

use crate::provider::DiagnosticSink;

/// In-memory [`DiagnosticSink`].
#[derive(Debug, Default)]
pub struct DiagnosticStore {
    entries: DashMap<(DiagnosticKey, ModuleId), Vec<Diagnostic>>,
}

impl DiagnosticStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Diagnostics of `module` under `key`.
    pub fn get(&self, key: DiagnosticKey, module: ModuleId) -> Vec<Diagnostic> {
        self.entries.get(&(key, module)).map(|entry| entry.value().clone()).unwrap_or_default()
    }

    /// Every diagnostic stored for a debug session.
    pub fn for_debug_session(&self, session: DebugSessionId) -> Vec<Diagnostic> {
        self.entries
            .iter()
            .filter(|entry| entry.key().0.debug_session == session)
            .flat_map(|entry| entry.value().clone())
            .collect()
    }

    /// Remove everything stored for a debug session.
    pub fn clear_debug_session(&self, session: DebugSessionId) {
        self.entries.retain(|(key, _), _| key.debug_session != session);
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl DiagnosticSink for DiagnosticStore {
    fn report(&self, key: DiagnosticKey, module: ModuleId, diagnostics: Vec<Diagnostic>) {
        for diagnostic in diagnostics.iter().filter(|d| d.is_error()) {
            warn!(%key, %module, id = %diagnostic.id, "{}", diagnostic.message);
        }
        if diagnostics.is_empty() {
            self.entries.remove(&(key, module));
        } else {
            self.entries.insert((key, module), diagnostics);
        }
    }

    fn clear(&self, key: DiagnosticKey, module: ModuleId) {
        if self.entries.remove(&(key, module)).is_some() {
            debug!(%key, %module, "Cleared diagnostics");
        }
    }
}
