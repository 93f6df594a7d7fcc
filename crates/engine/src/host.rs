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

//! Synchronous, infallible surface for the host debugger.
//!
//! The host ignores most return codes, so nothing may escape a call-in:
//! expected refusals become [`HostStatus::False`], everything else (panics
//! included) is reported once to the [`FaultReporter`](crate::provider::FaultReporter)
//! and becomes [`HostStatus::Failed`].

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use enc_common::{BuildState, Diagnostic, ProjectId};
use tracing::{debug, warn};

use crate::{
    bridge::wait_without_dispatch,
    coordinator::ApplyError,
    provider::UpdateSink,
    session::{BreakContext, DebugSessionController, SessionError},
};

/// Status returned to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostStatus {
    /// The call did what was asked.
    Ok,
    /// The call was refused for an expected reason.
    False,
    /// The call failed internally.
    Failed,
}

/// One project's view of the [`DebugSessionController`].
#[derive(Debug, Clone)]
pub struct HostFacade {
    controller: Arc<DebugSessionController>,
    project: ProjectId,
}

impl HostFacade {
    /// Facade for `project`.
    pub fn new(controller: Arc<DebugSessionController>, project: ProjectId) -> Self {
        Self { controller, project }
    }

    /// The project this facade speaks for.
    pub fn project(&self) -> ProjectId {
        self.project
    }

    /// The shared controller.
    pub fn controller(&self) -> &Arc<DebugSessionController> {
        &self.controller
    }

    /// The debugger started.
    pub fn start_debugging(&self) -> HostStatus {
        self.guard("start_debugging", || {
            Ok(self.session_status(self.controller.start_debugging(self.project)))
        })
    }

    /// The debuggee suspended.
    pub fn enter_break_state(&self, context: BreakContext) -> HostStatus {
        self.guard("enter_break_state", || {
            let outcome =
                wait_without_dispatch(self.controller.enter_break_state(self.project, context))?;
            Ok(self.session_status(outcome))
        })
    }

    /// The debuggee resumed.
    pub fn exit_break_state(&self) -> HostStatus {
        self.guard("exit_break_state", || {
            Ok(self.session_status(self.controller.exit_break_state(self.project)))
        })
    }

    /// The debugger stopped.
    pub fn stop_debugging(&self) -> HostStatus {
        self.guard("stop_debugging", || {
            Ok(self.session_status(self.controller.stop_debugging(self.project)))
        })
    }

    /// Summarize the project's pending changes.
    pub fn get_build_state(&self) -> (HostStatus, BuildState) {
        let mut state = BuildState::NoChanges;
        let status = self.guard("get_build_state", || {
            match wait_without_dispatch(self.controller.get_build_state(self.project))? {
                Ok(summary) => {
                    state = summary;
                    Ok(HostStatus::Ok)
                }
                Err(err) => self.apply_status(err),
            }
        });
        (status, state)
    }

    /// Emit the project's changes and push them into the debuggee.
    pub fn build_for_enc(&self, sink: &mut dyn UpdateSink) -> HostStatus {
        self.guard("build_for_enc", || {
            match wait_without_dispatch(self.controller.build_for_enc(self.project, sink))? {
                Ok(applied) => {
                    debug!(project = %self.project, generation = applied.generation, "Update built");
                    Ok(HostStatus::Ok)
                }
                Err(err) => {
                    if !err.is_expected() {
                        self.report_cannot_apply(&err);
                    }
                    self.apply_status(err)
                }
            }
        })
    }

    /// The host activated the pushed update.
    pub fn apply_succeeded(&self) -> HostStatus {
        self.guard("apply_succeeded", || {
            match wait_without_dispatch(self.controller.apply_succeeded(self.project))? {
                Ok(_) => Ok(HostStatus::Ok),
                Err(err) => self.apply_status(err),
            }
        })
    }

    /// User-facing message when edits to the project are rejected.
    pub fn read_only_message(&self) -> Option<&'static str> {
        self.controller.read_only_message(self.project)
    }

    fn session_status(&self, outcome: Result<(), SessionError>) -> HostStatus {
        match outcome {
            Ok(()) => HostStatus::Ok,
            Err(err) if err.is_expected() => {
                warn!(project = %self.project, "Call-in refused: {err}");
                HostStatus::False
            }
            Err(err) => {
                self.controller.faults().report_fault("session", &eyre::Report::new(err));
                HostStatus::Failed
            }
        }
    }

    fn apply_status(&self, err: ApplyError) -> eyre::Result<HostStatus> {
        if err.is_expected() {
            debug!(project = %self.project, "Call-in refused: {err}");
            Ok(HostStatus::False)
        } else {
            Err(err.into())
        }
    }

    fn report_cannot_apply(&self, err: &ApplyError) {
        let (Some(edit), Some(module)) =
            (self.controller.edit_session(), self.controller.module_of(self.project))
        else {
            return;
        };
        self.controller.diagnostics().report(
            edit.diagnostic_key(),
            module,
            vec![Diagnostic::cannot_apply_changes(err)],
        );
    }

    /// Run `body`, turning errors and panics into [`HostStatus::Failed`].
    fn guard(
        &self,
        operation: &'static str,
        body: impl FnOnce() -> eyre::Result<HostStatus>,
    ) -> HostStatus {
        let report = match catch_unwind(AssertUnwindSafe(body)) {
            Ok(Ok(status)) => return status,
            Ok(Err(report)) => report,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                eyre::eyre!("panicked: {message}")
            }
        };

        self.controller.faults().report_fault(operation, &report);
        HostStatus::Failed
    }
}
