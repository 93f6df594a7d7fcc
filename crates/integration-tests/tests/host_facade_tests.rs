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

//! Host facade tests
//!
//! The facade is what the debugger calls synchronously. These tests check the
//! status codes it returns and that internal failures, panics included, are
//! reported once and never escape.

use enc_common::{
    ActiveStatementRemap, BuildState, ExceptionRegionUpdate, ModuleId, SequencePointUpdates,
    CANNOT_APPLY_CHANGES_ID,
};
use enc_engine::{BreakContext, EngineConfig, HostStatus, UpdateSink};
use enc_integration_tests::test_utils::{fakes::RecordingSink, harness::Harness, logging};
use serial_test::serial;

struct PanickingSink;

impl UpdateSink for PanickingSink {
    fn set_deltas(
        &mut self,
        _module: ModuleId,
        _il_delta: &[u8],
        _metadata_delta: &[u8],
        _pdb_delta: &[u8],
        _updated_methods: &[u32],
    ) -> eyre::Result<()> {
        panic!("debuggee connection dropped");
    }

    fn set_sequence_points(&mut self, _updates: &[SequencePointUpdates]) -> eyre::Result<()> {
        Ok(())
    }

    fn set_exception_regions(&mut self, _regions: &[ExceptionRegionUpdate]) -> eyre::Result<()> {
        Ok(())
    }

    fn set_active_statements(&mut self, _remaps: &[ActiveStatementRemap]) -> eyre::Result<()> {
        Ok(())
    }
}

#[test]
fn test_full_cycle_statuses() {
    let h = Harness::new();
    let (project, _) = h.add_project(1, "app");
    let host = h.facade(project);

    assert_eq!(host.start_debugging(), HostStatus::Ok);
    assert_eq!(host.enter_break_state(BreakContext::default()), HostStatus::Ok);
    assert!(host.read_only_message().is_none());

    h.workspace.edit(project);
    h.analyzer.set_state(project, BuildState::ValidChanges);
    assert_eq!(host.get_build_state(), (HostStatus::Ok, BuildState::ValidChanges));

    let mut sink = RecordingSink::new();
    assert_eq!(host.build_for_enc(&mut sink), HostStatus::Ok);
    assert_eq!(sink.calls.len(), 4);
    assert_eq!(host.apply_succeeded(), HostStatus::Ok);

    assert_eq!(host.exit_break_state(), HostStatus::Ok);
    assert!(host.read_only_message().is_some());
    assert_eq!(host.stop_debugging(), HostStatus::Ok);
    assert!(h.faults.faults().is_empty());
}

#[test]
fn test_expected_refusals_return_false() {
    let h = Harness::new();
    let (project, _) = h.add_project(1, "app");
    let host = h.facade(project);

    assert_eq!(host.exit_break_state(), HostStatus::False);
    assert_eq!(host.start_debugging(), HostStatus::Ok);
    assert_eq!(host.start_debugging(), HostStatus::False);
    assert_eq!(host.build_for_enc(&mut RecordingSink::new()), HostStatus::False);

    assert_eq!(host.enter_break_state(BreakContext::default()), HostStatus::Ok);
    assert_eq!(host.enter_break_state(BreakContext::default()), HostStatus::False);
    assert_eq!(host.apply_succeeded(), HostStatus::False);

    assert_eq!(host.stop_debugging(), HostStatus::Ok);
    assert_eq!(host.stop_debugging(), HostStatus::False);
    assert!(h.faults.faults().is_empty());
}

#[test]
fn test_analyzer_failure_is_reported_as_fault() {
    let h = Harness::new();
    let (project, _) = h.add_project(1, "app");
    let host = h.facade(project);
    host.start_debugging();
    host.enter_break_state(BreakContext::default());
    h.analyzer.fail(project);

    assert_eq!(host.get_build_state(), (HostStatus::Failed, BuildState::NoChanges));
    let faults = h.faults.faults();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].0, "get_build_state");
    assert!(faults[0].1.contains("analyzer crashed"));
}

#[test]
fn test_rejected_update_reports_cannot_apply() {
    let h = Harness::new();
    let (project, module) = h.add_project(1, "app");
    let host = h.facade(project);
    host.start_debugging();
    host.enter_break_state(BreakContext::default());
    h.analyzer.set_state(project, BuildState::ValidChanges);
    host.get_build_state();

    let status = host.build_for_enc(&mut RecordingSink::failing_at("set_deltas"));
    assert_eq!(status, HostStatus::Failed);

    let edit = h.controller.edit_session().unwrap();
    let diagnostics = h.diagnostics.get(edit.diagnostic_key(), module);
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].id, CANNOT_APPLY_CHANGES_ID);
    assert!(diagnostics[0].message.contains("debuggee rejected set_deltas"));
    assert_eq!(h.faults.faults().len(), 1);
}

#[test]
fn test_panic_is_contained() {
    let h = Harness::new();
    let (project, _) = h.add_project(1, "app");
    let host = h.facade(project);
    host.start_debugging();
    host.enter_break_state(BreakContext::default());
    h.analyzer.set_state(project, BuildState::ValidChanges);
    host.get_build_state();

    assert_eq!(host.build_for_enc(&mut PanickingSink), HostStatus::Failed);
    let faults = h.faults.faults();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].0, "build_for_enc");
    assert!(faults[0].1.contains("debuggee connection dropped"));

    // The engine stays usable.
    assert_eq!(host.build_for_enc(&mut RecordingSink::new()), HostStatus::Ok);
    assert_eq!(host.apply_succeeded(), HostStatus::Ok);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_call_ins_from_multi_thread_runtime() {
    let h = Harness::new();
    let (project, _) = h.add_project(1, "app");
    let host = h.facade(project);

    assert_eq!(host.start_debugging(), HostStatus::Ok);
    assert_eq!(host.enter_break_state(BreakContext::default()), HostStatus::Ok);
    assert_eq!(host.get_build_state(), (HostStatus::Ok, BuildState::NoChanges));
}

#[tokio::test]
async fn test_blocking_call_in_on_current_thread_runtime_fails() {
    let h = Harness::new();
    let (project, _) = h.add_project(1, "app");
    let host = h.facade(project);

    assert_eq!(host.start_debugging(), HostStatus::Ok);
    assert_eq!(host.enter_break_state(BreakContext::default()), HostStatus::Failed);
    assert_eq!(h.faults.operations().into_iter().collect::<Vec<_>>(), vec!["enter_break_state"]);
    assert_eq!(h.controller.participant_counts(), Some((1, 0)));
}

#[test]
#[serial]
fn test_telemetry_is_logged_when_debugging_stops() {
    let h = Harness::with_config(EngineConfig::default().with_log_telemetry(true));
    let (project, _) = h.add_project(1, "app");
    let host = h.facade(project);

    let (_, capture) = logging::capture_events(|| {
        host.start_debugging();
        host.enter_break_state(BreakContext::default());
        h.analyzer.set_state(project, BuildState::ValidChanges);
        host.get_build_state();
        host.build_for_enc(&mut RecordingSink::new());
        host.apply_succeeded();
        host.exit_break_state();
        host.stop_debugging();
    });

    // One record for the edit session, then one for the debug session.
    let logged = capture.messages_for("enc::telemetry");
    assert_eq!(logged.len(), 2);
    let edit: serde_json::Value = serde_json::from_str(&logged[0]).unwrap();
    assert_eq!(edit["had_valid_changes"], true);
    assert_eq!(edit["applied_generations"], 1);

    let debug: serde_json::Value = serde_json::from_str(&logged[1]).unwrap();
    assert_eq!(debug["edit_session_count"], 1);
    assert_eq!(debug["applied_generations"], 1);
    assert_eq!(debug["edit_sessions"][0]["had_valid_changes"], true);
    assert!(capture.errors().is_empty());
}
