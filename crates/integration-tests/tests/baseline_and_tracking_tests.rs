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

//! Baseline cache and active statement tests against the fake runtime

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use enc_common::{
    ActiveStatement, ActiveStatementFlags, BuildState, InstructionId, LinePositionSpan, MethodId,
    ModuleId, ThreadId,
};
use enc_engine::{
    BaselineCache, BreakContext, MethodDebugInfo, PortableSymbols, ReaderWorker, StoppedFrame,
    TrackerError,
};
use enc_integration_tests::test_utils::{fakes::FakeMetadataProvider, harness::Harness, init};

fn instruction(module: ModuleId, token: u32, offset: u32) -> InstructionId {
    InstructionId::new(MethodId::new(module, token, 1), offset)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_lookup() {
    init::init_test_environment();
    let provider = Arc::new(FakeMetadataProvider::new());
    let module = ModuleId::from_bytes([0x42; 16]);
    provider.load(module);
    provider.set_latency(Duration::from_millis(50));

    let worker = ReaderWorker::spawn("test-reader").unwrap();
    let cache = BaselineCache::new(provider.clone(), worker);

    let callers: Vec<_> = (0..32)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_or_create(module).await })
        })
        .collect();

    let mut instances = Vec::new();
    for caller in callers {
        instances.push(caller.await.unwrap().unwrap().unwrap());
    }

    assert_eq!(provider.lookups(), 1);
    assert!(instances.iter().all(|cached| Arc::ptr_eq(cached, &instances[0])));
    assert_eq!(provider.pending_callbacks(module), 1);
}

#[tokio::test]
async fn test_unload_evicts_and_next_load_creates_fresh_baseline() {
    init::init_test_environment();
    let provider = Arc::new(FakeMetadataProvider::new());
    let module = ModuleId::from_bytes([0x43; 16]);
    let mut symbols = PortableSymbols::new();
    symbols.insert(
        0x0600_0002,
        MethodDebugInfo { local_slots: vec!["sum".into()], ..Default::default() },
    );
    provider.load_with_symbols(module, Some(symbols));

    let cache = BaselineCache::new(provider.clone(), ReaderWorker::spawn("test-reader").unwrap());
    let first = cache.get_or_create(module).await.unwrap().unwrap();
    let info = first.method_debug_info(0x0600_0002).await.unwrap().unwrap();
    assert_eq!(info.local_slots, vec!["sum".to_string()]);
    assert!(first.metadata().is_ok());

    provider.unload(module);
    assert!(!first.is_alive());
    assert!(first.metadata().is_err());
    assert!(cache.get(module).is_none());
    assert!(cache.get_or_create(module).await.unwrap().is_none());

    provider.load(module);
    let second = cache.get_or_create(module).await.unwrap().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(provider.lookups(), 3);
}

#[tokio::test]
async fn test_threads_at_same_instruction_collapse() {
    let h = Harness::new();
    let (project, module) = h.add_project(1, "app");
    let shared = instruction(module, 42, 10);
    let caller = instruction(module, 43, 4);
    let unmapped = instruction(module, 44, 0);

    let up_to_date = ActiveStatementFlags::METHOD_UP_TO_DATE;
    let leaf = ActiveStatementFlags::IS_LEAF_FRAME | up_to_date;
    h.debuggee.stop_thread(
        ThreadId(1),
        vec![
            StoppedFrame { instruction: shared, flags: leaf },
            StoppedFrame { instruction: caller, flags: up_to_date },
        ],
    );
    h.debuggee.stop_thread(
        ThreadId(2),
        vec![
            StoppedFrame { instruction: unmapped, flags: leaf },
            StoppedFrame { instruction: shared, flags: up_to_date },
        ],
    );
    h.debuggee.map(shared, "src/app.cs", LinePositionSpan::new(10, 8, 10, 30));
    h.debuggee.map(caller, "src/app.cs", LinePositionSpan::new(20, 8, 20, 16));

    h.controller.start_debugging(project).unwrap();
    h.controller.enter_break_state(project, BreakContext::default()).await.unwrap();

    let edit = h.controller.edit_session().unwrap();
    let statements = edit.active_statements().await.unwrap();
    assert_eq!(statements.len(), 2);

    let collapsed = statements.iter().find(|s| s.instruction == shared).unwrap();
    assert_eq!(collapsed.threads, BTreeSet::from([ThreadId(1), ThreadId(2)]));
    assert!(collapsed.is_leaf());
    assert!(!collapsed.is_stale());
    assert_eq!(collapsed.span.start.line, 10);

    // Resolved once per distinct instruction, and only once per edit session.
    edit.active_statements().await.unwrap();
    assert_eq!(h.debuggee.resolutions(), 3);

    h.analyzer.set_state(project, BuildState::ValidChanges);
    h.controller.get_build_state(project).await.unwrap();
    let requests = h.analyzer.requests();
    assert!(Arc::ptr_eq(&requests[0].active_statements, &statements));
}

#[tokio::test]
async fn test_host_supplied_statements_skip_the_debuggee() {
    let h = Harness::new();
    let (project, module) = h.add_project(1, "app");
    let supplied = ActiveStatement {
        instruction: instruction(module, 42, 0),
        document: "src/app.cs".into(),
        span: LinePositionSpan::new(3, 0, 3, 12),
        flags: ActiveStatementFlags::IS_LEAF_FRAME,
        threads: BTreeSet::from([ThreadId(7)]),
    };

    h.controller.start_debugging(project).unwrap();
    let context = BreakContext::default().with_active_statements(vec![supplied.clone()]);
    h.controller.enter_break_state(project, context).await.unwrap();

    let statements = h.controller.edit_session().unwrap().active_statements().await.unwrap();
    assert_eq!(*statements, vec![supplied]);
    assert_eq!(h.debuggee.resolutions(), 0);
}

#[tokio::test]
async fn test_tracking_is_cancelled_with_the_edit_session() {
    let h = Harness::new();
    let (project, module) = h.add_project(1, "app");
    h.debuggee.stop_thread(
        ThreadId(1),
        vec![StoppedFrame {
            instruction: instruction(module, 42, 0),
            flags: ActiveStatementFlags::IS_LEAF_FRAME,
        }],
    );

    h.debuggee.set_latency(Duration::from_secs(10));

    h.controller.start_debugging(project).unwrap();
    h.controller.enter_break_state(project, BreakContext::default()).await.unwrap();
    let edit = h.controller.edit_session().unwrap();
    h.controller.exit_break_state(project).unwrap();

    assert!(edit.is_ended());
    assert_eq!(edit.active_statements().await, Err(TrackerError::Cancelled));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tracking_starts_when_the_edit_session_begins() {
    let h = Harness::new();
    let (project, module) = h.add_project(1, "app");
    let at = instruction(module, 42, 0);
    h.debuggee.stop_thread(
        ThreadId(1),
        vec![StoppedFrame { instruction: at, flags: ActiveStatementFlags::IS_LEAF_FRAME }],
    );
    h.debuggee.map(at, "src/app.cs", LinePositionSpan::new(10, 8, 10, 30));

    h.controller.start_debugging(project).unwrap();
    h.controller.enter_break_state(project, BreakContext::default()).await.unwrap();

    // Nobody has asked for active statements yet.
    tokio::time::timeout(Duration::from_secs(5), async {
        while h.debuggee.resolutions() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(h.debuggee.resolutions(), 1);

    let statements = h.controller.edit_session().unwrap().active_statements().await.unwrap();
    assert_eq!(statements.len(), 1);
    assert_eq!(h.debuggee.resolutions(), 1);
}
