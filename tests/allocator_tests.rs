mod test_harness;

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use admissions_lite::assignment::{AssignmentAllocator, AssignmentState, MemoryStateStore};
use admissions_lite::config::AllocatorConfig;
use admissions_lite::error::AdmissionsError;
use test_harness::{abc_config, allocator, rows, FailingStateStore, ScriptedLeadStore};

#[tokio::test]
async fn test_rotation_without_workload_data() {
    let leads = ScriptedLeadStore::new();
    leads.fail_queries(true);
    let (allocator, _) = allocator(abc_config(), leads);

    let mut sequence = Vec::new();
    for _ in 0..4 {
        sequence.push(allocator.allocate_next("X").await.unwrap());
    }
    assert_eq!(sequence, vec!["A", "B", "C", "A"]);
}

#[tokio::test]
async fn test_full_rotation_from_any_start() {
    let (allocator, _) = allocator(abc_config(), ScriptedLeadStore::new());

    // Move the cursor off zero first.
    allocator.allocate_next("X").await.unwrap();

    let start = allocator.cursor("X").await.unwrap();
    let roster = allocator.current_roster().to_vec();
    let expected: Vec<String> = (0..roster.len())
        .map(|i| roster[(start + i) % roster.len()].clone())
        .collect();

    let mut actual = Vec::new();
    for _ in 0..roster.len() {
        actual.push(allocator.allocate_next("X").await.unwrap());
    }
    assert_eq!(actual, expected);
}

#[tokio::test]
async fn test_invalid_program_leaves_state_untouched() {
    let leads = ScriptedLeadStore::new();
    let (allocator, saved) = allocator(abc_config(), leads.clone());
    allocator.allocate_next("X").await.unwrap();
    allocator.allocate_next("Y").await.unwrap();
    allocator.allocate_next("Y").await.unwrap();

    let before = allocator.state().await;
    let saved_before = saved.saved().await;
    let queries_before = leads.query_count();

    let err = allocator.allocate_next("MBA").await.unwrap_err();
    match err {
        AdmissionsError::InvalidProgram { program, valid } => {
            assert_eq!(program, "MBA");
            assert_eq!(valid, "X, Y");
        }
        other => panic!("expected InvalidProgram, got {other:?}"),
    }

    assert_eq!(allocator.state().await, before);
    assert_eq!(saved.saved().await, saved_before);
    assert_eq!(leads.query_count(), queries_before);
}

#[tokio::test]
async fn test_reset_returns_to_first_member() {
    let (allocator, saved) = allocator(abc_config(), ScriptedLeadStore::new());
    allocator.allocate_next("X").await.unwrap();
    allocator.allocate_next("Y").await.unwrap();
    allocator.allocate_next("Y").await.unwrap();

    allocator.reset().await;
    allocator.reset().await;

    assert_eq!(allocator.state().await, AssignmentState::zeroed(["X", "Y"]));
    assert_eq!(saved.saved().await, Some(AssignmentState::zeroed(["X", "Y"])));
    assert_eq!(allocator.allocate_next("X").await.unwrap(), "A");
    assert_eq!(allocator.allocate_next("Y").await.unwrap(), "A");
}

#[tokio::test]
async fn test_programs_are_independent() {
    let (allocator, _) = allocator(abc_config(), ScriptedLeadStore::new());
    allocator.allocate_next("Y").await.unwrap();
    let y_cursor = allocator.cursor("Y").await;

    for _ in 0..7 {
        allocator.allocate_next("X").await.unwrap();
    }

    assert_eq!(allocator.cursor("Y").await, y_cursor);
    assert_eq!(allocator.cursor("X").await, Some(7 % 3));
}

#[tokio::test]
async fn test_overloaded_candidate_is_skipped() {
    // Candidate A sits at min + 3, B is at the minimum.
    let mut assignments = rows("A", "X", 4);
    assignments.extend(rows("B", "X", 1));
    assignments.extend(rows("C", "X", 2));
    let (allocator, _) = allocator(abc_config(), ScriptedLeadStore::with_assignments(assignments));

    let allocation = allocator.allocate("X").await.unwrap();
    assert_eq!(allocation.member, "B");
    assert!(allocation.rebalanced);
    assert_eq!(allocation.position, 1);
    assert_eq!(allocator.cursor("X").await, Some(2));
}

#[tokio::test]
async fn test_candidate_at_threshold_is_kept() {
    let mut assignments = rows("A", "X", 2);
    assignments.extend(rows("C", "X", 1));
    let (allocator, _) = allocator(abc_config(), ScriptedLeadStore::with_assignments(assignments));

    let allocation = allocator.allocate("X").await.unwrap();
    assert_eq!(allocation.member, "A");
    assert!(!allocation.rebalanced);
}

#[tokio::test]
async fn test_rebalancing_scenario_keeps_checking_load() {
    // workload = {A: 5, B: 0, C: 5}, cursor at 0.
    let mut assignments = rows("A", "X", 5);
    assignments.extend(rows("C", "X", 5));
    let (allocator, _) = allocator(abc_config(), ScriptedLeadStore::with_assignments(assignments));

    let first = allocator.allocate("X").await.unwrap();
    assert_eq!(first.member, "B");
    assert_eq!(first.next_cursor, 2);

    // Cursor now points at C, which is still overloaded.
    let second = allocator.allocate("X").await.unwrap();
    assert_eq!(second.member, "B");
    assert!(second.rebalanced);
    assert_eq!(allocator.cursor("X").await, Some(2));
}

#[tokio::test]
async fn test_balanced_workload_keeps_rotation() {
    let leads = ScriptedLeadStore::new();
    let (allocator, _) = allocator(abc_config(), leads.clone());

    for round in 0..3 {
        let mut seen = Vec::new();
        for _ in 0..3 {
            let member = allocator.allocate_next("X").await.unwrap();
            seen.push(member.clone());
            leads.set_assignments({
                let mut all = rows("A", "X", round + 1);
                all.extend(rows("B", "X", round + 1));
                all.extend(rows("C", "X", round + 1));
                all
            })
            .await;
        }
        assert_eq!(seen, vec!["A", "B", "C"]);
    }
}

#[tokio::test]
async fn test_workload_failure_falls_back_to_round_robin() {
    let mut assignments = rows("A", "X", 9);
    assignments.extend(rows("C", "X", 9));
    let leads = ScriptedLeadStore::with_assignments(assignments);
    leads.fail_queries(true);
    let (allocator, _) = allocator(abc_config(), leads);

    let allocation = allocator.allocate("X").await.unwrap();
    assert_eq!(allocation.member, "A");
    assert!(!allocation.rebalanced);
    assert_eq!(allocator.cursor("X").await, Some(1));
}

#[tokio::test]
async fn test_workload_timeout_falls_back_to_round_robin() {
    let mut assignments = rows("A", "X", 9);
    assignments.extend(rows("C", "X", 9));
    let leads = ScriptedLeadStore::with_assignments(assignments);
    leads.delay_queries(Duration::from_millis(500));
    let config = abc_config().with_workload_timeout_ms(50);
    let (allocator, _) = allocator(config, leads);

    let started = std::time::Instant::now();
    let member = allocator.allocate_next("X").await.unwrap();
    assert_eq!(member, "A");
    assert!(started.elapsed() < Duration::from_millis(400));
}

#[tokio::test]
async fn test_round_robin_only_mode_ignores_workload() {
    let assignments = rows("A", "X", 50);
    let leads = ScriptedLeadStore::with_assignments(assignments);
    let config = abc_config().with_workload_aware(false);
    let (allocator, _) = allocator(config, leads.clone());

    assert_eq!(allocator.allocate_next("X").await.unwrap(), "A");
    assert_eq!(allocator.allocate_next("X").await.unwrap(), "B");
    assert_eq!(leads.query_count(), 0);
}

#[tokio::test]
async fn test_cursor_is_persisted_before_return() {
    let (allocator, saved) = allocator(abc_config(), ScriptedLeadStore::new());

    for expected in [1, 2, 0, 1] {
        let allocation = allocator.allocate("X").await.unwrap();
        assert!(allocation.persisted);
        let state = saved.saved().await.expect("state saved");
        assert_eq!(state.cursor("X"), Some(expected));
        assert_eq!(state.cursor("Y"), Some(0));
    }
}

#[tokio::test]
async fn test_persistence_failure_is_soft() {
    let state = Arc::new(FailingStateStore::default());
    let allocator =
        AssignmentAllocator::new(abc_config(), state.clone(), ScriptedLeadStore::new()).unwrap();

    let first = allocator.allocate("X").await.unwrap();
    assert_eq!(first.member, "A");
    assert!(!first.persisted);

    // The in-memory cursor still advanced.
    assert_eq!(allocator.allocate_next("X").await.unwrap(), "B");
    assert_eq!(state.save_attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_restore_continues_saved_rotation() {
    let mut saved = AssignmentState::default();
    saved.set_cursor("X", 2);
    saved.set_cursor("Y", 4); // wraps to 1
    saved.set_cursor("Retired", 1);
    let store = Arc::new(MemoryStateStore::with_state(saved));

    let allocator = AssignmentAllocator::restore(abc_config(), store, ScriptedLeadStore::new())
        .await
        .unwrap();

    assert_eq!(allocator.cursor("Retired").await, None);
    assert_eq!(allocator.allocate_next("X").await.unwrap(), "C");
    assert_eq!(allocator.allocate_next("Y").await.unwrap(), "B");
}

#[tokio::test]
async fn test_restore_with_no_saved_state_starts_at_zero() {
    let store = Arc::new(FailingStateStore::default());
    let allocator = AssignmentAllocator::restore(abc_config(), store, ScriptedLeadStore::new())
        .await
        .unwrap();
    assert_eq!(allocator.state().await, AssignmentState::zeroed(["X", "Y"]));
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let config = AllocatorConfig::new(["A", "A"], ["X"]);
    let result = AssignmentAllocator::new(
        config,
        Arc::new(MemoryStateStore::new()),
        ScriptedLeadStore::new(),
    );
    assert!(matches!(result, Err(AdmissionsError::InvalidConfig(_))));
}

#[tokio::test]
async fn test_accessors() {
    let (allocator, _) = allocator(abc_config(), ScriptedLeadStore::new());
    assert_eq!(allocator.current_roster(), ["A", "B", "C"]);
    assert_eq!(allocator.current_programs(), ["X", "Y"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_allocations_are_fair() {
    let leads = ScriptedLeadStore::new();
    leads.fail_queries(true);
    let (allocator, saved) = allocator(abc_config(), leads);
    let allocator = Arc::new(allocator);

    let mut handles = Vec::new();
    for _ in 0..30 {
        let allocator = allocator.clone();
        handles.push(tokio::spawn(async move {
            allocator.allocate_next("X").await.unwrap()
        }));
    }

    let mut counts: HashMap<String, usize> = HashMap::new();
    for handle in handles {
        *counts.entry(handle.await.unwrap()).or_default() += 1;
    }

    assert_eq!(counts.get("A"), Some(&10));
    assert_eq!(counts.get("B"), Some(&10));
    assert_eq!(counts.get("C"), Some(&10));
    assert_eq!(allocator.cursor("X").await, Some(0));
    assert_eq!(saved.saved().await.and_then(|s| s.cursor("X")), Some(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_programs_do_not_interfere() {
    let (allocator, _) = allocator(abc_config(), ScriptedLeadStore::new());
    let allocator = Arc::new(allocator);

    let mut handles = Vec::new();
    for i in 0..20 {
        let allocator = allocator.clone();
        let program = if i % 2 == 0 { "X" } else { "Y" };
        handles.push(tokio::spawn(async move {
            allocator.allocate_next(program).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(allocator.cursor("X").await, Some(10 % 3));
    assert_eq!(allocator.cursor("Y").await, Some(10 % 3));
}

#[tokio::test]
async fn test_assignment_stats() {
    let mut assignments = rows("A", "X", 2);
    assignments.extend(rows("C", "Y", 1));
    let (allocator, _) = allocator(abc_config(), ScriptedLeadStore::with_assignments(assignments));

    let stats = allocator.assignment_stats().await.unwrap();
    assert_eq!(stats.count("X", "A"), 2);
    assert_eq!(stats.count("X", "C"), 0);
    assert_eq!(stats.count("Y", "C"), 1);
}

#[tokio::test]
async fn test_assignment_stats_surfaces_lookup_failure() {
    let leads = ScriptedLeadStore::new();
    leads.fail_queries(true);
    let (allocator, _) = allocator(abc_config(), leads);

    assert!(matches!(
        allocator.assignment_stats().await,
        Err(AdmissionsError::WorkloadLookupFailed(_))
    ));
}
