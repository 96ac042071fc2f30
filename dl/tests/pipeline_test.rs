//! End-to-end pipeline scenarios
//!
//! Each scenario runs the real coordinator against a temp project root
//! with a scripted specialist, and asserts on persisted state and bus
//! history.

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use devloop::bus::HistoryFilter;
use devloop::coordinator::{Coordinator, CoordinatorConfig, StopReason};
use devloop::domain::{
    Dimension, DimensionalProfile, Issue, IssueKind, IssueSeverity, Objective, ObjectiveTier, Task, TaskStatus,
};
use devloop::llm::mock::MockSpecialistClient;
use devloop::llm::{ChatResponse, Specialists};
use devloop::scheduler::SchedulerConfig;
use devloop::state::StateStore;
use devloop::{MessageType, StateError};

fn test_config(max_iterations: u64) -> CoordinatorConfig {
    CoordinatorConfig {
        max_iterations,
        phase_timeout_ms: 10_000,
        grace_period_ms: 10,
        // Keep the decision ladder deterministic for the scenarios
        architecture_check_interval: 0,
        optimizer_interval: 0,
        ..Default::default()
    }
}

fn coordinator(root: &std::path::Path, responses: Vec<ChatResponse>, config: CoordinatorConfig) -> Coordinator {
    let mock = Arc::new(MockSpecialistClient::new(responses));
    Coordinator::new(root, config, SchedulerConfig::default(), Specialists::uniform(mock)).unwrap()
}

/// Seed an objective whose profile makes the wanted phase the top pick
async fn seed_objective(root: &std::path::Path, profile: DimensionalProfile) -> String {
    let store = StateStore::open(root).unwrap();
    let objective = Objective::new("seeded objective", ObjectiveTier::Primary).with_profile(profile);
    let id = objective.id.clone();
    store
        .update(|state| state.objectives.push(objective.clone()))
        .await
        .unwrap();
    id
}

// =============================================================================
// Scenario: plan -> code -> QA passes
// =============================================================================

#[tokio::test]
async fn test_plan_code_qa_pass() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("MASTER_PLAN.md"), "# Ship module x\n\nCreate module x.\n").unwrap();

    // Planning favors the first pick; the rest flows through hints
    seed_objective(
        temp.path(),
        DimensionalProfile::from_pairs(&[
            (Dimension::Temporal, 0.8),
            (Dimension::Context, 0.7),
            (Dimension::Architecture, 0.5),
        ]),
    )
    .await;

    let responses = vec![
        // planning proposes one task
        MockSpecialistClient::text("TASK: Create module x | FILES: src/module_x.rs | PRIORITY: high"),
        // coding writes the file, then ends its turn
        MockSpecialistClient::tool_call(
            "write_file",
            json!({"path": "src/module_x.rs", "content": "pub fn module_x() {}\n"}),
        ),
        MockSpecialistClient::text("module created"),
        // qa passes the review
        MockSpecialistClient::text("All good."),
    ];

    let coordinator = coordinator(temp.path(), responses, test_config(20));
    let bus = coordinator.bus();
    let state = coordinator.state();

    let reason = coordinator.run().await.unwrap();
    assert_eq!(reason, StopReason::ObjectiveComplete);

    // The file exists and the task completed
    assert!(temp.path().join("src/module_x.rs").exists());
    let snapshot = state.snapshot().await;
    assert_eq!(snapshot.completed_task_count(), 1);
    assert!(snapshot.needs_fixes_tasks().is_empty());

    // Expected events are on the record
    let task_created = bus.history(
        HistoryFilter {
            message_type: Some(MessageType::TaskCreated),
            ..Default::default()
        },
        0,
    );
    assert_eq!(task_created.len(), 1);

    let completed_phases: Vec<String> = bus
        .history(
            HistoryFilter {
                message_type: Some(MessageType::PhaseCompleted),
                ..Default::default()
            },
            0,
        )
        .iter()
        .map(|m| m.payload["phase"].as_str().unwrap_or_default().to_string())
        .collect();
    assert!(completed_phases.contains(&"coding".to_string()));
    assert!(completed_phases.contains(&"qa".to_string()));
}

// =============================================================================
// Scenario: QA finds an issue, debugging fixes it
// =============================================================================

#[tokio::test]
async fn test_qa_issue_then_debug_fix() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("api.py"), "def handler():\n    return 1/0\n").unwrap();

    // QA is the top scheduler pick for this profile
    seed_objective(
        temp.path(),
        DimensionalProfile::from_pairs(&[
            (Dimension::Error, 0.7),
            (Dimension::Functional, 0.6),
            (Dimension::Data, 0.4),
        ]),
    )
    .await;

    // A task under review targeting the defective file
    {
        let store = StateStore::open(temp.path()).unwrap();
        let mut task = Task::new("Create api", "").with_target_file("api.py");
        task.set_status(TaskStatus::InProgress);
        store.update(|state| state.upsert_task(task.clone())).await.unwrap();
    }

    let responses = vec![
        // qa reports the defect
        MockSpecialistClient::text("DEFECT: api.py | KIND: bug_fix | SEVERITY: major | divides by zero"),
        // debugging reads then fixes
        MockSpecialistClient::tool_calls(vec![
            ("read_file", json!({"path": "api.py"})),
            ("edit_file", json!({"path": "api.py", "old_string": "1/0", "new_string": "1"})),
        ]),
        MockSpecialistClient::text("fixed"),
    ];

    let coordinator = coordinator(temp.path(), responses, test_config(2));
    let bus = coordinator.bus();
    let state = coordinator.state();

    let reason = coordinator.run().await.unwrap();
    assert_eq!(reason, StopReason::IterationCap);

    // After the first iteration a needs_fixes task existed; after the
    // second, debugging resolved it
    let snapshot = state.snapshot().await;
    assert!(snapshot.needs_fixes_tasks().is_empty());
    let fix_task = snapshot
        .tasks
        .values()
        .find(|t| t.issue.is_some())
        .expect("fix task exists");
    assert_eq!(fix_task.status, TaskStatus::Completed);
    assert!(fix_task.target_files.contains("api.py"));

    let issue_found = bus.history(
        HistoryFilter {
            message_type: Some(MessageType::IssueFound),
            ..Default::default()
        },
        0,
    );
    assert_eq!(issue_found.len(), 1);

    let resolved = bus.history(
        HistoryFilter {
            message_type: Some(MessageType::IssueResolved),
            ..Default::default()
        },
        0,
    );
    assert_eq!(resolved.len(), 1);

    let fixed = std::fs::read_to_string(temp.path().join("api.py")).unwrap();
    assert!(!fixed.contains("1/0"));
}

// =============================================================================
// Scenario: loop detection fires when debugging spins on one defect
// =============================================================================

#[tokio::test]
async fn test_loop_detection_breaks_repeated_phase() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("api.py"), "broken\n").unwrap();

    // A needs_fixes task the (scriptless) debugger can never fix: every
    // iteration routes to debugging with zero progress until the loop
    // detector steps in.
    {
        let store = StateStore::open(temp.path()).unwrap();
        let mut task = Task::new("Unfixable", "").with_target_file("api.py");
        task.mark_needs_fixes(Issue::new(IssueKind::BugFix, IssueSeverity::Major, "mystery", "qa"));
        store.update(|state| state.upsert_task(task.clone())).await.unwrap();
    }

    let config = CoordinatorConfig {
        consecutive_error_cap: 100,
        ..test_config(8)
    };
    let coordinator = coordinator(temp.path(), vec![], config);
    let bus = coordinator.bus();

    let reason = coordinator.run().await.unwrap();
    assert_eq!(reason, StopReason::IterationCap);

    // The loop was detected and recorded
    let warnings = bus.history(
        HistoryFilter {
            message_type: Some(MessageType::SystemWarning),
            ..Default::default()
        },
        0,
    );
    assert!(warnings.iter().any(|m| m.payload["kind"] == "loop_detected"));

    // The first five executions are debugging; the sixth is not
    let started: Vec<String> = bus
        .history(
            HistoryFilter {
                message_type: Some(MessageType::PhaseStarted),
                ..Default::default()
            },
            0,
        )
        .iter()
        .map(|m| m.payload["phase"].as_str().unwrap_or_default().to_string())
        .collect();
    assert!(started.len() >= 6);
    assert!(started[..5].iter().all(|p| p == "debugging"));
    assert_ne!(started[5], "debugging");
}

// =============================================================================
// Scenario: atomic persistence under injected corruption
// =============================================================================

#[tokio::test]
async fn test_atomic_save_under_fault() {
    let temp = TempDir::new().unwrap();
    let state_path = temp.path().join(".pipeline").join("state.json");

    let mut store = StateStore::open(temp.path()).unwrap();
    store
        .update(|state| state.upsert_task(Task::new("anchor", "").with_target_file("a.rs")))
        .await
        .unwrap();

    for i in 1..=100u64 {
        store.update(|state| state.iteration = i).await.unwrap();

        if i % 17 == 0 {
            // Simulate a torn write hitting the snapshot on disk
            std::fs::write(&state_path, "{\"tasks\": {\"tru").unwrap();

            // Reopen: the store falls back to the last committed snapshot
            drop(store);
            store = StateStore::open(temp.path()).unwrap();
            let recovered = store.snapshot().await;

            // Either the state after i or after i-1, never a partial one
            assert!(recovered.iteration == i || recovered.iteration == i - 1);
            assert_eq!(recovered.tasks.len(), 1);

            // Every invariant holds on what load() returns
            let on_disk = store.load().await;
            match on_disk {
                Ok(state) => assert!(state.tasks.len() == 1),
                Err(StateError::Corrupt { .. }) => panic!("corrupt state returned from load after recovery"),
                Err(other) => panic!("unexpected error: {}", other),
            }
        }
    }
}

// =============================================================================
// Scenario: a crashing dynamic tool leaves the pipeline alive
// =============================================================================

#[tokio::test]
async fn test_tool_subprocess_crash_is_contained() {
    use devloop::bus::MessageBus;
    use devloop::llm::ToolCall;
    use devloop::registry::{CUSTOM_TOOLS_DIR, DynamicToolSpec, ToolRegistry};
    use devloop::tools::{ToolContext, ToolCreator, ToolHandler, ToolValidator};

    let temp = TempDir::new().unwrap();
    let tools_dir = temp.path().join(CUSTOM_TOOLS_DIR);
    std::fs::create_dir_all(&tools_dir).unwrap();
    std::fs::write(tools_dir.join("crashy.sh"), "exit 2").unwrap();

    let registry = Arc::new(
        ToolRegistry::open(
            temp.path().join(".pipeline/tool_specs"),
            temp.path().join(".pipeline/tool_specs.json"),
        )
        .unwrap(),
    );
    registry
        .register(DynamicToolSpec {
            name: "crashy".to_string(),
            description: "always crashes".to_string(),
            entry: "crashy.sh".to_string(),
            interpreter: "sh".to_string(),
            timeout_secs: None,
            parameters: vec![],
        })
        .unwrap();

    let creator = Arc::new(ToolCreator::default());
    let validator = Arc::new(ToolValidator::new());
    let bus = Arc::new(MessageBus::new());
    let handler = ToolHandler::new(temp.path(), registry, creator, validator.clone(), bus).unwrap();
    let ctx = ToolContext::new(temp.path().to_path_buf(), "coding");

    let outcome = handler.dispatch(&ToolCall::new("crashy", json!({})), &ctx).await;

    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("exit 2"));

    // The failure was recorded against the tool, and this process is
    // clearly still running
    let metrics = validator.metrics("crashy").unwrap();
    assert_eq!(metrics.failures, 1);
}

// =============================================================================
// Scenario: repeated unknown-tool calls become a design proposal
// =============================================================================

#[tokio::test]
async fn test_unknown_tool_becomes_proposal() {
    use devloop::bus::MessageBus;
    use devloop::llm::ToolCall;
    use devloop::registry::ToolRegistry;
    use devloop::tools::{ToolContext, ToolCreator, ToolHandler, ToolValidator};

    let temp = TempDir::new().unwrap();
    let registry = Arc::new(
        ToolRegistry::open(
            temp.path().join(".pipeline/tool_specs"),
            temp.path().join(".pipeline/tool_specs.json"),
        )
        .unwrap(),
    );
    let creator = Arc::new(ToolCreator::default());
    let validator = Arc::new(ToolValidator::new());
    let bus = Arc::new(MessageBus::new());
    let handler = ToolHandler::new(temp.path(), registry, creator.clone(), validator, bus).unwrap();

    // Five distinct phases attempt the same unknown tool
    for phase in ["planning", "coding", "qa", "debugging", "refactoring"] {
        let ctx = ToolContext::new(temp.path().to_path_buf(), phase);
        let outcome = handler
            .dispatch(&ToolCall::new("open", json!({"path": "x", "mode": "r"})), &ctx)
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("unknown_tool"));
        // No side effects: nothing was created under the project root
        assert!(!temp.path().join("x").exists());
    }

    assert_eq!(creator.pending_proposal_count(), 1);
    let proposals = creator.take_proposals();
    assert_eq!(proposals.len(), 1);
    assert_eq!(proposals[0].name, "open");
    assert!(proposals[0].inferred_parameters.contains("path"));
    assert!(proposals[0].inferred_parameters.contains("mode"));
}
