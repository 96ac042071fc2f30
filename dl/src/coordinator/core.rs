//! Coordinator main loop
//!
//! `LOAD -> { DECIDE -> EXECUTE -> ABSORB -> PERSIST }* -> STOP`
//!
//! Decision ladder: critical bus traffic, needs_fixes routing, the
//! previous result's hint, periodic architecture validation, pattern
//! recommendations, and finally the dimensional scheduler. Errors are
//! captured at the phase boundary; the loop only stops on its declared
//! stop conditions.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use eyre::{Context, Result};
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::bus::{GetOptions, Message, MessageBus, MessageType};
use crate::correlation::CorrelationEngine;
use crate::domain::{DimensionalProfile, IssueKind, PhaseKind, Task};
use crate::ipc::DocumentHub;
use crate::llm::{ChatRequest, SpecialistKind, Specialists};
use crate::patterns::{ExecutionSample, PatternOptimizer, PatternRecognition, RecommendedAction};
use crate::phases::{
    CodingPhase, Collaborators, DebuggingPhase, DocumentationPhase, InvestigationPhase, Phase, PhaseErrorKind,
    PhaseResult, PlanningPhase, ProjectPlanningPhase, PromptDesignPhase, PromptImprovementPhase, PrunePolicy,
    QaPhase, RefactoringPhase, RoleDesignPhase, RoleImprovementPhase, ToolDesignPhase, ToolEvaluationPhase,
};
use crate::registry::{PromptRegistry, RoleRegistry, ToolRegistry};
use crate::scheduler::{DimensionalScheduler, SchedulerConfig};
use crate::state::StateStore;
use crate::tools::{ToolCreator, ToolHandler, ToolValidator};

use super::config::CoordinatorConfig;

/// Why the loop ended; every variant is a normal stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Master objective completion crossed the threshold
    ObjectiveComplete,
    /// Stop requested through the handle or the bus
    UserStop,
    /// Too many consecutive phase errors
    ConsecutiveErrors,
    /// Too many consecutive save failures
    PersistenceFailure,
    /// The configured iteration cap was reached
    IterationCap,
}

/// External control over a running coordinator
#[derive(Clone)]
pub struct CoordinatorHandle {
    stop_tx: watch::Sender<bool>,
}

impl CoordinatorHandle {
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

/// One decision: which phase runs, against which task, and why
#[derive(Debug, Clone)]
struct Decision {
    phase: PhaseKind,
    task: Option<Task>,
    reason: &'static str,
}

enum Decided {
    Run(Decision),
    Stop(StopReason),
}

pub struct Coordinator {
    config: CoordinatorConfig,
    collaborators: Collaborators,
    scheduler: DimensionalScheduler,
    phases: HashMap<PhaseKind, Box<dyn Phase>>,
    optimizer: PatternOptimizer,

    /// Last decisions with the completed-task count at decision time
    recent_decisions: VecDeque<(PhaseKind, usize)>,
    /// Success flags of the last executions (cap 10)
    recent_results: VecDeque<bool>,

    last_hint: Option<PhaseKind>,
    last_phase: Option<PhaseKind>,
    /// Phase barred from the very next decision (set by meta-reasoning)
    barred: Option<PhaseKind>,

    consecutive_errors: u64,
    save_failures: u64,

    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl Coordinator {
    /// Build the coordinator and every shared collaborator rooted at the
    /// project directory. Registries and singletons are constructed here,
    /// once, and injected everywhere else.
    pub fn new(
        project_root: impl AsRef<Path>,
        config: CoordinatorConfig,
        scheduler_config: SchedulerConfig,
        specialists: Specialists,
    ) -> Result<Self> {
        let root = project_root.as_ref().to_path_buf();
        let pipeline_dir = root.join(crate::state::PIPELINE_DIR);
        std::fs::create_dir_all(&pipeline_dir).context("Failed to create .pipeline directory")?;

        let state = Arc::new(StateStore::open(&root)?);
        let bus = Arc::new(MessageBus::new());
        let documents = Arc::new(DocumentHub::new(&root));

        let prompts = Arc::new(PromptRegistry::open(
            pipeline_dir.join("prompts"),
            pipeline_dir.join("prompts.json"),
        )?);
        let tool_registry = Arc::new(ToolRegistry::open(
            pipeline_dir.join("tool_specs"),
            pipeline_dir.join("tool_specs.json"),
        )?);
        let roles = Arc::new(RoleRegistry::open(
            pipeline_dir.join("roles"),
            pipeline_dir.join("roles.json"),
        )?);

        let creator = Arc::new(ToolCreator::default());
        let validator = Arc::new(ToolValidator::new());
        let tools = Arc::new(ToolHandler::new(
            &root,
            tool_registry.clone(),
            creator.clone(),
            validator.clone(),
            bus.clone(),
        )?);
        let patterns = Arc::new(PatternRecognition::open(pipeline_dir.join("patterns.db"))?);
        let correlations = Arc::new(CorrelationEngine::new());

        bus.register("coordinator");
        for kind in PhaseKind::ALL {
            bus.register(kind.as_str());
        }

        let collaborators = Collaborators {
            project_root: root,
            state,
            bus,
            documents,
            prompts,
            tool_registry,
            roles,
            specialists,
            tools,
            creator,
            validator,
            patterns,
            correlations,
            prune_policy: PrunePolicy::default(),
        };

        Ok(Self::from_parts(config, scheduler_config, collaborators))
    }

    /// Assemble from pre-built collaborators (tests inject mocks here)
    pub fn from_parts(config: CoordinatorConfig, scheduler_config: SchedulerConfig, collaborators: Collaborators) -> Self {
        let mut phases: HashMap<PhaseKind, Box<dyn Phase>> = HashMap::new();
        phases.insert(PhaseKind::Planning, Box::new(PlanningPhase));
        phases.insert(PhaseKind::Coding, Box::new(CodingPhase));
        phases.insert(PhaseKind::Qa, Box::new(QaPhase));
        phases.insert(PhaseKind::Debugging, Box::new(DebuggingPhase));
        phases.insert(PhaseKind::Refactoring, Box::new(RefactoringPhase));
        phases.insert(PhaseKind::Investigation, Box::new(InvestigationPhase));
        phases.insert(PhaseKind::Documentation, Box::new(DocumentationPhase));
        phases.insert(PhaseKind::ProjectPlanning, Box::new(ProjectPlanningPhase));
        phases.insert(PhaseKind::ToolDesign, Box::new(ToolDesignPhase));
        phases.insert(PhaseKind::ToolEvaluation, Box::new(ToolEvaluationPhase));
        phases.insert(PhaseKind::PromptDesign, Box::new(PromptDesignPhase));
        phases.insert(PhaseKind::PromptImprovement, Box::new(PromptImprovementPhase));
        phases.insert(PhaseKind::RoleDesign, Box::new(RoleDesignPhase));
        phases.insert(PhaseKind::RoleImprovement, Box::new(RoleImprovementPhase));

        let (stop_tx, stop_rx) = watch::channel(false);

        Self {
            config,
            collaborators,
            scheduler: DimensionalScheduler::new(scheduler_config),
            phases,
            optimizer: PatternOptimizer::default(),
            recent_decisions: VecDeque::new(),
            recent_results: VecDeque::new(),
            last_hint: None,
            last_phase: None,
            barred: None,
            consecutive_errors: 0,
            save_failures: 0,
            stop_tx,
            stop_rx,
        }
    }

    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle {
            stop_tx: self.stop_tx.clone(),
        }
    }

    pub fn bus(&self) -> Arc<MessageBus> {
        self.collaborators.bus.clone()
    }

    pub fn state(&self) -> Arc<StateStore> {
        self.collaborators.state.clone()
    }

    /// Run until a stop condition trips
    pub async fn run(mut self) -> Result<StopReason> {
        self.collaborators.documents.ensure_documents(&PhaseKind::ALL).await?;
        info!("Coordinator started");

        let reason = loop {
            if *self.stop_rx.borrow() {
                break StopReason::UserStop;
            }

            // Advance the iteration counter; failure here is a save failure
            let iteration = match self.collaborators.state.update(|s| {
                s.iteration += 1;
                s.iteration
            }).await {
                Ok(iteration) => iteration,
                Err(err) => {
                    if let Some(reason) = self.note_save_failure(&err.to_string()).await {
                        break reason;
                    }
                    continue;
                }
            };

            if self.config.max_iterations > 0 && iteration > self.config.max_iterations {
                break StopReason::IterationCap;
            }

            // DECIDE
            let decision = match self.decide(iteration).await {
                Decided::Run(decision) => decision,
                Decided::Stop(reason) => break reason,
            };
            debug!(iteration, phase = %decision.phase, reason = decision.reason, "Decision");

            // EXECUTE
            let started = Instant::now();
            let result = self.execute(&decision).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            // ABSORB
            self.absorb(&decision, &result, duration_ms, iteration).await;

            // PERSIST
            if let Err(err) = self.collaborators.state.save().await {
                if let Some(reason) = self.note_save_failure(&err.to_string()).await {
                    break reason;
                }
            } else {
                self.save_failures = 0;
            }

            if self.config.optimizer_interval > 0 && iteration % self.config.optimizer_interval == 0 {
                self.maintenance().await;
            }

            // STOP conditions
            if self.consecutive_errors >= self.config.consecutive_error_cap {
                warn!(errors = self.consecutive_errors, "Stopping after consecutive phase errors");
                break StopReason::ConsecutiveErrors;
            }
            let snapshot = self.collaborators.state.snapshot().await;
            if let Some(master) = snapshot.master_objective()
                && master.completion >= self.config.completion_threshold
            {
                info!(completion = master.completion, "Master objective complete");
                break StopReason::ObjectiveComplete;
            }
        };

        self.collaborators.bus.shutdown(std::time::Duration::from_millis(50)).await;
        info!(?reason, "Coordinator stopped");
        Ok(reason)
    }

    /// The decision ladder
    async fn decide(&mut self, iteration: u64) -> Decided {
        let barred = self.barred.take();
        let snapshot = self.collaborators.state.snapshot().await;

        // (a) Critical messages addressed to the coordinator come first
        let critical = self.collaborators.bus.get(
            "coordinator",
            GetOptions {
                priority: Some(crate::domain::Priority::Critical),
                ..Default::default()
            },
        );
        if critical.iter().any(|m| m.message_type == MessageType::ShutdownRequested) {
            return Decided::Stop(StopReason::UserStop);
        }
        if let Some(msg) = critical.first() {
            debug!(message = %msg.message_type, "Critical alert routes to investigation");
            return Decided::Run(Decision {
                phase: PhaseKind::Investigation,
                task: None,
                reason: "critical_alert",
            });
        }

        // Loop detection overrides everything below
        if let Some(repeated) = self.detect_loop() {
            let forced = self.meta_reason(repeated, 0).await;
            self.barred = Some(repeated);
            return Decided::Run(Decision {
                phase: forced,
                task: None,
                reason: "meta_reasoning",
            });
        }

        // (b) needs_fixes tasks must reach debugging or refactoring before
        // anything else consumes them
        if let Some(task) = snapshot.needs_fixes_tasks().first().map(|t| (*t).clone()) {
            let preferred = match task.issue.as_ref().map(|i| i.kind) {
                Some(IssueKind::BugFix) | None => PhaseKind::Debugging,
                Some(_) => PhaseKind::Refactoring,
            };
            // Both phases are legal consumers; a barred one defers to the other
            let phase = if Some(preferred) == barred {
                if preferred == PhaseKind::Debugging { PhaseKind::Refactoring } else { PhaseKind::Debugging }
            } else {
                preferred
            };
            return Decided::Run(Decision {
                phase,
                task: Some(task),
                reason: "needs_fixes",
            });
        }

        // (c) The previous result's hint, when consistent with state
        if let Some(hint) = self.last_hint.take()
            && Some(hint) != barred
            && hint_consistent(hint, &snapshot)
        {
            return Decided::Run(Decision {
                phase: hint,
                task: None,
                reason: "hint",
            });
        }

        // (d) Periodic architecture validation
        if self.config.architecture_check_interval > 0
            && iteration % self.config.architecture_check_interval == 0
            && Some(PhaseKind::Documentation) != barred
        {
            return Decided::Run(Decision {
                phase: PhaseKind::Documentation,
                task: None,
                reason: "architecture_check",
            });
        }

        // Pending tool proposals route to tool design
        if self.collaborators.creator.pending_proposal_count() > 0 && Some(PhaseKind::ToolDesign) != barred {
            return Decided::Run(Decision {
                phase: PhaseKind::ToolDesign,
                task: None,
                reason: "tool_proposals",
            });
        }

        // (e) Confident pattern recommendations
        let mut avoided: Vec<PhaseKind> = Vec::new();
        if let Ok(recommendations) = self.collaborators.patterns.recommendations(self.last_phase) {
            for rec in &recommendations {
                match &rec.action {
                    RecommendedAction::RunPhase(phase) if Some(*phase) != barred && !avoided.contains(phase) => {
                        return Decided::Run(Decision {
                            phase: *phase,
                            task: None,
                            reason: "pattern_recommendation",
                        });
                    }
                    RecommendedAction::AvoidPhase(phase) => avoided.push(*phase),
                    _ => {}
                }
            }
        }

        // (f) Dimensional scheduler over the remaining candidates
        let objective = snapshot
            .active_objective()
            .map(|o| o.profile)
            .unwrap_or_else(|| DimensionalProfile::uniform(0.3));
        self.scheduler.observe_objective(objective);

        let candidates: Vec<PhaseKind> = PhaseKind::ALL
            .into_iter()
            .filter(|kind| Some(*kind) != barred && !avoided.contains(kind))
            .collect();
        let phase = self
            .scheduler
            .pick(&candidates, &objective, &snapshot.phases, iteration)
            .unwrap_or(PhaseKind::Planning);

        Decided::Run(Decision {
            phase,
            task: None,
            reason: "scheduler",
        })
    }

    /// W identical decisions with no progress, or a poor recent success
    /// rate, means the loop is stuck.
    fn detect_loop(&self) -> Option<PhaseKind> {
        let window = self.config.loop_window;
        if window > 0 && self.recent_decisions.len() >= window {
            let recent: Vec<&(PhaseKind, usize)> =
                self.recent_decisions.iter().rev().take(window).collect();
            let (first_phase, first_progress) = *recent[0];
            let same_phase = recent.iter().all(|(phase, _)| *phase == first_phase);
            let no_progress = recent.iter().all(|(_, progress)| *progress == first_progress);
            if same_phase && no_progress {
                return Some(first_phase);
            }
        }

        if self.recent_results.len() >= 10 {
            let successes = self.recent_results.iter().filter(|s| **s).count();
            if (successes as f64) / (self.recent_results.len() as f64) < 0.3 {
                return self.last_phase;
            }
        }
        None
    }

    /// Bounded self-reflection: consult the reasoning specialist about the
    /// stall and apply its recommendation. Depth is capped; past the cap
    /// the answer is always planning.
    async fn meta_reason(&self, repeated: PhaseKind, depth: u32) -> PhaseKind {
        self.collaborators.bus.publish(Message::broadcast(
            MessageType::SystemWarning,
            "coordinator",
            json!({"kind": "loop_detected", "phase": repeated.as_str(), "depth": depth}),
        ));

        if depth >= self.config.meta_recursion_cap {
            warn!(depth, "Meta-reasoning recursion cap reached, forcing planning");
            return PhaseKind::Planning;
        }

        let history: Vec<String> = self
            .recent_decisions
            .iter()
            .map(|(phase, progress)| format!("{} (completed={})", phase, progress))
            .collect();
        let phase_names: Vec<&str> = PhaseKind::ALL.iter().map(|k| k.as_str()).collect();

        let prompt = match self.collaborators.prompts.render(
            "meta_reasoning",
            &json!({"history": history.join("\n"), "phases": phase_names.join(", ")}),
        ) {
            Ok(prompt) => prompt,
            Err(_) => return PhaseKind::Planning,
        };

        let request = ChatRequest::new(
            "You are the meta-reasoning step of an autonomous development pipeline.",
            prompt,
        );
        let recommended = match self.collaborators.specialists.ask(SpecialistKind::Reasoning, request).await {
            Ok(response) => response
                .content
                .as_deref()
                .and_then(parse_phase_recommendation),
            Err(err) => {
                warn!(error = %err, "Meta-reasoning consultation failed");
                None
            }
        };

        match recommended {
            Some(phase) if phase == repeated => Box::pin(self.meta_reason(repeated, depth + 1)).await,
            Some(phase) => phase,
            None => PhaseKind::Planning,
        }
    }

    /// Run one phase with its deadline
    async fn execute(&self, decision: &Decision) -> PhaseResult {
        let Some(phase) = self.phases.get(&decision.phase) else {
            return PhaseResult::failed(format!("phase {} not registered", decision.phase), PhaseErrorKind::Fatal);
        };

        self.collaborators.bus.publish(Message::broadcast(
            MessageType::PhaseStarted,
            "coordinator",
            json!({"phase": decision.phase.as_str(), "reason": decision.reason}),
        ));

        let mut ctx = self.collaborators.context_for(decision.phase);
        let deadline = self.config.phase_timeout();

        match tokio::time::timeout(deadline, phase.execute(&mut ctx, decision.task.clone())).await {
            Ok(result) => result,
            Err(_) => {
                // The phase future is dropped at the deadline; the grace
                // period lets any spawned subprocesses die off.
                warn!(phase = %decision.phase, ?deadline, "Phase deadline expired");
                tokio::time::sleep(self.config.grace_period()).await;
                PhaseResult::failed(
                    format!("phase {} timed out after {:?}", decision.phase, deadline),
                    PhaseErrorKind::Timeout,
                )
            }
        }
    }

    /// Fold the result into state, patterns, scheduler and the bus
    async fn absorb(&mut self, decision: &Decision, result: &PhaseResult, duration_ms: u64, iteration: u64) {
        let kind = decision.phase;

        if let Err(err) = self
            .collaborators
            .state
            .update(|state| {
                state
                    .phase_record_mut(kind)
                    .record_run(result.success, duration_ms, result.summary.clone());
            })
            .await
        {
            warn!(error = %err, "Failed to record phase run");
        }

        let sample = ExecutionSample {
            phase: kind,
            success: result.success,
            tool_calls: result.tools_used.clone(),
            duration_ms,
            context: decision.reason.to_string(),
        };
        if let Err(err) = self.collaborators.patterns.record_execution(&sample) {
            warn!(error = %err, "Failed to record execution pattern");
        }

        let message_type = if result.success { MessageType::PhaseCompleted } else { MessageType::PhaseError };
        self.collaborators.bus.publish(Message::broadcast(
            message_type,
            "coordinator",
            json!({
                "phase": kind.as_str(),
                "success": result.success,
                "summary": result.summary,
                "duration_ms": duration_ms,
            }),
        ));

        let snapshot = self.collaborators.state.snapshot().await;
        let objective = snapshot
            .active_objective()
            .map(|o| o.profile)
            .unwrap_or_else(|| DimensionalProfile::uniform(0.3));
        self.scheduler.record_outcome(kind, result.success, &objective, iteration);

        self.recent_decisions.push_back((kind, snapshot.completed_task_count()));
        while self.recent_decisions.len() > self.config.loop_window.max(1) * 2 {
            self.recent_decisions.pop_front();
        }
        self.recent_results.push_back(result.success);
        while self.recent_results.len() > 10 {
            self.recent_results.pop_front();
        }

        if result.success {
            self.consecutive_errors = 0;
        } else {
            self.consecutive_errors += 1;
        }
        self.last_hint = result.next_phase_hint;
        self.last_phase = Some(kind);
    }

    /// Periodic housekeeping: optimizer pass plus tool deprecations
    async fn maintenance(&self) {
        match self.optimizer.run(&self.collaborators.patterns) {
            Ok(report) => debug!(?report, "Optimizer ran"),
            Err(err) => warn!(error = %err, "Optimizer pass failed"),
        }

        for tool in self.collaborators.validator.refresh_deprecations() {
            self.collaborators.bus.publish(Message::broadcast(
                MessageType::SystemWarning,
                "coordinator",
                json!({"kind": "tool_deprecated", "tool": tool}),
            ));
        }
    }

    /// Restore the backup, raise the alert, and stop past the cap
    async fn note_save_failure(&mut self, detail: &str) -> Option<StopReason> {
        self.save_failures += 1;
        warn!(failures = self.save_failures, detail, "State save failed");

        self.collaborators.bus.publish(Message::broadcast(
            MessageType::SystemAlert,
            "coordinator",
            json!({"kind": "save_failure", "detail": detail, "count": self.save_failures}),
        ));
        if let Err(err) = self.collaborators.state.restore_backup().await {
            warn!(error = %err, "Backup restore failed");
        }

        (self.save_failures >= self.config.save_failure_cap).then_some(StopReason::PersistenceFailure)
    }
}

/// A hint is only followed when the state still supports it
fn hint_consistent(hint: PhaseKind, snapshot: &crate::state::PipelineState) -> bool {
    use crate::domain::TaskStatus;
    match hint {
        PhaseKind::Coding => !snapshot.pending_tasks().is_empty(),
        PhaseKind::Qa => !snapshot.tasks_with_status(TaskStatus::InProgress).is_empty(),
        PhaseKind::Debugging | PhaseKind::Refactoring => !snapshot.needs_fixes_tasks().is_empty(),
        _ => true,
    }
}

/// Parse `phase: <name>` out of a meta-reasoning answer
fn parse_phase_recommendation(text: &str) -> Option<PhaseKind> {
    text.lines().find_map(|line| {
        line.trim()
            .strip_prefix("phase:")
            .and_then(|name| name.trim().parse().ok())
    })
}
