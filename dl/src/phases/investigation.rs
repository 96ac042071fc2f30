//! Investigation phase
//!
//! Deep-analysis aggregator: runs the analyzers, feeds findings into the
//! correlation engine, and persists whatever correlates.

use async_trait::async_trait;
use eyre::Result;
use serde_json::json;

use crate::bus::{Message, MessageType};
use crate::domain::{Finding, FindingComponent, PhaseKind, Task};

use super::analyzer::{Analyzer, ImportGraphAnalyzer, SourceMetricsAnalyzer};
use super::{Phase, PhaseContext, PhaseErrorKind, PhaseResult};

pub struct InvestigationPhase;

#[async_trait]
impl Phase for InvestigationPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Investigation
    }

    async fn execute(&self, ctx: &mut PhaseContext, task: Option<Task>) -> PhaseResult {
        match self.run(ctx, task).await {
            Ok(result) => result,
            Err(err) => PhaseResult::failed(format!("investigation failed: {}", err), PhaseErrorKind::Transient),
        }
    }
}

impl InvestigationPhase {
    async fn run(&self, ctx: &mut PhaseContext, _task: Option<Task>) -> Result<PhaseResult> {
        let analyzers: Vec<Box<dyn Analyzer>> = vec![Box::new(SourceMetricsAnalyzer), Box::new(ImportGraphAnalyzer)];

        let mut summaries = Vec::new();
        for analyzer in &analyzers {
            let findings = analyzer.analyze(&ctx.project_root)?;
            summaries.push(format!("{}: {}", findings.analyzer, findings.summary));

            // Analyzer output lands in the correlation engine as
            // architecture/code-change findings
            let component = match findings.analyzer.as_str() {
                "import_graph" => FindingComponent::Architecture,
                _ => FindingComponent::CodeChange,
            };
            ctx.correlations
                .add_finding(Finding::new(component, &findings.analyzer, findings.payload));
        }

        // Recent failures from state feed the failure side
        let snapshot = ctx.state.snapshot().await;
        for record in snapshot.phases.values() {
            if record.consecutive_failures > 0 {
                ctx.correlations.add_finding(Finding::new(
                    FindingComponent::CodeChange,
                    "error",
                    json!({"phase": record.kind.as_str(), "consecutive_failures": record.consecutive_failures}),
                ));
            }
        }

        let correlations = ctx.correlations.correlate();
        let found = correlations.len();

        let mut messages_published = 0u32;
        if found > 0 {
            ctx.state
                .update(|state| state.correlations.extend(correlations.clone()))
                .await?;
            for correlation in &correlations {
                ctx.bus.publish(Message::broadcast(
                    MessageType::CorrelationFound,
                    "investigation",
                    json!({"id": correlation.id, "kind": format!("{:?}", correlation.kind), "confidence": correlation.confidence}),
                ));
                messages_published += 1;
            }
        }

        ctx.docs
            .write_status(&format!("Analyzed project: {}; {} correlation(s)", summaries.join("; "), found))
            .await?;

        let mut result = PhaseResult::ok(format!("{} analyzer(s), {} correlation(s)", analyzers.len(), found));
        result.messages_published = messages_published;
        Ok(result)
    }
}
