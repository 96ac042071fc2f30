//! Documentation phase
//!
//! Diffs the intended architecture against the tree on disk, keeps the
//! status document current, and escalates critical divergence to the
//! alerts log plus planning's inbox.

use std::collections::BTreeSet;

use async_trait::async_trait;
use eyre::Result;
use walkdir::WalkDir;

use crate::domain::{PhaseKind, Task};
use crate::ipc::SharedDoc;

use super::{Phase, PhaseContext, PhaseErrorKind, PhaseResult};

/// Missing modules at or above this count as critical divergence
const CRITICAL_MISSING: usize = 3;

pub struct DocumentationPhase;

#[async_trait]
impl Phase for DocumentationPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Documentation
    }

    async fn execute(&self, ctx: &mut PhaseContext, task: Option<Task>) -> PhaseResult {
        match self.run(ctx, task).await {
            Ok(result) => result,
            Err(err) => PhaseResult::failed(format!("documentation failed: {}", err), PhaseErrorKind::Transient),
        }
    }
}

impl DocumentationPhase {
    async fn run(&self, ctx: &mut PhaseContext, _task: Option<Task>) -> Result<PhaseResult> {
        let intended = ctx.docs.read_shared(SharedDoc::Architecture).await?;
        let intended_modules = modules_mentioned(&intended);
        let current_modules = modules_on_disk(&ctx.project_root);

        let missing: Vec<&String> = intended_modules.difference(&current_modules).collect();
        let unplanned: Vec<&String> = current_modules.difference(&intended_modules).collect();

        let status_body = format!(
            "Intended modules: {}\nPresent: {}\nMissing: {}\nUnplanned: {}",
            intended_modules.len(),
            current_modules.len(),
            if missing.is_empty() {
                "none".to_string()
            } else {
                missing.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
            },
            if unplanned.is_empty() {
                "none".to_string()
            } else {
                unplanned.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
            },
        );
        ctx.docs
            .write_shared_section(SharedDoc::ArchitectureStatus, "Divergence", &status_body)
            .await?;

        let critical = missing.len() >= CRITICAL_MISSING;
        if critical {
            ctx.docs
                .append_shared_log(
                    SharedDoc::ArchitectureAlerts,
                    &format!("critical divergence: {} intended module(s) missing", missing.len()),
                )
                .await?;
            ctx.docs
                .send_to(
                    PhaseKind::Planning,
                    &format!(
                        "Architecture divergence is critical: missing modules {}. Re-plan required.",
                        missing.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
                    ),
                )
                .await?;
        }

        ctx.docs
            .write_status(&format!(
                "Architecture status updated; {} missing, {} unplanned{}",
                missing.len(),
                unplanned.len(),
                if critical { "; alert raised" } else { "" }
            ))
            .await?;

        let mut result = PhaseResult::ok(format!(
            "architecture diff: {} missing, {} unplanned",
            missing.len(),
            unplanned.len()
        ));
        if critical {
            result = result.with_hint(PhaseKind::Planning);
        }
        Ok(result)
    }
}

/// Module names mentioned as `module: <name>` bullets or backticked paths
fn modules_mentioned(architecture_doc: &str) -> BTreeSet<String> {
    let mut modules = BTreeSet::new();
    for line in architecture_doc.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("- module:") {
            let name = rest.trim().trim_matches('`');
            if !name.is_empty() {
                modules.insert(name.to_string());
            }
        }
    }
    modules
}

/// Top-level source modules present on disk (dirs and .rs/.py files under src/)
fn modules_on_disk(project_root: &std::path::Path) -> BTreeSet<String> {
    let src = project_root.join("src");
    let mut modules = BTreeSet::new();

    for entry in WalkDir::new(&src).max_depth(1).into_iter().filter_map(|e| e.ok()) {
        if entry.path() == src {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if entry.file_type().is_dir() {
            modules.insert(name);
        } else if let Some(stem) = std::path::Path::new(&name).file_stem() {
            let stem = stem.to_string_lossy().to_string();
            if stem != "lib" && stem != "main" && stem != "mod" {
                modules.insert(stem);
            }
        }
    }
    modules
}
