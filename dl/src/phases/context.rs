//! PhaseContext - the injected collaborator bundle
//!
//! The coordinator owns one [`Collaborators`] set for its whole lifetime
//! and mints a fresh [`PhaseContext`] per execution: shared components are
//! cloned handles, per-execution items (conversation, tool context, scoped
//! documents) are new.

use std::path::PathBuf;
use std::sync::Arc;

use crate::correlation::CorrelationEngine;
use crate::bus::MessageBus;
use crate::domain::PhaseKind;
use crate::ipc::{DocumentHub, PhaseDocuments};
use crate::llm::Specialists;
use crate::patterns::PatternRecognition;
use crate::registry::{PromptRegistry, RoleRegistry, ToolRegistry};
use crate::state::StateStore;
use crate::tools::{ToolContext, ToolCreator, ToolHandler, ToolValidator};

use super::conversation::{Conversation, PrunePolicy};

/// Shared components constructed once at coordinator startup
#[derive(Clone)]
pub struct Collaborators {
    pub project_root: PathBuf,
    pub state: Arc<StateStore>,
    pub bus: Arc<MessageBus>,
    pub documents: Arc<DocumentHub>,
    pub prompts: Arc<PromptRegistry>,
    pub tool_registry: Arc<ToolRegistry>,
    pub roles: Arc<RoleRegistry>,
    pub specialists: Specialists,
    pub tools: Arc<ToolHandler>,
    pub creator: Arc<ToolCreator>,
    pub validator: Arc<ToolValidator>,
    pub patterns: Arc<PatternRecognition>,
    pub correlations: Arc<CorrelationEngine>,
    pub prune_policy: PrunePolicy,
}

impl Collaborators {
    /// Mint the per-execution context for one phase run
    pub fn context_for(&self, phase: PhaseKind) -> PhaseContext {
        PhaseContext {
            project_root: self.project_root.clone(),
            state: self.state.clone(),
            bus: self.bus.clone(),
            docs: PhaseDocuments::new(self.documents.clone(), phase),
            prompts: self.prompts.clone(),
            tool_registry: self.tool_registry.clone(),
            roles: self.roles.clone(),
            specialists: self.specialists.clone(),
            tools: self.tools.clone(),
            creator: self.creator.clone(),
            validator: self.validator.clone(),
            patterns: self.patterns.clone(),
            correlations: self.correlations.clone(),
            conversation: Conversation::new(self.prune_policy),
            tool_ctx: ToolContext::new(self.project_root.clone(), phase.as_str()),
        }
    }
}

/// Everything a phase may touch during one execution
pub struct PhaseContext {
    pub project_root: PathBuf,
    pub state: Arc<StateStore>,
    pub bus: Arc<MessageBus>,

    /// Documents scoped to this phase's permissions
    pub docs: PhaseDocuments,

    pub prompts: Arc<PromptRegistry>,
    pub tool_registry: Arc<ToolRegistry>,
    pub roles: Arc<RoleRegistry>,
    pub specialists: Specialists,
    pub tools: Arc<ToolHandler>,
    pub creator: Arc<ToolCreator>,
    pub validator: Arc<ToolValidator>,
    pub patterns: Arc<PatternRecognition>,
    pub correlations: Arc<CorrelationEngine>,

    /// This execution's bounded conversation
    pub conversation: Conversation,

    /// Sandboxed tool execution context for this run
    pub tool_ctx: ToolContext,
}

impl PhaseContext {
    pub fn phase(&self) -> PhaseKind {
        self.docs.phase()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::llm::{ChatResponse, mock::MockSpecialistClient};
    use std::sync::Arc;

    /// Build a full collaborator set over a temp project root with a
    /// scripted mock specialist. Shared by phase and coordinator tests.
    pub fn collaborators(root: &std::path::Path, responses: Vec<ChatResponse>) -> (Collaborators, Arc<MockSpecialistClient>) {
        let pipeline_dir = root.join(".pipeline");
        std::fs::create_dir_all(&pipeline_dir).unwrap();

        let state = Arc::new(StateStore::open(root).unwrap());
        let bus = Arc::new(MessageBus::new());
        let documents = Arc::new(DocumentHub::new(root));
        let prompts = Arc::new(
            PromptRegistry::open(pipeline_dir.join("prompts"), pipeline_dir.join("prompts.json")).unwrap(),
        );
        let tool_registry = Arc::new(
            ToolRegistry::open(pipeline_dir.join("tool_specs"), pipeline_dir.join("tool_specs.json")).unwrap(),
        );
        let roles = Arc::new(RoleRegistry::open(pipeline_dir.join("roles"), pipeline_dir.join("roles.json")).unwrap());

        let mock = Arc::new(MockSpecialistClient::new(responses));
        let specialists = Specialists::uniform(mock.clone());

        let creator = Arc::new(ToolCreator::default());
        let validator = Arc::new(ToolValidator::new());
        let tools = Arc::new(
            ToolHandler::new(root, tool_registry.clone(), creator.clone(), validator.clone(), bus.clone()).unwrap(),
        );
        let patterns = Arc::new(PatternRecognition::open(pipeline_dir.join("patterns.db")).unwrap());
        let correlations = Arc::new(CorrelationEngine::new());

        let collaborators = Collaborators {
            project_root: root.to_path_buf(),
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
        (collaborators, mock)
    }
}
