//! Cross-component findings and their correlations

use serde::{Deserialize, Serialize};

use super::id::generate_id;
use patternstore::now_ms;

/// Which component produced a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingComponent {
    Configuration,
    CodeChange,
    Performance,
    Architecture,
}

impl FindingComponent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::CodeChange => "code_change",
            Self::Performance => "performance",
            Self::Architecture => "architecture",
        }
    }
}

/// A single observation fed into the correlation engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub component: FindingComponent,

    /// Component-specific tag, e.g. `config_changed`, `error`, `regression`
    pub kind: String,

    pub payload: serde_json::Value,

    /// When the underlying event happened (Unix milliseconds)
    pub at: i64,
}

impl Finding {
    pub fn new(component: FindingComponent, kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            component,
            kind: kind.into(),
            payload,
            at: now_ms(),
        }
    }

    pub fn at(mut self, at: i64) -> Self {
        self.at = at;
        self
    }
}

/// The relation a correlation asserts between two findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationKind {
    /// A configuration change shortly preceded a failure
    ConfigPrecedesFailure,
    /// A code change shortly preceded a performance regression
    ChangePrecedesRegression,
    /// An architecture finding coincides with an integration conflict
    ArchitectureIntegration,
}

/// A typed link between findings from different components
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Correlation {
    pub id: String,
    pub kind: CorrelationKind,

    /// Confidence in [0, 1]
    pub confidence: f64,

    pub description: String,

    /// The two findings that produced this link
    pub cause: Finding,
    pub effect: Finding,

    pub created_at: i64,
}

impl Correlation {
    pub fn new(
        kind: CorrelationKind,
        confidence: f64,
        description: impl Into<String>,
        cause: Finding,
        effect: Finding,
    ) -> Self {
        let description = description.into();
        Self {
            id: generate_id("corr", &description),
            kind,
            confidence: confidence.clamp(0.0, 1.0),
            description,
            cause,
            effect,
            created_at: now_ms(),
        }
    }
}
