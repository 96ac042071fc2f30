//! Specialist handles
//!
//! Three logical specialists share one client trait: coding (most capable
//! model), reasoning (strong analytical model), analysis (fast/cheap
//! model). Which model serves which role is configuration, never code.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::client::SpecialistClient;
use super::error::LlmError;
use super::types::{ChatRequest, ChatResponse};

/// Retry cap for transient transport failures
const MAX_RETRIES: u32 = 3;

/// The three specialist roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecialistKind {
    Coding,
    Reasoning,
    Analysis,
}

impl SpecialistKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Coding => "coding",
            Self::Reasoning => "reasoning",
            Self::Analysis => "analysis",
        }
    }
}

impl std::fmt::Display for SpecialistKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The bundle of configured specialist clients injected into phases
#[derive(Clone)]
pub struct Specialists {
    clients: HashMap<SpecialistKind, Arc<dyn SpecialistClient>>,
}

impl Specialists {
    pub fn new(
        coding: Arc<dyn SpecialistClient>,
        reasoning: Arc<dyn SpecialistClient>,
        analysis: Arc<dyn SpecialistClient>,
    ) -> Self {
        Self {
            clients: HashMap::from([
                (SpecialistKind::Coding, coding),
                (SpecialistKind::Reasoning, reasoning),
                (SpecialistKind::Analysis, analysis),
            ]),
        }
    }

    /// All three roles served by the same client (tests, single-model runs)
    pub fn uniform(client: Arc<dyn SpecialistClient>) -> Self {
        Self::new(client.clone(), client.clone(), client)
    }

    pub fn client(&self, kind: SpecialistKind) -> Arc<dyn SpecialistClient> {
        // The map always holds all three kinds by construction
        self.clients[&kind].clone()
    }

    /// One chat round trip with bounded, jittered retry on transient errors
    pub async fn ask(&self, kind: SpecialistKind, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let client = self.client(kind);
        let mut attempt = 0u32;

        loop {
            match client.chat(request.clone()).await {
                Ok(response) => {
                    debug!(
                        specialist = %kind,
                        model = client.model(),
                        tool_calls = response.tool_calls.len(),
                        "Specialist responded"
                    );
                    return Ok(response);
                }
                Err(err) if err.is_retryable() && attempt < MAX_RETRIES => {
                    let base = err
                        .retry_after()
                        .unwrap_or_else(|| Duration::from_millis(500 * 2u64.pow(attempt)));
                    let jitter = 1.0 + 0.2 * rand::random::<f64>();
                    let delay = base.mul_f64(jitter);
                    warn!(specialist = %kind, attempt, ?delay, error = %err, "Retrying specialist call");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
