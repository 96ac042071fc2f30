//! Objective - a coarse goal grouping tasks, with a dimensional profile

use serde::{Deserialize, Serialize};

use super::dimensions::DimensionalProfile;
use super::id::generate_id;
use patternstore::now_ms;

/// Objective priority tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ObjectiveTier {
    Tertiary,
    Secondary,
    #[default]
    Primary,
}

impl ObjectiveTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::Tertiary => "tertiary",
        }
    }

    /// The strategic document this tier's objectives are listed in
    pub fn document_name(&self) -> &'static str {
        match self {
            Self::Primary => "PRIMARY_OBJECTIVES.md",
            Self::Secondary => "SECONDARY_OBJECTIVES.md",
            Self::Tertiary => "TERTIARY_OBJECTIVES.md",
        }
    }
}

impl std::fmt::Display for ObjectiveTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A coarse-grained goal that tasks attach to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Objective {
    pub id: String,
    pub title: String,
    pub tier: ObjectiveTier,

    /// Where the work sits in dimension space
    pub profile: DimensionalProfile,

    /// Fraction of the objective considered done, in [0, 1]
    pub completion: f64,

    /// Ids of tasks linked to this objective
    pub task_ids: Vec<String>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl Objective {
    pub fn new(title: impl Into<String>, tier: ObjectiveTier) -> Self {
        let title = title.into();
        let now = now_ms();
        Self {
            id: generate_id("obj", &title),
            title,
            tier,
            profile: DimensionalProfile::zero(),
            completion: 0.0,
            task_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_profile(mut self, profile: DimensionalProfile) -> Self {
        self.profile = profile;
        self.updated_at = now_ms();
        self
    }

    /// Link a task to this objective
    pub fn link_task(&mut self, task_id: impl Into<String>) {
        let task_id = task_id.into();
        if !self.task_ids.contains(&task_id) {
            self.task_ids.push(task_id);
            self.updated_at = now_ms();
        }
    }

    /// Set completion, clamped to [0, 1]
    pub fn set_completion(&mut self, completion: f64) {
        self.completion = completion.clamp(0.0, 1.0);
        self.updated_at = now_ms();
    }

    pub fn is_complete(&self, threshold: f64) -> bool {
        self.completion >= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Dimension;

    #[test]
    fn test_objective_new() {
        let obj = Objective::new("Ship feature Y", ObjectiveTier::Primary);
        assert_eq!(obj.tier, ObjectiveTier::Primary);
        assert_eq!(obj.completion, 0.0);
        assert!(obj.id.starts_with("obj-ship-feature-y-"));
    }

    #[test]
    fn test_link_task_dedupes() {
        let mut obj = Objective::new("x", ObjectiveTier::Secondary);
        obj.link_task("task-1");
        obj.link_task("task-1");
        assert_eq!(obj.task_ids.len(), 1);
    }

    #[test]
    fn test_set_completion_clamps() {
        let mut obj = Objective::new("x", ObjectiveTier::Primary);
        obj.set_completion(1.4);
        assert_eq!(obj.completion, 1.0);
        obj.set_completion(-0.2);
        assert_eq!(obj.completion, 0.0);
    }

    #[test]
    fn test_is_complete() {
        let mut obj = Objective::new("x", ObjectiveTier::Primary);
        obj.set_completion(0.96);
        assert!(obj.is_complete(0.95));
        assert!(!obj.is_complete(0.99));
    }

    #[test]
    fn test_tier_document_names() {
        assert_eq!(ObjectiveTier::Primary.document_name(), "PRIMARY_OBJECTIVES.md");
        assert_eq!(ObjectiveTier::Tertiary.document_name(), "TERTIARY_OBJECTIVES.md");
    }

    #[test]
    fn test_profile_roundtrip() {
        let profile = DimensionalProfile::from_pairs(&[(Dimension::Integration, 0.7)]);
        let obj = Objective::new("x", ObjectiveTier::Primary).with_profile(profile);
        let json = serde_json::to_string(&obj).unwrap();
        let back: Objective = serde_json::from_str(&json).unwrap();
        assert_eq!(back.profile.get(Dimension::Integration), 0.7);
    }
}
