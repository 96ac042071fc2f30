//! Dimensional profiles
//!
//! Objectives and phases both carry a profile over the same eight
//! dimensions. The scheduler compares the two to decide which phase moves
//! the active objective the most.

use serde::{Deserialize, Serialize};

/// Number of scheduling dimensions
pub const DIMENSION_COUNT: usize = 8;

/// A scheduling dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Temporal,
    Functional,
    Data,
    State,
    Error,
    Context,
    Integration,
    Architecture,
}

impl Dimension {
    /// All dimensions in index order
    pub const ALL: [Dimension; DIMENSION_COUNT] = [
        Dimension::Temporal,
        Dimension::Functional,
        Dimension::Data,
        Dimension::State,
        Dimension::Error,
        Dimension::Context,
        Dimension::Integration,
        Dimension::Architecture,
    ];

    /// Index of this dimension within a profile vector
    pub fn index(&self) -> usize {
        Self::ALL.iter().position(|d| d == self).unwrap_or(0)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Temporal => "temporal",
            Dimension::Functional => "functional",
            Dimension::Data => "data",
            Dimension::State => "state",
            Dimension::Error => "error",
            Dimension::Context => "context",
            Dimension::Integration => "integration",
            Dimension::Architecture => "architecture",
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A vector over the eight scheduling dimensions, each component in [0, 1]
///
/// Every mutation clamps, so a profile read back from anywhere in the
/// system is always in bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct DimensionalProfile(pub [f64; DIMENSION_COUNT]);

impl DimensionalProfile {
    /// All-zero profile
    pub fn zero() -> Self {
        Self([0.0; DIMENSION_COUNT])
    }

    /// Profile with every component set to the same (clamped) value
    pub fn uniform(value: f64) -> Self {
        Self([value.clamp(0.0, 1.0); DIMENSION_COUNT])
    }

    /// Build a profile from (dimension, value) pairs; the rest stay zero
    pub fn from_pairs(pairs: &[(Dimension, f64)]) -> Self {
        let mut profile = Self::zero();
        for (dim, value) in pairs {
            profile.set(*dim, *value);
        }
        profile
    }

    pub fn get(&self, dim: Dimension) -> f64 {
        self.0[dim.index()]
    }

    pub fn set(&mut self, dim: Dimension, value: f64) {
        self.0[dim.index()] = value.clamp(0.0, 1.0);
    }

    /// Add a (possibly negative) delta to one component, clamped
    pub fn nudge(&mut self, dim: Dimension, delta: f64) {
        let idx = dim.index();
        self.0[idx] = (self.0[idx] + delta).clamp(0.0, 1.0);
    }

    /// Closeness to another profile: `1 - mean(|a - b|)`, in [0, 1]
    pub fn fit(&self, other: &DimensionalProfile) -> f64 {
        let total: f64 = self
            .0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b).abs())
            .sum();
        1.0 - total / DIMENSION_COUNT as f64
    }

    /// Sum of all components, in [0, DIMENSION_COUNT]
    pub fn sum(&self) -> f64 {
        self.0.iter().sum()
    }

    /// The `n` dimensions with the highest values, descending
    pub fn dominant(&self, n: usize) -> Vec<Dimension> {
        let mut indexed: Vec<(Dimension, f64)> = Dimension::ALL.iter().map(|d| (*d, self.get(*d))).collect();
        indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        indexed.into_iter().take(n).map(|(d, _)| d).collect()
    }

    /// Exponentially smooth every component toward a target profile
    pub fn smooth_toward(&mut self, target: &DimensionalProfile, alpha: f64) {
        let alpha = alpha.clamp(0.0, 1.0);
        for i in 0..DIMENSION_COUNT {
            self.0[i] = ((1.0 - alpha) * self.0[i] + alpha * target.0[i]).clamp(0.0, 1.0);
        }
    }

    /// True when every component is within [0, 1]
    pub fn in_bounds(&self) -> bool {
        self.0.iter().all(|v| (0.0..=1.0).contains(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_index_roundtrip() {
        for dim in Dimension::ALL {
            assert_eq!(Dimension::ALL[dim.index()], dim);
        }
    }

    #[test]
    fn test_set_clamps() {
        let mut profile = DimensionalProfile::zero();
        profile.set(Dimension::Error, 1.7);
        assert_eq!(profile.get(Dimension::Error), 1.0);
        profile.set(Dimension::Error, -0.3);
        assert_eq!(profile.get(Dimension::Error), 0.0);
    }

    #[test]
    fn test_nudge_clamps() {
        let mut profile = DimensionalProfile::uniform(0.9);
        profile.nudge(Dimension::Data, 0.5);
        assert_eq!(profile.get(Dimension::Data), 1.0);
        profile.nudge(Dimension::Data, -2.0);
        assert_eq!(profile.get(Dimension::Data), 0.0);
    }

    #[test]
    fn test_fit_identical_profiles() {
        let a = DimensionalProfile::uniform(0.4);
        assert!((a.fit(&a) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_fit_opposite_profiles() {
        let a = DimensionalProfile::uniform(0.0);
        let b = DimensionalProfile::uniform(1.0);
        assert!(a.fit(&b).abs() < f64::EPSILON);
    }

    #[test]
    fn test_dominant_ordering() {
        let profile = DimensionalProfile::from_pairs(&[
            (Dimension::Error, 0.9),
            (Dimension::Functional, 0.6),
            (Dimension::Data, 0.3),
        ]);
        let top = profile.dominant(2);
        assert_eq!(top, vec![Dimension::Error, Dimension::Functional]);
    }

    #[test]
    fn test_smooth_toward_stays_in_bounds() {
        let mut a = DimensionalProfile::uniform(0.2);
        let b = DimensionalProfile::uniform(0.8);
        for _ in 0..100 {
            a.smooth_toward(&b, 0.2);
            assert!(a.in_bounds());
        }
        assert!((a.get(Dimension::Temporal) - 0.8).abs() < 0.01);
    }

    #[test]
    fn test_serde_roundtrip() {
        let profile = DimensionalProfile::from_pairs(&[(Dimension::State, 0.5)]);
        let json = serde_json::to_string(&profile).unwrap();
        let back: DimensionalProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(profile, back);
    }

    proptest::proptest! {
        // Every component stays in [0, 1] under any sequence of mutations
        #[test]
        fn prop_profile_stays_in_bounds(
            start in proptest::collection::vec(-2.0f64..2.0, DIMENSION_COUNT),
            nudges in proptest::collection::vec((0usize..DIMENSION_COUNT, -2.0f64..2.0), 0..50),
            target in proptest::collection::vec(0.0f64..1.0, DIMENSION_COUNT),
            alpha in 0.0f64..1.0,
        ) {
            let mut profile = DimensionalProfile::zero();
            for (i, value) in start.iter().enumerate() {
                profile.set(Dimension::ALL[i], *value);
            }
            proptest::prop_assert!(profile.in_bounds());

            for (index, delta) in nudges {
                profile.nudge(Dimension::ALL[index], delta);
                proptest::prop_assert!(profile.in_bounds());
            }

            let mut target_profile = DimensionalProfile::zero();
            for (i, value) in target.iter().enumerate() {
                target_profile.set(Dimension::ALL[i], *value);
            }
            profile.smooth_toward(&target_profile, alpha);
            proptest::prop_assert!(profile.in_bounds());
        }
    }
}
