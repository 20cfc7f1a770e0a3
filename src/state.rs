//! Reservoir storage levels.
use serde::{Deserialize, Serialize};

/// Storage level of each tank, top to bottom, in mm of water depth.
///
/// Levels are never negative: every transition clamps at zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateVector {
    levels: Vec<f64>,
}

impl StateVector {
    /// Two-tank state `{S1, S2}`.
    pub fn new(s1: f64, s2: f64) -> Self {
        StateVector::from_levels(vec![s1, s2])
    }

    /// State for an arbitrary cascade, negative entries clamped to zero.
    pub fn from_levels(levels: Vec<f64>) -> Self {
        StateVector {
            levels: levels.into_iter().map(|x| x.max(0.0)).collect(),
        }
    }

    /// Level of the upper tank.
    pub fn s1(&self) -> f64 {
        self.level(0)
    }

    /// Level of the second tank.
    pub fn s2(&self) -> f64 {
        self.level(1)
    }

    /// Level of tank `i`, zero if the cascade is shallower.
    pub fn level(&self, i: usize) -> f64 {
        self.levels.get(i).copied().unwrap_or(0.0)
    }

    /// All levels, top to bottom.
    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    /// Number of tanks.
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Returns `true` for a cascade without tanks.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Total water held across all tanks.
    pub fn total(&self) -> f64 {
        self.levels.iter().sum()
    }
}

impl Default for StateVector {
    /// Both tanks at 10 mm.
    fn default() -> Self {
        StateVector::new(10.0, 10.0)
    }
}
