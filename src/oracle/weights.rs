//! Component weights.
//!
//! The config file carries a free-form `name -> weight` map. [`Weights::from_map`]
//! turns it into a fixed table indexed by [`Component`], failing on anything
//! that would make the weighted sum ambiguous.

use crate::config::ConfigError;
use crate::oracle::types::{Component, ComponentScores, COMPONENT_COUNT};
use std::collections::HashMap;
use tracing::debug;

/// Default weight per component, in breakdown order. Sums to 1.0.
const DEFAULT_WEIGHTS: [f64; COMPONENT_COUNT] = [0.18, 0.15, 0.12, 0.10, 0.08, 0.12, 0.15, 0.10];

/// Default weight map as it appears in the config file.
pub fn default_weight_map() -> HashMap<String, f64> {
    Weights::default().to_map()
}

/// Validated weight per component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weights {
    values: [f64; COMPONENT_COUNT],
}

impl Default for Weights {
    fn default() -> Self {
        Self { values: DEFAULT_WEIGHTS }
    }
}

impl Weights {
    /// Build from a config map. Every component must appear exactly once with a
    /// finite, non-negative weight. Unknown names are rejected.
    pub fn from_map(map: &HashMap<String, f64>) -> Result<Self, ConfigError> {
        // Sorted so the error names the same key on every run
        let mut names: Vec<&String> = map.keys().collect();
        names.sort();
        for name in names {
            if Component::from_name(name).is_none() {
                return Err(ConfigError::UnknownWeight(name.clone()));
            }
        }

        let mut values = [0.0; COMPONENT_COUNT];
        for component in Component::all() {
            let value = *map
                .get(component.as_str())
                .ok_or_else(|| ConfigError::MissingWeight(component.as_str().to_string()))?;
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidWeight {
                    name: component.as_str().to_string(),
                    value,
                });
            }
            values[component as usize] = value;
        }

        Ok(Self { values })
    }

    pub fn get(&self, component: Component) -> f64 {
        self.values[component as usize]
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Rescale so the weights sum to 1.0.
    pub fn normalized(&self) -> Result<Self, ConfigError> {
        let sum = self.sum();
        if sum <= 0.0 {
            return Err(ConfigError::ZeroWeights);
        }
        let mut values = self.values;
        for v in values.iter_mut() {
            *v /= sum;
        }
        Ok(Self { values })
    }

    /// `Σ score * weight` over all components.
    pub fn weighted_sum(&self, scores: &ComponentScores) -> f64 {
        let total = scores
            .iter()
            .map(|(component, score)| score * self.get(component))
            .sum();
        debug!("Weighted component sum: {:.2}", total);
        total
    }

    pub fn iter(&self) -> impl Iterator<Item = (Component, f64)> + '_ {
        Component::all().into_iter().map(move |c| (c, self.get(c)))
    }

    pub fn to_map(&self) -> HashMap<String, f64> {
        self.iter().map(|(c, w)| (c.as_str().to_string(), w)).collect()
    }
}
