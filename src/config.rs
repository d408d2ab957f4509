//! Serializable settings for the loss and the boosting driver.
//!
//! A driver configuration reads from TOML:
//!
//! ```toml
//! n_trees = 200
//! shrinkage = 0.05
//! bag_fraction = 0.5
//! seed = 42
//!
//! [cox]
//! ties = "efron"
//! prior_coefficient_variation = 1.0
//! ```

use crate::error::{ConfigurationError, Result};
use crate::ties::TieMethod;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Loss settings. The tie method has no default and must always be given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoxConfig {
    pub ties: TieMethod,
    #[serde(default = "default_prior")]
    pub prior_coefficient_variation: f64,
}

fn default_prior() -> f64 {
    1.0
}

impl CoxConfig {
    pub fn new(ties: TieMethod) -> Self {
        CoxConfig {
            ties,
            prior_coefficient_variation: default_prior(),
        }
    }

    pub fn with_prior(mut self, prior: f64) -> Self {
        self.prior_coefficient_variation = prior;
        self
    }
}

/// Options of [`crate::CoxBoost`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoostingConfig {
    #[serde(default = "default_n_trees")]
    pub n_trees: u32,
    #[serde(default = "default_shrinkage")]
    pub shrinkage: f64,
    /// Fraction of training rows drawn into each iteration's bag.
    #[serde(default = "default_bag_fraction")]
    pub bag_fraction: f64,
    /// Leading fraction of rows used for training; the rest are validation rows.
    #[serde(default = "default_train_fraction")]
    pub train_fraction: f64,
    #[serde(default = "default_min_node_rows")]
    pub min_node_rows: usize,
    #[serde(default)]
    pub seed: Option<u64>,
    /// Log progress every this many iterations; zero disables it.
    #[serde(default)]
    pub verbose_eval: u32,
    pub cox: CoxConfig,
}

fn default_n_trees() -> u32 {
    100
}

fn default_shrinkage() -> f64 {
    0.1
}

fn default_bag_fraction() -> f64 {
    0.5
}

fn default_train_fraction() -> f64 {
    1.0
}

fn default_min_node_rows() -> usize {
    10
}

impl BoostingConfig {
    pub fn new(cox: CoxConfig) -> Self {
        BoostingConfig {
            n_trees: default_n_trees(),
            shrinkage: default_shrinkage(),
            bag_fraction: default_bag_fraction(),
            train_fraction: default_train_fraction(),
            min_node_rows: default_min_node_rows(),
            seed: None,
            verbose_eval: 0,
            cox,
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: BoostingConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        let out_of_range = |name, value: f64, reason| ConfigurationError::OutOfRange {
            name,
            value,
            reason,
        };

        if !(self.shrinkage.is_finite() && self.shrinkage > 0.0 && self.shrinkage <= 1.0) {
            return Err(out_of_range("shrinkage", self.shrinkage, "must lie in (0, 1]"));
        }
        if !(self.bag_fraction > 0.0 && self.bag_fraction <= 1.0) {
            return Err(out_of_range("bag_fraction", self.bag_fraction, "must lie in (0, 1]"));
        }
        if !(self.train_fraction > 0.0 && self.train_fraction <= 1.0) {
            return Err(out_of_range("train_fraction", self.train_fraction, "must lie in (0, 1]"));
        }
        if self.min_node_rows == 0 {
            return Err(out_of_range("min_node_rows", 0.0, "must be at least 1"));
        }
        let prior = self.cox.prior_coefficient_variation;
        if !prior.is_finite() || prior < 0.0 {
            return Err(ConfigurationError::InvalidPrior(prior));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = BoostingConfig::from_toml_str("[cox]\nties = \"breslow\"\n").unwrap();
        assert_eq!(config, BoostingConfig::new(CoxConfig::new(TieMethod::Breslow)));
    }

    #[test]
    fn test_missing_ties_is_a_parse_error() {
        let err = BoostingConfig::from_toml_str("n_trees = 5\n[cox]\n").unwrap_err();
        assert!(matches!(err, crate::error::CoxError::Toml(_)));
    }

    #[test]
    fn test_unknown_tie_literal_is_rejected() {
        assert!(BoostingConfig::from_toml_str("[cox]\nties = \"Efron\"\n").is_err());
    }

    #[test]
    fn test_validate_rejects_zero_shrinkage() {
        let mut config = BoostingConfig::new(CoxConfig::new(TieMethod::Efron));
        config.shrinkage = 0.0;
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigurationError::OutOfRange {
                name: "shrinkage",
                value: 0.0,
                reason: "must lie in (0, 1]"
            }
        );
    }
}
