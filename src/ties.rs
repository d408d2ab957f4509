//! Handling of events that share an exact time within a stratum.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Approximation used for the partial-likelihood denominator of tied events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TieMethod {
    /// Every tied event sees the full risk set.
    Breslow,
    /// The tied events' own risk is removed from the denominator in equal
    /// steps of `1/k`.
    Efron,
}

impl TieMethod {
    /// Resolves a configuration literal. Only `"efron"` and `"breslow"` are
    /// accepted; matching is case-sensitive.
    pub fn resolve(name: &str) -> Result<Self, ConfigurationError> {
        match name {
            "efron" => Ok(TieMethod::Efron),
            "breslow" => Ok(TieMethod::Breslow),
            other => Err(ConfigurationError::UnknownTieMethod(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TieMethod::Breslow => "breslow",
            TieMethod::Efron => "efron",
        }
    }
}

impl FromStr for TieMethod {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TieMethod::resolve(s)
    }
}

impl fmt::Display for TieMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
