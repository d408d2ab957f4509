//! Cox proportional-hazards partial likelihood as a gradient-boosting loss.
//!
//! [`CoxPh`] binds the loss to one dataset and exposes the per-iteration
//! operations a boosting loop needs: working response, deviance, leaf Newton
//! steps and out-of-bag improvement. [`CoxBoost`] drives them with a stump
//! base learner.

pub mod boosting;
pub mod config;
pub mod coxph;
pub mod data;
pub mod error;
pub mod layout;
pub mod learners;
pub(crate) mod sweep;
pub mod ties;
pub mod tree;

// Re-export commonly used types at crate root
pub use boosting::{CoxBoost, IterationRecord};
pub use config::{BoostingConfig, CoxConfig};
pub use coxph::{CoxParams, CoxPh};
pub use data::{compute_sort_order, Bag, CoxDataset, RowSet};
pub use error::{ConfigurationError, CoxError, Result};
pub use layout::{EventSummary, LayoutKind, LeafFitReport};
pub use ties::TieMethod;
pub use tree::{NodeTable, TerminalNodes};
