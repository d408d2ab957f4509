//! Gradient boosting with the Cox partial likelihood as the loss.

use crate::config::BoostingConfig;
use crate::coxph::{CoxParams, CoxPh};
use crate::data::{compute_sort_order, Bag, CoxDataset};
use crate::error::{ConfigurationError, Result};
use crate::learners::{BaseLearner, StumpLearner, TrainedBaseLearner};
use crate::tree::NodeTable;
use log::{debug, info};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Monitoring values recorded after each iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationRecord {
    pub iteration: u32,
    /// In-bag training deviance before the update.
    pub train_deviance: f64,
    /// Validation deviance after the update, when validation rows exist.
    pub valid_deviance: Option<f64>,
    pub oob_improvement: f64,
    pub fallback_nodes: usize,
}

/// A fitted tree together with its leaf values.
pub struct FittedTree {
    pub learner: Box<dyn TrainedBaseLearner>,
    pub leaf_values: Vec<f64>,
}

pub struct CoxBoost<B: BaseLearner = StumpLearner> {
    pub config: BoostingConfig,
    base_learner: B,

    pub trees: Vec<FittedTree>,
    pub history: Vec<IterationRecord>,
    n_features: Option<usize>,
    best_val_loss_itr: Option<usize>,
}

impl CoxBoost<StumpLearner> {
    pub fn new(config: BoostingConfig) -> Self {
        let learner = StumpLearner {
            min_node_rows: config.min_node_rows,
        };
        CoxBoost::with_learner(config, learner)
    }
}

impl<B: BaseLearner> CoxBoost<B> {
    pub fn with_learner(config: BoostingConfig, base_learner: B) -> Self {
        CoxBoost {
            config,
            base_learner,
            trees: Vec::new(),
            history: Vec::new(),
            n_features: None,
            best_val_loss_itr: None,
        }
    }

    /// Fits the ensemble.
    ///
    /// `response` has `(end, status)` or `(start, end, status)` columns. The
    /// leading `train_fraction` of rows are used for training and the rest
    /// are scored as validation rows after every iteration.
    pub fn fit(
        &mut self,
        x: &Array2<f64>,
        response: &Array2<f64>,
        strata: Option<&Array1<usize>>,
        sample_weight: Option<&Array1<f64>>,
    ) -> Result<()> {
        self.config.validate()?;
        let n_rows = x.nrows();
        if response.nrows() != n_rows {
            return Err(ConfigurationError::RowCount {
                what: "response",
                expected: n_rows,
                found: response.nrows(),
            }
            .into());
        }

        let strata = match strata {
            Some(s) => s.clone(),
            None => Array1::zeros(n_rows),
        };
        let sorted = compute_sort_order(response.view(), strata.view());
        let model = CoxPh::create(CoxParams::from_config(
            response.view(),
            sorted.view(),
            strata.view(),
            &self.config.cox,
        ))?;

        let train_rows = ((n_rows as f64) * self.config.train_fraction).round() as usize;
        let mut data = CoxDataset::new(n_rows).with_train_rows(train_rows.min(n_rows))?;
        if let Some(weights) = sample_weight {
            data = data.with_weights(weights.view())?;
        }

        self.trees.clear();
        self.history.clear();
        self.best_val_loss_itr = None;
        self.n_features = Some(x.ncols());

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };

        let shrinkage = self.config.shrinkage;
        let mut f = Array1::from_elem(n_rows, model.init_f(&data));
        let mut residuals = Array1::zeros(n_rows);
        let mut best_val_loss = f64::INFINITY;

        for itr in 0..self.config.n_trees {
            let bag = Bag::sample(data.train_rows(), self.config.bag_fraction, &mut rng);

            model.compute_working_response(&data, &bag, &f, &mut residuals);
            let train_deviance = model.deviance(&data, &bag, &f);

            let fit_weights: Vec<f64> = (0..n_rows)
                .map(|row| if data.is_in_bag(row, &bag) { data.weight(row) } else { 0.0 })
                .collect();
            let learner = self.base_learner.fit(x, &residuals, &fit_weights);
            let n_nodes = learner.n_nodes();
            let mut table = NodeTable::new(learner.assign(x), n_nodes);

            let report = model.fit_best_constant(&data, &bag, &f, n_nodes, &residuals, &mut table);
            let delta = table.row_predictions();
            let oob_improvement = model.bag_improvement(&data, &bag, &f, shrinkage, &delta);
            f.scaled_add(shrinkage, &delta);

            let valid_deviance = if data.validation().size_of_set() > 0 {
                let loss = model.deviance(&data.validation(), &bag, &f);
                if loss < best_val_loss {
                    best_val_loss = loss;
                    self.best_val_loss_itr = Some(itr as usize);
                }
                Some(loss)
            } else {
                None
            };

            let record = IterationRecord {
                iteration: itr,
                train_deviance,
                valid_deviance,
                oob_improvement,
                fallback_nodes: report.fallback_nodes,
            };
            debug!("{:?}", record);
            if self.should_log(itr) {
                match valid_deviance {
                    Some(valid) => info!(
                        "[iter {}] train_deviance={:.4} valid_deviance={:.4} oob_improve={:.5}",
                        itr, train_deviance, valid, oob_improvement
                    ),
                    None => info!(
                        "[iter {}] train_deviance={:.4} oob_improve={:.5}",
                        itr, train_deviance, oob_improvement
                    ),
                }
            }

            self.history.push(record);
            self.trees.push(FittedTree {
                learner,
                leaf_values: table.into_predictions(),
            });
        }

        Ok(())
    }

    /// Log relative hazard `Σ shrinkage·γ` of each row of `x`.
    pub fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        let mut f = Array1::zeros(x.nrows());
        for tree in &self.trees {
            for (i, node) in tree.learner.assign(x).into_iter().enumerate() {
                f[i] += self.config.shrinkage * tree.leaf_values.get(node).copied().unwrap_or(0.0);
            }
        }
        f
    }

    /// Iteration with the lowest validation deviance, if validation rows were used.
    pub fn best_val_loss_itr(&self) -> Option<usize> {
        self.best_val_loss_itr
    }

    pub fn n_features(&self) -> Option<usize> {
        self.n_features
    }

    fn should_log(&self, iteration: u32) -> bool {
        let every = self.config.verbose_eval;
        every > 0 && iteration % every == 0
    }
}
