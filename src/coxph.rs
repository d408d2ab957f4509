//! Cox proportional-hazards loss: layout selection and the per-iteration
//! operations a boosting loop calls.

use crate::config::CoxConfig;
use crate::data::{Bag, CoxDataset};
use crate::error::{ConfigurationError, Result};
use crate::layout::{
    CensoredLayout, CountingLayout, EventSummary, LayoutKind, LeafFitReport, RiskLayout, Settings,
};
use crate::ties::TieMethod;
use crate::tree::TerminalNodes;
use log::debug;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

/// Everything [`CoxPh::create`] needs.
///
/// `response` holds `(end, status)` or `(start, end, status)` columns. `sorted`
/// mirrors it: a single end-time order for the former, start and end orders
/// for the latter, each sorted by `(stratum, time)`. See
/// [`crate::compute_sort_order`].
///
/// The tie method is resolved during construction and not kept, so it may
/// borrow from a shorter-lived buffer than the arrays.
#[derive(Debug, Clone, Copy)]
pub struct CoxParams<'a, 't> {
    pub response: ArrayView2<'a, f64>,
    pub sorted: ArrayView2<'a, usize>,
    pub strata: ArrayView1<'a, usize>,
    pub tie_method: Option<&'t str>,
    pub prior_coefficient_variation: f64,
}

impl<'a> CoxParams<'a, 'static> {
    pub fn from_config(
        response: ArrayView2<'a, f64>,
        sorted: ArrayView2<'a, usize>,
        strata: ArrayView1<'a, usize>,
        config: &CoxConfig,
    ) -> Self {
        CoxParams {
            response,
            sorted,
            strata,
            tie_method: Some(config.ties.as_str()),
            prior_coefficient_variation: config.prior_coefficient_variation,
        }
    }
}

#[derive(Debug, Clone)]
enum Layout<'a> {
    Censored(CensoredLayout<'a>),
    Counting(CountingLayout<'a>),
}

/// The Cox partial-likelihood loss bound to one dataset.
///
/// Borrows the caller's response, sort and strata arrays for its lifetime.
/// Every operation is a pure function of its arguments plus the immutable
/// state fixed at construction.
#[derive(Debug, Clone)]
pub struct CoxPh<'a> {
    layout: Layout<'a>,
    settings: Settings,
}

impl<'a> CoxPh<'a> {
    /// Validates `params` and selects the layout.
    ///
    /// A response with more than two columns selects the counting layout and
    /// reads sort column 0 as the start order and column 1 as the end order.
    /// Otherwise the censored layout reads sort column 0 as the end order.
    pub fn create(params: CoxParams<'a, '_>) -> Result<Self> {
        let tie_method = params
            .tie_method
            .ok_or(ConfigurationError::MissingTieMethod)?;
        let ties = TieMethod::resolve(tie_method)?;
        let prior = params.prior_coefficient_variation;
        if !prior.is_finite() || prior < 0.0 {
            return Err(ConfigurationError::InvalidPrior(prior).into());
        }

        let response = params.response;
        let n_rows = response.nrows();
        if params.strata.len() != n_rows {
            return Err(ConfigurationError::RowCount {
                what: "strata",
                expected: n_rows,
                found: params.strata.len(),
            }
            .into());
        }
        if params.sorted.nrows() != n_rows {
            return Err(ConfigurationError::RowCount {
                what: "sort table",
                expected: n_rows,
                found: params.sorted.nrows(),
            }
            .into());
        }

        let layout = match response.ncols() {
            n if n < 2 => return Err(ConfigurationError::ResponseColumns(n).into()),
            2 => {
                require_sort_columns("censored", 1, params.sorted.ncols())?;
                Layout::Censored(CensoredLayout::new(
                    response.index_axis_move(Axis(1), 0),
                    response.index_axis_move(Axis(1), 1),
                    params.strata,
                    params.sorted.index_axis_move(Axis(1), 0),
                )?)
            }
            n => {
                if n > 3 {
                    debug!("ignoring {} trailing response columns", n - 3);
                }
                require_sort_columns("counting", 2, params.sorted.ncols())?;
                Layout::Counting(CountingLayout::new(
                    response.index_axis_move(Axis(1), 0),
                    response.index_axis_move(Axis(1), 1),
                    response.index_axis_move(Axis(1), 2),
                    params.strata,
                    params.sorted.index_axis_move(Axis(1), 0),
                    params.sorted.index_axis_move(Axis(1), 1),
                )?)
            }
        };

        let model = CoxPh {
            layout,
            settings: Settings { ties, prior },
        };
        debug!(
            "cox model over {} rows: {:?} layout, {} ties, prior {}",
            n_rows,
            model.layout_kind(),
            ties,
            prior
        );
        Ok(model)
    }

    fn active(&self) -> &dyn RiskLayout {
        match &self.layout {
            Layout::Censored(layout) => layout,
            Layout::Counting(layout) => layout,
        }
    }

    pub fn layout_kind(&self) -> LayoutKind {
        match self.layout {
            Layout::Censored(_) => LayoutKind::Censored,
            Layout::Counting(_) => LayoutKind::Counting,
        }
    }

    pub fn tie_method(&self) -> TieMethod {
        self.settings.ties
    }

    pub fn prior_coefficient_variation(&self) -> f64 {
        self.settings.prior
    }

    pub fn n_rows(&self) -> usize {
        self.active().n_rows()
    }

    /// Initial prediction for every row. Always zero, since the partial
    /// likelihood cannot identify a baseline level.
    pub fn init_f(&self, _data: &CoxDataset<'_>) -> f64 {
        0.0
    }

    /// Writes the martingale residual `δ − exp(η)·Λ` of every in-bag training
    /// row into `residuals`. Other rows are left untouched.
    pub fn compute_working_response(
        &self,
        data: &CoxDataset<'_>,
        bag: &Bag,
        f: &Array1<f64>,
        residuals: &mut Array1<f64>,
    ) {
        self.active()
            .compute_working_response(self.settings, data, bag, f, residuals)
    }

    /// `−2·log PL / Σw` over the active row set: in-bag rows of the training
    /// set, or every validation row.
    pub fn deviance(&self, data: &CoxDataset<'_>, bag: &Bag, f: &Array1<f64>) -> f64 {
        self.active().deviance(self.settings, data, bag, f)
    }

    /// Damped Newton step of the partial likelihood for each terminal node,
    /// written into `tree`.
    pub fn fit_best_constant(
        &self,
        data: &CoxDataset<'_>,
        bag: &Bag,
        f: &Array1<f64>,
        n_nodes: usize,
        residuals: &Array1<f64>,
        tree: &mut dyn TerminalNodes,
    ) -> LeafFitReport {
        self.active()
            .fit_best_constant(self.settings, data, bag, f, n_nodes, residuals, tree)
    }

    /// Change in out-of-bag log partial likelihood from moving `f` to
    /// `f + shrinkage·delta`, per unit of out-of-bag event weight.
    pub fn bag_improvement(
        &self,
        data: &CoxDataset<'_>,
        bag: &Bag,
        f: &Array1<f64>,
        shrinkage: f64,
        delta: &Array1<f64>,
    ) -> f64 {
        self.active()
            .bag_improvement(self.settings, data, bag, f, shrinkage, delta)
    }

    /// Risk-set summary at every distinct event time, ordered by stratum then time.
    pub fn risk_table(
        &self,
        data: &CoxDataset<'_>,
        bag: &Bag,
        f: &Array1<f64>,
    ) -> Vec<EventSummary> {
        self.active().risk_table(data, bag, f)
    }
}

fn require_sort_columns(layout: &'static str, expected: usize, found: usize) -> Result<()> {
    if found < expected {
        return Err(ConfigurationError::SortColumns {
            layout,
            expected,
            found,
        }
        .into());
    }
    Ok(())
}
