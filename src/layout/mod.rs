//! The two risk-set layouts and the operations they share.
//!
//! A layout knows when a row is at risk. Everything else, from the working
//! response to the leaf Newton step, is written once against [`RiskWindow`]
//! and driven by the sweep in [`crate::sweep`].

pub mod censored;
pub mod counting;

pub use censored::CensoredLayout;
pub use counting::CountingLayout;

use crate::data::{Bag, CoxDataset};
use crate::error::ConfigurationError;
use crate::sweep::{
    sweep, HazardCollector, LogLikelihood, RiskWindow, StratumBlock, SumTree, SweepObserver,
    TiedGroup,
};
use crate::ties::TieMethod;
use crate::tree::TerminalNodes;
use log::warn;
use ndarray::{Array1, ArrayView1};

/// Which layout a model dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    /// Right-censored `(end, status)` data; rows are at risk from time zero.
    Censored,
    /// Counting-process `(start, end, status)` data; rows are at risk on `(start, end]`.
    Counting,
}

/// Immutable settings every operation needs alongside the layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Settings {
    pub ties: TieMethod,
    pub prior: f64,
}

/// Outcome of one leaf-fitting pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeafFitReport {
    /// Nodes that received a finite Newton step.
    pub fitted_nodes: usize,
    /// Nodes without in-bag rows, set to zero.
    pub empty_nodes: usize,
    /// Nodes whose step was not finite, set to zero.
    pub fallback_nodes: usize,
}

/// One row of [`crate::CoxPh::risk_table`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventSummary {
    pub stratum: usize,
    pub time: f64,
    pub n_at_risk: usize,
    pub n_events: usize,
    pub event_weight: f64,
    /// `Σ w·exp(η)` over the risk set.
    pub risk_set_sum: f64,
}

/// Operations shared by both layouts.
pub(crate) trait RiskLayout: RiskWindow {
    fn compute_working_response(
        &self,
        settings: Settings,
        data: &CoxDataset<'_>,
        bag: &Bag,
        f: &Array1<f64>,
        residuals: &mut Array1<f64>,
    ) {
        let weights = self.participating(data.in_bag_weights(bag));
        let eta = linear_predictor(data, f);
        let mut collector = HazardCollector::new(settings.ties, self.strata_blocks().len());
        sweep(self, &eta, &weights, &mut collector);
        let hazards = collector.finish();

        for (block, hazard) in self.strata_blocks().iter().zip(hazards.iter()) {
            for pos in block.positions.clone() {
                let row = self.row_at(pos);
                if !data.is_in_bag(row, bag) {
                    continue;
                }
                let Some(hazard) = hazard.as_ref().filter(|_| weights[row] > 0.0) else {
                    // Weighted out of the fit entirely.
                    residuals[row] = 0.0;
                    continue;
                };
                let end = self.end(row);
                let status = self.status(row);
                let lambda = if status > 0.0 {
                    hazard.for_event(self.start(row), end)
                } else {
                    hazard.over(self.start(row), end)
                };
                residuals[row] = status - (eta[row] - hazard.center).exp() * lambda;
            }
        }
    }

    fn deviance(
        &self,
        settings: Settings,
        data: &CoxDataset<'_>,
        bag: &Bag,
        f: &Array1<f64>,
    ) -> f64 {
        let weights = self.participating(data.active_weights(bag));
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return 0.0;
        }
        let eta = linear_predictor(data, f);
        -2.0 * self.log_likelihood(settings.ties, &eta, &weights) / total
    }

    fn fit_best_constant(
        &self,
        settings: Settings,
        data: &CoxDataset<'_>,
        bag: &Bag,
        f: &Array1<f64>,
        n_nodes: usize,
        residuals: &Array1<f64>,
        tree: &mut dyn TerminalNodes,
    ) -> LeafFitReport {
        let weights = self.participating(data.in_bag_weights(bag));
        let eta = linear_predictor(data, f);
        let nodes = tree.node_assignments().to_vec();

        let mut gradient = vec![0.0; n_nodes];
        let mut populated = vec![false; n_nodes];
        for (row, &node) in nodes.iter().enumerate().take(self.n_rows()) {
            if node < n_nodes && data.is_in_bag(row, bag) {
                populated[node] = true;
                gradient[node] += weights[row] * residuals[row];
            }
        }

        let mut information = NodeInformation::new(settings.ties, &nodes, n_nodes);
        sweep(self, &eta, &weights, &mut information);

        let mut report = LeafFitReport::default();
        for node in 0..n_nodes {
            if !populated[node] {
                report.empty_nodes += 1;
                tree.set_node_prediction(node, 0.0);
                continue;
            }
            let step = gradient[node] / (information.diagonal[node] + settings.prior);
            if step.is_finite() {
                report.fitted_nodes += 1;
                tree.set_node_prediction(node, step);
            } else {
                report.fallback_nodes += 1;
                tree.set_node_prediction(node, 0.0);
            }
        }
        if report.fallback_nodes > 0 {
            warn!(
                "{} of {} terminal nodes had a non-finite Newton step and were set to zero",
                report.fallback_nodes, n_nodes
            );
        }
        report
    }

    fn bag_improvement(
        &self,
        settings: Settings,
        data: &CoxDataset<'_>,
        bag: &Bag,
        f: &Array1<f64>,
        shrinkage: f64,
        delta: &Array1<f64>,
    ) -> f64 {
        if shrinkage == 0.0 {
            return 0.0;
        }
        let weights = self.participating(data.out_of_bag_weights(bag));
        let event_weight: f64 = weights
            .iter()
            .enumerate()
            .filter(|&(row, _)| self.status(row) > 0.0)
            .map(|(_, w)| w)
            .sum();
        if event_weight <= 0.0 {
            return 0.0;
        }

        let before = linear_predictor(data, f);
        let after: Vec<f64> = before
            .iter()
            .zip(delta.iter())
            .map(|(eta, d)| eta + shrinkage * d)
            .collect();
        let improvement = self.log_likelihood(settings.ties, &after, &weights)
            - self.log_likelihood(settings.ties, &before, &weights);
        improvement / event_weight
    }

    fn risk_table(&self, data: &CoxDataset<'_>, bag: &Bag, f: &Array1<f64>) -> Vec<EventSummary> {
        let weights = self.participating(data.active_weights(bag));
        let eta = linear_predictor(data, f);
        let mut table = RiskTable {
            blocks: self.strata_blocks(),
            center: 0.0,
            stratum: 0,
            rows: Vec::new(),
        };
        sweep(self, &eta, &weights, &mut table);
        let mut rows = table.rows;
        rows.sort_by(|a, b| a.stratum.cmp(&b.stratum).then_with(|| a.time.total_cmp(&b.time)));
        rows
    }

    /// Zeroes the weight of rows whose interval is empty.
    fn participating(&self, mut weights: Vec<f64>) -> Vec<f64> {
        for (row, w) in weights.iter_mut().enumerate() {
            if !self.has_interval(row) {
                *w = 0.0;
            }
        }
        weights
    }

    fn log_likelihood(&self, ties: TieMethod, eta: &[f64], weights: &[f64]) -> f64 {
        let mut total = LogLikelihood::new(ties);
        sweep(self, eta, weights, &mut total);
        total.total
    }
}

/// `η = offset + f` for every row.
fn linear_predictor(data: &CoxDataset<'_>, f: &Array1<f64>) -> Vec<f64> {
    f.iter()
        .enumerate()
        .map(|(row, &value)| data.offset(row) + value)
        .collect()
}

/// Accumulates the diagonal of the observed information per terminal node.
///
/// Each node keeps its risk in its own [`SumTree`], indexed by the row's rank
/// within the node, so exits never subtract from a node total.
struct NodeInformation<'n> {
    ties: TieMethod,
    nodes: &'n [usize],
    slots: Vec<usize>,
    risk: Vec<SumTree>,
    entered: Vec<usize>,
    event_risk: Vec<f64>,
    touched: Vec<usize>,
    diagonal: Vec<f64>,
}

impl<'n> NodeInformation<'n> {
    fn new(ties: TieMethod, nodes: &'n [usize], n_nodes: usize) -> Self {
        let mut sizes = vec![0usize; n_nodes];
        let slots = nodes
            .iter()
            .map(|&node| match sizes.get_mut(node) {
                Some(size) => {
                    *size += 1;
                    *size - 1
                }
                None => 0,
            })
            .collect();
        NodeInformation {
            ties,
            nodes,
            slots,
            risk: sizes.into_iter().map(SumTree::new).collect(),
            entered: Vec::new(),
            event_risk: vec![0.0; n_nodes],
            touched: Vec::new(),
            diagonal: vec![0.0; n_nodes],
        }
    }

    #[inline]
    fn node(&self, row: usize) -> Option<usize> {
        self.nodes.get(row).copied().filter(|&node| node < self.risk.len())
    }
}

impl SweepObserver for NodeInformation<'_> {
    fn begin_stratum(&mut self, _block: usize, _center: f64) {
        let entered = std::mem::take(&mut self.entered);
        for &row in &entered {
            if let Some(node) = self.node(row) {
                self.risk[node].set(self.slots[row], 0.0);
            }
        }
        self.entered = entered;
        self.entered.clear();
    }

    fn enter(&mut self, row: usize, risk: f64) {
        if let Some(node) = self.node(row) {
            self.risk[node].set(self.slots[row], risk);
            self.entered.push(row);
        }
    }

    fn leave(&mut self, row: usize, _risk: f64) {
        if let Some(node) = self.node(row) {
            self.risk[node].set(self.slots[row], 0.0);
        }
    }

    fn tied_event(&mut self, row: usize, risk: f64) {
        if let Some(node) = self.node(row) {
            self.event_risk[node] += risk;
            self.touched.push(node);
        }
    }

    fn tied_group(&mut self, group: &TiedGroup) {
        for (node, risk) in self.risk.iter().enumerate() {
            let node_risk = risk.total();
            if node_risk > 0.0 {
                self.diagonal[node] +=
                    group.node_information(self.ties, node_risk, self.event_risk[node]);
            }
        }
        for node in self.touched.drain(..) {
            self.event_risk[node] = 0.0;
        }
    }
}

struct RiskTable<'b> {
    blocks: &'b [StratumBlock],
    center: f64,
    stratum: usize,
    rows: Vec<EventSummary>,
}

impl SweepObserver for RiskTable<'_> {
    fn begin_stratum(&mut self, block: usize, center: f64) {
        self.center = center;
        self.stratum = self.blocks[block].stratum;
    }

    fn tied_group(&mut self, group: &TiedGroup) {
        self.rows.push(EventSummary {
            stratum: self.stratum,
            time: group.time,
            n_at_risk: group.n_at_risk,
            n_events: group.n_events,
            event_weight: group.event_weight,
            risk_set_sum: group.risk * self.center.exp(),
        });
    }
}

/// Checks that `order` is a permutation sorted by `(stratum, time)` and splits
/// it into strata blocks.
pub(crate) fn strata_blocks(
    column: &'static str,
    order: ArrayView1<'_, usize>,
    strata: ArrayView1<'_, usize>,
    time: impl Fn(usize) -> f64,
) -> Result<Vec<StratumBlock>, ConfigurationError> {
    let n_rows = strata.len();
    if order.len() != n_rows {
        return Err(ConfigurationError::RowCount {
            what: column,
            expected: n_rows,
            found: order.len(),
        });
    }

    let mut seen = vec![false; n_rows];
    for &row in order.iter() {
        if row >= n_rows || seen[row] {
            return Err(ConfigurationError::NotAPermutation { column, n_rows });
        }
        seen[row] = true;
    }

    let mut blocks: Vec<StratumBlock> = Vec::new();
    for pos in 0..n_rows {
        let row = order[pos];
        if pos > 0 {
            let prev = order[pos - 1];
            let out_of_order = strata[prev] > strata[row]
                || (strata[prev] == strata[row] && time(prev) > time(row));
            if out_of_order {
                return Err(ConfigurationError::UnsortedOrder { column, position: pos });
            }
        }
        match blocks.last_mut() {
            Some(block) if block.stratum == strata[row] => block.positions.end = pos + 1,
            _ => blocks.push(StratumBlock {
                stratum: strata[row],
                positions: pos..pos + 1,
            }),
        }
    }
    Ok(blocks)
}

/// Rejects non-finite times and statuses other than 0 and 1.
pub(crate) fn check_end_and_status(
    end: ArrayView1<'_, f64>,
    status: ArrayView1<'_, f64>,
) -> Result<(), ConfigurationError> {
    if let Some((row, &value)) = end.iter().enumerate().find(|(_, t)| !t.is_finite()) {
        return Err(ConfigurationError::NonFiniteTime { row, value });
    }
    if let Some((row, &value)) = status
        .iter()
        .enumerate()
        .find(|(_, s)| **s != 0.0 && **s != 1.0)
    {
        return Err(ConfigurationError::InvalidStatus { row, value });
    }
    Ok(())
}
