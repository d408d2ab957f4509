//! Risk-set sweep shared by both data layouts.
//!
//! Rows are visited stratum by stratum, latest end time first. A row joins the
//! risk set when the sweep reaches its end time; in layouts with start times it
//! leaves again once the sweep passes below its start. Every distinct end time
//! carrying at least one event closes a [`TiedGroup`] holding the risk sums at
//! that instant.
//!
//! Within a stratum all exponentials are taken relative to the largest linear
//! predictor of the participating rows. Partial-likelihood quantities are
//! invariant to that shift, and it keeps `exp` finite for large scores.
//!
//! Risk sums are held in a [`SumTree`] rather than a running total. A row that
//! leaves is zeroed in the tree and the sums above it are rebuilt from their
//! children, so when a dominant row exits the small risks left behind are not
//! swallowed by `total − exiting`.

use crate::ties::TieMethod;
use std::ops::Range;

/// Floor applied to every risk-set denominator.
pub(crate) const MIN_DENOMINATOR: f64 = 1e-300;

/// Sum of nonnegative terms stored as a binary tree of partial sums.
///
/// Every internal node is recomputed from its two children after an update,
/// never adjusted by a difference, so the total and any range sum carry only
/// a few ulps of relative error whatever was removed before.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SumTree {
    leaves: usize,
    len: usize,
    nodes: Vec<f64>,
}

impl SumTree {
    /// `len` zero terms.
    pub fn new(len: usize) -> Self {
        let leaves = len.max(1).next_power_of_two();
        SumTree {
            leaves,
            len,
            nodes: vec![0.0; 2 * leaves],
        }
    }

    pub fn from_values(values: &[f64]) -> Self {
        let mut tree = SumTree::new(values.len());
        let leaves = tree.leaves;
        tree.nodes[leaves..leaves + values.len()].copy_from_slice(values);
        for i in (1..leaves).rev() {
            tree.nodes[i] = tree.nodes[2 * i] + tree.nodes[2 * i + 1];
        }
        tree
    }

    pub fn set(&mut self, slot: usize, value: f64) {
        let mut i = self.leaves + slot;
        self.nodes[i] = value;
        while i > 1 {
            i /= 2;
            self.nodes[i] = self.nodes[2 * i] + self.nodes[2 * i + 1];
        }
    }

    pub fn total(&self) -> f64 {
        self.nodes[1]
    }

    /// Sum of the terms at `slots`; zero for an empty range.
    pub fn range_sum(&self, slots: Range<usize>) -> f64 {
        let end = slots.end.min(self.len);
        if slots.start >= end {
            return 0.0;
        }
        let mut lo = slots.start + self.leaves;
        let mut hi = end + self.leaves;
        let mut sum = 0.0;
        while lo < hi {
            if lo & 1 == 1 {
                sum += self.nodes[lo];
                lo += 1;
            }
            if hi & 1 == 1 {
                hi -= 1;
                sum += self.nodes[hi];
            }
            lo /= 2;
            hi /= 2;
        }
        sum
    }
}

/// A contiguous run of one stratum in the end-time sort order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StratumBlock {
    pub stratum: usize,
    pub positions: Range<usize>,
}

/// Entry and exit rules of a data layout.
pub(crate) trait RiskWindow {
    fn n_rows(&self) -> usize;

    /// Strata as position ranges of the end-time order.
    fn strata_blocks(&self) -> &[StratumBlock];

    /// Row at `position` of the end-time order.
    fn row_at(&self, position: usize) -> usize;

    fn end(&self, row: usize) -> f64;

    fn status(&self, row: usize) -> f64;

    /// Start of the row's at-risk interval, `None` when at risk from the origin.
    fn start(&self, _row: usize) -> Option<f64> {
        None
    }

    /// False for rows whose interval is empty; those never take part.
    fn has_interval(&self, _row: usize) -> bool {
        true
    }

    /// Initial exit cursor for `block`.
    fn exit_cursor(&self, _block: usize) -> usize {
        0
    }

    /// Calls `leave` for every row of `block` not yet removed whose interval
    /// starts at or after `time`, moving `cursor` past it.
    fn exits_from(
        &self,
        _block: usize,
        _cursor: &mut usize,
        _time: f64,
        _leave: &mut dyn FnMut(usize),
    ) {
    }
}
/// Events sharing one end time within a stratum, with the risk set at that time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TiedGroup {
    pub time: f64,
    pub n_events: usize,
    /// Total case weight of the tied events.
    pub event_weight: f64,
    /// `Σ w·(η − c)` over the tied events.
    pub event_score: f64,
    /// `Σ w·exp(η − c)` over the tied events.
    pub event_risk: f64,
    /// `Σ w·exp(η − c)` over the whole risk set.
    pub risk: f64,
    pub n_at_risk: usize,
}

/// Hazard increments contributed by one tied group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct GroupHazard {
    /// Increment seen by every risk-set member that is not one of the tied events.
    pub at_risk: f64,
    /// Increment seen by each of the tied events.
    pub own: f64,
    /// Weighted sum of log denominators.
    pub log_denominator: f64,
}

impl TiedGroup {
    fn new(time: f64) -> Self {
        TiedGroup {
            time,
            n_events: 0,
            event_weight: 0.0,
            event_score: 0.0,
            event_risk: 0.0,
            risk: 0.0,
            n_at_risk: 0,
        }
    }

    fn add_event(&mut self, weight: f64, score: f64, risk: f64) {
        self.n_events += 1;
        self.event_weight += weight;
        self.event_score += weight * score;
        self.event_risk += risk;
    }

    /// Denominator steps as `(weight share, fraction of own risk removed)`.
    fn steps(&self, ties: TieMethod) -> impl Iterator<Item = (f64, f64)> {
        let (n_steps, share) = match ties {
            TieMethod::Breslow => (1, self.event_weight),
            TieMethod::Efron => (self.n_events, self.event_weight / self.n_events as f64),
        };
        let k = n_steps as f64;
        (0..n_steps).map(move |r| (share, r as f64 / k))
    }

    #[inline]
    fn denominator(&self, fraction: f64) -> f64 {
        (self.risk - fraction * self.event_risk).max(MIN_DENOMINATOR)
    }

    pub fn hazard(&self, ties: TieMethod) -> GroupHazard {
        let mut hazard = GroupHazard {
            at_risk: 0.0,
            own: 0.0,
            log_denominator: 0.0,
        };
        for (share, fraction) in self.steps(ties) {
            let denom = self.denominator(fraction);
            hazard.at_risk += share / denom;
            hazard.own += share * (1.0 - fraction) / denom;
            hazard.log_denominator += share * denom.ln();
        }
        hazard
    }

    /// This group's term of the log partial likelihood.
    pub fn log_likelihood(&self, ties: TieMethod) -> f64 {
        self.event_score - self.hazard(ties).log_denominator
    }

    /// Observed information for a common shift of the rows of one terminal
    /// node, given that node's share of the risk set and of the tied events.
    pub fn node_information(&self, ties: TieMethod, node_risk: f64, node_event_risk: f64) -> f64 {
        self.steps(ties)
            .map(|(share, fraction)| {
                let node_share = node_risk - fraction * node_event_risk;
                let q = (node_share / self.denominator(fraction)).clamp(0.0, 1.0);
                share * (q - q * q)
            })
            .sum()
    }
}

/// Callbacks fired while a sweep runs.
pub(crate) trait SweepObserver {
    fn begin_stratum(&mut self, _block: usize, _center: f64) {}
    fn enter(&mut self, _row: usize, _risk: f64) {}
    fn leave(&mut self, _row: usize, _risk: f64) {}
    fn tied_event(&mut self, _row: usize, _risk: f64) {}
    fn tied_group(&mut self, group: &TiedGroup);
}

/// Largest linear predictor among the participating rows of `block`.
pub(crate) fn stratum_center<W>(
    window: &W,
    block: &StratumBlock,
    eta: &[f64],
    weight: &[f64],
) -> Option<f64>
where
    W: RiskWindow + ?Sized,
{
    block
        .positions
        .clone()
        .map(|pos| window.row_at(pos))
        .filter(|&row| weight[row] > 0.0)
        .map(|row| eta[row])
        .reduce(f64::max)
}

/// Runs one sweep over every stratum. Rows with a zero `weight` are skipped.
pub(crate) fn sweep<W, O>(window: &W, eta: &[f64], weight: &[f64], observer: &mut O)
where
    W: RiskWindow + ?Sized,
    O: SweepObserver,
{
    let mut slot_of = vec![0usize; window.n_rows()];
    for (b, block) in window.strata_blocks().iter().enumerate() {
        let Some(center) = stratum_center(window, block, eta, weight) else {
            continue;
        };
        observer.begin_stratum(b, center);

        let first = block.positions.start;
        let mut risk_set = SumTree::new(block.positions.len());
        let mut members = 0usize;
        let mut cursor = window.exit_cursor(b);
        let mut pos = block.positions.end;

        while pos > first {
            let time = window.end(window.row_at(pos - 1));
            let mut group = TiedGroup::new(time);

            while pos > first && window.end(window.row_at(pos - 1)) == time {
                pos -= 1;
                let row = window.row_at(pos);
                let w = weight[row];
                if w <= 0.0 {
                    continue;
                }
                let score = eta[row] - center;
                let risk = w * score.exp();
                slot_of[row] = pos - first;
                risk_set.set(pos - first, risk);
                members += 1;
                observer.enter(row, risk);
                if window.status(row) > 0.0 {
                    group.add_event(w, score, risk);
                    observer.tied_event(row, risk);
                }
            }

            window.exits_from(b, &mut cursor, time, &mut |row| {
                let w = weight[row];
                if w > 0.0 {
                    let risk = w * (eta[row] - center).exp();
                    risk_set.set(slot_of[row], 0.0);
                    members = members.saturating_sub(1);
                    observer.leave(row, risk);
                }
            });

            if group.n_events > 0 {
                group.risk = risk_set.total().max(MIN_DENOMINATOR);
                group.n_at_risk = members;
                observer.tied_group(&group);
            }
        }
    }
}

/// Cumulative hazard of one stratum as a step function of time.
#[derive(Debug, Clone)]
pub(crate) struct StratumHazard {
    pub center: f64,
    /// Event times, ascending.
    times: Vec<f64>,
    /// Increment seen by a non-event member at each event time.
    increments: SumTree,
    /// Increment seen by each tied event at its own time.
    own: Vec<f64>,
}

impl StratumHazard {
    fn first_after(&self, time: f64) -> usize {
        self.times.partition_point(|&t| t <= time)
    }

    /// Hazard accumulated over event times in `(start, end]`, from the origin
    /// when `start` is `None`.
    pub fn over(&self, start: Option<f64>, end: f64) -> f64 {
        let lo = start.map_or(0, |s| self.first_after(s));
        self.increments.range_sum(lo..self.first_after(end))
    }

    /// Hazard seen by an event at `end`: the increments strictly before `end`
    /// plus the event's own increment there.
    pub fn for_event(&self, start: Option<f64>, end: f64) -> f64 {
        let lo = start.map_or(0, |s| self.first_after(s));
        let at = self.times.partition_point(|&t| t < end);
        let own = match self.times.get(at) {
            Some(&t) if t == end => self.own[at],
            _ => 0.0,
        };
        self.increments.range_sum(lo..at) + own
    }
}

#[derive(Debug, Default)]
struct HazardSteps {
    center: f64,
    times: Vec<f64>,
    at_risk: Vec<f64>,
    own: Vec<f64>,
}

/// Collects the per-stratum cumulative hazards of a sweep.
pub(crate) struct HazardCollector {
    ties: TieMethod,
    strata: Vec<Option<HazardSteps>>,
    current: usize,
}

impl HazardCollector {
    pub fn new(ties: TieMethod, n_blocks: usize) -> Self {
        HazardCollector {
            ties,
            strata: (0..n_blocks).map(|_| None).collect(),
            current: 0,
        }
    }

    /// Finalised hazards indexed by stratum block; `None` for strata without
    /// participating rows.
    pub fn finish(self) -> Vec<Option<StratumHazard>> {
        self.strata
            .into_iter()
            .map(|steps| {
                steps.map(|mut steps| {
                    // Groups arrive latest first.
                    steps.times.reverse();
                    steps.at_risk.reverse();
                    steps.own.reverse();
                    StratumHazard {
                        center: steps.center,
                        times: steps.times,
                        increments: SumTree::from_values(&steps.at_risk),
                        own: steps.own,
                    }
                })
            })
            .collect()
    }
}

impl SweepObserver for HazardCollector {
    fn begin_stratum(&mut self, block: usize, center: f64) {
        self.current = block;
        self.strata[block] = Some(HazardSteps {
            center,
            ..HazardSteps::default()
        });
    }

    fn tied_group(&mut self, group: &TiedGroup) {
        let hazard = group.hazard(self.ties);
        if let Some(steps) = self.strata[self.current].as_mut() {
            steps.times.push(group.time);
            steps.at_risk.push(hazard.at_risk);
            steps.own.push(hazard.own);
        }
    }
}

/// Sums the log partial likelihood over every tied group.
pub(crate) struct LogLikelihood {
    ties: TieMethod,
    pub total: f64,
}

impl LogLikelihood {
    pub fn new(ties: TieMethod) -> Self {
        LogLikelihood { ties, total: 0.0 }
    }
}

impl SweepObserver for LogLikelihood {
    fn tied_group(&mut self, group: &TiedGroup) {
        self.total += group.log_likelihood(self.ties);
    }
}
