//! Right-censored data: every row is at risk from time zero until its end time.

use super::{check_end_and_status, strata_blocks, RiskLayout};
use crate::error::ConfigurationError;
use crate::sweep::{RiskWindow, StratumBlock};
use ndarray::ArrayView1;

/// Risk sets over `(end, status)` rows.
///
/// Since nothing ever leaves, the risk set at time `t` is every row of the
/// stratum with an end time `≥ t`, which a single backward pass over the
/// end-time order accumulates.
#[derive(Debug, Clone)]
pub struct CensoredLayout<'a> {
    end: ArrayView1<'a, f64>,
    status: ArrayView1<'a, f64>,
    sorted_end: ArrayView1<'a, usize>,
    blocks: Vec<StratumBlock>,
}

impl<'a> CensoredLayout<'a> {
    pub fn new(
        end: ArrayView1<'a, f64>,
        status: ArrayView1<'a, f64>,
        strata: ArrayView1<'a, usize>,
        sorted_end: ArrayView1<'a, usize>,
    ) -> Result<Self, ConfigurationError> {
        let n_rows = end.len();
        for (what, found) in [("status", status.len()), ("strata", strata.len())] {
            if found != n_rows {
                return Err(ConfigurationError::RowCount {
                    what,
                    expected: n_rows,
                    found,
                });
            }
        }
        check_end_and_status(end, status)?;
        let blocks = strata_blocks("end", sorted_end, strata, |row| end[row])?;

        Ok(CensoredLayout {
            end,
            status,
            sorted_end,
            blocks,
        })
    }
}

impl RiskWindow for CensoredLayout<'_> {
    fn n_rows(&self) -> usize {
        self.end.len()
    }

    fn strata_blocks(&self) -> &[StratumBlock] {
        &self.blocks
    }

    #[inline]
    fn row_at(&self, position: usize) -> usize {
        self.sorted_end[position]
    }

    #[inline]
    fn end(&self, row: usize) -> f64 {
        self.end[row]
    }

    #[inline]
    fn status(&self, row: usize) -> f64 {
        self.status[row]
    }
}

impl RiskLayout for CensoredLayout<'_> {}
