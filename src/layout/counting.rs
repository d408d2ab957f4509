//! Counting-process data: each row is at risk on its own interval `(start, end]`.
//!
//! Rows enter through the end-time order exactly as in the censored layout.
//! A second cursor walks the start-time order from the back and removes rows
//! once the sweep reaches a time at or before their start. A subject split
//! into several rows is therefore at risk only inside the windows it reports.

use super::{check_end_and_status, strata_blocks, RiskLayout};
use crate::error::ConfigurationError;
use crate::sweep::{RiskWindow, StratumBlock};
use ndarray::ArrayView1;
use std::ops::Range;

#[derive(Debug, Clone)]
pub struct CountingLayout<'a> {
    start: ArrayView1<'a, f64>,
    end: ArrayView1<'a, f64>,
    status: ArrayView1<'a, f64>,
    sorted_start: ArrayView1<'a, usize>,
    sorted_end: ArrayView1<'a, usize>,
    end_blocks: Vec<StratumBlock>,
    start_blocks: Vec<Range<usize>>,
}

impl<'a> CountingLayout<'a> {
    pub fn new(
        start: ArrayView1<'a, f64>,
        end: ArrayView1<'a, f64>,
        status: ArrayView1<'a, f64>,
        strata: ArrayView1<'a, usize>,
        sorted_start: ArrayView1<'a, usize>,
        sorted_end: ArrayView1<'a, usize>,
    ) -> Result<Self, ConfigurationError> {
        let n_rows = end.len();
        for (what, found) in [
            ("start", start.len()),
            ("status", status.len()),
            ("strata", strata.len()),
        ] {
            if found != n_rows {
                return Err(ConfigurationError::RowCount {
                    what,
                    expected: n_rows,
                    found,
                });
            }
        }
        check_end_and_status(end, status)?;
        for row in 0..n_rows {
            if !start[row].is_finite() {
                return Err(ConfigurationError::NonFiniteTime { row, value: start[row] });
            }
            if start[row] > end[row] {
                return Err(ConfigurationError::StartAfterEnd {
                    row,
                    start: start[row],
                    end: end[row],
                });
            }
        }

        let end_blocks = strata_blocks("end", sorted_end, strata, |row| end[row])?;
        let start_blocks = strata_blocks("start", sorted_start, strata, |row| start[row])?;
        let same_strata = end_blocks.len() == start_blocks.len()
            && end_blocks.iter().zip(start_blocks.iter()).all(|(e, s)| e == s);
        if !same_strata {
            return Err(ConfigurationError::StrataMismatch);
        }

        Ok(CountingLayout {
            start,
            end,
            status,
            sorted_start,
            sorted_end,
            start_blocks: start_blocks.into_iter().map(|block| block.positions).collect(),
            end_blocks,
        })
    }
}

impl RiskWindow for CountingLayout<'_> {
    fn n_rows(&self) -> usize {
        self.end.len()
    }

    fn strata_blocks(&self) -> &[StratumBlock] {
        &self.end_blocks
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

    #[inline]
    fn start(&self, row: usize) -> Option<f64> {
        Some(self.start[row])
    }

    #[inline]
    fn has_interval(&self, row: usize) -> bool {
        self.start[row] < self.end[row]
    }

    fn exit_cursor(&self, block: usize) -> usize {
        self.start_blocks[block].end
    }

    fn exits_from(
        &self,
        block: usize,
        cursor: &mut usize,
        time: f64,
        leave: &mut dyn FnMut(usize),
    ) {
        let first = self.start_blocks[block].start;
        while *cursor > first {
            let row = self.sorted_start[*cursor - 1];
            if self.start[row] < time {
                break;
            }
            *cursor -= 1;
            leave(row);
        }
    }
}

impl RiskLayout for CountingLayout<'_> {}
