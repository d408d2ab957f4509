//! Views over the row-indexed data the loss reads each iteration.
//!
//! Feature storage is not the concern of this crate: the loss only needs case
//! weights, optional offsets, the split between training and validation rows
//! and the bag drawn for the current iteration.

use crate::error::ConfigurationError;
use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::seq::SliceRandom;
use rand::Rng;

/// Which block of rows an evaluation covers.
///
/// Rows `0..train_rows` form the training set, the remainder the validation set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSet {
    Training,
    Validation,
}

/// Weights, offsets and the active row set for one pass over the data.
#[derive(Debug, Clone, Copy)]
pub struct CoxDataset<'a> {
    n_rows: usize,
    train_rows: usize,
    weights: Option<ArrayView1<'a, f64>>,
    offset: Option<ArrayView1<'a, f64>>,
    active: RowSet,
}

impl<'a> CoxDataset<'a> {
    /// Unit weights, no offset, every row in the training set.
    pub fn new(n_rows: usize) -> Self {
        CoxDataset {
            n_rows,
            train_rows: n_rows,
            weights: None,
            offset: None,
            active: RowSet::Training,
        }
    }

    pub fn with_weights(
        mut self,
        weights: ArrayView1<'a, f64>,
    ) -> Result<Self, ConfigurationError> {
        if weights.len() != self.n_rows {
            return Err(ConfigurationError::RowCount {
                what: "weights",
                expected: self.n_rows,
                found: weights.len(),
            });
        }
        if let Some((row, &value)) = weights
            .iter()
            .enumerate()
            .find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return Err(ConfigurationError::InvalidWeight { row, value });
        }
        self.weights = Some(weights);
        Ok(self)
    }

    pub fn with_offset(mut self, offset: ArrayView1<'a, f64>) -> Result<Self, ConfigurationError> {
        if offset.len() != self.n_rows {
            return Err(ConfigurationError::RowCount {
                what: "offset",
                expected: self.n_rows,
                found: offset.len(),
            });
        }
        self.offset = Some(offset);
        Ok(self)
    }

    /// Marks rows `train_rows..` as the validation set.
    pub fn with_train_rows(mut self, train_rows: usize) -> Result<Self, ConfigurationError> {
        if train_rows > self.n_rows {
            return Err(ConfigurationError::TrainSize {
                train_rows,
                n_rows: self.n_rows,
            });
        }
        self.train_rows = train_rows;
        Ok(self)
    }

    /// The same data with evaluation moved to the validation rows.
    pub fn validation(&self) -> Self {
        CoxDataset {
            active: RowSet::Validation,
            ..*self
        }
    }

    /// The same data with evaluation on the training rows.
    pub fn training(&self) -> Self {
        CoxDataset {
            active: RowSet::Training,
            ..*self
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn train_rows(&self) -> usize {
        self.train_rows
    }

    pub fn active_set(&self) -> RowSet {
        self.active
    }

    /// Number of rows in the active set.
    pub fn size_of_set(&self) -> usize {
        match self.active {
            RowSet::Training => self.train_rows,
            RowSet::Validation => self.n_rows - self.train_rows,
        }
    }

    #[inline]
    pub fn weight(&self, row: usize) -> f64 {
        self.weights.map_or(1.0, |w| w[row])
    }

    #[inline]
    pub fn offset(&self, row: usize) -> f64 {
        self.offset.map_or(0.0, |o| o[row])
    }

    #[inline]
    fn is_training(&self, row: usize) -> bool {
        row < self.train_rows
    }

    /// True for training rows drawn into `bag`.
    #[inline]
    pub(crate) fn is_in_bag(&self, row: usize, bag: &Bag) -> bool {
        self.is_training(row) && bag.contains(row)
    }

    /// Case weights of the rows taking part in an evaluation, zero elsewhere.
    ///
    /// On the training set only in-bag rows take part; on the validation set
    /// every validation row does.
    pub(crate) fn active_weights(&self, bag: &Bag) -> Vec<f64> {
        (0..self.n_rows)
            .map(|row| {
                let takes_part = match self.active {
                    RowSet::Training => self.is_training(row) && bag.contains(row),
                    RowSet::Validation => !self.is_training(row),
                };
                if takes_part {
                    self.weight(row)
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Case weights of in-bag training rows, zero elsewhere.
    pub(crate) fn in_bag_weights(&self, bag: &Bag) -> Vec<f64> {
        (0..self.n_rows)
            .map(|row| {
                if self.is_training(row) && bag.contains(row) {
                    self.weight(row)
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Case weights of out-of-bag training rows, zero elsewhere.
    pub(crate) fn out_of_bag_weights(&self, bag: &Bag) -> Vec<f64> {
        (0..self.n_rows)
            .map(|row| {
                if self.is_training(row) && !bag.contains(row) {
                    self.weight(row)
                } else {
                    0.0
                }
            })
            .collect()
    }
}

/// Rows drawn for the current boosting iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bag {
    in_bag: Vec<bool>,
}

impl Bag {
    /// Every one of `n_rows` rows is in the bag.
    pub fn full(n_rows: usize) -> Self {
        Bag {
            in_bag: vec![true; n_rows],
        }
    }

    pub fn from_mask(in_bag: Vec<bool>) -> Self {
        Bag { in_bag }
    }

    /// Draws `fraction` of `n_rows` rows without replacement.
    pub fn sample<R: Rng + ?Sized>(n_rows: usize, fraction: f64, rng: &mut R) -> Self {
        let sample_size = if fraction >= 1.0 {
            n_rows
        } else {
            ((n_rows as f64) * fraction.max(0.0)) as usize
        };
        if sample_size == n_rows {
            return Bag::full(n_rows);
        }

        let mut indices: Vec<usize> = (0..n_rows).collect();
        indices.shuffle(rng);
        let mut in_bag = vec![false; n_rows];
        for &row in indices.iter().take(sample_size) {
            in_bag[row] = true;
        }
        Bag { in_bag }
    }

    /// Rows beyond the mask are never in the bag.
    #[inline]
    pub fn contains(&self, row: usize) -> bool {
        self.in_bag.get(row).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.in_bag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_bag.is_empty()
    }

    pub fn n_in_bag(&self) -> usize {
        self.in_bag.iter().filter(|&&b| b).count()
    }
}

/// Builds the sort table a `CoxPh` expects for `response`.
///
/// Two-column responses `(end, status)` get a single column ordering rows by
/// `(stratum, end)`. Wider responses `(start, end, status)` get two columns:
/// column 0 orders by `(stratum, start)`, column 1 by `(stratum, end)`.
pub fn compute_sort_order(
    response: ArrayView2<'_, f64>,
    strata: ArrayView1<'_, usize>,
) -> Array2<usize> {
    let n_rows = response.nrows();
    let by_time = |time_col: usize| -> Vec<usize> {
        let mut order: Vec<usize> = (0..n_rows).collect();
        order.sort_by(|&a, &b| {
            strata[a]
                .cmp(&strata[b])
                .then_with(|| response[[a, time_col]].total_cmp(&response[[b, time_col]]))
        });
        order
    };

    if response.ncols() > 2 {
        let start_order = by_time(0);
        let end_order = by_time(1);
        let mut sorted = Array2::zeros((n_rows, 2));
        for (pos, (&s, &e)) in start_order.iter().zip(end_order.iter()).enumerate() {
            sorted[[pos, 0]] = s;
            sorted[[pos, 1]] = e;
        }
        sorted
    } else {
        let end_order = by_time(0);
        let mut sorted = Array2::zeros((n_rows, 1));
        for (pos, &e) in end_order.iter().enumerate() {
            sorted[[pos, 0]] = e;
        }
        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_sort_order_groups_strata_then_time() {
        let response = array![[3.0, 1.0], [1.0, 0.0], [2.0, 1.0], [0.5, 1.0]];
        let strata = array![0usize, 1, 0, 1];
        let sorted = compute_sort_order(response.view(), strata.view());
        assert_eq!(sorted.ncols(), 1);
        assert_eq!(sorted.column(0).to_vec(), vec![2, 0, 3, 1]);
    }

    #[test]
    fn test_sort_order_counting_has_start_and_end_columns() {
        let response = array![[0.0, 5.0, 0.0], [5.0, 9.0, 1.0], [2.0, 4.0, 1.0]];
        let strata = array![0usize, 0, 0];
        let sorted = compute_sort_order(response.view(), strata.view());
        assert_eq!(sorted.ncols(), 2);
        assert_eq!(sorted.column(0).to_vec(), vec![0, 2, 1]);
        assert_eq!(sorted.column(1).to_vec(), vec![2, 0, 1]);
    }

    #[test]
    fn test_bag_sample_size() {
        let mut rng = StdRng::seed_from_u64(7);
        let bag = Bag::sample(100, 0.5, &mut rng);
        assert_eq!(bag.len(), 100);
        assert_eq!(bag.n_in_bag(), 50);
        assert!(!bag.contains(100));
    }

    #[test]
    fn test_active_weights_follow_row_set() {
        let weights = array![1.0, 2.0, 3.0, 4.0];
        let data = CoxDataset::new(4)
            .with_weights(weights.view())
            .unwrap()
            .with_train_rows(3)
            .unwrap();
        let bag = Bag::from_mask(vec![true, false, true]);

        assert_eq!(data.active_weights(&bag), vec![1.0, 0.0, 3.0, 0.0]);
        assert_eq!(data.validation().active_weights(&bag), vec![0.0, 0.0, 0.0, 4.0]);
        assert_eq!(data.out_of_bag_weights(&bag), vec![0.0, 2.0, 0.0, 0.0]);
        assert_eq!(data.validation().size_of_set(), 1);
    }

    #[test]
    fn test_rejects_negative_weight() {
        let weights = array![1.0, -1.0];
        let err = CoxDataset::new(2).with_weights(weights.view()).unwrap_err();
        assert_eq!(err, ConfigurationError::InvalidWeight { row: 1, value: -1.0 });
    }
}
