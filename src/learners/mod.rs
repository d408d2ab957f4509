use ndarray::{Array1, Array2, ArrayView1};

/// Grows a tree on the working response and reports terminal-node membership.
///
/// Leaf values are not chosen here: the loss fits them afterwards with a
/// Newton step on the partial likelihood.
pub trait BaseLearner {
    fn fit(
        &self,
        x: &Array2<f64>,
        target: &Array1<f64>,
        weights: &[f64],
    ) -> Box<dyn TrainedBaseLearner>;
}

pub trait TrainedBaseLearner: Send + Sync {
    fn n_nodes(&self) -> usize;

    fn node_of(&self, row: ArrayView1<'_, f64>) -> usize;

    /// Terminal node of every row of `x`.
    fn assign(&self, x: &Array2<f64>) -> Vec<usize> {
        x.rows().into_iter().map(|row| self.node_of(row)).collect()
    }
}

/// A single split on one feature, chosen by weighted squared error.
#[derive(Debug, Clone)]
pub struct StumpLearner {
    /// Smallest number of weighted rows allowed on either side of the split.
    pub min_node_rows: usize,
}

impl Default for StumpLearner {
    fn default() -> Self {
        StumpLearner { min_node_rows: 1 }
    }
}

impl BaseLearner for StumpLearner {
    fn fit(
        &self,
        x: &Array2<f64>,
        target: &Array1<f64>,
        weights: &[f64],
    ) -> Box<dyn TrainedBaseLearner> {
        match find_best_split(x, target, weights, self.min_node_rows.max(1)) {
            Some((feature_index, threshold)) => Box::new(TrainedStumpLearner {
                split: Some((feature_index, threshold)),
            }),
            None => Box::new(TrainedStumpLearner { split: None }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrainedStumpLearner {
    split: Option<(usize, f64)>,
}

impl TrainedBaseLearner for TrainedStumpLearner {
    fn n_nodes(&self) -> usize {
        if self.split.is_some() {
            2
        } else {
            1
        }
    }

    fn node_of(&self, row: ArrayView1<'_, f64>) -> usize {
        match self.split {
            Some((feature_index, threshold)) => match row.get(feature_index) {
                Some(&value) if value >= threshold => 1,
                _ => 0,
            },
            None => 0,
        }
    }
}

/// Best `(feature, threshold)` over rows with positive weight, or `None` when
/// no split improves on a single node.
fn find_best_split(
    x: &Array2<f64>,
    target: &Array1<f64>,
    weights: &[f64],
    min_rows: usize,
) -> Option<(usize, f64)> {
    let rows: Vec<usize> = (0..x.nrows())
        .filter(|&i| weights[i] > 0.0 && x.row(i).iter().all(|v| v.is_finite()))
        .collect();
    if rows.len() < 2 * min_rows {
        return None;
    }

    let total_w: f64 = rows.iter().map(|&i| weights[i]).sum();
    let total_wy: f64 = rows.iter().map(|&i| weights[i] * target[i]).sum();
    // Maximising the between-node sum of squares is equivalent to minimising
    // the within-node squared error.
    let baseline = total_wy * total_wy / total_w;

    let mut best: Option<(usize, f64)> = None;
    let mut best_gain = 1e-12 * baseline.abs().max(1.0);
    let mut order = rows.clone();

    for feature_index in 0..x.ncols() {
        let column = x.column(feature_index);
        order.sort_by(|&a, &b| column[a].total_cmp(&column[b]));

        let mut left_w = 0.0;
        let mut left_wy = 0.0;
        for (pos, &i) in order.iter().enumerate().take(order.len() - 1) {
            left_w += weights[i];
            left_wy += weights[i] * target[i];
            let n_left = pos + 1;
            let next = column[order[pos + 1]];
            if column[i] == next || n_left < min_rows || order.len() - n_left < min_rows {
                continue;
            }

            let right_w = total_w - left_w;
            let right_wy = total_wy - left_wy;
            if left_w <= 0.0 || right_w <= 0.0 {
                continue;
            }
            let gain = left_wy * left_wy / left_w + right_wy * right_wy / right_w - baseline;
            if gain > best_gain {
                best_gain = gain;
                best = Some((feature_index, 0.5 * (column[i] + next)));
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_stump_finds_obvious_split() {
        let x = array![[0.0, 5.0], [1.0, 5.0], [2.0, 5.0], [3.0, 5.0]];
        let target = array![-1.0, -1.0, 1.0, 1.0];
        let weights = [1.0; 4];
        let trained = StumpLearner::default().fit(&x, &target, &weights);

        assert_eq!(trained.n_nodes(), 2);
        assert_eq!(trained.assign(&x), vec![0, 0, 1, 1]);
    }

    #[test]
    fn test_stump_ignores_zero_weight_rows() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let target = array![5.0, -1.0, -1.0, 1.0];
        let weights = [0.0, 1.0, 1.0, 1.0];
        let trained = StumpLearner::default().fit(&x, &target, &weights);
        assert_eq!(trained.assign(&x), vec![0, 0, 0, 1]);
    }

    #[test]
    fn test_constant_target_gives_single_node() {
        let x = array![[0.0], [1.0], [2.0]];
        let target = Array1::from_elem(3, 0.5);
        let trained = StumpLearner::default().fit(&x, &target, &[1.0; 3]);
        assert_eq!(trained.n_nodes(), 1);
        assert_eq!(trained.assign(&x), vec![0, 0, 0]);
    }

    #[test]
    fn test_min_node_rows_blocks_small_sides() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let target = array![10.0, 0.0, 0.0, 0.0];
        let learner = StumpLearner { min_node_rows: 2 };
        let trained = learner.fit(&x, &target, &[1.0; 4]);
        assert_eq!(trained.assign(&x), vec![0, 0, 1, 1]);
    }
}
