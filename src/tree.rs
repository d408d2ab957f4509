//! The view of a fitted tree that the leaf-fitting step needs.

use ndarray::Array1;

/// A tree whose terminal nodes can receive fitted constants.
pub trait TerminalNodes {
    /// Terminal node of every row, indexed by row.
    fn node_assignments(&self) -> &[usize];

    fn n_terminal_nodes(&self) -> usize;

    fn set_node_prediction(&mut self, node: usize, value: f64);
}

/// Node assignments for each row plus one prediction per terminal node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeTable {
    nodes: Vec<usize>,
    predictions: Vec<f64>,
}

impl NodeTable {
    pub fn new(nodes: Vec<usize>, n_nodes: usize) -> Self {
        NodeTable {
            nodes,
            predictions: vec![0.0; n_nodes],
        }
    }

    pub fn predictions(&self) -> &[f64] {
        &self.predictions
    }

    /// The fitted constant of each row's node. Rows assigned to a node
    /// outside the table predict zero.
    pub fn row_predictions(&self) -> Array1<f64> {
        self.nodes
            .iter()
            .map(|&node| self.predictions.get(node).copied().unwrap_or(0.0))
            .collect()
    }

    pub fn into_predictions(self) -> Vec<f64> {
        self.predictions
    }
}

impl TerminalNodes for NodeTable {
    fn node_assignments(&self) -> &[usize] {
        &self.nodes
    }

    fn n_terminal_nodes(&self) -> usize {
        self.predictions.len()
    }

    fn set_node_prediction(&mut self, node: usize, value: f64) {
        if let Some(slot) = self.predictions.get_mut(node) {
            *slot = value;
        }
    }
}
