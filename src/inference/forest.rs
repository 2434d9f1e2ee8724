//! Forest of decision trees with per-group outputs.

use super::tree::{Tree, TreeError};

/// Gradient-boosted forest.
///
/// Each tree contributes to one output group; a K-class model has K groups.
#[derive(Debug, Clone)]
pub struct Forest {
    trees: Vec<Tree>,
    tree_groups: Vec<u32>,
    n_groups: u32,
    base_score: Vec<f64>,
}

impl Forest {
    /// Create an empty forest with `n_groups` outputs and zero base score.
    pub fn new(n_groups: u32) -> Self {
        Self {
            trees: Vec::new(),
            tree_groups: Vec::new(),
            n_groups,
            base_score: vec![0.0; n_groups as usize],
        }
    }

    /// Set the base score for all groups.
    pub fn with_base_score(mut self, base_score: Vec<f64>) -> Self {
        debug_assert_eq!(base_score.len(), self.n_groups as usize);
        self.base_score = base_score;
        self
    }

    /// Add a tree to the forest.
    pub fn push_tree(&mut self, tree: Tree, group: u32) {
        debug_assert!(group < self.n_groups, "group out of range");
        self.trees.push(tree);
        self.tree_groups.push(group);
    }

    #[inline]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    #[inline]
    pub fn n_groups(&self) -> u32 {
        self.n_groups
    }

    #[inline]
    pub fn base_score(&self) -> &[f64] {
        &self.base_score
    }

    /// Iterate over trees with their group assignments.
    pub fn trees_with_groups(&self) -> impl Iterator<Item = (&Tree, u32)> {
        self.trees
            .iter()
            .zip(self.tree_groups.iter())
            .map(|(t, &g)| (t, g))
    }

    /// Validate every tree against the feature count.
    ///
    /// Returns the index of the first offending tree with its error.
    pub fn validate(&self, n_features: usize) -> Result<(), (usize, TreeError)> {
        for (idx, tree) in self.trees.iter().enumerate() {
            tree.validate(n_features).map_err(|e| (idx, e))?;
        }
        Ok(())
    }

    /// Raw margins for a single row: base score plus summed leaf values.
    pub fn predict_raw(&self, features: &[f64]) -> Vec<f64> {
        let mut output = self.base_score.clone();

        for (tree, group) in self.trees_with_groups() {
            output[group as usize] += tree.predict_row(features);
        }

        output
    }
}
