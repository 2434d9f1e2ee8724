//! Decision tree storage and traversal
//!
//! Nodes live in flat parallel arrays (structure of arrays). Node 0 is the
//! root; child indices are local to the tree.

use serde::Deserialize;

pub type NodeId = u32;

/// Values below this magnitude count as zero for [`MissingType::Zero`].
pub const ZERO_THRESHOLD: f64 = 1e-35;

/// Which feature values a split treats as missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingType {
    /// Nothing is missing; NaN is compared as 0.0
    None,
    /// Zero (and NaN) follow the default direction
    Zero,
    /// NaN follows the default direction
    #[default]
    NaN,
}

impl MissingType {
    /// Decode bits 2-3 of a LightGBM `decision_type`.
    pub fn from_decision_type(decision_type: i8) -> Self {
        match ((decision_type as u8) >> 2) & 3 {
            1 => MissingType::Zero,
            2 => MissingType::NaN,
            _ => MissingType::None,
        }
    }
}

/// Structural problems found while validating a tree.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TreeError {
    #[error("tree has no nodes")]
    EmptyTree,
    #[error("node {node}: {side} child {child} out of bounds ({n_nodes} nodes)")]
    ChildOutOfBounds {
        node: NodeId,
        side: &'static str,
        child: NodeId,
        n_nodes: usize,
    },
    #[error("node {node} references itself")]
    SelfLoop { node: NodeId },
    #[error("node {node} reached more than once")]
    DuplicateVisit { node: NodeId },
    #[error("node {node} unreachable from root")]
    UnreachableNode { node: NodeId },
    #[error("node {node} splits on feature {feature}, model has {n_features} features")]
    FeatureOutOfBounds {
        node: NodeId,
        feature: u32,
        n_features: usize,
    },
    #[error("node {node} has non-finite {what}")]
    NonFinite { node: NodeId, what: &'static str },
}

/// Serialized node, as written in a model package.
///
/// ```json
/// {"feature": 7, "threshold": 11.5, "left": 1, "right": 2}
/// {"feature": 1, "threshold": 0.5, "left": 1, "right": 2, "default_left": false, "missing": "zero"}
/// {"leaf": -0.42}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum NodeSpec {
    Split {
        feature: u32,
        threshold: f64,
        left: NodeId,
        right: NodeId,
        #[serde(default = "default_left")]
        default_left: bool,
        #[serde(default)]
        missing: MissingType,
    },
    Leaf {
        leaf: f64,
    },
}

fn default_left() -> bool {
    true
}

/// Immutable decision tree with scalar leaves.
#[derive(Debug, Clone)]
pub struct Tree {
    split_indices: Box<[u32]>,
    split_thresholds: Box<[f64]>,
    left_children: Box<[NodeId]>,
    right_children: Box<[NodeId]>,
    default_left: Box<[bool]>,
    missing_types: Box<[MissingType]>,
    is_leaf: Box<[bool]>,
    leaf_values: Box<[f64]>,
}

impl Tree {
    /// Create a tree from parallel arrays of equal length.
    pub fn new(
        split_indices: Vec<u32>,
        split_thresholds: Vec<f64>,
        left_children: Vec<NodeId>,
        right_children: Vec<NodeId>,
        default_left: Vec<bool>,
        missing_types: Vec<MissingType>,
        is_leaf: Vec<bool>,
        leaf_values: Vec<f64>,
    ) -> Self {
        let n = is_leaf.len();
        debug_assert_eq!(n, split_indices.len());
        debug_assert_eq!(n, split_thresholds.len());
        debug_assert_eq!(n, left_children.len());
        debug_assert_eq!(n, right_children.len());
        debug_assert_eq!(n, default_left.len());
        debug_assert_eq!(n, missing_types.len());
        debug_assert_eq!(n, leaf_values.len());

        Self {
            split_indices: split_indices.into_boxed_slice(),
            split_thresholds: split_thresholds.into_boxed_slice(),
            left_children: left_children.into_boxed_slice(),
            right_children: right_children.into_boxed_slice(),
            default_left: default_left.into_boxed_slice(),
            missing_types: missing_types.into_boxed_slice(),
            is_leaf: is_leaf.into_boxed_slice(),
            leaf_values: leaf_values.into_boxed_slice(),
        }
    }

    /// Single-leaf tree returning a constant.
    pub fn constant(value: f64) -> Self {
        Self::new(vec![0], vec![0.0], vec![0], vec![0], vec![true], vec![MissingType::NaN], vec![true], vec![value])
    }

    /// Build from serialized nodes.
    pub fn from_nodes(nodes: &[NodeSpec]) -> Self {
        let n = nodes.len();
        let mut split_indices = Vec::with_capacity(n);
        let mut split_thresholds = Vec::with_capacity(n);
        let mut left_children = Vec::with_capacity(n);
        let mut right_children = Vec::with_capacity(n);
        let mut default_lefts = Vec::with_capacity(n);
        let mut missing_types = Vec::with_capacity(n);
        let mut is_leaf = Vec::with_capacity(n);
        let mut leaf_values = Vec::with_capacity(n);

        for node in nodes {
            match *node {
                NodeSpec::Split { feature, threshold, left, right, default_left, missing } => {
                    split_indices.push(feature);
                    split_thresholds.push(threshold);
                    left_children.push(left);
                    right_children.push(right);
                    default_lefts.push(default_left);
                    missing_types.push(missing);
                    is_leaf.push(false);
                    leaf_values.push(0.0);
                }
                NodeSpec::Leaf { leaf } => {
                    split_indices.push(0);
                    split_thresholds.push(0.0);
                    left_children.push(0);
                    right_children.push(0);
                    default_lefts.push(true);
                    missing_types.push(MissingType::NaN);
                    is_leaf.push(true);
                    leaf_values.push(leaf);
                }
            }
        }

        Self::new(
            split_indices,
            split_thresholds,
            left_children,
            right_children,
            default_lefts,
            missing_types,
            is_leaf,
            leaf_values,
        )
    }

    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.is_leaf.len()
    }

    #[inline]
    pub fn is_leaf(&self, node: NodeId) -> bool {
        self.is_leaf[node as usize]
    }

    #[inline]
    pub fn split_index(&self, node: NodeId) -> u32 {
        self.split_indices[node as usize]
    }

    #[inline]
    pub fn split_threshold(&self, node: NodeId) -> f64 {
        self.split_thresholds[node as usize]
    }

    #[inline]
    pub fn left_child(&self, node: NodeId) -> NodeId {
        self.left_children[node as usize]
    }

    #[inline]
    pub fn right_child(&self, node: NodeId) -> NodeId {
        self.right_children[node as usize]
    }

    #[inline]
    pub fn default_left(&self, node: NodeId) -> bool {
        self.default_left[node as usize]
    }

    #[inline]
    pub fn missing_type(&self, node: NodeId) -> MissingType {
        self.missing_types[node as usize]
    }

    #[inline]
    pub fn leaf_value(&self, node: NodeId) -> f64 {
        self.leaf_values[node as usize]
    }

    /// Traverse from the root to a leaf and return its value.
    ///
    /// Numeric splits go left when `value <= threshold`. A feature index
    /// past the end of the row reads as NaN. Which values take the node's
    /// default direction depends on its [`MissingType`]: NaN for `NaN`,
    /// zero or NaN for `Zero`, none for `None` (NaN is compared as 0.0).
    pub fn predict_row(&self, features: &[f64]) -> f64 {
        let mut idx: NodeId = 0;

        while !self.is_leaf(idx) {
            let fvalue = features
                .get(self.split_index(idx) as usize)
                .copied()
                .unwrap_or(f64::NAN);

            let go_left = match self.missing_type(idx) {
                MissingType::NaN if fvalue.is_nan() => self.default_left(idx),
                MissingType::Zero if fvalue.is_nan() || fvalue.abs() <= ZERO_THRESHOLD => {
                    self.default_left(idx)
                }
                MissingType::None if fvalue.is_nan() => 0.0 <= self.split_threshold(idx),
                _ => fvalue <= self.split_threshold(idx),
            };

            idx = if go_left { self.left_child(idx) } else { self.right_child(idx) };
        }

        self.leaf_value(idx)
    }

    /// Check that the nodes form a proper tree rooted at node 0 and that
    /// every split references a feature below `n_features`.
    ///
    /// A tree that passes is safe to traverse: every walk terminates.
    pub fn validate(&self, n_features: usize) -> Result<(), TreeError> {
        let n_nodes = self.n_nodes();
        if n_nodes == 0 {
            return Err(TreeError::EmptyTree);
        }

        let mut visited = vec![false; n_nodes];
        let mut stack: Vec<NodeId> = vec![0];

        while let Some(node) = stack.pop() {
            let node_usize = node as usize;
            if visited[node_usize] {
                return Err(TreeError::DuplicateVisit { node });
            }
            visited[node_usize] = true;

            if self.is_leaf(node) {
                if !self.leaf_value(node).is_finite() {
                    return Err(TreeError::NonFinite { node, what: "leaf value" });
                }
                continue;
            }

            let feature = self.split_index(node);
            if feature as usize >= n_features {
                return Err(TreeError::FeatureOutOfBounds { node, feature, n_features });
            }
            if self.split_threshold(node).is_nan() {
                return Err(TreeError::NonFinite { node, what: "threshold" });
            }

            for (side, child) in [("left", self.left_child(node)), ("right", self.right_child(node))] {
                if child == node {
                    return Err(TreeError::SelfLoop { node });
                }
                if child as usize >= n_nodes {
                    return Err(TreeError::ChildOutOfBounds { node, side, child, n_nodes });
                }
                stack.push(child);
            }
        }

        if let Some(unreached) = visited.iter().position(|v| !v) {
            return Err(TreeError::UnreachableNode { node: unreached as NodeId });
        }

        Ok(())
    }
}
