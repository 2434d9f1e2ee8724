//! LightGBM text model format.
//!
//! Parses the line-based `key=value` dump written by LightGBM's
//! `save_model()` and converts it into a [`Forest`] with its [`Objective`].
//! Only numerical splits are supported.

use std::collections::HashMap;
use std::iter::Peekable;
use std::path::Path;
use std::str::Lines;

use super::forest::Forest;
use super::objective::Objective;
use super::tree::{MissingType, NodeSpec, Tree};

/// Error type for LightGBM model parsing and conversion.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
    #[error("array size mismatch for {field}: expected {expected}, got {actual}")]
    ArraySizeMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("unsupported model: {0}")]
    Unsupported(String),
}

/// Parsed objective line, e.g. `multiclass num_class:4`.
#[derive(Debug, Clone, PartialEq)]
pub enum LgbObjective {
    Binary { sigmoid: f64 },
    Multiclass { num_class: usize },
    MulticlassOva { num_class: usize, sigmoid: f64 },
    Other(String),
}

impl LgbObjective {
    pub fn parse(s: &str) -> Self {
        let parts: Vec<&str> = s.split_whitespace().collect();
        let param = |key: &str| {
            parts
                .iter()
                .find_map(|p| p.strip_prefix(key).and_then(|v| v.parse::<f64>().ok()))
        };

        match parts.first().copied().unwrap_or("") {
            "binary" => LgbObjective::Binary {
                sigmoid: param("sigmoid:").unwrap_or(1.0),
            },
            "multiclass" | "softmax" => LgbObjective::Multiclass {
                num_class: param("num_class:").map(|v| v as usize).unwrap_or(2),
            },
            "multiclassova" | "multiclass_ova" | "ova" | "ovr" => LgbObjective::MulticlassOva {
                num_class: param("num_class:").map(|v| v as usize).unwrap_or(2),
                sigmoid: param("sigmoid:").unwrap_or(1.0),
            },
            _ => LgbObjective::Other(s.to_string()),
        }
    }
}

/// Model header.
#[derive(Debug, Clone)]
pub struct LgbHeader {
    pub num_class: usize,
    pub num_tree_per_iteration: usize,
    pub max_feature_idx: usize,
    pub objective: Option<LgbObjective>,
    pub average_output: bool,
    pub feature_names: Vec<String>,
}

/// One parsed tree, in LightGBM's own layout.
///
/// Internal nodes are indexed `0..num_leaves-1`; a negative child `c`
/// refers to leaf `!c`.
#[derive(Debug, Clone, Default)]
pub struct LgbTree {
    pub num_leaves: usize,
    pub num_cat: usize,
    pub is_linear: bool,
    pub split_feature: Vec<i32>,
    pub threshold: Vec<f64>,
    pub decision_type: Vec<i8>,
    pub left_child: Vec<i32>,
    pub right_child: Vec<i32>,
    pub leaf_value: Vec<f64>,
}

/// A parsed LightGBM model.
#[derive(Debug, Clone)]
pub struct LgbModel {
    pub header: LgbHeader,
    pub trees: Vec<LgbTree>,
}

impl LgbModel {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ParseError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_string(&content)
    }

    pub fn from_string(content: &str) -> Result<Self, ParseError> {
        let mut lines = content.lines().peekable();
        let header = parse_header(&mut lines)?;

        let mut trees = Vec::new();
        while let Some(line) = lines.next() {
            if line.starts_with("Tree=") {
                trees.push(parse_tree(&mut lines)?);
            } else if line == "end of trees" {
                break;
            }
        }

        Ok(LgbModel { header, trees })
    }

    pub fn num_features(&self) -> usize {
        self.header.max_feature_idx + 1
    }

    /// Convert into a forest and its output transform.
    pub fn to_forest(&self) -> Result<(Forest, Objective), ParseError> {
        let (objective, sigmoid) = match &self.header.objective {
            Some(LgbObjective::Binary { sigmoid }) => (Objective::Binary, *sigmoid),
            Some(LgbObjective::Multiclass { .. }) => (Objective::Multiclass, 1.0),
            Some(LgbObjective::MulticlassOva { sigmoid, .. }) => (Objective::MulticlassOva, *sigmoid),
            Some(LgbObjective::Other(name)) => {
                return Err(ParseError::Unsupported(format!("objective '{}'", name)));
            }
            None => return Err(ParseError::MissingField("objective")),
        };

        let n_groups = self.header.num_tree_per_iteration.max(1);
        if n_groups != objective.n_groups(self.header.num_class) {
            return Err(ParseError::InvalidValue {
                field: "num_tree_per_iteration",
                message: format!(
                    "{} trees per iteration for {} classes",
                    n_groups, self.header.num_class
                ),
            });
        }

        // Sigmoid scaling and output averaging both act linearly on the margin,
        // so fold them into the leaves.
        let mut scale = sigmoid;
        if self.header.average_output {
            let n_iterations = (self.trees.len() / n_groups).max(1);
            scale /= n_iterations as f64;
        }

        let mut forest = Forest::new(n_groups as u32);
        for (idx, lgb_tree) in self.trees.iter().enumerate() {
            let tree = convert_tree(lgb_tree, scale)?;
            forest.push_tree(tree, (idx % n_groups) as u32);
        }

        Ok((forest, objective))
    }
}

fn convert_tree(tree: &LgbTree, scale: f64) -> Result<Tree, ParseError> {
    if tree.is_linear {
        return Err(ParseError::Unsupported("linear trees".to_string()));
    }
    if tree.num_cat > 0 || tree.decision_type.iter().any(|&d| d & 1 != 0) {
        return Err(ParseError::Unsupported("categorical splits".to_string()));
    }

    if tree.num_leaves <= 1 {
        let value = tree.leaf_value.first().copied().unwrap_or(0.0);
        return Ok(Tree::constant(value * scale));
    }

    let n_internal = tree.num_leaves - 1;
    let child = |c: i32| -> u32 {
        if c < 0 {
            (n_internal + (!c) as usize) as u32
        } else {
            c as u32
        }
    };

    let mut nodes = Vec::with_capacity(n_internal + tree.num_leaves);
    for i in 0..n_internal {
        if tree.split_feature[i] < 0 {
            return Err(ParseError::InvalidValue {
                field: "split_feature",
                message: format!("negative feature index {}", tree.split_feature[i]),
            });
        }
        nodes.push(NodeSpec::Split {
            feature: tree.split_feature[i] as u32,
            threshold: tree.threshold[i],
            left: child(tree.left_child[i]),
            right: child(tree.right_child[i]),
            default_left: tree.decision_type[i] & 2 != 0,
            missing: MissingType::from_decision_type(tree.decision_type[i]),
        });
    }
    for &value in &tree.leaf_value {
        nodes.push(NodeSpec::Leaf { leaf: value * scale });
    }

    Ok(Tree::from_nodes(&nodes))
}

// =============================================================================
// Parsing helpers
// =============================================================================

fn parse_header(lines: &mut Peekable<Lines>) -> Result<LgbHeader, ParseError> {
    let mut kv = HashMap::new();
    let mut average_output = false;

    while let Some(line) = lines.peek() {
        if line.starts_with("Tree=") {
            break;
        }
        let line = lines.next().unwrap_or_default();
        if let Some((key, value)) = line.split_once('=') {
            kv.insert(key.to_string(), value.to_string());
        } else if line == "average_output" {
            average_output = true;
        }
    }

    let num_class: usize = kv
        .get("num_class")
        .and_then(|v| v.parse().ok())
        .ok_or(ParseError::MissingField("num_class"))?;

    let max_feature_idx = kv
        .get("max_feature_idx")
        .and_then(|v| v.parse().ok())
        .ok_or(ParseError::MissingField("max_feature_idx"))?;

    Ok(LgbHeader {
        num_class,
        num_tree_per_iteration: kv
            .get("num_tree_per_iteration")
            .and_then(|v| v.parse().ok())
            .unwrap_or(num_class.max(1)),
        max_feature_idx,
        objective: kv.get("objective").map(|o| LgbObjective::parse(o)),
        average_output,
        feature_names: kv
            .get("feature_names")
            .map(|names| names.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default(),
    })
}

fn parse_tree(lines: &mut Peekable<Lines>) -> Result<LgbTree, ParseError> {
    let mut kv = HashMap::new();

    while let Some(line) = lines.peek() {
        if line.starts_with("Tree=") || line.starts_with("end of trees") {
            break;
        }
        let line = lines.next().unwrap_or_default();
        if let Some((key, value)) = line.split_once('=') {
            kv.insert(key, value);
        }
    }

    let num_leaves: usize = kv
        .get("num_leaves")
        .and_then(|v| v.parse().ok())
        .ok_or(ParseError::MissingField("num_leaves"))?;

    let mut tree = LgbTree {
        num_leaves,
        num_cat: kv.get("num_cat").and_then(|v| v.parse().ok()).unwrap_or(0),
        is_linear: kv
            .get("is_linear")
            .and_then(|v| v.parse::<i32>().ok())
            .map(|v| v != 0)
            .unwrap_or(false),
        ..Default::default()
    };

    // Single-leaf tree has no splits
    if num_leaves <= 1 {
        tree.leaf_value = match kv.get("leaf_value") {
            Some(v) => parse_array("leaf_value", v)?,
            None => vec![0.0],
        };
        return Ok(tree);
    }

    let num_splits = num_leaves - 1;

    tree.split_feature = required_array(&kv, "split_feature", num_splits)?;
    tree.threshold = required_array(&kv, "threshold", num_splits)?;
    tree.left_child = required_array(&kv, "left_child", num_splits)?;
    tree.right_child = required_array(&kv, "right_child", num_splits)?;
    tree.leaf_value = required_array(&kv, "leaf_value", num_leaves)?;
    tree.decision_type = match kv.get("decision_type") {
        Some(v) => {
            let values: Vec<i8> = parse_array("decision_type", v)?;
            check_len("decision_type", &values, num_splits)?;
            values
        }
        None => vec![0; num_splits],
    };

    for (field, children) in [("left_child", &tree.left_child), ("right_child", &tree.right_child)] {
        for &c in children.iter() {
            let in_range = if c < 0 {
                ((!c) as usize) < num_leaves
            } else {
                (c as usize) < num_splits
            };
            if !in_range {
                return Err(ParseError::InvalidValue {
                    field,
                    message: format!("child index {} out of range", c),
                });
            }
        }
    }

    Ok(tree)
}

fn required_array<T: std::str::FromStr>(
    kv: &HashMap<&str, &str>,
    field: &'static str,
    expected: usize,
) -> Result<Vec<T>, ParseError> {
    let raw = kv.get(field).ok_or(ParseError::MissingField(field))?;
    let values = parse_array(field, raw)?;
    check_len(field, &values, expected)?;
    Ok(values)
}

fn parse_array<T: std::str::FromStr>(field: &'static str, s: &str) -> Result<Vec<T>, ParseError> {
    s.split_whitespace()
        .map(|v| {
            v.parse().map_err(|_| ParseError::InvalidValue {
                field,
                message: format!("cannot parse '{}'", v),
            })
        })
        .collect()
}

fn check_len<T>(field: &'static str, values: &[T], expected: usize) -> Result<(), ParseError> {
    if values.len() != expected {
        return Err(ParseError::ArraySizeMismatch {
            field,
            expected,
            actual: values.len(),
        });
    }
    Ok(())
}
