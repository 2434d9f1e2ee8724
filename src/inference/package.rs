//! Model package: the on-disk artifact bundling a classifier with the
//! metadata the service needs to interpret requests.
//!
//! ```json
//! {
//!   "metadata": { "version": "1.0", "features": [...], "class_names": [...],
//!                 "reference_ranges": {"HGB": [12.0, 16.0]}, "units": {"HGB": "g/dL"} },
//!   "model": { "format": "forest", "objective": "multiclass", "trees": [...] }
//! }
//! ```
//!
//! `model` may also point at a LightGBM text dump:
//! `{"format": "lightgbm", "path": "model.txt"}` (relative to the package).

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::engine::GbdtClassifier;
use super::forest::Forest;
use super::lightgbm::{LgbModel, ParseError};
use super::objective::Objective;
use super::tree::{NodeSpec, Tree, TreeError};

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model file not found at: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("invalid model package JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("LightGBM model {}: {source}", .path.display())]
    LightGbm {
        path: PathBuf,
        source: ParseError,
    },
    #[error("tree {tree}: {source}")]
    InvalidTree { tree: usize, source: TreeError },
    #[error("invalid model package: {0}")]
    Invalid(String),
}

/// Inclusive clinical reference range, serialized as `[low, high]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRange(pub f64, pub f64);

impl ReferenceRange {
    pub fn low(&self) -> f64 {
        self.0
    }

    pub fn high(&self) -> f64 {
        self.1
    }

    pub fn contains(&self, value: f64) -> bool {
        self.0 <= value && value <= self.1
    }
}

/// Metadata shipped with the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    #[serde(default = "default_version")]
    pub version: String,

    /// Model input columns, in model order
    pub features: Vec<String>,

    /// Output labels, indexed by class
    pub class_names: Vec<String>,

    #[serde(default)]
    pub reference_ranges: BTreeMap<String, ReferenceRange>,

    #[serde(default)]
    pub units: BTreeMap<String, String>,

    /// String value → numeric code, per feature (e.g. Sex: M → 1)
    #[serde(default)]
    pub categorical_encodings: BTreeMap<String, BTreeMap<String, f64>>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl ModelMetadata {
    /// Metadata used when no model could be loaded.
    pub fn fallback() -> Self {
        let ranges = [
            ("HGB", 12.0, 16.0),
            ("RBC", 4.0, 5.5),
            ("PCV", 37.0, 47.0),
            ("MCV", 80.0, 100.0),
            ("MCHC", 32.0, 36.0),
            ("RDW", 11.5, 14.5),
        ];

        Self {
            version: default_version(),
            features: ["Age", "Sex", "RBC", "PCV", "MCV", "MCHC", "RDW", "HGB"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            class_names: [
                "No_Anemia",
                "ACD_Moderate",
                "ACD_Severe",
                "Moderate_iron_deficiency_anemia",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            reference_ranges: ranges
                .iter()
                .map(|&(name, low, high)| (name.to_string(), ReferenceRange(low, high)))
                .collect(),
            units: BTreeMap::new(),
            categorical_encodings: BTreeMap::new(),
        }
    }

    /// Unit string for a parameter, empty when unknown
    pub fn unit(&self, param: &str) -> &str {
        self.units.get(param).map(String::as_str).unwrap_or("")
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.features.is_empty() {
            return Err(ModelError::Invalid("metadata lists no features".into()));
        }
        if self.class_names.is_empty() {
            return Err(ModelError::Invalid("metadata lists no class names".into()));
        }

        let mut seen = HashSet::new();
        for feature in &self.features {
            if !seen.insert(feature.as_str()) {
                return Err(ModelError::Invalid(format!("duplicate feature '{}'", feature)));
            }
        }

        for (param, range) in &self.reference_ranges {
            if !range.low().is_finite() || !range.high().is_finite() || range.low() > range.high() {
                return Err(ModelError::Invalid(format!(
                    "reference range for '{}' is not a valid [low, high] pair",
                    param
                )));
            }
        }

        for (feature, codes) in &self.categorical_encodings {
            if !seen.contains(feature.as_str()) {
                return Err(ModelError::Invalid(format!(
                    "categorical encoding for unknown feature '{}'",
                    feature
                )));
            }
            if codes.values().any(|v| !v.is_finite()) {
                return Err(ModelError::Invalid(format!(
                    "categorical encoding for '{}' has a non-finite code",
                    feature
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TreeSpec {
    #[serde(default)]
    group: u32,
    nodes: Vec<NodeSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
enum ModelSpec {
    Forest {
        objective: Objective,
        #[serde(default)]
        base_score: Option<Vec<f64>>,
        trees: Vec<TreeSpec>,
    },
    Lightgbm {
        path: PathBuf,
    },
}

#[derive(Debug, Deserialize)]
struct PackageFile {
    metadata: ModelMetadata,
    model: ModelSpec,
}

/// A loaded and validated model package.
#[derive(Debug)]
pub struct ModelPackage {
    pub metadata: ModelMetadata,
    pub classifier: GbdtClassifier,
    /// Hex SHA-256 of the package file
    pub checksum: String,
    pub path: PathBuf,
}

impl ModelPackage {
    /// Load a package from disk, optionally verifying its SHA-256.
    pub fn load(path: &Path, expected_sha256: Option<&str>) -> Result<Self, ModelError> {
        if !path.exists() {
            return Err(ModelError::NotFound(path.to_path_buf()));
        }

        let bytes = std::fs::read(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let checksum = sha256_hex(&bytes);
        if let Some(expected) = expected_sha256 {
            if !expected.eq_ignore_ascii_case(&checksum) {
                return Err(ModelError::ChecksumMismatch {
                    expected: expected.to_string(),
                    actual: checksum,
                });
            }
        }

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let (metadata, classifier) = Self::from_slice(&bytes, base_dir)?;

        Ok(Self {
            metadata,
            classifier,
            checksum,
            path: path.to_path_buf(),
        })
    }

    /// Parse and validate package JSON. Relative LightGBM paths resolve
    /// against `base_dir`.
    pub fn from_slice(
        bytes: &[u8],
        base_dir: &Path,
    ) -> Result<(ModelMetadata, GbdtClassifier), ModelError> {
        let package: PackageFile = serde_json::from_slice(bytes)?;
        let metadata = package.metadata;
        metadata.validate()?;

        let n_features = metadata.features.len();
        let n_classes = metadata.class_names.len();

        let (forest, objective) = match package.model {
            ModelSpec::Forest { objective, base_score, trees } => {
                build_forest(objective, base_score, trees, n_classes)?
            }
            ModelSpec::Lightgbm { path } => {
                let full_path = base_dir.join(&path);
                let lgb = LgbModel::from_file(&full_path).map_err(|source| ModelError::LightGbm {
                    path: full_path.clone(),
                    source,
                })?;

                if lgb.num_features() != n_features {
                    return Err(ModelError::Invalid(format!(
                        "LightGBM model expects {} features, metadata lists {}",
                        lgb.num_features(),
                        n_features
                    )));
                }
                if !lgb.header.feature_names.is_empty() && lgb.header.feature_names != metadata.features {
                    tracing::warn!(
                        "LightGBM feature names {:?} differ from metadata features {:?}",
                        lgb.header.feature_names,
                        metadata.features
                    );
                }

                lgb.to_forest()
                    .map_err(|source| ModelError::LightGbm { path: full_path, source })?
            }
        };

        let produced = objective.n_classes(forest.n_groups() as usize);
        if produced != n_classes {
            return Err(ModelError::Invalid(format!(
                "model produces {} classes, metadata lists {}",
                produced, n_classes
            )));
        }

        forest
            .validate(n_features)
            .map_err(|(tree, source)| ModelError::InvalidTree { tree, source })?;

        Ok((metadata, GbdtClassifier::new(forest, objective, n_features)))
    }
}

fn build_forest(
    objective: Objective,
    base_score: Option<Vec<f64>>,
    trees: Vec<TreeSpec>,
    n_classes: usize,
) -> Result<(Forest, Objective), ModelError> {
    let n_groups = objective.n_groups(n_classes);
    if n_groups == 0 || (objective == Objective::Binary && n_classes != 2) {
        return Err(ModelError::Invalid(format!(
            "{:?} objective cannot produce {} classes",
            objective, n_classes
        )));
    }

    let mut forest = Forest::new(n_groups as u32);
    if let Some(base_score) = base_score {
        if base_score.len() != n_groups {
            return Err(ModelError::Invalid(format!(
                "base_score has {} entries, expected {}",
                base_score.len(),
                n_groups
            )));
        }
        forest = forest.with_base_score(base_score);
    }

    for (idx, spec) in trees.into_iter().enumerate() {
        if spec.group as usize >= n_groups {
            return Err(ModelError::Invalid(format!(
                "tree {} assigned to group {}, model has {} groups",
                idx, spec.group, n_groups
            )));
        }
        forest.push_tree(Tree::from_nodes(&spec.nodes), spec.group);
    }

    Ok((forest, objective))
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::inference::engine::Classifier;
    use serde_json::json;
    use std::io::Write;

    /// Small two-feature, three-class package used across the crate's tests.
    pub(crate) fn sample_package() -> serde_json::Value {
        json!({
            "metadata": {
                "version": "2.1",
                "features": ["HGB", "MCV"],
                "class_names": ["No_Anemia", "Microcytic", "Normocytic"],
                "reference_ranges": {"HGB": [12.0, 16.0], "MCV": [80.0, 100.0], "RDW": [11.5, 14.5]},
                "units": {"HGB": "g/dL", "MCV": "fL"}
            },
            "model": {
                "format": "forest",
                "objective": "multiclass",
                "trees": [
                    {"group": 0, "nodes": [
                        {"feature": 0, "threshold": 12.0, "left": 1, "right": 2},
                        {"leaf": -2.0},
                        {"leaf": 3.0}
                    ]},
                    {"group": 1, "nodes": [
                        {"feature": 0, "threshold": 12.0, "left": 1, "right": 4},
                        {"feature": 1, "threshold": 80.0, "left": 2, "right": 3},
                        {"leaf": 3.0},
                        {"leaf": -1.0},
                        {"leaf": -2.0}
                    ]},
                    {"group": 2, "nodes": [
                        {"feature": 0, "threshold": 12.0, "left": 1, "right": 4},
                        {"feature": 1, "threshold": 80.0, "left": 2, "right": 3},
                        {"leaf": -1.0},
                        {"leaf": 3.0},
                        {"leaf": -2.0}
                    ]}
                ]
            }
        })
    }

    fn load_value(value: &serde_json::Value) -> Result<(ModelMetadata, GbdtClassifier), ModelError> {
        ModelPackage::from_slice(value.to_string().as_bytes(), Path::new("."))
    }

    #[test]
    fn test_sample_package_predicts() {
        let (metadata, clf) = load_value(&sample_package()).unwrap();
        assert_eq!(metadata.version, "2.1");
        assert_eq!(metadata.unit("HGB"), "g/dL");
        assert_eq!(metadata.unit("RDW"), "");
        assert_eq!(clf.n_classes(), 3);

        assert_eq!(clf.predict(&[14.0, 90.0]), Ok(0));
        assert_eq!(clf.predict(&[9.0, 70.0]), Ok(1));
        assert_eq!(clf.predict(&[9.0, 90.0]), Ok(2));
    }

    #[test]
    fn test_load_from_disk_with_checksum() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(sample_package().to_string().as_bytes()).unwrap();

        let package = ModelPackage::load(file.path(), None).unwrap();
        assert_eq!(package.checksum.len(), 64);

        let again = ModelPackage::load(file.path(), Some(&package.checksum.to_uppercase())).unwrap();
        assert_eq!(again.checksum, package.checksum);

        let err = ModelPackage::load(file.path(), Some("deadbeef")).unwrap_err();
        assert!(matches!(err, ModelError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = ModelPackage::load(Path::new("/nonexistent/model.json"), None).unwrap_err();
        assert!(matches!(err, ModelError::NotFound(_)));
        assert!(err.to_string().contains("/nonexistent/model.json"));
    }

    #[test]
    fn test_lightgbm_reference() {
        let dir = tempfile::tempdir().unwrap();
        let model_txt = "tree
num_class=1
num_tree_per_iteration=1
max_feature_idx=1
objective=binary sigmoid:1
feature_names=HGB MCV

Tree=0
num_leaves=2
split_feature=0
threshold=12
decision_type=2
left_child=-1
right_child=-2
leaf_value=3 -3

end of trees
";
        std::fs::write(dir.path().join("model.txt"), model_txt).unwrap();

        let package = json!({
            "metadata": {
                "features": ["HGB", "MCV"],
                "class_names": ["Healthy", "Anemic"]
            },
            "model": {"format": "lightgbm", "path": "model.txt"}
        });
        let package_path = dir.path().join("package.json");
        std::fs::write(&package_path, package.to_string()).unwrap();

        let loaded = ModelPackage::load(&package_path, None).unwrap();
        assert_eq!(loaded.metadata.version, "1.0");
        assert_eq!(loaded.classifier.predict(&[10.0, 85.0]), Ok(1));
        assert_eq!(loaded.classifier.predict(&[14.0, 85.0]), Ok(0));
    }

    #[test]
    fn test_rejects_inconsistent_packages() {
        let mut wrong_classes = sample_package();
        wrong_classes["metadata"]["class_names"] = json!(["A", "B"]);
        // group 2 no longer exists
        assert!(matches!(load_value(&wrong_classes), Err(ModelError::Invalid(_))));

        let mut duplicate = sample_package();
        duplicate["metadata"]["features"] = json!(["HGB", "HGB"]);
        assert!(matches!(load_value(&duplicate), Err(ModelError::Invalid(_))));

        let mut inverted = sample_package();
        inverted["metadata"]["reference_ranges"]["HGB"] = json!([16.0, 12.0]);
        assert!(matches!(load_value(&inverted), Err(ModelError::Invalid(_))));

        let mut bad_feature = sample_package();
        bad_feature["model"]["trees"][0]["nodes"][0]["feature"] = json!(5);
        assert!(matches!(
            load_value(&bad_feature),
            Err(ModelError::InvalidTree { tree: 0, .. })
        ));

        let mut bad_base = sample_package();
        bad_base["model"]["base_score"] = json!([0.0]);
        assert!(matches!(load_value(&bad_base), Err(ModelError::Invalid(_))));

        let mut unknown_encoding = sample_package();
        unknown_encoding["metadata"]["categorical_encodings"] = json!({"Sex": {"M": 1}});
        assert!(matches!(load_value(&unknown_encoding), Err(ModelError::Invalid(_))));

        assert!(matches!(
            ModelPackage::from_slice(b"{not json", Path::new(".")),
            Err(ModelError::Json(_))
        ));
    }

    #[test]
    fn test_bundled_model() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("models/anemia_classifier_model.json");
        let package = ModelPackage::load(&path, None).unwrap();

        assert_eq!(package.metadata.features, ModelMetadata::fallback().features);
        assert_eq!(package.metadata.class_names, ModelMetadata::fallback().class_names);
        assert_eq!(package.metadata.categorical_encodings["Sex"]["F"], 0.0);

        let class_of = |hgb: f64, mcv: f64| {
            // Age, Sex, RBC, PCV, MCV, MCHC, RDW, HGB
            let row = [45.0, 0.0, 4.5, 40.0, mcv, 33.0, 13.0, hgb];
            let idx = package.classifier.predict(&row).unwrap();
            package.metadata.class_names[idx].clone()
        };

        assert_eq!(class_of(14.0, 90.0), "No_Anemia");
        assert_eq!(class_of(10.5, 88.0), "ACD_Moderate");
        assert_eq!(class_of(8.0, 90.0), "ACD_Severe");
        assert_eq!(class_of(9.5, 70.0), "Moderate_iron_deficiency_anemia");
    }

    #[test]
    fn test_fallback_metadata() {
        let metadata = ModelMetadata::fallback();
        assert_eq!(metadata.features.len(), 8);
        assert_eq!(metadata.class_names[0], "No_Anemia");
        assert_eq!(metadata.reference_ranges["HGB"], ReferenceRange(12.0, 16.0));
        assert!(metadata.validate().is_ok());
    }

    #[test]
    fn test_reference_range_inclusive() {
        let range = ReferenceRange(12.0, 16.0);
        assert!(range.contains(12.0));
        assert!(range.contains(16.0));
        assert!(!range.contains(11.99));
        assert!(!range.contains(f64::NAN));
    }
}
