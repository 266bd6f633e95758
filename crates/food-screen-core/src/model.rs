use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::encode::EncodedVector;
use crate::{InferenceError, KernelError};

/// A trained model mapping an encoded sample to a class index.
pub trait Classifier: Send + Sync {
    /// Input width the model was trained on.
    fn n_features(&self) -> usize;

    /// Number of distinct class indices `predict` can return.
    fn n_classes(&self) -> usize;

    /// Predict the class index for one encoded sample.
    ///
    /// # Errors
    /// Returns [`InferenceError::ShapeMismatch`] when `vector` has the wrong width.
    fn predict(&self, vector: &EncodedVector) -> Result<usize, InferenceError>;
}

fn check_width(expected: usize, vector: &EncodedVector) -> Result<(), InferenceError> {
    if vector.len() == expected {
        Ok(())
    } else {
        Err(InferenceError::ShapeMismatch { expected, actual: vector.len() })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SplitNode {
    pub feature: usize,
    pub threshold: f32,
    pub left: usize,
    pub right: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeafNode {
    pub class_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum TreeNode {
    Split(SplitNode),
    Leaf(LeafNode),
}

/// Binary decision tree stored in pre-order: node 0 is the root and children
/// always sit after their parent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionTree {
    pub n_features: usize,
    pub n_classes: usize,
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// # Errors
    /// Returns [`KernelError::Validation`] when the node layout is not a well formed tree.
    pub fn validate(&self) -> Result<(), KernelError> {
        if self.n_classes == 0 {
            return Err(KernelError::Validation("tree MUST declare at least one class".into()));
        }
        if self.nodes.is_empty() {
            return Err(KernelError::Validation("tree MUST contain at least one node".into()));
        }

        for (index, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split(split) => {
                    if split.feature >= self.n_features {
                        return Err(KernelError::Validation(format!(
                            "node {index} splits on feature {} but the tree has {} features",
                            split.feature, self.n_features
                        )));
                    }
                    if !split.threshold.is_finite() {
                        return Err(KernelError::Validation(format!(
                            "node {index} has a non-finite threshold"
                        )));
                    }
                    for child in [split.left, split.right] {
                        if child <= index || child >= self.nodes.len() {
                            return Err(KernelError::Validation(format!(
                                "node {index} points at invalid child {child}"
                            )));
                        }
                    }
                }
                TreeNode::Leaf(leaf) => {
                    if leaf.class_index >= self.n_classes {
                        return Err(KernelError::Validation(format!(
                            "leaf {index} emits class {} but the tree has {} classes",
                            leaf.class_index, self.n_classes
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn walk(&self, values: &[f32]) -> Result<usize, InferenceError> {
        let mut index = 0;
        loop {
            let node = self.nodes.get(index).ok_or_else(|| {
                InferenceError::MalformedModel(format!("tree node {index} does not exist"))
            })?;
            let split = match node {
                TreeNode::Leaf(leaf) => return Ok(leaf.class_index),
                TreeNode::Split(split) => split,
            };
            let value = values.get(split.feature).copied().ok_or_else(|| {
                InferenceError::MalformedModel(format!("feature {} out of range", split.feature))
            })?;
            let next = if value <= split.threshold { split.left } else { split.right };
            if next <= index {
                return Err(InferenceError::MalformedModel(format!(
                    "tree node {index} loops back to {next}"
                )));
            }
            index = next;
        }
    }
}

impl Classifier for DecisionTree {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn predict(&self, vector: &EncodedVector) -> Result<usize, InferenceError> {
        check_width(self.n_features, vector)?;
        self.walk(vector.as_slice())
    }
}

/// Majority vote over decision trees. Ties go to the lowest class index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RandomForest {
    pub n_features: usize,
    pub n_classes: usize,
    pub trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// # Errors
    /// Returns [`KernelError::Validation`] when the forest is empty or any tree disagrees
    /// with the forest's input width or class count.
    pub fn validate(&self) -> Result<(), KernelError> {
        if self.trees.is_empty() {
            return Err(KernelError::Validation("forest MUST contain at least one tree".into()));
        }
        for (index, tree) in self.trees.iter().enumerate() {
            if tree.n_features != self.n_features || tree.n_classes != self.n_classes {
                return Err(KernelError::Validation(format!(
                    "tree {index} shape ({} features, {} classes) differs from forest ({}, {})",
                    tree.n_features, tree.n_classes, self.n_features, self.n_classes
                )));
            }
            tree.validate()
                .map_err(|err| KernelError::Validation(format!("tree {index}: {err}")))?;
        }
        Ok(())
    }
}

impl Classifier for RandomForest {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn predict(&self, vector: &EncodedVector) -> Result<usize, InferenceError> {
        check_width(self.n_features, vector)?;

        let mut votes = vec![0_usize; self.n_classes];
        for tree in &self.trees {
            let class_index = tree.walk(vector.as_slice())?;
            let slot = votes.get_mut(class_index).ok_or_else(|| {
                InferenceError::MalformedModel(format!("tree voted for unknown class {class_index}"))
            })?;
            *slot += 1;
        }

        let mut best = 0;
        for (class_index, count) in votes.iter().enumerate() {
            if *count > votes[best] {
                best = class_index;
            }
        }
        Ok(best)
    }
}

/// Linear decision function. One coefficient row is a binary model (positive
/// score selects class 1); several rows select the highest-scoring class.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinearModel {
    pub n_features: usize,
    pub coefficients: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
}

impl LinearModel {
    /// # Errors
    /// Returns [`KernelError::Validation`] when coefficient and intercept shapes disagree or
    /// any weight is not finite.
    pub fn validate(&self) -> Result<(), KernelError> {
        if self.coefficients.is_empty() {
            return Err(KernelError::Validation(
                "linear model MUST have at least one coefficient row".into(),
            ));
        }
        if self.intercepts.len() != self.coefficients.len() {
            return Err(KernelError::Validation(format!(
                "linear model has {} coefficient rows but {} intercepts",
                self.coefficients.len(),
                self.intercepts.len()
            )));
        }
        for (row_index, row) in self.coefficients.iter().enumerate() {
            if row.len() != self.n_features {
                return Err(KernelError::Validation(format!(
                    "coefficient row {row_index} has {} weights, expected {}",
                    row.len(),
                    self.n_features
                )));
            }
        }
        let all_finite = self
            .coefficients
            .iter()
            .flatten()
            .chain(self.intercepts.iter())
            .all(|weight| weight.is_finite());
        if !all_finite {
            return Err(KernelError::Validation("linear model weights MUST be finite".into()));
        }
        Ok(())
    }

    fn score(row: &[f64], intercept: f64, values: &[f32]) -> f64 {
        row.iter().zip(values).fold(intercept, |acc, (weight, value)| {
            acc + weight * f64::from(*value)
        })
    }
}

impl Classifier for LinearModel {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_classes(&self) -> usize {
        if self.coefficients.len() == 1 {
            2
        } else {
            self.coefficients.len()
        }
    }

    fn predict(&self, vector: &EncodedVector) -> Result<usize, InferenceError> {
        check_width(self.n_features, vector)?;
        let values = vector.as_slice();

        let scores = self
            .coefficients
            .iter()
            .zip(&self.intercepts)
            .map(|(row, intercept)| Self::score(row, *intercept, values))
            .collect::<Vec<_>>();

        if let [score] = scores.as_slice() {
            return Ok(usize::from(*score > 0.0));
        }

        let mut best = 0;
        for (class_index, score) in scores.iter().enumerate() {
            if *score > scores[best] {
                best = class_index;
            }
        }
        Ok(best)
    }
}

/// Serialized classifier artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierModel {
    DecisionTree(DecisionTree),
    RandomForest(RandomForest),
    Linear(LinearModel),
}

impl ClassifierModel {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DecisionTree(_) => "decision_tree",
            Self::RandomForest(_) => "random_forest",
            Self::Linear(_) => "linear",
        }
    }

    /// # Errors
    /// Returns [`KernelError::Validation`] when the model structure is malformed.
    pub fn validate(&self) -> Result<(), KernelError> {
        match self {
            Self::DecisionTree(tree) => tree.validate(),
            Self::RandomForest(forest) => forest.validate(),
            Self::Linear(linear) => linear.validate(),
        }
    }

    fn inner(&self) -> &dyn Classifier {
        match self {
            Self::DecisionTree(tree) => tree,
            Self::RandomForest(forest) => forest,
            Self::Linear(linear) => linear,
        }
    }
}

impl Classifier for ClassifierModel {
    fn n_features(&self) -> usize {
        self.inner().n_features()
    }

    fn n_classes(&self) -> usize {
        self.inner().n_classes()
    }

    fn predict(&self, vector: &EncodedVector) -> Result<usize, InferenceError> {
        self.inner().predict(vector)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LabelClasses {
    classes: Vec<String>,
}

/// Maps a class index back to the label it was trained on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "LabelClasses", into = "LabelClasses")]
pub struct LabelDecoder {
    classes: Vec<String>,
}

impl LabelDecoder {
    /// # Errors
    /// Returns [`KernelError::Validation`] for an empty class list, a blank label, or a
    /// duplicated label.
    pub fn new(classes: Vec<String>) -> Result<Self, KernelError> {
        if classes.is_empty() {
            return Err(KernelError::Validation(
                "label decoder MUST list at least one class".into(),
            ));
        }
        let mut seen = HashSet::with_capacity(classes.len());
        for (index, label) in classes.iter().enumerate() {
            if label.trim().is_empty() {
                return Err(KernelError::Validation(format!("label {index} is empty")));
            }
            if !seen.insert(label.as_str()) {
                return Err(KernelError::Validation(format!("label `{label}` is duplicated")));
            }
        }
        Ok(Self { classes })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    #[must_use]
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// # Errors
    /// Returns [`InferenceError::UnknownLabel`] when `index` has no label.
    pub fn decode(&self, index: usize) -> Result<&str, InferenceError> {
        self.classes
            .get(index)
            .map(String::as_str)
            .ok_or(InferenceError::UnknownLabel { index, known: self.classes.len() })
    }
}

impl TryFrom<LabelClasses> for LabelDecoder {
    type Error = KernelError;

    fn try_from(value: LabelClasses) -> Result<Self, Self::Error> {
        Self::new(value.classes)
    }
}

impl From<LabelDecoder> for LabelClasses {
    fn from(value: LabelDecoder) -> Self {
        Self { classes: value.classes }
    }
}
