//! Feature encoding, inference and session history for food adulteration screening.

mod encode;
mod gauge;
mod inference;
mod ledger;
mod model;
mod sample;

pub use encode::{
    column_name, encode, encode_with_diagnostics, EncodedSample, EncodedVector, FeatureSchema,
};
pub use gauge::{AdulterationIndicator, RiskGauge, RiskTier, ADULTERATED_LABEL};
pub use inference::{Inference, InferenceEngine, PredictionId, PredictionResult};
pub use ledger::{HistoryLedger, LedgerState};
pub use model::{
    Classifier, ClassifierModel, DecisionTree, LabelDecoder, LeafNode, LinearModel, RandomForest,
    SplitNode, TreeNode,
};
pub use sample::{SampleField, SampleRecord};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum KernelError {
    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum InferenceError {
    #[error("shape mismatch: classifier expects {expected} features, vector has {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("class index {index} has no label (decoder knows {known} classes)")]
    UnknownLabel { index: usize, known: usize },
    #[error("malformed model: {0}")]
    MalformedModel(String),
}
