use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use ulid::Ulid;

use crate::encode::EncodedVector;
use crate::model::{Classifier, LabelDecoder};
use crate::sample::SampleRecord;
use crate::InferenceError;

/// Decoded output of both classifiers for one sample.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Inference {
    pub adulteration: String,
    pub risk: String,
}

/// Runs the adulteration and risk classifiers over one encoded vector.
///
/// Each classifier is paired with the decoder for its own label space.
#[derive(Clone, Copy)]
pub struct InferenceEngine<'a> {
    adulteration_classifier: &'a dyn Classifier,
    adulteration_decoder: &'a LabelDecoder,
    risk_classifier: &'a dyn Classifier,
    risk_decoder: &'a LabelDecoder,
}

impl<'a> InferenceEngine<'a> {
    #[must_use]
    pub fn new(
        adulteration_classifier: &'a dyn Classifier,
        adulteration_decoder: &'a LabelDecoder,
        risk_classifier: &'a dyn Classifier,
        risk_decoder: &'a LabelDecoder,
    ) -> Self {
        Self { adulteration_classifier, adulteration_decoder, risk_classifier, risk_decoder }
    }

    /// Predict and decode both labels for `vector`.
    ///
    /// # Errors
    /// Returns [`InferenceError::ShapeMismatch`] when `vector` does not have the width the
    /// classifiers were trained on. That only happens when the schema and the models are out
    /// of sync, so callers should treat it as fatal.
    pub fn infer(&self, vector: &EncodedVector) -> Result<Inference, InferenceError> {
        let adulteration_index = self.adulteration_classifier.predict(vector)?;
        let adulteration = self.adulteration_decoder.decode(adulteration_index)?.to_string();

        let risk_index = self.risk_classifier.predict(vector)?;
        let risk = self.risk_decoder.decode(risk_index)?.to_string();

        Ok(Inference { adulteration, risk })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PredictionId(pub Ulid);

impl PredictionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for PredictionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PredictionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One row of analysis history.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct PredictionResult {
    pub prediction_id: PredictionId,
    #[serde(with = "time::serde::rfc3339")]
    pub analyzed_at: OffsetDateTime,
    pub food_item: String,
    pub adulteration_status: String,
    pub risk_level: String,
    pub color: String,
    pub smell: String,
    pub texture: String,
}

impl PredictionResult {
    #[must_use]
    pub fn new(record: &SampleRecord, inference: Inference, analyzed_at: OffsetDateTime) -> Self {
        Self {
            prediction_id: PredictionId::new(),
            analyzed_at,
            food_item: record.food_item.clone(),
            adulteration_status: inference.adulteration,
            risk_level: inference.risk,
            color: record.color.clone(),
            smell: record.smell.clone(),
            texture: record.texture.clone(),
        }
    }
}
