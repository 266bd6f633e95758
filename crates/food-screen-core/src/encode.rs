use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::sample::{SampleField, SampleRecord};
use crate::KernelError;

/// Name of the one-hot column a dummy encoder produces for `field` = `value`.
#[must_use]
pub fn column_name(field: SampleField, value: &str) -> String {
    format!("{}_{value}", field.column_prefix())
}

/// Ordered training-time feature columns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct FeatureSchema {
    columns: Vec<String>,
    positions: HashMap<String, usize>,
}

impl FeatureSchema {
    /// Build a schema from its ordered column names.
    ///
    /// # Errors
    /// Returns [`KernelError::Validation`] for an empty list, an empty column name,
    /// or a duplicated column name.
    pub fn new(columns: Vec<String>) -> Result<Self, KernelError> {
        if columns.is_empty() {
            return Err(KernelError::Validation(
                "feature schema MUST list at least one column".to_string(),
            ));
        }

        let mut positions = HashMap::with_capacity(columns.len());
        for (index, column) in columns.iter().enumerate() {
            if column.trim().is_empty() {
                return Err(KernelError::Validation(format!(
                    "feature schema column {index} is empty"
                )));
            }
            if positions.insert(column.clone(), index).is_some() {
                return Err(KernelError::Validation(format!(
                    "feature schema column `{column}` is duplicated"
                )));
            }
        }

        Ok(Self { columns, positions })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn position(&self, column: &str) -> Option<usize> {
        self.positions.get(column).copied()
    }
}

impl TryFrom<Vec<String>> for FeatureSchema {
    type Error = KernelError;

    fn try_from(columns: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(columns)
    }
}

impl From<FeatureSchema> for Vec<String> {
    fn from(schema: FeatureSchema) -> Self {
        schema.columns
    }
}

/// Indicator vector aligned to a [`FeatureSchema`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct EncodedVector(Vec<f32>);

impl EncodedVector {
    #[must_use]
    pub fn from_values(values: Vec<f32>) -> Self {
        Self(values)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Number of columns set to one.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.0.iter().filter(|value| **value != 0.0).count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodedSample {
    pub vector: EncodedVector,
    /// Fields whose value has no column in the schema and therefore contributed nothing.
    pub dropped_fields: Vec<SampleField>,
}

/// One-hot encode `record` against `schema`.
///
/// Values without a matching schema column are dropped, never rejected.
#[must_use]
pub fn encode(record: &SampleRecord, schema: &FeatureSchema) -> EncodedVector {
    encode_with_diagnostics(record, schema).vector
}

#[must_use]
pub fn encode_with_diagnostics(record: &SampleRecord, schema: &FeatureSchema) -> EncodedSample {
    let mut values = vec![0.0_f32; schema.len()];
    let mut dropped_fields = Vec::new();

    for (field, value) in record.fields() {
        match schema.position(&column_name(field, value)) {
            Some(index) => values[index] = 1.0,
            None => dropped_fields.push(field),
        }
    }

    EncodedSample { vector: EncodedVector(values), dropped_fields }
}
