use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::KernelError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SampleField {
    FoodItem,
    SourceType,
    StorageType,
    Color,
    Smell,
    Texture,
    ForeignParticles,
    Appearance,
    FloatOrSettleTest,
    DissolvesInWater,
    FoamAfterMixing,
    BurnTestResult,
    Taste,
}

impl SampleField {
    /// Every field, in the column order used when the models were trained.
    pub const ALL: [Self; 13] = [
        Self::FoodItem,
        Self::SourceType,
        Self::StorageType,
        Self::Color,
        Self::Smell,
        Self::Texture,
        Self::ForeignParticles,
        Self::Appearance,
        Self::FloatOrSettleTest,
        Self::DissolvesInWater,
        Self::FoamAfterMixing,
        Self::BurnTestResult,
        Self::Taste,
    ];

    /// Prefix of the one-hot columns derived from this field.
    #[must_use]
    pub fn column_prefix(self) -> &'static str {
        match self {
            Self::FoodItem => "Food_Item",
            Self::SourceType => "Source_Type",
            Self::StorageType => "Storage_Type",
            Self::Color => "Color",
            Self::Smell => "Smell",
            Self::Texture => "Texture",
            Self::ForeignParticles => "Foreign_Particles",
            Self::Appearance => "Appearance",
            Self::FloatOrSettleTest => "Float_or_Settle_Test",
            Self::DissolvesInWater => "Dissolves_in_Water",
            Self::FoamAfterMixing => "Foam_After_Mixing",
            Self::BurnTestResult => "Burn_Test_Result",
            Self::Taste => "Taste",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::FoodItem => "Food Item",
            Self::SourceType => "Source Type",
            Self::StorageType => "Storage Type",
            Self::Color => "Color",
            Self::Smell => "Smell",
            Self::Texture => "Texture",
            Self::ForeignParticles => "Foreign Particles",
            Self::Appearance => "Appearance",
            Self::FloatOrSettleTest => "Float or Settle Test",
            Self::DissolvesInWater => "Dissolves in Water",
            Self::FoamAfterMixing => "Foam After Mixing",
            Self::BurnTestResult => "Burn Test Result",
            Self::Taste => "Taste",
        }
    }

    /// Candidate values offered by input forms. Not exhaustive: the encoder
    /// accepts any non-empty value.
    #[must_use]
    pub fn default_choices(self) -> &'static [&'static str] {
        match self {
            Self::FoodItem => &["Milk", "Rice", "Wheat", "Turmeric", "Chilli Powder", "Tomato"],
            Self::SourceType => &["Farmer", "Local Market", "Vendor", "Self-grown"],
            Self::StorageType => &["Open", "Sack", "Covered", "Container", "Loose"],
            Self::Color => &["Normal", "Faded", "Too Bright", "Yellowish", "Mixed Shades"],
            Self::Smell => &["Normal", "Rotten", "Chemical", "Strong", "No Smell"],
            Self::Texture => &["Smooth", "Powdery", "Sticky", "Gritty", "Wet", "Dry"],
            Self::ForeignParticles => &["None", "Stones", "Seeds", "Insects", "Husks"],
            Self::Appearance => &["Uniform", "Clumpy", "Dusty", "Layered"],
            Self::FloatOrSettleTest => &["Floats", "Sinks", "Mixed", "Foam Appears"],
            Self::DissolvesInWater => &["Fully Dissolves", "Leaves Residue", "Forms Layer"],
            Self::FoamAfterMixing => &["No Foam", "Slight Foam", "Excessive Foam"],
            Self::BurnTestResult => {
                &["Melts", "Plastic Smell", "Burns Cleanly", "Leaves Black Residue"]
            }
            Self::Taste => &["Bitter", "Sweet", "Bland", "Sharp", "Not Tested"],
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| {
            field.column_prefix() == value || field.label() == value || field.as_str() == value
        })
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FoodItem => "food_item",
            Self::SourceType => "source_type",
            Self::StorageType => "storage_type",
            Self::Color => "color",
            Self::Smell => "smell",
            Self::Texture => "texture",
            Self::ForeignParticles => "foreign_particles",
            Self::Appearance => "appearance",
            Self::FloatOrSettleTest => "float_or_settle_test",
            Self::DissolvesInWater => "dissolves_in_water",
            Self::FoamAfterMixing => "foam_after_mixing",
            Self::BurnTestResult => "burn_test_result",
            Self::Taste => "taste",
        }
    }
}

impl Display for SampleField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column_prefix())
    }
}

/// One raw observation of a food sample.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub struct SampleRecord {
    pub food_item: String,
    pub source_type: String,
    pub storage_type: String,
    pub color: String,
    pub smell: String,
    pub texture: String,
    pub foreign_particles: String,
    pub appearance: String,
    pub float_or_settle_test: String,
    pub dissolves_in_water: String,
    pub foam_after_mixing: String,
    pub burn_test_result: String,
    pub taste: String,
}

impl SampleRecord {
    #[must_use]
    pub fn value(&self, field: SampleField) -> &str {
        match field {
            SampleField::FoodItem => &self.food_item,
            SampleField::SourceType => &self.source_type,
            SampleField::StorageType => &self.storage_type,
            SampleField::Color => &self.color,
            SampleField::Smell => &self.smell,
            SampleField::Texture => &self.texture,
            SampleField::ForeignParticles => &self.foreign_particles,
            SampleField::Appearance => &self.appearance,
            SampleField::FloatOrSettleTest => &self.float_or_settle_test,
            SampleField::DissolvesInWater => &self.dissolves_in_water,
            SampleField::FoamAfterMixing => &self.foam_after_mixing,
            SampleField::BurnTestResult => &self.burn_test_result,
            SampleField::Taste => &self.taste,
        }
    }

    /// Iterate `(field, value)` pairs in training column order.
    pub fn fields(&self) -> impl Iterator<Item = (SampleField, &str)> + '_ {
        SampleField::ALL.into_iter().map(move |field| (field, self.value(field)))
    }

    /// Check that every field carries a value.
    ///
    /// # Errors
    /// Returns [`KernelError::Validation`] naming the first empty field.
    pub fn validate(&self) -> Result<(), KernelError> {
        for (field, value) in self.fields() {
            if value.trim().is_empty() {
                return Err(KernelError::Validation(format!(
                    "{} MUST be non-empty",
                    field.column_prefix()
                )));
            }
        }
        Ok(())
    }
}
