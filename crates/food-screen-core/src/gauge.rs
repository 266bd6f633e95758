use serde::{Deserialize, Serialize};

/// Label the adulteration model emits for an adulterated sample.
pub const ADULTERATED_LABEL: &str = "Yes";

const UNKNOWN_TIER_COLOR: &str = "grey";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RiskTier {
    Safe,
    #[serde(rename = "Low Risk")]
    LowRisk,
    Moderate,
    Toxic,
}

impl RiskTier {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "Safe",
            Self::LowRisk => "Low Risk",
            Self::Moderate => "Moderate",
            Self::Toxic => "Toxic",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Safe" => Some(Self::Safe),
            "Low Risk" => Some(Self::LowRisk),
            "Moderate" => Some(Self::Moderate),
            "Toxic" => Some(Self::Toxic),
            _ => None,
        }
    }

    /// Gauge position, 1 (safe) through 4 (toxic).
    #[must_use]
    pub fn level(self) -> u8 {
        match self {
            Self::Safe => 1,
            Self::LowRisk => 2,
            Self::Moderate => 3,
            Self::Toxic => 4,
        }
    }

    #[must_use]
    pub fn color(self) -> &'static str {
        match self {
            Self::Safe => "#2ca02c",
            Self::LowRisk => "#ff7f0e",
            Self::Moderate => "#d62728",
            Self::Toxic => "#8c564b",
        }
    }
}

/// What a risk gauge should show for one predicted label.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct RiskGauge {
    pub label: String,
    pub tier: Option<RiskTier>,
    /// 0 when the label is not one of the four tiers.
    pub level: u8,
    pub color: String,
}

impl RiskGauge {
    #[must_use]
    pub fn for_label(label: &str) -> Self {
        let tier = RiskTier::parse(label);
        Self {
            label: label.to_string(),
            tier,
            level: tier.map_or(0, RiskTier::level),
            color: tier.map_or(UNKNOWN_TIER_COLOR, RiskTier::color).to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum AdulterationIndicator {
    Adulterated,
    NotAdulterated,
}

impl AdulterationIndicator {
    #[must_use]
    pub fn for_label(label: &str) -> Self {
        if label == ADULTERATED_LABEL {
            Self::Adulterated
        } else {
            Self::NotAdulterated
        }
    }

    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::Adulterated => "The model predicts this sample is likely adulterated.",
            Self::NotAdulterated => "The model predicts this sample is likely not adulterated.",
        }
    }
}
