use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use food_screen_artifacts::{ArtifactCache, ArtifactStore, ArtifactSummary, LoadError};
use food_screen_core::{
    encode_with_diagnostics, AdulterationIndicator, HistoryLedger, LedgerState, PredictionResult,
    RiskGauge, SampleField, SampleRecord,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use ulid::Ulid;

pub const API_CONTRACT_VERSION: &str = "api.v1";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SessionId(pub Ulid);

impl SessionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = ulid::DecodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(value).map(Self)
    }
}

/// One interactive session. Owns its history; nothing else may write to it.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    created_at: OffsetDateTime,
    ledger: HistoryLedger,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: SessionId::new(),
            created_at: OffsetDateTime::now_utc(),
            ledger: HistoryLedger::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    #[must_use]
    pub fn ledger(&self) -> &HistoryLedger {
        &self.ledger
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: SessionId,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub history_len: usize,
}

impl From<&Session> for SessionInfo {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id,
            created_at: session.created_at,
            history_len: session.ledger.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Verdict {
    pub indicator: AdulterationIndicator,
    pub message: &'static str,
    pub gauge: RiskGauge,
}

impl Verdict {
    #[must_use]
    pub fn for_result(result: &PredictionResult) -> Self {
        let indicator = AdulterationIndicator::for_label(&result.adulteration_status);
        Self {
            indicator,
            message: indicator.message(),
            gauge: RiskGauge::for_label(&result.risk_level),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AnalysisReport {
    pub session_id: SessionId,
    pub result: PredictionResult,
    pub verdict: Verdict,
    /// Fields whose value the models never saw; they contributed nothing.
    pub dropped_fields: Vec<SampleField>,
    pub history_len: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HistoryView {
    pub session_id: SessionId,
    pub state: LedgerState,
    pub latest: Option<Verdict>,
    pub entries: Vec<PredictionResult>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldCatalogEntry {
    pub key: &'static str,
    pub column_prefix: &'static str,
    pub label: &'static str,
    pub default_choices: &'static [&'static str],
}

/// The 13 input fields with their default candidate values.
#[must_use]
pub fn field_catalog() -> Vec<FieldCatalogEntry> {
    SampleField::ALL
        .into_iter()
        .map(|field| FieldCatalogEntry {
            key: field.as_str(),
            column_prefix: field.column_prefix(),
            label: field.label(),
            default_choices: field.default_choices(),
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct FoodScreenApi {
    artifacts: Arc<ArtifactStore>,
}

impl FoodScreenApi {
    #[must_use]
    pub fn new(artifacts: Arc<ArtifactStore>) -> Self {
        Self { artifacts }
    }

    /// Build the API over the process-wide artifact cache.
    ///
    /// # Errors
    /// Returns [`LoadError`] when the artifacts cannot be loaded; no analysis is possible then.
    pub fn from_cache(cache: &ArtifactCache) -> Result<Self, LoadError> {
        cache.get_or_load().map(Self::new)
    }

    #[must_use]
    pub fn open_session(&self) -> Session {
        let session = Session::new();
        tracing::debug!(session = %session.id, "opened session");
        session
    }

    /// Encode, classify and record one sample in `session`.
    ///
    /// # Errors
    /// Returns an error wrapping [`food_screen_core::KernelError`] when a field is blank, or
    /// [`food_screen_core::InferenceError`] when the schema and models disagree. The ledger is
    /// untouched on error.
    pub fn analyze(&self, session: &mut Session, record: &SampleRecord) -> Result<AnalysisReport> {
        record.validate()?;

        let encoded = encode_with_diagnostics(record, self.artifacts.feature_schema());
        if !encoded.dropped_fields.is_empty() {
            tracing::debug!(
                session = %session.id,
                dropped = ?encoded.dropped_fields,
                "values unknown to the models contributed no features"
            );
        }

        let inference = self.artifacts.engine().infer(&encoded.vector).map_err(|err| {
            tracing::error!(session = %session.id, error = %err, "inference integrity failure");
            err
        })?;

        let result = PredictionResult::new(record, inference, OffsetDateTime::now_utc());
        let verdict = Verdict::for_result(&result);
        session.ledger.record(result.clone());

        tracing::info!(
            session = %session.id,
            food_item = %result.food_item,
            adulteration = %result.adulteration_status,
            risk = %result.risk_level,
            "analyzed sample"
        );

        Ok(AnalysisReport {
            session_id: session.id,
            result,
            verdict,
            dropped_fields: encoded.dropped_fields,
            history_len: session.ledger.len(),
        })
    }

    #[must_use]
    pub fn history(&self, session: &Session) -> HistoryView {
        HistoryView {
            session_id: session.id,
            state: session.ledger.state(),
            latest: session.ledger.latest().map(Verdict::for_result),
            entries: session.ledger.all(),
        }
    }

    #[must_use]
    pub fn artifact_summary(&self) -> ArtifactSummary {
        self.artifacts.summary()
    }
}
