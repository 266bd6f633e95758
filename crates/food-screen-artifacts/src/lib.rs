use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use food_screen_core::{Classifier, ClassifierModel, FeatureSchema, InferenceEngine, LabelDecoder};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Optional file in an artifact directory that renames and pins artifacts.
pub const MANIFEST_FILE: &str = "manifest.yaml";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    AdulterationModel,
    RiskModel,
    AdulterationDecoder,
    RiskDecoder,
    FeatureSchema,
}

impl ArtifactKind {
    pub const ALL: [Self; 5] = [
        Self::AdulterationModel,
        Self::RiskModel,
        Self::AdulterationDecoder,
        Self::RiskDecoder,
        Self::FeatureSchema,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AdulterationModel => "adulteration_model",
            Self::RiskModel => "risk_model",
            Self::AdulterationDecoder => "adulteration_decoder",
            Self::RiskDecoder => "risk_decoder",
            Self::FeatureSchema => "feature_schema",
        }
    }

    #[must_use]
    pub fn default_file_name(self) -> &'static str {
        match self {
            Self::AdulterationModel => "adulteration_model.json",
            Self::RiskModel => "risk_level_model.json",
            Self::AdulterationDecoder => "adulteration_label_encoder.json",
            Self::RiskDecoder => "risk_level_label_encoder.json",
            Self::FeatureSchema => "model_features.json",
        }
    }
}

impl Display for ArtifactKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read artifact manifest {}: {reason}", .path.display())]
    Manifest { path: PathBuf, reason: String },
    #[error("failed to read {kind} artifact {}: {source}", .path.display())]
    Read {
        kind: ArtifactKind,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to deserialize {kind} artifact {}: {source}", .path.display())]
    Parse {
        kind: ArtifactKind,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("sha256 mismatch for {kind} artifact {}: expected {expected}, got {actual}", .path.display())]
    Checksum { kind: ArtifactKind, path: PathBuf, expected: String, actual: String },
    #[error("invalid {kind} artifact: {reason}")]
    Invalid { kind: ArtifactKind, reason: String },
    #[error("artifacts are out of sync: {0}")]
    Inconsistent(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ArtifactManifest {
    #[serde(default)]
    files: BTreeMap<ArtifactKind, String>,
    #[serde(default)]
    sha256: BTreeMap<ArtifactKind, String>,
}

/// Where each artifact lives, plus any pinned digests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    files: BTreeMap<ArtifactKind, PathBuf>,
    pinned_sha256: BTreeMap<ArtifactKind, String>,
}

impl ArtifactPaths {
    /// Resolve artifact locations inside `dir`, honouring `manifest.yaml` when present.
    ///
    /// # Errors
    /// Returns [`LoadError::Manifest`] when a manifest exists but cannot be read or parsed.
    pub fn in_dir(dir: &Path) -> Result<Self, LoadError> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest = if manifest_path.is_file() {
            let body = fs::read_to_string(&manifest_path).map_err(|err| LoadError::Manifest {
                path: manifest_path.clone(),
                reason: err.to_string(),
            })?;
            serde_yaml::from_str::<ArtifactManifest>(&body).map_err(|err| {
                LoadError::Manifest { path: manifest_path.clone(), reason: err.to_string() }
            })?
        } else {
            ArtifactManifest::default()
        };

        let files = ArtifactKind::ALL
            .into_iter()
            .map(|kind| {
                let name = manifest
                    .files
                    .get(&kind)
                    .map_or(kind.default_file_name(), String::as_str);
                (kind, dir.join(name))
            })
            .collect();

        Ok(Self { files, pinned_sha256: manifest.sha256 })
    }

    #[must_use]
    pub fn path(&self, kind: ArtifactKind) -> PathBuf {
        self.files
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(kind.default_file_name()))
    }

    #[must_use]
    pub fn pinned_sha256(&self, kind: ArtifactKind) -> Option<&str> {
        self.pinned_sha256.get(&kind).map(String::as_str)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ArtifactFileSummary {
    pub kind: ArtifactKind,
    pub path: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ModelSummary {
    pub kind: &'static str,
    pub n_features: usize,
    pub classes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ArtifactSummary {
    pub feature_columns: usize,
    pub adulteration: ModelSummary,
    pub risk: ModelSummary,
    pub files: Vec<ArtifactFileSummary>,
}

/// The loaded, read-only artifact set shared by every session.
#[derive(Debug)]
pub struct ArtifactStore {
    adulteration_classifier: ClassifierModel,
    risk_classifier: ClassifierModel,
    adulteration_decoder: LabelDecoder,
    risk_decoder: LabelDecoder,
    feature_schema: FeatureSchema,
    files: Vec<ArtifactFileSummary>,
}

impl ArtifactStore {
    /// Read, verify and cross-check all five artifacts.
    ///
    /// Nothing is kept when any artifact fails.
    ///
    /// # Errors
    /// Returns [`LoadError`] naming the first artifact that is missing, unreadable, fails its
    /// pinned digest, does not deserialize, or disagrees with the others.
    pub fn load(paths: &ArtifactPaths) -> Result<Self, LoadError> {
        let mut files = Vec::with_capacity(ArtifactKind::ALL.len());

        let adulteration_classifier: ClassifierModel =
            load_artifact(paths, ArtifactKind::AdulterationModel, &mut files)?;
        let risk_classifier: ClassifierModel =
            load_artifact(paths, ArtifactKind::RiskModel, &mut files)?;
        let adulteration_decoder: LabelDecoder =
            load_artifact(paths, ArtifactKind::AdulterationDecoder, &mut files)?;
        let risk_decoder: LabelDecoder =
            load_artifact(paths, ArtifactKind::RiskDecoder, &mut files)?;
        let feature_schema: FeatureSchema =
            load_artifact(paths, ArtifactKind::FeatureSchema, &mut files)?;

        let store = Self::from_parts(
            adulteration_classifier,
            risk_classifier,
            adulteration_decoder,
            risk_decoder,
            feature_schema,
        )?;

        tracing::info!(
            feature_columns = store.feature_schema.len(),
            adulteration_model = store.adulteration_classifier.kind(),
            risk_model = store.risk_classifier.kind(),
            "loaded screening artifacts"
        );
        Ok(Self { files, ..store })
    }

    /// Assemble a store from already-deserialized artifacts.
    ///
    /// # Errors
    /// Returns [`LoadError::Invalid`] for a malformed model and [`LoadError::Inconsistent`]
    /// when a model's width differs from the schema or its class count differs from its
    /// decoder.
    pub fn from_parts(
        adulteration_classifier: ClassifierModel,
        risk_classifier: ClassifierModel,
        adulteration_decoder: LabelDecoder,
        risk_decoder: LabelDecoder,
        feature_schema: FeatureSchema,
    ) -> Result<Self, LoadError> {
        for (kind, model, decoder) in [
            (ArtifactKind::AdulterationModel, &adulteration_classifier, &adulteration_decoder),
            (ArtifactKind::RiskModel, &risk_classifier, &risk_decoder),
        ] {
            model
                .validate()
                .map_err(|err| LoadError::Invalid { kind, reason: err.to_string() })?;

            if model.n_features() != feature_schema.len() {
                return Err(LoadError::Inconsistent(format!(
                    "{kind} expects {} features but the schema has {} columns",
                    model.n_features(),
                    feature_schema.len()
                )));
            }
            if model.n_classes() != decoder.len() {
                return Err(LoadError::Inconsistent(format!(
                    "{kind} emits {} classes but its decoder knows {}",
                    model.n_classes(),
                    decoder.len()
                )));
            }
        }

        Ok(Self {
            adulteration_classifier,
            risk_classifier,
            adulteration_decoder,
            risk_decoder,
            feature_schema,
            files: Vec::new(),
        })
    }

    #[must_use]
    pub fn feature_schema(&self) -> &FeatureSchema {
        &self.feature_schema
    }

    #[must_use]
    pub fn adulteration_classifier(&self) -> &ClassifierModel {
        &self.adulteration_classifier
    }

    #[must_use]
    pub fn risk_classifier(&self) -> &ClassifierModel {
        &self.risk_classifier
    }

    #[must_use]
    pub fn adulteration_decoder(&self) -> &LabelDecoder {
        &self.adulteration_decoder
    }

    #[must_use]
    pub fn risk_decoder(&self) -> &LabelDecoder {
        &self.risk_decoder
    }

    #[must_use]
    pub fn engine(&self) -> InferenceEngine<'_> {
        InferenceEngine::new(
            &self.adulteration_classifier,
            &self.adulteration_decoder,
            &self.risk_classifier,
            &self.risk_decoder,
        )
    }

    #[must_use]
    pub fn summary(&self) -> ArtifactSummary {
        ArtifactSummary {
            feature_columns: self.feature_schema.len(),
            adulteration: model_summary(&self.adulteration_classifier, &self.adulteration_decoder),
            risk: model_summary(&self.risk_classifier, &self.risk_decoder),
            files: self.files.clone(),
        }
    }
}

fn model_summary(model: &ClassifierModel, decoder: &LabelDecoder) -> ModelSummary {
    ModelSummary {
        kind: model.kind(),
        n_features: model.n_features(),
        classes: decoder.classes().to_vec(),
    }
}

fn load_artifact<T>(
    paths: &ArtifactPaths,
    kind: ArtifactKind,
    files: &mut Vec<ArtifactFileSummary>,
) -> Result<T, LoadError>
where
    T: DeserializeOwned,
{
    let path = paths.path(kind);
    let bytes = fs::read(&path)
        .map_err(|source| LoadError::Read { kind, path: path.clone(), source })?;

    let actual = hex::encode(Sha256::digest(&bytes));
    if let Some(expected) = paths.pinned_sha256(kind) {
        if !expected.eq_ignore_ascii_case(&actual) {
            return Err(LoadError::Checksum {
                kind,
                path,
                expected: expected.to_string(),
                actual,
            });
        }
    }

    let value = serde_json::from_slice(&bytes)
        .map_err(|source| LoadError::Parse { kind, path: path.clone(), source })?;

    tracing::debug!(artifact = %kind, path = %path.display(), "read artifact");
    files.push(ArtifactFileSummary { kind, path: path.display().to_string(), sha256: actual });
    Ok(value)
}

/// Loads the artifact set at most once per process and hands out shared handles.
///
/// A failed load leaves the cache empty.
#[derive(Debug)]
pub struct ArtifactCache {
    paths: ArtifactPaths,
    store: OnceLock<Arc<ArtifactStore>>,
    load_lock: Mutex<()>,
    loads: AtomicUsize,
}

impl ArtifactCache {
    #[must_use]
    pub fn new(paths: ArtifactPaths) -> Self {
        Self { paths, store: OnceLock::new(), load_lock: Mutex::new(()), loads: AtomicUsize::new(0) }
    }

    /// # Errors
    /// Returns [`LoadError`] when the artifacts have not been loaded yet and loading fails.
    pub fn get_or_load(&self) -> Result<Arc<ArtifactStore>, LoadError> {
        if let Some(store) = self.store.get() {
            return Ok(Arc::clone(store));
        }

        let _guard = self.load_lock.lock();
        if let Some(store) = self.store.get() {
            return Ok(Arc::clone(store));
        }

        let store = Arc::new(ArtifactStore::load(&self.paths)?);
        self.loads.fetch_add(1, Ordering::Relaxed);
        let _ = self.store.set(Arc::clone(&store));
        Ok(store)
    }

    /// Number of successful loads performed; never above one.
    #[must_use]
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.store.get().is_some()
    }
}
