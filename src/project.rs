//! Per-project aggregate: metadata, the active classifier and persisted artifacts.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::features::FEATURE_LEN;
use crate::ml::{ModelRegistry, VariantTag, artifact};
use crate::store::ArtifactMap;

/// Samples each class needs before the project can be trained.
pub const MIN_SAMPLES_PER_CLASS: u64 = 2;

/// One of the three class slots, numbered 1 to 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ClassIndex(u8);

impl ClassIndex {
    pub const ALL: [ClassIndex; 3] = [ClassIndex(1), ClassIndex(2), ClassIndex(3)];

    pub fn get(self) -> u8 {
        self.0
    }

    /// Zero-based position in per-class arrays.
    pub fn slot(self) -> usize {
        self.0 as usize - 1
    }
}

impl TryFrom<u8> for ClassIndex {
    type Error = EngineError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::try_from(i64::from(value))
    }
}

impl TryFrom<i64> for ClassIndex {
    type Error = EngineError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1..=3 => Ok(ClassIndex(value as u8)),
            other => Err(EngineError::InvalidClassIndex(other)),
        }
    }
}

impl From<ClassIndex> for u8 {
    fn from(value: ClassIndex) -> Self {
        value.0
    }
}

impl fmt::Display for ClassIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Three trimmed, non-empty, pairwise distinct class names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "[String; 3]", into = "[String; 3]")]
pub struct ClassLabels([String; 3]);

impl ClassLabels {
    pub fn new(labels: [String; 3]) -> EngineResult<Self> {
        let labels = labels.map(|label| label.trim().to_string());
        if let Some(pos) = labels.iter().position(|label| label.is_empty()) {
            return Err(EngineError::InvalidClassLabels(format!(
                "class {} has an empty name",
                pos + 1
            )));
        }
        for i in 0..labels.len() {
            for j in i + 1..labels.len() {
                if labels[i] == labels[j] {
                    return Err(EngineError::InvalidClassLabels(format!(
                        "classes {} and {} are both named '{}'",
                        i + 1,
                        j + 1,
                        labels[i]
                    )));
                }
            }
        }
        Ok(Self(labels))
    }

    pub fn label(&self, class: ClassIndex) -> &str {
        &self.0[class.slot()]
    }

    pub fn as_array(&self) -> &[String; 3] {
        &self.0
    }

    /// Compare against caller supplied names, ignoring surrounding whitespace.
    pub fn matches(&self, other: &[String; 3]) -> bool {
        self.0.iter().zip(other).all(|(a, b)| a == b.trim())
    }
}

impl TryFrom<[String; 3]> for ClassLabels {
    type Error = EngineError;

    fn try_from(value: [String; 3]) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ClassLabels> for [String; 3] {
    fn from(value: ClassLabels) -> Self {
        value.0
    }
}

/// Portable project metadata shared by every storage backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMeta {
    pub name: String,
    pub class_labels: ClassLabels,
    /// Stored samples per class; equals the highest sequence number issued.
    #[serde(default)]
    pub counters: [u64; 3],
    #[serde(default)]
    pub persistent: bool,
    #[serde(default)]
    pub active_variant: VariantTag,
}

impl ProjectMeta {
    pub fn new(name: impl Into<String>, class_labels: ClassLabels, persistent: bool) -> Self {
        Self {
            name: name.into(),
            class_labels,
            counters: [0; 3],
            persistent,
            active_variant: VariantTag::default(),
        }
    }

    pub fn count(&self, class: ClassIndex) -> u64 {
        self.counters[class.slot()]
    }

    /// Fails with `MinimumSamples` unless every class has enough samples to train.
    pub fn ensure_trainable(&self) -> EngineResult<()> {
        if self.counters.iter().all(|&n| n >= MIN_SAMPLES_PER_CLASS) {
            Ok(())
        } else {
            Err(EngineError::MinimumSamples {
                required: MIN_SAMPLES_PER_CLASS,
                counts: self.counters,
            })
        }
    }
}

/// Snapshot of a project returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectSummary {
    pub name: String,
    pub class_labels: [String; 3],
    pub counters: [u64; 3],
    pub persistent: bool,
    pub active_variant: VariantTag,
    /// Variants with a persisted artifact.
    pub trained_variants: Vec<VariantTag>,
    /// True when the active variant can predict right now.
    pub ready: bool,
}

/// Live state of one project, guarded by its session lock.
#[derive(Debug, Clone)]
pub struct ProjectState {
    pub meta: ProjectMeta,
    pub registry: ModelRegistry,
    pub artifacts: ArtifactMap,
}

impl ProjectState {
    pub fn new(meta: ProjectMeta) -> Self {
        Self {
            registry: ModelRegistry::with_active(meta.active_variant),
            meta,
            artifacts: ArtifactMap::new(),
        }
    }

    /// Rebuild a session from stored metadata and artifacts.
    ///
    /// The active variant's artifact, if present and compatible, becomes the live model.
    /// An unusable artifact is logged and left in the map untouched.
    pub fn hydrate(meta: ProjectMeta, artifacts: ArtifactMap) -> Self {
        let mut state = Self::new(meta);
        let active = state.meta.active_variant;
        if let Some(blob) = artifacts.get(&active) {
            match artifact::decode(blob, FEATURE_LEN) {
                Ok(model) if model.tag() == active => state.registry.install(model),
                Ok(model) => tracing::warn!(
                    project = %state.meta.name,
                    variant = %active,
                    found = %model.tag(),
                    "Ignoring stored model filed under the wrong variant"
                ),
                Err(err) => tracing::warn!(
                    project = %state.meta.name,
                    variant = %active,
                    "Ignoring stored model: {err}"
                ),
            }
        }
        state.artifacts = artifacts;
        state
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn active_variant(&self) -> VariantTag {
        self.registry.active()
    }

    /// Artifacts as they should be stored once the active variant rotates.
    ///
    /// The next slot starts untrained, so its old artifact is dropped.
    pub fn artifacts_after_rotate(&self) -> ArtifactMap {
        let mut staged = self.artifacts.clone();
        staged.remove(&self.active_variant().next());
        staged
    }

    /// Advance the active variant. The new slot starts untrained.
    pub fn rotate(&mut self) -> VariantTag {
        let next = self.registry.rotate();
        self.meta.active_variant = next;
        self.artifacts.remove(&next);
        next
    }

    pub fn record_sample(&mut self, class: ClassIndex, sequence: u64) {
        let slot = &mut self.meta.counters[class.slot()];
        *slot = (*slot).max(sequence);
    }

    pub fn summary(&self) -> ProjectSummary {
        ProjectSummary {
            name: self.meta.name.clone(),
            class_labels: self.meta.class_labels.as_array().clone(),
            counters: self.meta.counters,
            persistent: self.meta.persistent,
            active_variant: self.active_variant(),
            trained_variants: self.artifacts.keys().copied().collect(),
            ready: self.registry.fitted().is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(a: &str, b: &str, c: &str) -> [String; 3] {
        [a.to_string(), b.to_string(), c.to_string()]
    }

    #[test]
    fn class_index_accepts_one_to_three() {
        assert_eq!(ClassIndex::try_from(1u8).unwrap().slot(), 0);
        assert_eq!(ClassIndex::try_from(3i64).unwrap().get(), 3);
        for bad in [0i64, 4, -1] {
            assert!(matches!(
                ClassIndex::try_from(bad),
                Err(EngineError::InvalidClassIndex(v)) if v == bad
            ));
        }
    }

    #[test]
    fn labels_are_trimmed_and_validated() {
        let parsed = ClassLabels::new(labels(" cat ", "dog", "fish")).unwrap();
        assert_eq!(parsed.label(ClassIndex::ALL[0]), "cat");
        assert!(parsed.matches(&labels("cat", " dog", "fish")));
        assert!(!parsed.matches(&labels("cat", "dog", "bird")));
        assert!(matches!(
            ClassLabels::new(labels("cat", "  ", "fish")),
            Err(EngineError::InvalidClassLabels(_))
        ));
        assert!(matches!(
            ClassLabels::new(labels("cat", "dog", "cat")),
            Err(EngineError::InvalidClassLabels(_))
        ));
    }

    #[test]
    fn meta_serializes_labels_as_array() {
        let meta = ProjectMeta::new(
            "zoo",
            ClassLabels::new(labels("a", "b", "c")).unwrap(),
            false,
        );
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["class_labels"], serde_json::json!(["a", "b", "c"]));
        assert_eq!(json["active_variant"], serde_json::json!("SVM"));
        let back: ProjectMeta = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);

        let bad = serde_json::json!({"name": "zoo", "class_labels": ["a", "a", "c"]});
        assert!(serde_json::from_value::<ProjectMeta>(bad).is_err());
    }

    #[test]
    fn trainable_needs_two_per_class() {
        let mut meta = ProjectMeta::new(
            "zoo",
            ClassLabels::new(labels("a", "b", "c")).unwrap(),
            false,
        );
        meta.counters = [1, 2, 2];
        assert!(matches!(
            meta.ensure_trainable(),
            Err(EngineError::MinimumSamples {
                required: 2,
                counts: [1, 2, 2]
            })
        ));
        meta.counters = [2, 2, 2];
        meta.ensure_trainable().unwrap();
    }

    #[test]
    fn rotate_keeps_meta_in_step() {
        let meta = ProjectMeta::new(
            "zoo",
            ClassLabels::new(labels("a", "b", "c")).unwrap(),
            false,
        );
        let mut state = ProjectState::new(meta);
        assert_eq!(state.rotate(), VariantTag::Knn);
        assert_eq!(state.meta.active_variant, VariantTag::Knn);
        assert!(!state.summary().ready);
    }

    #[test]
    fn rotate_drops_the_next_variants_artifact() {
        let meta = ProjectMeta::new(
            "zoo",
            ClassLabels::new(labels("a", "b", "c")).unwrap(),
            false,
        );
        let mut state = ProjectState::new(meta);
        state.artifacts.insert(VariantTag::Svm, b"svm".to_vec());
        state.artifacts.insert(VariantTag::Knn, b"knn".to_vec());
        let staged = state.artifacts_after_rotate();
        assert_eq!(staged.keys().copied().collect::<Vec<_>>(), vec![VariantTag::Svm]);
        state.rotate();
        assert_eq!(state.artifacts, staged);
        assert_eq!(state.summary().trained_variants, vec![VariantTag::Svm]);
    }

    #[test]
    fn hydrate_skips_artifact_of_another_variant() {
        use crate::config::TrainingSettings;
        use crate::ml::{Classifier, FittedModel};

        let mut meta = ProjectMeta::new(
            "zoo",
            ClassLabels::new(labels("a", "b", "c")).unwrap(),
            false,
        );
        meta.active_variant = VariantTag::Knn;
        let x: Vec<Vec<f32>> = (0..6)
            .map(|i| vec![(i / 2) as f32; FEATURE_LEN])
            .collect();
        let y = [1, 1, 2, 2, 3, 3];
        let mut model = FittedModel::untrained(VariantTag::NaiveBayes, &TrainingSettings::default());
        model.fit(&x, &y).unwrap();
        let mut artifacts = ArtifactMap::new();
        artifacts.insert(VariantTag::Knn, artifact::encode(&model).unwrap());

        let state = ProjectState::hydrate(meta, artifacts);
        assert!(state.registry.fitted().is_none());
        assert_eq!(state.active_variant(), VariantTag::Knn);
        assert_eq!(state.meta.active_variant, VariantTag::Knn);
    }

    #[test]
    fn hydrate_ignores_unusable_artifacts() {
        let meta = ProjectMeta::new(
            "zoo",
            ClassLabels::new(labels("a", "b", "c")).unwrap(),
            false,
        );
        let mut artifacts = ArtifactMap::new();
        artifacts.insert(VariantTag::Svm, b"garbage".to_vec());
        let state = ProjectState::hydrate(meta, artifacts);
        assert!(state.registry.fitted().is_none());
        assert_eq!(state.summary().trained_variants, vec![VariantTag::Svm]);
    }
}
