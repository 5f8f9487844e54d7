//! Versioned JSON envelope for persisted fitted models.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Classifier, FittedModel, VariantTag};

/// Bumped whenever the envelope or a model layout changes incompatibly.
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Model artifact is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported model artifact version {found} (expected {ARTIFACT_FORMAT_VERSION})")]
    UnsupportedVersion { found: u32 },
    #[error("Artifact declares variant {declared} but contains {found}")]
    VariantMismatch {
        declared: VariantTag,
        found: VariantTag,
    },
    #[error("Artifact expects {found} features, engine produces {expected}")]
    FeatureLen { expected: usize, found: usize },
    #[error("Artifact for {0} holds an untrained model")]
    Untrained(VariantTag),
    #[error("Artifact for {variant} is malformed: {reason}")]
    Malformed { variant: VariantTag, reason: String },
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    format_version: u32,
    variant: VariantTag,
    feature_len: usize,
    model: FittedModel,
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    format_version: u32,
    variant: VariantTag,
    feature_len: usize,
    model: &'a FittedModel,
}

/// Serialize a fitted model into a self-describing blob.
pub fn encode(model: &FittedModel) -> Result<Vec<u8>, ArtifactError> {
    if !model.is_fitted() {
        return Err(ArtifactError::Untrained(model.tag()));
    }
    let envelope = EnvelopeRef {
        format_version: ARTIFACT_FORMAT_VERSION,
        variant: model.tag(),
        feature_len: model.feature_len(),
        model,
    };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Restore a fitted model, checking it against the feature width the engine produces.
pub fn decode(bytes: &[u8], expected_feature_len: usize) -> Result<FittedModel, ArtifactError> {
    let envelope: Envelope = serde_json::from_slice(bytes)?;
    if envelope.format_version != ARTIFACT_FORMAT_VERSION {
        return Err(ArtifactError::UnsupportedVersion {
            found: envelope.format_version,
        });
    }
    let found = envelope.model.tag();
    if found != envelope.variant {
        return Err(ArtifactError::VariantMismatch {
            declared: envelope.variant,
            found,
        });
    }
    if !envelope.model.is_fitted() {
        return Err(ArtifactError::Untrained(found));
    }
    let model_len = envelope.model.feature_len();
    if envelope.feature_len != expected_feature_len || model_len != expected_feature_len {
        return Err(ArtifactError::FeatureLen {
            expected: expected_feature_len,
            found: if model_len != expected_feature_len {
                model_len
            } else {
                envelope.feature_len
            },
        });
    }
    envelope
        .model
        .validate()
        .map_err(|reason| ArtifactError::Malformed {
            variant: found,
            reason,
        })?;
    Ok(envelope.model)
}
