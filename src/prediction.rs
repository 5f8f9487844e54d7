//! Maps a drawing to one of the project's class labels using the live model.

use crate::error::{EngineError, EngineResult};
use crate::ml::Classifier;
use crate::project::{ClassIndex, ClassLabels, ProjectState};

/// Predict the label of an already normalized feature vector.
pub fn predict(state: &ProjectState, features: &[f32]) -> EngineResult<String> {
    let active = state.active_variant();
    let model = state
        .registry
        .fitted()
        .ok_or_else(|| EngineError::NotFitted(active.to_string()))?;
    let index = model.predict(features)?;
    label_for(&state.meta.class_labels, index).map(str::to_string)
}

/// Look up the label for a predicted class index.
pub fn label_for(labels: &ClassLabels, index: u8) -> EngineResult<&str> {
    let class = ClassIndex::try_from(i64::from(index)).map_err(|_| EngineError::InvalidLabel(index))?;
    Ok(labels.label(class))
}
