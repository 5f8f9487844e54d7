//! Fits the active classifier of a project and commits its artifact.

use std::time::Instant;

use crate::config::TrainingSettings;
use crate::error::EngineResult;
use crate::ml::{Classifier, FittedModel, VariantTag, artifact};
use crate::project::ProjectState;
use crate::samples;
use crate::store::ProjectStore;

/// What a successful training run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainOutcome {
    pub variant: VariantTag,
    pub samples: usize,
    pub skipped: usize,
}

/// Train the active variant on every stored sample.
///
/// The new model is fitted and persisted before the session is touched, so any
/// failure leaves both the live model and the stored artifacts as they were.
pub fn train(
    store: &dyn ProjectStore,
    state: &mut ProjectState,
    settings: &TrainingSettings,
) -> EngineResult<TrainOutcome> {
    state.meta.ensure_trainable()?;
    let variant = state.active_variant();
    let started = Instant::now();

    let loaded = samples::load_all(store, state.name())?;
    let skipped = loaded.skipped;
    let (x, y) = loaded.into_dataset();
    let mut model = FittedModel::untrained(variant, settings);
    model.fit(&x, &y)?;
    let blob = artifact::encode(&model)?;

    let mut staged = state.artifacts.clone();
    staged.insert(variant, blob);
    store.save_artifacts(state.name(), &staged)?;

    state.artifacts = staged;
    state.registry.install(model);
    tracing::info!(
        project = %state.name(),
        variant = %variant,
        samples = x.len(),
        skipped,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Trained model"
    );
    Ok(TrainOutcome {
        variant,
        samples: x.len(),
        skipped,
    })
}
