//! The active classifier variant of a project and its live fitted instance.

use super::{Classifier, FittedModel, VariantTag};

/// Tracks which variant is active and, when available, a fitted instance of it.
///
/// The live instance always matches the active tag. Rotating clears it; callers
/// hydrate a fitted instance from persisted artifacts or by retraining.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    active: VariantTag,
    live: Option<FittedModel>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_active(active: VariantTag) -> Self {
        Self { active, live: None }
    }

    pub fn active(&self) -> VariantTag {
        self.active
    }

    /// Advance to the next variant and return it. Any live model is dropped.
    pub fn rotate(&mut self) -> VariantTag {
        self.active = self.active.next();
        self.live = None;
        self.active
    }

    /// Install a fitted model, making its variant active.
    pub fn install(&mut self, model: FittedModel) {
        self.active = model.tag();
        self.live = Some(model);
    }

    /// The live instance, if it is fitted.
    pub fn fitted(&self) -> Option<&FittedModel> {
        self.live.as_ref().filter(|model| model.is_fitted())
    }
}
