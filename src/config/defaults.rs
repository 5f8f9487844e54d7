pub(super) const MAX_IO_TIMEOUT_MS: u64 = 600_000;
pub(super) const MAX_FOREST_TREES: usize = 1_000;

pub(super) fn default_io_timeout_ms() -> u64 {
    5_000
}

pub(super) fn default_max_live_sessions() -> usize {
    0
}

pub(super) fn default_seed() -> u64 {
    42
}

pub(super) fn default_knn_neighbors() -> usize {
    5
}

pub(super) fn default_forest_trees() -> usize {
    100
}

pub(super) fn default_svm_epochs() -> usize {
    100
}

pub(super) fn default_svm_learning_rate() -> f32 {
    0.001
}

pub(super) fn default_svm_l2() -> f32 {
    1e-4
}

pub(super) fn default_logreg_epochs() -> usize {
    100
}

pub(super) fn default_logreg_learning_rate() -> f32 {
    0.5
}

pub(super) fn default_logreg_l2() -> f32 {
    1e-4
}

pub(super) fn clamp_io_timeout_ms(value: u64) -> u64 {
    value.clamp(1, MAX_IO_TIMEOUT_MS)
}

pub(super) fn clamp_positive_rate(value: f32, fallback: f32) -> f32 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        fallback
    }
}

pub(super) fn clamp_non_negative(value: f32) -> f32 {
    if value.is_finite() { value.max(0.0) } else { 0.0 }
}

pub(super) fn default_log_level() -> String {
    "info".to_string()
}

pub(super) fn default_log_to_file() -> bool {
    true
}

pub(super) fn default_max_log_files() -> usize {
    10
}
