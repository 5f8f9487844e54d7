//! Sample ingestion and dataset loading on top of a [`ProjectStore`].

use crate::error::EngineResult;
use crate::features::{self, FeatureVector};
use crate::project::{ClassIndex, ProjectState};
use crate::store::ProjectStore;

/// Decode an incoming drawing and produce the canonical blob that gets stored.
///
/// Runs before any project lock is taken; undecodable input fails with `SampleDecode`.
pub fn encode_sample(bytes: &[u8]) -> EngineResult<Vec<u8>> {
    let image = features::decode_image(bytes)?;
    features::canonical_png(&image)
}

/// Persist an encoded sample and bump the project's counter for `class`.
pub fn save(
    store: &dyn ProjectStore,
    state: &mut ProjectState,
    class: ClassIndex,
    blob: &[u8],
) -> EngineResult<u64> {
    let sequence = store.save_sample(state.name(), class, blob)?;
    state.record_sample(class, sequence);
    Ok(sequence)
}

/// Every decodable sample of a project as `(class, features)` pairs.
#[derive(Debug, Default)]
pub struct LoadedSamples {
    pub rows: Vec<(ClassIndex, FeatureVector)>,
    /// Samples that could not be read or decoded.
    pub skipped: usize,
}

impl LoadedSamples {
    /// Split into the row-major matrix and label vector the classifiers take.
    pub fn into_dataset(self) -> (Vec<Vec<f32>>, Vec<u8>) {
        self.rows
            .into_iter()
            .map(|(class, features)| (features, class.get()))
            .unzip()
    }
}

/// Load and normalize every stored sample, skipping (and logging) unreadable ones.
pub fn load_all(store: &dyn ProjectStore, project: &str) -> EngineResult<LoadedSamples> {
    let mut loaded = LoadedSamples::default();
    for item in store.stream_samples(project)? {
        let sample = match item {
            Ok(sample) => sample,
            Err(err) => {
                tracing::warn!(project, "Skipping unreadable sample: {err}");
                loaded.skipped += 1;
                continue;
            }
        };
        match features::normalize(&sample.blob) {
            Ok(vector) => loaded.rows.push((sample.class_index, vector)),
            Err(err) => {
                tracing::warn!(
                    project,
                    class = %sample.class_index,
                    sequence = sample.sequence,
                    "Skipping undecodable sample: {err}"
                );
                loaded.skipped += 1;
            }
        }
    }
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FEATURE_LEN;
    use crate::project::{ClassLabels, ProjectMeta};
    use crate::store::LocalStore;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;
    use tempfile::tempdir;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, [10, 200, 30].into()));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn project(store: &LocalStore) -> ProjectState {
        let labels = ClassLabels::new(["a".into(), "b".into(), "c".into()]).unwrap();
        let meta = ProjectMeta::new("zoo", labels, false);
        store.create_project(&meta).unwrap();
        ProjectState::new(meta)
    }

    #[test]
    fn save_assigns_sequences_and_counts() {
        let dir = tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let mut state = project(&store);
        let blob = encode_sample(&png(40, 80)).unwrap();
        let class = ClassIndex::try_from(2u8).unwrap();
        assert_eq!(save(&store, &mut state, class, &blob).unwrap(), 1);
        assert_eq!(save(&store, &mut state, class, &blob).unwrap(), 2);
        assert_eq!(state.meta.counters, [0, 2, 0]);
    }

    #[test]
    fn corrupt_blobs_are_skipped() {
        let dir = tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let mut state = project(&store);
        let good = encode_sample(&png(10, 10)).unwrap();
        let class = ClassIndex::try_from(1u8).unwrap();
        save(&store, &mut state, class, &good).unwrap();
        save(&store, &mut state, class, b"definitely not a png").unwrap();
        let loaded = load_all(&store, "zoo").unwrap();
        assert_eq!(loaded.skipped, 1);
        assert_eq!(loaded.rows.len(), 1);
        let (x, y) = loaded.into_dataset();
        assert_eq!(y, vec![1]);
        assert_eq!(x[0].len(), FEATURE_LEN);
    }
}
