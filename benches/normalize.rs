use std::hint::black_box;
use std::io::Cursor;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use scribble::config::TrainingSettings;
use scribble::features;
use scribble::ml::{Classifier, FittedModel, VariantTag};

fn sketch(width: u32, height: u32, seed: u32) -> Vec<u8> {
    let image = RgbaImage::from_fn(width, height, |x, y| {
        if (x * 7 + y * 3 + seed) % 11 == 0 {
            Rgba([0, 0, 0, 255])
        } else {
            Rgba([255, 255, 255, 0])
        }
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image)
        .write_to(&mut out, ImageFormat::Png)
        .expect("encode sketch");
    out.into_inner()
}

fn bench_normalize(c: &mut Criterion) {
    for (width, height) in [(100, 100), (280, 280), (640, 360)] {
        let bytes = sketch(width, height, 1);
        c.bench_with_input(
            BenchmarkId::new("normalize", format!("{width}x{height}")),
            &bytes,
            |b, bytes| {
                b.iter(|| features::normalize(black_box(bytes)).expect("normalize"));
            },
        );
    }
}

fn bench_predict(c: &mut Criterion) {
    let settings = TrainingSettings::default();
    let mut x = Vec::new();
    let mut y = Vec::new();
    for class in 1u8..=3 {
        for seed in 0..4 {
            let bytes = sketch(100, 100, u32::from(class) * 5 + seed);
            x.push(features::normalize(&bytes).expect("normalize"));
            y.push(class);
        }
    }
    let query = features::normalize(&sketch(100, 100, 2)).expect("normalize");
    for tag in VariantTag::ALL {
        let mut model = FittedModel::untrained(tag, &settings);
        model.fit(&x, &y).expect("fit");
        c.bench_with_input(BenchmarkId::new("predict", tag), &query, |b, query| {
            b.iter(|| model.predict(black_box(query)).expect("predict"));
        });
    }
}

criterion_group!(benches, bench_normalize, bench_predict);
criterion_main!(benches);
