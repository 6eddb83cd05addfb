use bgcompose::{
    AlphaCompositor, BackgroundReplacer, ColorImage, Mask, MaskRefiner, RefineParams, Rgb,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

const SIZES: [(u32, u32); 3] = [(256, 256), (1024, 768), (1920, 1080)];

/// Soft circular foreground with a noisy rim
fn synthetic_mask(width: u32, height: u32) -> Mask {
    let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
    let radius = width.min(height) as f32 / 3.0;
    let values = (0..height)
        .flat_map(|y| (0..width).map(move |x| (x, y)))
        .map(|(x, y)| {
            let distance = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
            let noise = ((x * 31 + y * 17) % 13) as f32 / 100.0;
            (1.0 - (distance - radius) / 8.0 + noise).clamp(0.0, 1.0)
        })
        .collect();
    Mask::from_vec(width, height, values).expect("valid mask")
}

fn synthetic_image(width: u32, height: u32) -> ColorImage {
    let data = (0..width * height)
        .flat_map(|i| [(i % 251) as u8, (i % 239) as u8, (i % 233) as u8])
        .collect();
    ColorImage::new(width, height, data).expect("valid image")
}

fn benchmark_refine(c: &mut Criterion) {
    let refiner = MaskRefiner::new();
    let mut group = c.benchmark_group("refine");
    group.sample_size(10);

    for (width, height) in SIZES {
        let mask = synthetic_mask(width, height);
        for (smooth, feather) in [(0, 0), (2, 1), (5, 5)] {
            let params = RefineParams::new(0.5, smooth, feather).expect("valid params");
            group.bench_with_input(
                BenchmarkId::new(format!("smooth{smooth}_feather{feather}"), format!("{width}x{height}")),
                &mask,
                |b, mask| b.iter(|| refiner.refine(black_box(mask), black_box(&params))),
            );
        }
    }

    group.finish();
}

fn benchmark_composite(c: &mut Criterion) {
    let replacer = BackgroundReplacer::new();
    let background = synthetic_image(640, 480);
    let mut group = c.benchmark_group("composite");
    group.sample_size(10);

    for (width, height) in SIZES {
        let image = synthetic_image(width, height);
        let mask = synthetic_mask(width, height);
        let size = format!("{width}x{height}");

        group.bench_function(BenchmarkId::new("alpha", &size), |b| {
            b.iter(|| AlphaCompositor::compose(black_box(&image), black_box(&mask)));
        });
        group.bench_function(BenchmarkId::new("color", &size), |b| {
            b.iter(|| replacer.replace_with_color(black_box(&image), black_box(&mask), Rgb::WHITE));
        });
        group.bench_function(BenchmarkId::new("image", &size), |b| {
            b.iter(|| {
                replacer.replace_with_image(black_box(&image), black_box(&mask), black_box(&background))
            });
        });
        group.bench_function(BenchmarkId::new("blur51", &size), |b| {
            b.iter(|| replacer.replace_with_blur(black_box(&image), black_box(&mask), 51));
        });
    }

    group.finish();
}

criterion_group!(pipeline_benches, benchmark_refine, benchmark_composite);
criterion_main!(pipeline_benches);
