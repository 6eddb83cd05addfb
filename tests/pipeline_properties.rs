//! Property tests for the refinement and compositing stages
//!
//! Inputs are generated from a fixed-seed generator so every run checks the
//! same set of masks and images.

use bgcompose::{
    AlphaCompositor, BackgroundReplacer, ColorImage, CompositeImage, ContentCropper, Mask,
    MaskExporter, MaskRefiner, RefineParams, Result, Rgb,
};
use image::{Rgba, RgbaImage};

/// Small deterministic generator (64-bit LCG)
struct Lcg(u64);

impl Lcg {
    fn next_u32(&mut self) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 33) as u32
    }

    fn unit(&mut self) -> f32 {
        (self.next_u32() % 10_001) as f32 / 10_000.0
    }

    fn byte(&mut self) -> u8 {
        (self.next_u32() % 256) as u8
    }
}

fn random_mask(rng: &mut Lcg, width: u32, height: u32) -> Mask {
    let values = (0..width * height).map(|_| rng.unit()).collect();
    Mask::from_vec(width, height, values).unwrap()
}

fn random_image(rng: &mut Lcg, width: u32, height: u32) -> ColorImage {
    let data = (0..width * height * 3).map(|_| rng.byte()).collect();
    ColorImage::new(width, height, data).unwrap()
}

fn random_composite(rng: &mut Lcg, width: u32, height: u32) -> CompositeImage {
    // Mostly transparent with a few opaque specks
    let buffer = RgbaImage::from_fn(width, height, |_, _| {
        let alpha = if rng.next_u32() % 7 == 0 { rng.byte() } else { 0 };
        Rgba([rng.byte(), rng.byte(), rng.byte(), alpha])
    });
    CompositeImage::from_rgba(buffer)
}

#[test]
fn refine_with_everything_disabled_is_identity() -> Result<()> {
    let mut rng = Lcg(7);
    let refiner = MaskRefiner::new();
    let params = RefineParams::new(0.0, 0, 0)?;

    for (width, height) in [(1, 1), (5, 3), (16, 9), (31, 17)] {
        let mask = random_mask(&mut rng, width, height);
        let refined = refiner.refine(&mask, &params)?;
        assert_eq!(refined.data(), mask.data());
        assert!(!refined.is_binary());

        let binary = mask.threshold(0.5);
        assert!(binary.is_binary());
        let refined = refiner.refine(&binary, &params)?;
        assert_eq!(refined.data(), binary.data());
        assert!(!refined.is_binary());
    }
    Ok(())
}

#[test]
fn refine_always_clears_binary_flag_and_stays_in_range() -> Result<()> {
    let mut rng = Lcg(11);
    let refiner = MaskRefiner::new();

    for (threshold, smooth, feather) in [(0.5, 0, 0), (0.3, 1, 0), (0.7, 0, 2), (0.5, 2, 1)] {
        let params = RefineParams::new(threshold, smooth, feather)?;
        let mask = random_mask(&mut rng, 20, 14);
        let refined = refiner.refine(&mask, &params)?;

        assert!(!refined.is_binary());
        assert_eq!(refined.dimensions(), mask.dimensions());
        assert!(refined.data().iter().all(|v| (0.0..=1.0).contains(v)));
    }
    Ok(())
}

#[test]
fn threshold_counts_equal_values_as_foreground() -> Result<()> {
    let mask = Mask::from_vec(3, 1, vec![0.49, 0.5, 0.51])?;
    let refined = MaskRefiner::new().refine(&mask, &RefineParams::new(0.5, 0, 0)?)?;
    assert_eq!(refined.data().iter().copied().collect::<Vec<_>>(), vec![0.0, 1.0, 1.0]);
    Ok(())
}

#[test]
fn crop_is_idempotent() {
    let mut rng = Lcg(23);

    for threshold in [0_u8, 1, 10, 128, 255] {
        let cropper = ContentCropper::new(threshold);
        for (width, height) in [(1, 1), (8, 5), (24, 24)] {
            let image = random_composite(&mut rng, width, height);
            let once = cropper.crop(&image);
            let twice = cropper.crop(&once);
            assert_eq!(once, twice, "threshold {threshold}, {width}x{height}");
        }
    }
}

#[test]
fn fully_transparent_image_is_not_cropped() {
    let image = CompositeImage::from_rgba(RgbaImage::from_pixel(7, 4, Rgba([9, 8, 7, 0])));
    let cropper = ContentCropper::default();

    assert_eq!(cropper.bounds(&image).as_tuple(), (0, 0, 7, 4));
    assert_eq!(cropper.crop(&image), image);
}

#[test]
fn compose_alpha_is_quantized_mask() -> Result<()> {
    let mut rng = Lcg(31);

    for (width, height) in [(1, 1), (6, 6), (13, 5)] {
        let image = random_image(&mut rng, width, height);
        let mask = random_mask(&mut rng, width, height);
        let output = AlphaCompositor::compose(&image, &mask)?;

        for y in 0..height {
            for x in 0..width {
                let value = mask.get(x, y).unwrap();
                let expected = (value.clamp(0.0, 1.0) * 255.0).round() as u8;
                let [r, g, b, a] = output.pixel(x, y).unwrap();
                assert_eq!(a, expected);
                assert_eq!([r, g, b], image.as_rgb().get_pixel(x, y).0);
            }
        }
    }
    Ok(())
}

#[test]
fn color_replacement_is_always_opaque() -> Result<()> {
    let mut rng = Lcg(47);
    let replacer = BackgroundReplacer::new();

    for (width, height) in [(1, 1), (9, 4), (17, 11)] {
        let image = random_image(&mut rng, width, height);
        let mask = random_mask(&mut rng, width, height);
        let color = Rgb::new(rng.byte(), rng.byte(), rng.byte());
        let output = replacer.replace_with_color(&image, &mask, color)?;
        assert!(output.alpha_channel().iter().all(|&a| a == 255));
    }
    Ok(())
}

#[test]
fn white_square_scenario() -> Result<()> {
    let image = ColorImage::filled(4, 4, Rgb::WHITE);
    let values = (0..16)
        .map(|i| if i % 4 < 2 && i / 4 < 2 { 1.0 } else { 0.0 })
        .collect();
    let mask = Mask::from_vec(4, 4, values)?;

    let refined = MaskRefiner::new().refine(&mask, &RefineParams::new(0.0, 0, 0)?)?;
    let output = AlphaCompositor::compose(&image, &refined)?;

    assert_eq!(
        output.alpha_channel(),
        vec![255, 255, 0, 0, 255, 255, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]
    );
    for pixel in output.as_rgba().pixels() {
        assert_eq!(&pixel.0[..3], &[255, 255, 255]);
    }
    Ok(())
}

#[test]
fn binary_export_scenario() -> Result<()> {
    let mask = Mask::from_vec(2, 1, vec![0.2, 0.6])?;
    let output = MaskExporter::export_binary(&mask, 0.5);
    assert_eq!(output.pixel(0, 0), Some([0, 0, 0, 255]));
    assert_eq!(output.pixel(1, 0), Some([255, 255, 255, 255]));
    Ok(())
}

#[test]
fn pure_background_becomes_solid_color() -> Result<()> {
    let mut rng = Lcg(59);
    let image = random_image(&mut rng, 6, 5);
    let mask = Mask::filled(6, 5, 0.0)?;
    let color = Rgb::new(12, 200, 99);

    let output = BackgroundReplacer::new().replace_with_color(&image, &mask, color)?;
    for pixel in output.as_rgba().pixels() {
        assert_eq!(pixel.0, [12, 200, 99, 255]);
    }
    Ok(())
}
