//! Conversion of CLI arguments into pipeline configuration

use crate::batch::BatchOperation;
use crate::cli::main_impl::{Cli, CliBackground, CliMaskFormat};
use crate::{
    config::{BackgroundMode, MaskExportFormat, Settings, DEFAULT_BLUR_STRENGTH},
    inference::{MaskPredictor, SidecarMaskPredictor, StaticMaskPredictor},
    services::{JsonSettingsStore, SettingsStore},
    types::Rgb,
};
use anyhow::{Context, Result};
use std::sync::Arc;

/// Turns parsed arguments into settings, predictor and batch operation
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Reject argument combinations that cannot work
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if cli.mask.is_some() && cli.mask_dir.is_some() {
            anyhow::bail!("--mask and --mask-dir cannot be used together");
        }

        if cli.mask.is_some() && cli.input.len() != 1 {
            anyhow::bail!("--mask requires exactly one input file");
        }

        if cli.export_mask.is_some()
            && (cli.background.is_some()
                || cli.color.is_some()
                || cli.background_image.is_some()
                || cli.blur_strength.is_some())
        {
            anyhow::bail!("--export-mask cannot be combined with background options");
        }

        if cli.workers == 0 {
            anyhow::bail!("--workers must be at least 1");
        }

        Ok(())
    }

    /// Settings store selected by `--settings`, or the per-user default
    pub(crate) fn settings_store(cli: &Cli) -> Option<JsonSettingsStore> {
        match &cli.settings {
            Some(path) => Some(JsonSettingsStore::new(path)),
            None => JsonSettingsStore::from_default_location().ok(),
        }
    }

    /// Base settings: an explicit `--settings` file must load, the default
    /// location silently falls back to defaults
    pub(crate) fn base_settings(cli: &Cli, store: Option<&JsonSettingsStore>) -> Result<Settings> {
        match (store, &cli.settings) {
            (Some(store), Some(_)) => store.try_load().with_context(|| {
                format!("Failed to load settings from {}", store.path().display())
            }),
            (Some(store), None) => Ok(store.load()),
            (None, _) => Ok(Settings::default()),
        }
    }

    /// Apply command-line overrides on top of `base`
    pub(crate) fn settings_from_cli(cli: &Cli, base: Settings) -> Result<Settings> {
        let mut settings = base;

        if let Some(threshold) = cli.threshold {
            settings.threshold = threshold;
        }
        if let Some(smooth) = cli.smooth {
            settings.smooth_pixels = smooth;
        }
        if let Some(feather) = cli.feather {
            settings.feather_pixels = feather;
        }
        if cli.auto_crop {
            settings.auto_crop_output = true;
        }
        if let Some(threshold) = cli.crop_threshold {
            settings.crop_alpha_threshold = threshold;
        }
        if let Some(threshold) = cli.binary_threshold {
            settings.mask_export_binary_threshold = threshold;
        }
        if let Some(mode) = Self::background_mode(cli, &settings)? {
            settings.background = mode;
        }

        settings.validate().context("Invalid settings")?;
        Ok(settings)
    }

    /// Background mode requested on the command line, if any
    fn background_mode(cli: &Cli, settings: &Settings) -> Result<Option<BackgroundMode>> {
        let requested = cli.background.or_else(|| {
            if cli.color.is_some() {
                Some(CliBackground::Color)
            } else if cli.background_image.is_some() {
                Some(CliBackground::Image)
            } else if cli.blur_strength.is_some() {
                Some(CliBackground::Blur)
            } else {
                None
            }
        });

        let mode = match requested {
            None => return Ok(None),
            Some(CliBackground::Transparent) => BackgroundMode::Transparent,
            Some(CliBackground::Color) => {
                let color = match (&cli.color, &settings.background) {
                    (Some(color), _) => color
                        .parse::<Rgb>()
                        .with_context(|| format!("Invalid --color value '{color}'"))?,
                    (None, BackgroundMode::Color { color }) => *color,
                    (None, _) => anyhow::bail!("--background color requires --color"),
                };
                BackgroundMode::Color { color }
            },
            Some(CliBackground::Image) => {
                let path = match (&cli.background_image, &settings.background) {
                    (Some(path), _) => path.clone(),
                    (None, BackgroundMode::Image { path }) => path.clone(),
                    (None, _) => anyhow::bail!("--background image requires --background-image"),
                };
                BackgroundMode::Image { path }
            },
            Some(CliBackground::Blur) => {
                let strength = match (cli.blur_strength, &settings.background) {
                    (Some(strength), _) => strength,
                    (None, BackgroundMode::Blur { strength }) => *strength,
                    (None, _) => DEFAULT_BLUR_STRENGTH,
                };
                BackgroundMode::Blur { strength }
            },
        };

        Ok(Some(mode))
    }

    /// Mask source for this run
    pub(crate) fn predictor(cli: &Cli) -> Result<Arc<dyn MaskPredictor>> {
        if let Some(mask) = &cli.mask {
            let predictor = StaticMaskPredictor::from_file(mask)
                .with_context(|| format!("Failed to load mask {}", mask.display()))?;
            return Ok(Arc::new(predictor));
        }

        let mut predictor = SidecarMaskPredictor::new().with_suffix(cli.mask_suffix.clone());
        if let Some(dir) = &cli.mask_dir {
            predictor = predictor.with_mask_dir(dir);
        }
        Ok(Arc::new(predictor))
    }

    /// What every input turns into
    pub(crate) fn operation(cli: &Cli, settings: &Settings) -> BatchOperation {
        match cli.export_mask {
            Some(CliMaskFormat::Grayscale) => BatchOperation::ExportMask(MaskExportFormat::Grayscale),
            Some(CliMaskFormat::Binary) => BatchOperation::ExportMask(settings.binary_export_format()),
            Some(CliMaskFormat::Alpha) => BatchOperation::ExportMask(MaskExportFormat::AlphaOnly),
            None => BatchOperation::Remove(settings.background.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("bgcompose").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_overrides_apply() {
        let cli = parse(&[
            "in.png",
            "--threshold",
            "0.3",
            "--smooth",
            "0",
            "--feather",
            "4",
            "--auto-crop",
            "--crop-threshold",
            "20",
        ]);
        let settings = CliConfigBuilder::settings_from_cli(&cli, Settings::default()).unwrap();
        assert!((settings.threshold - 0.3).abs() < f32::EPSILON);
        assert_eq!(settings.smooth_pixels, 0);
        assert_eq!(settings.feather_pixels, 4);
        assert!(settings.auto_crop_output);
        assert_eq!(settings.crop_alpha_threshold, 20);
        assert_eq!(settings.background, BackgroundMode::Transparent);
    }

    #[test]
    fn test_background_resolution() {
        let cli = parse(&["in.png", "--color", "#102030"]);
        let settings = CliConfigBuilder::settings_from_cli(&cli, Settings::default()).unwrap();
        assert_eq!(
            settings.background,
            BackgroundMode::Color {
                color: Rgb::new(0x10, 0x20, 0x30)
            }
        );

        let cli = parse(&["in.png", "--background", "blur"]);
        let settings = CliConfigBuilder::settings_from_cli(&cli, Settings::default()).unwrap();
        assert_eq!(
            settings.background,
            BackgroundMode::Blur {
                strength: DEFAULT_BLUR_STRENGTH
            }
        );

        let cli = parse(&["in.png", "--background", "color"]);
        assert!(CliConfigBuilder::settings_from_cli(&cli, Settings::default()).is_err());

        let cli = parse(&["in.png", "--threshold", "1.5"]);
        assert!(CliConfigBuilder::settings_from_cli(&cli, Settings::default()).is_err());
    }

    #[test]
    fn test_operation_selection() {
        let settings = Settings::default();
        let cli = parse(&["in.png", "--export-mask", "binary"]);
        assert_eq!(
            CliConfigBuilder::operation(&cli, &settings),
            BatchOperation::ExportMask(MaskExportFormat::Binary { threshold: 0.5 })
        );

        let cli = parse(&["in.png"]);
        assert_eq!(
            CliConfigBuilder::operation(&cli, &settings),
            BatchOperation::Remove(BackgroundMode::Transparent)
        );
    }

    #[test]
    fn test_invalid_combinations() {
        let cli = parse(&["a.png", "b.png", "--mask", "m.png"]);
        assert!(CliConfigBuilder::validate_cli(&cli).is_err());

        let cli = parse(&["a.png", "--mask", "m.png", "--mask-dir", "masks"]);
        assert!(CliConfigBuilder::validate_cli(&cli).is_err());

        let cli = parse(&["a.png", "--export-mask", "alpha", "--color", "#ffffff"]);
        assert!(CliConfigBuilder::validate_cli(&cli).is_err());

        let cli = parse(&["a.png", "--workers", "0"]);
        assert!(CliConfigBuilder::validate_cli(&cli).is_err());

        let cli = parse(&["a.png", "--mask", "m.png"]);
        assert!(CliConfigBuilder::validate_cli(&cli).is_ok());
    }
}
