//! Rotated, binarized image variants for recognition.
//!
//! Pipeline per angle: rotate → greyscale → contrast-normalize → sharpen →
//! median denoise → threshold → linear stretch → upscale → PNG.

use std::path::{Path, PathBuf};

use image::{imageops::FilterType, DynamicImage, GrayImage, ImageFormat, Luma};
use imageproc::{
    filter::{median_filter, sharpen3x3},
    geometric_transformations::{rotate_about_center, Interpolation},
};
use rayon::prelude::*;
use tempfile::TempDir;

use crate::config::PreprocessConfig;
use crate::error::PreprocessError;

/// Per-scan scratch directory. Removed with everything in it on drop.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn create() -> std::io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("ticketscan-").tempdir()?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// One image handed to the recognizer.
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub image_path: PathBuf,
    pub rotation_degrees: i32,
}

/// Produce one variant per configured rotation, in parallel.
///
/// Never fails: a variant that cannot be produced (unreadable source, no
/// workspace, encode error) falls back to the untouched source path.
pub fn prepare_variants(
    source: &Path,
    workspace: Option<&Workspace>,
    config: &PreprocessConfig,
) -> Vec<Variant> {
    let original = |rotation_degrees: i32| Variant {
        image_path: source.to_path_buf(),
        rotation_degrees,
    };

    let decoded = match image::open(source) {
        Ok(img) => img,
        Err(e) => {
            log::warn!(
                "[PREPROCESS] cannot decode {}: {e}, using the original for every angle",
                source.display()
            );
            return config.rotations.iter().map(|&r| original(r)).collect();
        }
    };

    config
        .rotations
        .par_iter()
        .map(|&rotation| {
            match write_variant(&decoded, rotation, workspace, config) {
                Ok(path) => Variant {
                    image_path: path,
                    rotation_degrees: rotation,
                },
                Err(e) => {
                    log::warn!("[PREPROCESS] {rotation}° failed: {e}, using the original");
                    original(rotation)
                }
            }
        })
        .collect()
}

fn write_variant(
    img: &DynamicImage,
    rotation: i32,
    workspace: Option<&Workspace>,
    config: &PreprocessConfig,
) -> Result<PathBuf, PreprocessError> {
    let workspace = workspace.ok_or(PreprocessError::NoWorkspace)?;
    let processed = render_variant(img, rotation, config)?;
    let path = workspace.path().join(format!("pre_{rotation}.png"));
    processed.save_with_format(&path, ImageFormat::Png)?;
    log::debug!(
        "[PREPROCESS] {rotation}° → {} ({}×{})",
        path.display(),
        processed.width(),
        processed.height()
    );
    Ok(path)
}

/// Run the full filter chain for one angle.
pub fn render_variant(
    img: &DynamicImage,
    rotation: i32,
    config: &PreprocessConfig,
) -> Result<GrayImage, PreprocessError> {
    let original_width = img.width();
    if original_width == 0 || img.height() == 0 {
        return Err(PreprocessError::EmptyImage);
    }

    let mut gray = rotate(img, rotation);
    gray = normalize(&gray, config.normalize_clip_percent);
    gray = sharpen3x3(&gray);
    gray = median_filter(&gray, config.median_radius, config.median_radius);
    binarize(&mut gray, config.binarize_threshold);
    linear(&mut gray, config.contrast_scale, config.contrast_bias);

    let target_w = target_width(original_width, config);
    let target_h = ((gray.height() as f64 * target_w as f64 / gray.width() as f64).round() as u32).max(1);
    Ok(image::imageops::resize(&gray, target_w, target_h, FilterType::Lanczos3))
}

/// `max(min_width, round(upscale_factor × original width))`.
pub fn target_width(original_width: u32, config: &PreprocessConfig) -> u32 {
    let scaled = (original_width as f32 * config.upscale_factor).round() as u32;
    scaled.max(config.min_width)
}

/// Clockwise rotation, then greyscale. Right angles are lossless; anything
/// else rotates about the centre on a white background.
fn rotate(img: &DynamicImage, degrees: i32) -> GrayImage {
    match degrees.rem_euclid(360) {
        0 => img.to_luma8(),
        90 => img.rotate90().to_luma8(),
        180 => img.rotate180().to_luma8(),
        270 => img.rotate270().to_luma8(),
        other => rotate_about_center(
            &img.to_luma8(),
            (other as f32).to_radians(),
            Interpolation::Bilinear,
            Luma([255u8]),
        ),
    }
}

/// Stretch the `clip_percent`..`100 - clip_percent` luminance percentiles to
/// the full 0–255 range. Flat images are returned unchanged.
fn normalize(gray: &GrayImage, clip_percent: f32) -> GrayImage {
    let mut hist = [0u64; 256];
    for p in gray.pixels() {
        hist[p[0] as usize] += 1;
    }
    let total: u64 = hist.iter().sum();
    let clip = ((total as f64) * (clip_percent.clamp(0.0, 50.0) as f64) / 100.0) as u64;

    let percentile = |target: u64| -> u8 {
        let mut seen = 0u64;
        for (value, count) in hist.iter().enumerate() {
            seen += count;
            if seen > target {
                return value as u8;
            }
        }
        255
    };
    let lo = percentile(clip);
    let hi = percentile(total.saturating_sub(clip + 1));
    if hi <= lo {
        return gray.clone();
    }

    let range = (hi - lo) as f32;
    let mut out = gray.clone();
    for p in out.pixels_mut() {
        let v = (p[0].clamp(lo, hi) - lo) as f32 * 255.0 / range;
        p[0] = v.round() as u8;
    }
    out
}

/// Pixels at or above `threshold` become white, everything else black.
fn binarize(gray: &mut GrayImage, threshold: u8) {
    for p in gray.pixels_mut() {
        p[0] = if p[0] >= threshold { 255 } else { 0 };
    }
}

/// `v × scale + bias`, clamped to 0–255.
fn linear(gray: &mut GrayImage, scale: f32, bias: f32) {
    for p in gray.pixels_mut() {
        p[0] = (p[0] as f32 * scale + bias).round().clamp(0.0, 255.0) as u8;
    }
}
