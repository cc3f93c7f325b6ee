use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::ocr::SegmentationMode;

/// Top-level scan configuration.
///
/// Numeric defaults are tuned for phone photos of one ticket format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ScanConfig {
    pub preprocess: PreprocessConfig,
    pub recognition: RecognitionConfig,
    pub extraction: ExtractionConfig,
    pub external: ExternalConfig,
    /// Overall budget for one scan. Absent → no deadline.
    pub deadline_ms: Option<u64>,
}

/// Image variant generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Clockwise rotations in degrees, one variant each, tried in this order.
    pub rotations: Vec<i32>,
    /// Pixels at or above this luminance become white, the rest black.
    pub binarize_threshold: u8,
    pub contrast_scale: f32,
    pub contrast_bias: f32,
    pub median_radius: u32,
    /// Output width is `max(min_width, round(upscale_factor × original width))`.
    pub min_width: u32,
    pub upscale_factor: f32,
    /// Percentile (0–50) clipped at each end during contrast normalisation.
    pub normalize_clip_percent: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            rotations: vec![0, 90, -90, 180],
            binarize_threshold: 165,
            contrast_scale: 1.25,
            contrast_bias: -10.0,
            median_radius: 1,
            min_width: 800,
            upscale_factor: 1.8,
            normalize_clip_percent: 1.0,
        }
    }
}

/// Which Tesseract binding runs the recognition matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Spawn the `tesseract` executable per call.
    #[default]
    Cli,
    /// Link libtesseract in-process (requires the `tesseract` feature).
    Library,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub engine: EngineKind,
    pub language: String,
    /// Executable used by the CLI engine.
    pub tesseract_bin: String,
    /// Parent directory of `tessdata/` (library engine) or the tessdata
    /// directory itself (CLI engine). Absent → system default.
    pub tessdata_dir: Option<PathBuf>,
    /// Tried per variant in this order.
    pub segmentation_modes: Vec<SegmentationMode>,
    pub dpi: u32,
    /// Upper bound on concurrent recognizer calls. 0 → number of cores (max 8).
    /// Larger values are capped at `MAX_WORKERS`.
    pub workers: usize,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::default(),
            language: "eng".to_string(),
            tesseract_bin: "tesseract".to_string(),
            tessdata_dir: None,
            segmentation_modes: SegmentationMode::DEFAULT_ORDER.to_vec(),
            dpi: 300,
            workers: 0,
        }
    }
}

/// Hard ceiling on concurrent recognizer calls, whatever the config says.
pub const MAX_WORKERS: usize = 64;

impl RecognitionConfig {
    /// Always within `1..=MAX_WORKERS`.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers.min(MAX_WORKERS);
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .clamp(1, 8)
    }
}

/// Line grouping and gap-clustering thresholds, in pixels of the
/// preprocessed image.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Max distance between a token's vertical midpoint and its line's mean.
    pub line_threshold_px: f64,
    pub gap_multiplier: f64,
    pub gap_bias_px: f64,
    /// Used in place of a zero median gap (touching glyphs).
    pub fallback_median_gap_px: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            line_threshold_px: 12.0,
            gap_multiplier: 2.2,
            gap_bias_px: 6.0,
            fallback_median_gap_px: 10.0,
        }
    }
}

/// The heavier out-of-process OCR tried before the recognition matrix.
///
/// Invoked as `program [args...] <absolute image path>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalConfig {
    /// Absent → fast path disabled.
    pub program: Option<String>,
    pub args: Vec<String>,
    pub timeout_ms: u64,
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            timeout_ms: 60_000,
        }
    }
}

impl ExternalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl ScanConfig {
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }

    /// Apply `TICKETSCAN_*` environment overrides on top of file values.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Same as `apply_env_overrides` with an injectable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(program) = get("TICKETSCAN_EXTERNAL_PROGRAM") {
            self.external.program = Some(program);
        }
        if let Some(script) = get("TICKETSCAN_EXTERNAL_SCRIPT") {
            self.external.args = vec![script];
        }
        if let Some(bin) = get("TICKETSCAN_TESSERACT_BIN") {
            self.recognition.tesseract_bin = bin;
        }
        if let Some(dir) = get("TICKETSCAN_TESSDATA") {
            self.recognition.tessdata_dir = Some(PathBuf::from(dir));
        }
        if let Some(ms) = get("TICKETSCAN_DEADLINE_MS") {
            let parsed = ms.trim().parse::<u64>().map_err(|_| ConfigError::InvalidOverride {
                key: "TICKETSCAN_DEADLINE_MS".to_string(),
                value: ms.clone(),
            })?;
            self.deadline_ms = Some(parsed);
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<ScanConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn save_config(path: &Path, config: &ScanConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let text = serde_json::to_string_pretty(config)?;
    fs::write(path, text).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}
