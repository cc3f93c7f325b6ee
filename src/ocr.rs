#[cfg(feature = "tesseract")]
pub mod tesseract;
pub mod hocr;
pub mod tesseract_cli;

use std::path::Path;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde::{Deserialize, Serialize};

use crate::config::{EngineKind, RecognitionConfig};
use crate::error::OcrError;

/// Only digits are ever of interest on a ticket.
pub const DIGIT_WHITELIST: &str = "0123456789";

// ── Public types ─────────────────────────────────────────────────────────────

/// Axis-aligned box in pixels of the image the recognizer saw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BoundingBox {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn mid_y(&self) -> f64 {
        (self.y0 + self.y1) / 2.0
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Smallest box covering every box in `boxes`; `None` when empty.
    pub fn union_all<'a, I>(boxes: I) -> Option<BoundingBox>
    where
        I: IntoIterator<Item = &'a BoundingBox>,
    {
        boxes.into_iter().fold(None, |acc, b| match acc {
            None => Some(*b),
            Some(u) => Some(u.union(b)),
        })
    }
}

/// A recognized word or character.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Token {
    pub text: String,
    pub bbox: BoundingBox,
    /// 0.0 – 100.0
    pub confidence: f64,
}

impl Token {
    /// Build a token, clamping confidence into 0–100. Non-finite → 0.
    pub fn new(text: impl Into<String>, bbox: BoundingBox, confidence: f64) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 100.0)
        } else {
            0.0
        };
        Self {
            text: text.into(),
            bbox,
            confidence,
        }
    }

    pub fn digits(&self) -> String {
        self.text.chars().filter(|c| c.is_ascii_digit()).collect()
    }
}

/// Output of one recognizer call.
///
/// `symbols` holds character-level tokens when the backend reports them;
/// empty otherwise.
#[derive(Debug, Clone, Default)]
pub struct Recognition {
    pub words: Vec<Token>,
    pub symbols: Vec<Token>,
}

impl Recognition {
    pub fn is_empty(&self) -> bool {
        self.words.is_empty() && self.symbols.is_empty()
    }
}

/// Tesseract page segmentation modes used for tickets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationMode {
    /// PSM 6: a single uniform block of text.
    UniformBlock,
    /// PSM 7: a single text line.
    SingleLine,
    /// PSM 11: as much text as possible, in no particular order.
    SparseText,
    /// PSM 13: a single line, bypassing Tesseract's layout hacks.
    RawLine,
    /// PSM 4: a single column of text of variable sizes.
    SingleColumn,
}

impl SegmentationMode {
    pub const DEFAULT_ORDER: [SegmentationMode; 5] = [
        SegmentationMode::UniformBlock,
        SegmentationMode::SingleLine,
        SegmentationMode::SparseText,
        SegmentationMode::RawLine,
        SegmentationMode::SingleColumn,
    ];

    /// Numeric value of Tesseract's `--psm` / `tessedit_pageseg_mode`.
    pub fn psm(self) -> u8 {
        match self {
            SegmentationMode::UniformBlock => 6,
            SegmentationMode::SingleLine => 7,
            SegmentationMode::SparseText => 11,
            SegmentationMode::RawLine => 13,
            SegmentationMode::SingleColumn => 4,
        }
    }
}

/// Every OCR backend implements this.
///
/// Implementations must be callable from several worker threads at once;
/// engines that are not thread-safe should be instantiated per call.
pub trait Recognizer: Send + Sync {
    fn name(&self) -> &str;
    fn recognize(&self, image: &Path, mode: SegmentationMode) -> Result<Recognition, OcrError>;

    /// Like `recognize`, but gives up with `OcrError::Cancelled` once `cancel`
    /// trips. Backends that cannot be interrupted just run to completion.
    fn recognize_cancellable(
        &self,
        image: &Path,
        mode: SegmentationMode,
        cancel: &CancelFlag,
    ) -> Result<Recognition, OcrError> {
        if cancel.is_cancelled() {
            return Err(OcrError::Cancelled);
        }
        self.recognize(image, mode)
    }
}

/// Shared cancellation flag for one scan's recognition jobs.
#[derive(Clone, Default)]
pub struct CancelFlag(pub Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Pick the backend named by the config.
///
/// The library engine falls back to the CLI engine when the crate was built
/// without the `tesseract` feature.
pub fn build_recognizer(config: &RecognitionConfig) -> Arc<dyn Recognizer> {
    match config.engine {
        EngineKind::Cli => Arc::new(tesseract_cli::TesseractCliRecognizer::from_config(config)),
        EngineKind::Library => library_recognizer(config),
    }
}

#[cfg(feature = "tesseract")]
fn library_recognizer(config: &RecognitionConfig) -> Arc<dyn Recognizer> {
    Arc::new(tesseract::TesseractRecognizer::from_config(config))
}

#[cfg(not(feature = "tesseract"))]
fn library_recognizer(config: &RecognitionConfig) -> Arc<dyn Recognizer> {
    log::warn!("[OCR] built without the `tesseract` feature, using the CLI engine");
    Arc::new(tesseract_cli::TesseractCliRecognizer::from_config(config))
}
