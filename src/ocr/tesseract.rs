use std::path::{Path, PathBuf};

use ::tesseract::{PageSegMode, Tesseract};

use super::tesseract_cli::forced_variables;
use super::hocr::parse_hocr;
use super::{Recognition, Recognizer, SegmentationMode};
use crate::config::RecognitionConfig;
use crate::error::OcrError;

/// In-process libtesseract.
///
/// A fresh `Tesseract` handle is built for every call; handles are not `Sync`.
pub struct TesseractRecognizer {
    pub language: String,
    /// Directory containing `tessdata/`. `None` → system default.
    pub tessdata_dir: Option<PathBuf>,
    pub dpi: u32,
}

impl TesseractRecognizer {
    pub fn from_config(config: &RecognitionConfig) -> Self {
        Self {
            language: config.language.clone(),
            tessdata_dir: config.tessdata_dir.clone(),
            dpi: config.dpi,
        }
    }
}

impl Recognizer for TesseractRecognizer {
    fn name(&self) -> &str {
        "tesseract/library"
    }

    fn recognize(&self, image: &Path, mode: SegmentationMode) -> Result<Recognition, OcrError> {
        let path = image
            .to_str()
            .ok_or_else(|| OcrError::NonUtf8Path(image.to_path_buf()))?;
        let datapath = self
            .tessdata_dir
            .as_ref()
            .map(|d| d.to_string_lossy().into_owned());

        let engine = |e: &dyn std::fmt::Display| OcrError::Engine(e.to_string());

        let mut tess = Tesseract::new(datapath.as_deref(), Some(&self.language))
            .map_err(|e| engine(&e))?;
        for (key, value) in forced_variables() {
            tess = tess.set_variable(key, value).map_err(|e| engine(&e))?;
        }
        tess = tess
            .set_variable("user_defined_dpi", &self.dpi.to_string())
            .map_err(|e| engine(&e))?
            .set_image(path)
            .map_err(|e| engine(&e))?;
        tess.set_page_seg_mode(page_seg_mode(mode));

        let mut tess = tess.recognize().map_err(|e| engine(&e))?;
        let hocr = tess.get_hocr_text(0).map_err(|e| engine(&e))?;

        let rec = parse_hocr(&hocr);
        log::debug!(
            "[OCR] {} psm={} {} → {} words, {} glyphs",
            self.name(),
            mode.psm(),
            image.display(),
            rec.words.len(),
            rec.symbols.len()
        );
        Ok(rec)
    }
}

fn page_seg_mode(mode: SegmentationMode) -> PageSegMode {
    match mode {
        SegmentationMode::UniformBlock => PageSegMode::PsmSingleBlock,
        SegmentationMode::SingleLine => PageSegMode::PsmSingleLine,
        SegmentationMode::SparseText => PageSegMode::PsmSparseText,
        SegmentationMode::RawLine => PageSegMode::PsmRawLine,
        SegmentationMode::SingleColumn => PageSegMode::PsmSingleColumn,
    }
}
