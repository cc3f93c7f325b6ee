use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;

use super::hocr::parse_hocr;
use super::{CancelFlag, Recognition, Recognizer, SegmentationMode, DIGIT_WHITELIST};
use crate::config::RecognitionConfig;
use crate::error::OcrError;

/// How often a running `tesseract` child is checked for exit or cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Runs the `tesseract` executable once per call and reads its hOCR report,
/// with per-glyph boxes, from stdout.
///
/// Nothing is shared between calls, so any number of workers may use one
/// instance concurrently.
pub struct TesseractCliRecognizer {
    pub program: String,
    pub language: String,
    pub tessdata_dir: Option<PathBuf>,
    pub dpi: u32,
}

impl TesseractCliRecognizer {
    pub fn from_config(config: &RecognitionConfig) -> Self {
        Self {
            program: config.tesseract_bin.clone(),
            language: config.language.clone(),
            tessdata_dir: config.tessdata_dir.clone(),
            dpi: config.dpi,
        }
    }

    /// Full argument list for one call, image first.
    pub fn args(&self, image: &Path, mode: SegmentationMode) -> Vec<String> {
        let mut args = vec![
            image.to_string_lossy().into_owned(),
            "stdout".to_string(),
            "-l".to_string(),
            self.language.clone(),
            "--psm".to_string(),
            mode.psm().to_string(),
            "--dpi".to_string(),
            self.dpi.to_string(),
        ];
        if let Some(dir) = &self.tessdata_dir {
            args.push("--tessdata-dir".to_string());
            args.push(dir.to_string_lossy().into_owned());
        }
        for (key, value) in forced_variables() {
            args.push("-c".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push("hocr".to_string());
        args
    }

    fn spawn_error(&self, source: std::io::Error) -> OcrError {
        OcrError::Spawn {
            program: self.program.clone(),
            source,
        }
    }

    /// Spawn, then poll until the child exits. A tripped `cancel` kills it.
    fn run(
        &self,
        image: &Path,
        mode: SegmentationMode,
        cancel: Option<&CancelFlag>,
    ) -> Result<Recognition, OcrError> {
        let mut child = Command::new(&self.program)
            .args(self.args(image, mode))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        // drained on their own threads so a full pipe never stalls the child
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = loop {
            if let Some(status) = child.try_wait().map_err(|e| self.spawn_error(e))? {
                break status;
            }
            if cancel.is_some_and(CancelFlag::is_cancelled) {
                let _ = child.kill();
                let _ = child.wait();
                log::debug!("[OCR] {} psm={} {} killed", self.name(), mode.psm(), image.display());
                return Err(OcrError::Cancelled);
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();
        if !status.success() {
            return Err(OcrError::Exit {
                program: self.program.clone(),
                code: status.code(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }

        let rec = parse_hocr(&String::from_utf8_lossy(&stdout));
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

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

/// Variables forced on every call regardless of segmentation mode.
pub(crate) fn forced_variables() -> [(&'static str, &'static str); 4] {
    [
        ("tessedit_char_whitelist", DIGIT_WHITELIST),
        ("classify_bln_numeric_mode", "1"),
        ("preserve_interword_spaces", "1"),
        ("hocr_char_boxes", "1"),
    ]
}

impl Recognizer for TesseractCliRecognizer {
    fn name(&self) -> &str {
        "tesseract/cli"
    }

    fn recognize(&self, image: &Path, mode: SegmentationMode) -> Result<Recognition, OcrError> {
        self.run(image, mode, None)
    }

    fn recognize_cancellable(
        &self,
        image: &Path,
        mode: SegmentationMode,
        cancel: &CancelFlag,
    ) -> Result<Recognition, OcrError> {
        if cancel.is_cancelled() {
            return Err(OcrError::Cancelled);
        }
        self.run(image, mode, Some(cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn recognizer() -> TesseractCliRecognizer {
        TesseractCliRecognizer::from_config(&RecognitionConfig::default())
    }

    /// `sh <image> stdout ...` runs the "image" as a script, standing in for
    /// the engine.
    fn scripted(dir: &tempfile::TempDir, body: &str) -> (TesseractCliRecognizer, PathBuf) {
        let script = dir.path().join("pre_0.png");
        std::fs::write(&script, body).unwrap();
        let mut r = recognizer();
        r.program = "sh".to_string();
        (r, script)
    }

    #[test]
    fn args_force_digit_configuration() {
        let args = recognizer().args(Path::new("/tmp/pre_0.png"), SegmentationMode::SparseText);
        assert_eq!(args[0], "/tmp/pre_0.png");
        assert_eq!(args[1], "stdout");
        let joined = args.join(" ");
        assert!(joined.contains("--psm 11"));
        assert!(joined.contains("--dpi 300"));
        assert!(joined.contains("-c tessedit_char_whitelist=0123456789"));
        assert!(joined.contains("-c classify_bln_numeric_mode=1"));
        assert!(joined.contains("-c preserve_interword_spaces=1"));
        assert!(joined.contains("-c hocr_char_boxes=1"));
        assert_eq!(args.last().map(String::as_str), Some("hocr"));
        assert!(!joined.contains("--tessdata-dir"));
    }

    #[test]
    fn args_include_tessdata_when_configured() {
        let mut r = recognizer();
        r.tessdata_dir = Some(PathBuf::from("/opt/tessdata"));
        let args = r.args(Path::new("a.png"), SegmentationMode::UniformBlock);
        let pos = args.iter().position(|a| a == "--tessdata-dir").unwrap();
        assert_eq!(args[pos + 1], "/opt/tessdata");
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let mut r = recognizer();
        r.program = "/nonexistent/tesseract-binary".to_string();
        let err = r
            .recognize(Path::new("a.png"), SegmentationMode::SingleLine)
            .unwrap_err();
        assert!(matches!(err, OcrError::Spawn { .. }));
    }

    #[test]
    fn reads_glyph_boxes_from_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let (r, image) = scripted(
            &dir,
            "cat <<'EOF'\n\
             <span class='ocrx_word' title='bbox 10 20 50 40; x_wconf 90'>\
             <span class='ocrx_cinfo' title='x_bboxes 10 20 28 40; x_conf 95'>4</span>\
             <span class='ocrx_cinfo' title='x_bboxes 32 20 50 40; x_conf 85'>2</span>\
             </span>\n\
             EOF\n",
        );
        let rec = r.recognize(&image, SegmentationMode::SingleLine).unwrap();
        assert_eq!(rec.words.len(), 1);
        assert_eq!(rec.words[0].text, "42");
        assert_eq!(rec.symbols.len(), 2);
        assert_eq!(rec.symbols[1].bbox.x0, 32.0);
    }

    #[test]
    fn failing_engine_is_an_exit_error() {
        let dir = tempfile::tempdir().unwrap();
        let (r, image) = scripted(&dir, "echo 'Error opening data file' >&2\nexit 1\n");
        let err = r.recognize(&image, SegmentationMode::SingleLine).unwrap_err();
        match err {
            OcrError::Exit { code, stderr, .. } => {
                assert_eq!(code, Some(1));
                assert!(stderr.contains("Error opening data file"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn cancel_kills_running_engine() {
        let dir = tempfile::tempdir().unwrap();
        let (r, image) = scripted(&dir, "exec sleep 10\n");
        let cancel = CancelFlag::default();
        let trip = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            trip.cancel();
        });

        let started = Instant::now();
        let err = r
            .recognize_cancellable(&image, SegmentationMode::SingleLine, &cancel)
            .unwrap_err();
        assert!(matches!(err, OcrError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn already_cancelled_never_spawns() {
        let mut r = recognizer();
        r.program = "/nonexistent/tesseract-binary".to_string();
        let cancel = CancelFlag::default();
        cancel.cancel();
        let err = r
            .recognize_cancellable(Path::new("a.png"), SegmentationMode::SingleLine, &cancel)
            .unwrap_err();
        assert!(matches!(err, OcrError::Cancelled));
    }
}
