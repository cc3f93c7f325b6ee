//! Extraction strategies, tried in priority order by `TicketScanner`.
//!
//! A strategy returns an empty list when it has nothing to offer; it never
//! fails outright.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::Instant;

use crate::aggregate::aggregate;
use crate::config::{ExternalConfig, ScanConfig};
use crate::error::ExternalError;
use crate::ocr::Recognizer;
use crate::processor::run_matrix;
use crate::ticket::{Candidate, TicketBox};

#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Candidates for `image`, deduplicated. Must give up by `deadline`.
    async fn extract(&self, image: &Path, deadline: Option<Instant>) -> Vec<Candidate>;
}

// ── External process ─────────────────────────────────────────────────────────

/// Heavier OCR in a separate process, invoked as
/// `program [args...] <absolute image path>`.
///
/// The process must print one JSON object `{ "success": bool, "data": [...] }`
/// on stdout. Spawn failures, timeouts, non-zero exits and any other output
/// shape all count as "unavailable".
pub struct ExternalProcessStrategy {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ExternalResponse {
    success: bool,
    data: Option<Vec<ExternalTicket>>,
}

#[derive(Debug, Deserialize)]
struct ExternalTicket {
    number: Option<String>,
    confidence: Option<f64>,
    #[serde(rename = "box")]
    bbox: Option<TicketBox>,
}

impl ExternalProcessStrategy {
    /// `None` when no program is configured.
    pub fn from_config(config: &ExternalConfig) -> Option<Self> {
        let program = config.program.clone()?;
        Some(Self {
            program,
            args: config.args.clone(),
            timeout: config.timeout(),
        })
    }

    /// Run the process once with at most `budget` wall time.
    pub async fn run(&self, image: &Path, budget: Duration) -> Result<Vec<Candidate>, ExternalError> {
        let abs = absolute(image)?;

        let child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(&abs)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExternalError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = tokio::time::timeout(budget, child.wait_with_output())
            .await
            .map_err(|_| ExternalError::Timeout(budget))?
            .map_err(|source| ExternalError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ExternalError::Exit {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        parse_response(&output.stdout)
    }
}

/// Validate the process's stdout.
///
/// Entries without a six-digit `number` are dropped, confidences clamped,
/// duplicates merged.
pub fn parse_response(stdout: &[u8]) -> Result<Vec<Candidate>, ExternalError> {
    let response: ExternalResponse = serde_json::from_slice(stdout)?;
    let data = match response {
        ExternalResponse {
            success: true,
            data: Some(data),
        } => data,
        _ => return Err(ExternalError::Unsuccessful),
    };
    Ok(aggregate(data.into_iter().filter_map(|t| {
        Candidate::new(t.number?, t.confidence.unwrap_or(0.0), t.bbox)
    })))
}

fn absolute(image: &Path) -> Result<PathBuf, ExternalError> {
    if image.is_absolute() {
        return Ok(image.to_path_buf());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(image))
        .map_err(|source| ExternalError::Path {
            path: image.to_path_buf(),
            source,
        })
}

#[async_trait]
impl ExtractionStrategy for ExternalProcessStrategy {
    fn name(&self) -> &str {
        "external"
    }

    async fn extract(&self, image: &Path, deadline: Option<Instant>) -> Vec<Candidate> {
        let budget = match deadline {
            Some(d) => self.timeout.min(d.saturating_duration_since(Instant::now())),
            None => self.timeout,
        };
        if budget.is_zero() {
            return Vec::new();
        }

        match self.run(image, budget).await {
            Ok(found) => {
                log::info!("[EXTERNAL] {} returned {} candidates", self.program, found.len());
                found
            }
            Err(e) => {
                log::warn!("[EXTERNAL] {} unavailable: {e}", self.program);
                Vec::new()
            }
        }
    }
}

// ── In-process recognizer matrix ─────────────────────────────────────────────

/// Rotated variants × segmentation modes through one `Recognizer`.
pub struct InProcessRecognizerStrategy {
    recognizer: Arc<dyn Recognizer>,
    config: Arc<ScanConfig>,
}

impl InProcessRecognizerStrategy {
    pub fn new(recognizer: Arc<dyn Recognizer>, config: Arc<ScanConfig>) -> Self {
        Self { recognizer, config }
    }
}

#[async_trait]
impl ExtractionStrategy for InProcessRecognizerStrategy {
    fn name(&self) -> &str {
        self.recognizer.name()
    }

    async fn extract(&self, image: &Path, deadline: Option<Instant>) -> Vec<Candidate> {
        run_matrix(image, self.recognizer.clone(), self.config.clone(), deadline).await
    }
}
