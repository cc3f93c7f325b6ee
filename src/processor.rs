use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::aggregate::aggregate;
use crate::config::{ExtractionConfig, ScanConfig};
use crate::digits::extract_candidates;
use crate::error::OcrError;
use crate::ocr::{build_recognizer, CancelFlag, Recognizer, SegmentationMode};
use crate::preprocess::{prepare_variants, Variant, Workspace};
use crate::strategy::{ExternalProcessStrategy, ExtractionStrategy, InProcessRecognizerStrategy};
use crate::ticket::Candidate;

// ── Scanner ──────────────────────────────────────────────────────────────────

/// Entry point: tries each strategy in order and returns the first non-empty
/// result.
///
/// Never fails. An empty list means no ticket number was detected.
pub struct TicketScanner {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
    deadline: Option<Duration>,
}

impl TicketScanner {
    /// External fast path first (when configured), then the recognizer
    /// matrix with the configured engine.
    pub fn from_config(config: ScanConfig) -> Self {
        let config = Arc::new(config);
        let mut strategies: Vec<Box<dyn ExtractionStrategy>> = Vec::new();
        if let Some(external) = ExternalProcessStrategy::from_config(&config.external) {
            strategies.push(Box::new(external));
        }
        strategies.push(Box::new(InProcessRecognizerStrategy::new(
            build_recognizer(&config.recognition),
            config.clone(),
        )));
        Self {
            strategies,
            deadline: config.deadline(),
        }
    }

    pub fn with_strategies(strategies: Vec<Box<dyn ExtractionStrategy>>, deadline: Option<Duration>) -> Self {
        Self {
            strategies,
            deadline,
        }
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Scan with the configured deadline, counted from now.
    pub async fn scan(&self, image: &Path) -> Vec<Candidate> {
        let deadline = self.deadline.map(|d| Instant::now() + d);
        self.scan_until(image, deadline).await
    }

    /// Scan with a caller-supplied deadline. Whatever was aggregated by then
    /// is returned.
    pub async fn scan_until(&self, image: &Path, deadline: Option<Instant>) -> Vec<Candidate> {
        let started = Instant::now();
        for strategy in &self.strategies {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                log::warn!("[SCAN] deadline reached before {}", strategy.name());
                break;
            }
            let found = aggregate(strategy.extract(image, deadline).await);
            if !found.is_empty() {
                log::info!(
                    "[SCAN] {} → {} candidates in {}ms via {}",
                    image.display(),
                    found.len(),
                    started.elapsed().as_millis(),
                    strategy.name()
                );
                return found;
            }
            log::debug!("[SCAN] {} found nothing", strategy.name());
        }
        log::info!(
            "[SCAN] {} → no ticket number in {}ms",
            image.display(),
            started.elapsed().as_millis()
        );
        Vec::new()
    }
}

/// One-shot convenience wrapper around `TicketScanner`.
pub async fn extract_tickets(image: &Path, config: ScanConfig) -> Vec<Candidate> {
    TicketScanner::from_config(config).scan(image).await
}

// ── Recognition matrix ───────────────────────────────────────────────────────

/// Preprocess `image`, run every (variant, mode) pair through `recognizer` on
/// a bounded pool, and aggregate.
///
/// The workspace lives until the last blocking job holding it finishes, so
/// files never disappear under a running engine. On deadline, queued jobs
/// are cancelled and the candidates gathered so far are returned.
pub async fn run_matrix(
    image: &Path,
    recognizer: Arc<dyn Recognizer>,
    config: Arc<ScanConfig>,
    deadline: Option<Instant>,
) -> Vec<Candidate> {
    let workspace = match Workspace::create() {
        Ok(ws) => Some(Arc::new(ws)),
        Err(e) => {
            log::warn!("[PREPROCESS] cannot create workspace: {e}");
            None
        }
    };

    let variants = {
        let source = image.to_path_buf();
        let ws = workspace.clone();
        let cfg = config.clone();
        let task =
            tokio::task::spawn_blocking(move || prepare_variants(&source, ws.as_deref(), &cfg.preprocess));
        match until(deadline, task).await {
            Some(Ok(variants)) => variants,
            Some(Err(e)) => {
                log::warn!("[PREPROCESS] variant task failed: {e}, using the original");
                config
                    .preprocess
                    .rotations
                    .iter()
                    .map(|&rotation_degrees| Variant {
                        image_path: image.to_path_buf(),
                        rotation_degrees,
                    })
                    .collect()
            }
            None => {
                log::warn!("[SCAN] deadline reached while preprocessing");
                return Vec::new();
            }
        }
    };

    let cancel = CancelFlag::default();
    let permits = Arc::new(Semaphore::new(config.recognition.effective_workers()));
    let mut jobs: JoinSet<(usize, Vec<Candidate>)> = JoinSet::new();

    let pairs = variants
        .iter()
        .flat_map(|v| config.recognition.segmentation_modes.iter().map(move |&m| (v.clone(), m)));
    for (index, (variant, mode)) in pairs.enumerate() {
        let recognizer = recognizer.clone();
        let config = config.clone();
        let cancel = cancel.clone();
        let permits = permits.clone();
        let workspace = workspace.clone();

        jobs.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return (index, Vec::new());
            };
            let found = tokio::task::spawn_blocking(move || {
                let _workspace = workspace;
                recognize_job(recognizer.as_ref(), &variant, mode, &config.extraction, &cancel)
            })
            .await
            .unwrap_or_else(|e| {
                log::warn!("[OCR] recognition job panicked: {e}");
                Vec::new()
            });
            (index, found)
        });
    }

    let mut found: Vec<(usize, Vec<Candidate>)> = Vec::new();
    loop {
        match until(deadline, jobs.join_next()).await {
            Some(Some(Ok(result))) => found.push(result),
            Some(Some(Err(e))) => log::warn!("[SCAN] recognition job lost: {e}"),
            Some(None) => break,
            None => {
                cancel.cancel();
                log::warn!(
                    "[SCAN] deadline reached, abandoning {} recognition jobs",
                    jobs.len()
                );
                jobs.abort_all();
                break;
            }
        }
    }

    // matrix order, not completion order, decides first-seen ties
    found.sort_by_key(|(index, _)| *index);
    aggregate(found.into_iter().flat_map(|(_, c)| c))
}

/// One recognizer call plus both extraction passes. Failures are logged and
/// yield nothing.
fn recognize_job(
    recognizer: &dyn Recognizer,
    variant: &Variant,
    mode: SegmentationMode,
    config: &ExtractionConfig,
    cancel: &CancelFlag,
) -> Vec<Candidate> {
    match recognizer.recognize_cancellable(&variant.image_path, mode, cancel) {
        Ok(rec) if rec.is_empty() => Vec::new(),
        Ok(rec) => {
            let found = extract_candidates(&rec, config);
            log::debug!(
                "[OCR] {} {}° psm={}: {} words, {} candidates",
                recognizer.name(),
                variant.rotation_degrees,
                mode.psm(),
                rec.words.len(),
                found.len()
            );
            found
        }
        Err(OcrError::Cancelled) => Vec::new(),
        Err(e) => {
            log::warn!(
                "[OCR] {} {}° psm={} failed: {e}",
                recognizer.name(),
                variant.rotation_degrees,
                mode.psm()
            );
            Vec::new()
        }
    }
}

/// `fut`'s output, or `None` if `deadline` passes first.
async fn until<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(d) => tokio::time::timeout_at(d, fut).await.ok(),
        None => Some(fut.await),
    }
}
