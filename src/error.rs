//! Error types for the scan pipeline.
//!
//! None of these cross the `TicketScanner::scan` boundary: every stage has a
//! recovery path (original-image fallback, skipped job, fall-through) and the
//! scanner always returns a possibly empty candidate list.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Loading or saving a `ScanConfig`.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse error in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("serialise error: {0}")]
    Serialise(#[from] serde_json::Error),

    #[error("invalid value for {key}: {value:?}")]
    InvalidOverride { key: String, value: String },
}

/// One rotated variant could not be produced.
#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("image has zero width or height")]
    EmptyImage,

    #[error("no workspace available")]
    NoWorkspace,
}

/// One recognizer call (variant × segmentation mode) failed.
#[derive(Error, Debug)]
pub enum OcrError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} exited with {code:?}: {stderr}")]
    Exit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("engine error: {0}")]
    Engine(String),

    #[error("image path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),

    #[error("cancelled")]
    Cancelled,
}

/// The external fast-path process was unavailable.
#[derive(Error, Debug)]
pub enum ExternalError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("exited with {code:?}: {stderr}")]
    Exit { code: Option<i32>, stderr: String },

    #[error("malformed output: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("process reported success = false")]
    Unsuccessful,

    #[error("cannot resolve absolute path for {path}: {source}")]
    Path {
        path: PathBuf,
        source: std::io::Error,
    },
}
