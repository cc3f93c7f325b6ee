pub mod aggregate;
pub mod config;
pub mod digits;
pub mod error;
pub mod lines;
pub mod ocr;
pub mod preprocess;
pub mod processor;
pub mod strategy;
pub mod ticket;

pub use config::{load_config, save_config, EngineKind, ScanConfig};
pub use ocr::{build_recognizer, BoundingBox, CancelFlag, Recognition, Recognizer, SegmentationMode, Token};
pub use processor::{extract_tickets, run_matrix, TicketScanner};
pub use strategy::{ExternalProcessStrategy, ExtractionStrategy, InProcessRecognizerStrategy};
pub use ticket::{Candidate, TicketBox};
