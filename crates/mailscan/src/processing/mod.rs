//! Mail processing orchestrator: turns a batch of captured images into an
//! uploaded, OCR'd, AI-classified package and later folds in survey answers.

pub mod clock;
pub mod orchestrator;

pub use clock::{Clock, SystemClock};
pub use orchestrator::{combine_ocr_texts, MailProcessor};
