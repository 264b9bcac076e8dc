//! mailscan: the mail-package processing engine.
//!
//! Turns a batch of scanned mail pages into an uploaded, OCR'd,
//! AI-classified, survey-annotated package record. Three moving parts:
//!
//! - [`MailProcessor`] drives the per-package pipeline (upload, extract,
//!   classify, survey);
//! - [`BackgroundQueue`] drains AI classification serially in the
//!   background, resumable across restarts via the durable OCR bridge;
//! - [`LocalStore`] owns all on-disk state, partitioned per user.
//!
//! The view layer, authentication, the OCR engine and the backend's
//! classifier are all collaborators wired in from outside.

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod ocr;
pub mod processing;
pub mod queue;
pub mod storage;

pub use api::{BackendClient, HttpBackendClient};
pub use config::{load_config, Config};
pub use error::{
    ApiError, ConfigError, MailscanError, ProcessingError, QueueError, Result, StorageError,
};
pub use model::{
    AsyncProcessingState, MailPackage, MailPackageOcrData, MailPackageSurvey, ProcessingResult,
    ProcessingStatus,
};
pub use ocr::{NoopExtractor, OcrError, TextExtractor};
pub use processing::{combine_ocr_texts, Clock, MailProcessor, SystemClock};
pub use queue::{BackgroundQueue, PackageStatus, StatusEvent};
pub use storage::{CorruptFilePolicy, LocalStore};
