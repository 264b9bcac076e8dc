//! Text extraction seam. The OCR engine itself is a collaborator: callers
//! wire in whatever extractor they have (platform vision framework, a
//! tesseract binding, a remote service) behind this trait.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("Text extraction failed: {0}")]
pub struct OcrError(pub String);

#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extracts text from one encoded image. May fail; the orchestrator
    /// treats a single failure as fatal for the whole capture batch.
    async fn extract_text(&self, image: &[u8]) -> Result<String, OcrError>;
}

/// Extractor that always returns empty text. Useful for wiring the pipeline
/// where OCR is handled elsewhere, and as a test default.
pub struct NoopExtractor;

#[async_trait]
impl TextExtractor for NoopExtractor {
    async fn extract_text(&self, _image: &[u8]) -> Result<String, OcrError> {
        Ok(String::new())
    }
}
