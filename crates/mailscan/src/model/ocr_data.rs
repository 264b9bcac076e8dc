use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transient bridge between capture and background analysis.
///
/// Written immediately after all images for a package are OCR'd, read once
/// when the background queue dequeues the package, deleted after a
/// successful analysis. If the process dies in between, the record persists
/// and the analysis is replayable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MailPackageOcrData {
    pub mail_package_id: String,
    /// One extracted text per image, in capture order. Index `i` corresponds
    /// to `MailPackage::image_paths[i]`.
    pub ocr_texts: Vec<String>,
    pub timestamp: DateTime<Utc>,
}
