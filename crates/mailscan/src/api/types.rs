use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{MailPackage, ProcessingResult};

/// What kind of artifact an upload carries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Scan,
    OcrText,
}

/// Typed upload metadata. The backend accepts arbitrary keys here; the
/// client only ever sends these two.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
    /// Client-generated id correlating all uploads of one capture batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

/// Body of `POST /mail-scan-upload`.
///
/// When `mail_package_id` is `None` the backend assigns a fresh id and
/// returns it in `UploadResponse::scan` — the only way the client learns it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail_package_id: Option<String>,
    pub document_type: DocumentType,
    /// 1-based position of this image within the capture batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_sequence: Option<u32>,
    /// Base64-encoded file contents.
    pub file_data: String,
    pub filename: String,
    pub mime_type: String,
    pub metadata: UploadMetadata,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScanInfo {
    pub mailpack_id: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub upload_type: Option<String>,
    #[serde(default)]
    pub scan: Option<ScanInfo>,
}

/// Body of `POST /mail-package/{id}/process`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    pub input_text: String,
    pub processing_notes: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    pub success: bool,
    #[serde(default)]
    pub processing_result: Option<ProcessingResult>,
}

/// Body of `PUT /mail-package/{id}`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePackageRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_validated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_intention: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_check: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub status: String,
    pub is_approved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePackageResponse {
    pub success: bool,
    #[serde(default)]
    pub mail_package: Option<MailPackage>,
}
