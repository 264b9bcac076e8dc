use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::analysis::ProcessingResult;
use super::survey::MailPackageSurvey;

/// Authoritative completion flag for a package.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Processing,
    Completed,
}

/// Orchestration phase: `Scanning` while capture/analysis is in flight,
/// `ReadyForSurvey` once classification has been merged in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AsyncProcessingState {
    Scanning,
    ReadyForSurvey,
}

/// The central entity: one batch of scanned mail pages and everything the
/// pipeline learns about it.
///
/// Invariant: `image_paths` order is capture order is OCR-text order. The
/// text recorded at index `i` of the OCR bridge describes the page at
/// `image_paths[i]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MailPackage {
    /// Opaque id assigned by the backend on the first image upload.
    pub id: String,

    // Classification fields, null until analysis completes. The backend may
    // still omit any of them afterwards.
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub brand_name: Option<String>,
    #[serde(default)]
    pub primary_offer: Option<String>,
    #[serde(default)]
    pub company_validated: Option<bool>,
    #[serde(default)]
    pub response_intention: Option<String>,
    #[serde(default)]
    pub name_check: Option<String>,

    /// Free-text workflow label; the backend treats this as opaque.
    pub status: String,
    pub processing_status: ProcessingStatus,
    pub async_processing_state: AsyncProcessingState,
    pub is_approved: bool,
    #[serde(default)]
    pub points_awarded: Option<i64>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub processing_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub processing_completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub survey_completed_at: Option<DateTime<Utc>>,

    /// One relative file reference per scanned page, in capture order.
    pub image_paths: Vec<String>,
    #[serde(default)]
    pub s3_key: Option<String>,
}

impl MailPackage {
    /// A freshly created package in the scanning phase, before any
    /// classification has run.
    pub fn new_scanning(
        id: impl Into<String>,
        image_paths: Vec<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            industry: None,
            brand_name: None,
            primary_offer: None,
            company_validated: None,
            response_intention: None,
            name_check: None,
            status: "scanning".to_string(),
            processing_status: ProcessingStatus::Processing,
            async_processing_state: AsyncProcessingState::Scanning,
            is_approved: false,
            points_awarded: None,
            created_at,
            updated_at: created_at,
            processing_started_at: Some(created_at),
            processing_completed_at: None,
            survey_completed_at: None,
            image_paths,
            s3_key: None,
        }
    }

    /// Merges a classification result into the record, preserving everything
    /// the backend did not return (timestamps, image paths, points) and
    /// moving the package into the ready-for-survey phase.
    pub fn apply_analysis(&mut self, result: &ProcessingResult, now: DateTime<Utc>) {
        self.industry = Some(result.industry.clone());
        if result.brand_name.is_some() {
            self.brand_name = result.brand_name.clone();
        }
        if result.primary_offer.is_some() {
            self.primary_offer = result.primary_offer.clone();
        }
        if result.response_intention.is_some() {
            self.response_intention = result.response_intention.clone();
        }
        if result.name_check.is_some() {
            self.name_check = result.name_check.clone();
        }
        self.async_processing_state = AsyncProcessingState::ReadyForSurvey;
        self.status = "readyForSurvey".to_string();
        self.processing_completed_at = Some(now);
        self.updated_at = now;
    }

    /// Folds user survey answers into the record and marks it complete.
    pub fn apply_survey(&mut self, survey: &MailPackageSurvey, now: DateTime<Utc>) {
        if survey.industry.is_some() {
            self.industry = survey.industry.clone();
        }
        if survey.brand_name.is_some() {
            self.brand_name = survey.brand_name.clone();
        }
        if survey.primary_offer.is_some() {
            self.primary_offer = survey.primary_offer.clone();
        }
        self.name_check = Some(survey.recipient_answer.clone());
        self.response_intention = Some(survey.intention_answer.clone());
        self.company_validated = Some(survey.brand_name_answer == "yes");
        self.processing_status = ProcessingStatus::Completed;
        self.status = "completed".to_string();
        self.is_approved = true;
        self.survey_completed_at = Some(now);
        self.updated_at = now;
    }
}
