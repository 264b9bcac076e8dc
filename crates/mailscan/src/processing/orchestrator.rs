use std::fmt::Write as _;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use image::DynamicImage;
use tracing::{debug, info_span, warn, Instrument as _};
use uuid::Uuid;

use crate::api::types::{
    DocumentType, ProcessRequest, UpdatePackageRequest, UploadMetadata, UploadRequest,
};
use crate::api::BackendClient;
use crate::error::{ApiError, MailscanError, ProcessingError};
use crate::model::{
    MailPackage, MailPackageOcrData, MailPackageSurvey, ProcessingResult,
};
use crate::ocr::TextExtractor;
use crate::processing::clock::Clock;
use crate::storage::store::scan_filename;
use crate::storage::LocalStore;

/// Combines per-image OCR texts into one document, tagging each section with
/// its 1-based image index. Order is preserved verbatim: the composite goes
/// straight to the classifier and a dropped or reordered section degrades
/// results silently.
pub fn combine_ocr_texts(ocr_texts: &[String]) -> String {
    let mut combined = String::new();
    for (i, text) in ocr_texts.iter().enumerate() {
        let _ = write!(combined, "--- Image {} ---\n{}\n\n", i + 1, text);
    }
    combined
}

/// Drives the per-package pipeline. All collaborators are injected; there is
/// no global state.
pub struct MailProcessor {
    store: Arc<LocalStore>,
    client: Arc<dyn BackendClient>,
    extractor: Arc<dyn TextExtractor>,
    clock: Arc<dyn Clock>,
}

impl MailProcessor {
    pub fn new(
        store: Arc<LocalStore>,
        client: Arc<dyn BackendClient>,
        extractor: Arc<dyn TextExtractor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            client,
            extractor,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Turns a non-empty batch of captured images into a stored package in
    /// the scanning phase. Returns as soon as uploads and OCR are done; AI
    /// classification happens later via the background queue.
    ///
    /// The first image is uploaded without a package id — the response
    /// supplies the newly assigned id, so that upload can never run in
    /// parallel with the rest. Any upload or extraction failure aborts the
    /// whole call; the caller restarts from image 1.
    pub async fn create_package(
        &self,
        images: &[DynamicImage],
        timestamp: DateTime<Utc>,
    ) -> Result<MailPackage, MailscanError> {
        let span = info_span!("create_package", image_count = images.len());
        async {
            if images.is_empty() {
                return Err(ProcessingError::ProcessingFailed(
                    "no images in capture batch".to_string(),
                )
                .into());
            }

            let correlation_id = Uuid::new_v4().to_string();
            debug!(%correlation_id, "creating package");

            let mut package_id: Option<String> = None;
            let mut ocr_texts: Vec<String> = Vec::with_capacity(images.len());
            let mut image_paths: Vec<String> = Vec::with_capacity(images.len());

            for (index, img) in images.iter().enumerate() {
                let seq = index + 1;
                let jpeg = self.store.encode_jpeg(img)?;
                let filename = scan_filename(timestamp, seq);

                let request = UploadRequest {
                    mail_package_id: package_id.clone(),
                    document_type: DocumentType::Scan,
                    image_sequence: Some(seq as u32),
                    file_data: BASE64.encode(&jpeg),
                    mime_type: mime_guess::from_path(&filename)
                        .first_or_octet_stream()
                        .to_string(),
                    filename,
                    metadata: UploadMetadata {
                        captured_at: Some(timestamp),
                        correlation_id: Some(correlation_id.clone()),
                    },
                };

                let response = self
                    .client
                    .upload_scan(&request)
                    .await
                    .map_err(|e| ProcessingError::UploadFailed(e.to_string()))?;
                if !response.success {
                    return Err(ProcessingError::UploadFailed(
                        response
                            .message
                            .unwrap_or_else(|| format!("upload of image {} rejected", seq)),
                    )
                    .into());
                }

                if package_id.is_none() {
                    let assigned = response
                        .scan
                        .map(|s| s.mailpack_id)
                        .ok_or_else(|| {
                            ProcessingError::UploadFailed(
                                "first upload response did not assign a package id".to_string(),
                            )
                        })?;
                    debug!(package_id = %assigned, "backend assigned package id");
                    package_id = Some(assigned);
                }

                // Fail-fast: one failed extraction aborts the whole batch.
                let text = self
                    .extractor
                    .extract_text(&jpeg)
                    .await
                    .map_err(|e| ProcessingError::OcrProcessingFailed {
                        index,
                        reason: e.to_string(),
                    })?;
                ocr_texts.push(text);

                image_paths.push(self.store.save_scan(&jpeg, timestamp, seq)?);
            }

            let package_id = package_id.expect("set after first upload");

            self.store.save_ocr_bridge(&MailPackageOcrData {
                mail_package_id: package_id.clone(),
                ocr_texts,
                timestamp,
            })?;

            let package = MailPackage::new_scanning(package_id, image_paths, timestamp);
            self.store.save_package(&package)?;

            debug!(package_id = %package.id, "package created in scanning phase");
            Ok(package)
        }
        .instrument(span)
        .await
    }

    /// Combines the ordered OCR texts, uploads the composite as an auxiliary
    /// artifact, and asks the backend to classify it. A non-success response
    /// is a `ProcessingFailed`; a transport failure is an `UploadFailed`.
    pub async fn complete_analysis(
        &self,
        package_id: &str,
        ocr_texts: &[String],
        timestamp: DateTime<Utc>,
    ) -> Result<ProcessingResult, MailscanError> {
        let span = info_span!(
            "complete_analysis",
            package_id = %package_id,
            text_count = ocr_texts.len()
        );
        async {
            let combined = combine_ocr_texts(ocr_texts);

            let upload = UploadRequest {
                mail_package_id: Some(package_id.to_string()),
                document_type: DocumentType::OcrText,
                image_sequence: None,
                file_data: BASE64.encode(combined.as_bytes()),
                filename: format!("{}_ocr.txt", package_id),
                mime_type: "text/plain".to_string(),
                metadata: UploadMetadata {
                    captured_at: Some(timestamp),
                    correlation_id: None,
                },
            };
            let upload_response = self
                .client
                .upload_scan(&upload)
                .await
                .map_err(|e| ProcessingError::UploadFailed(e.to_string()))?;
            if !upload_response.success {
                return Err(ProcessingError::UploadFailed(
                    upload_response
                        .message
                        .unwrap_or_else(|| "combined OCR text upload rejected".to_string()),
                )
                .into());
            }

            let request = ProcessRequest {
                input_text: combined,
                processing_notes: format!("Combined OCR text from {} images", ocr_texts.len()),
            };
            let response = self
                .client
                .process_package(package_id, &request)
                .await
                .map_err(|e| match e {
                    ApiError::Status { status, body, .. } => ProcessingError::ProcessingFailed(
                        format!("classification returned {}: {}", status, body),
                    ),
                    other => ProcessingError::UploadFailed(other.to_string()),
                })?;

            if !response.success {
                return Err(ProcessingError::ProcessingFailed(
                    "classification reported failure".to_string(),
                )
                .into());
            }
            response
                .processing_result
                .ok_or_else(|| {
                    ProcessingError::ProcessingFailed(
                        "classification succeeded without a result".to_string(),
                    )
                    .into()
                })
        }
        .instrument(span)
        .await
    }

    /// Sends survey answers plus classification echoes to the backend and
    /// marks the stored package complete and approved.
    pub async fn apply_survey(
        &self,
        package_id: &str,
        survey: &MailPackageSurvey,
    ) -> Result<MailPackage, MailscanError> {
        let span = info_span!("apply_survey", package_id = %package_id);
        async {
            let request = UpdatePackageRequest {
                brand_name: survey.brand_name.clone(),
                industry: survey.industry.clone(),
                company_validated: Some(survey.brand_name_answer == "yes"),
                response_intention: Some(survey.intention_answer.clone()),
                name_check: Some(survey.recipient_answer.clone()),
                notes: None,
                status: "completed".to_string(),
                is_approved: true,
                processing_notes: Some("survey completed".to_string()),
            };

            let response = self
                .client
                .update_package(package_id, &request)
                .await
                .map_err(|e| ProcessingError::UpdateFailed(e.to_string()))?;
            if !response.success {
                return Err(ProcessingError::UpdateFailed(
                    "package update rejected by backend".to_string(),
                )
                .into());
            }

            let mut package = self
                .store
                .load_package(package_id)?
                .ok_or_else(|| {
                    ProcessingError::UpdateFailed(format!(
                        "package '{}' not found locally",
                        package_id
                    ))
                })?;

            // Prefer classification fields the backend echoed back, if any.
            if let Some(remote) = response.mail_package {
                if remote.industry.is_some() {
                    package.industry = remote.industry;
                }
                if remote.brand_name.is_some() {
                    package.brand_name = remote.brand_name;
                }
                if remote.points_awarded.is_some() {
                    package.points_awarded = remote.points_awarded;
                }
            } else {
                warn!("update response carried no package body");
            }

            package.apply_survey(survey, self.clock.now());
            self.store.save_package(&package)?;

            Ok(package)
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::{
        ProcessResponse, ScanInfo, UpdatePackageResponse, UploadResponse,
    };
    use crate::model::{AsyncProcessingState, ProcessingStatus};
    use crate::ocr::OcrError;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    struct FixedClock(DateTime<Utc>);
    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    /// Backend fake: records requests, assigns "pkg-1", classification and
    /// update behavior are programmable.
    struct FakeBackend {
        uploads: Mutex<Vec<UploadRequest>>,
        process_requests: Mutex<Vec<(String, ProcessRequest)>>,
        update_requests: Mutex<Vec<(String, UpdatePackageRequest)>>,
        fail_upload_at: Option<usize>,
        process_succeeds: bool,
        update_succeeds: bool,
    }

    impl FakeBackend {
        fn new() -> Self {
            Self {
                uploads: Mutex::new(Vec::new()),
                process_requests: Mutex::new(Vec::new()),
                update_requests: Mutex::new(Vec::new()),
                fail_upload_at: None,
                process_succeeds: true,
                update_succeeds: true,
            }
        }
    }

    #[async_trait]
    impl BackendClient for FakeBackend {
        async fn upload_scan(&self, request: &UploadRequest) -> Result<UploadResponse, ApiError> {
            let mut uploads = self.uploads.lock().unwrap();
            if self.fail_upload_at == Some(uploads.len()) {
                return Ok(UploadResponse {
                    success: false,
                    message: Some("rejected".to_string()),
                    upload_type: None,
                    scan: None,
                });
            }
            let assign_id = request.mail_package_id.is_none();
            uploads.push(request.clone());
            Ok(UploadResponse {
                success: true,
                message: None,
                upload_type: Some("scan".to_string()),
                scan: assign_id.then(|| ScanInfo {
                    mailpack_id: "pkg-1".to_string(),
                }),
            })
        }

        async fn process_package(
            &self,
            package_id: &str,
            request: &ProcessRequest,
        ) -> Result<ProcessResponse, ApiError> {
            self.process_requests
                .lock()
                .unwrap()
                .push((package_id.to_string(), request.clone()));
            Ok(ProcessResponse {
                success: self.process_succeeds,
                processing_result: self.process_succeeds.then(|| ProcessingResult {
                    industry: "Retail".to_string(),
                    brand_name: Some("Acme".to_string()),
                    primary_offer: None,
                    response_intention: None,
                    name_check: None,
                    urgency_level: None,
                    estimated_value: None,
                }),
            })
        }

        async fn update_package(
            &self,
            package_id: &str,
            request: &UpdatePackageRequest,
        ) -> Result<UpdatePackageResponse, ApiError> {
            self.update_requests
                .lock()
                .unwrap()
                .push((package_id.to_string(), request.clone()));
            Ok(UpdatePackageResponse {
                success: self.update_succeeds,
                mail_package: None,
            })
        }
    }

    /// Extractor fake returning TEXT_A, TEXT_B, ... per call, or failing.
    struct FakeExtractor {
        calls: Mutex<usize>,
        fail: bool,
    }

    impl FakeExtractor {
        fn new() -> Self {
            Self {
                calls: Mutex::new(0),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl TextExtractor for FakeExtractor {
        async fn extract_text(&self, _image: &[u8]) -> Result<String, OcrError> {
            if self.fail {
                return Err(OcrError("vision unavailable".to_string()));
            }
            let mut calls = self.calls.lock().unwrap();
            let label = (b'A' + *calls as u8) as char;
            *calls += 1;
            Ok(format!("TEXT_{}", label))
        }
    }

    struct Fixture {
        _tmp: TempDir,
        backend: Arc<FakeBackend>,
        processor: MailProcessor,
    }

    fn fixture_with(backend: FakeBackend, extractor: FakeExtractor) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::new(tmp.path(), Some("user-1")));
        let backend = Arc::new(backend);
        let processor = MailProcessor::new(
            store,
            backend.clone(),
            Arc::new(extractor),
            Arc::new(FixedClock(ts())),
        );
        Fixture {
            _tmp: tmp,
            backend,
            processor,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(FakeBackend::new(), FakeExtractor::new())
    }

    fn images(n: usize) -> Vec<DynamicImage> {
        (0..n).map(|_| DynamicImage::new_rgb8(4, 4)).collect()
    }

    #[test]
    fn test_combine_ocr_texts_literal_format() {
        let combined =
            combine_ocr_texts(&["TEXT_A".to_string(), "TEXT_B".to_string()]);
        assert_eq!(
            combined,
            "--- Image 1 ---\nTEXT_A\n\n--- Image 2 ---\nTEXT_B\n\n"
        );
    }

    #[test]
    fn test_combine_ocr_texts_empty() {
        assert_eq!(combine_ocr_texts(&[]), "");
    }

    #[tokio::test]
    async fn test_create_package_empty_batch_rejected() {
        let f = fixture();
        let err = f.processor.create_package(&[], ts()).await.unwrap_err();
        assert!(matches!(
            err,
            MailscanError::Processing(ProcessingError::ProcessingFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_create_package_first_upload_discovers_id() {
        let f = fixture();
        let package = f.processor.create_package(&images(2), ts()).await.unwrap();

        assert_eq!(package.id, "pkg-1");
        assert_eq!(package.async_processing_state, AsyncProcessingState::Scanning);
        assert_eq!(package.processing_status, ProcessingStatus::Processing);
        assert_eq!(
            package.image_paths,
            vec!["2024-01-01T00:00:00Z_1.jpg", "2024-01-01T00:00:00Z_2.jpg"]
        );

        let uploads = f.backend.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 2);
        assert!(uploads[0].mail_package_id.is_none());
        assert_eq!(uploads[0].image_sequence, Some(1));
        assert_eq!(uploads[1].mail_package_id.as_deref(), Some("pkg-1"));
        assert_eq!(uploads[1].image_sequence, Some(2));
        assert_eq!(uploads[1].mime_type, "image/jpeg");
    }

    #[tokio::test]
    async fn test_create_package_writes_ocr_bridge_in_order() {
        let f = fixture();
        f.processor.create_package(&images(2), ts()).await.unwrap();

        let bridge = f
            .processor
            .store()
            .load_ocr_bridge("pkg-1")
            .unwrap()
            .unwrap();
        assert_eq!(bridge.ocr_texts, vec!["TEXT_A", "TEXT_B"]);
        assert_eq!(bridge.timestamp, ts());
    }

    #[tokio::test]
    async fn test_create_package_persists_package_record() {
        let f = fixture();
        f.processor.create_package(&images(1), ts()).await.unwrap();

        let stored = f.processor.store().load_package("pkg-1").unwrap().unwrap();
        assert_eq!(stored.status, "scanning");
        assert_eq!(stored.created_at, ts());
    }

    #[tokio::test]
    async fn test_create_package_ocr_failure_aborts_batch() {
        let mut extractor = FakeExtractor::new();
        extractor.fail = true;
        let f = fixture_with(FakeBackend::new(), extractor);

        let err = f
            .processor
            .create_package(&images(2), ts())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MailscanError::Processing(ProcessingError::OcrProcessingFailed { index: 0, .. })
        ));
        // No package record was left behind.
        assert!(f.processor.store().load_package("pkg-1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_package_upload_rejection_aborts_batch() {
        let mut backend = FakeBackend::new();
        backend.fail_upload_at = Some(1);
        let f = fixture_with(backend, FakeExtractor::new());

        let err = f
            .processor
            .create_package(&images(3), ts())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MailscanError::Processing(ProcessingError::UploadFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_complete_analysis_uploads_text_then_classifies() {
        let f = fixture();
        let result = f
            .processor
            .complete_analysis(
                "pkg-1",
                &["TEXT_A".to_string(), "TEXT_B".to_string()],
                ts(),
            )
            .await
            .unwrap();

        assert_eq!(result.industry, "Retail");
        assert_eq!(result.brand_name.as_deref(), Some("Acme"));

        let uploads = f.backend.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].document_type, DocumentType::OcrText);
        assert!(uploads[0].image_sequence.is_none());

        let process = f.backend.process_requests.lock().unwrap();
        assert_eq!(process[0].0, "pkg-1");
        assert_eq!(
            process[0].1.input_text,
            "--- Image 1 ---\nTEXT_A\n\n--- Image 2 ---\nTEXT_B\n\n"
        );
    }

    #[tokio::test]
    async fn test_complete_analysis_backend_failure_is_processing_failed() {
        let mut backend = FakeBackend::new();
        backend.process_succeeds = false;
        let f = fixture_with(backend, FakeExtractor::new());

        let err = f
            .processor
            .complete_analysis("pkg-1", &["t".to_string()], ts())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MailscanError::Processing(ProcessingError::ProcessingFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_apply_survey_completes_package() {
        let f = fixture();
        f.processor.create_package(&images(1), ts()).await.unwrap();

        let survey = MailPackageSurvey {
            mail_package_id: "pkg-1".to_string(),
            recipient_answer: "me".to_string(),
            brand_name_answer: "yes".to_string(),
            intention_answer: "no".to_string(),
            industry: Some("Retail".to_string()),
            primary_offer: None,
            brand_name: Some("Acme".to_string()),
        };
        let updated = f.processor.apply_survey("pkg-1", &survey).await.unwrap();

        assert_eq!(updated.processing_status, ProcessingStatus::Completed);
        assert!(updated.is_approved);
        assert_eq!(updated.survey_completed_at, Some(ts()));

        let stored = f.processor.store().load_package("pkg-1").unwrap().unwrap();
        assert_eq!(stored.processing_status, ProcessingStatus::Completed);

        let updates = f.backend.update_requests.lock().unwrap();
        assert_eq!(updates[0].0, "pkg-1");
        assert_eq!(updates[0].1.status, "completed");
        assert!(updates[0].1.is_approved);
        assert_eq!(updates[0].1.company_validated, Some(true));
    }

    #[tokio::test]
    async fn test_apply_survey_backend_rejection_is_update_failed() {
        let mut backend = FakeBackend::new();
        backend.update_succeeds = false;
        let f = fixture_with(backend, FakeExtractor::new());
        f.processor.create_package(&images(1), ts()).await.unwrap();

        let survey = MailPackageSurvey {
            mail_package_id: "pkg-1".to_string(),
            recipient_answer: "me".to_string(),
            brand_name_answer: "no".to_string(),
            intention_answer: "no".to_string(),
            industry: None,
            primary_offer: None,
            brand_name: None,
        };
        let err = f.processor.apply_survey("pkg-1", &survey).await.unwrap_err();
        assert!(matches!(
            err,
            MailscanError::Processing(ProcessingError::UpdateFailed(_))
        ));

        // Local record untouched.
        let stored = f.processor.store().load_package("pkg-1").unwrap().unwrap();
        assert_eq!(stored.processing_status, ProcessingStatus::Processing);
    }
}
