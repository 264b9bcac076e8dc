//! Shared data model: the mail package record, the transient OCR bridge and
//! the survey annotation. All types serialize as camelCase JSON, which is
//! both the on-disk store format and the backend wire format.

pub mod analysis;
pub mod ocr_data;
pub mod package;
pub mod survey;

pub use analysis::ProcessingResult;
pub use ocr_data::MailPackageOcrData;
pub use package::{AsyncProcessingState, MailPackage, ProcessingStatus};
pub use survey::MailPackageSurvey;
