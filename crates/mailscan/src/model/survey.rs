use serde::{Deserialize, Serialize};

/// User-supplied annotation collected after analysis. Created transiently,
/// submitted once; its effect is folded into the owning `MailPackage` and
/// the survey itself is never persisted standalone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MailPackageSurvey {
    pub mail_package_id: String,
    pub recipient_answer: String,
    pub brand_name_answer: String,
    pub intention_answer: String,

    // Classification echoes carried for the package-update call.
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub primary_offer: Option<String>,
    #[serde(default)]
    pub brand_name: Option<String>,
}
