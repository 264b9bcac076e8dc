use serde::{Deserialize, Serialize};

/// Structured classification returned by the backend's process endpoint.
/// Everything except `industry` is optional; the backend may omit fields
/// and that nullability must be preserved end to end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    pub industry: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_offer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_intention: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_check: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency_level: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_value: Option<f64>,
}
