use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::storage::CorruptFilePolicy;

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_jpeg_quality() -> u8 {
    80
}

/// Engine configuration. The backend base URL is deliberately externalized
/// here rather than baked in as a constant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub backend_base_url: String,

    /// Root under which per-user partitions live. Defaults to the platform
    /// data directory when absent.
    #[serde(default)]
    pub data_directory: Option<PathBuf>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// JPEG quality (1-100) for persisted scan pages.
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// What to do with a present-but-malformed store file.
    #[serde(default)]
    pub on_corrupt_store: CorruptFilePolicy,
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Resolved data root: explicit setting, or the platform data dir.
    pub fn data_dir(&self) -> PathBuf {
        self.data_directory.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("mailscan")
        })
    }
}
