use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use image::DynamicImage;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::model::{MailPackage, MailPackageOcrData};

use super::migration;
use super::CorruptFilePolicy;

const PACKAGES_FILE: &str = "packages.json";
const OCR_DATA_FILE: &str = "ocr_data.json";
const ANONYMOUS_PARTITION: &str = "anonymous";
const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Per-user durable store: one directory per authenticated user holding
/// `packages.json`, `ocr_data.json` and the scanned page files.
///
/// The user partition is a hard multi-tenancy boundary; switching users
/// means constructing a new store, and the lists never merge.
///
/// Read-modify-write of the JSON files is serialized within the process by
/// an internal lock and made crash-safe by a tmp-file + rename replace.
/// Concurrent writers from other processes are not supported.
pub struct LocalStore {
    base_dir: PathBuf,
    user_id: Option<String>,
    jpeg_quality: u8,
    corrupt_policy: CorruptFilePolicy,
    write_lock: Mutex<()>,
}

impl LocalStore {
    pub fn new(base_dir: impl Into<PathBuf>, user_id: Option<&str>) -> Self {
        Self {
            base_dir: base_dir.into(),
            user_id: user_id.map(str::to_string),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            corrupt_policy: CorruptFilePolicy::default(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_corrupt_policy(mut self, policy: CorruptFilePolicy) -> Self {
        self.corrupt_policy = policy;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    /// Directory holding this user's files. Unauthenticated sessions share
    /// the `anonymous` partition.
    pub fn user_dir(&self) -> PathBuf {
        self.base_dir
            .join(self.user_id.as_deref().unwrap_or(ANONYMOUS_PARTITION))
    }

    fn packages_path(&self) -> PathBuf {
        self.user_dir().join(PACKAGES_FILE)
    }

    fn ocr_data_path(&self) -> PathBuf {
        self.user_dir().join(OCR_DATA_FILE)
    }

    // ── Packages ──

    /// Upserts by id into the package collection. A repeated id replaces the
    /// stored record in place; the collection never grows a duplicate.
    pub fn save_package(&self, package: &MailPackage) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap();
        let mut packages = self.read_collection::<MailPackage>(&self.packages_path())?;

        match packages.iter_mut().find(|p| p.id == package.id) {
            Some(existing) => *existing = package.clone(),
            None => packages.push(package.clone()),
        }

        self.write_collection(&self.packages_path(), &packages)?;
        debug!(package_id = %package.id, "saved package");
        Ok(())
    }

    /// Full decode of the package collection. Absent file yields an empty
    /// list. Legacy absolute image paths are rewritten to relative on load
    /// and the rewritten collection is persisted.
    pub fn list_packages(&self) -> Result<Vec<MailPackage>, StorageError> {
        let _guard = self.write_lock.lock().unwrap();
        let mut packages = self.read_collection::<MailPackage>(&self.packages_path())?;

        if migration::relativize_image_paths(&mut packages, &self.user_dir()) {
            debug!("migrated absolute image paths to relative");
            self.write_collection(&self.packages_path(), &packages)?;
        }

        Ok(packages)
    }

    pub fn load_package(&self, package_id: &str) -> Result<Option<MailPackage>, StorageError> {
        Ok(self
            .list_packages()?
            .into_iter()
            .find(|p| p.id == package_id))
    }

    // ── Scan images ──

    /// Encodes an image as JPEG at the configured quality.
    pub fn encode_jpeg(&self, img: &DynamicImage) -> Result<Vec<u8>, StorageError> {
        let mut buf = Vec::new();
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
            std::io::Cursor::new(&mut buf),
            self.jpeg_quality,
        );
        img.write_with_encoder(encoder)
            .map_err(|e| StorageError::EncodeImage(e.to_string()))?;
        Ok(buf)
    }

    /// Writes one already-encoded scan page as `{timestamp}_{seq}.jpg` and
    /// returns the path relative to the user directory. `seq` is 1-based.
    pub fn save_scan(
        &self,
        jpeg: &[u8],
        timestamp: DateTime<Utc>,
        seq: usize,
    ) -> Result<String, StorageError> {
        let filename = scan_filename(timestamp, seq);
        let dir = self.user_dir();
        self.ensure_directory(&dir)?;

        let path = dir.join(&filename);
        std::fs::write(&path, jpeg).map_err(|e| StorageError::WriteFile {
            path: path.clone(),
            source: e,
        })?;

        Ok(filename)
    }

    /// Loads a scanned page. Tolerates both relative paths (current format)
    /// and legacy absolute paths from the pre-migration window. Missing or
    /// undecodable files yield `None`.
    pub fn load_image(&self, path: &str) -> Option<DynamicImage> {
        let candidate = Path::new(path);
        let full = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.user_dir().join(candidate)
        };

        match image::open(&full) {
            Ok(img) => Some(img),
            Err(e) => {
                warn!(path = %full.display(), error = %e, "failed to load scan image");
                None
            }
        }
    }

    // ── OCR bridge ──

    /// Upserts the OCR bridge record for its package id. Kept in a file
    /// separate from the package list: the text is large and transient, and
    /// must not bloat every package-list read.
    pub fn save_ocr_bridge(&self, record: &MailPackageOcrData) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap();
        let mut records = self.read_collection::<MailPackageOcrData>(&self.ocr_data_path())?;

        match records
            .iter_mut()
            .find(|r| r.mail_package_id == record.mail_package_id)
        {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }

        self.write_collection(&self.ocr_data_path(), &records)
    }

    pub fn load_ocr_bridge(
        &self,
        package_id: &str,
    ) -> Result<Option<MailPackageOcrData>, StorageError> {
        let _guard = self.write_lock.lock().unwrap();
        let records = self.read_collection::<MailPackageOcrData>(&self.ocr_data_path())?;
        Ok(records
            .into_iter()
            .find(|r| r.mail_package_id == package_id))
    }

    pub fn delete_ocr_bridge(&self, package_id: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap();
        let mut records = self.read_collection::<MailPackageOcrData>(&self.ocr_data_path())?;
        let before = records.len();
        records.retain(|r| r.mail_package_id != package_id);
        if records.len() != before {
            self.write_collection(&self.ocr_data_path(), &records)?;
        }
        Ok(())
    }

    // ── User data ──

    /// Removes the entire user partition. The only deletion path: the
    /// pipeline itself never hard-deletes a package.
    pub fn clear_user_data(&self) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap();
        let dir = self.user_dir();
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Remove {
                path: dir,
                source: e,
            }),
        }
    }

    // ── Internals ──

    fn read_collection<T: DeserializeOwned>(&self, path: &Path) -> Result<Vec<T>, StorageError> {
        let content = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StorageError::ReadFile {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        match serde_json::from_slice(&content) {
            Ok(items) => Ok(items),
            Err(e) => match self.corrupt_policy {
                CorruptFilePolicy::Ignore => {
                    warn!(path = %path.display(), error = %e, "corrupt store file, treating as empty");
                    Ok(Vec::new())
                }
                CorruptFilePolicy::Fail => Err(StorageError::CorruptFile {
                    path: path.to_path_buf(),
                    source: e,
                }),
            },
        }
    }

    /// Atomic write-replace: serialize to a sibling tmp file, then rename
    /// over the target. A crash mid-write leaves the old file intact.
    fn write_collection<T: Serialize>(&self, path: &Path, items: &[T]) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            self.ensure_directory(parent)?;
        }

        let bytes = serde_json::to_vec_pretty(items).map_err(|e| StorageError::Encode {
            path: path.to_path_buf(),
            source: e,
        })?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &bytes).map_err(|e| StorageError::WriteFile {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, path).map_err(|e| StorageError::Replace {
            from: tmp,
            to: path.to_path_buf(),
            source: e,
        })
    }

    fn ensure_directory(&self, path: &Path) -> Result<(), StorageError> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }
}

/// `{timestamp}_{seq}.jpg`, e.g. `2024-01-01T00:00:00Z_1.jpg`.
pub fn scan_filename(timestamp: DateTime<Utc>, seq: usize) -> String {
    format!(
        "{}_{}.jpg",
        timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        seq
    )
}
