//! Backend client: typed DTOs for the three consumed endpoints and a
//! `BackendClient` trait so the orchestrator can be wired with a fake in
//! tests.

pub mod client;
pub mod types;

pub use client::{BackendClient, HttpBackendClient};
pub use types::{
    DocumentType, ProcessRequest, ProcessResponse, ScanInfo, UpdatePackageRequest,
    UpdatePackageResponse, UploadMetadata, UploadRequest, UploadResponse,
};
