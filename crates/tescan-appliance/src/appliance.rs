//! The seam between a scan session and the appliance.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::ApplianceResult;
use crate::models::{ApplianceReply, FeatureRequest};

/// A file to be uploaded, with the name the appliance should see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    /// Local file whose bytes are sent.
    pub path: PathBuf,
    /// Wire-safe file name for the multipart part.
    pub wire_name: String,
}

/// Operations the scanner needs from a threat emulation appliance.
#[async_trait]
pub trait Appliance: Send + Sync {
    /// `POST query` with a feature request keyed by hash.
    async fn query(&self, request: &FeatureRequest) -> ApplianceResult<ApplianceReply>;

    /// `POST upload` with the feature request and the file bytes.
    async fn upload(
        &self,
        request: &FeatureRequest,
        file: &FileUpload,
    ) -> ApplianceResult<ApplianceReply>;

    /// `GET download?id=<report_id>`, returning the decoded report archive.
    async fn download(&self, report_id: &str) -> ApplianceResult<Vec<u8>>;
}
