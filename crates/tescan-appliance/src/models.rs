//! Request and response shapes for the appliance file API.
//!
//! # Design
//! - Requests are built fresh per call from one template, so no request state is
//!   shared between concurrent sessions.
//! - Responses keep the raw JSON for artifacts next to a typed view used for decisions.
//!   The typed view is lenient: unknown fields are ignored and unknown labels survive
//!   as `Other`.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inspection capability requested from the appliance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Feature {
    /// Full threat emulation; authoritative for placement.
    #[serde(rename = "te")]
    Te,
    /// Early-bird emulation; may surface a provisional verdict sooner.
    #[serde(rename = "te_eb")]
    TeEb,
}

/// Options for the `te` feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeOptions {
    /// Report kinds to generate.
    pub reports: Vec<String>,
    /// Ask for engine version details.
    pub version_info: bool,
    /// Ask for error details in responses.
    pub return_errors: bool,
}

impl Default for TeOptions {
    fn default() -> Self {
        Self {
            reports: vec!["summary".to_string()],
            version_info: true,
            return_errors: true,
        }
    }
}

/// One entry of a feature request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestEntry {
    /// Features to run or query.
    pub features: Vec<Feature>,
    /// Options for the `te` feature.
    pub te: TeOptions,
    /// Content hash identifying the file, omitted on upload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
}

/// Body of query and upload requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureRequest {
    /// Request entries; the scanner always sends exactly one.
    pub request: Vec<RequestEntry>,
}

impl FeatureRequest {
    /// `te` and `te_eb` with summary reports, no hash.
    #[must_use]
    pub fn template() -> Self {
        Self {
            request: vec![RequestEntry {
                features: vec![Feature::Te, Feature::TeEb],
                te: TeOptions::default(),
                sha1: None,
            }],
        }
    }

    /// Cache lookup: `te` only, keyed by hash.
    #[must_use]
    pub fn cache_query(sha1: &str) -> Self {
        let mut request = Self::template();
        for entry in &mut request.request {
            entry.features.retain(|feature| *feature != Feature::TeEb);
            entry.sha1 = Some(sha1.to_string());
        }
        request
    }

    /// Status poll: both features, keyed by hash.
    #[must_use]
    pub fn poll_query(sha1: &str) -> Self {
        let mut request = Self::template();
        for entry in &mut request.request {
            entry.sha1 = Some(sha1.to_string());
        }
        request
    }

    /// Upload descriptor: both features, no hash.
    #[must_use]
    pub fn upload() -> Self {
        Self::template()
    }
}

/// Status label reported overall or per feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusLabel {
    /// Results are available.
    Found,
    /// No results exist for the hash.
    NotFound,
    /// Processing has not finished.
    Pending,
    /// Some features have results.
    PartiallyFound,
    /// Upload accepted; results not yet available.
    UploadSuccess,
    /// Any other label, preserved verbatim.
    Other(String),
}

impl StatusLabel {
    /// Parse a wire label, ignoring case.
    #[must_use]
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "FOUND" => Self::Found,
            "NOT_FOUND" => Self::NotFound,
            "PENDING" => Self::Pending,
            "PARTIALLY_FOUND" => Self::PartiallyFound,
            "UPLOAD_SUCCESS" => Self::UploadSuccess,
            _ => Self::Other(label.to_string()),
        }
    }

    /// Wire spelling of the label.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Found => "FOUND",
            Self::NotFound => "NOT_FOUND",
            Self::Pending => "PENDING",
            Self::PartiallyFound => "PARTIALLY_FOUND",
            Self::UploadSuccess => "UPLOAD_SUCCESS",
            Self::Other(label) => label,
        }
    }

    /// Whether polling should continue on this overall status.
    #[must_use]
    pub const fn is_in_progress(&self) -> bool {
        matches!(self, Self::Pending | Self::PartiallyFound)
    }
}

impl Display for StatusLabel {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Appliance classification of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// No threat found.
    Benign,
    /// Threat found.
    Malicious,
    /// The appliance could not analyse the file.
    Error,
    /// Missing or unrecognised verdict.
    Unknown,
}

impl Verdict {
    /// Parse a `combined_verdict` value, ignoring case.
    #[must_use]
    pub fn parse(label: Option<&str>) -> Self {
        match label.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
            Some("benign") => Self::Benign,
            Some("malicious") => Self::Malicious,
            Some("error") => Self::Error,
            _ => Self::Unknown,
        }
    }

    /// Display label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Benign => "Benign",
            Self::Malicious => "Malicious",
            Self::Error => "Error",
            Self::Unknown => "Unknown",
        }
    }
}

impl Display for Verdict {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Typed view of one feature block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureResult {
    /// Feature status.
    pub status: StatusLabel,
    /// Parsed combined verdict.
    pub verdict: Verdict,
    /// Number of emulation images still pending.
    pub pending_images: usize,
    /// Identifier of the summary report, when one was produced.
    pub summary_report: Option<String>,
}

/// Typed view of a query or upload response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplianceResponse {
    /// Overall status.
    pub status: StatusLabel,
    /// Echoed wire file name, present on upload responses.
    pub file_name: Option<String>,
    /// `te` block, when present.
    pub te: Option<FeatureResult>,
    /// `te_eb` block, when present.
    pub te_eb: Option<FeatureResult>,
}

impl ApplianceResponse {
    /// Build the typed view from a decoded body.
    ///
    /// # Errors
    ///
    /// Returns the serde error when the body lacks the `response[0].status.label` shape.
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        let envelope = Envelope::deserialize(value)?;
        let entry = envelope
            .response
            .into_iter()
            .next()
            .ok_or_else(|| <serde_json::Error as serde::de::Error>::custom("empty response array"))?;
        Ok(Self {
            status: StatusLabel::parse(&entry.status.label),
            file_name: entry.file_name,
            te: entry.te.map(FeatureBlock::into_result),
            te_eb: entry.te_eb.map(FeatureBlock::into_result),
        })
    }

    /// Block for `feature`, when present.
    #[must_use]
    pub const fn feature(&self, feature: Feature) -> Option<&FeatureResult> {
        match feature {
            Feature::Te => self.te.as_ref(),
            Feature::TeEb => self.te_eb.as_ref(),
        }
    }
}

/// A decoded appliance reply: raw JSON for artifacts plus the typed view.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplianceReply {
    /// Body exactly as received.
    pub raw: Value,
    /// Typed view of `raw`.
    pub parsed: ApplianceResponse,
}

impl ApplianceReply {
    /// Decode a reply from its JSON body.
    ///
    /// # Errors
    ///
    /// Returns the serde error when the body does not have the expected shape.
    pub fn from_raw(raw: Value) -> Result<Self, serde_json::Error> {
        let parsed = ApplianceResponse::from_value(&raw)?;
        Ok(Self { raw, parsed })
    }
}

#[derive(Deserialize)]
struct Envelope {
    response: Vec<ResponseEntry>,
}

#[derive(Deserialize)]
struct ResponseEntry {
    status: StatusBlock,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    te: Option<FeatureBlock>,
    #[serde(default)]
    te_eb: Option<FeatureBlock>,
}

#[derive(Deserialize)]
struct StatusBlock {
    label: String,
}

#[derive(Deserialize)]
struct FeatureBlock {
    status: StatusBlock,
    #[serde(default)]
    combined_verdict: Option<String>,
    #[serde(default)]
    images: Vec<ImageBlock>,
    #[serde(default)]
    summary_report: Option<String>,
}

#[derive(Deserialize)]
struct ImageBlock {
    #[serde(default)]
    status: Option<String>,
}

impl FeatureBlock {
    fn into_result(self) -> FeatureResult {
        let pending_images = self
            .images
            .iter()
            .filter(|image| {
                image
                    .status
                    .as_deref()
                    .is_some_and(|status| status.eq_ignore_ascii_case("pending"))
            })
            .count();
        FeatureResult {
            status: StatusLabel::parse(&self.status.label),
            verdict: Verdict::parse(self.combined_verdict.as_deref()),
            pending_images,
            summary_report: self.summary_report.filter(|id| !id.is_empty()),
        }
    }
}
