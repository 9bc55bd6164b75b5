//! Scripted fake appliance and reply builders.
//!
//! Replies are queued per operation and handed out in order. Every call is
//! recorded so tests can assert on what a session asked for.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{Value, json};
use tescan_appliance::{
    Appliance, ApplianceError, ApplianceReply, ApplianceResponse, ApplianceResult, Feature,
    FeatureRequest, FeatureResult, FileUpload, StatusLabel, Verdict,
};

/// One recorded call against the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplianceCall {
    /// A query with the features and hash it carried.
    Query {
        /// Requested features.
        features: Vec<Feature>,
        /// Hash the query was keyed by.
        sha1: Option<String>,
    },
    /// An upload of `path` under `wire_name`.
    Upload {
        /// Local file that would have been sent.
        path: PathBuf,
        /// Name presented to the appliance.
        wire_name: String,
    },
    /// A report download.
    Download {
        /// Requested report identifier.
        report_id: String,
    },
}

/// Fake [`Appliance`] replaying queued results.
///
/// An exhausted queue answers with an HTTP 599 status error.
#[derive(Debug, Default)]
pub struct ScriptedAppliance {
    queries: Mutex<VecDeque<ApplianceResult<ApplianceReply>>>,
    uploads: Mutex<VecDeque<ApplianceResult<ApplianceReply>>>,
    downloads: Mutex<VecDeque<ApplianceResult<Vec<u8>>>>,
    calls: Mutex<Vec<ApplianceCall>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn exhausted(operation: &'static str) -> ApplianceError {
    ApplianceError::Status {
        operation,
        status: 599,
        body: "script exhausted".to_string(),
    }
}

impl ScriptedAppliance {
    /// Empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a query reply.
    #[must_use]
    pub fn then_query(self, reply: ApplianceReply) -> Self {
        lock(&self.queries).push_back(Ok(reply));
        self
    }

    /// Queue the same query reply `times` times.
    #[must_use]
    pub fn then_query_repeated(self, reply: &ApplianceReply, times: usize) -> Self {
        {
            let mut queue = lock(&self.queries);
            for _ in 0..times {
                queue.push_back(Ok(reply.clone()));
            }
        }
        self
    }

    /// Queue a failing query.
    #[must_use]
    pub fn then_query_error(self, error: ApplianceError) -> Self {
        lock(&self.queries).push_back(Err(error));
        self
    }

    /// Queue an upload reply.
    #[must_use]
    pub fn then_upload(self, reply: ApplianceReply) -> Self {
        lock(&self.uploads).push_back(Ok(reply));
        self
    }

    /// Queue a failing upload.
    #[must_use]
    pub fn then_upload_error(self, error: ApplianceError) -> Self {
        lock(&self.uploads).push_back(Err(error));
        self
    }

    /// Queue a decoded report.
    #[must_use]
    pub fn then_download(self, bytes: impl Into<Vec<u8>>) -> Self {
        lock(&self.downloads).push_back(Ok(bytes.into()));
        self
    }

    /// Queue a failing download.
    #[must_use]
    pub fn then_download_error(self, error: ApplianceError) -> Self {
        lock(&self.downloads).push_back(Err(error));
        self
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ApplianceCall> {
        lock(&self.calls).clone()
    }

    /// Number of queries made.
    #[must_use]
    pub fn query_count(&self) -> usize {
        self.count(|call| matches!(call, ApplianceCall::Query { .. }))
    }

    /// Number of uploads made.
    #[must_use]
    pub fn upload_count(&self) -> usize {
        self.count(|call| matches!(call, ApplianceCall::Upload { .. }))
    }

    /// Number of downloads made.
    #[must_use]
    pub fn download_count(&self) -> usize {
        self.count(|call| matches!(call, ApplianceCall::Download { .. }))
    }

    /// Wire names used for uploads, in order.
    #[must_use]
    pub fn uploaded_names(&self) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                ApplianceCall::Upload { wire_name, .. } => Some(wire_name.clone()),
                _ => None,
            })
            .collect()
    }

    fn count(&self, predicate: impl Fn(&ApplianceCall) -> bool) -> usize {
        lock(&self.calls).iter().filter(|call| predicate(call)).count()
    }

    fn record(&self, call: ApplianceCall) {
        lock(&self.calls).push(call);
    }
}

#[async_trait]
impl Appliance for ScriptedAppliance {
    async fn query(&self, request: &FeatureRequest) -> ApplianceResult<ApplianceReply> {
        let entry = request.request.first();
        self.record(ApplianceCall::Query {
            features: entry.map(|entry| entry.features.clone()).unwrap_or_default(),
            sha1: entry.and_then(|entry| entry.sha1.clone()),
        });
        lock(&self.queries)
            .pop_front()
            .unwrap_or_else(|| Err(exhausted("query")))
    }

    async fn upload(
        &self,
        _request: &FeatureRequest,
        file: &FileUpload,
    ) -> ApplianceResult<ApplianceReply> {
        self.record(ApplianceCall::Upload {
            path: file.path.clone(),
            wire_name: file.wire_name.clone(),
        });
        lock(&self.uploads)
            .pop_front()
            .unwrap_or_else(|| Err(exhausted("upload")))
    }

    async fn download(&self, report_id: &str) -> ApplianceResult<Vec<u8>> {
        self.record(ApplianceCall::Download {
            report_id: report_id.to_string(),
        });
        lock(&self.downloads)
            .pop_front()
            .unwrap_or_else(|| Err(exhausted("download")))
    }
}

fn feature_json(label: &str, verdict: Option<&str>, images: &[&str], report: Option<&str>) -> Value {
    let mut block = json!({ "status": { "label": label } });
    if let Some(verdict) = verdict {
        block["combined_verdict"] = json!(verdict);
    }
    if !images.is_empty() {
        block["images"] = Value::Array(
            images
                .iter()
                .map(|status| json!({ "status": status }))
                .collect(),
        );
    }
    if let Some(report) = report {
        block["summary_report"] = json!(report);
    }
    block
}

fn feature_view(
    label: &str,
    verdict: Option<&str>,
    images: &[&str],
    report: Option<&str>,
) -> FeatureResult {
    FeatureResult {
        status: StatusLabel::parse(label),
        verdict: Verdict::parse(verdict),
        pending_images: images
            .iter()
            .filter(|status| status.eq_ignore_ascii_case("pending"))
            .count(),
        summary_report: report.map(str::to_string),
    }
}

/// Reply carrying only an overall status.
#[must_use]
pub fn status_reply(label: &str) -> ApplianceReply {
    ApplianceReply {
        raw: json!({ "response": [{ "status": { "label": label } }] }),
        parsed: ApplianceResponse {
            status: StatusLabel::parse(label),
            file_name: None,
            te: None,
            te_eb: None,
        },
    }
}

/// Upload reply echoing the wire name.
#[must_use]
pub fn upload_reply(label: &str, wire_name: &str) -> ApplianceReply {
    let mut reply = status_reply(label);
    reply.raw["response"][0]["file_name"] = json!(wire_name);
    reply.parsed.file_name = Some(wire_name.to_string());
    reply
}

/// Overall `FOUND` with a `te` verdict and optional summary report id.
#[must_use]
pub fn verdict_reply(verdict: &str, summary_report: Option<&str>) -> ApplianceReply {
    ApplianceReply {
        raw: json!({
            "response": [{
                "status": { "label": "FOUND" },
                "te": feature_json("FOUND", Some(verdict), &[], summary_report),
                "te_eb": feature_json("FOUND", Some(verdict), &[], None),
            }]
        }),
        parsed: ApplianceResponse {
            status: StatusLabel::Found,
            file_name: None,
            te: Some(feature_view("FOUND", Some(verdict), &[], summary_report)),
            te_eb: Some(feature_view("FOUND", Some(verdict), &[], None)),
        },
    }
}

/// Overall `PARTIALLY_FOUND` with explicit `te` state and optional `te_eb` verdict.
#[must_use]
pub fn partial_reply(
    te_label: &str,
    te_verdict: Option<&str>,
    te_images: &[&str],
    te_eb_verdict: Option<&str>,
) -> ApplianceReply {
    let te_eb_label = if te_eb_verdict.is_some() { "FOUND" } else { "PENDING" };
    ApplianceReply {
        raw: json!({
            "response": [{
                "status": { "label": "PARTIALLY_FOUND" },
                "te": feature_json(te_label, te_verdict, te_images, None),
                "te_eb": feature_json(te_eb_label, te_eb_verdict, &[], None),
            }]
        }),
        parsed: ApplianceResponse {
            status: StatusLabel::PartiallyFound,
            file_name: None,
            te: Some(feature_view(te_label, te_verdict, te_images, None)),
            te_eb: Some(feature_view(te_eb_label, te_eb_verdict, &[], None)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_agree_with_the_real_parser() -> anyhow::Result<()> {
        for reply in [
            status_reply("PENDING"),
            upload_reply("UPLOAD_SUCCESS", "a%20b"),
            verdict_reply("Malicious", Some("r-1")),
            partial_reply("PARTIALLY_FOUND", None, &["found", "pending"], Some("Malicious")),
        ] {
            assert_eq!(ApplianceReply::from_raw(reply.raw.clone())?, reply);
        }
        Ok(())
    }

    #[tokio::test]
    async fn script_replays_in_order_and_records_calls() -> anyhow::Result<()> {
        let fake = ScriptedAppliance::new()
            .then_query(status_reply("NOT_FOUND"))
            .then_download(b"tgz".to_vec());

        let first = fake.query(&FeatureRequest::cache_query("abc")).await?;
        assert_eq!(first.parsed.status, StatusLabel::NotFound);
        assert!(fake.query(&FeatureRequest::poll_query("abc")).await.is_err());
        assert_eq!(fake.download("r-1").await?, b"tgz");

        assert_eq!(fake.query_count(), 2);
        assert_eq!(fake.download_count(), 1);
        assert_eq!(
            fake.calls()[0],
            ApplianceCall::Query {
                features: vec![Feature::Te],
                sha1: Some("abc".to_string()),
            }
        );
        Ok(())
    }
}
