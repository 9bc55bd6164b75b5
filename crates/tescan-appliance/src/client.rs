//! HTTP implementation of [`Appliance`] on `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response, Url};
use serde_json::Value;
use tracing::debug;

use crate::appliance::{Appliance, FileUpload};
use crate::error::{ApplianceError, ApplianceResult, DecodeSource};
use crate::models::{ApplianceReply, FeatureRequest};

const STATUS_BODY_LIMIT: usize = 512;

/// Appliance client speaking the file API over HTTPS.
#[derive(Debug, Clone)]
pub struct ApplianceClient {
    http: Client,
    base_url: Url,
}

impl ApplianceClient {
    /// Build a client for `base_url` (ending in `/`) with a per-request timeout.
    ///
    /// Certificate verification is disabled: appliances present self-signed certificates.
    ///
    /// # Errors
    ///
    /// Returns [`ApplianceError::ClientBuild`] if the TLS backend cannot be initialised.
    pub fn new(base_url: Url, timeout: Duration) -> ApplianceResult<Self> {
        let http = Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .build()
            .map_err(|source| ApplianceError::ClientBuild { source })?;
        Ok(Self::with_client(http, base_url))
    }

    /// Wrap an existing HTTP client.
    #[must_use]
    pub const fn with_client(http: Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// Base URL every endpoint is resolved against.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, endpoint: &'static str) -> ApplianceResult<Url> {
        self.base_url
            .join(endpoint)
            .map_err(|source| ApplianceError::Endpoint { endpoint, source })
    }

    async fn read_body(operation: &'static str, response: Response) -> ApplianceResult<Vec<u8>> {
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|source| ApplianceError::Http { operation, source })?;
        debug!(operation, status = status.as_u16(), bytes = bytes.len(), "appliance response received");
        if status.is_success() {
            Ok(bytes.to_vec())
        } else {
            Err(status_error(operation, status.as_u16(), &bytes))
        }
    }

    async fn decode_reply(
        operation: &'static str,
        response: Response,
    ) -> ApplianceResult<ApplianceReply> {
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|source| ApplianceError::Http { operation, source })?;
        debug!(operation, status = status.as_u16(), bytes = bytes.len(), "appliance response received");

        let raw: Value = match serde_json::from_slice(&bytes) {
            Ok(raw) => raw,
            Err(_) if !status.is_success() => {
                return Err(status_error(operation, status.as_u16(), &bytes));
            }
            Err(err) => {
                return Err(ApplianceError::Decode {
                    operation,
                    reason: "invalid_json",
                    source: Some(DecodeSource::Json(err)),
                });
            }
        };

        match ApplianceReply::from_raw(raw) {
            Ok(reply) => Ok(reply),
            Err(_) if !status.is_success() => Err(status_error(operation, status.as_u16(), &bytes)),
            Err(err) => Err(ApplianceError::Decode {
                operation,
                reason: "unexpected_shape",
                source: Some(DecodeSource::Json(err)),
            }),
        }
    }
}

fn status_error(operation: &'static str, status: u16, body: &[u8]) -> ApplianceError {
    ApplianceError::Status {
        operation,
        status,
        body: String::from_utf8_lossy(body)
            .chars()
            .take(STATUS_BODY_LIMIT)
            .collect(),
    }
}

/// Decode a base64 report body, ignoring line breaks and other ASCII whitespace.
///
/// # Errors
///
/// Returns [`ApplianceError::Decode`] when the text is not valid base64.
pub fn decode_report(body: &[u8]) -> ApplianceResult<Vec<u8>> {
    let compact: Vec<u8> = body
        .iter()
        .copied()
        .filter(|byte| !byte.is_ascii_whitespace())
        .collect();
    STANDARD
        .decode(compact)
        .map_err(|err| ApplianceError::Decode {
            operation: "download",
            reason: "invalid_base64",
            source: Some(DecodeSource::Base64(err)),
        })
}

#[async_trait]
impl Appliance for ApplianceClient {
    async fn query(&self, request: &FeatureRequest) -> ApplianceResult<ApplianceReply> {
        let response = self
            .http
            .post(self.endpoint("query")?)
            .json(request)
            .send()
            .await
            .map_err(|source| ApplianceError::Http {
                operation: "query",
                source,
            })?;
        Self::decode_reply("query", response).await
    }

    async fn upload(
        &self,
        request: &FeatureRequest,
        file: &FileUpload,
    ) -> ApplianceResult<ApplianceReply> {
        let descriptor = serde_json::to_string(request).map_err(|err| ApplianceError::Decode {
            operation: "upload",
            reason: "request_encoding",
            source: Some(DecodeSource::Json(err)),
        })?;

        let handle = tokio::fs::File::open(&file.path)
            .await
            .map_err(|source| ApplianceError::Io {
                operation: "upload.open",
                path: file.path.clone(),
                source,
            })?;
        let length = handle
            .metadata()
            .await
            .map_err(|source| ApplianceError::Io {
                operation: "upload.metadata",
                path: file.path.clone(),
                source,
            })?
            .len();

        let part = Part::stream_with_length(Body::from(handle), length)
            .file_name(file.wire_name.clone());
        let form = Form::new().text("request", descriptor).part("file", part);

        let response = self
            .http
            .post(self.endpoint("upload")?)
            .multipart(form)
            .send()
            .await
            .map_err(|source| ApplianceError::Http {
                operation: "upload",
                source,
            })?;
        Self::decode_reply("upload", response).await
    }

    async fn download(&self, report_id: &str) -> ApplianceResult<Vec<u8>> {
        let mut url = self.endpoint("download")?;
        url.query_pairs_mut().append_pair("id", report_id);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| ApplianceError::Http {
                operation: "download",
                source,
            })?;
        let body = Self::read_body("download", response).await?;
        decode_report(&body)
    }
}
