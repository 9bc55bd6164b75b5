#![forbid(unsafe_code)]
#![warn(
    unreachable_pub,
    unused_must_use,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Client for the threat emulation appliance's file API.
//!
//! Layout:
//! - `models.rs`: feature requests, status labels, verdicts and response views
//! - `appliance.rs`: the `Appliance` trait scan sessions are written against
//! - `client.rs`: the HTTPS implementation on `reqwest`
//! - `error.rs`: appliance error taxonomy

pub mod appliance;
pub mod client;
pub mod error;
pub mod models;

pub use appliance::{Appliance, FileUpload};
pub use client::{ApplianceClient, decode_report};
pub use error::{ApplianceError, ApplianceResult, DecodeSource};
pub use models::{
    ApplianceReply, ApplianceResponse, Feature, FeatureRequest, FeatureResult, RequestEntry,
    StatusLabel, TeOptions, Verdict,
};
