#![forbid(unsafe_code)]
#![warn(
    unreachable_pub,
    unused_must_use,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]

//! Shared test helpers used across integration suites.
//! Layout: fixtures.rs (temporary scan trees), mocks.rs (scripted appliance and reply builders).

pub mod fixtures;
pub mod mocks;
