#![forbid(unsafe_code)]
#![warn(
    unused_must_use,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]

//! Binary entrypoint: scan the configured input tree and sort files by verdict.

use std::process::ExitCode;

use tescan_app::run_app;

/// Runs one scan and maps failures to exit codes.
#[tokio::main]
async fn main() -> ExitCode {
    match run_app().await {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err.exit_code();
            eprintln!("error: {:#}", anyhow::Error::new(err));
            ExitCode::from(code)
        }
    }
}
