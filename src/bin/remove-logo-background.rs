//! Removes the background from the Peterson Pro Services logo
//!
//! Reads `public/peterson-pro-services-logo.png` and writes
//! `public/peterson-pro-services-logo-transparent.png` with an alpha channel.

use logo_bgremove::cli;
use std::process::ExitCode;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    cli::main().await
}
