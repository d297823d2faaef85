#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Ward heat priority API server.
//!
//! ```text
//! heat_priority_server [--bind 0.0.0.0] [--port 8080] [--ward-archive wards.zip] [--scheme id]
//! ```
//!
//! Everything else is configured through environment variables; see
//! [`heat_priority_server::ServerConfig`] and the Earth Engine and AI
//! provider settings.

use clap::Parser;
use heat_priority_server::{Args, ServerConfig, run_server};

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let config = ServerConfig::from_env().with_args(Args::parse());
    run_server(config).await?;

    Ok(())
}
