//! Tapline Tail
//!
//! Opens one streaming session against the configured backend and prints
//! every update as it arrives. Useful for checking a backend's event stream
//! by hand.
//!
//! # Usage
//!
//! ```bash
//! # Staged research
//! tapline-tail research /api/agent/research/stream '{"query":"Fed minutes"}'
//!
//! # Simple analysis
//! tapline-tail analysis /api/news/analyze/123 '{}'
//!
//! # With verbose logging
//! RUST_LOG=tapline_core=debug tapline-tail research ...
//! ```
//!
//! # Environment Variables
//!
//! - `TAPLINE_BASE_URL`: Backend address (default: `http://localhost:8888`)
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)
//!
//! # Signals
//!
//! - SIGINT: Cancels the session and exits after its final update

use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::info;

use tapline_core::{
    load_config, telemetry, ChannelHandler, HttpTransport, ProtocolVariant, SessionUpdate,
    StreamRequest, StreamSession,
};

const USAGE: &str = "usage: tapline-tail <analysis|research> <path> <json-body>";

fn parse_variant(arg: &str) -> anyhow::Result<ProtocolVariant> {
    match arg {
        "analysis" => Ok(ProtocolVariant::SimpleAnalysis),
        "research" => Ok(ProtocolVariant::StagedResearch),
        other => bail!("unknown stream kind `{other}`\n{USAGE}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    telemetry::init_tracing("tapline_core=info")?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [kind, path, body] = args.as_slice() else {
        bail!(USAGE);
    };

    let variant = parse_variant(kind)?;
    let body: serde_json::Value =
        serde_json::from_str(body).context("request body is not valid JSON")?;

    let config = load_config().context("failed to load configuration")?;
    info!(
        base_url = %config.base_url,
        source = %config.source(),
        "Configuration loaded"
    );

    let transport = HttpTransport::from_config(&config)?;
    let (handler, mut updates) = ChannelHandler::new();
    let handle = StreamSession::open(
        Arc::new(transport),
        StreamRequest::new(path.as_str(), body),
        variant,
        handler,
        config.session_options(variant),
    );
    info!(session_id = %handle.id(), "Session opened");

    let canceller = handle.canceller();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, cancelling");
            canceller.cancel();
        }
    });

    while let Some(update) = updates.recv().await {
        match &update {
            SessionUpdate::Event(event) => println!("{}", serde_json::to_string(event)?),
            SessionUpdate::Unknown { kind, payload } => println!("unknown {kind}: {payload}"),
            SessionUpdate::Completed => println!("-- completed"),
            SessionUpdate::Failed(error) => eprintln!("-- failed: {error}"),
            SessionUpdate::Cancelled => println!("-- cancelled"),
        }
        if update.is_final() {
            break;
        }
    }

    let outcome = handle.wait().await?;
    info!(
        events = outcome.stats.events_dispatched,
        bytes = outcome.stats.bytes_received,
        elapsed_ms = u64::try_from(outcome.stats.elapsed.as_millis()).unwrap_or(u64::MAX),
        "Session finished"
    );

    if matches!(outcome.terminal, tapline_core::Terminal::Errored(_)) {
        std::process::exit(1);
    }
    Ok(())
}
