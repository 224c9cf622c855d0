use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use voicelink::{create_router, AppState, CapabilitySet, Config, SessionConfig, TelemetrySink};

#[derive(Parser, Debug)]
#[command(name = "voicelink", about = "Real-time voice session service")]
struct Args {
    /// Path to the configuration file (without extension)
    #[arg(short, long, default_value = "config/voicelink")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Voice service endpoint: {}", cfg.transport.endpoint);

    let capabilities = CapabilitySet::detect();

    let telemetry = match &cfg.telemetry.nats_url {
        Some(url) => match TelemetrySink::connect(url).await {
            Ok(sink) => Some(Arc::new(sink)),
            Err(e) => {
                warn!("Telemetry disabled: {}", e);
                None
            }
        },
        None => None,
    };

    let defaults = SessionConfig::from_config(&cfg);
    let state = AppState::new(defaults, capabilities, telemetry);
    let router = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    info!("HTTP server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
