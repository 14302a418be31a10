//! clearance-router HTTP server and CLI

use clap::Parser;
use clearance_router::{
    classification::ClassificationEngine,
    cli::{Cli, Command, generate_config_template},
    config::Config,
    handlers::{self, AppState},
    telemetry,
};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Config { output }) => {
            let template = generate_config_template();
            match output {
                Some(path) => {
                    std::fs::write(&path, template)?;
                    eprintln!("Configuration template written to {}", path);
                }
                None => print!("{}", template),
            }
            Ok(())
        }
        Some(Command::Classify { text, context }) => {
            let result = ClassificationEngine::new().classify(&text, context.as_deref());
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Some(Command::Serve) | None => serve(&cli.config).await,
    }
}

async fn serve(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::from_file(config_path)?;
    config.apply_overrides(|name| std::env::var(name).ok())?;
    config.validate()?;

    telemetry::init(&config.observability.log_level);

    let addr = config.server.socket_addr()?;
    let probe_interval = config.health.probe_interval_seconds;

    let state = AppState::new(config)?;

    if probe_interval > 0 {
        state
            .health()
            .clone()
            .start_background_probes(Duration::from_secs(probe_interval));
    }

    let app = handlers::app(state);

    tracing::info!("Starting clearance-router on {}", addr);
    tracing::info!("Health check available at http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
