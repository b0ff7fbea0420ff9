//! Binary entrypoint for the triage API server.
use triage_api::run;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // Default listen address can be overridden with TRIAGE_ADDR
    let addr = std::env::var("TRIAGE_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    run(&addr).await
}
