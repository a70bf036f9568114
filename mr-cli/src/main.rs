mod cli;

use std::sync::Arc;

use cli::Cli;
use mr_config::FileConfigProvider;
use mr_server::{build_app, AppState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse_args();

    let provider = FileConfigProvider::load(&cli.config)?;
    let state = AppState::new(Arc::new(provider));
    let app = build_app(state);

    mr_server::serve(cli.bind, app).await
}
