use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use certscope::config::{Cli, Command, ServeArgs};
use certscope::state::AppState;
use certscope::{HttpBackend, cli, routes};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "certscope=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Serve(args) => serve(args).await,
        Command::Inspect(args) => cli::inspect(args).await,
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let allow_origin = args
        .allow_origin
        .as_deref()
        .map(HeaderValue::from_str)
        .transpose()
        .context("invalid --allow-origin")?;

    let state = AppState::new(Arc::new(HttpBackend::new(args.backend.url.clone())));
    let app = routes::router(state, allow_origin);

    let addr = args.addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(backend = %args.backend.url, "certscope listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
