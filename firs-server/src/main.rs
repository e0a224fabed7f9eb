use anyhow::Context;
use clap::Parser;
use firs_core::InvoicePipeline;
use firs_server::{AppState, ChromePdfRenderer, ServerArgs, app};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = ServerArgs::parse();
    let pipeline = InvoicePipeline::from_config(&args.core_config())
        .context("failed to load template or signing key")?;
    let pdf = ChromePdfRenderer::new(&args.chrome).with_timeout(args.pdf_timeout());
    let state = AppState::new(pipeline, pdf).with_public_base_url(args.public_base_url.clone());

    let addr = args.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "FIRS simulator listening");

    axum::serve(listener, app(state)).await.context("server error")?;
    Ok(())
}
