mod handlers;
mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use crawlkeep_common::CrawlerConfig;
use crawlkeep_core::Crawler;
use crawlkeep_embed::{EmbeddingProvider, HttpEmbeddingProvider, NoopEmbeddingProvider};
use crawlkeep_fga::{Fga, HttpFga, NoopFga};
use crawlkeep_store::Store;
use crawlkeep_vectordb::{HttpVectorDb, NoopVectorDb, VectorDb};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

/// The test-config sentinel (`CrawlerConfig::for_tests`) doubles as the
/// "no collaborator configured" marker in production: an operator who
/// wants to run the pipeline without wiring up a real embedding
/// provider, vector database, or FGA backend sets the corresponding
/// `_BASE_URL` to this value and gets the no-op adapter instead.
const DISABLED_SENTINEL: &str = "http://localhost:0";

fn build_embedding_provider(client: reqwest::Client, config: &CrawlerConfig) -> Arc<dyn EmbeddingProvider> {
    if config.embedding_base_url == DISABLED_SENTINEL {
        Arc::new(NoopEmbeddingProvider)
    } else {
        Arc::new(HttpEmbeddingProvider::new(
            client,
            config.embedding_base_url.clone(),
            config.embedding_api_key.clone(),
        ))
    }
}

fn build_vectordb(client: reqwest::Client, config: &CrawlerConfig) -> Arc<dyn VectorDb> {
    if config.vectordb_base_url == DISABLED_SENTINEL {
        Arc::new(NoopVectorDb)
    } else {
        Arc::new(HttpVectorDb::new(
            client,
            config.vectordb_base_url.clone(),
            config.vectordb_api_key.clone(),
        ))
    }
}

fn build_fga(client: reqwest::Client, config: &CrawlerConfig) -> Arc<dyn Fga> {
    if config.fga_base_url == DISABLED_SENTINEL {
        Arc::new(NoopFga)
    } else {
        Arc::new(HttpFga::new(client, config.fga_base_url.clone(), config.fga_api_key.clone()))
    }
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/process", post(handlers::process))
        .route("/process_multiple", post(handlers::process_multiple))
        .route("/toggle_pause/{site}", post(handlers::toggle_pause))
        .route("/delete_site/{site}", post(handlers::delete_site))
        .route("/restart_crawl/{site}", post(handlers::restart_crawl))
        .route("/status/{site}", get(handlers::status))
        .route("/sites", get(handlers::list_sites))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE]),
        )
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("crawlkeep=info".parse()?))
        .init();

    let config = CrawlerConfig::from_env();
    config.log_redacted();

    let store = Arc::new(Store::new(config.data_root.clone()).await?);
    let http = reqwest::Client::builder().timeout(Duration::from_secs(60)).build()?;

    let embedding_provider = build_embedding_provider(http.clone(), &config);
    let vectordb = build_vectordb(http.clone(), &config);
    let fga = build_fga(http.clone(), &config);

    let bind_addr = config.bind_addr.clone();
    let crawler = Crawler::new(config, store, http, embedding_provider, vectordb, fga);

    let cancel = CancellationToken::new();
    let mut pipeline = crawler.spawn_pipeline(cancel.clone());

    let app = build_router(AppState { crawler });

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "crawlkeep API listening");

    let serve = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    serve.await?;

    info!("shutting down worker pipeline");
    cancel.cancel();
    while pipeline.join_next().await.is_some() {}

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
