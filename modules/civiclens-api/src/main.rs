use std::sync::Arc;

use anyhow::Result;
use axum::{
    http::{header, HeaderValue},
    routing::{get, post},
    Router,
};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use civiclens_ai::IssueAnalyzer;
use civiclens_common::Config;
use civiclens_graph::{GraphClient, IssueReader, IssueWriter};

mod auth;
mod collaborators;
mod error;
mod rest;

use auth::JwtService;
use collaborators::{
    Geocoder, HttpImageStore, ImageStore, NominatimGeocoder, NoopGeocoder, NoopImageStore,
};

pub struct AppState {
    pub reader: IssueReader,
    pub writer: IssueWriter,
    pub analyzer: Arc<dyn IssueAnalyzer>,
    pub geocoder: Box<dyn Geocoder>,
    pub images: Box<dyn ImageStore>,
    pub jwt: JwtService,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("civiclens=info".parse()?))
        .init();

    let config = Config::from_env();

    let client =
        GraphClient::connect(&config.neo4j_uri, &config.neo4j_user, &config.neo4j_password)
            .await?;
    client.ensure_schema().await?;

    let images: Box<dyn ImageStore> = if config.image_store_url.is_empty() {
        Box::new(NoopImageStore)
    } else {
        Box::new(HttpImageStore::new(&config.image_store_url))
    };
    let geocoder: Box<dyn Geocoder> = if config.geocoder_base_url.is_empty() {
        Box::new(NoopGeocoder)
    } else {
        Box::new(NominatimGeocoder::new(&config.geocoder_base_url))
    };

    let state = Arc::new(AppState {
        reader: IssueReader::new(client.clone()),
        writer: IssueWriter::new(client),
        analyzer: civiclens_ai::analyzer_from_config(&config),
        geocoder,
        images,
        jwt: JwtService::new(&config.jwt_secret, config.jwt_issuer.clone()),
    });

    let app = Router::new()
        // Health check
        .route("/", get(|| async { "ok" }))
        // Issues
        .route(
            "/api/issues",
            get(rest::issues::list_issues).post(rest::issues::create_issue),
        )
        .route("/api/issues/stats", get(rest::stats::issue_stats))
        .route(
            "/api/issues/{id}",
            get(rest::issues::get_issue)
                .put(rest::issues::update_issue)
                .delete(rest::issues::delete_issue),
        )
        .route("/api/issues/{id}/vote", post(rest::issues::vote_issue))
        // AI
        .route("/api/ai/status", get(rest::ai::ai_status))
        .route("/api/ai/categorize", post(rest::ai::categorize))
        .with_state(state)
        // CORS
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        // No caching: responses carry per-caller visibility decisions
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        // Logging layer: method + path + status + latency only (no query params, no IP)
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                }),
        );

    let addr = format!("{}:{}", config.api_host, config.api_port);
    info!("CivicLens API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
