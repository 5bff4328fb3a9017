use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use crawlkeep_core::CoreError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::state::AppState;

fn error_response(err: CoreError) -> (StatusCode, Json<serde_json::Value>) {
    let status = match &err {
        CoreError::InvalidSiteName(_) => StatusCode::BAD_REQUEST,
        CoreError::SiteNotFound(_) => StatusCode::NOT_FOUND,
        CoreError::Other(e) => {
            warn!(error = %e, "unexpected core error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(json!({"error": err.to_string()})))
}

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub url: Option<String>,
    pub filter: Option<String>,
    pub site_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub site_name: String,
    pub already_existed: bool,
    pub processing: bool,
}

pub async fn process(
    State(state): State<AppState>,
    Json(req): Json<ProcessRequest>,
) -> impl IntoResponse {
    let Some(url) = req.url else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "url is required"})),
        )
            .into_response();
    };

    match state.crawler.register_site(url, req.filter, req.site_name).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({
                "site_name": outcome.site_name,
                "already_existed": outcome.already_existed,
                "processing": outcome.processing,
            })),
        )
            .into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ProcessMultipleRequest {
    pub urls: Vec<String>,
}

pub async fn process_multiple(
    State(state): State<AppState>,
    Json(req): Json<ProcessMultipleRequest>,
) -> impl IntoResponse {
    let mut results = Vec::with_capacity(req.urls.len());
    for url in req.urls {
        let result = match state.crawler.register_site(url.clone(), None, None).await {
            Ok(outcome) => json!({
                "site_name": outcome.site_name,
                "already_existed": outcome.already_existed,
                "processing": outcome.processing,
            }),
            Err(e) => json!({"url": url, "error": e.to_string()}),
        };
        results.push(result);
    }
    (StatusCode::OK, Json(json!({"results": results})))
}

pub async fn toggle_pause(State(state): State<AppState>, Path(site): Path<String>) -> impl IntoResponse {
    match state.crawler.toggle_pause(&site).await {
        Ok(paused) => (StatusCode::OK, Json(json!({"paused": paused}))).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

pub async fn delete_site(State(state): State<AppState>, Path(site): Path<String>) -> impl IntoResponse {
    match state.crawler.delete_site(&site).await {
        Ok(()) => (StatusCode::OK, Json(json!({"deleted": site}))).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

pub async fn restart_crawl(State(state): State<AppState>, Path(site): Path<String>) -> impl IntoResponse {
    match state.crawler.restart_crawl(&site).await {
        Ok(()) => (StatusCode::OK, Json(json!({"restarted": site}))).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

pub async fn status(State(state): State<AppState>, Path(site): Path<String>) -> impl IntoResponse {
    match state.crawler.status(&site).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

pub async fn list_sites(State(state): State<AppState>) -> impl IntoResponse {
    match state.crawler.list_sites().await {
        Ok(sites) => (StatusCode::OK, Json(json!({"sites": sites}))).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}
