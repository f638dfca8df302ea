use std::sync::Arc;

use axum::{
    extract::State,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::json;

use civiclens_ai::estimate_priority;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::AppState;

#[derive(Deserialize)]
pub struct CategorizeRequest {
    pub title: String,
    pub description: String,
}

/// GET /api/ai/status. Which analyzer backs enrichment; the keyword
/// classifier means no external provider is configured.
pub async fn ai_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let provider = state.analyzer.provider_name();
    Json(json!({
        "provider": provider,
        "external": provider != "keyword",
    }))
}

/// POST /api/ai/categorize. Classify an issue from its text and estimate a
/// triage priority, without creating anything.
pub async fn categorize(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Json(req): Json<CategorizeRequest>,
) -> ApiResult<impl IntoResponse> {
    let category = state
        .analyzer
        .categorize(&req.title, &req.description)
        .await
        .unwrap_or(civiclens_common::Category::Other);
    let priority = estimate_priority(category, &req.description, None);

    Ok(Json(json!({
        "category": category,
        "priority": priority,
    })))
}
