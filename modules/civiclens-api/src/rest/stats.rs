use std::sync::Arc;

use axum::{
    extract::State,
    response::{IntoResponse, Json},
};
use serde_json::json;

use civiclens_common::CivicLensError;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::AppState;

/// GET /api/issues/stats. Admin dashboard aggregates: overall status and
/// priority tallies, per-category counts, and the trailing monthly histogram.
pub async fn issue_stats(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<impl IntoResponse> {
    if !user.is_admin() {
        return Err(CivicLensError::Forbidden("Admin access required".to_string()).into());
    }

    let stats = state.reader.stats().await?;
    Ok(Json(json!({
        "overall": stats.overall,
        "by_category": stats.by_category,
        "monthly": stats.monthly,
    })))
}
