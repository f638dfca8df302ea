use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use civiclens_common::{
    Address, Category, CivicLensError, Issue, IssueImage, NewIssue, Priority, Status, VoteType,
};
use civiclens_graph::{visibility_for, IssueFilter, IssuePatch, Pagination, SortSpec};

use crate::auth::AuthUser;
use crate::collaborators::cleanup_images;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

use super::{issue_view, referenced_user_ids, ListQuery};

// --- Request bodies ---

#[derive(Deserialize)]
pub struct CreateIssueRequest {
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<Address>,
    #[serde(default)]
    pub images: Vec<ImageUpload>,
}

#[derive(Deserialize)]
pub struct ImageUpload {
    pub url: String,
    pub storage_id: String,
    pub original_name: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Deserialize)]
pub struct UpdateIssueRequest {
    pub status: Option<String>,
    pub status_reason: Option<String>,
    pub priority: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub is_public: Option<bool>,
    pub estimated_resolution_time: Option<String>,
    pub admin_note: Option<String>,
    #[serde(default)]
    pub note_is_public: bool,
}

#[derive(Deserialize)]
pub struct VoteRequest {
    pub vote_type: String,
}

// --- Handlers ---

/// POST /api/issues. Validates the report, then enriches it: AI caption and
/// category/priority suggestion, reverse-geocoded address. Every enrichment
/// step is best-effort; a dead AI provider or geocoder never blocks creation.
pub async fn create_issue(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateIssueRequest>,
) -> ApiResult<impl IntoResponse> {
    state.writer.upsert_user(&user.record()).await?;

    let mut images: Vec<IssueImage> = req
        .images
        .into_iter()
        .map(|i| IssueImage {
            url: i.url,
            storage_id: i.storage_id,
            original_name: i.original_name,
            size: i.size,
            ai_caption: None,
        })
        .collect();

    // AI enrichment off the first image, when present
    let analysis = match images.first() {
        Some(image) => match state.analyzer.analyze_image(&image.url).await {
            Ok(analysis) => Some(analysis),
            Err(e) => {
                warn!(error = %e, "image analysis failed, continuing without it");
                None
            }
        },
        None => None,
    };
    if let (Some(image), Some(analysis)) = (images.first_mut(), analysis.as_ref()) {
        image.ai_caption = Some(analysis.description.clone());
    }
    // Remaining images get a short caption only
    for image in images.iter_mut().skip(1) {
        match state.analyzer.describe_image(&image.url).await {
            Ok(caption) => image.ai_caption = Some(caption),
            Err(e) => warn!(error = %e, "image captioning failed, continuing without it"),
        }
    }

    // A confident image analysis may refine the category, but only when the
    // caller did not pick a specific one
    let caller_category = req.category.as_deref().map(Category::from_str_loose);
    let category = match caller_category {
        Some(c) if c != Category::Other => c,
        _ => match analysis.as_ref().filter(|a| a.confidence >= 0.7) {
            Some(a) => a.suggested_category,
            None => state
                .analyzer
                .categorize(&req.title, &req.description)
                .await
                .unwrap_or(Category::Other),
        },
    };

    let priority = match req.priority.as_deref() {
        Some(p) => Some(Priority::from_str_loose(p)),
        None => Some(civiclens_ai::estimate_priority(
            category,
            &req.description,
            analysis.as_ref(),
        )),
    };

    let address = match req.address.filter(|a| !a.is_empty()) {
        Some(address) => address,
        None => state
            .geocoder
            .reverse(req.latitude, req.longitude)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "reverse geocoding failed, leaving address empty");
                Address::default()
            }),
    };

    let issue = Issue::new(NewIssue {
        title: req.title,
        description: req.description,
        category,
        priority,
        location: civiclens_common::GeoPoint { lat: req.latitude, lng: req.longitude },
        address,
        images,
        reported_by: user.id,
    })?;

    if let Err(e) = state.writer.create_issue(&issue).await {
        // Uploaded images would be orphaned; clean them up before failing
        let ids: Vec<String> = issue.images.iter().map(|i| i.storage_id.clone()).collect();
        cleanup_images(state.images.as_ref(), &ids).await;
        return Err(e.into());
    }

    let users = state.reader.resolve_users(&referenced_user_ids(&[&issue])).await?;
    Ok((StatusCode::CREATED, Json(issue_view(&issue, &users))))
}

/// GET /api/issues. Non-admins see public issues plus their own; pagination
/// limits are wider for admins.
pub async fn list_issues(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(params): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    let filter = IssueFilter {
        status: params.status.as_deref().map(Status::from_str_loose),
        category: params.category.as_deref().map(Category::from_str_loose),
        priority: params.priority.as_deref().map(Priority::from_str_loose),
        reported_by: params.reported_by,
        assigned_to: params.assigned_to,
        search: params.search,
        latitude: params.latitude,
        longitude: params.longitude,
        radius_meters: params.radius,
    };
    let pagination = Pagination::clamp(params.page, params.limit, user.is_admin());
    let sort = SortSpec::from_request(params.sort_by.as_deref(), params.sort_order.as_deref());

    let (mut issues, meta) = state
        .reader
        .list(&filter, visibility_for(user.role, user.id), pagination, sort)
        .await?;

    if !user.is_admin() {
        for issue in &mut issues {
            issue.retain_public_notes();
        }
    }

    let refs: Vec<&Issue> = issues.iter().collect();
    let users = state.reader.resolve_users(&referenced_user_ids(&refs)).await?;
    let views: Vec<serde_json::Value> = issues.iter().map(|i| issue_view(i, &users)).collect();

    Ok(Json(json!({ "issues": views, "pagination": meta })))
}

/// GET /api/issues/{id}.
pub async fn get_issue(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let mut issue = state
        .reader
        .get(id)
        .await?
        .ok_or_else(|| CivicLensError::NotFound("Issue not found".to_string()))?;

    if !issue.visible_to(user.role, user.id) {
        return Err(CivicLensError::Forbidden("Access denied".to_string()).into());
    }
    if !user.is_admin() {
        issue.retain_public_notes();
    }

    let users = state.reader.resolve_users(&referenced_user_ids(&[&issue])).await?;
    Ok(Json(issue_view(&issue, &users)))
}

/// PUT /api/issues/{id}. Admin triage: status, priority, assignment,
/// visibility, resolution estimate, notes.
pub async fn update_issue(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateIssueRequest>,
) -> ApiResult<impl IntoResponse> {
    if !user.is_admin() {
        return Err(CivicLensError::Forbidden("Admin access required".to_string()).into());
    }
    state.writer.upsert_user(&user.record()).await?;

    let patch = IssuePatch {
        status: req.status.as_deref().map(Status::from_str_loose),
        status_reason: req.status_reason,
        priority: req.priority.as_deref().map(Priority::from_str_loose),
        assigned_to: req.assigned_to,
        is_public: req.is_public,
        estimated_resolution_time: req.estimated_resolution_time,
        admin_note: req.admin_note,
        note_is_public: req.note_is_public,
    };
    state.writer.update_issue(id, user.id, &patch).await?;

    let issue = state
        .reader
        .get(id)
        .await?
        .ok_or_else(|| CivicLensError::NotFound("Issue not found".to_string()))?;
    let users = state.reader.resolve_users(&referenced_user_ids(&[&issue])).await?;
    Ok(Json(issue_view(&issue, &users)))
}

/// DELETE /api/issues/{id}. Admin only. Stored images are cleaned up
/// best-effort after the graph delete succeeds.
pub async fn delete_issue(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    if !user.is_admin() {
        return Err(CivicLensError::Forbidden("Admin access required".to_string()).into());
    }

    let images = state.writer.delete_issue(id).await?;
    let ids: Vec<String> = images.iter().map(|i| i.storage_id.clone()).collect();
    cleanup_images(state.images.as_ref(), &ids).await;

    Ok(Json(json!({ "message": "Issue deleted successfully" })))
}

/// POST /api/issues/{id}/vote. Body: {"vote_type": "up" | "down" | "remove"}.
pub async fn vote_issue(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<VoteRequest>,
) -> ApiResult<impl IntoResponse> {
    let vote = match req.vote_type.trim().to_lowercase().as_str() {
        "up" | "upvote" => VoteType::Up,
        "down" | "downvote" => VoteType::Down,
        "remove" => VoteType::Remove,
        other => {
            return Err(ApiError(CivicLensError::Validation(format!(
                "Invalid vote type: {other}"
            ))))
        }
    };

    let tally = state.writer.apply_vote(id, user.id, vote).await?;
    Ok(Json(json!({
        "upvotes": tally.upvotes,
        "downvotes": tally.downvotes,
        "total_votes": tally.total_votes,
    })))
}
