use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{Explanation, InteractionEvent, RecommendationContext, UserShoppingContext},
};

use super::AppState;

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct RecommendationParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct RecommendationsResponse {
    pub user_id: Uuid,
    pub count: usize,
    pub recommendations: Vec<RecommendationContext>,
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Exactly `limit` recommendations for a user
pub async fn get_recommendations(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(params): Query<RecommendationParams>,
) -> AppResult<Json<RecommendationsResponse>> {
    let limit = params.limit.unwrap_or(state.limits.default);
    if limit == 0 || limit > state.limits.max {
        return Err(AppError::InvalidInput(format!(
            "limit must be between 1 and {}",
            state.limits.max
        )));
    }

    let recommendations = state.engine.get_recommendations(user_id, limit).await;

    Ok(Json(RecommendationsResponse {
        user_id,
        count: recommendations.len(),
        recommendations,
    }))
}

/// Reasoning and narrative for one product
pub async fn explain_recommendation(
    State(state): State<AppState>,
    Path((user_id, product_id)): Path<(Uuid, i64)>,
) -> AppResult<Json<Explanation>> {
    let explanation = state
        .engine
        .explain_with_narrative(user_id, product_id)
        .await?;
    Ok(Json(explanation))
}

/// Queues an interaction for the user's shopping context
pub async fn record_interaction(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(event): Json<InteractionEvent>,
) -> (StatusCode, Json<Value>) {
    state.updater.update(user_id, event);
    (StatusCode::ACCEPTED, Json(json!({ "status": "accepted" })))
}

/// Stored shopping context for a user
pub async fn get_user_context(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<UserShoppingContext>> {
    let context = state
        .contexts
        .load(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No shopping context for user {}", user_id)))?;
    Ok(Json(context))
}
