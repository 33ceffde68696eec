//! Availability vote endpoints.

use std::collections::BTreeMap;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;

use super::{require, success, ApiResult};
use crate::errors::AppError;
use crate::models::{heatmap, SubmitVotesRequest, Vote, VoteEntry};
use crate::AppState;

fn validate_entry(entry: &VoteEntry) -> Result<(), AppError> {
    entry.validate().map_err(AppError::Validation)
}

/// GET /api/votes - All votes of all users.
pub async fn list_votes(State(state): State<AppState>) -> ApiResult<Vec<Vote>> {
    success(state.repo.read_votes().await)
}

/// POST /api/votes - Replace one user's votes, leaving everyone else's alone.
pub async fn submit_votes(
    State(state): State<AppState>,
    Json(request): Json<SubmitVotesRequest>,
) -> ApiResult<Vec<Vote>> {
    let username = request.username.trim().to_string();
    require(&username, "Username")?;
    for entry in &request.votes {
        validate_entry(entry)?;
    }

    let stored: Vec<Vote> = request
        .votes
        .iter()
        .cloned()
        .map(|entry| Vote::from_entry(&username, entry))
        .collect();
    state
        .repo
        .update_user_votes(&username, request.votes)
        .await?;

    tracing::info!(username = %username, "Votes updated");
    success(stored)
}

/// PUT /api/votes - Replace the whole vote list.
pub async fn replace_votes(
    State(state): State<AppState>,
    Json(votes): Json<Vec<Vote>>,
) -> ApiResult<usize> {
    for vote in &votes {
        require(&vote.username, "Username")?;
        validate_entry(&vote.to_entry())?;
    }

    let count = votes.len();
    state.repo.write_votes(votes).await?;
    success(count)
}

/// GET /api/usernames - Everyone who has voted.
pub async fn list_usernames(State(state): State<AppState>) -> ApiResult<Vec<String>> {
    success(state.repo.usernames().await)
}

#[derive(Debug, Deserialize)]
pub struct HeatmapQuery {
    pub day: String,
}

/// GET /api/heatmap?day=YYYY-MM-DD - Available users per hour.
pub async fn get_heatmap(
    State(state): State<AppState>,
    Query(query): Query<HeatmapQuery>,
) -> ApiResult<BTreeMap<u32, u32>> {
    NaiveDate::parse_from_str(&query.day, "%Y-%m-%d").map_err(|_| {
        AppError::Validation(format!("Invalid day '{}', expected YYYY-MM-DD", query.day))
    })?;

    let votes = state.repo.read_votes().await;
    success(heatmap(&votes, &query.day))
}
