//! Candidate API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{require, success, ApiResult};
use crate::errors::AppError;
use crate::models::{
    Candidate, CandidateNote, CandidateVoteRequest, CreateCandidateNoteRequest,
    CreateCandidateRequest, UpdateCandidateRequest,
};
use crate::AppState;

/// GET /api/candidates - List all candidates.
pub async fn list_candidates(State(state): State<AppState>) -> ApiResult<Vec<Candidate>> {
    success(state.repo.read_candidates().await)
}

/// PUT /api/candidates - Replace the candidate list.
pub async fn replace_candidates(
    State(state): State<AppState>,
    Json(candidates): Json<Vec<Candidate>>,
) -> ApiResult<usize> {
    for candidate in &candidates {
        require(&candidate.id, "Candidate id")?;
        require(&candidate.name, "Name")?;
        candidate
            .besichtigung_status
            .validate()
            .and_then(|_| candidate.casting_status.validate())
            .map_err(AppError::Validation)?;
    }

    let count = candidates.len();
    state.repo.write_candidates(candidates).await?;
    success(count)
}

/// POST /api/candidates - Add a candidate.
pub async fn create_candidate(
    State(state): State<AppState>,
    Json(request): Json<CreateCandidateRequest>,
) -> ApiResult<Candidate> {
    require(&request.name, "Name")?;

    let candidate = state.repo.add_candidate(request).await?;
    tracing::info!(candidate_id = %candidate.id, "Candidate added");
    success(candidate)
}

/// PUT /api/candidates/:id - Update selected fields of a candidate.
pub async fn update_candidate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateCandidateRequest>,
) -> ApiResult<Candidate> {
    if let Some(name) = &request.name {
        require(name, "Name")?;
    }
    request.validate().map_err(AppError::Validation)?;

    success(state.repo.update_candidate(&id, &request).await?)
}

/// DELETE /api/candidates/:id - Remove a candidate.
pub async fn delete_candidate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    state.repo.delete_candidate(&id).await?;
    tracing::info!(candidate_id = %id, "Candidate deleted");
    success(())
}

/// POST /api/candidates/:id/votes - Set or clear one user's vote.
pub async fn vote_candidate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CandidateVoteRequest>,
) -> ApiResult<Candidate> {
    let username = request.username.trim();
    require(username, "Username")?;
    if let Some(vote) = &request.vote {
        vote.validate().map_err(AppError::Validation)?;
    }

    success(
        state
            .repo
            .set_candidate_vote(&id, username, request.vote)
            .await?,
    )
}

/// POST /api/candidates/:id/notes - Append a note.
pub async fn add_candidate_note(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CreateCandidateNoteRequest>,
) -> ApiResult<CandidateNote> {
    require(&request.user_id, "userId")?;
    require(&request.text, "Text")?;

    success(state.repo.add_candidate_note(&id, request).await?)
}
