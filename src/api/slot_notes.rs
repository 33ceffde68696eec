//! Slot note endpoints.

use axum::{extract::State, Json};

use super::{require, success, ApiResult};
use crate::models::SlotNote;
use crate::AppState;

/// GET /api/slot-notes - List all slot notes.
pub async fn list_slot_notes(State(state): State<AppState>) -> ApiResult<Vec<SlotNote>> {
    success(state.repo.read_slot_notes().await)
}

/// PUT /api/slot-notes - Replace all slot notes.
pub async fn replace_slot_notes(
    State(state): State<AppState>,
    Json(notes): Json<Vec<SlotNote>>,
) -> ApiResult<usize> {
    for note in &notes {
        require(&note.slot_id, "slotId")?;
    }

    let count = notes.len();
    state.repo.write_slot_notes(notes).await?;
    success(count)
}

/// POST /api/slot-notes - Insert or replace notes by id.
pub async fn upsert_slot_notes(
    State(state): State<AppState>,
    Json(notes): Json<Vec<SlotNote>>,
) -> ApiResult<Vec<SlotNote>> {
    for note in &notes {
        require(&note.slot_id, "slotId")?;
    }

    success(state.repo.upsert_slot_notes(notes).await?)
}
