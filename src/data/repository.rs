//! Repository for votes, candidates, slot notes and appointments.
//!
//! Every mutation is a transform handed to the owning bin's serializer, so it
//! always applies to the latest stored document.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::{RepositoryError, ResolvedBins};
use crate::models::{
    upsert_notes, Appointment, Candidate, CandidateNote, CandidateVote, Comment,
    CreateAppointmentRequest, CreateCandidateNoteRequest, CreateCandidateRequest,
    CreateCommentRequest, MainDocument, SlotNote, UpdateAppointmentRequest,
    UpdateCandidateRequest, Vote, VoteEntry, VotesDocument,
};
use crate::store::{Bin, StoreGateway};

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Data access façade shared by all handlers.
pub struct Repository {
    main: Option<Bin<MainDocument>>,
    votes: Option<Bin<VotesDocument>>,
}

impl Repository {
    pub fn new(gateway: Arc<StoreGateway>, bins: &ResolvedBins, cache_ttl: Duration) -> Self {
        Self {
            main: bins
                .main
                .as_deref()
                .map(|id| Bin::new(id, gateway.clone(), cache_ttl)),
            votes: bins
                .votes
                .as_deref()
                .map(|id| Bin::new(id, gateway.clone(), cache_ttl)),
        }
    }

    fn main_bin(&self) -> Result<&Bin<MainDocument>, RepositoryError> {
        self.main
            .as_ref()
            .ok_or(RepositoryError::NotConfigured("main"))
    }

    /// Whether votes live in their own bin rather than the main document.
    pub fn uses_votes_bin(&self) -> bool {
        self.votes.is_some()
    }

    /// Force the next reads to go to the store.
    pub fn invalidate_cache(&self) {
        if let Some(bin) = &self.main {
            bin.invalidate();
        }
        if let Some(bin) = &self.votes {
            bin.invalidate();
        }
    }

    async fn read_main(&self) -> Result<MainDocument, RepositoryError> {
        Ok(self.main_bin()?.read().await?)
    }

    /// Read one collection of the main document, empty on any failure.
    async fn read_main_field<T>(
        &self,
        what: &str,
        select: impl FnOnce(MainDocument) -> Vec<T>,
    ) -> Vec<T> {
        match self.read_main().await {
            Ok(document) => select(document),
            Err(e) => {
                tracing::error!(error = %e, "Error reading {}", what);
                Vec::new()
            }
        }
    }

    async fn update_main<T>(
        &self,
        transform: impl FnOnce(&mut MainDocument) -> Result<T, RepositoryError>,
    ) -> Result<T, RepositoryError> {
        self.main_bin()?.update(transform).await
    }

    // ==================== VOTES ====================

    /// All votes, flattened and tagged with their username.
    pub async fn read_votes(&self) -> Vec<Vote> {
        let Some(bin) = &self.votes else {
            return self.read_main_field("votes", |doc| doc.votes).await;
        };

        match bin.read().await {
            Ok(document) => document.flatten(),
            Err(e) => {
                tracing::error!(error = %e, "Error reading votes");
                Vec::new()
            }
        }
    }

    /// Replace every user's votes with `votes`.
    pub async fn write_votes(&self, votes: Vec<Vote>) -> Result<(), RepositoryError> {
        match &self.votes {
            Some(bin) => {
                let grouped = VotesDocument::from_votes(votes);
                bin.update(|doc| {
                    doc.users = grouped.users;
                    Ok::<_, RepositoryError>(())
                })
                .await
            }
            None => {
                self.update_main(|doc| {
                    doc.votes = votes;
                    Ok(())
                })
                .await
            }
        }
    }

    /// Replace a single user's votes, leaving everyone else's untouched.
    pub async fn update_user_votes(
        &self,
        username: &str,
        entries: Vec<VoteEntry>,
    ) -> Result<(), RepositoryError> {
        let result = match &self.votes {
            Some(bin) => {
                bin.update(|doc| {
                    doc.users.insert(username.to_string(), entries);
                    Ok::<_, RepositoryError>(())
                })
                .await
            }
            None => {
                self.update_main(|doc| {
                    doc.votes.retain(|v| v.username != username);
                    doc.votes.extend(
                        entries
                            .into_iter()
                            .map(|entry| Vote::from_entry(username, entry)),
                    );
                    Ok(())
                })
                .await
            }
        };

        match &result {
            Ok(()) => tracing::info!(username, "Updated user votes"),
            Err(e) => tracing::error!(username, error = %e, "Error updating user votes"),
        }
        result
    }

    /// Distinct usernames that have submitted votes.
    pub async fn usernames(&self) -> Vec<String> {
        self.read_votes()
            .await
            .into_iter()
            .map(|v| v.username)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    // ==================== CANDIDATES ====================

    pub async fn read_candidates(&self) -> Vec<Candidate> {
        self.read_main_field("candidates", |doc| doc.candidates)
            .await
    }

    pub async fn write_candidates(&self, candidates: Vec<Candidate>) -> Result<(), RepositoryError> {
        self.update_main(|doc| {
            doc.candidates = candidates;
            Ok(())
        })
        .await
    }

    pub async fn add_candidate(
        &self,
        request: CreateCandidateRequest,
    ) -> Result<Candidate, RepositoryError> {
        let candidate = request.into_candidate();
        self.update_main(|doc| {
            doc.candidates.push(candidate.clone());
            Ok(candidate)
        })
        .await
    }

    /// Apply a change to one candidate; unknown ids leave the document untouched.
    async fn modify_candidate<T>(
        &self,
        id: &str,
        change: impl FnOnce(&mut Candidate) -> T,
    ) -> Result<T, RepositoryError> {
        self.update_main(|doc| {
            let candidate = doc
                .candidates
                .iter_mut()
                .find(|c| c.id == id)
                .ok_or_else(|| RepositoryError::NotFound(format!("Candidate {} not found", id)))?;
            Ok(change(candidate))
        })
        .await
    }

    pub async fn update_candidate(
        &self,
        id: &str,
        request: &UpdateCandidateRequest,
    ) -> Result<Candidate, RepositoryError> {
        self.modify_candidate(id, |candidate| {
            request.apply(candidate);
            candidate.clone()
        })
        .await
    }

    pub async fn delete_candidate(&self, id: &str) -> Result<(), RepositoryError> {
        self.update_main(|doc| {
            let before = doc.candidates.len();
            doc.candidates.retain(|c| c.id != id);
            if doc.candidates.len() == before {
                return Err(RepositoryError::NotFound(format!("Candidate {} not found", id)));
            }
            Ok(())
        })
        .await
    }

    /// Set or clear (`None`) a user's vote on a candidate.
    pub async fn set_candidate_vote(
        &self,
        id: &str,
        username: &str,
        vote: Option<CandidateVote>,
    ) -> Result<Candidate, RepositoryError> {
        self.modify_candidate(id, |candidate| {
            match vote {
                Some(vote) => {
                    candidate.votes.insert(username.to_string(), vote);
                }
                None => {
                    candidate.votes.remove(username);
                }
            }
            candidate.clone()
        })
        .await
    }

    pub async fn add_candidate_note(
        &self,
        id: &str,
        request: CreateCandidateNoteRequest,
    ) -> Result<CandidateNote, RepositoryError> {
        let note = CandidateNote {
            id: new_id(),
            text: request.text,
            user_id: request.user_id,
            timestamp: now_millis(),
            extra: Default::default(),
        };
        self.modify_candidate(id, |candidate| {
            candidate.notes.push(note.clone());
            note
        })
        .await
    }

    // ==================== SLOT NOTES ====================

    pub async fn read_slot_notes(&self) -> Vec<SlotNote> {
        self.read_main_field("slotNotes", |doc| doc.slot_notes)
            .await
    }

    pub async fn write_slot_notes(&self, notes: Vec<SlotNote>) -> Result<(), RepositoryError> {
        self.update_main(|doc| {
            doc.slot_notes = notes;
            Ok(())
        })
        .await
    }

    /// Insert or replace notes by id. Notes without id or timestamp get one.
    pub async fn upsert_slot_notes(
        &self,
        notes: Vec<SlotNote>,
    ) -> Result<Vec<SlotNote>, RepositoryError> {
        let incoming: Vec<SlotNote> = notes
            .into_iter()
            .map(|mut note| {
                if note.id.trim().is_empty() {
                    note.id = new_id();
                }
                if note.timestamp == 0 {
                    note.timestamp = now_millis();
                }
                note
            })
            .collect();

        self.update_main(|doc| {
            upsert_notes(&mut doc.slot_notes, incoming.clone());
            Ok(incoming)
        })
        .await
    }

    // ==================== APPOINTMENTS ====================

    pub async fn read_appointments(&self) -> Vec<Appointment> {
        self.read_main_field("appointments", |doc| doc.appointments)
            .await
    }

    pub async fn write_appointments(
        &self,
        appointments: Vec<Appointment>,
    ) -> Result<(), RepositoryError> {
        self.update_main(|doc| {
            doc.appointments = appointments;
            Ok(())
        })
        .await
    }

    pub async fn create_appointment(
        &self,
        request: CreateAppointmentRequest,
    ) -> Result<Appointment, RepositoryError> {
        let appointment = request.into_appointment();
        self.update_main(|doc| {
            doc.appointments.push(appointment.clone());
            Ok(appointment)
        })
        .await
    }

    async fn modify_appointment<T>(
        &self,
        id: &str,
        change: impl FnOnce(&mut Appointment) -> T,
    ) -> Result<T, RepositoryError> {
        self.update_main(|doc| {
            let appointment = doc
                .appointments
                .iter_mut()
                .find(|a| a.id == id)
                .ok_or_else(|| {
                    RepositoryError::NotFound(format!("Appointment {} not found", id))
                })?;
            Ok(change(appointment))
        })
        .await
    }

    pub async fn update_appointment(
        &self,
        id: &str,
        request: &UpdateAppointmentRequest,
    ) -> Result<Appointment, RepositoryError> {
        self.modify_appointment(id, |appointment| {
            request.apply(appointment);
            appointment.clone()
        })
        .await
    }

    pub async fn delete_appointment(&self, id: &str) -> Result<(), RepositoryError> {
        self.update_main(|doc| {
            let before = doc.appointments.len();
            doc.appointments.retain(|a| a.id != id);
            if doc.appointments.len() == before {
                return Err(RepositoryError::NotFound(format!(
                    "Appointment {} not found",
                    id
                )));
            }
            Ok(())
        })
        .await
    }

    /// Append a comment; existing comments are never rewritten.
    pub async fn add_appointment_comment(
        &self,
        id: &str,
        request: CreateCommentRequest,
    ) -> Result<Comment, RepositoryError> {
        let comment = Comment {
            id: new_id(),
            author: request.author,
            text: request.text,
            timestamp: now_millis(),
            extra: Default::default(),
        };
        self.modify_appointment(id, |appointment| {
            appointment.comments.push(comment.clone());
            comment
        })
        .await
    }
}
