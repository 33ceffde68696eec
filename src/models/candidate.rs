//! Casting candidates and their per-user votes and notes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Progress of a viewing or casting step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    #[default]
    Offen,
    Geplant,
    Abgeschlossen,
    #[serde(untagged)]
    Other(String),
}

/// A roommate's thumbs up or down on a candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CandidateVote {
    Up,
    Down,
    #[serde(untagged)]
    Other(String),
}

impl ProgressStatus {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            ProgressStatus::Other(value) => Err(format!(
                "Invalid status '{}', expected offen, geplant or abgeschlossen",
                value
            )),
            _ => Ok(()),
        }
    }
}

impl CandidateVote {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            CandidateVote::Other(value) => {
                Err(format!("Invalid vote '{}', expected up or down", value))
            }
            _ => Ok(()),
        }
    }
}

/// A free-text note attached to a candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CandidateNote {
    pub id: String,
    pub text: String,
    pub user_id: String,
    pub timestamp: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A person applying for the free room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_slot_id: Option<String>,
    #[serde(default)]
    pub besichtigung_status: ProgressStatus,
    #[serde(default)]
    pub casting_status: ProgressStatus,
    #[serde(default)]
    pub votes: BTreeMap<String, CandidateVote>,
    #[serde(default)]
    pub notes: Vec<CandidateNote>,
    /// Fields added by other clients, written back untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Request body for creating a new candidate.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCandidateRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub link: Option<String>,
}

impl CreateCandidateRequest {
    /// Build a candidate with default statuses and no votes or notes.
    pub fn into_candidate(self) -> Candidate {
        Candidate {
            id: self
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            name: self.name,
            description: self.description,
            link: self.link,
            assigned_slot_id: None,
            besichtigung_status: ProgressStatus::Offen,
            casting_status: ProgressStatus::Offen,
            votes: BTreeMap::new(),
            notes: Vec::new(),
            extra: Map::new(),
        }
    }
}

/// Request body for a partial candidate update.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCandidateRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub assigned_slot_id: Option<String>,
    #[serde(default)]
    pub besichtigung_status: Option<ProgressStatus>,
    #[serde(default)]
    pub casting_status: Option<ProgressStatus>,
}

impl UpdateCandidateRequest {
    pub fn validate(&self) -> Result<(), String> {
        for status in [&self.besichtigung_status, &self.casting_status]
            .into_iter()
            .flatten()
        {
            status.validate()?;
        }
        Ok(())
    }

    /// Overlay the supplied fields onto `candidate`.
    pub fn apply(&self, candidate: &mut Candidate) {
        if let Some(name) = &self.name {
            candidate.name = name.clone();
        }
        if let Some(description) = &self.description {
            candidate.description = description.clone();
        }
        if let Some(link) = &self.link {
            candidate.link = Some(link.clone()).filter(|l| !l.is_empty());
        }
        if let Some(slot) = &self.assigned_slot_id {
            candidate.assigned_slot_id = Some(slot.clone()).filter(|s| !s.is_empty());
        }
        if let Some(status) = &self.besichtigung_status {
            candidate.besichtigung_status = status.clone();
        }
        if let Some(status) = &self.casting_status {
            candidate.casting_status = status.clone();
        }
    }
}

/// Request body for setting or clearing a user's vote on a candidate.
#[derive(Debug, Clone, Deserialize)]
pub struct CandidateVoteRequest {
    pub username: String,
    #[serde(default)]
    pub vote: Option<CandidateVote>,
}

/// Request body for appending a note to a candidate.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCandidateNoteRequest {
    pub user_id: String,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_candidate_defaults() {
        let request: CreateCandidateRequest = serde_json::from_str(r#"{"name":"Max"}"#).unwrap();
        let candidate = request.into_candidate();

        assert!(!candidate.id.is_empty());
        assert_eq!(candidate.besichtigung_status, ProgressStatus::Offen);
        assert_eq!(candidate.casting_status, ProgressStatus::Offen);
        assert!(candidate.votes.is_empty());
        assert!(candidate.notes.is_empty());

        let json = serde_json::to_value(&candidate).unwrap();
        assert_eq!(json["besichtigungStatus"], "offen");
        assert_eq!(json["castingStatus"], "offen");
        assert!(json.get("link").is_none());
    }

    #[test]
    fn test_update_touches_only_supplied_fields() {
        let mut candidate = CreateCandidateRequest {
            id: Some("c1".to_string()),
            name: "Max".to_string(),
            description: "Student".to_string(),
            link: None,
        }
        .into_candidate();

        let update: UpdateCandidateRequest =
            serde_json::from_str(r#"{"castingStatus":"geplant"}"#).unwrap();
        update.apply(&mut candidate);

        assert_eq!(candidate.casting_status, ProgressStatus::Geplant);
        assert_eq!(candidate.besichtigung_status, ProgressStatus::Offen);
        assert_eq!(candidate.name, "Max");
        assert_eq!(candidate.description, "Student");
    }

    #[test]
    fn test_stored_candidate_keeps_unknown_values() {
        let raw = serde_json::json!({
            "id": "c1",
            "name": "Max",
            "description": "",
            "besichtigungStatus": "offen",
            "castingStatus": "verschoben",
            "votes": { "Anna": "up", "Ben": "maybe" },
            "notes": [{ "id": "n1", "text": "hi", "userId": "Anna", "timestamp": 1, "pinned": true }],
            "phone": "0171"
        });
        let candidate: Candidate = serde_json::from_value(raw.clone()).unwrap();

        assert_eq!(
            candidate.casting_status,
            ProgressStatus::Other("verschoben".to_string())
        );
        assert_eq!(candidate.votes["Ben"], CandidateVote::Other("maybe".to_string()));
        assert_eq!(candidate.extra["phone"], "0171");
        assert_eq!(serde_json::to_value(&candidate).unwrap(), raw);
    }

    #[test]
    fn test_update_rejects_unknown_status() {
        let update: UpdateCandidateRequest =
            serde_json::from_str(r#"{"castingStatus":"verschoben"}"#).unwrap();
        assert!(update.validate().is_err());

        let update: UpdateCandidateRequest =
            serde_json::from_str(r#"{"besichtigungStatus":"abgeschlossen"}"#).unwrap();
        assert!(update.validate().is_ok());
    }
}
