//! The two documents kept in the remote store and their shape validation.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Appointment, Candidate, SlotNote, Vote, VoteEntry};
use crate::store::{Document, StoreError};

/// Shared data: candidates, slot notes, appointments and legacy votes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MainDocument {
    /// Only used while no dedicated votes bin is configured.
    pub votes: Vec<Vote>,
    pub candidates: Vec<Candidate>,
    pub slot_notes: Vec<SlotNote>,
    pub appointments: Vec<Appointment>,
    /// Top-level keys this version does not manage.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Availability votes keyed by username.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VotesDocument {
    pub users: BTreeMap<String, Vec<VoteEntry>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VotesDocument {
    /// All entries, each tagged with its owner.
    pub fn flatten(&self) -> Vec<Vote> {
        self.users
            .iter()
            .flat_map(|(username, entries)| {
                entries
                    .iter()
                    .cloned()
                    .map(move |entry| Vote::from_entry(username, entry))
            })
            .collect()
    }

    /// Group a flat vote list by username.
    pub fn from_votes(votes: Vec<Vote>) -> Self {
        let mut users: BTreeMap<String, Vec<VoteEntry>> = BTreeMap::new();
        for vote in votes {
            let entry = vote.to_entry();
            users.entry(vote.username).or_default().push(entry);
        }
        Self {
            users,
            extra: Map::new(),
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn into_object(record: Value, label: &str) -> Result<Option<Map<String, Value>>, StoreError> {
    match record {
        Value::Null => Ok(None),
        Value::Object(map) => Ok(Some(map)),
        other => Err(StoreError::Malformed(format!(
            "{} document must be an object, got {}",
            label,
            json_type(&other)
        ))),
    }
}

/// Decode an optional array field. Missing or null fields are empty.
fn take_array<T: DeserializeOwned>(
    object: &mut Map<String, Value>,
    key: &str,
) -> Result<Vec<T>, StoreError> {
    match object.remove(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value @ Value::Array(_)) => serde_json::from_value(value)
            .map_err(|e| StoreError::Malformed(format!("{}: {}", key, e))),
        Some(other) => Err(StoreError::Malformed(format!(
            "{} must be an array, got {}",
            key,
            json_type(&other)
        ))),
    }
}

impl Document for MainDocument {
    const LABEL: &'static str = "main";

    fn decode(record: Value) -> Result<Self, StoreError> {
        let Some(mut object) = into_object(record, Self::LABEL)? else {
            return Ok(Self::default());
        };

        Ok(Self {
            votes: take_array(&mut object, "votes")?,
            candidates: take_array(&mut object, "candidates")?,
            slot_notes: take_array(&mut object, "slotNotes")?,
            appointments: take_array(&mut object, "appointments")?,
            extra: object,
        })
    }
}

impl Document for VotesDocument {
    const LABEL: &'static str = "votes";

    fn decode(record: Value) -> Result<Self, StoreError> {
        let Some(mut object) = into_object(record, Self::LABEL)? else {
            return Ok(Self::default());
        };

        let users = match object.remove("users") {
            None | Some(Value::Null) => BTreeMap::new(),
            Some(value @ Value::Object(_)) => serde_json::from_value(value)
                .map_err(|e| StoreError::Malformed(format!("users: {}", e)))?,
            Some(other) => {
                return Err(StoreError::Malformed(format!(
                    "users must be an object, got {}",
                    json_type(&other)
                )))
            }
        };

        Ok(Self {
            users,
            extra: object,
        })
    }
}
