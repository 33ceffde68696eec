//! Notes attached to a calendar slot (`date-hour`) or a whole day.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SlotNote {
    #[serde(default)]
    pub id: String,
    pub slot_id: String,
    pub text: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Merge `incoming` into `notes`: same id replaces, everything else is kept.
///
/// Order of the result is not meaningful.
pub fn upsert_notes(notes: &mut Vec<SlotNote>, incoming: Vec<SlotNote>) {
    let incoming_ids: HashSet<&str> = incoming.iter().map(|n| n.id.as_str()).collect();
    notes.retain(|note| !incoming_ids.contains(note.id.as_str()));
    notes.extend(incoming);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(id: &str, text: &str) -> SlotNote {
        SlotNote {
            id: id.to_string(),
            slot_id: "2024-06-01-10".to_string(),
            text: text.to_string(),
            user_id: "Anna".to_string(),
            timestamp: 1,
            extra: Map::new(),
        }
    }

    #[test]
    fn test_upsert_replaces_matching_id() {
        let mut notes = vec![note("n1", "old"), note("n0", "keep")];
        upsert_notes(&mut notes, vec![note("n1", "new"), note("n2", "other")]);

        assert_eq!(notes.len(), 3);
        let n1 = notes.iter().find(|n| n.id == "n1").unwrap();
        assert_eq!(n1.text, "new");
        assert!(notes.iter().any(|n| n.id == "n0"));
        assert!(notes.iter().any(|n| n.id == "n2"));
    }
}
