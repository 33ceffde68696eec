//! Availability votes: one user's claimed time range on a given day.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// First and last hour shown on the availability calendar.
pub const FIRST_HOUR: u32 = 10;
pub const LAST_HOUR: u32 = 22;

/// How a user will attend a slot.
///
/// Stored values this version does not know are kept verbatim in `Other`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VoteStatus {
    #[default]
    Present,
    Online,
    Unavailable,
    #[serde(untagged)]
    Other(String),
}

impl VoteStatus {
    /// Whether the user counts towards the heatmap for this slot.
    pub fn is_available(&self) -> bool {
        matches!(self, VoteStatus::Present | VoteStatus::Online)
    }
}

/// A single availability range, stored under its owner's username.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteEntry {
    pub day: String,
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub status: VoteStatus,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A vote entry tagged with the username that owns it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Vote {
    pub username: String,
    pub day: String,
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub status: VoteStatus,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Vote {
    pub fn from_entry(username: &str, entry: VoteEntry) -> Self {
        Self {
            username: username.to_string(),
            day: entry.day,
            start: entry.start,
            end: entry.end,
            status: entry.status,
            extra: entry.extra,
        }
    }

    pub fn to_entry(&self) -> VoteEntry {
        VoteEntry {
            day: self.day.clone(),
            start: self.start.clone(),
            end: self.end.clone(),
            status: self.status.clone(),
            extra: self.extra.clone(),
        }
    }
}

/// Request body for submitting one user's votes.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitVotesRequest {
    pub username: String,
    pub votes: Vec<VoteEntry>,
}

/// Parse an `HH:00` time into its hour.
pub fn parse_hour(value: &str) -> Option<u32> {
    let (hour, minute) = value.split_once(':')?;
    if hour.len() != 2 || minute != "00" {
        return None;
    }
    hour.parse::<u32>().ok().filter(|h| *h <= 24)
}

impl VoteEntry {
    /// Check the day format, the hour range and the status.
    pub fn validate(&self) -> Result<(), String> {
        if let VoteStatus::Other(status) = &self.status {
            return Err(format!(
                "Invalid status '{}', expected present, online or unavailable",
                status
            ));
        }
        NaiveDate::parse_from_str(&self.day, "%Y-%m-%d")
            .map_err(|_| format!("Invalid day '{}', expected YYYY-MM-DD", self.day))?;
        let start = parse_hour(&self.start)
            .ok_or_else(|| format!("Invalid start '{}', expected HH:00", self.start))?;
        let end = parse_hour(&self.end)
            .ok_or_else(|| format!("Invalid end '{}', expected HH:00", self.end))?;
        if start >= end {
            return Err(format!(
                "Start {} must be before end {}",
                self.start, self.end
            ));
        }
        Ok(())
    }
}

/// Count, per calendar hour, the users marked present or online on `day`.
pub fn heatmap(votes: &[Vote], day: &str) -> BTreeMap<u32, u32> {
    let mut counts: BTreeMap<u32, u32> = (FIRST_HOUR..=LAST_HOUR).map(|h| (h, 0)).collect();

    for vote in votes
        .iter()
        .filter(|v| v.day == day && v.status.is_available())
    {
        let (Some(start), Some(end)) = (parse_hour(&vote.start), parse_hour(&vote.end)) else {
            continue;
        };
        for hour in start..end {
            if let Some(count) = counts.get_mut(&hour) {
                *count += 1;
            }
        }
    }

    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(username: &str, start: &str, end: &str, status: VoteStatus) -> Vote {
        Vote {
            username: username.to_string(),
            day: "2024-06-01".to_string(),
            start: start.to_string(),
            end: end.to_string(),
            status,
            extra: Map::new(),
        }
    }

    #[test]
    fn test_status_defaults_to_present() {
        let entry: VoteEntry =
            serde_json::from_str(r#"{"day":"2024-06-01","start":"10:00","end":"12:00"}"#).unwrap();
        assert_eq!(entry.status, VoteStatus::Present);
    }

    #[test]
    fn test_unknown_status_and_fields_are_kept() {
        let raw = serde_json::json!({
            "day": "2024-06-01", "start": "10:00", "end": "12:00",
            "status": "maybe", "comment": "after work"
        });
        let entry: VoteEntry = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(entry.status, VoteStatus::Other("maybe".to_string()));
        assert!(!entry.status.is_available());
        assert!(entry.validate().is_err());
        assert_eq!(serde_json::to_value(&entry).unwrap(), raw);
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        let mut entry = vote("Anna", "10:00", "12:00", VoteStatus::Present).to_entry();
        assert!(entry.validate().is_ok());

        entry.start = "12:00".to_string();
        assert!(entry.validate().is_err());

        entry.start = "10:30".to_string();
        assert!(entry.validate().is_err());

        entry.start = "10:00".to_string();
        entry.day = "01.06.2024".to_string();
        assert!(entry.validate().is_err());
    }

    #[test]
    fn test_heatmap_counts_available_users() {
        let votes = vec![
            vote("Anna", "10:00", "12:00", VoteStatus::Present),
            vote("Ben", "11:00", "13:00", VoteStatus::Online),
            vote("Cleo", "10:00", "14:00", VoteStatus::Unavailable),
        ];

        let map = heatmap(&votes, "2024-06-01");
        assert_eq!(map[&10], 1);
        assert_eq!(map[&11], 2);
        assert_eq!(map[&12], 1);
        assert_eq!(map[&13], 0);
        assert_eq!(map.len(), (LAST_HOUR - FIRST_HOUR + 1) as usize);

        let other_day = heatmap(&votes, "2024-06-02");
        assert!(other_day.values().all(|c| *c == 0));
    }
}
