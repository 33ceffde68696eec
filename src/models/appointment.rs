//! Scheduled viewings and their comment threads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Whether an appointment happens in the flat or over video.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum AppointmentType {
    #[default]
    #[serde(rename = "Vor Ort")]
    VorOrt,
    #[serde(rename = "Online")]
    Online,
    #[serde(untagged)]
    Other(String),
}

impl AppointmentType {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            AppointmentType::Other(value) => Err(format!(
                "Invalid type '{}', expected 'Vor Ort' or 'Online'",
                value
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comment {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub text: String,
    pub timestamp: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    pub title: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(rename = "type", default)]
    pub kind: AppointmentType,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Request body for creating an appointment.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppointmentRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(rename = "type", default)]
    pub kind: AppointmentType,
}

impl CreateAppointmentRequest {
    /// Build the appointment, assigning a fresh id unless the client supplied one.
    pub fn into_appointment(self) -> Appointment {
        Appointment {
            id: self
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            title: self.title,
            date: self.date,
            start_time: self.start_time,
            end_time: self.end_time,
            kind: self.kind,
            comments: Vec::new(),
            extra: Map::new(),
        }
    }
}

/// Request body for a partial appointment update. Comments are not editable here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAppointmentRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<AppointmentType>,
}

impl UpdateAppointmentRequest {
    pub fn apply(&self, appointment: &mut Appointment) {
        if let Some(title) = &self.title {
            appointment.title = title.clone();
        }
        if let Some(date) = &self.date {
            appointment.date = date.clone();
        }
        if let Some(start) = &self.start_time {
            appointment.start_time = start.clone();
        }
        if let Some(end) = &self.end_time {
            appointment.end_time = end.clone();
        }
        if let Some(kind) = &self.kind {
            appointment.kind = kind.clone();
        }
    }
}

/// Request body for appending a comment.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCommentRequest {
    #[serde(default)]
    pub author: Option<String>,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_uses_display_names() {
        let appointment: Appointment = serde_json::from_str(
            r#"{"id":"a1","title":"Besichtigung","date":"2024-06-01","startTime":"18:00","endTime":"19:00","type":"Vor Ort"}"#,
        )
        .unwrap();
        assert_eq!(appointment.kind, AppointmentType::VorOrt);
        assert!(appointment.comments.is_empty());

        let json = serde_json::to_value(&appointment).unwrap();
        assert_eq!(json["type"], "Vor Ort");
        assert_eq!(json["startTime"], "18:00");
    }

    #[test]
    fn test_unknown_type_and_fields_round_trip() {
        let raw = serde_json::json!({
            "id": "a1",
            "title": "Telefonat",
            "date": "2024-06-01",
            "startTime": "18:00",
            "endTime": "18:30",
            "type": "Telefon",
            "comments": [{ "id": "k1", "text": "ok", "timestamp": 1, "edited": false }],
            "location": "Küche"
        });
        let appointment: Appointment = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(appointment.kind, AppointmentType::Other("Telefon".to_string()));
        assert!(appointment.kind.validate().is_err());
        assert_eq!(serde_json::to_value(&appointment).unwrap(), raw);
    }

    #[test]
    fn test_create_assigns_unique_ids() {
        let request = CreateAppointmentRequest {
            id: None,
            title: "Call".to_string(),
            date: "2024-06-01".to_string(),
            start_time: "10:00".to_string(),
            end_time: "10:30".to_string(),
            kind: AppointmentType::Online,
        };
        let a = request.clone().into_appointment();
        let b = request.into_appointment();
        assert_ne!(a.id, b.id);
    }
}
