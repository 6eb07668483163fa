use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BloodRequestRow {
    pub request_id: String,
    pub recipient_user_id: String,
    pub blood_type: String,
    pub units: i64,
    pub urgency_level: String,
    pub hospital_name: String,
    pub hospital_address: String,
    pub hospital_longitude: f64,
    pub hospital_latitude: f64,
    pub status: String,
    pub needed_by: DateTime<Utc>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

// Matched donor joined with the donor profile and user contact details.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MatchedDonorRow {
    pub request_id: String,
    pub donor_id: String,
    pub status: String,
    pub contacted_at: DateTime<Utc>,
    pub response_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub donor_blood_type: String,
    pub donor_longitude: f64,
    pub donor_latitude: f64,
    pub donor_user_name: String,
    pub donor_user_email: String,
    pub donor_user_phone: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyLevel {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

text_enum!(UrgencyLevel, "urgency level", {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    #[default]
    Pending,
    Matched,
    Fulfilled,
    Cancelled,
}

text_enum!(RequestStatus, "request status", {
    Pending => "pending",
    Matched => "matched",
    Fulfilled => "fulfilled",
    Cancelled => "cancelled",
});

impl RequestStatus {
    pub fn is_closed(&self) -> bool {
        matches!(self, RequestStatus::Fulfilled | RequestStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Contacted,
    Confirmed,
    Donated,
    Cancelled,
}

text_enum!(MatchStatus, "match status", {
    Contacted => "contacted",
    Confirmed => "confirmed",
    Donated => "donated",
    Cancelled => "cancelled",
});

impl MatchStatus {
    /// contacted -> confirmed -> donated, with cancellation from any open state.
    pub fn can_transition_to(&self, next: MatchStatus) -> bool {
        matches!(
            (self, next),
            (MatchStatus::Contacted, MatchStatus::Confirmed)
                | (MatchStatus::Contacted, MatchStatus::Cancelled)
                | (MatchStatus::Confirmed, MatchStatus::Donated)
                | (MatchStatus::Confirmed, MatchStatus::Cancelled)
        )
    }
}
