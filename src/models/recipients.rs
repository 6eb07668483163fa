use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RecipientRow {
    pub recipient_id: String,
    pub user_id: String,
    pub blood_type: String,
    pub longitude: f64,
    pub latitude: f64,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub medical_conditions: String,
    pub medications: String,
    pub created_at: DateTime<Utc>,
}
