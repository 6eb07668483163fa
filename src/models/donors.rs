use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DonorRow {
    pub donor_id: String,
    pub user_id: String,
    pub blood_type: String,
    pub longitude: f64,
    pub latitude: f64,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub last_donated: Option<DateTime<Utc>>,
    /// JSON array of strings.
    pub medical_conditions: String,
    /// JSON array of strings.
    pub medications: String,
    pub is_eligible: bool,
    pub availability: bool,
    pub created_at: DateTime<Utc>,
}

// Donor joined with the owning user's contact details.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DonorContactRow {
    #[sqlx(flatten)]
    pub donor: DonorRow,
    pub user_name: String,
    pub user_email: String,
    pub user_phone: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DonationRow {
    pub donation_id: String,
    pub donor_id: String,
    pub donated_at: DateTime<Utc>,
    pub recipient_user_id: Option<String>,
    pub hospital: Option<String>,
    pub notes: Option<String>,
}
