use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::database::{recipient_repo, user_repo};
use crate::error::{AppError, Result};
use crate::models::{encode_string_list, parse_string_list, BloodType, RecipientRow};
use crate::services::auth_service::UserSummary;
use crate::services::profile_input::{
    clean_list, parse_blood_type, LocatedRow, Location, LocationInput,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientMedicalInput {
    pub medical_conditions: Option<Vec<String>>,
    pub medications: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientInput {
    pub blood_type: Option<String>,
    pub location: Option<LocationInput>,
    pub medical_info: Option<RecipientMedicalInput>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientMedicalView {
    pub medical_conditions: Vec<String>,
    pub medications: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientView {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSummary>,
    pub blood_type: BloodType,
    pub location: Location,
    pub medical_info: RecipientMedicalView,
    pub created_at: DateTime<Utc>,
}

impl RecipientView {
    fn from_row(row: RecipientRow, user: Option<UserSummary>) -> Result<Self> {
        Ok(Self {
            blood_type: row.blood_type.parse()?,
            location: row.location(),
            medical_info: RecipientMedicalView {
                medical_conditions: parse_string_list(&row.medical_conditions),
                medications: parse_string_list(&row.medications),
            },
            created_at: row.created_at,
            id: row.recipient_id,
            user,
        })
    }
}

fn apply_medical_info(row: &mut RecipientRow, info: RecipientMedicalInput) {
    if let Some(conditions) = info.medical_conditions {
        row.medical_conditions = encode_string_list(&clean_list(conditions));
    }
    if let Some(medications) = info.medications {
        row.medications = encode_string_list(&clean_list(medications));
    }
}

pub async fn register_recipient(
    pool: &SqlitePool,
    user_id: &str,
    input: RecipientInput,
) -> Result<RecipientView> {
    if recipient_repo::load_recipient_by_user(pool, user_id)
        .await?
        .is_some()
    {
        return Err(AppError::bad_request("Recipient profile already exists"));
    }

    let blood_type = parse_blood_type(input.blood_type.as_deref(), "Please provide blood type")?;
    let location = input
        .location
        .ok_or_else(|| AppError::bad_request("Please provide your location"))?
        .into_location()?;

    let mut row = RecipientRow {
        recipient_id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        blood_type: blood_type.as_str().to_string(),
        longitude: 0.0,
        latitude: 0.0,
        address: String::new(),
        city: String::new(),
        state: String::new(),
        zip_code: String::new(),
        medical_conditions: "[]".to_string(),
        medications: "[]".to_string(),
        created_at: Utc::now(),
    };
    row.set_location(location);
    if let Some(info) = input.medical_info {
        apply_medical_info(&mut row, info);
    }

    recipient_repo::insert_recipient(pool, &row)
        .await
        .map_err(|e| AppError::unique_violation(e, "Recipient profile already exists"))?;
    info!(recipient_id = %row.recipient_id, user_id = %user_id, "recipient registered");
    RecipientView::from_row(row, None)
}

async fn require_recipient(pool: &SqlitePool, user_id: &str) -> Result<RecipientRow> {
    recipient_repo::load_recipient_by_user(pool, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("Recipient profile not found"))
}

pub async fn load_recipient_profile(pool: &SqlitePool, user_id: &str) -> Result<RecipientView> {
    let row = require_recipient(pool, user_id).await?;
    let user = user_repo::load_user(pool, user_id)
        .await?
        .map(|u| UserSummary::from(&u));
    RecipientView::from_row(row, user)
}

pub async fn update_recipient_profile(
    pool: &SqlitePool,
    user_id: &str,
    input: RecipientInput,
) -> Result<RecipientView> {
    let mut row = require_recipient(pool, user_id).await?;

    if let Some(raw) = input.blood_type.as_deref() {
        row.blood_type = parse_blood_type(Some(raw), "Please provide blood type")?
            .as_str()
            .to_string();
    }
    if let Some(location_input) = input.location {
        let mut location = row.location();
        location_input.apply_to(&mut location)?;
        row.set_location(location);
    }
    if let Some(info) = input.medical_info {
        apply_medical_info(&mut row, info);
    }

    recipient_repo::update_recipient(pool, &row).await?;
    info!(recipient_id = %row.recipient_id, "recipient profile updated");
    load_recipient_profile(pool, user_id).await
}
