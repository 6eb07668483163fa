use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::database::{donor_repo, user_repo};
use crate::error::{AppError, Result};
use crate::models::{
    encode_string_list, parse_string_list, BloodType, DonationRow, DonorContactRow, DonorRow,
    GeoPoint,
};
use crate::services::auth_service::UserSummary;
use crate::services::geo_service::{bounding_box, haversine_km};
use crate::services::profile_input::{
    clean_list, parse_blood_type, parse_datetime_field, LocatedRow, Location, LocationInput,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalInfoInput {
    pub last_donated: Option<String>,
    pub medical_conditions: Option<Vec<String>>,
    pub medications: Option<Vec<String>>,
    pub is_eligible: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDonorInput {
    pub blood_type: Option<String>,
    pub location: Option<LocationInput>,
    pub medical_info: Option<MedicalInfoInput>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDonorInput {
    pub blood_type: Option<String>,
    pub location: Option<LocationInput>,
    pub medical_info: Option<MedicalInfoInput>,
    pub availability: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalInfoView {
    pub last_donated: Option<DateTime<Utc>>,
    pub medical_conditions: Vec<String>,
    pub medications: Vec<String>,
    pub is_eligible: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationView {
    pub id: String,
    pub date: DateTime<Utc>,
    pub recipient: Option<String>,
    pub hospital: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorView {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSummary>,
    pub blood_type: BloodType,
    pub location: Location,
    pub medical_info: MedicalInfoView,
    pub availability: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub donation_history: Option<Vec<DonationView>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyDonorView {
    #[serde(flatten)]
    pub donor: DonorView,
    pub distance_km: f64,
}

/// A matchable donor and its distance from the search centre.
#[derive(Debug, Clone)]
pub struct RankedDonor {
    pub contact: DonorContactRow,
    pub distance_km: f64,
}

impl From<DonationRow> for DonationView {
    fn from(row: DonationRow) -> Self {
        Self {
            id: row.donation_id,
            date: row.donated_at,
            recipient: row.recipient_user_id,
            hospital: row.hospital,
            notes: row.notes,
        }
    }
}

impl DonorView {
    pub fn from_row(
        row: DonorRow,
        user: Option<UserSummary>,
        history: Option<Vec<DonationRow>>,
    ) -> Result<Self> {
        Ok(Self {
            blood_type: row.blood_type.parse()?,
            location: row.location(),
            medical_info: MedicalInfoView {
                last_donated: row.last_donated,
                medical_conditions: parse_string_list(&row.medical_conditions),
                medications: parse_string_list(&row.medications),
                is_eligible: row.is_eligible,
            },
            availability: row.availability,
            donation_history: history.map(|h| h.into_iter().map(DonationView::from).collect()),
            created_at: row.created_at,
            id: row.donor_id,
            user,
        })
    }
}

fn apply_medical_info(row: &mut DonorRow, info: MedicalInfoInput) -> Result<()> {
    if let Some(last_donated) = parse_datetime_field(info.last_donated.as_deref(), "lastDonated")? {
        row.last_donated = Some(last_donated);
    }
    if let Some(conditions) = info.medical_conditions {
        row.medical_conditions = encode_string_list(&clean_list(conditions));
    }
    if let Some(medications) = info.medications {
        row.medications = encode_string_list(&clean_list(medications));
    }
    if let Some(is_eligible) = info.is_eligible {
        row.is_eligible = is_eligible;
    }
    Ok(())
}

pub async fn register_donor(
    pool: &SqlitePool,
    user_id: &str,
    input: RegisterDonorInput,
) -> Result<DonorView> {
    if donor_repo::load_donor_by_user(pool, user_id).await?.is_some() {
        return Err(AppError::bad_request("Donor profile already exists"));
    }

    let blood_type = parse_blood_type(input.blood_type.as_deref(), "Please provide blood type")?;
    let location = input
        .location
        .ok_or_else(|| AppError::bad_request("Please provide your location"))?
        .into_location()?;

    let mut row = DonorRow {
        donor_id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        blood_type: blood_type.as_str().to_string(),
        longitude: 0.0,
        latitude: 0.0,
        address: String::new(),
        city: String::new(),
        state: String::new(),
        zip_code: String::new(),
        last_donated: None,
        medical_conditions: "[]".to_string(),
        medications: "[]".to_string(),
        is_eligible: true,
        availability: true,
        created_at: Utc::now(),
    };
    row.set_location(location);
    if let Some(info) = input.medical_info {
        apply_medical_info(&mut row, info)?;
    }

    donor_repo::insert_donor(pool, &row)
        .await
        .map_err(|e| AppError::unique_violation(e, "Donor profile already exists"))?;
    info!(
        donor_id = %row.donor_id,
        user_id = %user_id,
        blood_type = %blood_type,
        "donor registered"
    );

    DonorView::from_row(row, None, Some(Vec::new()))
}

async fn require_donor(pool: &SqlitePool, user_id: &str) -> Result<DonorRow> {
    donor_repo::load_donor_by_user(pool, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("Donor profile not found"))
}

pub async fn load_donor_profile(pool: &SqlitePool, user_id: &str) -> Result<DonorView> {
    let row = require_donor(pool, user_id).await?;
    let user = user_repo::load_user(pool, user_id)
        .await?
        .map(|u| UserSummary::from(&u));
    let history = donor_repo::list_donations(pool, &row.donor_id).await?;
    DonorView::from_row(row, user, Some(history))
}

pub async fn update_donor_profile(
    pool: &SqlitePool,
    user_id: &str,
    input: UpdateDonorInput,
) -> Result<DonorView> {
    let mut row = require_donor(pool, user_id).await?;

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
        apply_medical_info(&mut row, info)?;
    }
    if let Some(availability) = input.availability {
        row.availability = availability;
    }

    donor_repo::update_donor(pool, &row).await?;
    info!(donor_id = %row.donor_id, "donor profile updated");
    load_donor_profile(pool, user_id).await
}

pub async fn update_availability(
    pool: &SqlitePool,
    user_id: &str,
    availability: bool,
) -> Result<DonorView> {
    let mut row = require_donor(pool, user_id).await?;
    donor_repo::update_availability(pool, &row.donor_id, availability).await?;
    row.availability = availability;
    info!(donor_id = %row.donor_id, availability, "donor availability changed");
    DonorView::from_row(row, None, None)
}

/// Available and eligible donors within `radius_km` of `center`, nearest first.
pub async fn find_eligible_donors_near(
    pool: &SqlitePool,
    center: GeoPoint,
    radius_km: f64,
    blood_type: Option<BloodType>,
) -> Result<Vec<RankedDonor>> {
    let bbox = bounding_box(center, radius_km);
    let rows = donor_repo::load_match_candidates(pool, bbox, blood_type.map(|t| t.as_str())).await?;

    let mut ranked: Vec<RankedDonor> = rows
        .into_iter()
        .filter_map(|contact| {
            let position = GeoPoint::new(contact.donor.longitude, contact.donor.latitude);
            let distance_km = haversine_km(center, position);
            (distance_km <= radius_km).then_some(RankedDonor {
                contact,
                distance_km,
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        a.distance_km
            .partial_cmp(&b.distance_km)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.contact.donor.donor_id.cmp(&b.contact.donor.donor_id))
    });
    Ok(ranked)
}

pub async fn nearby_donors(
    pool: &SqlitePool,
    center: GeoPoint,
    radius_km: f64,
    blood_type: Option<BloodType>,
) -> Result<Vec<NearbyDonorView>> {
    if !center.is_valid() {
        return Err(AppError::bad_request(
            "Longitude must be within [-180, 180] and latitude within [-90, 90]",
        ));
    }
    if !radius_km.is_finite() || radius_km <= 0.0 {
        return Err(AppError::bad_request("Distance must be a positive number of kilometres"));
    }

    find_eligible_donors_near(pool, center, radius_km, blood_type)
        .await?
        .into_iter()
        .map(|ranked| {
            let user = UserSummary {
                name: ranked.contact.user_name,
                email: ranked.contact.user_email,
                phone: ranked.contact.user_phone,
            };
            Ok(NearbyDonorView {
                donor: DonorView::from_row(ranked.contact.donor, Some(user), None)?,
                distance_km: (ranked.distance_km * 100.0).round() / 100.0,
            })
        })
        .collect()
}
