use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::{blood_request_repo, donor_repo};
use crate::error::{AppError, Result};
use crate::models::{
    BloodRequestRow, BloodType, DonorContactRow, GeoPoint, MatchStatus, MatchedDonorRow,
    RequestStatus, UrgencyLevel,
};
use crate::services::auth_service::UserSummary;
use crate::services::donor_service::{self, RankedDonor};
use crate::services::notification_service::{notify_donor, DonationRequestNotice, Notifier};
use crate::services::profile_input::{
    optional_text, parse_blood_type, parse_datetime_field, parse_point, required_text,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HospitalLocationInput {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub coordinates: Option<[f64; 2]>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HospitalInput {
    pub name: Option<String>,
    pub address: Option<String>,
    pub location: Option<HospitalLocationInput>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBloodRequestInput {
    pub blood_type: Option<String>,
    pub units: Option<i64>,
    pub urgency_level: Option<String>,
    pub hospital: Option<HospitalInput>,
    pub needed_by: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchStatusInput {
    pub status: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HospitalView {
    pub name: String,
    pub address: String,
    pub location: GeoPoint,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedDonorSummary {
    pub id: String,
    pub blood_type: BloodType,
    pub location: GeoPoint,
    pub user: UserSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedDonorView {
    pub donor: MatchedDonorSummary,
    pub status: MatchStatus,
    pub contacted_at: DateTime<Utc>,
    pub response_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BloodRequestView {
    pub id: String,
    pub recipient: String,
    pub blood_type: BloodType,
    pub units: i64,
    pub urgency_level: UrgencyLevel,
    pub hospital: HospitalView,
    pub status: RequestStatus,
    pub needed_by: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_donors: Option<Vec<MatchedDonorView>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// A request as seen by one of its matched donors: other donors are not exposed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorRequestView {
    #[serde(flatten)]
    pub request: BloodRequestView,
    pub match_status: MatchStatus,
    pub contacted_at: DateTime<Utc>,
    pub response_at: Option<DateTime<Utc>>,
}

impl MatchedDonorView {
    fn from_row(row: MatchedDonorRow) -> Result<Self> {
        Ok(Self {
            status: row.status.parse()?,
            donor: MatchedDonorSummary {
                blood_type: row.donor_blood_type.parse()?,
                location: GeoPoint::new(row.donor_longitude, row.donor_latitude),
                user: UserSummary {
                    name: row.donor_user_name,
                    email: row.donor_user_email,
                    phone: row.donor_user_phone,
                },
                id: row.donor_id,
            },
            contacted_at: row.contacted_at,
            response_at: row.response_at,
            notes: row.notes,
        })
    }
}

impl BloodRequestView {
    fn from_row(row: BloodRequestRow, matched: Option<Vec<MatchedDonorRow>>) -> Result<Self> {
        let matched_donors = match matched {
            Some(rows) => Some(
                rows.into_iter()
                    .map(MatchedDonorView::from_row)
                    .collect::<Result<Vec<_>>>()?,
            ),
            None => None,
        };
        Ok(Self {
            blood_type: row.blood_type.parse()?,
            urgency_level: row.urgency_level.parse()?,
            status: row.status.parse()?,
            hospital: HospitalView {
                name: row.hospital_name,
                address: row.hospital_address,
                location: GeoPoint::new(row.hospital_longitude, row.hospital_latitude),
            },
            id: row.request_id,
            recipient: row.recipient_user_id,
            units: row.units,
            needed_by: row.needed_by,
            matched_donors,
            notes: row.notes,
            created_at: row.created_at,
            closed_at: row.closed_at,
        })
    }
}

struct ValidatedRequest {
    blood_type: BloodType,
    units: i64,
    urgency_level: UrgencyLevel,
    hospital_name: String,
    hospital_address: String,
    hospital_location: GeoPoint,
    needed_by: DateTime<Utc>,
    notes: Option<String>,
}

fn validate_request(
    input: CreateBloodRequestInput,
    now: DateTime<Utc>,
) -> Result<ValidatedRequest> {
    let blood_type =
        parse_blood_type(input.blood_type.as_deref(), "Please provide blood type needed")?;

    let units = input
        .units
        .ok_or_else(|| AppError::bad_request("Please specify how many units needed"))?;
    if units < 1 {
        return Err(AppError::bad_request("At least 1 unit must be requested"));
    }

    let urgency_level = match optional_text(input.urgency_level) {
        Some(raw) => raw
            .parse()
            .map_err(|_| AppError::bad_request(format!("Invalid urgency level '{raw}'")))?,
        None => UrgencyLevel::default(),
    };

    let hospital = input
        .hospital
        .ok_or_else(|| AppError::bad_request("Please provide hospital details"))?;
    let hospital_name = required_text(hospital.name, "Please provide hospital name")?;
    let hospital_address = required_text(hospital.address, "Please provide hospital address")?;
    let location = hospital.location.unwrap_or_default();
    let hospital_location = parse_point(location.kind.as_deref(), location.coordinates)?
        .ok_or_else(|| AppError::bad_request("Please provide hospital location coordinates"))?;

    let needed_by = parse_datetime_field(input.needed_by.as_deref(), "neededBy")?.ok_or_else(|| {
        AppError::bad_request("Please provide the date by which blood is needed")
    })?;
    let start_of_today = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|d| d.and_utc())
        .unwrap_or(now);
    if needed_by < start_of_today {
        return Err(AppError::bad_request("neededBy must not be in the past"));
    }

    Ok(ValidatedRequest {
        blood_type,
        units,
        urgency_level,
        hospital_name,
        hospital_address,
        hospital_location,
        needed_by,
        notes: optional_text(input.notes),
    })
}

/// Stores the request, notifies every eligible donor of the same blood type near the
/// hospital, and records the donors that were reached as `contacted`.
pub async fn create_blood_request(
    pool: &SqlitePool,
    notifier: &dyn Notifier,
    match_radius_km: f64,
    recipient_user_id: &str,
    input: CreateBloodRequestInput,
) -> Result<BloodRequestView> {
    let now = Utc::now();
    let req = validate_request(input, now)?;

    let row = BloodRequestRow {
        request_id: Uuid::new_v4().to_string(),
        recipient_user_id: recipient_user_id.to_string(),
        blood_type: req.blood_type.as_str().to_string(),
        units: req.units,
        urgency_level: req.urgency_level.as_str().to_string(),
        hospital_name: req.hospital_name.clone(),
        hospital_address: req.hospital_address.clone(),
        hospital_longitude: req.hospital_location.longitude,
        hospital_latitude: req.hospital_location.latitude,
        status: RequestStatus::Pending.as_str().to_string(),
        needed_by: req.needed_by,
        notes: req.notes.clone(),
        created_at: now,
        closed_at: None,
    };

    let mut conn = pool.acquire().await?;
    blood_request_repo::insert_request(&mut conn, &row).await?;
    drop(conn);

    let candidates = donor_service::find_eligible_donors_near(
        pool,
        req.hospital_location,
        match_radius_km,
        Some(req.blood_type),
    )
    .await?;

    let contacted = notify_candidates(notifier, &req, &candidates).await;

    let mut tx = pool.begin().await?;
    for (position, donor) in contacted.iter().enumerate() {
        blood_request_repo::insert_matched_donor(
            &mut tx,
            &row.request_id,
            &donor.contact.donor.donor_id,
            donor.contacted_at,
            position as i64,
        )
        .await?;
    }
    tx.commit().await?;

    info!(
        request_id = %row.request_id,
        blood_type = %req.blood_type,
        urgency = %req.urgency_level,
        candidates = candidates.len(),
        contacted = contacted.len(),
        "blood request created"
    );

    load_request_view(pool, &row.request_id).await
}

struct ContactedDonor<'a> {
    contact: &'a DonorContactRow,
    contacted_at: DateTime<Utc>,
}

async fn notify_candidates<'a>(
    notifier: &dyn Notifier,
    req: &ValidatedRequest,
    candidates: &'a [RankedDonor],
) -> Vec<ContactedDonor<'a>> {
    let mut contacted = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let contact = &candidate.contact;
        let donor_blood_type = contact.donor.blood_type.parse().unwrap_or(req.blood_type);
        let notice = DonationRequestNotice {
            donor_name: &contact.user_name,
            donor_blood_type,
            blood_type: req.blood_type,
            hospital_name: &req.hospital_name,
            hospital_address: &req.hospital_address,
            units: req.units,
            needed_by: req.needed_by,
        };

        let outcome = notify_donor(
            notifier,
            &notice,
            &contact.donor.donor_id,
            &contact.user_email,
            contact.user_phone.as_deref(),
        )
        .await;

        if outcome.reached() {
            contacted.push(ContactedDonor {
                contact,
                contacted_at: Utc::now(),
            });
        } else {
            warn!(
                donor_id = %contact.donor.donor_id,
                distance_km = candidate.distance_km,
                "donor could not be reached on any channel"
            );
        }
    }

    contacted
}

async fn load_request_view(pool: &SqlitePool, request_id: &str) -> Result<BloodRequestView> {
    let row = blood_request_repo::load_request(pool, request_id)
        .await?
        .ok_or_else(|| AppError::not_found("Blood request not found"))?;
    let matched = blood_request_repo::list_matched_donors(pool, request_id).await?;
    BloodRequestView::from_row(row, Some(matched))
}

pub async fn list_recipient_requests(
    pool: &SqlitePool,
    recipient_user_id: &str,
) -> Result<Vec<BloodRequestView>> {
    let rows = blood_request_repo::list_requests_for_recipient(pool, recipient_user_id).await?;
    let mut views = Vec::with_capacity(rows.len());
    for row in rows {
        let matched = blood_request_repo::list_matched_donors(pool, &row.request_id).await?;
        views.push(BloodRequestView::from_row(row, Some(matched))?);
    }
    Ok(views)
}

pub async fn list_donor_requests(
    pool: &SqlitePool,
    donor_user_id: &str,
) -> Result<Vec<DonorRequestView>> {
    let donor = donor_repo::load_donor_by_user(pool, donor_user_id)
        .await?
        .ok_or_else(|| AppError::not_found("Donor profile not found"))?;

    let rows = blood_request_repo::list_requests_for_donor(pool, &donor.donor_id).await?;
    let mut views = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(own) =
            blood_request_repo::load_matched_donor(pool, &row.request_id, &donor.donor_id).await?
        else {
            continue;
        };
        views.push(DonorRequestView {
            request: BloodRequestView::from_row(row, None)?,
            match_status: own.status.parse()?,
            contacted_at: own.contacted_at,
            response_at: own.response_at,
        });
    }
    Ok(views)
}

fn parse_target_status(input: &MatchStatusInput, allowed: &[MatchStatus]) -> Result<MatchStatus> {
    let raw = input
        .status
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::bad_request("Please provide a status"))?;
    let status: MatchStatus = raw
        .parse()
        .map_err(|_| AppError::bad_request(format!("Invalid status '{raw}'")))?;
    if !allowed.contains(&status) {
        let allowed: Vec<&str> = allowed.iter().map(|s| s.as_str()).collect();
        return Err(AppError::bad_request(format!(
            "Status must be one of: {}",
            allowed.join(", ")
        )));
    }
    Ok(status)
}

/// Moves one matched donor along its lifecycle and derives the request status from it.
async fn transition_match(
    pool: &SqlitePool,
    request: &BloodRequestRow,
    donor_id: &str,
    next: MatchStatus,
    notes: Option<String>,
) -> Result<()> {
    let request_status: RequestStatus = request.status.parse()?;
    if request_status.is_closed() {
        return Err(AppError::bad_request(format!(
            "Blood request is already {request_status}"
        )));
    }

    let current = blood_request_repo::load_matched_donor(pool, &request.request_id, donor_id)
        .await?
        .ok_or_else(|| AppError::not_found("Donor is not matched to this request"))?;
    let current_status: MatchStatus = current.status.parse()?;
    if !current_status.can_transition_to(next) {
        return Err(AppError::bad_request(format!(
            "Invalid status transition from {current_status} to {next}"
        )));
    }

    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let updated = blood_request_repo::update_match_status(
        &mut tx,
        &request.request_id,
        donor_id,
        current_status.as_str(),
        next.as_str(),
        now,
        notes.as_deref(),
    )
    .await?;
    if updated == 0 {
        return Err(AppError::bad_request(
            "Match status changed concurrently, please retry",
        ));
    }

    match next {
        MatchStatus::Confirmed if request_status == RequestStatus::Pending => {
            blood_request_repo::update_request_status(
                &mut tx,
                &request.request_id,
                RequestStatus::Matched.as_str(),
                None,
            )
            .await?;
        }
        MatchStatus::Donated => {
            let donation_id = Uuid::new_v4().to_string();
            donor_repo::insert_donation(
                &mut tx,
                donor_repo::NewDonation {
                    donation_id: &donation_id,
                    donor_id,
                    donated_at: now,
                    recipient_user_id: Some(&request.recipient_user_id),
                    hospital: Some(&request.hospital_name),
                    notes: notes.as_deref(),
                },
            )
            .await?;

            let donated = blood_request_repo::count_matches_with_status(
                &mut tx,
                &request.request_id,
                MatchStatus::Donated.as_str(),
            )
            .await?;
            if donated >= request.units {
                blood_request_repo::update_request_status(
                    &mut tx,
                    &request.request_id,
                    RequestStatus::Fulfilled.as_str(),
                    Some(now),
                )
                .await?;
                let released =
                    blood_request_repo::cancel_open_matches(&mut tx, &request.request_id, now)
                        .await?;
                info!(
                    request_id = %request.request_id,
                    donated,
                    released,
                    "blood request fulfilled"
                );
            }
        }
        _ => {}
    }

    tx.commit().await?;
    info!(
        request_id = %request.request_id,
        donor_id = %donor_id,
        from = %current_status,
        to = %next,
        "matched donor status changed"
    );
    Ok(())
}

/// A donor confirms or declines a request they were contacted about.
pub async fn respond_as_donor(
    pool: &SqlitePool,
    donor_user_id: &str,
    request_id: &str,
    input: MatchStatusInput,
) -> Result<DonorRequestView> {
    let next = parse_target_status(&input, &[MatchStatus::Confirmed, MatchStatus::Cancelled])?;
    let donor = donor_repo::load_donor_by_user(pool, donor_user_id)
        .await?
        .ok_or_else(|| AppError::not_found("Donor profile not found"))?;
    let request = blood_request_repo::load_request(pool, request_id)
        .await?
        .ok_or_else(|| AppError::not_found("Blood request not found"))?;

    transition_match(
        pool,
        &request,
        &donor.donor_id,
        next,
        optional_text(input.notes),
    )
    .await?;

    let refreshed = blood_request_repo::load_request(pool, request_id)
        .await?
        .ok_or_else(|| AppError::not_found("Blood request not found"))?;
    let own = blood_request_repo::load_matched_donor(pool, request_id, &donor.donor_id)
        .await?
        .ok_or_else(|| AppError::not_found("Donor is not matched to this request"))?;
    Ok(DonorRequestView {
        request: BloodRequestView::from_row(refreshed, None)?,
        match_status: own.status.parse()?,
        contacted_at: own.contacted_at,
        response_at: own.response_at,
    })
}

async fn require_owned_request(
    pool: &SqlitePool,
    recipient_user_id: &str,
    request_id: &str,
) -> Result<BloodRequestRow> {
    let request = blood_request_repo::load_request(pool, request_id)
        .await?
        .ok_or_else(|| AppError::not_found("Blood request not found"))?;
    if request.recipient_user_id != recipient_user_id {
        return Err(AppError::Forbidden(
            "Not authorized to modify this blood request".to_string(),
        ));
    }
    Ok(request)
}

/// The requesting recipient records a donation or drops a donor.
pub async fn update_match_as_recipient(
    pool: &SqlitePool,
    recipient_user_id: &str,
    request_id: &str,
    donor_id: &str,
    input: MatchStatusInput,
) -> Result<BloodRequestView> {
    let next = parse_target_status(&input, &[MatchStatus::Donated, MatchStatus::Cancelled])?;
    let request = require_owned_request(pool, recipient_user_id, request_id).await?;
    transition_match(pool, &request, donor_id, next, optional_text(input.notes)).await?;
    load_request_view(pool, request_id).await
}

pub async fn cancel_request(
    pool: &SqlitePool,
    recipient_user_id: &str,
    request_id: &str,
) -> Result<BloodRequestView> {
    let request = require_owned_request(pool, recipient_user_id, request_id).await?;
    let status: RequestStatus = request.status.parse()?;
    if status.is_closed() {
        return Err(AppError::bad_request(format!("Blood request is already {status}")));
    }

    let now = Utc::now();
    let mut tx = pool.begin().await?;
    let released = blood_request_repo::cancel_open_matches(&mut tx, request_id, now).await?;
    blood_request_repo::update_request_status(
        &mut tx,
        request_id,
        RequestStatus::Cancelled.as_str(),
        Some(now),
    )
    .await?;
    tx.commit().await?;

    info!(request_id = %request_id, released, "blood request cancelled");
    load_request_view(pool, request_id).await
}

pub async fn close_expired_requests(pool: &SqlitePool, now: DateTime<Utc>) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let closed = blood_request_repo::close_expired_requests(&mut tx, now).await?;
    tx.commit().await?;
    if closed > 0 {
        info!(closed, "expired blood requests closed");
    }
    Ok(closed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::connect_in_memory;
    use crate::database::user_repo::{insert_user, NewUser};
    use crate::services::donor_service::{register_donor, RegisterDonorInput};
    use crate::services::notification_service::LogNotifier;
    use crate::services::profile_input::LocationInput;
    use chrono::Duration;

    async fn seed_user(pool: &SqlitePool, user_id: &str, role: &str) {
        insert_user(
            pool,
            NewUser {
                user_id,
                name: user_id,
                email: &format!("{user_id}@example.com"),
                phone: Some("+15550100"),
                password_hash: "x",
                role,
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap();
    }

    async fn seed_donor(
        pool: &SqlitePool,
        user_id: &str,
        blood_type: &str,
        lon: f64,
        lat: f64,
    ) -> String {
        seed_user(pool, user_id, "donor").await;
        register_donor(
            pool,
            user_id,
            RegisterDonorInput {
                blood_type: Some(blood_type.into()),
                location: Some(LocationInput {
                    kind: None,
                    coordinates: Some([lon, lat]),
                    address: Some("addr".into()),
                    city: Some("city".into()),
                    state: Some("st".into()),
                    zip_code: Some("0000".into()),
                }),
                medical_info: None,
            },
        )
        .await
        .unwrap()
        .id
    }

    fn request_input(units: i64) -> CreateBloodRequestInput {
        CreateBloodRequestInput {
            blood_type: Some("O+".into()),
            units: Some(units),
            urgency_level: Some("high".into()),
            hospital: Some(HospitalInput {
                name: Some("General".into()),
                address: Some("1 Hospital Rd".into()),
                location: Some(HospitalLocationInput {
                    kind: Some("Point".into()),
                    coordinates: Some([4.9041, 52.3676]),
                }),
            }),
            needed_by: Some((Utc::now() + Duration::days(3)).to_rfc3339()),
            notes: None,
        }
    }

    fn status(s: &str) -> MatchStatusInput {
        MatchStatusInput {
            status: Some(s.into()),
            notes: None,
        }
    }

    #[test]
    fn validation_rejects_bad_requests() {
        let now = Utc::now();

        let mut zero = request_input(0);
        zero.units = Some(0);
        assert!(validate_request(zero, now).is_err());

        let mut past = request_input(1);
        past.needed_by = Some("2001-01-01".into());
        assert!(validate_request(past, now).is_err());

        let mut no_coords = request_input(1);
        no_coords.hospital.as_mut().unwrap().location = None;
        assert!(validate_request(no_coords, now).is_err());

        let mut urgency = request_input(1);
        urgency.urgency_level = Some("whenever".into());
        assert!(validate_request(urgency, now).is_err());

        let mut default_urgency = request_input(1);
        default_urgency.urgency_level = None;
        assert_eq!(
            validate_request(default_urgency, now).unwrap().urgency_level,
            UrgencyLevel::Medium
        );
    }

    #[tokio::test]
    async fn matches_nearby_donors_of_same_type_nearest_first() {
        let pool = connect_in_memory().await.unwrap();
        seed_user(&pool, "rec", "recipient").await;
        let far = seed_donor(&pool, "far", "O+", 4.4777, 51.9244).await; // ~57 km
        let near = seed_donor(&pool, "near", "O+", 4.95, 52.35).await;
        let mid = seed_donor(&pool, "mid", "O+", 5.2, 52.2).await;
        seed_donor(&pool, "wrong-type", "A+", 4.905, 52.368).await;

        let view = create_blood_request(&pool, &LogNotifier, 50.0, "rec", request_input(2))
            .await
            .unwrap();

        let matched = view.matched_donors.unwrap();
        let ids: Vec<&str> = matched.iter().map(|m| m.donor.id.as_str()).collect();
        assert_eq!(ids, vec![near.as_str(), mid.as_str()]);
        assert!(!ids.contains(&far.as_str()));
        assert!(matched.iter().all(|m| m.status == MatchStatus::Contacted));
        assert_eq!(view.status, RequestStatus::Pending);
        assert_eq!(view.urgency_level, UrgencyLevel::High);
    }

    #[tokio::test]
    async fn lifecycle_confirm_donate_fulfils_request() {
        let pool = connect_in_memory().await.unwrap();
        seed_user(&pool, "rec", "recipient").await;
        let donor_id = seed_donor(&pool, "d1", "O+", 4.95, 52.35).await;

        let view = create_blood_request(&pool, &LogNotifier, 50.0, "rec", request_input(1))
            .await
            .unwrap();

        let confirmed = respond_as_donor(&pool, "d1", &view.id, status("confirmed"))
            .await
            .unwrap();
        assert_eq!(confirmed.match_status, MatchStatus::Confirmed);
        assert_eq!(confirmed.request.status, RequestStatus::Matched);
        assert!(confirmed.response_at.is_some());

        let done = update_match_as_recipient(&pool, "rec", &view.id, &donor_id, status("donated"))
            .await
            .unwrap();
        assert_eq!(done.status, RequestStatus::Fulfilled);
        assert!(done.closed_at.is_some());

        let donations = donor_repo::list_donations(&pool, &donor_id).await.unwrap();
        assert_eq!(donations.len(), 1);
        assert_eq!(donations[0].hospital.as_deref(), Some("General"));
        let donor = donor_repo::load_donor(&pool, &donor_id).await.unwrap().unwrap();
        assert!(donor.last_donated.is_some());

        let late = respond_as_donor(&pool, "d1", &view.id, status("cancelled")).await;
        assert!(matches!(late, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn fulfilment_releases_remaining_donors() {
        let pool = connect_in_memory().await.unwrap();
        seed_user(&pool, "rec", "recipient").await;
        let d1 = seed_donor(&pool, "d1", "O+", 4.95, 52.35).await;
        let d2 = seed_donor(&pool, "d2", "O+", 4.96, 52.35).await;
        let d3 = seed_donor(&pool, "d3", "O+", 4.97, 52.35).await;
        let view = create_blood_request(&pool, &LogNotifier, 50.0, "rec", request_input(1))
            .await
            .unwrap();
        respond_as_donor(&pool, "d1", &view.id, status("confirmed"))
            .await
            .unwrap();
        respond_as_donor(&pool, "d2", &view.id, status("confirmed"))
            .await
            .unwrap();

        let done = update_match_as_recipient(&pool, "rec", &view.id, &d1, status("donated"))
            .await
            .unwrap();
        assert_eq!(done.status, RequestStatus::Fulfilled);

        let by_donor = |id: &str| {
            done.matched_donors
                .as_ref()
                .unwrap()
                .iter()
                .find(|m| m.donor.id == id)
                .map(|m| m.status)
        };
        assert_eq!(by_donor(d1.as_str()), Some(MatchStatus::Donated));
        assert_eq!(by_donor(d2.as_str()), Some(MatchStatus::Cancelled));
        assert_eq!(by_donor(d3.as_str()), Some(MatchStatus::Cancelled));

        let seen = list_donor_requests(&pool, "d2").await.unwrap();
        assert_eq!(seen[0].match_status, MatchStatus::Cancelled);
    }

    #[tokio::test]
    async fn illegal_transitions_are_rejected() {
        let pool = connect_in_memory().await.unwrap();
        seed_user(&pool, "rec", "recipient").await;
        let donor_id = seed_donor(&pool, "d1", "O+", 4.95, 52.35).await;
        let view = create_blood_request(&pool, &LogNotifier, 50.0, "rec", request_input(1))
            .await
            .unwrap();

        let skip =
            update_match_as_recipient(&pool, "rec", &view.id, &donor_id, status("donated")).await;
        let expected = "Invalid status transition from contacted to donated";
        assert!(matches!(skip, Err(AppError::BadRequest(m)) if m == expected));

        let wrong_actor = respond_as_donor(&pool, "d1", &view.id, status("donated")).await;
        assert!(matches!(wrong_actor, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn other_recipients_cannot_touch_the_request() {
        let pool = connect_in_memory().await.unwrap();
        seed_user(&pool, "rec", "recipient").await;
        seed_user(&pool, "intruder", "recipient").await;
        let view = create_blood_request(&pool, &LogNotifier, 50.0, "rec", request_input(1))
            .await
            .unwrap();

        let res = cancel_request(&pool, "intruder", &view.id).await;
        assert!(matches!(res, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn cancel_releases_open_matches() {
        let pool = connect_in_memory().await.unwrap();
        seed_user(&pool, "rec", "recipient").await;
        seed_donor(&pool, "d1", "O+", 4.95, 52.35).await;
        let view = create_blood_request(&pool, &LogNotifier, 50.0, "rec", request_input(1))
            .await
            .unwrap();

        let cancelled = cancel_request(&pool, "rec", &view.id).await.unwrap();
        assert_eq!(cancelled.status, RequestStatus::Cancelled);
        assert!(cancelled
            .matched_donors
            .unwrap()
            .iter()
            .all(|m| m.status == MatchStatus::Cancelled));

        assert!(cancel_request(&pool, "rec", &view.id).await.is_err());
    }

    #[tokio::test]
    async fn donor_sees_only_own_match() {
        let pool = connect_in_memory().await.unwrap();
        seed_user(&pool, "rec", "recipient").await;
        seed_donor(&pool, "d1", "O+", 4.95, 52.35).await;
        seed_donor(&pool, "d2", "O+", 4.96, 52.35).await;
        create_blood_request(&pool, &LogNotifier, 50.0, "rec", request_input(1))
            .await
            .unwrap();

        let seen = list_donor_requests(&pool, "d1").await.unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].request.matched_donors.is_none());
        assert_eq!(seen[0].match_status, MatchStatus::Contacted);

        let listed = list_recipient_requests(&pool, "rec").await.unwrap();
        assert_eq!(listed[0].matched_donors.as_ref().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn expired_requests_are_closed() {
        let pool = connect_in_memory().await.unwrap();
        seed_user(&pool, "rec", "recipient").await;
        let view = create_blood_request(&pool, &LogNotifier, 50.0, "rec", request_input(1))
            .await
            .unwrap();

        assert_eq!(close_expired_requests(&pool, Utc::now()).await.unwrap(), 0);

        let later = view.needed_by + Duration::days(1);
        assert_eq!(close_expired_requests(&pool, later).await.unwrap(), 1);
        let row = blood_request_repo::load_request(&pool, &view.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, "cancelled");
        assert!(row.closed_at.is_some());
    }
}
