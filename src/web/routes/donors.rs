use axum::{
    extract::{Path, Query, State},
    response::Response,
    Extension,
};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{GeoPoint, Role};
use crate::services::blood_request_service::{self, MatchStatusInput};
use crate::services::donor_service::{self, RegisterDonorInput, UpdateDonorInput};
use crate::services::profile_input::parse_blood_type;
use crate::state::AppState;
use crate::web::extract::ApiJson;
use crate::web::middleware::auth::AuthenticatedUser;
use crate::web::response;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyQuery {
    longitude: Option<String>,
    latitude: Option<String>,
    distance: Option<String>,
    blood_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityBody {
    availability: Option<bool>,
}

fn parse_number(raw: &str, field: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| AppError::bad_request(format!("{field} must be a number")))
}

pub async fn register_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(state): State<AppState>,
    ApiJson(input): ApiJson<RegisterDonorInput>,
) -> Result<Response> {
    auth_user.authorize(Role::Donor)?;
    let donor = donor_service::register_donor(&state.pool, &auth_user.id, input).await?;
    Ok(response::created(donor))
}

pub async fn nearby_handler(
    State(state): State<AppState>,
    Query(query): Query<NearbyQuery>,
) -> Result<Response> {
    let (Some(longitude), Some(latitude)) = (
        query.longitude.as_deref().filter(|v| !v.trim().is_empty()),
        query.latitude.as_deref().filter(|v| !v.trim().is_empty()),
    ) else {
        return Err(AppError::bad_request("Please provide longitude and latitude"));
    };
    let center = GeoPoint::new(
        parse_number(longitude, "longitude")?,
        parse_number(latitude, "latitude")?,
    );

    let radius_km = match query.distance.as_deref().filter(|v| !v.trim().is_empty()) {
        Some(raw) => parse_number(raw, "distance")?,
        None => state.config.nearby_default_km,
    };
    let blood_type = match query.blood_type.as_deref().filter(|v| !v.trim().is_empty()) {
        Some(raw) => Some(parse_blood_type(Some(raw), "Invalid blood type")?),
        None => None,
    };

    let donors = donor_service::nearby_donors(&state.pool, center, radius_km, blood_type).await?;
    Ok(response::listing(donors))
}

pub async fn profile_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(state): State<AppState>,
) -> Result<Response> {
    auth_user.authorize(Role::Donor)?;
    let donor = donor_service::load_donor_profile(&state.pool, &auth_user.id).await?;
    Ok(response::ok(donor))
}

pub async fn update_profile_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(state): State<AppState>,
    ApiJson(input): ApiJson<UpdateDonorInput>,
) -> Result<Response> {
    auth_user.authorize(Role::Donor)?;
    let donor = donor_service::update_donor_profile(&state.pool, &auth_user.id, input).await?;
    Ok(response::ok(donor))
}

pub async fn availability_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<AvailabilityBody>,
) -> Result<Response> {
    auth_user.authorize(Role::Donor)?;
    let availability = body
        .availability
        .ok_or_else(|| AppError::bad_request("Please provide availability"))?;
    let donor = donor_service::update_availability(&state.pool, &auth_user.id, availability).await?;
    Ok(response::ok(donor))
}

pub async fn requests_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(state): State<AppState>,
) -> Result<Response> {
    auth_user.authorize(Role::Donor)?;
    let requests = blood_request_service::list_donor_requests(&state.pool, &auth_user.id).await?;
    Ok(response::listing(requests))
}

pub async fn respond_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    Path(request_id): Path<String>,
    State(state): State<AppState>,
    ApiJson(input): ApiJson<MatchStatusInput>,
) -> Result<Response> {
    auth_user.authorize(Role::Donor)?;
    let request =
        blood_request_service::respond_as_donor(&state.pool, &auth_user.id, &request_id, input)
            .await?;
    Ok(response::ok(request))
}
