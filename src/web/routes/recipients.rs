use axum::{
    extract::{Path, State},
    response::Response,
    Extension,
};

use crate::error::Result;
use crate::models::Role;
use crate::services::blood_request_service::{self, CreateBloodRequestInput, MatchStatusInput};
use crate::services::recipient_service::{self, RecipientInput};
use crate::state::AppState;
use crate::web::extract::ApiJson;
use crate::web::middleware::auth::AuthenticatedUser;
use crate::web::response;

pub async fn register_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(state): State<AppState>,
    ApiJson(input): ApiJson<RecipientInput>,
) -> Result<Response> {
    auth_user.authorize(Role::Recipient)?;
    let recipient = recipient_service::register_recipient(&state.pool, &auth_user.id, input).await?;
    Ok(response::created(recipient))
}

pub async fn profile_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(state): State<AppState>,
) -> Result<Response> {
    auth_user.authorize(Role::Recipient)?;
    let recipient = recipient_service::load_recipient_profile(&state.pool, &auth_user.id).await?;
    Ok(response::ok(recipient))
}

pub async fn update_profile_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(state): State<AppState>,
    ApiJson(input): ApiJson<RecipientInput>,
) -> Result<Response> {
    auth_user.authorize(Role::Recipient)?;
    let recipient =
        recipient_service::update_recipient_profile(&state.pool, &auth_user.id, input).await?;
    Ok(response::ok(recipient))
}

pub async fn create_request_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(state): State<AppState>,
    ApiJson(input): ApiJson<CreateBloodRequestInput>,
) -> Result<Response> {
    auth_user.authorize(Role::Recipient)?;
    let request = blood_request_service::create_blood_request(
        &state.pool,
        state.notifier.as_ref(),
        state.config.match_radius_km,
        &auth_user.id,
        input,
    )
    .await?;
    Ok(response::created(request))
}

pub async fn requests_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(state): State<AppState>,
) -> Result<Response> {
    auth_user.authorize(Role::Recipient)?;
    let requests =
        blood_request_service::list_recipient_requests(&state.pool, &auth_user.id).await?;
    Ok(response::listing(requests))
}

pub async fn update_match_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    Path((request_id, donor_id)): Path<(String, String)>,
    State(state): State<AppState>,
    ApiJson(input): ApiJson<MatchStatusInput>,
) -> Result<Response> {
    auth_user.authorize(Role::Recipient)?;
    let request = blood_request_service::update_match_as_recipient(
        &state.pool,
        &auth_user.id,
        &request_id,
        &donor_id,
        input,
    )
    .await?;
    Ok(response::ok(request))
}

pub async fn cancel_request_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    Path(request_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Response> {
    auth_user.authorize(Role::Recipient)?;
    let request =
        blood_request_service::cancel_request(&state.pool, &auth_user.id, &request_id).await?;
    Ok(response::ok(request))
}
