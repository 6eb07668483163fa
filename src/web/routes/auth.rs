use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use cookie::{Cookie, SameSite};
use serde_json::json;

use crate::error::{AppError, Result};
use crate::services::auth_service::{self, AuthSession, LoginInput, RegisterInput};
use crate::state::AppState;
use crate::web::extract::ApiJson;
use crate::web::middleware::auth::{AuthenticatedUser, ACCESS_TOKEN_COOKIE};
use crate::web::response;

fn access_cookie(token: &str) -> Cookie<'static> {
    let mut cookie = Cookie::new(ACCESS_TOKEN_COOKIE, token.to_string());
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie
}

fn with_cookie(mut response: Response, cookie: &Cookie<'_>) -> Result<Response> {
    let value = HeaderValue::from_str(&cookie.to_string())
        .map_err(|e| AppError::Internal(format!("invalid cookie header: {e}")))?;
    response.headers_mut().append(header::SET_COOKIE, value);
    Ok(response)
}

fn session_response(status: StatusCode, session: AuthSession) -> Result<Response> {
    let cookie = access_cookie(&session.token);
    let body = Json(json!({
        "success": true,
        "token": session.token,
        "user": session.user,
    }));
    with_cookie((status, body).into_response(), &cookie)
}

pub async fn register_handler(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<RegisterInput>,
) -> Result<Response> {
    let session = auth_service::register(&state.pool, &state.config, input).await?;
    session_response(StatusCode::CREATED, session)
}

pub async fn login_handler(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<LoginInput>,
) -> Result<Response> {
    let session = auth_service::login(&state.pool, &state.config, input).await?;
    session_response(StatusCode::OK, session)
}

pub async fn me_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(state): State<AppState>,
) -> Result<Response> {
    let user = auth_service::load_current_user(&state.pool, &auth_user.id).await?;
    Ok(response::ok(user))
}

pub async fn logout_handler() -> Result<Response> {
    let mut cookie = access_cookie("");
    cookie.make_removal();
    let body = Json(json!({ "success": true, "message": "Logged out" }));
    with_cookie(body.into_response(), &cookie)
}
