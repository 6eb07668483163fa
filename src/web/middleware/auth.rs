use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use cookie::Cookie;
use tracing::warn;

use crate::database::user_repo;
use crate::error::AppError;
use crate::models::Role;
use crate::services::auth_service;
use crate::state::AppState;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub id: String,
    pub role: Role,
}

impl AuthenticatedUser {
    /// Role guard for handlers mounted behind `require_auth`.
    pub fn authorize(&self, role: Role) -> Result<(), AppError> {
        if self.role != role {
            return Err(AppError::Forbidden(format!(
                "User role {} is not authorized to access this route",
                self.role
            )));
        }
        Ok(())
    }
}

/// Bearer header first, then the `access_token` cookie.
fn extract_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|hv| hv.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|hv| hv.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|c| c.name() == ACCESS_TOKEN_COOKIE && !c.value().is_empty())
        .map(|c| c.value().to_string())
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_token(request.headers()) else {
        return AppError::Unauthorized("Not authorized, no token".to_string()).into_response();
    };

    let Some(claims) = auth_service::verify_token(&state.config.token_secret, &token, Utc::now())
    else {
        return AppError::Unauthorized("Not authorized, token failed".to_string()).into_response();
    };

    // The token may outlive the account it was issued for.
    let user = match user_repo::load_user(&state.pool, &claims.sub).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            warn!(user_id = %claims.sub, "token for unknown user");
            return AppError::Unauthorized("Not authorized, user not found".to_string())
                .into_response();
        }
        Err(e) => return AppError::from(e).into_response(),
    };
    let role = match user.role.parse::<Role>() {
        Ok(role) => role,
        Err(e) => return AppError::from(e).into_response(),
    };

    request.extensions_mut().insert(AuthenticatedUser {
        id: user.user_id,
        role,
    });
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(header::COOKIE, HeaderValue::from_static("access_token=def"));
        assert_eq!(extract_token(&headers).as_deref(), Some("abc"));
    }

    #[test]
    fn cookie_is_found_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; access_token=xyz; lang=en"),
        );
        assert_eq!(extract_token(&headers).as_deref(), Some("xyz"));
    }

    #[test]
    fn missing_or_empty_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_token(&headers), None);
        headers.insert(header::COOKIE, HeaderValue::from_static("access_token="));
        assert_eq!(extract_token(&headers), None);
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic Zm9v"));
        assert_eq!(extract_token(&headers), None);
    }

    #[test]
    fn wrong_role_is_forbidden() {
        let user = AuthenticatedUser {
            id: "u1".into(),
            role: Role::Donor,
        };
        assert!(user.authorize(Role::Donor).is_ok());
        assert!(matches!(
            user.authorize(Role::Recipient),
            Err(AppError::Forbidden(_))
        ));
    }
}
