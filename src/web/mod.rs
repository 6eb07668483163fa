use std::time::Duration;

use axum::{
    routing::{get, post, put},
    Router,
};
use http::header::{self, HeaderValue};
use http::Method;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::state::AppState;

pub mod extract;
pub mod middleware;
pub mod response;
pub mod routes;

use routes::{auth, donors, recipients, root};

pub fn build_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/api/auth/me", get(auth::me_handler))
        .route("/api/donors/register", post(donors::register_handler))
        .route(
            "/api/donors/me",
            get(donors::profile_handler).put(donors::update_profile_handler),
        )
        .route(
            "/api/donors/me/availability",
            put(donors::availability_handler),
        )
        .route("/api/donors/me/requests", get(donors::requests_handler))
        .route(
            "/api/donors/me/requests/:request_id",
            put(donors::respond_handler),
        )
        .route("/api/recipients/register", post(recipients::register_handler))
        .route(
            "/api/recipients/me",
            get(recipients::profile_handler).put(recipients::update_profile_handler),
        )
        .route(
            "/api/recipients/requests",
            post(recipients::create_request_handler),
        )
        .route(
            "/api/recipients/me/requests",
            get(recipients::requests_handler),
        )
        .route(
            "/api/recipients/me/requests/:request_id/donors/:donor_id",
            put(recipients::update_match_handler),
        )
        .route(
            "/api/recipients/me/requests/:request_id/cancel",
            put(recipients::cancel_request_handler),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        // Public routes
        .route("/", get(root::index_handler))
        .route("/api", get(root::welcome_handler))
        .route("/api/auth/register", post(auth::register_handler))
        .route("/api/auth/login", post(auth::login_handler))
        .route(
            "/api/auth/logout",
            get(auth::logout_handler).post(auth::logout_handler),
        )
        .route("/api/donors/nearby", get(donors::nearby_handler))
        // Protected routes
        .merge(protected_routes)
        // Layers
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(cors_layer(state.config.cors_allow_origin.as_deref()))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

fn cors_layer(allow_origin: Option<&str>) -> CorsLayer {
    let origin = match allow_origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => AllowOrigin::exact(origin),
        Some(Err(e)) => {
            warn!(error = %e, "CORS_ALLOW_ORIGIN is not a valid header value, allowing any origin");
            AllowOrigin::from(Any)
        }
        None => AllowOrigin::from(Any),
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60))
}
