use axum::{Router, extract::FromRef, http::HeaderName, middleware};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Access gate: roles, route policies and the 401/403 middleware.
pub mod access;
// Caller resolution (JWT, local header bypass), password hashing, SP bootstrap.
pub mod auth;
// Core application services and components.
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;

// Route tables: authentication, cases, user administration.
pub mod routes;

// --- Public Re-exports ---

pub use access::{AccessError, CallerIdentity, Role, RoutePolicy};
pub use config::AppConfig;
pub use error::ApiError;
pub use repository::{PostgresRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI document for every handler and schema, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::register_user, handlers::login, handlers::get_me,
        handlers::list_cases, handlers::get_case, handlers::create_case,
        handlers::update_case, handlers::update_case_status, handlers::delete_case,
        handlers::list_users, handlers::get_user, handlers::update_user_role,
        handlers::delete_user
    ),
    components(
        schemas(
            models::User, models::Role, models::Case, models::CaseStatus,
            models::RegisterUserRequest, models::LoginRequest, models::TokenResponse,
            models::CreateCaseRequest, models::UpdateCaseRequest,
            models::UpdateCaseStatusRequest, models::UpdateRoleRequest,
        )
    ),
    tags(
        (name = "case-portal", description = "Case management API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Shared, cheaply cloneable container for the repository and configuration.
#[derive(Clone)]
pub struct AppState {
    pub repo: RepositoryState,
    pub config: AppConfig,
}

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles the route tables once at startup; nothing is added or changed afterwards.
///
/// Request flow for a protected route, outermost first: CORS, request id, tracing,
/// `auth::authenticate` (401 if no identity resolves), the per-method access gate
/// (403 if the role is not admitted), then the handler. Authentication is a route layer
/// on the merged protected tables, so an unmatched path still 404s instead of 401.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for request correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Protected tables: authentication wraps all three, role gates sit inside
    // individual method routers (see `routes::restrict`).
    let protected = Router::new()
        .merge(routes::auth::authenticated_routes())
        .merge(routes::cases::case_routes())
        .merge(routes::users::user_routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::authenticate,
        ));

    // 3. Base Router Assembly
    let base_router = Router::new()
        // Documentation: Swagger UI and the raw OpenAPI document.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Liveness check for the load balancer; no auth.
        .route("/health", axum::routing::get(|| async { "ok" }))
        // Public Routes: register and login only.
        .merge(routes::auth::public_routes())
        .merge(protected)
        .with_state(state);

    // 4. Observability and Correlation Layers (applied outermost)
    base_router
        .layer(
            ServiceBuilder::new()
                // 4a. Generates a UUID x-request-id for every incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 4b. One span per request, tagged with that id; denials logged by the
                // gate land inside it.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 4c. Echoes x-request-id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 5. CORS, applied last.
        .layer(cors)
}

/// Span for `TraceLayer`, tagged with the request id so every log line of one
/// request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
