use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Authentication Router
///
/// The only routes reachable without an identity. `create_router` merges this table
/// outside the authentication layer, so nothing here ever sees a `CallerIdentity`.
///
/// Registration never grants privileges: the request body has no role field and every
/// new account is a Writer. The first SP is created from configuration at startup and
/// further elevation goes through `PUT /users/{id}/role`.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // POST /auth/register
        // Creates a Writer account. Email is normalised and must be unique (409 otherwise).
        .route("/auth/register", post(handlers::register_user))
        // POST /auth/login
        // Exchanges email and password for an HS256 Bearer token. Unknown email and wrong
        // password return the same 401 body.
        .route("/auth/login", post(handlers::login))
}

/// Authenticated Authentication Router
///
/// Sits behind `auth::authenticate` like the other protected tables but carries no role
/// gate: any resolved caller, whatever their role, may read their own profile.
pub fn authenticated_routes() -> Router<AppState> {
    Router::new()
        // GET /auth/me
        // The caller's own `User` record, with the role as currently stored.
        .route("/auth/me", get(handlers::get_me))
}
