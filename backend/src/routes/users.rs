use super::{USER_ADMINS, restrict};
use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, put},
};

/// User Administration Router
///
/// Account management for the district. Every route is gated to `USER_ADMINS` (SP
/// only); an SHO or Writer gets 403, an anonymous caller 401 from the authentication
/// layer above.
///
/// Role assignment lives here and nowhere else, which is why registration can always
/// hand out Writer. The handlers refuse to let an SP change or delete their own account
/// (409), so the table can't lock itself out by accident.
pub fn user_routes() -> Router<AppState> {
    Router::new()
        // GET /users
        // All accounts, oldest first.
        .route("/users", restrict(get(handlers::list_users), USER_ADMINS))
        // GET /users/{id}
        .route("/users/{id}", restrict(get(handlers::get_user), USER_ADMINS))
        // DELETE /users/{id}
        // 409 if the account still owns cases (foreign key RESTRICT).
        .route(
            "/users/{id}",
            restrict(delete(handlers::delete_user), USER_ADMINS),
        )
        // PUT /users/{id}/role
        // The only way to promote or demote an account. Takes effect on the target's next
        // request, since roles are re-read from the store rather than the token.
        .route(
            "/users/{id}/role",
            restrict(put(handlers::update_user_role), USER_ADMINS),
        )
}
