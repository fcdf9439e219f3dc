use super::{CASE_EDITORS, CASE_SUPERVISORS, restrict};
use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, patch, post, put},
};

/// Case Router
///
/// Defines the case-record table. The whole table sits behind the authentication layer
/// applied in `create_router`, so an anonymous request stops there with 401 before any
/// role gate runs.
///
/// Access Control Strategy:
/// Reading is open to every authenticated caller and has no gate. Filing and editing
/// are wrapped with `restrict(.., CASE_EDITORS)` (Writer, SHO, SP); moving a case
/// through its lifecycle and deleting it use `CASE_SUPERVISORS` (SHO, SP). The same path
/// is registered once per method so each verb carries its own gate.
pub fn case_routes() -> Router<AppState> {
    Router::new()
        // GET /cases?status=...&search=...
        // Newest first. `search` is a literal, case-insensitive substring over title,
        // description and case number.
        .route("/cases", get(handlers::list_cases))
        // POST /cases
        // Files a new case. `created_by` comes from the caller identity, never the body.
        .route("/cases", restrict(post(handlers::create_case), CASE_EDITORS))
        // GET /cases/{id}
        .route("/cases/{id}", get(handlers::get_case))
        // PUT /cases/{id}
        // Partial update of title and description.
        .route("/cases/{id}", restrict(put(handlers::update_case), CASE_EDITORS))
        // DELETE /cases/{id}
        .route(
            "/cases/{id}",
            restrict(delete(handlers::delete_case), CASE_SUPERVISORS),
        )
        // PATCH /cases/{id}/status
        // Open, UnderInvestigation or Closed. Writers can file but not close.
        .route(
            "/cases/{id}/status",
            restrict(patch(handlers::update_case_status), CASE_SUPERVISORS),
        )
}
