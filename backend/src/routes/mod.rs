//! Route Tables
//!
//! Each table binds verbs and paths to handlers. The authentication layer is applied
//! to whole tables in `create_router`; role requirements are attached per method with
//! [`restrict`], so they sit underneath authentication and run after it.

use axum::{middleware, routing::MethodRouter};

use crate::{
    AppState,
    access::{self, Role, RoutePolicy},
};

/// Registration, login and the caller's own profile.
pub mod auth;

/// Case records.
pub mod cases;

/// User administration, SP only.
pub mod users;

/// Roles allowed to file and edit cases.
pub const CASE_EDITORS: &[Role] = &[Role::Writer, Role::Sho, Role::Sp];
/// Roles allowed to change case status and delete cases.
pub const CASE_SUPERVISORS: &[Role] = &[Role::Sho, Role::Sp];
/// Roles allowed to administer accounts.
pub const USER_ADMINS: &[Role] = &[Role::Sp];

/// Wraps `route` in an access gate admitting only `roles`.
pub fn restrict(route: MethodRouter<AppState>, roles: &[Role]) -> MethodRouter<AppState> {
    route.route_layer(middleware::from_fn_with_state(
        RoutePolicy::only(roles),
        access::gate,
    ))
}
