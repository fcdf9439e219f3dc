use std::{collections::BTreeSet, fmt, str::FromStr, sync::Arc};

use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

/// Role
///
/// The closed set of roles a caller can hold. The serialized names are the
/// exact strings stored in `users.role` and carried over the API.
///
/// There is no ordering of privilege between roles: `SP` does not inherit
/// anything granted to `SHO`, and a route that wants both must list both.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS, ToSchema,
)]
#[ts(export)]
pub enum Role {
    Writer,
    #[serde(rename = "SHO")]
    Sho,
    #[serde(rename = "SP")]
    Sp,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Writer, Role::Sho, Role::Sp];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Writer => "Writer",
            Role::Sho => "SHO",
            Role::Sp => "SP",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a role name does not match any `Role` exactly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role `{0}`")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    // Case-sensitive on purpose: "sp" and "Sp" are not SP.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// CallerIdentity
///
/// The authenticated principal for a single request. Produced by the
/// authentication stage and stored in the request extensions; the access gate
/// and the handlers only ever read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub id: Uuid,
    pub role: Role,
}

/// RoutePolicy
///
/// The set of roles allowed through one route. Built while the route tables
/// are assembled and shared read-only afterwards. An empty set admits any
/// authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoutePolicy {
    allowed: Arc<BTreeSet<Role>>,
}

impl RoutePolicy {
    pub fn any_authenticated() -> Self {
        Self::default()
    }

    pub fn only(roles: &[Role]) -> Self {
        Self {
            allowed: Arc::new(roles.iter().copied().collect()),
        }
    }

    pub fn allowed_roles(&self) -> impl Iterator<Item = Role> + '_ {
        self.allowed.iter().copied()
    }

    pub fn admits(&self, role: Role) -> bool {
        self.allowed.is_empty() || self.allowed.contains(&role)
    }

    /// The admission decision. Absence of an identity always wins over the
    /// role check so the caller can tell "log in" apart from "not allowed".
    pub fn check(&self, identity: Option<&CallerIdentity>) -> Result<(), AccessError> {
        let identity = identity.ok_or(AccessError::Unauthenticated)?;
        if self.admits(identity.role) {
            Ok(())
        } else {
            Err(AccessError::Forbidden)
        }
    }
}

/// AccessError
///
/// The two ways a request can be turned away before reaching a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("authentication required")]
    Unauthenticated,
    #[error("caller role is not permitted for this operation")]
    Forbidden,
}

impl AccessError {
    pub fn status(&self) -> StatusCode {
        match self {
            AccessError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AccessError::Forbidden => StatusCode::FORBIDDEN,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AccessError::Unauthenticated => "unauthenticated",
            AccessError::Forbidden => "forbidden",
        }
    }
}

impl IntoResponse for AccessError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.code(), "message": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}

/// gate
///
/// Middleware form of `RoutePolicy::check`. Install it with
/// `middleware::from_fn_with_state(policy, gate)` underneath the
/// authentication layer; it never touches the request on the way through.
pub async fn gate(
    State(policy): State<RoutePolicy>,
    request: Request,
    next: Next,
) -> Result<Response, AccessError> {
    let identity = request.extensions().get::<CallerIdentity>();

    if let Err(e) = policy.check(identity) {
        match identity {
            Some(caller) => tracing::warn!(
                caller_id = %caller.id,
                role = %caller.role,
                allowed = ?policy.allowed_roles().collect::<Vec<_>>(),
                uri = %request.uri(),
                "access denied"
            ),
            None => tracing::warn!(uri = %request.uri(), "gate reached without a caller identity"),
        }
        return Err(e);
    }

    Ok(next.run(request).await)
}
