use crate::{
    AppState,
    access::CallerIdentity,
    auth,
    error::ApiError,
    models::{
        Case, CaseStatus, CreateCaseRequest, LoginRequest, NewUser, RegisterUserRequest, Role,
        TokenResponse, UpdateCaseRequest, UpdateCaseStatusRequest, UpdateRoleRequest, User,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

const MIN_PASSWORD_LEN: usize = 8;

// --- Filter Structs ---

/// CaseFilter
///
/// Query parameters accepted by GET /cases.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct CaseFilter {
    /// Only return cases in this status.
    pub status: Option<CaseStatus>,
    /// Case-insensitive substring over title, description and case number.
    pub search: Option<String>,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn require_non_blank(value: &str, field: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::Validation(format!("{field} must not be blank")));
    }
    Ok(())
}

// --- Authentication ---

/// register_user
///
/// [Public Route] Creates an account. The password is hashed with Argon2 before it
/// reaches the repository. Self-registered accounts are always Writer; any other role
/// is assigned later through PUT /users/{id}/role.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterUserRequest,
    responses(
        (status = 201, description = "Registered", body = User),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<RegisterUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let email = normalize_email(&payload.email);
    if !email.contains('@') {
        return Err(ApiError::Validation("email is not valid".to_string()));
    }
    require_non_blank(&payload.full_name, "full_name")?;
    if payload.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    // Argon2 is deliberately slow; keep it off the async workers.
    let password = payload.password;
    let password_hash = tokio::task::spawn_blocking(move || auth::hash_password(&password))
        .await
        .map_err(|_| ApiError::Internal)?
        .map_err(|e| {
            tracing::error!("password hashing failed: {}", e);
            ApiError::Internal
        })?;

    let user = state
        .repo
        .create_user(NewUser {
            email,
            full_name: payload.full_name.trim().to_string(),
            role: Role::Writer,
            password_hash,
        })
        .await?;

    tracing::info!(user_id = %user.id, role = %user.role, "user registered");
    Ok((StatusCode::CREATED, Json(user)))
}

/// login
///
/// [Public Route] Exchanges email and password for a Bearer access token. Unknown email
/// and wrong password produce the same response.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let email = normalize_email(&payload.email);
    let credentials = state
        .repo
        .find_credentials(&email)
        .await
        .ok_or(ApiError::InvalidCredentials)?;

    let password = payload.password;
    let hash = credentials.password_hash;
    let matches = tokio::task::spawn_blocking(move || auth::verify_password(&password, &hash))
        .await
        .map_err(|_| ApiError::Internal)?
        .map_err(|e| {
            tracing::error!(user_id = %credentials.user.id, "stored password hash unreadable: {}", e);
            ApiError::Internal
        })?;
    if !matches {
        return Err(ApiError::InvalidCredentials);
    }

    let access_token = auth::issue_token(credentials.user.id, &state.config).map_err(|e| {
        tracing::error!("token signing failed: {}", e);
        ApiError::Internal
    })?;

    Ok(Json(TokenResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.config.token_ttl_secs,
        user: credentials.user,
    }))
}

/// get_me
///
/// [Authenticated Route] Returns the caller's own account.
#[utoipa::path(
    get,
    path = "/auth/me",
    responses((status = 200, description = "Profile", body = User))
)]
pub async fn get_me(
    CallerIdentity { id, .. }: CallerIdentity,
    State(state): State<AppState>,
) -> Result<Json<User>, ApiError> {
    state
        .repo
        .get_user(id)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound("user"))
}

// --- Cases ---

/// list_cases
///
/// [Authenticated Route] Lists case records, newest first.
#[utoipa::path(
    get,
    path = "/cases",
    params(CaseFilter),
    responses((status = 200, description = "Cases", body = [Case]))
)]
pub async fn list_cases(
    State(state): State<AppState>,
    Query(filter): Query<CaseFilter>,
) -> Json<Vec<Case>> {
    Json(state.repo.list_cases(filter.status, filter.search).await)
}

#[utoipa::path(
    get,
    path = "/cases/{id}",
    params(("id" = Uuid, Path, description = "Case ID")),
    responses(
        (status = 200, description = "Found", body = Case),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_case(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Case>, ApiError> {
    state
        .repo
        .get_case(id)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound("case"))
}

/// create_case
///
/// [Writer, SHO, SP] Files a new case. The filing user is taken from the caller identity,
/// never from the body.
#[utoipa::path(
    post,
    path = "/cases",
    request_body = CreateCaseRequest,
    responses(
        (status = 201, description = "Created", body = Case),
        (status = 409, description = "Duplicate case number")
    )
)]
pub async fn create_case(
    CallerIdentity { id, .. }: CallerIdentity,
    State(state): State<AppState>,
    Json(mut payload): Json<CreateCaseRequest>,
) -> Result<(StatusCode, Json<Case>), ApiError> {
    require_non_blank(&payload.case_number, "case_number")?;
    require_non_blank(&payload.title, "title")?;
    payload.case_number = payload.case_number.trim().to_string();
    payload.title = payload.title.trim().to_string();

    let case = state.repo.create_case(payload, id).await?;
    tracing::info!(case_id = %case.id, created_by = %id, "case filed");
    Ok((StatusCode::CREATED, Json(case)))
}

/// update_case
///
/// [Writer, SHO, SP] Partial update of title and description.
#[utoipa::path(
    put,
    path = "/cases/{id}",
    params(("id" = Uuid, Path, description = "Case ID")),
    request_body = UpdateCaseRequest,
    responses(
        (status = 200, description = "Updated", body = Case),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_case(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut payload): Json<UpdateCaseRequest>,
) -> Result<Json<Case>, ApiError> {
    if let Some(title) = payload.title.as_deref() {
        require_non_blank(title, "title")?;
    }
    payload.title = payload.title.map(|t| t.trim().to_string());

    state
        .repo
        .update_case(id, payload)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound("case"))
}

/// update_case_status
///
/// [SHO, SP] Moves a case through its lifecycle.
#[utoipa::path(
    patch,
    path = "/cases/{id}/status",
    params(("id" = Uuid, Path, description = "Case ID")),
    request_body = UpdateCaseStatusRequest,
    responses(
        (status = 200, description = "Updated", body = Case),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_case_status(
    CallerIdentity { id: caller_id, .. }: CallerIdentity,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCaseStatusRequest>,
) -> Result<Json<Case>, ApiError> {
    let case = state
        .repo
        .set_case_status(id, payload.status)
        .await
        .ok_or(ApiError::NotFound("case"))?;
    tracing::info!(case_id = %id, status = %case.status, by = %caller_id, "case status changed");
    Ok(Json(case))
}

/// delete_case
///
/// [SHO, SP] Removes a case record.
#[utoipa::path(
    delete,
    path = "/cases/{id}",
    params(("id" = Uuid, Path, description = "Case ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_case(
    CallerIdentity { id: caller_id, .. }: CallerIdentity,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.repo.delete_case(id).await {
        tracing::info!(case_id = %id, by = %caller_id, "case deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("case"))
    }
}

// --- User administration ---

/// list_users
///
/// [SP] All accounts, oldest first.
#[utoipa::path(
    get,
    path = "/users",
    responses((status = 200, description = "Users", body = [User]))
)]
pub async fn list_users(State(state): State<AppState>) -> Json<Vec<User>> {
    Json(state.repo.list_users().await)
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Found", body = User),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, ApiError> {
    state
        .repo
        .get_user(id)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound("user"))
}

/// update_user_role
///
/// [SP] Assigns a new role. An SP cannot change their own role, so the last
/// administrator can't demote themselves by accident.
#[utoipa::path(
    put,
    path = "/users/{id}/role",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Updated", body = User),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Own account")
    )
)]
pub async fn update_user_role(
    CallerIdentity { id: caller_id, .. }: CallerIdentity,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRoleRequest>,
) -> Result<Json<User>, ApiError> {
    if id == caller_id {
        return Err(ApiError::Conflict("cannot change your own role".to_string()));
    }
    let user = state
        .repo
        .set_user_role(id, payload.role)
        .await
        .ok_or(ApiError::NotFound("user"))?;
    tracing::info!(user_id = %id, role = %user.role, by = %caller_id, "role changed");
    Ok(Json(user))
}

#[utoipa::path(
    delete,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Own account, or user still owns cases")
    )
)]
pub async fn delete_user(
    CallerIdentity { id: caller_id, .. }: CallerIdentity,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if id == caller_id {
        return Err(ApiError::Conflict("cannot delete your own account".to_string()));
    }
    if state.repo.delete_user(id).await? {
        tracing::info!(user_id = %id, by = %caller_id, "user deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("user"))
    }
}
