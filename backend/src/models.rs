use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

pub use crate::access::Role;

// --- Core Application Schemas ---

/// User
///
/// The public view of an account stored in the `users` table. The password hash never
/// leaves the repository layer through this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// UserCredentials
///
/// Internal pairing of a user with their Argon2 password hash, used only by login.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

/// NewUser
///
/// What the register handler hands to the repository after validation and hashing.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub password_hash: String,
}

/// CaseStatus
///
/// Lifecycle of a case record. Stored as its variant name in `cases.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub enum CaseStatus {
    #[default]
    Open,
    UnderInvestigation,
    Closed,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Open => "Open",
            CaseStatus::UnderInvestigation => "UnderInvestigation",
            CaseStatus::Closed => "Closed",
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Open" => Ok(CaseStatus::Open),
            "UnderInvestigation" => Ok(CaseStatus::UnderInvestigation),
            "Closed" => Ok(CaseStatus::Closed),
            other => Err(format!("unknown case status `{other}`")),
        }
    }
}

/// Case
///
/// A case record from the `cases` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Case {
    pub id: Uuid,
    // Externally visible reference, unique across all cases.
    pub case_number: String,
    pub title: String,
    pub description: String,
    pub status: CaseStatus,
    // The user who filed the case.
    pub created_by: Uuid,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

// --- Request Payloads (Input Schemas) ---

/// RegisterUserRequest
///
/// Input for POST /auth/register. There is no role field: every self-registered account
/// starts as Writer, and only an SP can assign anything else.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterUserRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// TokenResponse
///
/// Output of a successful login. `access_token` goes into `Authorization: Bearer ...`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    // Seconds until the token expires.
    pub expires_in: u64,
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateCaseRequest {
    pub case_number: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// UpdateCaseRequest
///
/// Partial update for PUT /cases/{id}; only provided fields change.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateCaseRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateCaseStatusRequest {
    pub status: CaseStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateRoleRequest {
    pub role: Role,
}
