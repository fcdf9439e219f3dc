use crate::models::{
    Case, CaseStatus, CreateCaseRequest, NewUser, Role, UpdateCaseRequest, User, UserCredentials,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, query_builder::QueryBuilder};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// RepoError
///
/// Failures of write operations. Constraint violations the caller can act on are
/// split out from everything else the database might report.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Repository Trait
///
/// The persistence contract the handlers and the authentication resolver depend on.
/// Read methods log failures and degrade to `None` or an empty list; write methods
/// report constraint violations through `RepoError`.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: Uuid) -> Option<User>;
    // Login lookup. `email` is already normalized by the caller.
    async fn find_credentials(&self, email: &str) -> Option<UserCredentials>;
    async fn create_user(&self, user: NewUser) -> Result<User, RepoError>;
    async fn list_users(&self) -> Vec<User>;
    async fn set_user_role(&self, id: Uuid, role: Role) -> Option<User>;
    // Ok(false) when no such user exists.
    async fn delete_user(&self, id: Uuid) -> Result<bool, RepoError>;

    // --- Cases ---
    async fn list_cases(&self, status: Option<CaseStatus>, search: Option<String>) -> Vec<Case>;
    async fn get_case(&self, id: Uuid) -> Option<Case>;
    async fn create_case(&self, req: CreateCaseRequest, created_by: Uuid) -> Result<Case, RepoError>;
    // Partial update; `None` fields keep their stored value.
    async fn update_case(&self, id: Uuid, req: UpdateCaseRequest) -> Option<Case>;
    async fn set_case_status(&self, id: Uuid, status: CaseStatus) -> Option<Case>;
    async fn delete_case(&self, id: Uuid) -> bool;
}

/// RepositoryState
///
/// The shared handle stored in `AppState`.
pub type RepositoryState = Arc<dyn Repository>;

// --- Row mapping ---

// Roles and statuses are TEXT columns; rows are read as strings and converted so an
// unexpected value surfaces as a logged error instead of a silent default.

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    full_name: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self) -> Option<User> {
        match self.role.parse::<Role>() {
            Ok(role) => Some(User {
                id: self.id,
                email: self.email,
                full_name: self.full_name,
                role,
                created_at: self.created_at,
            }),
            Err(e) => {
                tracing::error!(user_id = %self.id, "stored user has {}", e);
                None
            }
        }
    }
}

#[derive(FromRow)]
struct CredentialsRow {
    #[sqlx(flatten)]
    user: UserRow,
    password_hash: String,
}

#[derive(FromRow)]
struct CaseRow {
    id: Uuid,
    case_number: String,
    title: String,
    description: String,
    status: String,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CaseRow {
    fn into_case(self) -> Option<Case> {
        match self.status.parse::<CaseStatus>() {
            Ok(status) => Some(Case {
                id: self.id,
                case_number: self.case_number,
                title: self.title,
                description: self.description,
                status,
                created_by: self.created_by,
                created_at: self.created_at,
                updated_at: self.updated_at,
            }),
            Err(e) => {
                tracing::error!(case_id = %self.id, "{}", e);
                None
            }
        }
    }
}

const USER_COLUMNS: &str = "id, email, full_name, role, created_at";
const CASE_COLUMNS: &str =
    "id, case_number, title, description, status, created_by, created_at, updated_at";

fn classify(e: sqlx::Error, conflict: &str) -> RepoError {
    let violated = e
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation() || db.is_foreign_key_violation());
    if violated {
        RepoError::Conflict(conflict.to_string())
    } else {
        RepoError::Database(e)
    }
}

/// PostgresRepository
///
/// `Repository` backed by PostgreSQL through a shared connection pool.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: Uuid) -> Option<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_user error: {:?}", e);
                None
            })
            .and_then(UserRow::into_user)
    }

    async fn find_credentials(&self, email: &str) -> Option<UserCredentials> {
        let sql = format!("SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = $1");
        let row = sqlx::query_as::<_, CredentialsRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("find_credentials error: {:?}", e);
                None
            })?;
        let password_hash = row.password_hash;
        row.user.into_user().map(|user| UserCredentials {
            user,
            password_hash,
        })
    }

    async fn create_user(&self, user: NewUser) -> Result<User, RepoError> {
        let sql = format!(
            "INSERT INTO users (id, email, full_name, role, password_hash, created_at) \
             VALUES ($1, $2, $3, $4, $5, NOW()) RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.email)
            .bind(&user.full_name)
            .bind(user.role.as_str())
            .bind(&user.password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| classify(e, "email is already registered"))?;
        row.into_user()
            .ok_or_else(|| RepoError::Database(sqlx::Error::RowNotFound))
    }

    async fn list_users(&self) -> Vec<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC");
        match sqlx::query_as::<_, UserRow>(&sql).fetch_all(&self.pool).await {
            Ok(rows) => rows.into_iter().filter_map(UserRow::into_user).collect(),
            Err(e) => {
                tracing::error!("list_users error: {:?}", e);
                vec![]
            }
        }
    }

    async fn set_user_role(&self, id: Uuid, role: Role) -> Option<User> {
        let sql = format!("UPDATE users SET role = $1 WHERE id = $2 RETURNING {USER_COLUMNS}");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(role.as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("set_user_role error: {:?}", e);
                None
            })
            .and_then(UserRow::into_user)
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, RepoError> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| classify(e, "user still owns case records"))?;
        Ok(res.rows_affected() > 0)
    }

    /// list_cases
    ///
    /// Filtering is assembled with QueryBuilder so every user-supplied value is bound,
    /// never interpolated.
    async fn list_cases(&self, status: Option<CaseStatus>, search: Option<String>) -> Vec<Case> {
        let mut builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new(format!("SELECT {CASE_COLUMNS} FROM cases WHERE TRUE"));

        if let Some(status) = status {
            builder.push(" AND status = ");
            builder.push_bind(status.as_str());
        }

        if let Some(s) = search.filter(|s| !s.trim().is_empty()) {
            let pattern = contains_pattern(s.trim());
            builder.push(" AND (title ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(r" ESCAPE '\' OR description ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(r" ESCAPE '\' OR case_number ILIKE ");
            builder.push_bind(pattern);
            builder.push(r" ESCAPE '\')");
        }

        builder.push(" ORDER BY created_at DESC");

        match builder.build_query_as::<CaseRow>().fetch_all(&self.pool).await {
            Ok(rows) => rows.into_iter().filter_map(CaseRow::into_case).collect(),
            Err(e) => {
                tracing::error!("list_cases error: {:?}", e);
                vec![]
            }
        }
    }

    async fn get_case(&self, id: Uuid) -> Option<Case> {
        let sql = format!("SELECT {CASE_COLUMNS} FROM cases WHERE id = $1");
        sqlx::query_as::<_, CaseRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_case error: {:?}", e);
                None
            })
            .and_then(CaseRow::into_case)
    }

    async fn create_case(&self, req: CreateCaseRequest, created_by: Uuid) -> Result<Case, RepoError> {
        let sql = format!(
            "INSERT INTO cases (id, case_number, title, description, status, created_by, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW()) RETURNING {CASE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, CaseRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&req.case_number)
            .bind(&req.title)
            .bind(&req.description)
            .bind(CaseStatus::Open.as_str())
            .bind(created_by)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| classify(e, "case number is already in use"))?;
        row.into_case()
            .ok_or_else(|| RepoError::Database(sqlx::Error::RowNotFound))
    }

    /// update_case
    ///
    /// COALESCE keeps the stored column whenever the request leaves a field out.
    async fn update_case(&self, id: Uuid, req: UpdateCaseRequest) -> Option<Case> {
        let sql = format!(
            "UPDATE cases \
             SET title = COALESCE($2, title), \
                 description = COALESCE($3, description), \
                 updated_at = NOW() \
             WHERE id = $1 RETURNING {CASE_COLUMNS}"
        );
        sqlx::query_as::<_, CaseRow>(&sql)
            .bind(id)
            .bind(req.title)
            .bind(req.description)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("update_case error: {:?}", e);
                None
            })
            .and_then(CaseRow::into_case)
    }

    async fn set_case_status(&self, id: Uuid, status: CaseStatus) -> Option<Case> {
        let sql = format!(
            "UPDATE cases SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {CASE_COLUMNS}"
        );
        sqlx::query_as::<_, CaseRow>(&sql)
            .bind(id)
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("set_case_status error: {:?}", e);
                None
            })
            .and_then(CaseRow::into_case)
    }

    async fn delete_case(&self, id: Uuid) -> bool {
        match sqlx::query("DELETE FROM cases WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
        {
            Ok(res) => res.rows_affected() > 0,
            Err(e) => {
                tracing::error!("delete_case error: {:?}", e);
                false
            }
        }
    }
}

/// Wraps user text in `%...%` for ILIKE, escaping the wildcard characters so the
/// search stays a literal substring match. Paired with `ESCAPE '\'` in the query.
fn contains_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
