#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use case_portal::{
    AppState,
    auth,
    config::{AppConfig, Env},
    create_router,
    models::{
        Case, CaseStatus, CreateCaseRequest, NewUser, Role, UpdateCaseRequest, User,
        UserCredentials,
    },
    repository::{RepoError, Repository},
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tower::util::ServiceExt;
use uuid::Uuid;

pub const TEST_PASSWORD: &str = "correct-horse-battery";

// --- In-memory Repository ---

#[derive(Default)]
struct Store {
    users: HashMap<Uuid, (User, String)>,
    cases: HashMap<Uuid, Case>,
}

/// MemoryRepo
///
/// `Repository` over two hash maps, mirroring the constraints of the real schema
/// (unique email, unique case number, cases pin their author).
#[derive(Default, Clone)]
pub struct MemoryRepo {
    store: Arc<Mutex<Store>>,
}

impl MemoryRepo {
    /// Inserts a user directly, bypassing the HTTP layer. The password is always
    /// `TEST_PASSWORD`.
    pub fn seed_user(&self, email: &str, role: Role) -> User {
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            full_name: format!("{} user", role),
            role,
            created_at: Utc::now(),
        };
        let hash = auth::hash_password(TEST_PASSWORD).unwrap();
        self.store
            .lock()
            .unwrap()
            .users
            .insert(user.id, (user.clone(), hash));
        user
    }

    pub fn seed_case(&self, case_number: &str, created_by: Uuid) -> Case {
        let now = Utc::now();
        let case = Case {
            id: Uuid::new_v4(),
            case_number: case_number.to_string(),
            title: format!("Case {case_number}"),
            description: "seeded".to_string(),
            status: CaseStatus::Open,
            created_by,
            created_at: now,
            updated_at: now,
        };
        self.store
            .lock()
            .unwrap()
            .cases
            .insert(case.id, case.clone());
        case
    }

    pub fn case_count(&self) -> usize {
        self.store.lock().unwrap().cases.len()
    }

    pub fn user_role(&self, id: Uuid) -> Option<Role> {
        self.store.lock().unwrap().users.get(&id).map(|(u, _)| u.role)
    }
}

#[async_trait]
impl Repository for MemoryRepo {
    async fn get_user(&self, id: Uuid) -> Option<User> {
        self.store.lock().unwrap().users.get(&id).map(|(u, _)| u.clone())
    }

    async fn find_credentials(&self, email: &str) -> Option<UserCredentials> {
        self.store
            .lock()
            .unwrap()
            .users
            .values()
            .find(|(u, _)| u.email == email)
            .map(|(user, hash)| UserCredentials {
                user: user.clone(),
                password_hash: hash.clone(),
            })
    }

    async fn create_user(&self, new: NewUser) -> Result<User, RepoError> {
        let mut store = self.store.lock().unwrap();
        if store.users.values().any(|(u, _)| u.email == new.email) {
            return Err(RepoError::Conflict("email is already registered".to_string()));
        }
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            full_name: new.full_name,
            role: new.role,
            created_at: Utc::now(),
        };
        store
            .users
            .insert(user.id, (user.clone(), new.password_hash));
        Ok(user)
    }

    async fn list_users(&self) -> Vec<User> {
        let mut users: Vec<User> = self
            .store
            .lock()
            .unwrap()
            .users
            .values()
            .map(|(u, _)| u.clone())
            .collect();
        users.sort_by_key(|u| u.created_at);
        users
    }

    async fn set_user_role(&self, id: Uuid, role: Role) -> Option<User> {
        let mut store = self.store.lock().unwrap();
        let (user, _) = store.users.get_mut(&id)?;
        user.role = role;
        Some(user.clone())
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, RepoError> {
        let mut store = self.store.lock().unwrap();
        if store.cases.values().any(|c| c.created_by == id) {
            return Err(RepoError::Conflict("user still owns case records".to_string()));
        }
        Ok(store.users.remove(&id).is_some())
    }

    async fn list_cases(&self, status: Option<CaseStatus>, search: Option<String>) -> Vec<Case> {
        let needle = search.map(|s| s.trim().to_lowercase());
        let mut cases: Vec<Case> = self
            .store
            .lock()
            .unwrap()
            .cases
            .values()
            .filter(|c| status.is_none_or(|s| c.status == s))
            .filter(|c| match needle.as_deref() {
                None | Some("") => true,
                Some(n) => [&c.title, &c.description, &c.case_number]
                    .iter()
                    .any(|field| field.to_lowercase().contains(n)),
            })
            .cloned()
            .collect();
        cases.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        cases
    }

    async fn get_case(&self, id: Uuid) -> Option<Case> {
        self.store.lock().unwrap().cases.get(&id).cloned()
    }

    async fn create_case(&self, req: CreateCaseRequest, created_by: Uuid) -> Result<Case, RepoError> {
        let mut store = self.store.lock().unwrap();
        if store.cases.values().any(|c| c.case_number == req.case_number) {
            return Err(RepoError::Conflict("case number is already in use".to_string()));
        }
        let now = Utc::now();
        let case = Case {
            id: Uuid::new_v4(),
            case_number: req.case_number,
            title: req.title,
            description: req.description,
            status: CaseStatus::Open,
            created_by,
            created_at: now,
            updated_at: now,
        };
        store.cases.insert(case.id, case.clone());
        Ok(case)
    }

    async fn update_case(&self, id: Uuid, req: UpdateCaseRequest) -> Option<Case> {
        let mut store = self.store.lock().unwrap();
        let case = store.cases.get_mut(&id)?;
        if let Some(title) = req.title {
            case.title = title;
        }
        if let Some(description) = req.description {
            case.description = description;
        }
        case.updated_at = Utc::now();
        Some(case.clone())
    }

    async fn set_case_status(&self, id: Uuid, status: CaseStatus) -> Option<Case> {
        let mut store = self.store.lock().unwrap();
        let case = store.cases.get_mut(&id)?;
        case.status = status;
        case.updated_at = Utc::now();
        Some(case.clone())
    }

    async fn delete_case(&self, id: Uuid) -> bool {
        self.store.lock().unwrap().cases.remove(&id).is_some()
    }
}

// --- App helpers ---

pub fn app_state(repo: MemoryRepo, env: Env) -> AppState {
    let config = AppConfig {
        env,
        ..AppConfig::default()
    };
    AppState {
        repo: Arc::new(repo),
        config,
    }
}

pub fn app(repo: MemoryRepo) -> Router {
    create_router(app_state(repo, Env::Local))
}

pub fn bearer(user_id: Uuid) -> String {
    let token = auth::issue_token(user_id, &AppConfig::default()).unwrap();
    format!("Bearer {token}")
}

/// Builds a request authenticated with a Bearer token for `as_user`, or anonymous when
/// `as_user` is `None`.
pub fn request(method: &str, uri: &str, as_user: Option<Uuid>, body: Option<serde_json::Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(id) = as_user {
        builder = builder.header("authorization", bearer(id));
    }
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn send(app: &Router, req: Request<Body>) -> Response<Body> {
    app.clone().oneshot(req).await.unwrap()
}

pub async fn json_body<T: DeserializeOwned>(response: Response<Body>) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn error_code(response: Response<Body>) -> String {
    let body: serde_json::Value = json_body(response).await;
    body["error"].as_str().unwrap_or_default().to_string()
}
