use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    extract::{FromRef, FromRequestParts, Request},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    access::{AccessError, CallerIdentity, Role},
    config::{AppConfig, BootstrapAccount, Env},
    models::{NewUser, User},
    repository::{RepoError, Repository, RepositoryState},
};

/// Claims
///
/// Payload of an access token. Only the subject is trusted from the token; the role is
/// always re-read from the user store so a demotion takes effect on the next request.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
}

/// Signs an HS256 access token for `user_id` valid for `config.token_ttl_secs`.
pub fn issue_token(user_id: Uuid, config: &AppConfig) -> Result<String, jsonwebtoken::errors::Error> {
    let now = usize::try_from(Utc::now().timestamp()).unwrap_or(0);
    let ttl = usize::try_from(config.token_ttl_secs).unwrap_or(usize::MAX);
    let claims = Claims {
        sub: user_id,
        iat: now,
        exp: now.saturating_add(ttl),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
}

/// Validates signature and expiry, returning the subject.
pub fn verify_token(token: &str, config: &AppConfig) -> Result<Uuid, jsonwebtoken::errors::Error> {
    let mut validation = Validation::default();
    validation.validate_exp = true;
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )?;
    Ok(data.claims.sub)
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

/// False for a wrong password; an unparseable stored hash is an error.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed = PasswordHash::new(hash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// CallerIdentity Extractor
///
/// Resolves who is calling. Tried in order:
/// 1. An identity already stored in the request extensions by `authenticate`.
/// 2. `Env::Local` only: an `x-user-id` header naming an existing user.
/// 3. A Bearer token whose subject still exists in the user store.
///
/// Rejection: `AccessError::Unauthenticated` on any failure.
impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AccessError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<CallerIdentity>() {
            return Ok(identity.clone());
        }

        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        if config.env == Env::Local {
            let bypass = parts
                .headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
                .and_then(|id| Uuid::parse_str(id).ok());
            if let Some(user_id) = bypass {
                if let Some(user) = repo.get_user(user_id).await {
                    return Ok(CallerIdentity {
                        id: user.id,
                        role: user.role,
                    });
                }
            }
        }

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(AccessError::Unauthenticated)?;

        let user_id = verify_token(token, &config).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => tracing::debug!("expired access token"),
                _ => tracing::debug!("rejected access token: {}", e),
            }
            AccessError::Unauthenticated
        })?;

        // The account may have been removed after the token was issued.
        let user = repo
            .get_user(user_id)
            .await
            .ok_or(AccessError::Unauthenticated)?;

        Ok(CallerIdentity {
            id: user.id,
            role: user.role,
        })
    }
}

/// authenticate
///
/// Route layer for every protected table. Resolves the caller once and stores the
/// identity in the request extensions for the access gate and the handler.
pub async fn authenticate(identity: CallerIdentity, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(identity);
    next.run(request).await
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("{0} is already registered without the SP role")]
    EmailTaken(String),
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// ensure_bootstrap_sp
///
/// Creates the configured first SP if no account uses its email yet. Returns the new
/// account, or `None` when the SP already exists. An existing non-SP account with that
/// email is never promoted: whoever registered it chose the password.
pub async fn ensure_bootstrap_sp(
    repo: &dyn Repository,
    account: &BootstrapAccount,
) -> Result<Option<User>, BootstrapError> {
    if let Some(existing) = repo.find_credentials(&account.email).await {
        return match existing.user.role {
            Role::Sp => Ok(None),
            _ => Err(BootstrapError::EmailTaken(account.email.clone())),
        };
    }

    let password = account.password.clone();
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| BootstrapError::Hash(e.to_string()))?
        .map_err(|e| BootstrapError::Hash(e.to_string()))?;

    let user = repo
        .create_user(NewUser {
            email: account.email.clone(),
            full_name: account.full_name.clone(),
            role: Role::Sp,
            password_hash,
        })
        .await?;
    Ok(Some(user))
}
