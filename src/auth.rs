// src/auth.rs
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::http::HeaderMap;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("email already registered")]
    EmailTaken,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("User not authenticated or invalid user data")]
    MissingToken,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("manager role required")]
    ManagerRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Employee,
    Manager,
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    #[serde(skip_serializing)]
    password_digest: String,
}

/// User registry with salted digests and opaque bearer tokens. Token
/// issuance is deliberately plain: JWT mechanics are not this service's
/// concern.
#[derive(Default)]
pub struct AuthService {
    users: Mutex<HashMap<String, Arc<User>>>,
    tokens: Mutex<HashMap<String, String>>,
}

fn random_string(len: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn digest_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn store_digest(password: &str) -> String {
    let salt = random_string(16);
    format!("{}${}", salt, digest_password(&salt, password))
}

fn verify_digest(stored: &str, password: &str) -> bool {
    match stored.split_once('$') {
        Some((salt, digest)) => digest_password(salt, password) == digest,
        None => false,
    }
}

impl AuthService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
        role: Role,
    ) -> Result<Arc<User>, AuthError> {
        let mut users = self.users.lock().unwrap();
        if users.contains_key(email) {
            return Err(AuthError::EmailTaken);
        }
        let user = Arc::new(User {
            id: random_string(24),
            email: email.to_string(),
            full_name: full_name.to_string(),
            role,
            password_digest: store_digest(password),
        });
        info!("Registered user {} ({:?})", email, role);
        users.insert(email.to_string(), user.clone());
        Ok(user)
    }

    /// Seed a manager account from configuration at startup so a fresh
    /// deployment has a reviewer without a manual registration step.
    pub fn seed_manager(&self, email: &str, password: &str) {
        match self.register(email, password, "Manager", Role::Manager) {
            Ok(_) => info!("Seeded manager account {}", email),
            Err(AuthError::EmailTaken) => {}
            Err(e) => info!("Could not seed manager account {}: {}", email, e),
        }
    }

    pub fn login(&self, email: &str, password: &str) -> Result<(String, Arc<User>), AuthError> {
        let users = self.users.lock().unwrap();
        let user = users.get(email).ok_or(AuthError::InvalidCredentials)?;
        if !verify_digest(&user.password_digest, password) {
            return Err(AuthError::InvalidCredentials);
        }
        let token = random_string(32);
        self.tokens
            .lock()
            .unwrap()
            .insert(token.clone(), user.email.clone());
        Ok((token, user.clone()))
    }

    pub fn authenticate(&self, token: &str) -> Result<Arc<User>, AuthError> {
        let tokens = self.tokens.lock().unwrap();
        let email = tokens.get(token).ok_or(AuthError::InvalidToken)?;
        let users = self.users.lock().unwrap();
        users.get(email).cloned().ok_or(AuthError::InvalidToken)
    }

    pub fn user_from_headers(&self, headers: &HeaderMap) -> Result<Arc<User>, AuthError> {
        let auth_header = headers
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .ok_or(AuthError::MissingToken)?;
        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::MissingToken)?;
        self.authenticate(token)
    }

    pub fn user_by_id(&self, id: &str) -> Option<Arc<User>> {
        let users = self.users.lock().unwrap();
        users.values().find(|u| u.id == id).cloned()
    }
}

pub fn require_manager(user: &User) -> Result<(), AuthError> {
    if user.role == Role::Manager {
        Ok(())
    } else {
        Err(AuthError::ManagerRequired)
    }
}
