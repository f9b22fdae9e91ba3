//! Authentication and role-based permissions
//!
//! Users live in memory with SHA-256 password hashes. A successful login
//! returns a random UUID session token; permissions are checked through the
//! role attached to the session. There are no built-in accounts: callers seed
//! the first administrator with [`AuthManager::seed_user`].

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Read,
    Write,
    Execute,
    ManageUsers,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Write => "write",
            Permission::Execute => "execute",
            Permission::ManageUsers => "manage_users",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
    Guest,
}

impl Role {
    pub fn permissions(&self) -> &'static [Permission] {
        match self {
            Role::Admin => &[
                Permission::Read,
                Permission::Write,
                Permission::Execute,
                Permission::ManageUsers,
            ],
            Role::User => &[Permission::Read, Permission::Write, Permission::Execute],
            Role::Guest => &[Permission::Read],
        }
    }

    pub fn allows(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }
}

impl FromStr for Role {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            "guest" => Ok(Role::Guest),
            other => Err(EngineError::Config(format!("Unknown role: {}", other))),
        }
    }
}

#[derive(Debug, Clone)]
struct UserRecord {
    password_hash: String,
    role: Role,
}

/// An authenticated session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub username: String,
    pub role: Role,
    pub created_at: String,
}

#[derive(Debug, Default)]
struct AuthState {
    users: HashMap<String, UserRecord>,
    sessions: HashMap<String, Session>,
}

#[derive(Debug, Default)]
pub struct AuthManager {
    state: Mutex<AuthState>,
}

fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

impl AuthManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, AuthState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a user without a session check, for bootstrapping
    ///
    /// Fails if the username is taken.
    pub fn seed_user(&self, username: &str, password: &str, role: Role) -> Result<(), EngineError> {
        let mut state = self.state();
        if state.users.contains_key(username) {
            return Err(EngineError::Config(format!(
                "User {} already exists",
                username
            )));
        }
        state.users.insert(
            username.to_string(),
            UserRecord {
                password_hash: hash_password(password),
                role,
            },
        );
        tracing::info!("Registered user {} with role {:?}", username, role);
        Ok(())
    }

    /// Check credentials and open a session
    pub fn authenticate(&self, username: &str, password: &str) -> Result<String, EngineError> {
        let mut state = self.state();
        let role = match state.users.get(username) {
            Some(user) if user.password_hash == hash_password(password) => user.role,
            Some(_) => {
                tracing::warn!("Authentication failed: invalid password for {}", username);
                return Err(EngineError::Unauthorized);
            }
            None => {
                tracing::warn!("Authentication failed: unknown user {}", username);
                return Err(EngineError::Unauthorized);
            }
        };

        let token = uuid::Uuid::new_v4().to_string();
        state.sessions.insert(
            token.clone(),
            Session {
                username: username.to_string(),
                role,
                created_at: chrono::Utc::now().to_rfc3339(),
            },
        );
        tracing::info!("User {} authenticated", username);
        Ok(token)
    }

    pub fn validate_session(&self, token: &str) -> bool {
        self.state().sessions.contains_key(token)
    }

    pub fn session(&self, token: &str) -> Option<Session> {
        self.state().sessions.get(token).cloned()
    }

    /// `Unauthorized` for an unknown token, `PermissionDenied` when the role
    /// lacks the permission
    pub fn check_permission(&self, token: &str, permission: Permission) -> Result<(), EngineError> {
        let state = self.state();
        let session = state.sessions.get(token).ok_or(EngineError::Unauthorized)?;
        if session.role.allows(permission) {
            Ok(())
        } else {
            tracing::warn!(
                "User {} denied permission {}",
                session.username,
                permission
            );
            Err(EngineError::PermissionDenied(format!(
                "{} lacks {}",
                session.username, permission
            )))
        }
    }

    /// Drop a session; returns whether it existed
    pub fn logout(&self, token: &str) -> bool {
        match self.state().sessions.remove(token) {
            Some(session) => {
                tracing::info!("Session closed for user {}", session.username);
                true
            }
            None => false,
        }
    }

    /// Create a user on behalf of a session holding `manage_users`
    pub fn add_user(
        &self,
        admin_token: &str,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<(), EngineError> {
        self.check_permission(admin_token, Permission::ManageUsers)?;
        self.seed_user(username, password, role)
    }

    pub fn user_count(&self) -> usize {
        self.state().users.len()
    }
}
