//! Roles, users and per-operation access rules.

use std::fmt;

use argon2::Argon2;
use password_hash::rand_core::OsRng;
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use serde::{Deserialize, Serialize};

use crate::db::user_repo::UserRow;
use crate::error::{ScriptsmithError, ValidationError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Developer,
    Qa,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Developer => "developer",
            Role::Qa => "qa",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "developer" => Ok(Role::Developer),
            "qa" => Ok(Role::Qa),
            "admin" => Ok(Role::Admin),
            _ => Err(ValidationError::UnknownRole(s.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations guarded by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    GenerateTests,
    GenerateCode,
    SearchHistory,
    DownloadScript,
    Rerun,
    ManageUsers,
}

impl Operation {
    pub fn allowed_roles(&self) -> &'static [Role] {
        match self {
            Operation::GenerateTests | Operation::GenerateCode => &[Role::Developer],
            Operation::SearchHistory | Operation::DownloadScript | Operation::Rerun => {
                &[Role::Developer, Role::Qa]
            }
            Operation::ManageUsers => &[Role::Admin],
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Operation::GenerateTests => "generate test scripts",
            Operation::GenerateCode => "generate code",
            Operation::SearchHistory => "view history",
            Operation::DownloadScript => "download scripts",
            Operation::Rerun => "rerun tests",
            Operation::ManageUsers => "manage users",
        }
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

impl User {
    pub fn new(id: i64, username: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            username: username.into(),
            role,
        }
    }

    /// Fails with `AccessDenied` unless this user's role may perform `op`.
    pub fn require(&self, op: Operation) -> Result<(), ScriptsmithError> {
        if op.allowed_roles().contains(&self.role) {
            Ok(())
        } else {
            log::warn!(
                "User '{}' ({}) denied: {}",
                self.username,
                self.role,
                op.describe()
            );
            Err(ScriptsmithError::AccessDenied(format!(
                "role '{}' may not {}",
                self.role,
                op.describe()
            )))
        }
    }
}

impl TryFrom<UserRow> for User {
    type Error = ValidationError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            role: Role::parse(&row.role)?,
            username: row.username,
        })
    }
}

/// Argon2id hash in PHC string form (`$argon2id$v=19$...`).
pub fn hash_password(password: &str) -> Result<String, ScriptsmithError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ScriptsmithError::PasswordHash(e.to_string()))
}

/// Checks `password` against a PHC string produced by [`hash_password`].
/// Anything that does not parse as a PHC string never verifies.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            log::warn!("Stored password hash is not a PHC string: {}", e);
            false
        }
    }
}
