//! User profile records and the request bodies that create or change them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

/// A user profile, stored as JSON at `users/{id}/profile.json`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct User {
    /// Server-generated UUID. Never changes after creation.
    pub id: String,

    pub email: String,

    /// Display name.
    pub name: String,

    /// Free-form key/value pairs supplied by the client.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /api/v1/users`.
#[derive(Deserialize, Validate, Debug, Clone, Default)]
pub struct CreateUserRequest {
    #[serde(default)]
    #[validate(
        length(min = 1, message = "email is required"),
        email(message = "invalid email format")
    )]
    pub email: String,

    #[serde(default)]
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Body of `PUT /api/v1/users/{id}`. Absent or empty fields keep their value.
#[derive(Deserialize, Validate, Debug, Clone, Default)]
pub struct UpdateUserRequest {
    #[validate(email(message = "invalid email format"))]
    pub email: Option<String>,

    pub name: Option<String>,

    /// Replaces the whole metadata map when present.
    pub metadata: Option<HashMap<String, String>>,
}

impl UpdateUserRequest {
    /// Treat empty strings as "not supplied".
    pub fn normalized(self) -> Self {
        Self {
            email: self.email.filter(|v| !v.is_empty()),
            name: self.name.filter(|v| !v.is_empty()),
            metadata: self.metadata,
        }
    }
}

/// Response body of `GET /api/v1/users`.
#[derive(Serialize, Debug)]
pub struct UserList {
    pub users: Vec<User>,
    pub count: usize,
}

impl From<Vec<User>> for UserList {
    fn from(users: Vec<User>) -> Self {
        Self {
            count: users.len(),
            users,
        }
    }
}
