use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::UserError;

/// Closed set of roles a user can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Doctor,
    Patient,
    Secretary,
}

impl UserRole {
    pub const ALL: [UserRole; 4] = [
        UserRole::Admin,
        UserRole::Doctor,
        UserRole::Patient,
        UserRole::Secretary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Doctor => "doctor",
            UserRole::Patient => "patient",
            UserRole::Secretary => "secretary",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = UserError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        UserRole::ALL
            .into_iter()
            .find(|role| role.as_str() == value)
            .ok_or_else(|| UserError::InvalidRole(value.to_string()))
    }
}

/// A registered account
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub dni: Option<String>,
    pub phone: Option<String>,
    pub birthdate: Option<NaiveDate>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Self-registered accounts always start as active patients.
    pub fn new_patient(email: String, first_name: String, last_name: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email,
            first_name,
            last_name,
            role: UserRole::Patient,
            dni: None,
            phone: None,
            birthdate: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_role(&mut self, role: UserRole) {
        self.role = role;
        self.updated_at = Utc::now();
    }

    /// Applies the fields present in `changes`; absent ones are left alone.
    pub fn apply(&mut self, changes: ProfileChanges) {
        if let Some(first_name) = changes.first_name {
            self.first_name = first_name;
        }
        if let Some(last_name) = changes.last_name {
            self.last_name = last_name;
        }
        if let Some(dni) = changes.dni {
            self.dni = Some(dni);
        }
        if let Some(phone) = changes.phone {
            self.phone = Some(phone);
        }
        if let Some(birthdate) = changes.birthdate {
            self.birthdate = Some(birthdate);
        }
        self.updated_at = Utc::now();
    }
}

/// Already-validated profile edits
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub dni: Option<String>,
    pub phone: Option<String>,
    pub birthdate: Option<NaiveDate>,
}

impl ProfileChanges {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.dni.is_none()
            && self.phone.is_none()
            && self.birthdate.is_none()
    }
}
