use chrono::{DateTime, NaiveDate, Utc};
use secrecy::Secret;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};
use std::fmt;

use super::{decode_text_enum, UnknownVariant};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Copy, Clone, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Staff,
    #[default]
    Patient,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Staff => "staff",
            Role::Patient => "patient",
        }
    }

    /// Admins and staff manage the clinic; patients only see their own data.
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::Staff)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Role {
    type Error = UnknownVariant;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_str() {
            "admin" => Ok(Role::Admin),
            "staff" => Ok(Role::Staff),
            "patient" => Ok(Role::Patient),
            _ => Err(UnknownVariant {
                kind: "role",
                value: s,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserRole {
    pub id: i32,
    pub user_id: String,
    pub role: Role,
    pub rut: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub birth_date: Option<NaiveDate>,
}

impl<'r> FromRow<'r, PgRow> for UserRole {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(UserRole {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            role: decode_text_enum(row, "role")?,
            rut: row.try_get("rut")?,
            phone: row.try_get("phone")?,
            address: row.try_get("address")?,
            birth_date: row.try_get("birth_date")?,
        })
    }
}

/// Full replacement of a user's role row. Fields left out are cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUserRole {
    pub user_id: String,
    pub role: Role,
    pub rut: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub birth_date: Option<NaiveDate>,
}

impl NewUserRole {
    pub fn with_role(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            rut: None,
            phone: None,
            address: None,
            birth_date: None,
        }
    }
}

/// Local mirror of an identity owned by the external provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserWithRole {
    #[serde(flatten)]
    pub user: User,
    pub role: Option<Role>,
}

impl<'r> FromRow<'r, PgRow> for UserWithRole {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let role: Option<String> = row.try_get("role")?;
        Ok(UserWithRole {
            user: User::from_row(row)?,
            role: role
                .map(Role::try_from)
                .transpose()
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        })
    }
}

#[derive(Debug)]
pub struct NewUser {
    pub id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image_url: Option<String>,
    /// PHC string; `None` keeps whatever is stored.
    pub password_hash: Option<Secret<String>>,
}
