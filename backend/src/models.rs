use std::{fmt, str::FromStr};

use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::*;

/// Role tier stored in `users.role`.
///
/// `Secretary` is the single privileged role: the only one allowed to
/// register, edit or remove letters and to manage accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Secretary,
    Admin,
    User,
}

impl UserRole {
    pub const ALL: [UserRole; 3] = [UserRole::Secretary, UserRole::Admin, UserRole::User];

    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Secretary => "secretary",
            UserRole::Admin => "admin",
            UserRole::User => "user",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        UserRole::ALL
            .into_iter()
            .find(|role| role.as_str() == normalized)
            .ok_or_else(|| {
                format!("unknown role '{value}'. Allowed roles: secretary, admin, user")
            })
    }
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub role: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl User {
    /// Unknown role strings degrade to the least privileged tier.
    pub fn role(&self) -> UserRole {
        self.role.parse().unwrap_or(UserRole::User)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub role: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = attachments)]
pub struct Attachment {
    pub id: Uuid,
    pub token: String,
    pub filename: String,
    pub storage_key: String,
    pub size_bytes: i64,
    pub content_type: Option<String>,
    pub checksum: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = attachments)]
pub struct NewAttachment {
    pub id: Uuid,
    pub token: String,
    pub filename: String,
    pub storage_key: String,
    pub size_bytes: i64,
    pub content_type: Option<String>,
    pub checksum: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = incoming_letters)]
pub struct IncomingLetter {
    pub id: i64,
    pub reference_number: String,
    pub origin_number: String,
    pub document_date: NaiveDate,
    pub origin_date: NaiveDate,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub owner_id: Option<Uuid>,
    pub is_read: bool,
    pub disposed: bool,
    pub attachment_token: Option<String>,
    pub registered_on: NaiveDate,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = incoming_letters)]
pub struct NewIncomingLetter {
    pub reference_number: String,
    pub origin_number: String,
    pub document_date: NaiveDate,
    pub origin_date: NaiveDate,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub owner_id: Option<Uuid>,
    pub attachment_token: Option<String>,
    pub registered_on: NaiveDate,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = outgoing_letters)]
pub struct OutgoingLetter {
    pub id: i64,
    pub reference_number: String,
    pub document_date: NaiveDate,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub owner_id: Option<Uuid>,
    pub disposed: bool,
    pub warning: bool,
    pub attachment_token: Option<String>,
    pub registered_on: NaiveDate,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = outgoing_letters)]
pub struct NewOutgoingLetter {
    pub reference_number: String,
    pub document_date: NaiveDate,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub owner_id: Option<Uuid>,
    pub attachment_token: Option<String>,
    pub registered_on: NaiveDate,
}
