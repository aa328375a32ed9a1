use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::{prelude::*, result::DatabaseErrorKind};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::{password, AuthenticatedUser},
    error::{AppError, AppResult, FieldErrors},
    models::{NewUser, User, UserRole},
    permissions,
    schema::users,
    state::AppState,
    utils::{
        text::{check_email, check_length, optional_text},
        time::to_iso,
    },
};

pub const MAX_USERNAME_CHARS: usize = 100;
pub const MAX_PROFILE_TEXT_CHARS: usize = 255;

#[derive(Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub role: UserRole,
    pub created_at: String,
    pub updated_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        let role = user.role();
        Self {
            id: user.id,
            username: user.username,
            full_name: user.full_name,
            email: user.email,
            role,
            created_at: to_iso(user.created_at),
            updated_at: to_iso(user.updated_at),
        }
    }
}

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateUserRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub password: Option<String>,
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = users)]
struct UserChangeset {
    full_name: Option<Option<String>>,
    email: Option<Option<String>>,
    role: Option<String>,
    password_hash: Option<String>,
}

fn ensure_manager(user: &AuthenticatedUser) -> AppResult<()> {
    if permissions::can_manage_users(user) {
        Ok(())
    } else {
        Err(AppError::forbidden())
    }
}

/// Length and format checks for the optional profile columns.
pub fn check_profile(fields: &mut FieldErrors, full_name: Option<&str>, email: Option<&str>) {
    if let Some(full_name) = full_name {
        check_length(fields, "full_name", full_name, MAX_PROFILE_TEXT_CHARS);
    }
    if let Some(email) = email {
        if check_length(fields, "email", email, MAX_PROFILE_TEXT_CHARS) {
            check_email(fields, "email", email);
        }
    }
}

fn parse_role(fields: &mut FieldErrors, value: &str) -> Option<UserRole> {
    match value.parse::<UserRole>() {
        Ok(role) => Some(role),
        Err(message) => {
            fields.insert("role".into(), message);
            None
        }
    }
}

fn check_password(fields: &mut FieldErrors, value: &str) {
    if value.chars().count() < password::MIN_PASSWORD_LENGTH {
        fields.insert(
            "password".into(),
            format!(
                "password must be at least {} characters",
                password::MIN_PASSWORD_LENGTH
            ),
        );
    }
}

pub async fn list_users(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<UserResponse>>> {
    ensure_manager(&user)?;
    let mut conn = state.db()?;
    let rows: Vec<User> = users::table
        .order(users::username.asc())
        .load(&mut conn)?;
    Ok(Json(rows.into_iter().map(UserResponse::from).collect()))
}

pub async fn create_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    ensure_manager(&user)?;

    let mut fields = FieldErrors::new();
    let username = optional_text(payload.username);
    match username.as_deref() {
        None => {
            fields.insert("username".into(), "username is required".into());
        }
        Some(name) => {
            check_length(&mut fields, "username", name, MAX_USERNAME_CHARS);
        }
    }
    let full_name = optional_text(payload.full_name);
    let email = optional_text(payload.email);
    check_profile(&mut fields, full_name.as_deref(), email.as_deref());
    let password_value = payload.password.unwrap_or_default();
    check_password(&mut fields, &password_value);
    let role = match payload.role.as_deref() {
        Some(value) => parse_role(&mut fields, value),
        None => Some(UserRole::User),
    };

    let (Some(username), Some(role), true) = (username, role, fields.is_empty()) else {
        return Err(AppError::validation(fields));
    };

    let new_user = NewUser {
        id: Uuid::new_v4(),
        username,
        password_hash: password::hash_password(&password_value)?,
        full_name,
        email,
        role: role.as_str().to_string(),
    };

    let mut conn = state.db()?;
    let created: User = match diesel::insert_into(users::table)
        .values(&new_user)
        .get_result(&mut conn)
    {
        Ok(created) => created,
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            return Err(AppError::bad_request("username already exists"));
        }
        Err(err) => return Err(AppError::from(err)),
    };

    info!(user_id = %created.id, role = %role, created_by = %user.user_id, "user created");
    Ok((StatusCode::CREATED, Json(UserResponse::from(created))))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<UpdateUserRequest>,
) -> AppResult<Json<UserResponse>> {
    ensure_manager(&user)?;

    let mut fields = FieldErrors::new();
    let mut changeset = UserChangeset::default();
    if let Some(full_name) = payload.full_name {
        changeset.full_name = Some(optional_text(Some(full_name)));
    }
    if let Some(email) = payload.email {
        changeset.email = Some(optional_text(Some(email)));
    }
    check_profile(
        &mut fields,
        changeset.full_name.as_ref().and_then(Option::as_deref),
        changeset.email.as_ref().and_then(Option::as_deref),
    );
    if let Some(role) = payload.role.as_deref() {
        changeset.role = parse_role(&mut fields, role).map(|role| role.as_str().to_string());
    }
    if let Some(new_password) = payload.password.as_deref() {
        check_password(&mut fields, new_password);
        if fields.get("password").is_none() {
            changeset.password_hash = Some(password::hash_password(new_password)?);
        }
    }
    if !fields.is_empty() {
        return Err(AppError::validation(fields));
    }

    let mut conn = state.db()?;
    let updated: User = diesel::update(users::table.find(user_id))
        .set((&changeset, users::updated_at.eq(Utc::now().naive_utc())))
        .get_result(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::not_found_with("user not found"))?;

    info!(user_id = %updated.id, updated_by = %user.user_id, "user updated");
    Ok(Json(UserResponse::from(updated)))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<StatusCode> {
    ensure_manager(&user)?;
    if user_id == user.user_id {
        return Err(AppError::bad_request("you cannot delete your own account"));
    }

    let mut conn = state.db()?;
    let deleted = diesel::delete(users::table.find(user_id)).execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::not_found_with("user not found"));
    }

    info!(user_id = %user_id, deleted_by = %user.user_id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}
