use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    auth::{password, AuthenticatedUser},
    error::{AppError, AppResult, FieldErrors},
    models::User,
    routes::users::{check_profile, UserResponse},
    schema::users,
    state::AppState,
    utils::text::optional_text,
};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: AuthenticatedUser,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Fields a user may change on their own account. Omitted fields stay as
/// they are; blank values clear them.
#[derive(Deserialize)]
pub struct ProfileRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
}

#[derive(AsChangeset)]
#[diesel(table_name = users)]
struct ProfileChangeset {
    full_name: Option<Option<String>>,
    email: Option<Option<String>>,
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let mut conn = state.db()?;

    let user: Option<User> = users::table
        .filter(users::username.eq(payload.username.trim()))
        .first(&mut conn)
        .optional()?;
    let Some(user) = user else {
        warn!(username = %payload.username, "login for unknown user");
        return Err(AppError::unauthorized());
    };

    let valid = password::verify_password(&payload.password, &user.password_hash)
        .map_err(|_| AppError::unauthorized())?;
    if !valid {
        warn!(user_id = %user.id, "login with wrong password");
        return Err(AppError::unauthorized());
    }

    let access_token = state
        .jwt
        .generate_token(user.id, &user.username)
        .map_err(AppError::from)?;
    info!(user_id = %user.id, "user logged in");

    Ok(Json(LoginResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.jwt.expires_in_seconds(),
        user: AuthenticatedUser::from(user),
    }))
}

pub async fn me(user: AuthenticatedUser) -> Json<AuthenticatedUser> {
    Json(user)
}

pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<ProfileRequest>,
) -> AppResult<Json<UserResponse>> {
    let changeset = ProfileChangeset {
        full_name: payload.full_name.map(|value| optional_text(Some(value))),
        email: payload.email.map(|value| optional_text(Some(value))),
    };

    let mut fields = FieldErrors::new();
    check_profile(
        &mut fields,
        changeset.full_name.as_ref().and_then(Option::as_deref),
        changeset.email.as_ref().and_then(Option::as_deref),
    );
    if !fields.is_empty() {
        return Err(AppError::validation(fields));
    }

    let mut conn = state.db()?;
    let updated: User = diesel::update(users::table.find(user.user_id))
        .set((&changeset, users::updated_at.eq(Utc::now().naive_utc())))
        .get_result(&mut conn)?;

    info!(user_id = %updated.id, "profile updated");
    Ok(Json(UserResponse::from(updated)))
}

pub async fn change_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> AppResult<StatusCode> {
    if payload.new_password.chars().count() < password::MIN_PASSWORD_LENGTH {
        let mut fields = FieldErrors::new();
        fields.insert(
            "new_password".into(),
            format!(
                "new_password must be at least {} characters",
                password::MIN_PASSWORD_LENGTH
            ),
        );
        return Err(AppError::validation(fields));
    }

    let mut conn = state.db()?;
    let current: User = users::table.find(user.user_id).first(&mut conn)?;
    let valid = password::verify_password(&payload.current_password, &current.password_hash)
        .map_err(AppError::internal)?;
    if !valid {
        let mut fields = FieldErrors::new();
        fields.insert(
            "current_password".into(),
            "current_password is incorrect".into(),
        );
        return Err(AppError::validation(fields));
    }

    let password_hash = password::hash_password(&payload.new_password)?;
    diesel::update(users::table.find(user.user_id))
        .set((
            users::password_hash.eq(password_hash),
            users::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;

    info!(user_id = %user.user_id, "password changed");
    Ok(StatusCode::NO_CONTENT)
}
