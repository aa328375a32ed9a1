mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, read_json, TestApp};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
struct AuthenticatedUser {
    username: String,
    role: String,
}

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct Profile {
    username: String,
    role: String,
    full_name: Option<String>,
    email: Option<String>,
}

#[derive(Serialize)]
struct ProfileUpdate<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    full_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
}

#[derive(Serialize)]
struct PasswordChange<'a> {
    current_password: &'a str,
    new_password: &'a str,
}

#[tokio::test]
async fn login_and_me_roundtrip() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    let password = "s3cret!";
    app.insert_user("sekdes", password, "secretary").await?;

    let token = app.login_token("sekdes", password).await?;

    let response = app.get("/api/auth/me", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let user: AuthenticatedUser = read_json(response).await?;

    assert_eq!(user.username, "sekdes");
    assert_eq!(user.role, "secretary");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn rejects_bad_credentials_and_missing_tokens() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    app.insert_user("kaur", "correct-horse", "user").await?;

    for (username, password) in [("kaur", "wrong-horse"), ("nobody", "correct-horse")] {
        let response = app
            .post_json("/api/auth/login", &Credentials { username, password }, None)
            .await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    for path in ["/api/incoming", "/api/outgoing", "/api/dashboard", "/api/auth/me"] {
        let response = app.get(path, None).await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{path}");
        let response = app.get(path, Some("not-a-jwt")).await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{path}");
    }

    let response = app.get("/api/health", None).await?;
    assert_eq!(response.status(), StatusCode::OK);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn changing_password_requires_the_current_one() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    app.insert_user("kaur", "old-password", "user").await?;
    let token = app.login_token("kaur", "old-password").await?;

    let response = app
        .post_json(
            "/api/auth/password",
            &PasswordChange {
                current_password: "guess",
                new_password: "new-password",
            },
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .post_json(
            "/api/auth/password",
            &PasswordChange {
                current_password: "old-password",
                new_password: "abc",
            },
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .post_json(
            "/api/auth/password",
            &PasswordChange {
                current_password: "old-password",
                new_password: "new-password",
            },
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert!(app.login_token("kaur", "old-password").await.is_err());
    app.login_token("kaur", "new-password").await?;

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn users_update_their_own_profile() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    app.insert_user("kaur", "kaur-password", "user").await?;
    let token = app.login_token("kaur", "kaur-password").await?;

    let response = app
        .patch_json(
            "/api/auth/me",
            &ProfileUpdate {
                full_name: Some("  Kaur Umum "),
                email: Some("kaur@desa.id"),
            },
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let profile: Profile = read_json(response).await?;
    assert_eq!(profile.username, "kaur");
    assert_eq!(profile.role, "user");
    assert_eq!(profile.full_name.as_deref(), Some("Kaur Umum"));
    assert_eq!(profile.email.as_deref(), Some("kaur@desa.id"));

    let response = app
        .patch_json(
            "/api/auth/me",
            &ProfileUpdate {
                full_name: Some("Kaur Keuangan"),
                email: Some("kaur at desa"),
            },
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let long_name = "n".repeat(256);
    let response = app
        .patch_json(
            "/api/auth/me",
            &ProfileUpdate {
                full_name: Some(&long_name),
                email: None,
            },
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // Omitted fields are left alone.
    let response = app
        .patch_json(
            "/api/auth/me",
            &ProfileUpdate {
                full_name: None,
                email: Some("kaur@kantor.desa.id"),
            },
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let profile: Profile = read_json(response).await?;
    assert_eq!(profile.full_name.as_deref(), Some("Kaur Umum"));
    assert_eq!(profile.email.as_deref(), Some("kaur@kantor.desa.id"));

    let response = app
        .patch_json("/api/auth/me", &ProfileUpdate { full_name: None, email: None }, None)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    app.cleanup().await?;
    Ok(())
}
