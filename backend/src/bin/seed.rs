use std::env;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use diesel::prelude::*;
use uuid::Uuid;

use mailroom::{
    auth::password,
    config::AppConfig,
    db,
    models::{NewUser, UserRole},
    schema::users,
};

const USAGE: &str = "Usage: seed <username> <password> <secretary|admin|user>";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt().with_target(false).compact().init();

    let args: Vec<String> = env::args().skip(1).collect();
    let [username, password_value, role] = args.as_slice() else {
        eprintln!("{USAGE}");
        std::process::exit(1);
    };
    let role: UserRole = role.parse().map_err(|err: String| anyhow!(err))?;
    if password_value.chars().count() < password::MIN_PASSWORD_LENGTH {
        return Err(anyhow!(
            "password must be at least {} characters",
            password::MIN_PASSWORD_LENGTH
        ));
    }

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "seed",
        database_url = %config.redacted_database_url(),
        "loaded configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    db::run_migrations(&pool)?;
    let mut conn = pool.get().context("failed to get database connection")?;

    let password_hash = password::hash_password(password_value)?;
    let new_user = NewUser {
        id: Uuid::new_v4(),
        username: username.trim().to_string(),
        password_hash,
        full_name: None,
        email: None,
        role: role.as_str().to_string(),
    };

    let affected = diesel::insert_into(users::table)
        .values(&new_user)
        .on_conflict(users::username)
        .do_update()
        .set((
            users::password_hash.eq(&new_user.password_hash),
            users::role.eq(&new_user.role),
            users::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)
        .context("failed to upsert user")?;

    println!("Account '{}' ready as {role} ({affected} row written).", new_user.username);
    Ok(())
}
