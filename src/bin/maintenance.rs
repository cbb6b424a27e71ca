use std::env;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use diesel::prelude::*;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use tracker::{
    auth::password,
    config::AppConfig,
    db,
    models::NewUser,
    schema::{refresh_tokens, users},
};

const USAGE: &str = "Usage: maintenance create-user <email> <password> | prune-refresh-tokens";

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("create-user") => {
            let (Some(email), Some(plain)) = (args.next(), args.next()) else {
                eprintln!("{USAGE}");
                std::process::exit(1);
            };
            create_user(&email, &plain)?;
        }
        Some("prune-refresh-tokens") => prune_refresh_tokens()?,
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn connect() -> Result<db::PgPool> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        "loaded backend configuration"
    );
    let pool = db::init_pool(&config.database_url)?;
    let mut conn = pool.get().context("failed to get database connection")?;
    db::run_migrations(&mut conn)?;
    Ok(pool)
}

fn create_user(email: &str, plain: &str) -> Result<()> {
    let email = email.trim().to_lowercase();
    if !email.contains('@') {
        bail!("enter a valid email");
    }
    if plain.chars().count() < password::MIN_PASSWORD_LENGTH {
        bail!(
            "password must be at least {} characters",
            password::MIN_PASSWORD_LENGTH
        );
    }

    let pool = connect()?;
    let mut conn = pool.get().context("failed to get database connection")?;

    let user = NewUser {
        id: Uuid::new_v4(),
        email,
        name: None,
        password_hash: Some(password::hash_password(plain)?),
    };
    diesel::insert_into(users::table)
        .values(&user)
        .execute(&mut conn)
        .context("failed to insert user")?;

    println!("Created user {} ({})", user.email, user.id);
    Ok(())
}

fn prune_refresh_tokens() -> Result<()> {
    let pool = connect()?;
    let mut conn = pool.get().context("failed to get database connection")?;
    let now = Utc::now().naive_utc();

    let deleted = diesel::delete(
        refresh_tokens::table.filter(
            refresh_tokens::expires_at
                .le(now)
                .or(refresh_tokens::revoked_at.is_not_null()),
        ),
    )
    .execute(&mut conn)
    .context("failed to prune refresh tokens")?;

    println!("Deleted {deleted} refresh tokens.");
    Ok(())
}
