// dbcopytool/src/restore/db_prepare.rs
use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;

use crate::config::RunConfig;

const DEFAULT_ENCODING: &str = "UTF8";

/// Asks the remote server how the source database is encoded so the local
/// copy can be created to match. Falls back to UTF8 when the catalog row is
/// missing or unreadable; a wrong guess surfaces later as restore errors, a
/// missing answer should not stop the copy.
pub async fn detect_remote_encoding(config: &RunConfig) -> String {
    let url = match config.remote.database_url() {
        Ok(url) => url,
        Err(_) => return DEFAULT_ENCODING.to_string(),
    };

    let pool = match PgPoolOptions::new().max_connections(1).connect(&url).await {
        Ok(pool) => pool,
        Err(e) => {
            println!(
                "⚠️ Could not connect to the remote server to read its encoding ({e}), defaulting to {DEFAULT_ENCODING}"
            );
            return DEFAULT_ENCODING.to_string();
        }
    };

    let row: Result<Option<String>, sqlx::Error> =
        sqlx::query_scalar("SELECT pg_encoding_to_char(encoding) FROM pg_database WHERE datname = $1")
            .bind(&config.remote.db)
            .fetch_optional(&pool)
            .await;

    match row {
        Ok(Some(encoding)) if !encoding.trim().is_empty() => {
            println!("Remote database encoding: {encoding}");
            encoding
        }
        Ok(_) => {
            println!(
                "⚠️ Remote catalog has no encoding entry for '{}', defaulting to {DEFAULT_ENCODING}",
                config.remote.db
            );
            DEFAULT_ENCODING.to_string()
        }
        Err(e) => {
            println!("⚠️ Encoding query failed ({e}), defaulting to {DEFAULT_ENCODING}");
            DEFAULT_ENCODING.to_string()
        }
    }
}

/// Creates the target database if it is absent. An existing database is left
/// untouched so re-runs are safe; dropping one is an explicit operator action
/// outside this tool.
///
/// Returns true when the database was created by this call.
pub async fn ensure_target_database(config: &RunConfig, encoding: &str) -> Result<bool> {
    let admin_url = config.local.database_url_for("postgres")?;
    let admin_pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&admin_url)
        .await
        .with_context(|| {
            format!(
                "Failed to connect to the 'postgres' database on local port {}",
                config.local.port
            )
        })?;

    let db_exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(&config.local.db)
            .fetch_one(&admin_pool)
            .await
            .with_context(|| {
                format!(
                    "Failed to check existence of database '{}'",
                    config.local.db
                )
            })?;

    if db_exists {
        println!(
            "Database '{}' already exists on the local server, skipping creation.",
            config.local.db
        );
        return Ok(false);
    }

    println!(
        "Creating database '{}' with encoding {}...",
        config.local.db, encoding
    );
    // template0 is the only template that accepts an arbitrary encoding.
    let create_sql = format!(
        r#"CREATE DATABASE "{}" ENCODING '{}' TEMPLATE template0"#,
        config.local.db.replace('"', "\"\""),
        encoding.replace('\'', "''"),
    );
    sqlx::query(&create_sql)
        .execute(&admin_pool)
        .await
        .with_context(|| format!("Failed to create database '{}'", config.local.db))?;

    println!("✓ Database '{}' created.", config.local.db);
    Ok(true)
}
