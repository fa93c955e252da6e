use anyhow::{Context, Result};
use colored::Colorize;
use repokit::{
    config::Config,
    database::{create_pool, ping},
    error::{sanitize_url, Error},
    observability::init_tracing,
};
use std::path::PathBuf;

pub async fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let config = match &config_path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::load().context("Failed to load configuration")?,
    };
    init_tracing(&config)?;

    let db = config
        .database
        .as_ref()
        .ok_or_else(|| Error::NotConfigured("no [database] section found".to_string()))?;

    println!("{} {}", "Pinging".bold(), sanitize_url(&db.url));

    let pool = create_pool(db).await?;
    ping(&pool).await?;
    pool.close().await;

    println!("{}", "✓ Database reachable".green().bold());
    Ok(())
}
