use dotenvy::dotenv;
use eyre::Result;
use tracing::info;

use strategy_config_tuner::config;
use strategy_config_tuner::db::{
    connection,
    schema,
};
use strategy_config_tuner::logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    // Initialize logging
    if let Err(e) = logging::init_logging(env!("CARGO_BIN_NAME").to_string()) {
        eprintln!("Failed to initialize logging: {}", e);
        return Err(e);
    }

    let cfg = config::Config::load()?;
    info!(max_connections = cfg.max_connections, "Configuration loaded and logging initialized");

    // Initialize database connection pool
    let pool = connection::create_pool(&cfg).await?;
    info!("Database connection pool created");

    // Initialize database schema
    schema::init_schema(&pool).await?;
    info!("Database schema initialized");

    pool.close().await; // flush pending work before exit
    Ok(())
}
