use sqlx::ConnectOptions;
use sqlx::postgres::{
    PgConnectOptions,
    PgPool,
    PgPoolOptions,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::log::LevelFilter;

use crate::config::Config;

pub async fn create_pool(config: &Config) -> Result<PgPool, sqlx::Error> {
    let database_url = config
        .database_url
        .as_deref()
        .ok_or_else(|| sqlx::Error::Configuration("DATABASE_URL is not set".into()))?;

    let connect_options = PgConnectOptions::from_str(database_url)?
        .log_slow_statements(LevelFilter::Warn, Duration::from_secs(60));

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(connect_options)
        .await
}
