use std::time::Duration;

use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;

use crate::config::Config;

pub async fn init_db(config: &Config) -> Result<MySqlPool, sqlx::Error> {
    MySqlPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(config.store_timeout.max(Duration::from_secs(1)))
        .connect(&config.database_url)
        .await
}
