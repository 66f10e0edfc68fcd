use crate::adapters::persistence::PostgresPersistence;

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod http_client;
pub mod setup;
pub mod stripe_client;
pub mod stripe_payment_adapter;

/// Connect to the database, apply migrations and wrap the pool.
pub async fn postgres_persistence(database_url: &str) -> Result<PostgresPersistence, error::InfraError> {
    let pool = db::init_db(database_url).await?;
    db::run_migrations(&pool).await?;
    Ok(PostgresPersistence::new(pool))
}
