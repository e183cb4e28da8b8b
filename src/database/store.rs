use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};

use super::error::Error;

/// Opens the connection pool and applies pending migrations. The schema's
/// unique indexes are what the integrity layer leans on, so the pool is
/// not handed out before they are in place.
pub async fn connect(database_url: &str) -> Result<Pool<Postgres>, Error> {
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| Error::Query(format!("Migration failed: {e}")))?;
    log::debug!("store ready, migrations applied");

    Ok(pool)
}
