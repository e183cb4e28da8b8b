use sqlx::{Pool, Postgres};

use crate::database::error::Error;
use crate::database::schema::{Tag, Uuid};

/// Tags are read-only reference data; they are seeded out of band and the
/// SDK only ever looks them up.
pub async fn list_tags(pool: &Pool<Postgres>) -> Result<Vec<Tag>, Error> {
    let rows: Vec<Tag> = sqlx::query_as("SELECT * FROM tags ORDER BY name")
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

pub async fn get_tag(id: Uuid, pool: &Pool<Postgres>) -> Result<Option<Tag>, Error> {
    let row: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Resolves a payload's tag id list, failing on the first id that does not
/// exist. Body references use the validation channel, not `NotFound`.
pub async fn resolve_tags(ids: &[Uuid], pool: &Pool<Postgres>) -> Result<Vec<Tag>, Error> {
    let rows: Vec<Tag> = sqlx::query_as("SELECT * FROM tags WHERE id = ANY($1) ORDER BY name")
        .bind(ids.to_vec())
        .fetch_all(pool)
        .await?;

    for id in ids {
        if !rows.iter().any(|t| t.id == *id) {
            return Err(Error::validation(format!("No tag exists with id {id}")));
        }
    }

    Ok(rows)
}
