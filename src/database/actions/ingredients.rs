use sqlx::{Pool, Postgres};

use crate::database::error::Error;
use crate::database::schema::{Ingredient, Uuid};

/// Case-insensitive name-prefix lookup. `ILIKE` treats `%`, `_` and `\` as
/// metacharacters, so the prefix is escaped before the wildcard is added.
pub async fn list_ingredients(
    prefix: Option<&str>,
    pool: &Pool<Postgres>,
) -> Result<Vec<Ingredient>, Error> {
    let rows: Vec<Ingredient> = match prefix {
        Some(prefix) => {
            let pattern = format!("{}%", escape_like(prefix));
            sqlx::query_as("SELECT * FROM ingredients WHERE name ILIKE $1 ORDER BY name")
                .bind(pattern)
                .fetch_all(pool)
                .await?
        }
        None => {
            sqlx::query_as("SELECT * FROM ingredients ORDER BY name")
                .fetch_all(pool)
                .await?
        }
    };

    Ok(rows)
}

pub async fn get_ingredient(id: Uuid, pool: &Pool<Postgres>) -> Result<Option<Ingredient>, Error> {
    let row: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Resolves a payload's ingredient id list, failing on the first id that
/// does not exist.
pub async fn resolve_ingredients(
    ids: &[Uuid],
    pool: &Pool<Postgres>,
) -> Result<Vec<Ingredient>, Error> {
    let rows: Vec<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = ANY($1)")
        .bind(ids.to_vec())
        .fetch_all(pool)
        .await?;

    for id in ids {
        if !rows.iter().any(|i| i.id == *id) {
            return Err(Error::validation(format!(
                "No ingredient exists with id {id}"
            )));
        }
    }

    Ok(rows)
}

fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_metacharacters_are_escaped() {
        assert_eq!(escape_like("flour"), "flour");
        assert_eq!(escape_like("100%_raw"), "100\\%\\_raw");
        assert_eq!(escape_like("back\\slash"), "back\\\\slash");
    }
}
