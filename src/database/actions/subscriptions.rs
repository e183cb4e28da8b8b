use sqlx::{Pool, Postgres};

use crate::authentication::jwt::SessionData;
use crate::constants::SUBSCRIPTION_COUNT_PER_PAGE;
use crate::database::error::Error;
use crate::database::pagination::PageContext;
use crate::database::schema::{
    RecipeSummary, SubscribedAuthorRow, SubscriptionView, User, UserView, Uuid,
};

use super::relations::{add_relation, remove_relation, RelationKind};
use super::users::get_user_by_id;

/// The `recipes_limit` query parameter caps the nested recipe list. Only
/// plain digit strings count; anything else is ignored.
pub fn parse_recipes_limit(raw: Option<&str>) -> Option<i64> {
    let raw = raw?;
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

pub async fn author_recipe_count(author_id: Uuid, pool: &Pool<Postgres>) -> Result<i64, Error> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM recipes WHERE author_id = $1")
        .bind(author_id)
        .fetch_one(pool)
        .await?;

    Ok(count)
}

pub async fn author_recipe_summaries(
    author_id: Uuid,
    limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeSummary>, Error> {
    let rows: Vec<RecipeSummary> = match limit {
        Some(limit) => {
            sqlx::query_as(
                "SELECT id, name, image, cooking_time FROM recipes WHERE author_id = $1 ORDER BY id DESC LIMIT $2",
            )
            .bind(author_id)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as(
                "SELECT id, name, image, cooking_time FROM recipes WHERE author_id = $1 ORDER BY id DESC",
            )
            .bind(author_id)
            .fetch_all(pool)
            .await?
        }
    };

    Ok(rows)
}

async fn build_view(
    author: UserView,
    recipes_limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<SubscriptionView, Error> {
    let recipes_count = author_recipe_count(author.id, pool).await?;
    let recipes = author_recipe_summaries(author.id, recipes_limit, pool).await?;

    Ok(SubscriptionView {
        author,
        recipes,
        recipes_count,
    })
}

fn author_view(user: &User, is_subscribed: bool) -> UserView {
    super::users::view_of(user, is_subscribed)
}

/// Follows `author_id` and returns their annotated profile. Following a
/// missing user is a 404-class failure; following yourself or following
/// twice fail in the integrity layer.
pub async fn subscribe(
    session: &SessionData,
    author_id: Uuid,
    recipes_limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<SubscriptionView, Error> {
    let author = get_user_by_id(author_id, pool)
        .await?
        .ok_or_else(|| Error::not_found("No user exists with specified id"))?;

    add_relation(session.user_id, author_id, RelationKind::Subscription, pool).await?;

    build_view(author_view(&author, true), recipes_limit, pool).await
}

pub async fn unsubscribe(
    session: &SessionData,
    author_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    remove_relation(session.user_id, author_id, RelationKind::Subscription, pool).await
}

/// Authors the acting user follows, in subscription order, each annotated
/// with their recipe count and a capped recipe list.
pub async fn fetch_subscriptions(
    session: &SessionData,
    offset: i64,
    recipes_limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<PageContext<SubscriptionView>, Error> {
    let rows: Vec<SubscribedAuthorRow> = sqlx::query_as(
        "
        SELECT u.id, u.email, u.username, u.first_name, u.last_name, u.avatar, COUNT(*) OVER() AS count
        FROM subscriptions s
        INNER JOIN users u ON u.id = s.author_id
        WHERE s.user_id = $1
        ORDER BY s.id
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(session.user_id)
    .bind(SUBSCRIPTION_COUNT_PER_PAGE)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total_count = rows.first().map(|r| r.count).unwrap_or(0);

    let mut views = Vec::with_capacity(rows.len());
    for row in rows {
        let author = UserView {
            id: row.id,
            email: row.email,
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            avatar: row.avatar,
            is_subscribed: true,
        };
        views.push(build_view(author, recipes_limit, pool).await?);
    }

    Ok(PageContext::from_rows(
        views,
        total_count,
        SUBSCRIPTION_COUNT_PER_PAGE,
        offset,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_limits_are_honored() {
        assert_eq!(parse_recipes_limit(Some("3")), Some(3));
        assert_eq!(parse_recipes_limit(Some("0")), Some(0));
        assert_eq!(parse_recipes_limit(Some("25")), Some(25));
    }

    #[test]
    fn non_numeric_limits_are_ignored() {
        assert_eq!(parse_recipes_limit(Some("abc")), None);
        assert_eq!(parse_recipes_limit(Some("-1")), None);
        assert_eq!(parse_recipes_limit(Some("2.5")), None);
        assert_eq!(parse_recipes_limit(Some("")), None);
        assert_eq!(parse_recipes_limit(None), None);
    }
}
