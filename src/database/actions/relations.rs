use sqlx::{Pool, Postgres};

use crate::database::error::{is_unique_violation, Error};
use crate::database::schema::Uuid;

/// The three (subject, object) relation tables. Each kind knows its table,
/// its column pair and its user-facing duplicate/missing messages; the
/// unique index on the pair is the transactional authority for duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    Favorite,
    ShoppingCart,
    Subscription,
}

impl RelationKind {
    pub fn table(self) -> &'static str {
        match self {
            RelationKind::Favorite => "favorites",
            RelationKind::ShoppingCart => "shopping_cart",
            RelationKind::Subscription => "subscriptions",
        }
    }

    pub fn subject_column(self) -> &'static str {
        "user_id"
    }

    pub fn object_column(self) -> &'static str {
        match self {
            RelationKind::Favorite | RelationKind::ShoppingCart => "recipe_id",
            RelationKind::Subscription => "author_id",
        }
    }

    pub fn duplicate_message(self) -> &'static str {
        match self {
            RelationKind::Favorite => "Recipe is already in favorites",
            RelationKind::ShoppingCart => "Recipe is already in the shopping cart",
            RelationKind::Subscription => "You are already subscribed to this user",
        }
    }

    pub fn missing_message(self) -> &'static str {
        match self {
            RelationKind::Favorite => "Recipe is not in favorites",
            RelationKind::ShoppingCart => "Recipe is not in the shopping cart",
            RelationKind::Subscription => "You are not subscribed to this user",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationOp {
    Add,
    Remove,
}

/// Structural pre-check that needs no store access. Subscriptions reject a
/// subject following itself, regardless of prior state.
pub fn check_pair(kind: RelationKind, subject: Uuid, object: Uuid) -> Result<(), Error> {
    if kind == RelationKind::Subscription && subject == object {
        return Err(Error::SelfReference);
    }
    Ok(())
}

/// Inserts the (subject, object) row, returning its id. A pair that already
/// exists fails with `DuplicateRelation` — whether detected by the
/// `ON CONFLICT` clause or by losing a race on the unique index.
pub async fn add_relation(
    subject: Uuid,
    object: Uuid,
    kind: RelationKind,
    pool: &Pool<Postgres>,
) -> Result<Uuid, Error> {
    check_pair(kind, subject, object)?;

    let sql = format!(
        "INSERT INTO {} ({}, {}) VALUES ($1, $2) ON CONFLICT DO NOTHING RETURNING id",
        kind.table(),
        kind.subject_column(),
        kind.object_column()
    );

    let inserted: Option<(Uuid,)> = sqlx::query_as(&sql)
        .bind(subject)
        .bind(object)
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::DuplicateRelation(kind.duplicate_message().to_string())
            } else {
                Error::from(e)
            }
        })?;

    match inserted {
        Some((id,)) => Ok(id),
        None => Err(Error::DuplicateRelation(
            kind.duplicate_message().to_string(),
        )),
    }
}

/// Whether the exact (subject, object) pair is present.
pub async fn relation_exists(
    subject: Uuid,
    object: Uuid,
    kind: RelationKind,
    pool: &Pool<Postgres>,
) -> Result<bool, Error> {
    let sql = format!(
        "SELECT id FROM {} WHERE {} = $1 AND {} = $2",
        kind.table(),
        kind.subject_column(),
        kind.object_column()
    );

    let row: Option<(Uuid,)> = sqlx::query_as(&sql)
        .bind(subject)
        .bind(object)
        .fetch_optional(pool)
        .await?;

    Ok(row.is_some())
}

/// Deletes the (subject, object) row; removing a pair that is not there
/// fails with `NotFound`.
pub async fn remove_relation(
    subject: Uuid,
    object: Uuid,
    kind: RelationKind,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    let sql = format!(
        "DELETE FROM {} WHERE {} = $1 AND {} = $2",
        kind.table(),
        kind.subject_column(),
        kind.object_column()
    );

    let result = sqlx::query(&sql)
        .bind(subject)
        .bind(object)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::not_found(kind.missing_message()));
    }

    Ok(())
}

/// The {Add, Remove} x {Favorite, ShoppingCart, Subscription} command
/// table. Handlers dispatch through this instead of branching on the HTTP
/// verb themselves.
pub async fn apply_relation(
    op: RelationOp,
    kind: RelationKind,
    subject: Uuid,
    object: Uuid,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    match op {
        RelationOp::Add => add_relation(subject, object, kind, pool).await.map(|_| ()),
        RelationOp::Remove => remove_relation(subject, object, kind, pool).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_subscription_is_always_rejected() {
        let err = check_pair(RelationKind::Subscription, 3, 3).unwrap_err();
        assert!(matches!(err, Error::SelfReference));
        assert!(check_pair(RelationKind::Subscription, 3, 4).is_ok());
    }

    #[test]
    fn self_reference_only_applies_to_subscriptions() {
        // A favorite's subject is a user and its object a recipe, so equal
        // ids are distinct entities and must pass.
        assert!(check_pair(RelationKind::Favorite, 5, 5).is_ok());
        assert!(check_pair(RelationKind::ShoppingCart, 5, 5).is_ok());
    }

    #[test]
    fn kinds_map_to_their_tables() {
        assert_eq!(RelationKind::Favorite.table(), "favorites");
        assert_eq!(RelationKind::ShoppingCart.table(), "shopping_cart");
        assert_eq!(RelationKind::Subscription.table(), "subscriptions");

        assert_eq!(RelationKind::Favorite.object_column(), "recipe_id");
        assert_eq!(RelationKind::ShoppingCart.object_column(), "recipe_id");
        assert_eq!(RelationKind::Subscription.object_column(), "author_id");
    }
}
