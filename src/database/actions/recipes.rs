use sqlx::{Pool, Postgres, QueryBuilder, Transaction};

use crate::authentication::jwt::SessionData;
use crate::authentication::permissions::require_author;
use crate::constants::RECIPE_COUNT_PER_PAGE;
use crate::database::error::Error;
use crate::database::form::{RecipeForm, RecipeQuery};
use crate::database::pagination::PageContext;
use crate::database::schema::{
    IngredientLine, Recipe, RecipeRow, RecipeSummary, RecipeView, Tag, Uuid,
};
use crate::media::{ImageBlob, ImageInput};

use super::ingredients::resolve_ingredients;
use super::relations::{apply_relation, relation_exists, RelationKind, RelationOp};
use super::tags::resolve_tags;
use super::users::{get_user_by_id, is_subscribed, view_of};

pub async fn get_recipe(id: Uuid, pool: &Pool<Postgres>) -> Result<Option<Recipe>, Error> {
    let row: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Loads a recipe for mutation. Only the author may modify a recipe; anyone
/// else gets the authorization failure, a missing id the 404-class one.
pub async fn get_recipe_mut(
    id: Uuid,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<Recipe, Error> {
    let recipe = get_recipe(id, pool)
        .await?
        .ok_or_else(|| Error::not_found("No recipe exists with specified id"))?;

    require_author(session, recipe.author_id)?;
    Ok(recipe)
}

/// Tags of one recipe, ordered by tag name.
pub async fn list_recipe_tags(recipe_id: Uuid, pool: &Pool<Postgres>) -> Result<Vec<Tag>, Error> {
    let rows: Vec<Tag> = sqlx::query_as(
        "
        SELECT t.*
        FROM recipe_tags rt
        INNER JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id = $1
        ORDER BY t.name
    ",
    )
    .bind(recipe_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Ingredient lines of one recipe in insertion order, each carrying the
/// recipe-scoped amount next to the ingredient's name and unit.
pub async fn list_ingredient_lines(
    recipe_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<Vec<IngredientLine>, Error> {
    let rows: Vec<IngredientLine> = sqlx::query_as(
        "
        SELECT i.id AS id, i.name AS name, i.measurement_unit AS measurement_unit, ri.amount AS amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = $1
        ORDER BY ri.id
    ",
    )
    .bind(recipe_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Composes the full read-side view of a recipe for a viewer. The two
/// viewer-dependent flags and the author's `is_subscribed` are `false` for
/// anonymous viewers.
pub async fn assemble_recipe(
    recipe: &Recipe,
    viewer: Option<Uuid>,
    pool: &Pool<Postgres>,
) -> Result<RecipeView, Error> {
    let author = get_user_by_id(recipe.author_id, pool)
        .await?
        .ok_or_else(|| Error::Query(String::from("Recipe author row is missing")))?;
    let author_subscribed = is_subscribed(viewer, author.id, pool).await?;

    let tags = list_recipe_tags(recipe.id, pool).await?;
    let ingredients = list_ingredient_lines(recipe.id, pool).await?;

    let (is_favorited, is_in_shopping_cart) = match viewer {
        Some(viewer) => (
            relation_exists(viewer, recipe.id, RelationKind::Favorite, pool).await?,
            relation_exists(viewer, recipe.id, RelationKind::ShoppingCart, pool).await?,
        ),
        None => (false, false),
    };

    Ok(RecipeView {
        id: recipe.id,
        tags,
        author: view_of(&author, author_subscribed),
        ingredients,
        is_favorited,
        is_in_shopping_cart,
        name: recipe.name.to_owned(),
        image: recipe.image.to_owned(),
        text: recipe.text.to_owned(),
        cooking_time: recipe.cooking_time,
    })
}

/// Filterable listing, newest first. The favorited/in-cart filters only
/// apply for an authenticated viewer; anonymous viewers get them ignored.
pub async fn fetch_recipes(
    query: &RecipeQuery,
    viewer: Option<Uuid>,
    pool: &Pool<Postgres>,
) -> Result<PageContext<RecipeView>, Error> {
    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT r.*, COUNT(*) OVER() AS count FROM recipes r WHERE TRUE");

    if let Some(author) = query.author {
        builder.push(" AND r.author_id = ").push_bind(author);
    }

    if !query.tags.is_empty() {
        builder
            .push(
                " AND EXISTS (SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id \
                 WHERE rt.recipe_id = r.id AND t.slug = ANY(",
            )
            .push_bind(query.tags.to_vec())
            .push("))");
    }

    if let Some(viewer) = viewer {
        if query.is_favorited == Some(true) {
            builder
                .push(" AND EXISTS (SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = ")
                .push_bind(viewer)
                .push(")");
        }
        if query.is_in_shopping_cart == Some(true) {
            builder
                .push(" AND EXISTS (SELECT 1 FROM shopping_cart sc WHERE sc.recipe_id = r.id AND sc.user_id = ")
                .push_bind(viewer)
                .push(")");
        }
    }

    builder
        .push(" ORDER BY r.id DESC LIMIT ")
        .push_bind(RECIPE_COUNT_PER_PAGE)
        .push(" OFFSET ")
        .push_bind(query.offset);

    let rows: Vec<RecipeRow> = builder.build_query_as().fetch_all(pool).await?;
    let total_count = rows.first().map(|r| r.count).unwrap_or(0);

    let mut views = Vec::with_capacity(rows.len());
    for row in rows {
        let recipe = Recipe::from(row);
        views.push(assemble_recipe(&recipe, viewer, pool).await?);
    }

    Ok(PageContext::from_rows(
        views,
        total_count,
        RECIPE_COUNT_PER_PAGE,
        query.offset,
    ))
}

/// Creates a recipe owned by the acting identity; authorship is never taken
/// from the payload. Header and both join sets land in one transaction.
/// Returns the new id and the decoded image blob for the object store.
pub async fn create_recipe(
    session: &SessionData,
    form: &RecipeForm,
    upload: Option<ImageInput>,
    pool: &Pool<Postgres>,
) -> Result<(Uuid, ImageBlob), Error> {
    form.validate()?;
    resolve_tags(form.tag_ids(), pool).await?;
    let entry_ids: Vec<Uuid> = form.ingredient_entries().iter().map(|e| e.id).collect();
    resolve_ingredients(&entry_ids, pool).await?;

    let input = match upload {
        Some(input) => input,
        None => ImageInput::DataUri(
            form.image
                .to_owned()
                .ok_or_else(|| Error::validation("Field 'image' is required"))?,
        ),
    };
    let blob = ImageBlob::from_input(input)?;

    let mut tx = pool.begin().await?;

    let inserted: (Uuid,) = sqlx::query_as(
        "
        INSERT INTO recipes (author_id, name, image, text, cooking_time)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
    ",
    )
    .bind(session.user_id)
    .bind(&form.name)
    .bind(&blob.file_name)
    .bind(&form.text)
    .bind(form.cooking_time)
    .fetch_one(&mut *tx)
    .await?;

    insert_associations(&mut tx, inserted.0, form).await?;
    tx.commit().await?;

    Ok((inserted.0, blob))
}

/// Rewrites a recipe from a full payload. The association sets are replaced
/// wholesale — delete then reinsert inside one transaction, so a partially
/// replaced set is never a persisted state. The image only changes when the
/// payload carries one; the returned blob, if any, goes to the object store.
pub async fn update_recipe(
    recipe: &Recipe,
    form: &RecipeForm,
    upload: Option<ImageInput>,
    pool: &Pool<Postgres>,
) -> Result<Option<ImageBlob>, Error> {
    form.validate()?;
    resolve_tags(form.tag_ids(), pool).await?;
    let entry_ids: Vec<Uuid> = form.ingredient_entries().iter().map(|e| e.id).collect();
    resolve_ingredients(&entry_ids, pool).await?;

    let blob = match upload {
        Some(input) => Some(ImageBlob::from_input(input)?),
        None => match &form.image {
            Some(uri) => Some(ImageBlob::from_input(ImageInput::DataUri(uri.to_owned()))?),
            None => None,
        },
    };

    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE recipes SET name = $1, text = $2, cooking_time = $3 WHERE id = $4")
        .bind(&form.name)
        .bind(&form.text)
        .bind(form.cooking_time)
        .bind(recipe.id)
        .execute(&mut *tx)
        .await?;

    if let Some(blob) = &blob {
        sqlx::query("UPDATE recipes SET image = $1 WHERE id = $2")
            .bind(&blob.file_name)
            .bind(recipe.id)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(recipe.id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
        .bind(recipe.id)
        .execute(&mut *tx)
        .await?;

    insert_associations(&mut tx, recipe.id, form).await?;
    tx.commit().await?;

    Ok(blob)
}

/// Removes a recipe together with its join rows, favorites and cart
/// entries, mirroring the store-level cascade in one transaction.
pub async fn delete_recipe(recipe_id: Uuid, pool: &Pool<Postgres>) -> Result<(), Error> {
    let mut tx = pool.begin().await?;

    for table in ["recipe_ingredients", "recipe_tags", "favorites", "shopping_cart"] {
        sqlx::query(&format!("DELETE FROM {table} WHERE recipe_id = $1"))
            .bind(recipe_id)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(recipe_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Favorite toggle; an add returns the recipe's short form.
pub async fn favorite_recipe(
    op: RelationOp,
    session: &SessionData,
    recipe_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<Option<RecipeSummary>, Error> {
    recipe_relation(op, RelationKind::Favorite, session, recipe_id, pool).await
}

/// Shopping-cart toggle; an add returns the recipe's short form.
pub async fn shopping_cart_recipe(
    op: RelationOp,
    session: &SessionData,
    recipe_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<Option<RecipeSummary>, Error> {
    recipe_relation(op, RelationKind::ShoppingCart, session, recipe_id, pool).await
}

async fn recipe_relation(
    op: RelationOp,
    kind: RelationKind,
    session: &SessionData,
    recipe_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<Option<RecipeSummary>, Error> {
    let recipe = get_recipe(recipe_id, pool)
        .await?
        .ok_or_else(|| Error::not_found("No recipe exists with specified id"))?;

    apply_relation(op, kind, session.user_id, recipe.id, pool).await?;

    Ok(match op {
        RelationOp::Add => Some(RecipeSummary::from(&recipe)),
        RelationOp::Remove => None,
    })
}

async fn insert_associations(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: Uuid,
    form: &RecipeForm,
) -> Result<(), Error> {
    for entry in form.ingredient_entries() {
        sqlx::query(
            "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) VALUES ($1, $2, $3)",
        )
        .bind(recipe_id)
        .bind(entry.id)
        .bind(entry.amount)
        .execute(&mut **tx)
        .await?;
    }

    for tag_id in form.tag_ids() {
        sqlx::query("INSERT INTO recipe_tags (recipe_id, tag_id) VALUES ($1, $2)")
            .bind(recipe_id)
            .bind(*tag_id)
            .execute(&mut **tx)
            .await?;
    }

    Ok(())
}
