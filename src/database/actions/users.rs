use sqlx::{Pool, Postgres};

use crate::authentication::cryptography::{hash_password, verify_password};
use crate::authentication::jwt::{generate_jwt_session, SessionData};
use crate::database::error::Error;
use crate::database::form::{LoginForm, PasswordForm, RegisterForm};
use crate::database::schema::{User, UserView, Uuid};
use crate::media::{ImageBlob, ImageInput};

use super::relations::{relation_exists, RelationKind};

pub async fn get_user_by_id(user_id: Uuid, pool: &Pool<Postgres>) -> Result<Option<User>, Error> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

pub async fn get_user_by_email(email: &str, pool: &Pool<Postgres>) -> Result<Option<User>, Error> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Registers an account. The stored password is the argon2 hash; a taken
/// email or username surfaces as a validation failure, with the unique
/// indexes deciding races.
pub async fn register_user(form: &RegisterForm, pool: &Pool<Postgres>) -> Result<Uuid, Error> {
    form.validate()?;

    let password_hash = hash_password(&form.password)?;

    let inserted: Option<(Uuid,)> = sqlx::query_as(
        "
        INSERT INTO users (email, username, first_name, last_name, password)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT DO NOTHING RETURNING id
    ",
    )
    .bind(&form.email)
    .bind(&form.username)
    .bind(&form.first_name)
    .bind(&form.last_name)
    .bind(password_hash)
    .fetch_optional(pool)
    .await
    .map_err(|e| match Error::from(e) {
        Error::DuplicateRelation(_) => taken(),
        other => other,
    })?;

    match inserted {
        Some((id,)) => Ok(id),
        None => Err(taken()),
    }
}

fn taken() -> Error {
    Error::validation("A user with this email or username already exists")
}

/// Verifies credentials and issues a session token. Unknown email and wrong
/// password produce the same message.
pub async fn login_user(form: &LoginForm, pool: &Pool<Postgres>) -> Result<String, Error> {
    let user = match get_user_by_email(&form.email, pool).await? {
        Some(user) => user,
        None => return Err(Error::validation("Invalid credentials")),
    };

    if !verify_password(&form.password, &user.password)? {
        return Err(Error::validation("Invalid credentials"));
    }

    generate_jwt_session(&user)
}

pub async fn set_password(
    session: &SessionData,
    form: &PasswordForm,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    form.validate()?;

    let user = get_user_by_id(session.user_id, pool)
        .await?
        .ok_or(Error::Unauthenticated)?;

    if !verify_password(&form.current_password, &user.password)? {
        return Err(Error::validation("Current password is incorrect"));
    }

    let password_hash = hash_password(&form.new_password)?;
    sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
        .bind(password_hash)
        .bind(user.id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Decodes and records a new avatar; the returned blob is handed to the
/// external object store by the caller.
pub async fn update_avatar(
    session: &SessionData,
    input: ImageInput,
    pool: &Pool<Postgres>,
) -> Result<ImageBlob, Error> {
    let blob = ImageBlob::from_input(input)?;

    sqlx::query("UPDATE users SET avatar = $1 WHERE id = $2")
        .bind(&blob.file_name)
        .bind(session.user_id)
        .execute(pool)
        .await?;

    Ok(blob)
}

pub async fn remove_avatar(session: &SessionData, pool: &Pool<Postgres>) -> Result<(), Error> {
    sqlx::query("UPDATE users SET avatar = NULL WHERE id = $1")
        .bind(session.user_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Whether `viewer` follows `author`. Always viewer-relative; an anonymous
/// viewer is never subscribed.
pub async fn is_subscribed(
    viewer: Option<Uuid>,
    author_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<bool, Error> {
    match viewer {
        Some(viewer) => relation_exists(viewer, author_id, RelationKind::Subscription, pool).await,
        None => Ok(false),
    }
}

pub fn view_of(user: &User, is_subscribed: bool) -> UserView {
    UserView {
        id: user.id,
        email: user.email.to_owned(),
        username: user.username.to_owned(),
        first_name: user.first_name.to_owned(),
        last_name: user.last_name.to_owned(),
        avatar: user.avatar.to_owned(),
        is_subscribed,
    }
}

/// Profile of `user_id` as seen by `viewer`.
pub async fn get_user_view(
    user_id: Uuid,
    viewer: Option<Uuid>,
    pool: &Pool<Postgres>,
) -> Result<UserView, Error> {
    let user = get_user_by_id(user_id, pool)
        .await?
        .ok_or_else(|| Error::not_found("No user exists with specified id"))?;

    let subscribed = is_subscribed(viewer, user.id, pool).await?;
    Ok(view_of(&user, subscribed))
}
