use chrono::{Duration, Local};
use hmac::{Hmac, Mac};
use jwt::{SignWithKey, VerifyWithKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::database::error::Error;
use crate::database::schema::{User, Uuid};

/// Signed session claims. `iat`/`exp` stay private to this module; the
/// rest of the crate only ever sees [`SessionData`].
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtSessionData {
    pub user_id: Uuid,
    pub username: String,
    iat: i64,
    exp: i64,
}

impl JwtSessionData {
    pub fn new(user_id: Uuid, username: String) -> Self {
        let now = Local::now();
        Self {
            user_id,
            username,
            iat: now.timestamp(),
            exp: (now + Duration::hours(1)).timestamp(),
        }
    }
}

/// The acting identity as request handlers see it.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionData {
    pub user_id: Uuid,
    pub username: String,
}

impl From<JwtSessionData> for SessionData {
    fn from(claims: JwtSessionData) -> Self {
        SessionData {
            user_id: claims.user_id,
            username: claims.username,
        }
    }
}

fn signing_key() -> Result<Hmac<Sha256>, Error> {
    let secret =
        std::env::var("SESSION_SECRET").unwrap_or_else(|_| String::from("insecure-dev-secret"));

    Hmac::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Query(format!("Session signing key is unusable: {e}")))
}

pub fn generate_jwt_session(user: &User) -> Result<String, Error> {
    let claims = JwtSessionData::new(user.id, user.username.to_owned());

    claims
        .sign_with_key(&signing_key()?)
        .map_err(|e| Error::Query(format!("Failed to sign session token: {e}")))
}

/// Rejects unreadable, tampered and expired tokens alike as
/// `Unauthenticated`; the caller cannot distinguish them on purpose.
pub fn verify_jwt_session(token: &str) -> Result<JwtSessionData, Error> {
    let session: JwtSessionData = token
        .verify_with_key(&signing_key()?)
        .map_err(|_| Error::Unauthenticated)?;

    if session.exp < Local::now().timestamp() {
        return Err(Error::Unauthenticated);
    }
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: 7,
            email: String::from("cook@example.com"),
            username: String::from("cook"),
            first_name: String::new(),
            last_name: String::new(),
            password: String::from("hash"),
            avatar: None,
        }
    }

    #[test]
    fn session_round_trips() {
        let token = generate_jwt_session(&user()).unwrap();
        let claims = verify_jwt_session(&token).unwrap();
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.username, "cook");
    }

    #[test]
    fn tampered_token_is_unauthenticated() {
        let mut token = generate_jwt_session(&user()).unwrap();
        token.push('x');
        assert!(matches!(
            verify_jwt_session(&token),
            Err(Error::Unauthenticated)
        ));
    }

    #[test]
    fn expired_token_is_unauthenticated() {
        let now = Local::now().timestamp();
        let claims = JwtSessionData {
            user_id: 7,
            username: String::from("cook"),
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = claims.sign_with_key(&signing_key().unwrap()).unwrap();
        assert!(matches!(
            verify_jwt_session(&token),
            Err(Error::Unauthenticated)
        ));
    }
}
