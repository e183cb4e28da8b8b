use warp::{Filter, Rejection};

use crate::constants::SESSION_COOKIE;
use crate::database::error::Error;

use super::jwt::{verify_jwt_session, SessionData};

/// Requires a valid session cookie; a missing, tampered or expired token
/// rejects with the 401-class error.
pub fn with_session() -> impl Filter<Extract = (SessionData,), Error = Rejection> + Copy {
    warp::cookie::optional::<String>(SESSION_COOKIE).and_then(|token: Option<String>| async move {
        token
            .as_deref()
            .and_then(|t| verify_jwt_session(t).ok())
            .map(SessionData::from)
            .ok_or_else(|| Error::Unauthenticated.reject())
    })
}

/// Extracts the session when one is present and valid, `None` otherwise.
/// Anonymous viewers are a supported case, not an error.
pub fn with_possible_session(
) -> impl Filter<Extract = (Option<SessionData>,), Error = std::convert::Infallible> + Copy {
    warp::cookie::optional::<String>(SESSION_COOKIE).map(|token: Option<String>| {
        token
            .as_deref()
            .and_then(|t| verify_jwt_session(t).ok())
            .map(SessionData::from)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authentication::jwt::generate_jwt_session;
    use crate::database::schema::User;

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

    #[tokio::test]
    async fn no_cookie_means_anonymous() {
        let session = warp::test::request()
            .filter(&with_possible_session())
            .await
            .unwrap();
        assert!(session.is_none());
    }

    #[tokio::test]
    async fn no_cookie_rejects_the_required_filter() {
        let result = warp::test::request().filter(&with_session()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn a_valid_cookie_yields_the_acting_identity() {
        let token = generate_jwt_session(&user()).unwrap();
        let session = warp::test::request()
            .header("cookie", format!("session={token}"))
            .filter(&with_session())
            .await
            .unwrap();
        assert_eq!(session.user_id, 7);
        assert_eq!(session.username, "cook");
    }

    #[tokio::test]
    async fn a_garbage_cookie_is_anonymous_not_fatal() {
        let session = warp::test::request()
            .header("cookie", "session=not-a-token")
            .filter(&with_possible_session())
            .await
            .unwrap();
        assert!(session.is_none());
    }
}
