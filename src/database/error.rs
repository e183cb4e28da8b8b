use serde_json::json;
use warp::http::StatusCode;
use warp::reject::{Reject, Rejection};
use warp::reply::Response;
use warp::Reply;

/// Business-rule and store failures, recovered at the request boundary into
/// a structured `{"detail": ...}` payload. Nothing here is allowed to
/// propagate as an unhandled fault.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or missing field, out-of-range value, unknown id referenced
    /// from a request body.
    #[error("{0}")]
    Validation(String),

    /// The (subject, object) pair already exists for a favorite, cart entry
    /// or subscription. Includes race losers on the unique index.
    #[error("{0}")]
    DuplicateRelation(String),

    /// Missing path target, or removal of a relation row that is not there.
    #[error("{0}")]
    NotFound(String),

    /// A user tried to subscribe to themselves.
    #[error("You cannot subscribe to yourself")]
    SelfReference,

    /// Acting user is not the author of the resource they tried to modify.
    #[error("You do not have permission to modify this resource")]
    Authorization,

    /// Identity-required operation invoked without a valid session.
    #[error("Authentication credentials were not provided")]
    Unauthenticated,

    /// Store failure that carries no business meaning.
    #[error("{0}")]
    Query(String),
}

impl Error {
    pub fn validation(info: impl Into<String>) -> Self {
        Error::Validation(info.into())
    }

    pub fn not_found(info: impl Into<String>) -> Self {
        Error::NotFound(info.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::DuplicateRelation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::SelfReference => StatusCode::BAD_REQUEST,
            Error::Authorization => StatusCode::FORBIDDEN,
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::Query(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({ "detail": self.to_string() });
        warp::reply::with_status(warp::reply::json(&body), status).into_response()
    }

    pub fn reject(self) -> Rejection {
        warp::reject::custom(self)
    }
}

impl Reject for Error {}

/// Recovers [`Error`] rejections into their structured replies; anything
/// else falls through as a generic payload so no fault leaks unhandled.
pub async fn handle_rejection(err: Rejection) -> Result<Response, std::convert::Infallible> {
    if let Some(e) = err.find::<Error>() {
        let body = json!({ "detail": e.to_string() });
        return Ok(warp::reply::with_status(warp::reply::json(&body), e.status()).into_response());
    }

    let (status, detail) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found")
    } else {
        log::warn!("unhandled rejection: {err:?}");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    };
    let body = json!({ "detail": detail });
    Ok(warp::reply::with_status(warp::reply::json(&body), status).into_response())
}

/// True when the store reports a unique-index violation (SQLSTATE 23505),
/// i.e. this request lost the race to an identical concurrent insert.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(e) => e.code().as_deref() == Some("23505"),
        _ => false,
    }
}

impl From<sqlx::Error> for Error {
    fn from(value: sqlx::Error) -> Self {
        if is_unique_violation(&value) {
            return Error::DuplicateRelation(String::from("Relation already exists"));
        }

        match value {
            sqlx::Error::RowNotFound => Error::Query(String::from("Expected row was missing")),
            sqlx::Error::PoolTimedOut => Error::Query(String::from("Pool timed out")),
            sqlx::Error::PoolClosed => Error::Query(String::from("Pool closed")),
            e => Error::Query(format!("{e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_the_taxonomy() {
        assert_eq!(
            Error::validation("bad").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::DuplicateRelation(String::from("dup")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(Error::not_found("gone").status(), StatusCode::NOT_FOUND);
        assert_eq!(Error::SelfReference.status(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::Authorization.status(), StatusCode::FORBIDDEN);
        assert_eq!(Error::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            Error::Query(String::from("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn responses_carry_the_detail_payload() {
        let response = Error::validation("Field is required").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn row_not_found_translates_to_query_error() {
        let e = Error::from(sqlx::Error::RowNotFound);
        assert!(matches!(e, Error::Query(_)));
    }
}
