use crate::database::error::Error;
use crate::database::schema::Uuid;

use super::jwt::SessionData;

/// A recipe belongs exclusively to its author; nobody else may mutate it.
pub fn can_modify(session: &SessionData, author_id: Uuid) -> bool {
    session.user_id == author_id
}

pub fn require_author(session: &SessionData, author_id: Uuid) -> Result<(), Error> {
    if can_modify(session, author_id) {
        Ok(())
    } else {
        Err(Error::Authorization)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(user_id: Uuid) -> SessionData {
        SessionData {
            user_id,
            username: String::from("cook"),
        }
    }

    #[test]
    fn only_the_author_may_modify() {
        assert!(can_modify(&session(1), 1));
        assert!(!can_modify(&session(1), 2));
    }

    #[test]
    fn non_author_gets_the_authorization_error() {
        assert!(require_author(&session(1), 1).is_ok());
        assert!(matches!(
            require_author(&session(1), 2),
            Err(Error::Authorization)
        ));
    }
}
