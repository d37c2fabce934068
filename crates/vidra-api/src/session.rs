use std::sync::Arc;

use uuid::Uuid;
use vidra_db::Database;

use crate::blocking;
use crate::error::ApiError;
use crate::tokens::TokenService;

/// The authenticated caller, as much of it as downstream handlers need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub username: String,
}

/// Resolves a bearer credential to an `Actor`. Stateless; runs once per
/// protected request before anything with side effects.
pub struct SessionAuthenticator {
    tokens: Arc<TokenService>,
    db: Arc<Database>,
}

impl SessionAuthenticator {
    pub fn new(tokens: Arc<TokenService>, db: Arc<Database>) -> Self {
        Self { tokens, db }
    }

    pub async fn authenticate(&self, credential: Option<&str>) -> Result<Actor, ApiError> {
        let token = credential
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ApiError::Unauthenticated)?;

        let claims = self.tokens.verify_access_token(token)?;

        let uid = claims.sub.to_string();
        let user = blocking::run(&self.db, move |db| db.get_user_by_id(&uid))
            .await?
            .ok_or(ApiError::Unauthenticated)?;

        Ok(Actor {
            id: claims.sub,
            username: user.username,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use vidra_db::models::NewUser;

    fn setup() -> (Arc<Database>, Arc<TokenService>, SessionAuthenticator) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let tokens = Arc::new(TokenService::with_secrets(
            db.clone(),
            "access-secret",
            Duration::minutes(15),
            "refresh-secret",
            Duration::days(7),
        ));
        let sessions = SessionAuthenticator::new(tokens.clone(), db.clone());
        (db, tokens, sessions)
    }

    fn add_user(db: &Database, username: &str) -> Uuid {
        let id = Uuid::new_v4();
        let email = format!("{username}@example.com");
        db.create_user(&NewUser {
            id: &id.to_string(),
            username,
            email: &email,
            full_name: username,
            avatar: "a",
            cover_image: "",
            password_hash: "h",
        })
        .unwrap();
        id
    }

    #[tokio::test]
    async fn valid_access_token_resolves_actor() {
        let (db, tokens, sessions) = setup();
        let alice = add_user(&db, "alice");
        let pair = tokens.issue_token_pair(alice).await.unwrap();

        let actor = sessions.authenticate(Some(&pair.access_token)).await.unwrap();
        assert_eq!(
            actor,
            Actor {
                id: alice,
                username: "alice".into()
            }
        );
    }

    #[tokio::test]
    async fn missing_or_blank_credential_is_unauthenticated() {
        let (_db, _tokens, sessions) = setup();

        assert!(matches!(
            sessions.authenticate(None).await,
            Err(ApiError::Unauthenticated)
        ));
        assert!(matches!(
            sessions.authenticate(Some("   ")).await,
            Err(ApiError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn refresh_token_is_not_an_access_credential() {
        let (db, tokens, sessions) = setup();
        let alice = add_user(&db, "alice");
        let pair = tokens.issue_token_pair(alice).await.unwrap();

        assert!(matches!(
            sessions.authenticate(Some(&pair.refresh_token)).await,
            Err(ApiError::TokenInvalid)
        ));
    }

    #[tokio::test]
    async fn token_of_deleted_user_is_unauthenticated() {
        let (db, tokens, sessions) = setup();
        let alice = add_user(&db, "alice");
        let pair = tokens.issue_token_pair(alice).await.unwrap();
        db.delete_user(&alice.to_string()).unwrap();

        assert!(matches!(
            sessions.authenticate(Some(&pair.access_token)).await,
            Err(ApiError::Unauthenticated)
        ));
    }
}
