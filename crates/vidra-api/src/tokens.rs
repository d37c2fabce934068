//! Access/refresh token issuance, verification and rotation.
//!
//! Only one refresh token is valid per user at a time: its SHA-256
//! fingerprint is stored on the user row and every login, refresh and
//! logout overwrites it. A second login therefore ends the first device's
//! session, and a refresh token that has already been exchanged can never
//! be exchanged again.

use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use uuid::Uuid;

use vidra_db::Database;
use vidra_db::models::RotateOutcome;
use vidra_types::api::{AccessClaims, RefreshClaims};

use crate::blocking;
use crate::config::Config;
use crate::error::ApiError;

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

pub struct TokenService {
    db: Arc<Database>,
    access: SigningKeys,
    refresh: SigningKeys,
    access_ttl: Duration,
    refresh_ttl: Duration,
    validation: Validation,
}

impl TokenService {
    pub fn new(config: &Config, db: Arc<Database>) -> Self {
        Self::with_secrets(
            db,
            &config.access_token_secret,
            config.access_token_ttl,
            &config.refresh_token_secret,
            config.refresh_token_ttl,
        )
    }

    pub fn with_secrets(
        db: Arc<Database>,
        access_secret: &str,
        access_ttl: Duration,
        refresh_secret: &str,
        refresh_ttl: Duration,
    ) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            db,
            access: SigningKeys::new(access_secret),
            refresh: SigningKeys::new(refresh_secret),
            access_ttl,
            refresh_ttl,
            validation,
        }
    }

    /// Mints a fresh pair and makes its refresh token the user's only valid
    /// one, overwriting whatever was stored before.
    pub async fn issue_token_pair(&self, user_id: Uuid) -> Result<TokenPair, ApiError> {
        let pair = self.mint(user_id)?;

        let uid = user_id.to_string();
        let hash = fingerprint(&pair.refresh_token);
        let stored =
            blocking::run(&self.db, move |db| db.set_refresh_token_hash(&uid, Some(&hash))).await?;
        if !stored {
            return Err(ApiError::Persistence(anyhow::anyhow!(
                "user {} vanished while storing refresh token",
                user_id
            )));
        }

        debug!("Issued token pair for {}", user_id);
        Ok(pair)
    }

    /// Stateless check: signature and expiry only.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, ApiError> {
        self.verify(token, &self.access.decoding)
    }

    /// Exchanges a refresh token for a new pair. The presented token must be
    /// exactly the one currently stored for its subject; anything else is a
    /// revoked or replayed token even when its signature is still good.
    pub async fn rotate_from_refresh_token(&self, token: &str) -> Result<TokenPair, ApiError> {
        let claims: RefreshClaims = self.verify(token, &self.refresh.decoding)?;

        let uid = claims.sub.to_string();
        let user = blocking::run(&self.db, move |db| db.get_user_by_id(&uid))
            .await?
            .ok_or(ApiError::UserNotFound)?;

        let presented = fingerprint(token);
        if user.refresh_token_hash.as_deref() != Some(presented.as_str()) {
            warn!("Refresh token for {} is not the current one (replay or revoked)", claims.sub);
            return Err(ApiError::TokenRevoked);
        }

        let pair = self.mint(claims.sub)?;
        let uid = claims.sub.to_string();
        let replacement = fingerprint(&pair.refresh_token);
        let outcome = blocking::run(&self.db, move |db| {
            db.rotate_refresh_token_hash(&uid, &presented, &replacement)
        })
        .await?;

        match outcome {
            RotateOutcome::Rotated => {
                debug!("Rotated refresh token for {}", claims.sub);
                Ok(pair)
            }
            // Lost the race against a concurrent refresh or logout.
            RotateOutcome::Stale => {
                warn!("Concurrent rotation for {}, rejecting the loser", claims.sub);
                Err(ApiError::TokenRevoked)
            }
            RotateOutcome::UserMissing => Err(ApiError::UserNotFound),
        }
    }

    /// Clears the stored refresh token. Revoking an already revoked session,
    /// or one whose user is gone, succeeds silently.
    pub async fn revoke(&self, user_id: Uuid) -> Result<(), ApiError> {
        let uid = user_id.to_string();
        blocking::run(&self.db, move |db| db.set_refresh_token_hash(&uid, None)).await?;
        debug!("Revoked refresh token for {}", user_id);
        Ok(())
    }

    fn mint(&self, user_id: Uuid) -> Result<TokenPair, ApiError> {
        let now = Utc::now();
        let expiry = |ttl: Duration| {
            now.checked_add_signed(ttl)
                .map(|at| at.timestamp())
                .ok_or_else(|| ApiError::Unexpected("token expiry out of range".into()))
        };

        let access = AccessClaims {
            sub: user_id,
            iat: now.timestamp(),
            exp: expiry(self.access_ttl)?,
        };
        let refresh = RefreshClaims {
            sub: user_id,
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: expiry(self.refresh_ttl)?,
        };

        Ok(TokenPair {
            access_token: sign(&access, &self.access.encoding)?,
            refresh_token: sign(&refresh, &self.refresh.encoding)?,
        })
    }

    fn verify<C: DeserializeOwned>(&self, token: &str, key: &DecodingKey) -> Result<C, ApiError> {
        decode::<C>(token, key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => ApiError::TokenExpired,
                _ => ApiError::TokenInvalid,
            })
    }
}

fn sign<C: Serialize>(claims: &C, key: &EncodingKey) -> Result<String, ApiError> {
    encode(&Header::new(Algorithm::HS256), claims, key)
        .map_err(|e| ApiError::Unexpected(format!("failed to sign token: {e}")))
}

/// What is persisted instead of the raw refresh token.
fn fingerprint(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidra_db::models::{InsertOutcome, NewUser};

    fn service(db: Arc<Database>) -> TokenService {
        TokenService::with_secrets(
            db,
            "access-secret",
            Duration::minutes(15),
            "refresh-secret",
            Duration::days(7),
        )
    }

    fn add_user(db: &Database, username: &str) -> Uuid {
        let id = Uuid::new_v4();
        let email = format!("{username}@example.com");
        let outcome = db
            .create_user(&NewUser {
                id: &id.to_string(),
                username,
                email: &email,
                full_name: username,
                avatar: "https://cdn.example.com/a.png",
                cover_image: "",
                password_hash: "$argon2id$stub",
            })
            .unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted);
        id
    }

    #[tokio::test]
    async fn access_token_verifies_to_its_subject() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let alice = add_user(&db, "alice");
        let tokens = service(db);

        let pair = tokens.issue_token_pair(alice).await.unwrap();
        assert_eq!(tokens.verify_access_token(&pair.access_token).unwrap().sub, alice);
    }

    #[tokio::test]
    async fn token_kinds_are_not_interchangeable() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let alice = add_user(&db, "alice");
        let tokens = service(db);

        let pair = tokens.issue_token_pair(alice).await.unwrap();
        assert!(matches!(
            tokens.verify_access_token(&pair.refresh_token),
            Err(ApiError::TokenInvalid)
        ));
        assert!(matches!(
            tokens.rotate_from_refresh_token(&pair.access_token).await,
            Err(ApiError::TokenInvalid)
        ));
    }

    #[tokio::test]
    async fn expired_access_token_is_distinguished() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let alice = add_user(&db, "alice");
        let tokens = TokenService::with_secrets(
            db,
            "access-secret",
            Duration::minutes(-5),
            "refresh-secret",
            Duration::days(7),
        );

        let pair = tokens.issue_token_pair(alice).await.unwrap();
        assert!(matches!(
            tokens.verify_access_token(&pair.access_token),
            Err(ApiError::TokenExpired)
        ));
        assert!(matches!(
            tokens.verify_access_token("not.a.jwt"),
            Err(ApiError::TokenInvalid)
        ));
    }

    #[tokio::test]
    async fn exchanged_refresh_token_cannot_be_replayed() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let alice = add_user(&db, "alice");
        let tokens = service(db);

        let t0 = tokens.issue_token_pair(alice).await.unwrap().refresh_token;
        let t1 = tokens.rotate_from_refresh_token(&t0).await.unwrap().refresh_token;
        assert_ne!(t0, t1);

        assert!(matches!(
            tokens.rotate_from_refresh_token(&t0).await,
            Err(ApiError::TokenRevoked)
        ));
        // The replay attempt does not disturb the legitimate holder.
        assert!(tokens.rotate_from_refresh_token(&t1).await.is_ok());
    }

    #[tokio::test]
    async fn new_login_ends_the_previous_session() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let alice = add_user(&db, "alice");
        let tokens = service(db);

        let first_device = tokens.issue_token_pair(alice).await.unwrap().refresh_token;
        let second_device = tokens.issue_token_pair(alice).await.unwrap().refresh_token;

        assert!(matches!(
            tokens.rotate_from_refresh_token(&first_device).await,
            Err(ApiError::TokenRevoked)
        ));
        assert!(tokens.rotate_from_refresh_token(&second_device).await.is_ok());
    }

    #[tokio::test]
    async fn revoke_is_idempotent_and_kills_the_refresh_token() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let alice = add_user(&db, "alice");
        let tokens = service(db);

        let pair = tokens.issue_token_pair(alice).await.unwrap();
        tokens.revoke(alice).await.unwrap();
        tokens.revoke(alice).await.unwrap();
        tokens.revoke(Uuid::new_v4()).await.unwrap();

        assert!(matches!(
            tokens.rotate_from_refresh_token(&pair.refresh_token).await,
            Err(ApiError::TokenRevoked)
        ));
    }

    #[tokio::test]
    async fn refresh_for_deleted_user_is_user_not_found() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let alice = add_user(&db, "alice");
        let tokens = service(db.clone());

        let pair = tokens.issue_token_pair(alice).await.unwrap();
        assert!(db.delete_user(&alice.to_string()).unwrap());

        assert!(matches!(
            tokens.rotate_from_refresh_token(&pair.refresh_token).await,
            Err(ApiError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn issuing_for_unknown_user_is_a_persistence_error() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let tokens = service(db);

        assert!(matches!(
            tokens.issue_token_pair(Uuid::new_v4()).await,
            Err(ApiError::Persistence(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_refreshes_with_one_token_admit_one_winner() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let alice = add_user(&db, "alice");
        let tokens = Arc::new(service(db));

        let t0 = tokens.issue_token_pair(alice).await.unwrap().refresh_token;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tokens = tokens.clone();
                let t0 = t0.clone();
                tokio::spawn(async move { tokens.rotate_from_refresh_token(&t0).await })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(ApiError::TokenRevoked) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(winners, 1);
    }
}
