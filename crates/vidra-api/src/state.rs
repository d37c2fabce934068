use std::sync::Arc;

use vidra_db::Database;

use crate::blob::BlobStore;
use crate::config::Config;
use crate::projections::ProjectionBuilder;
use crate::relationships::RelationshipEngine;
use crate::session::SessionAuthenticator;
use crate::tokens::TokenService;

pub type AppState = Arc<AppStateInner>;

/// Everything a handler can reach. Built once at startup; the database
/// handle is injected here and shared by every component.
pub struct AppStateInner {
    pub config: Config,
    pub db: Arc<Database>,
    pub tokens: Arc<TokenService>,
    pub sessions: SessionAuthenticator,
    pub relationships: RelationshipEngine,
    pub projections: ProjectionBuilder,
    pub blobs: Arc<dyn BlobStore>,
}

impl AppStateInner {
    pub fn new(config: Config, db: Database, blobs: Arc<dyn BlobStore>) -> AppState {
        let db = Arc::new(db);
        let tokens = Arc::new(TokenService::new(&config, db.clone()));

        Arc::new(Self {
            sessions: SessionAuthenticator::new(tokens.clone(), db.clone()),
            relationships: RelationshipEngine::new(db.clone()),
            projections: ProjectionBuilder::new(db.clone()),
            tokens,
            db,
            blobs,
            config,
        })
    }
}
