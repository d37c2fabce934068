//! Toggle engine shared by likes and subscriptions.
//!
//! The existence of an `(actor, target, kind)` edge is the whole state.
//! The read-check-then-mutate sequence is not transactional; the UNIQUE
//! index on the tuple is what keeps racing "on" toggles from producing two
//! edges, and a lost insert race is reported as "already active".

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use vidra_db::Database;
use vidra_db::models::InsertOutcome;
use vidra_types::models::RelationshipKind;

use crate::blocking;
use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Toggle {
    pub is_active: bool,
    /// Fresh count of edges on the target, re-queried after the mutation.
    pub total_count: i64,
}

pub struct RelationshipEngine {
    db: Arc<Database>,
}

impl RelationshipEngine {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Flips the edge from `actor_id` to `target_id`.
    ///
    /// Existence of video/comment/tweet targets is the caller's job. For
    /// `Channel` the target user must exist and must not be the actor;
    /// both are checked before anything is written.
    pub async fn toggle(
        &self,
        actor_id: Uuid,
        target_id: Uuid,
        kind: RelationshipKind,
    ) -> Result<Toggle, ApiError> {
        if kind == RelationshipKind::Channel {
            if actor_id == target_id {
                return Err(ApiError::InvalidOperation(
                    "You cannot subscribe to yourself".into(),
                ));
            }

            let tid = target_id.to_string();
            let exists =
                blocking::run(&self.db, move |db| db.target_exists(RelationshipKind::Channel, &tid))
                    .await?;
            if !exists {
                return Err(ApiError::TargetNotFound("Channel".into()));
            }
        }

        let (aid, tid) = (actor_id.to_string(), target_id.to_string());
        let existing =
            blocking::run(&self.db, move |db| db.find_relationship(&aid, &tid, kind)).await?;

        let is_active = match existing {
            Some(_) => {
                self.deactivate(actor_id, target_id, kind).await?;
                false
            }
            None => self.activate(actor_id, target_id, kind).await?,
        };

        let total_count = self.count(target_id, kind).await?;
        debug!(
            "{} toggled {} {} -> active={} total={}",
            actor_id, kind, target_id, is_active, total_count
        );

        Ok(Toggle {
            is_active,
            total_count,
        })
    }

    /// Creates the edge. A unique-constraint conflict means a concurrent
    /// request created it first, which is the same end state.
    async fn activate(
        &self,
        actor_id: Uuid,
        target_id: Uuid,
        kind: RelationshipKind,
    ) -> Result<bool, ApiError> {
        let id = Uuid::new_v4().to_string();
        let (aid, tid) = (actor_id.to_string(), target_id.to_string());
        let outcome =
            blocking::run(&self.db, move |db| db.insert_relationship(&id, &aid, &tid, kind))
                .await?;

        if outcome == InsertOutcome::Conflict {
            debug!("{} lost a create race on {} {}", actor_id, kind, target_id);
        }
        Ok(true)
    }

    /// Removes the edge; a concurrent delete having got there first is fine.
    async fn deactivate(
        &self,
        actor_id: Uuid,
        target_id: Uuid,
        kind: RelationshipKind,
    ) -> Result<(), ApiError> {
        let (aid, tid) = (actor_id.to_string(), target_id.to_string());
        blocking::run(&self.db, move |db| db.delete_relationship(&aid, &tid, kind)).await?;
        Ok(())
    }

    pub async fn count(&self, target_id: Uuid, kind: RelationshipKind) -> Result<i64, ApiError> {
        let tid = target_id.to_string();
        blocking::run(&self.db, move |db| db.count_relationships_to(&tid, kind)).await
    }
}
