//! Read models computed on request from relationship and content rows.
//! Nothing here is persisted, and figures that are fetched concurrently are
//! not read under one snapshot.

use std::sync::Arc;

use uuid::Uuid;

use vidra_db::Database;
use vidra_types::models::{ChannelProfile, ChannelStats, PublicUser, RelationshipKind, VideoSummary};

use crate::blocking;
use crate::convert;
use crate::error::ApiError;

pub struct ProjectionBuilder {
    db: Arc<Database>,
}

impl ProjectionBuilder {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn channel_stats(&self, channel_id: Uuid) -> Result<ChannelStats, ApiError> {
        let cid = channel_id.to_string();

        let (totals, likes, comments, subscribers) = tokio::try_join!(
            blocking::run(&self.db, {
                let cid = cid.clone();
                move |db| db.video_totals(&cid)
            }),
            blocking::run(&self.db, {
                let cid = cid.clone();
                move |db| db.count_likes_on_owned_videos(&cid)
            }),
            blocking::run(&self.db, {
                let cid = cid.clone();
                move |db| db.count_comments_on_owned_videos(&cid)
            }),
            blocking::run(&self.db, move |db| {
                db.count_relationships_to(&cid, RelationshipKind::Channel)
            }),
        )?;

        Ok(ChannelStats {
            total_videos: totals.count,
            total_views: totals.views,
            total_likes: likes,
            total_comments: comments,
            subscribers,
        })
    }

    /// Public channel page. `viewer` is the requesting actor, if any.
    pub async fn channel_profile(
        &self,
        username: &str,
        viewer: Option<Uuid>,
    ) -> Result<ChannelProfile, ApiError> {
        let name = username.trim().to_string();
        if name.is_empty() {
            return Err(ApiError::Validation("Username is missing".into()));
        }

        let user = blocking::run(&self.db, move |db| db.get_user_by_username(&name))
            .await?
            .ok_or_else(|| ApiError::NotFound("Channel does not exist".into()))?;

        let (subscribers_count, channels_subscribed_to_count, is_subscribed) = tokio::try_join!(
            blocking::run(&self.db, {
                let uid = user.id.clone();
                move |db| db.count_relationships_to(&uid, RelationshipKind::Channel)
            }),
            blocking::run(&self.db, {
                let uid = user.id.clone();
                move |db| db.count_relationships_from(&uid, RelationshipKind::Channel)
            }),
            blocking::run(&self.db, {
                let uid = user.id.clone();
                move |db| match viewer {
                    Some(viewer) => Ok(db
                        .find_relationship(&viewer.to_string(), &uid, RelationshipKind::Channel)?
                        .is_some()),
                    None => Ok(false),
                }
            }),
        )?;

        Ok(ChannelProfile {
            id: convert::stored_id(&user.id),
            username: user.username,
            full_name: user.full_name,
            avatar: user.avatar,
            cover_image: user.cover_image,
            subscribers_count,
            channels_subscribed_to_count,
            is_subscribed,
        })
    }

    /// Resolves the actor's recorded history into video summaries, in the
    /// order it was recorded. Entries whose video is gone are skipped; no
    /// history is an empty list.
    pub async fn watch_history(&self, actor_id: Uuid) -> Result<Vec<VideoSummary>, ApiError> {
        let aid = actor_id.to_string();
        let rows = blocking::run(&self.db, move |db| db.watch_history(&aid)).await?;
        Ok(rows.into_iter().map(convert::video_summary).collect())
    }

    pub async fn liked_videos(&self, actor_id: Uuid) -> Result<Vec<VideoSummary>, ApiError> {
        let aid = actor_id.to_string();
        let rows = blocking::run(&self.db, move |db| db.liked_videos(&aid)).await?;
        Ok(rows.into_iter().map(convert::video_summary).collect())
    }

    pub async fn channel_videos(&self, channel_id: Uuid) -> Result<Vec<VideoSummary>, ApiError> {
        let cid = channel_id.to_string();
        let rows = blocking::run(&self.db, move |db| db.videos_by_owner(&cid)).await?;
        Ok(rows.into_iter().map(convert::video_summary).collect())
    }

    pub async fn channel_subscribers(&self, channel_id: Uuid) -> Result<Vec<PublicUser>, ApiError> {
        let cid = channel_id.to_string();
        let rows = blocking::run(&self.db, move |db| db.list_subscribers(&cid)).await?;
        Ok(rows.into_iter().map(convert::public_user).collect())
    }

    pub async fn subscribed_channels(
        &self,
        subscriber_id: Uuid,
    ) -> Result<Vec<PublicUser>, ApiError> {
        let sid = subscriber_id.to_string();
        let rows = blocking::run(&self.db, move |db| db.list_subscriptions(&sid)).await?;
        Ok(rows.into_iter().map(convert::public_user).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationships::RelationshipEngine;
    use vidra_db::models::{NewUser, NewVideo};

    struct Fixture {
        db: Arc<Database>,
        engine: RelationshipEngine,
        projections: ProjectionBuilder,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        Fixture {
            engine: RelationshipEngine::new(db.clone()),
            projections: ProjectionBuilder::new(db.clone()),
            db,
        }
    }

    fn add_user(db: &Database, username: &str) -> Uuid {
        let id = Uuid::new_v4();
        let email = format!("{username}@example.com");
        db.create_user(&NewUser {
            id: &id.to_string(),
            username,
            email: &email,
            full_name: &format!("{username} full"),
            avatar: "https://cdn.example.com/avatar.png",
            cover_image: "https://cdn.example.com/cover.png",
            password_hash: "h",
        })
        .unwrap();
        id
    }

    fn add_video(db: &Database, owner: Uuid, title: &str, views: i64) -> Uuid {
        let id = Uuid::new_v4();
        db.insert_video(&NewVideo {
            id: &id.to_string(),
            owner_id: &owner.to_string(),
            title,
            description: "desc",
            video_file: "https://cdn.example.com/v.mp4",
            thumbnail: "https://cdn.example.com/t.png",
            duration: 60.0,
            views,
            is_published: true,
        })
        .unwrap();
        id
    }

    #[tokio::test]
    async fn stats_combine_content_and_edges() {
        let f = fixture();
        let owner = add_user(&f.db, "owner");
        let fans: Vec<Uuid> = (0..3).map(|i| add_user(&f.db, &format!("fan{i}"))).collect();
        let v1 = add_video(&f.db, owner, "one", 100);
        let v2 = add_video(&f.db, owner, "two", 23);

        for fan in &fans {
            f.engine.toggle(*fan, v1, RelationshipKind::Video).await.unwrap();
            f.engine.toggle(*fan, owner, RelationshipKind::Channel).await.unwrap();
        }
        f.engine.toggle(fans[0], v2, RelationshipKind::Video).await.unwrap();
        f.db.insert_comment(&Uuid::new_v4().to_string(), &v2.to_string(), &fans[1].to_string(), "hi")
            .unwrap();

        let stats = f.projections.channel_stats(owner).await.unwrap();
        assert_eq!(
            stats,
            ChannelStats {
                total_videos: 2,
                total_views: 123,
                total_likes: 4,
                total_comments: 1,
                subscribers: 3,
            }
        );

        f.engine.toggle(fans[1], v1, RelationshipKind::Video).await.unwrap();
        assert_eq!(f.projections.channel_stats(owner).await.unwrap().total_likes, 3);
    }

    #[tokio::test]
    async fn stats_for_empty_channel_are_zero() {
        let f = fixture();
        let owner = add_user(&f.db, "quiet");
        assert_eq!(
            f.projections.channel_stats(owner).await.unwrap(),
            ChannelStats::default()
        );
    }

    #[tokio::test]
    async fn profile_counts_both_directions_and_flags_viewer() {
        let f = fixture();
        let alice = add_user(&f.db, "alice");
        let bob = add_user(&f.db, "bob");
        let carol = add_user(&f.db, "carol");

        f.engine.toggle(bob, alice, RelationshipKind::Channel).await.unwrap();
        f.engine.toggle(carol, alice, RelationshipKind::Channel).await.unwrap();
        f.engine.toggle(alice, bob, RelationshipKind::Channel).await.unwrap();

        let seen_by_bob = f.projections.channel_profile("ALICE", Some(bob)).await.unwrap();
        assert_eq!(seen_by_bob.id, alice);
        assert_eq!(seen_by_bob.subscribers_count, 2);
        assert_eq!(seen_by_bob.channels_subscribed_to_count, 1);
        assert!(seen_by_bob.is_subscribed);

        let anonymous = f.projections.channel_profile("alice", None).await.unwrap();
        assert!(!anonymous.is_subscribed);

        let seen_by_self = f.projections.channel_profile("alice", Some(alice)).await.unwrap();
        assert!(!seen_by_self.is_subscribed);
    }

    #[tokio::test]
    async fn unknown_channel_is_not_found() {
        let f = fixture();
        assert!(matches!(
            f.projections.channel_profile("nobody", None).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn watch_history_resolves_owner_and_order() {
        let f = fixture();
        let owner = add_user(&f.db, "creator");
        let viewer = add_user(&f.db, "viewer");
        let a = add_video(&f.db, owner, "a", 0);
        let b = add_video(&f.db, owner, "b", 0);

        assert!(f.projections.watch_history(viewer).await.unwrap().is_empty());

        f.db.append_watch_history(&viewer.to_string(), &a.to_string()).unwrap();
        f.db.append_watch_history(&viewer.to_string(), &b.to_string()).unwrap();

        let history = f.projections.watch_history(viewer).await.unwrap();
        let titles: Vec<&str> = history.iter().map(|v| v.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b"]);
        let owner_summary = history[0].owner.as_ref().unwrap();
        assert_eq!(owner_summary.id, owner);
        assert_eq!(owner_summary.username, "creator");

        // Restartable: a second read yields the same sequence.
        assert_eq!(f.projections.watch_history(viewer).await.unwrap(), history);
    }

    #[tokio::test]
    async fn subscriber_lists_expose_public_fields() {
        let f = fixture();
        let alice = add_user(&f.db, "alice");
        let bob = add_user(&f.db, "bob");

        f.engine.toggle(bob, alice, RelationshipKind::Channel).await.unwrap();

        let subscribers = f.projections.channel_subscribers(alice).await.unwrap();
        assert_eq!(
            subscribers,
            vec![PublicUser {
                id: bob,
                username: "bob".into(),
                full_name: "bob full".into(),
                avatar: "https://cdn.example.com/avatar.png".into(),
            }]
        );

        let channels = f.projections.subscribed_channels(bob).await.unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].id, alice);
    }

    #[tokio::test]
    async fn liked_videos_are_newest_like_first() {
        let f = fixture();
        let owner = add_user(&f.db, "owner");
        let fan = add_user(&f.db, "fan");
        let first = add_video(&f.db, owner, "first", 0);
        let second = add_video(&f.db, owner, "second", 0);

        f.engine.toggle(fan, first, RelationshipKind::Video).await.unwrap();
        f.engine.toggle(fan, second, RelationshipKind::Video).await.unwrap();

        let liked: Vec<Uuid> = f
            .projections
            .liked_videos(fan)
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.id)
            .collect();
        assert_eq!(liked, vec![second, first]);

        let mine = f.projections.channel_videos(owner).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].id, second);
    }
}
