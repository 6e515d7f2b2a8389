// Profile resolver operations: lifecycle, follow toggles, follower and
// following connections, the merged activity feed and starred posts.

use std::sync::Arc;
use tracing::{debug, info};

use crate::core::{current_time_millis, day_bucket, effective_privacy, ViewerContext};
use crate::error::{AppError, AppResult};
use crate::feed::feed_connection;
use crate::models::{Activity, FeedEntry, Follow, Profile, StarredPost};
use crate::pagination::{paginate, Connection, ConnectionArgs};
use crate::queries::{FollowsSource, StarredPostsSource};
use crate::storage::{FollowDirection, ProfileUpdate, Store};

/// Profile fields accepted from the transport boundary.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdateInput {
    pub bio: Option<String>,
    pub language: Option<String>,
}

pub struct ProfileService {
    store: Arc<dyn Store>,
}

impl ProfileService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        ProfileService { store }
    }

    /// Create the viewer's profile. The profile id is the caller
    /// identity itself; one profile exists per identity.
    ///
    /// The activity append is a separate store write with no
    /// compensation: a failure after the profile insert leaves a
    /// profile without its creation entry.
    pub async fn create(&self, ctx: &ViewerContext) -> AppResult<Profile> {
        let viewer_id = ctx.require_viewer()?;

        let profile = self.store.create_profile(viewer_id).await?;
        self.store
            .append_activity(&Activity::profile_create(&profile.id))
            .await?;

        info!("Created profile {}", profile.id);
        Ok(profile)
    }

    pub async fn update(
        &self,
        ctx: &ViewerContext,
        values: ProfileUpdateInput,
    ) -> AppResult<Profile> {
        let viewer_id = ctx.require_viewer()?;

        let profile = self
            .store
            .update_profile(
                viewer_id,
                &ProfileUpdate {
                    bio: values.bio,
                    language: values.language,
                },
            )
            .await?;

        info!("Updated profile {}", profile.id);
        Ok(profile)
    }

    pub async fn delete(&self, ctx: &ViewerContext) -> AppResult<bool> {
        let viewer_id = ctx.require_viewer()?;

        self.store.delete_profile(viewer_id).await?;
        info!("Deleted profile {}", viewer_id);
        Ok(true)
    }

    /// Find a profile, defaulting to the viewer's own when no id is
    /// given. Foreign reads register a profile view.
    pub async fn find(&self, ctx: &ViewerContext, profile_id: Option<&str>) -> AppResult<Profile> {
        let profile_id = match profile_id {
            Some(id) => id,
            None => ctx.require_viewer()?,
        };

        let profile = self
            .store
            .get_profile(profile_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Profile {} not found", profile_id)))?;

        if !ctx.is_owner(&profile.id) {
            self.store
                .record_profile_view(&profile.id, day_bucket(current_time_millis()))
                .await?;
        }

        Ok(profile)
    }

    pub async fn find_all(&self) -> AppResult<Vec<Profile>> {
        self.store.list_profiles().await
    }

    /// Follow `followed_id` as the viewer. Following an already
    /// followed profile is a domain error; a unique-constraint race in
    /// the store surfaces as the same error.
    pub async fn follow(&self, ctx: &ViewerContext, followed_id: &str) -> AppResult<Follow> {
        let viewer_id = ctx.require_viewer()?;

        self.store
            .get_profile(followed_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Profile {} not found", followed_id)))?;

        if self.store.follow_exists(viewer_id, followed_id).await? {
            return Err(AppError::AlreadyFollowed(followed_id.to_string()));
        }

        let follow = self.store.create_follow(viewer_id, followed_id).await?;
        self.store
            .append_activity(&Activity::follow(viewer_id, &follow.id))
            .await?;

        info!("Profile {} followed {}", viewer_id, followed_id);
        Ok(follow)
    }

    pub async fn unfollow(&self, ctx: &ViewerContext, followed_id: &str) -> AppResult<bool> {
        let viewer_id = ctx.require_viewer()?;

        if !self.store.follow_exists(viewer_id, followed_id).await? {
            return Err(AppError::NotFollowed(followed_id.to_string()));
        }

        self.store.delete_follow(viewer_id, followed_id).await?;
        info!("Profile {} unfollowed {}", viewer_id, followed_id);
        Ok(true)
    }

    pub async fn followers(
        &self,
        profile_id: &str,
        args: &ConnectionArgs,
    ) -> AppResult<Connection<Profile>> {
        debug!("Listing followers of {}", profile_id);
        let source = FollowsSource::new(self.store.as_ref(), profile_id, FollowDirection::Followers);
        paginate(&source, args).await
    }

    pub async fn following(
        &self,
        profile_id: &str,
        args: &ConnectionArgs,
    ) -> AppResult<Connection<Profile>> {
        debug!("Listing profiles followed by {}", profile_id);
        let source = FollowsSource::new(self.store.as_ref(), profile_id, FollowDirection::Following);
        paginate(&source, args).await
    }

    /// The merged activity feed of a profile, rendered for the viewer.
    pub async fn activity(
        &self,
        ctx: &ViewerContext,
        profile_id: &str,
        args: &ConnectionArgs,
    ) -> AppResult<Connection<FeedEntry>> {
        debug!("Listing activity of {}", profile_id);
        feed_connection(self.store.as_ref(), ctx, profile_id, args).await
    }

    /// Posts a profile starred; the starred posts themselves pass
    /// through the viewer's visibility filter.
    pub async fn starred_posts(
        &self,
        ctx: &ViewerContext,
        profile_id: &str,
        args: &ConnectionArgs,
    ) -> AppResult<Connection<StarredPost>> {
        let privacy = effective_privacy(ctx, Some(profile_id), None)?;
        let source = StarredPostsSource::new(self.store.as_ref(), profile_id, privacy);
        paginate(&source, args).await
    }

    pub async fn views(&self, profile_id: &str) -> AppResult<i64> {
        self.store.sum_profile_views(profile_id).await
    }
}
