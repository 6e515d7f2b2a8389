// Post resolver operations: lifecycle with slug derivation, visibility
// enforcement, paginated listings, trending, and star toggles.

use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::{
    current_time_millis, day_bucket, effective_privacy, Privacy, ViewerContext,
};
use crate::error::{AppError, AppResult};
use crate::models::{Activity, Post, PostHit, PostStar, Star};
use crate::pagination::{paginate, Connection, ConnectionArgs};
use crate::queries::{PostStarsSource, PostsSource};
use crate::slug::derive_unique_slug;
use crate::storage::{PostFilters, PostSort, PostUpdate, Store};
use crate::trending::{trending_connection, TrendingFilters};

/// Post fields accepted at creation.
#[derive(Debug, Clone, Default)]
pub struct PostInput {
    pub title: String,
    pub avatar_url: Option<String>,
    pub summary: Option<String>,
    pub content: Option<serde_json::Value>,
    pub privacy: Option<Privacy>,
    pub language: Option<String>,
}

/// Post fields accepted on update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct PostUpdateInput {
    pub title: Option<String>,
    pub avatar_url: Option<String>,
    pub summary: Option<String>,
    pub content: Option<serde_json::Value>,
    pub privacy: Option<Privacy>,
    pub language: Option<String>,
}

/// Listing filters accepted from the transport boundary; the privacy
/// filter is a request that still passes the visibility rules.
#[derive(Debug, Clone, Default)]
pub struct PostListFilters {
    pub profile_id: Option<String>,
    pub privacy: Option<Privacy>,
    pub language: Option<String>,
    pub query: Option<String>,
    pub from: Option<i64>,
    pub to: Option<i64>,
    pub sort: PostSort,
}

pub struct PostService {
    store: Arc<dyn Store>,
}

impl PostService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        PostService { store }
    }

    /// Create a post owned by the viewer. The slug is derived from the
    /// title and retried until unique; privacy defaults to public. One
    /// view unit is seeded so the post is rank-eligible immediately.
    ///
    /// The view seed and activity append are separate store writes
    /// with no compensation; a failure between them leaves a post
    /// without its bookkeeping entries.
    pub async fn create(&self, ctx: &ViewerContext, values: PostInput) -> AppResult<Post> {
        let viewer_id = ctx.require_viewer()?;

        self.store
            .get_profile(viewer_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Profile {} not found", viewer_id)))?;

        let slug = derive_unique_slug(self.store.as_ref(), &values.title).await?;
        let now = current_time_millis();
        let post = Post {
            id: Uuid::new_v4().to_string(),
            slug,
            title: values.title,
            avatar_url: values.avatar_url,
            summary: values.summary,
            content: values.content,
            privacy: values.privacy.unwrap_or(Privacy::Public),
            language: values.language,
            profile_id: viewer_id.to_string(),
            created_at: now,
            updated_at: now,
        };

        self.store.create_post(&post).await?;
        self.store
            .record_post_view(&post.id, day_bucket(now))
            .await?;
        self.store
            .append_activity(&Activity::blog_create(viewer_id, &post.id))
            .await?;

        info!("Created post {} ({})", post.id, post.slug);
        Ok(post)
    }

    pub async fn update(
        &self,
        ctx: &ViewerContext,
        post_id: &str,
        values: PostUpdateInput,
    ) -> AppResult<Post> {
        self.require_owner(ctx, post_id).await?;

        let post = self
            .store
            .update_post(
                post_id,
                &PostUpdate {
                    title: values.title,
                    avatar_url: values.avatar_url,
                    summary: values.summary,
                    content: values.content,
                    privacy: values.privacy,
                    language: values.language,
                },
            )
            .await?;

        info!("Updated post {}", post.id);
        Ok(post)
    }

    pub async fn delete(&self, ctx: &ViewerContext, post_id: &str) -> AppResult<bool> {
        self.require_owner(ctx, post_id).await?;

        self.store.delete_post(post_id).await?;
        info!("Deleted post {}", post_id);
        Ok(true)
    }

    /// Find a post by id or slug. Foreign reads register a view;
    /// non-public posts are indistinguishable from absent ones for
    /// non-owners.
    pub async fn find(
        &self,
        ctx: &ViewerContext,
        post_id: Option<&str>,
        slug: Option<&str>,
    ) -> AppResult<Post> {
        let post = match (post_id, slug) {
            (Some(id), _) => self.store.get_post(id).await?,
            (None, Some(slug)) => self.store.get_post_by_slug(slug).await?,
            (None, None) => {
                return Err(AppError::InvalidInput(
                    "either a post id or a slug is required".to_string(),
                ))
            }
        };

        let post = post.ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

        if !ctx.is_owner(&post.profile_id) {
            self.store
                .record_post_view(&post.id, day_bucket(current_time_millis()))
                .await?;

            if post.privacy != Privacy::Public {
                return Err(AppError::NotFound("Post not found".to_string()));
            }
        }

        Ok(post)
    }

    /// Paginated post listing under the viewer's effective privacy.
    pub async fn find_all(
        &self,
        ctx: &ViewerContext,
        args: &ConnectionArgs,
        filters: PostListFilters,
    ) -> AppResult<Connection<PostHit>> {
        debug!("Listing posts with filters {:?}", filters);

        let privacy = effective_privacy(ctx, filters.profile_id.as_deref(), filters.privacy)?;
        let source = PostsSource::new(
            self.store.as_ref(),
            PostFilters {
                profile_id: filters.profile_id,
                privacy,
                language: filters.language,
                query: filters.query,
                from: filters.from,
                to: filters.to,
                sort: filters.sort,
            },
        );
        paginate(&source, args).await
    }

    /// Trending posts over the trailing 30-day window, public only.
    pub async fn find_trending(
        &self,
        args: &ConnectionArgs,
        filters: TrendingFilters,
    ) -> AppResult<Connection<Post>> {
        debug!("Listing trending posts with filters {:?}", filters);
        trending_connection(self.store.as_ref(), &filters, args).await
    }

    /// Star a post as the viewer. Starring an already starred post is
    /// a domain error; a unique-constraint race in the store surfaces
    /// as the same error.
    pub async fn star(&self, ctx: &ViewerContext, post_id: &str) -> AppResult<Star> {
        let viewer_id = ctx.require_viewer()?;

        self.store
            .get_post(post_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

        if self.store.star_exists(viewer_id, post_id).await? {
            return Err(AppError::AlreadyStarred(post_id.to_string()));
        }

        let star = self.store.create_star(viewer_id, post_id).await?;
        self.store
            .append_activity(&Activity::star(viewer_id, post_id))
            .await?;

        info!("Profile {} starred post {}", viewer_id, post_id);
        Ok(star)
    }

    pub async fn unstar(&self, ctx: &ViewerContext, post_id: &str) -> AppResult<bool> {
        let viewer_id = ctx.require_viewer()?;

        if !self.store.star_exists(viewer_id, post_id).await? {
            return Err(AppError::NotStarred(post_id.to_string()));
        }

        self.store.delete_star(viewer_id, post_id).await?;
        self.store
            .append_activity(&Activity::unstar(viewer_id, post_id))
            .await?;

        info!("Profile {} unstarred post {}", viewer_id, post_id);
        Ok(true)
    }

    /// Profiles that starred a post.
    pub async fn stars(
        &self,
        post_id: &str,
        args: &ConnectionArgs,
    ) -> AppResult<Connection<PostStar>> {
        let source = PostStarsSource::new(self.store.as_ref(), post_id);
        paginate(&source, args).await
    }

    pub async fn views(&self, post_id: &str) -> AppResult<i64> {
        self.store.sum_post_views(post_id).await
    }

    /// Ownership check shared by mutations.
    async fn require_owner(&self, ctx: &ViewerContext, post_id: &str) -> AppResult<()> {
        let viewer_id = ctx.require_viewer()?;

        let post = self
            .store
            .get_post(post_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

        if post.profile_id != viewer_id {
            return Err(AppError::Ownership(
                "you are not the owner of this post".to_string(),
            ));
        }
        Ok(())
    }
}
