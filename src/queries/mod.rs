// Relation query adapters - one per relation, each exposing the
// ordered-source contract the connection paginator consumes. Every
// adapter carries its filter predicate so the count reflects the same
// universe as the page fetch, minus the cursor range.

use async_trait::async_trait;

use crate::core::Privacy;
use crate::error::AppResult;
use crate::models::document::match_span;
use crate::models::{PostHit, PostStar, Profile, StarredPost};
use crate::pagination::{ConnectionSource, Direction, SortKey};
use crate::storage::{FollowDirection, PostFilters, Store};

/// Posts matching a filter set, most-recent or most-starred first.
/// When a text query is present each returned row carries the
/// matching-span context window.
pub struct PostsSource<'a> {
    store: &'a dyn Store,
    filters: PostFilters,
}

impl<'a> PostsSource<'a> {
    pub fn new(store: &'a dyn Store, filters: PostFilters) -> Self {
        PostsSource { store, filters }
    }
}

#[async_trait]
impl ConnectionSource<PostHit> for PostsSource<'_> {
    async fn fetch_page(
        &self,
        bound: Option<&SortKey>,
        direction: Direction,
        limit: Option<u32>,
    ) -> AppResult<Vec<(SortKey, PostHit)>> {
        let rows = self
            .store
            .fetch_posts(&self.filters, bound, direction, limit)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(key, post)| {
                let matching_span = self
                    .filters
                    .query
                    .as_deref()
                    .and_then(|query| match_span(&post, query));
                (
                    key,
                    PostHit {
                        post,
                        matching_span,
                    },
                )
            })
            .collect())
    }

    async fn total_count(&self) -> AppResult<i64> {
        self.store.count_posts(&self.filters).await
    }
}

/// Profiles that starred a post, newest star first.
pub struct PostStarsSource<'a> {
    store: &'a dyn Store,
    post_id: String,
}

impl<'a> PostStarsSource<'a> {
    pub fn new(store: &'a dyn Store, post_id: impl Into<String>) -> Self {
        PostStarsSource {
            store,
            post_id: post_id.into(),
        }
    }
}

#[async_trait]
impl ConnectionSource<PostStar> for PostStarsSource<'_> {
    async fn fetch_page(
        &self,
        bound: Option<&SortKey>,
        direction: Direction,
        limit: Option<u32>,
    ) -> AppResult<Vec<(SortKey, PostStar)>> {
        self.store
            .fetch_post_stars(&self.post_id, bound, direction, limit)
            .await
    }

    async fn total_count(&self) -> AppResult<i64> {
        self.store.count_post_stars(&self.post_id).await
    }
}

/// Posts a profile starred, restricted to what the viewer may see of
/// the starred posts themselves.
pub struct StarredPostsSource<'a> {
    store: &'a dyn Store,
    profile_id: String,
    privacy: Option<Privacy>,
}

impl<'a> StarredPostsSource<'a> {
    pub fn new(
        store: &'a dyn Store,
        profile_id: impl Into<String>,
        privacy: Option<Privacy>,
    ) -> Self {
        StarredPostsSource {
            store,
            profile_id: profile_id.into(),
            privacy,
        }
    }
}

#[async_trait]
impl ConnectionSource<StarredPost> for StarredPostsSource<'_> {
    async fn fetch_page(
        &self,
        bound: Option<&SortKey>,
        direction: Direction,
        limit: Option<u32>,
    ) -> AppResult<Vec<(SortKey, StarredPost)>> {
        self.store
            .fetch_starred_posts(&self.profile_id, self.privacy, bound, direction, limit)
            .await
    }

    async fn total_count(&self) -> AppResult<i64> {
        self.store
            .count_starred_posts(&self.profile_id, self.privacy)
            .await
    }
}

/// Follow edges of a profile in either direction, newest edge first.
pub struct FollowsSource<'a> {
    store: &'a dyn Store,
    profile_id: String,
    which: FollowDirection,
}

impl<'a> FollowsSource<'a> {
    pub fn new(store: &'a dyn Store, profile_id: impl Into<String>, which: FollowDirection) -> Self {
        FollowsSource {
            store,
            profile_id: profile_id.into(),
            which,
        }
    }
}

#[async_trait]
impl ConnectionSource<Profile> for FollowsSource<'_> {
    async fn fetch_page(
        &self,
        bound: Option<&SortKey>,
        direction: Direction,
        limit: Option<u32>,
    ) -> AppResult<Vec<(SortKey, Profile)>> {
        self.store
            .fetch_follow_edges(&self.profile_id, self.which, bound, direction, limit)
            .await
    }

    async fn total_count(&self) -> AppResult<i64> {
        self.store
            .count_follow_edges(&self.profile_id, self.which)
            .await
    }
}
