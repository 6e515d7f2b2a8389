// Storage interface - the narrow async boundary between the resolver
// core and the relational store. PostgreSQL backs production;
// in-memory SQLite backs the test suite and local development. Both
// implementations share identical observable semantics.

pub mod postgres;
pub mod sqlite;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::core::Privacy;
use crate::error::AppResult;
use crate::models::{Activity, ActivityGroup, Follow, Post, PostStar, Profile, Star, StarredPost};
use crate::pagination::{Direction, SortKey};

pub use postgres::{PostgresStore, StoreConfig};
pub use sqlite::SqliteStore;

/// Secondary sort mode for post listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PostSort {
    /// Creation time descending.
    #[default]
    MostRecent,
    /// Star count descending, id tie-break.
    MostStarred,
}

/// Filter set for post listings. `privacy` is the effective constraint
/// already derived by the visibility filter, `None` meaning
/// unconstrained.
#[derive(Debug, Clone, Default)]
pub struct PostFilters {
    pub profile_id: Option<String>,
    pub privacy: Option<Privacy>,
    pub language: Option<String>,
    pub query: Option<String>,
    pub from: Option<i64>,
    pub to: Option<i64>,
    pub sort: PostSort,
}

/// Which side of the follow edge a listing walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowDirection {
    /// Profiles following the subject.
    Followers,
    /// Profiles the subject follows.
    Following,
}

/// Partial profile update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub bio: Option<String>,
    pub language: Option<String>,
}

/// Partial post update; `None` fields are left unchanged. The slug is
/// derived once at creation and never rewritten here.
#[derive(Debug, Clone, Default)]
pub struct PostUpdate {
    pub title: Option<String>,
    pub avatar_url: Option<String>,
    pub summary: Option<String>,
    pub content: Option<serde_json::Value>,
    pub privacy: Option<Privacy>,
    pub language: Option<String>,
}

/// The storage collaborator consumed by the core.
///
/// Ordered fetch methods take a decoded cursor bound, a traversal
/// direction and a limit, and return rows in traversal order paired
/// with their sort keys (see `ConnectionSource`). Count methods apply
/// the same filter predicate without any cursor range. Unique-pair
/// conflicts surface as the matching domain error, never as a generic
/// storage failure.
#[async_trait]
pub trait Store: Send + Sync {
    // Profiles
    async fn create_profile(&self, id: &str) -> AppResult<Profile>;
    async fn update_profile(&self, id: &str, values: &ProfileUpdate) -> AppResult<Profile>;
    async fn delete_profile(&self, id: &str) -> AppResult<()>;
    async fn get_profile(&self, id: &str) -> AppResult<Option<Profile>>;
    async fn list_profiles(&self) -> AppResult<Vec<Profile>>;

    // Posts
    async fn create_post(&self, post: &Post) -> AppResult<()>;
    async fn update_post(&self, id: &str, values: &PostUpdate) -> AppResult<Post>;
    async fn delete_post(&self, id: &str) -> AppResult<()>;
    async fn get_post(&self, id: &str) -> AppResult<Option<Post>>;
    async fn get_post_by_slug(&self, slug: &str) -> AppResult<Option<Post>>;
    async fn slug_exists(&self, slug: &str) -> AppResult<bool>;
    async fn fetch_posts(
        &self,
        filters: &PostFilters,
        bound: Option<&SortKey>,
        direction: Direction,
        limit: Option<u32>,
    ) -> AppResult<Vec<(SortKey, Post)>>;
    async fn count_posts(&self, filters: &PostFilters) -> AppResult<i64>;
    /// Public posts among `ids`, optionally narrowed by owner and
    /// language, in store order (rank re-sequencing happens upstream).
    async fn get_public_posts_by_ids(
        &self,
        ids: &[String],
        profile_id: Option<&str>,
        language: Option<&str>,
    ) -> AppResult<Vec<Post>>;

    // Stars
    async fn create_star(&self, profile_id: &str, post_id: &str) -> AppResult<Star>;
    async fn delete_star(&self, profile_id: &str, post_id: &str) -> AppResult<bool>;
    async fn star_exists(&self, profile_id: &str, post_id: &str) -> AppResult<bool>;
    async fn fetch_post_stars(
        &self,
        post_id: &str,
        bound: Option<&SortKey>,
        direction: Direction,
        limit: Option<u32>,
    ) -> AppResult<Vec<(SortKey, PostStar)>>;
    async fn count_post_stars(&self, post_id: &str) -> AppResult<i64>;
    async fn fetch_starred_posts(
        &self,
        profile_id: &str,
        privacy: Option<Privacy>,
        bound: Option<&SortKey>,
        direction: Direction,
        limit: Option<u32>,
    ) -> AppResult<Vec<(SortKey, StarredPost)>>;
    async fn count_starred_posts(
        &self,
        profile_id: &str,
        privacy: Option<Privacy>,
    ) -> AppResult<i64>;

    // Follows
    async fn create_follow(&self, follower_id: &str, followed_id: &str) -> AppResult<Follow>;
    async fn delete_follow(&self, follower_id: &str, followed_id: &str) -> AppResult<bool>;
    async fn follow_exists(&self, follower_id: &str, followed_id: &str) -> AppResult<bool>;
    async fn get_follow(&self, id: &str) -> AppResult<Option<Follow>>;
    async fn fetch_follow_edges(
        &self,
        profile_id: &str,
        which: FollowDirection,
        bound: Option<&SortKey>,
        direction: Direction,
        limit: Option<u32>,
    ) -> AppResult<Vec<(SortKey, Profile)>>;
    async fn count_follow_edges(&self, profile_id: &str, which: FollowDirection)
        -> AppResult<i64>;

    // Activity log
    async fn append_activity(&self, activity: &Activity) -> AppResult<()>;
    /// Distinct (type, post, follow) combinations for a profile,
    /// stamped with the latest occurrence and a stable representative
    /// row id.
    async fn fetch_activity_groups(
        &self,
        profile_id: &str,
        bound: Option<&SortKey>,
        direction: Direction,
        limit: Option<u32>,
    ) -> AppResult<Vec<(SortKey, ActivityGroup)>>;
    /// Count of distinct combinations, not raw rows.
    async fn count_activity_groups(&self, profile_id: &str) -> AppResult<i64>;

    // View statistics
    async fn record_post_view(&self, post_id: &str, day: NaiveDate) -> AppResult<()>;
    async fn record_profile_view(&self, profile_id: &str, day: NaiveDate) -> AppResult<()>;
    async fn sum_post_views(&self, post_id: &str) -> AppResult<i64>;
    async fn sum_profile_views(&self, profile_id: &str) -> AppResult<i64>;
    /// Per-post view sums within the window starting at `since`,
    /// ordered by sum descending with a deterministic id tie-break.
    /// This is the rank order consumed by the trending ranker.
    async fn post_view_sums_since(&self, since: NaiveDate) -> AppResult<Vec<(String, i64)>>;
}

/// Escape `%`, `_` and the escape character itself, then wrap in `%`
/// wildcards for a substring LIKE match.
pub(crate) fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// SQL comparison operator and sort order for a traversal direction
/// over a descending canonical order.
pub(crate) fn range_ops(direction: Direction) -> (&'static str, &'static str) {
    match direction {
        Direction::Forward => ("<", "DESC"),
        Direction::Backward => (">", "ASC"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off\\now"), "%50\\%\\_off\\\\now%");
    }
}
