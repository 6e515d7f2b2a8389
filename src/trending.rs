// Trending ranker - ranks public posts by summed view count inside a
// trailing window, then re-presents the rank-ordered list through the
// standard connection contract. Rank order is not expressible as a
// column sort in the store, so the fetched rows are re-sequenced
// out of band before pagination.

use async_trait::async_trait;
use chrono::Duration;
use std::collections::HashMap;

use crate::core::{current_time_millis, day_bucket};
use crate::error::AppResult;
use crate::models::Post;
use crate::pagination::{
    paginate, Connection, ConnectionArgs, ConnectionSource, Direction, SortKey,
};
use crate::storage::Store;

/// Trailing aggregation window, in days.
pub const TRENDING_WINDOW_DAYS: i64 = 30;

/// Optional narrowing of the trending listing; the public-only
/// restriction always applies.
#[derive(Debug, Clone, Default)]
pub struct TrendingFilters {
    pub profile_id: Option<String>,
    pub language: Option<String>,
}

/// Paginated trending posts.
///
/// Step 1 aggregates windowed view sums into a rank order; step 2
/// fetches the candidate rows in store order; step 3 re-sequences them
/// into rank order, dropping ids that no longer resolve to a fetchable
/// row; step 4 paginates the ranked list as a naturally ordered
/// source whose sort key is the rank index.
pub async fn trending_connection(
    store: &dyn Store,
    filters: &TrendingFilters,
    args: &ConnectionArgs,
) -> AppResult<Connection<Post>> {
    let since = day_bucket(current_time_millis()) - Duration::days(TRENDING_WINDOW_DAYS);
    let rank_order = store.post_view_sums_since(since).await?;

    let ids: Vec<String> = rank_order.iter().map(|(id, _)| id.clone()).collect();
    let fetched = store
        .get_public_posts_by_ids(&ids, filters.profile_id.as_deref(), filters.language.as_deref())
        .await?;

    let mut by_id: HashMap<String, Post> = fetched
        .into_iter()
        .map(|post| (post.id.clone(), post))
        .collect();
    let ranked: Vec<Post> = rank_order
        .iter()
        .filter_map(|(id, _)| by_id.remove(id))
        .collect();

    paginate(&RankedPostsSource { ranked }, args).await
}

/// An already rank-ordered in-memory list presented as an ordered
/// source. The sort key's primary is the rank index, ascending.
struct RankedPostsSource {
    ranked: Vec<Post>,
}

#[async_trait]
impl ConnectionSource<Post> for RankedPostsSource {
    async fn fetch_page(
        &self,
        bound: Option<&SortKey>,
        direction: Direction,
        limit: Option<u32>,
    ) -> AppResult<Vec<(SortKey, Post)>> {
        let len = self.ranked.len() as i64;

        let indexed = |index: i64| {
            let post = self.ranked[index as usize].clone();
            (SortKey::new(index, post.id.clone()), post)
        };

        let mut rows: Vec<(SortKey, Post)> = match direction {
            Direction::Forward => {
                let start = bound.map_or(0, |key| (key.primary + 1).max(0)).min(len);
                (start..len).map(indexed).collect()
            }
            Direction::Backward => {
                let end = bound.map_or(len, |key| key.primary.clamp(0, len));
                (0..end).rev().map(indexed).collect()
            }
        };

        if let Some(limit) = limit {
            rows.truncate(limit as usize);
        }
        Ok(rows)
    }

    async fn total_count(&self) -> AppResult<i64> {
        Ok(self.ranked.len() as i64)
    }
}
