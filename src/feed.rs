// Activity feed merger - unions post creations, star toggles and
// follow actions for one profile into a single distinct, time-ordered,
// cursor-paginated stream. The physical log is one append-only table;
// de-duplication happens per (type, post, follow) combination in the
// storage aggregate, and the total reflects distinct combinations
// rather than raw rows.

use async_trait::async_trait;

use crate::core::{can_view_post, ViewerContext};
use crate::error::AppResult;
use crate::models::{ActivityGroup, FeedEntry, FeedFollow};
use crate::pagination::{
    paginate, Connection, ConnectionArgs, ConnectionSource, Direction, SortKey,
};
use crate::storage::Store;

/// The merged activity feed of `profile_id` as seen by `viewer`.
pub async fn feed_connection(
    store: &dyn Store,
    viewer: &ViewerContext,
    profile_id: &str,
    args: &ConnectionArgs,
) -> AppResult<Connection<FeedEntry>> {
    let source = FeedSource {
        store,
        viewer: viewer.clone(),
        profile_id: profile_id.to_string(),
    };
    paginate(&source, args).await
}

struct FeedSource<'a> {
    store: &'a dyn Store,
    viewer: ViewerContext,
    profile_id: String,
}

impl FeedSource<'_> {
    /// Hydrate one logical entry. The referenced post is re-checked
    /// against the viewer's visibility at render time: an entry
    /// pointing at a now-inaccessible post still appears, with the
    /// post payload nulled. Follow references embed the followed
    /// profile; a reference whose target no longer resolves is simply
    /// left empty.
    async fn render(&self, group: ActivityGroup) -> AppResult<FeedEntry> {
        let post = match &group.post_id {
            Some(post_id) => self
                .store
                .get_post(post_id)
                .await?
                .filter(|post| can_view_post(&self.viewer, post)),
            None => None,
        };

        let follow = match &group.follow_id {
            Some(follow_id) => match self.store.get_follow(follow_id).await? {
                Some(edge) => self
                    .store
                    .get_profile(&edge.followed_id)
                    .await?
                    .map(|followed| FeedFollow {
                        created_at: edge.created_at,
                        followed,
                    }),
                None => None,
            },
            None => None,
        };

        Ok(FeedEntry {
            activity_type: group.activity_type,
            created_at: group.created_at,
            post,
            follow,
        })
    }
}

#[async_trait]
impl ConnectionSource<FeedEntry> for FeedSource<'_> {
    async fn fetch_page(
        &self,
        bound: Option<&SortKey>,
        direction: Direction,
        limit: Option<u32>,
    ) -> AppResult<Vec<(SortKey, FeedEntry)>> {
        let groups = self
            .store
            .fetch_activity_groups(&self.profile_id, bound, direction, limit)
            .await?;

        let mut entries = Vec::with_capacity(groups.len());
        for (key, group) in groups {
            entries.push((key, self.render(group).await?));
        }
        Ok(entries)
    }

    async fn total_count(&self) -> AppResult<i64> {
        self.store.count_activity_groups(&self.profile_id).await
    }
}
