// Activity feed de-duplication, pagination invariants and trending
// rank preservation against the in-memory SQLite store.

use std::sync::Arc;

use quill::core::{current_time_millis, day_bucket, Privacy, ViewerContext};
use quill::models::ActivityType;
use quill::pagination::ConnectionArgs;
use quill::services::{PostInput, PostListFilters, PostService, PostUpdateInput, ProfileService};
use quill::storage::{SqliteStore, Store};
use quill::trending::TrendingFilters;

async fn services() -> (Arc<dyn Store>, ProfileService, PostService) {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().await.unwrap());
    (
        store.clone(),
        ProfileService::new(store.clone()),
        PostService::new(store),
    )
}

fn titled(title: &str) -> PostInput {
    PostInput {
        title: title.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn feed_collapses_toggle_churn() {
    let (_store, profiles, posts) = services().await;
    let alice = ViewerContext::authenticated("alice");
    let bob = ViewerContext::authenticated("bob");
    profiles.create(&alice).await.unwrap();
    profiles.create(&bob).await.unwrap();
    let post = posts.create(&alice, titled("Intro")).await.unwrap();

    // star -> unstar -> star: three star_star/star_unstar rows, but
    // only one logical entry per (type, post) combination.
    posts.star(&bob, &post.id).await.unwrap();
    posts.unstar(&bob, &post.id).await.unwrap();
    posts.star(&bob, &post.id).await.unwrap();

    let feed = profiles
        .activity(&bob, "bob", &ConnectionArgs::default())
        .await
        .unwrap();

    // profile_create + star_star + star_unstar, from five raw rows.
    assert_eq!(feed.total_count, 3);
    let star_entries: Vec<_> = feed
        .edges
        .iter()
        .filter(|edge| {
            edge.node.activity_type == ActivityType::StarStar
                && edge.node.post.as_ref().map(|p| p.id.as_str()) == Some(post.id.as_str())
        })
        .collect();
    assert_eq!(star_entries.len(), 1);
}

#[tokio::test]
async fn feed_merges_post_star_and_follow_events() {
    let (_store, profiles, posts) = services().await;
    let alice = ViewerContext::authenticated("alice");
    let bob = ViewerContext::authenticated("bob");
    profiles.create(&alice).await.unwrap();
    profiles.create(&bob).await.unwrap();

    let post = posts.create(&alice, titled("Intro")).await.unwrap();
    posts.star(&alice, &post.id).await.unwrap();
    profiles.follow(&alice, "bob").await.unwrap();

    let feed = profiles
        .activity(&alice, "alice", &ConnectionArgs::default())
        .await
        .unwrap();

    // profile_create + blog_create + star_star + follow_follow.
    assert_eq!(feed.total_count, 4);

    let follow_entry = feed
        .edges
        .iter()
        .find(|edge| edge.node.activity_type == ActivityType::FollowFollow)
        .unwrap();
    let follow = follow_entry.node.follow.as_ref().unwrap();
    assert_eq!(follow.followed.id, "bob");

    let create_entry = feed
        .edges
        .iter()
        .find(|edge| edge.node.activity_type == ActivityType::BlogCreate)
        .unwrap();
    assert_eq!(
        create_entry.node.post.as_ref().map(|p| p.id.as_str()),
        Some(post.id.as_str())
    );

    // Entries arrive newest first.
    let stamps: Vec<i64> = feed.edges.iter().map(|edge| edge.node.created_at).collect();
    let mut sorted = stamps.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(stamps, sorted);
}

#[tokio::test]
async fn feed_hides_post_payload_from_unauthorized_viewers() {
    let (_store, profiles, posts) = services().await;
    let alice = ViewerContext::authenticated("alice");
    let anonymous = ViewerContext::anonymous();
    profiles.create(&alice).await.unwrap();
    let post = posts.create(&alice, titled("Intro")).await.unwrap();

    posts
        .update(
            &alice,
            &post.id,
            PostUpdateInput {
                privacy: Some(Privacy::Private),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // The creation entry still appears, but the post payload is
    // withheld from viewers who may not see the post.
    let feed = profiles
        .activity(&anonymous, "alice", &ConnectionArgs::default())
        .await
        .unwrap();
    let entry = feed
        .edges
        .iter()
        .find(|edge| edge.node.activity_type == ActivityType::BlogCreate)
        .unwrap();
    assert!(entry.node.post.is_none());

    let feed = profiles
        .activity(&alice, "alice", &ConnectionArgs::default())
        .await
        .unwrap();
    let entry = feed
        .edges
        .iter()
        .find(|edge| edge.node.activity_type == ActivityType::BlogCreate)
        .unwrap();
    assert!(entry.node.post.is_some());
}

#[tokio::test]
async fn feed_paginates_with_cursors() {
    let (_store, profiles, posts) = services().await;
    let alice = ViewerContext::authenticated("alice");
    profiles.create(&alice).await.unwrap();
    for i in 0..5 {
        posts
            .create(&alice, titled(&format!("Post {}", i)))
            .await
            .unwrap();
    }

    // profile_create + five blog_create entries.
    let first_page = profiles
        .activity(
            &alice,
            "alice",
            &ConnectionArgs {
                first: Some(4),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(first_page.edges.len(), 4);
    assert_eq!(first_page.total_count, 6);
    assert!(first_page.page_info.has_next_page);

    let second_page = profiles
        .activity(
            &alice,
            "alice",
            &ConnectionArgs {
                first: Some(4),
                after: first_page.page_info.end_cursor.clone(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(second_page.edges.len(), 2);
    assert!(!second_page.page_info.has_next_page);
    assert!(second_page.page_info.has_previous_page);
    assert_eq!(second_page.total_count, 6);
}

#[tokio::test]
async fn total_count_is_invariant_to_the_window() {
    let (_store, profiles, posts) = services().await;
    let alice = ViewerContext::authenticated("alice");
    let anonymous = ViewerContext::anonymous();
    profiles.create(&alice).await.unwrap();
    for i in 0..7 {
        posts
            .create(&alice, titled(&format!("Post {}", i)))
            .await
            .unwrap();
    }

    let mut totals = Vec::new();
    for args in [
        ConnectionArgs::default(),
        ConnectionArgs {
            first: Some(1),
            ..Default::default()
        },
        ConnectionArgs {
            first: Some(100),
            ..Default::default()
        },
        ConnectionArgs {
            last: Some(3),
            ..Default::default()
        },
    ] {
        let listing = posts
            .find_all(&anonymous, &args, PostListFilters::default())
            .await
            .unwrap();
        totals.push(listing.total_count);
    }
    assert_eq!(totals, vec![7, 7, 7, 7]);
}

#[tokio::test]
async fn page_size_invariant_holds() {
    let (_store, profiles, posts) = services().await;
    let alice = ViewerContext::authenticated("alice");
    let anonymous = ViewerContext::anonymous();
    profiles.create(&alice).await.unwrap();
    for i in 0..4 {
        posts
            .create(&alice, titled(&format!("Post {}", i)))
            .await
            .unwrap();
    }

    for first in [0, 1, 3, 4, 9] {
        let listing = posts
            .find_all(
                &anonymous,
                &ConnectionArgs {
                    first: Some(first),
                    ..Default::default()
                },
                PostListFilters::default(),
            )
            .await
            .unwrap();
        assert!(listing.edges.len() <= first as usize);
        if listing.edges.len() < first as usize {
            assert!(!listing.page_info.has_next_page);
        }
    }
}

#[tokio::test]
async fn trending_preserves_rank_order() {
    let (store, profiles, posts) = services().await;
    let alice = ViewerContext::authenticated("alice");
    profiles.create(&alice).await.unwrap();

    // Created oldest-to-newest as p1, p2, p3; each starts at one view.
    let p1 = posts.create(&alice, titled("First")).await.unwrap();
    let p2 = posts.create(&alice, titled("Second")).await.unwrap();
    let p3 = posts.create(&alice, titled("Third")).await.unwrap();

    // Pile views onto p3 and p1 so the rank order diverges from the
    // creation order: p3 (6), p1 (3), p2 (1).
    let today = day_bucket(current_time_millis());
    for _ in 0..5 {
        store.record_post_view(&p3.id, today).await.unwrap();
    }
    for _ in 0..2 {
        store.record_post_view(&p1.id, today).await.unwrap();
    }

    let trending = posts
        .find_trending(&ConnectionArgs::default(), TrendingFilters::default())
        .await
        .unwrap();
    let order: Vec<&str> = trending
        .edges
        .iter()
        .map(|edge| edge.node.id.as_str())
        .collect();
    assert_eq!(order, vec![p3.id.as_str(), p1.id.as_str(), p2.id.as_str()]);

    // Rank order survives pagination.
    let first_page = posts
        .find_trending(
            &ConnectionArgs {
                first: Some(2),
                ..Default::default()
            },
            TrendingFilters::default(),
        )
        .await
        .unwrap();
    assert_eq!(first_page.edges.len(), 2);
    assert_eq!(first_page.edges[0].node.id, p3.id);
    assert_eq!(first_page.edges[1].node.id, p1.id);
    assert!(first_page.page_info.has_next_page);

    let second_page = posts
        .find_trending(
            &ConnectionArgs {
                first: Some(2),
                after: first_page.page_info.end_cursor.clone(),
                ..Default::default()
            },
            TrendingFilters::default(),
        )
        .await
        .unwrap();
    assert_eq!(second_page.edges.len(), 1);
    assert_eq!(second_page.edges[0].node.id, p2.id);
    assert!(!second_page.page_info.has_next_page);

    // A rank-listed id that is no longer fetchable drops out: flip p3
    // private and the ranking re-sequences without it.
    posts
        .update(
            &alice,
            &p3.id,
            PostUpdateInput {
                privacy: Some(Privacy::Private),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let trending = posts
        .find_trending(&ConnectionArgs::default(), TrendingFilters::default())
        .await
        .unwrap();
    let order: Vec<&str> = trending
        .edges
        .iter()
        .map(|edge| edge.node.id.as_str())
        .collect();
    assert_eq!(order, vec![p1.id.as_str(), p2.id.as_str()]);
    assert_eq!(trending.total_count, 2);
}

#[tokio::test]
async fn most_starred_sort_orders_by_star_count() {
    let (_store, profiles, posts) = services().await;
    let alice = ViewerContext::authenticated("alice");
    let anonymous = ViewerContext::anonymous();
    profiles.create(&alice).await.unwrap();

    let p1 = posts.create(&alice, titled("First")).await.unwrap();
    let p2 = posts.create(&alice, titled("Second")).await.unwrap();

    for fan in ["bob", "carol"] {
        let ctx = ViewerContext::authenticated(fan);
        profiles.create(&ctx).await.unwrap();
        posts.star(&ctx, &p2.id).await.unwrap();
    }
    posts
        .star(&ViewerContext::authenticated("bob"), &p1.id)
        .await
        .unwrap();

    let listing = posts
        .find_all(
            &anonymous,
            &ConnectionArgs::default(),
            PostListFilters {
                sort: quill::storage::PostSort::MostStarred,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let order: Vec<&str> = listing
        .edges
        .iter()
        .map(|edge| edge.node.post.id.as_str())
        .collect();
    assert_eq!(order, vec![p2.id.as_str(), p1.id.as_str()]);
}
