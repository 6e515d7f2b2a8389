// End-to-end resolver flows against the in-memory SQLite store:
// profile and post lifecycle, visibility enforcement, slug uniqueness
// and toggle-state errors.

use std::sync::Arc;

use quill::core::{Privacy, ViewerContext};
use quill::error::AppError;
use quill::pagination::ConnectionArgs;
use quill::services::{PostInput, PostListFilters, PostService, PostUpdateInput, ProfileService};
use quill::storage::{SqliteStore, Store};

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
async fn file_backed_store_persists_across_handles() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("quill.db").display());

    {
        let store = SqliteStore::connect(&url).await.unwrap();
        store.create_profile("alice").await.unwrap();
    }

    let store = SqliteStore::connect(&url).await.unwrap();
    assert!(store.get_profile("alice").await.unwrap().is_some());
}

#[tokio::test]
async fn star_and_privacy_end_to_end() {
    let (_store, profiles, posts) = services().await;
    let alice = ViewerContext::authenticated("alice");
    let bob = ViewerContext::authenticated("bob");
    let anonymous = ViewerContext::anonymous();

    profiles.create(&alice).await.unwrap();
    let post = posts.create(&alice, titled("Intro")).await.unwrap();
    assert_eq!(post.privacy, Privacy::Public);

    profiles.create(&bob).await.unwrap();

    posts.star(&bob, &post.id).await.unwrap();
    let err = posts.star(&bob, &post.id).await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyStarred(id) if id == post.id));

    // Anonymous readers see the public post in alice's listing.
    let listing = posts
        .find_all(
            &anonymous,
            &ConnectionArgs::default(),
            PostListFilters {
                profile_id: Some("alice".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(listing.total_count, 1);
    assert_eq!(listing.edges[0].node.post.id, post.id);

    // Flip to private: direct find turns NotFound, the listing empties.
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

    let err = posts
        .find(&anonymous, Some(&post.id), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let listing = posts
        .find_all(
            &anonymous,
            &ConnectionArgs::default(),
            PostListFilters {
                profile_id: Some("alice".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(listing.total_count, 0);
    assert!(listing.edges.is_empty());

    // The owner still finds it.
    let found = posts.find(&alice, Some(&post.id), None).await.unwrap();
    assert_eq!(found.privacy, Privacy::Private);
}

#[tokio::test]
async fn slug_collisions_get_suffixed() {
    let (_store, profiles, posts) = services().await;
    let alice = ViewerContext::authenticated("alice");
    let bob = ViewerContext::authenticated("bob");
    profiles.create(&alice).await.unwrap();
    profiles.create(&bob).await.unwrap();

    let first = posts.create(&alice, titled("Hello World")).await.unwrap();
    let second = posts.create(&bob, titled("Hello World")).await.unwrap();
    let third = posts.create(&alice, titled("Hello, world!")).await.unwrap();

    assert_eq!(first.slug, "hello-world");
    assert_eq!(second.slug, "hello-world-1");
    assert_eq!(third.slug, "hello-world-2");

    let by_slug = posts
        .find(&alice, None, Some("hello-world-1"))
        .await
        .unwrap();
    assert_eq!(by_slug.id, second.id);
}

#[tokio::test]
async fn toggle_state_conflicts_are_domain_errors() {
    let (_store, profiles, posts) = services().await;
    let alice = ViewerContext::authenticated("alice");
    let bob = ViewerContext::authenticated("bob");
    profiles.create(&alice).await.unwrap();
    profiles.create(&bob).await.unwrap();
    let post = posts.create(&alice, titled("Intro")).await.unwrap();

    let err = posts.unstar(&bob, &post.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotStarred(id) if id == post.id));

    posts.star(&bob, &post.id).await.unwrap();
    posts.unstar(&bob, &post.id).await.unwrap();
    let err = posts.unstar(&bob, &post.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotStarred(_)));

    let err = profiles.unfollow(&bob, "alice").await.unwrap_err();
    assert!(matches!(err, AppError::NotFollowed(id) if id == "alice"));

    profiles.follow(&bob, "alice").await.unwrap();
    let err = profiles.follow(&bob, "alice").await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyFollowed(id) if id == "alice"));

    profiles.unfollow(&bob, "alice").await.unwrap();
    let err = profiles.unfollow(&bob, "alice").await.unwrap_err();
    assert!(matches!(err, AppError::NotFollowed(_)));
}

#[tokio::test]
async fn visibility_defaults_per_viewer() {
    let (_store, profiles, posts) = services().await;
    let alice = ViewerContext::authenticated("alice");
    let anonymous = ViewerContext::anonymous();
    profiles.create(&alice).await.unwrap();

    posts.create(&alice, titled("Open")).await.unwrap();
    posts
        .create(
            &alice,
            PostInput {
                title: "Hidden".to_string(),
                privacy: Some(Privacy::Private),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    posts
        .create(
            &alice,
            PostInput {
                title: "Circle".to_string(),
                privacy: Some(Privacy::Friends),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let by_alice = |profile_id: &str| PostListFilters {
        profile_id: Some(profile_id.to_string()),
        ..Default::default()
    };

    // No viewer, no filter: public only.
    let listing = posts
        .find_all(&anonymous, &ConnectionArgs::default(), by_alice("alice"))
        .await
        .unwrap();
    assert_eq!(listing.total_count, 1);
    assert_eq!(listing.edges[0].node.post.title, "Open");

    // Owner, no filter: everything.
    let listing = posts
        .find_all(&alice, &ConnectionArgs::default(), by_alice("alice"))
        .await
        .unwrap();
    assert_eq!(listing.total_count, 3);

    // Owner with an explicit filter keeps the filter.
    let listing = posts
        .find_all(
            &alice,
            &ConnectionArgs::default(),
            PostListFilters {
                profile_id: Some("alice".to_string()),
                privacy: Some(Privacy::Private),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(listing.total_count, 1);
    assert_eq!(listing.edges[0].node.post.title, "Hidden");

    // Anonymous asking for private content is an authentication error.
    let err = posts
        .find_all(
            &anonymous,
            &ConnectionArgs::default(),
            PostListFilters {
                privacy: Some(Privacy::Private),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Authentication(_)));
}

#[tokio::test]
async fn mutations_require_ownership() {
    let (_store, profiles, posts) = services().await;
    let alice = ViewerContext::authenticated("alice");
    let bob = ViewerContext::authenticated("bob");
    profiles.create(&alice).await.unwrap();
    profiles.create(&bob).await.unwrap();
    let post = posts.create(&alice, titled("Mine")).await.unwrap();

    let err = posts
        .update(
            &bob,
            &post.id,
            PostUpdateInput {
                title: Some("Stolen".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Ownership(_)));

    let err = posts.delete(&bob, &post.id).await.unwrap_err();
    assert!(matches!(err, AppError::Ownership(_)));

    assert!(posts.delete(&alice, &post.id).await.unwrap());
    let err = posts.find(&alice, Some(&post.id), None).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn find_requires_id_or_slug() {
    let (_store, _profiles, posts) = services().await;
    let anonymous = ViewerContext::anonymous();

    let err = posts.find(&anonymous, None, None).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
}

#[tokio::test]
async fn anonymous_mutations_are_rejected() {
    let (_store, profiles, posts) = services().await;
    let anonymous = ViewerContext::anonymous();

    let err = profiles.create(&anonymous).await.unwrap_err();
    assert!(matches!(err, AppError::Authentication(_)));

    let err = posts.create(&anonymous, titled("Nope")).await.unwrap_err();
    assert!(matches!(err, AppError::Authentication(_)));
}

#[tokio::test]
async fn duplicate_profile_creation_is_rejected() {
    let (_store, profiles, _posts) = services().await;
    let alice = ViewerContext::authenticated("alice");

    profiles.create(&alice).await.unwrap();
    let err = profiles.create(&alice).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
}

#[tokio::test]
async fn foreign_reads_register_views() {
    let (_store, profiles, posts) = services().await;
    let alice = ViewerContext::authenticated("alice");
    let bob = ViewerContext::authenticated("bob");
    profiles.create(&alice).await.unwrap();
    profiles.create(&bob).await.unwrap();

    // Profile views count foreign finds only.
    profiles.find(&bob, Some("alice")).await.unwrap();
    profiles.find(&alice, Some("alice")).await.unwrap();
    assert_eq!(profiles.views("alice").await.unwrap(), 1);

    // Posts are seeded with one view unit at creation.
    let post = posts.create(&alice, titled("Intro")).await.unwrap();
    assert_eq!(posts.views(&post.id).await.unwrap(), 1);

    posts.find(&bob, Some(&post.id), None).await.unwrap();
    posts.find(&alice, Some(&post.id), None).await.unwrap();
    assert_eq!(posts.views(&post.id).await.unwrap(), 2);
}

#[tokio::test]
async fn text_search_returns_matching_spans() {
    let (_store, profiles, posts) = services().await;
    let alice = ViewerContext::authenticated("alice");
    let anonymous = ViewerContext::anonymous();
    profiles.create(&alice).await.unwrap();

    posts
        .create(
            &alice,
            PostInput {
                title: "Cooking notes".to_string(),
                summary: Some("Weeknight pasta techniques".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    posts
        .create(
            &alice,
            PostInput {
                title: "Travel log".to_string(),
                content: Some(serde_json::json!({
                    "blocks": [{ "text": "The pasta in Bologna was unforgettable" }]
                })),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    posts.create(&alice, titled("Unrelated")).await.unwrap();

    let listing = posts
        .find_all(
            &anonymous,
            &ConnectionArgs::default(),
            PostListFilters {
                query: Some("pasta".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(listing.total_count, 2);
    for edge in &listing.edges {
        let span = edge.node.matching_span.as_deref().unwrap();
        assert!(span.to_lowercase().contains("pasta"));
    }
}

#[tokio::test]
async fn follower_listings_paginate() {
    let (_store, profiles, _posts) = services().await;
    let alice = ViewerContext::authenticated("alice");
    profiles.create(&alice).await.unwrap();

    for follower in ["bob", "carol", "dave"] {
        let ctx = ViewerContext::authenticated(follower);
        profiles.create(&ctx).await.unwrap();
        profiles.follow(&ctx, "alice").await.unwrap();
    }

    let first_page = profiles
        .followers(
            "alice",
            &ConnectionArgs {
                first: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(first_page.edges.len(), 2);
    assert_eq!(first_page.total_count, 3);
    assert!(first_page.page_info.has_next_page);

    let second_page = profiles
        .followers(
            "alice",
            &ConnectionArgs {
                first: Some(2),
                after: first_page.page_info.end_cursor.clone(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(second_page.edges.len(), 1);
    assert!(!second_page.page_info.has_next_page);
    assert_eq!(second_page.total_count, 3);

    // The two pages cover all three followers exactly once.
    let mut seen: Vec<String> = first_page
        .edges
        .iter()
        .chain(second_page.edges.iter())
        .map(|edge| edge.node.id.clone())
        .collect();
    seen.sort();
    assert_eq!(seen, vec!["bob", "carol", "dave"]);

    // Following runs the edge in the other direction.
    let following = profiles
        .following("bob", &ConnectionArgs::default())
        .await
        .unwrap();
    assert_eq!(following.total_count, 1);
    assert_eq!(following.edges[0].node.id, "alice");
}

#[tokio::test]
async fn starred_posts_respect_post_visibility() {
    let (_store, profiles, posts) = services().await;
    let alice = ViewerContext::authenticated("alice");
    let bob = ViewerContext::authenticated("bob");
    let anonymous = ViewerContext::anonymous();
    profiles.create(&alice).await.unwrap();
    profiles.create(&bob).await.unwrap();

    let open = posts.create(&alice, titled("Open")).await.unwrap();
    let hidden = posts
        .create(
            &alice,
            PostInput {
                title: "Hidden".to_string(),
                privacy: Some(Privacy::Private),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    posts.star(&bob, &open.id).await.unwrap();
    posts.star(&bob, &hidden.id).await.unwrap();

    // Anonymous viewers only see stars on public posts.
    let listing = profiles
        .starred_posts(&anonymous, "bob", &ConnectionArgs::default())
        .await
        .unwrap();
    assert_eq!(listing.total_count, 1);
    assert_eq!(listing.edges[0].node.post.id, open.id);

    // The listing owner sees all their stars.
    let listing = profiles
        .starred_posts(&bob, "bob", &ConnectionArgs::default())
        .await
        .unwrap();
    assert_eq!(listing.total_count, 2);

    // Who-starred runs from the post side.
    let stars = posts
        .stars(&open.id, &ConnectionArgs::default())
        .await
        .unwrap();
    assert_eq!(stars.total_count, 1);
    assert_eq!(stars.edges[0].node.profile.id, "bob");
}
