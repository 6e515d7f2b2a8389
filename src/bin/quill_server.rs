// Quill HTTP server - thin transport adapter over the resolver
// services. Caller identity arrives as the opaque x-forwarded-user
// header, resolved by the upstream auth layer.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Json,
    routing::{delete, get, patch, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use quill::app_state::AppState;
use quill::core::{Privacy, ViewerContext};
use quill::error::{AppError, AppResult};
use quill::models::{FeedEntry, Follow, Post, PostHit, PostStar, Profile, Star, StarredPost};
use quill::pagination::{Connection, ConnectionArgs};
use quill::services::{PostInput, PostListFilters, PostUpdateInput, ProfileUpdateInput};
use quill::storage::{PostSort, PostgresStore, SqliteStore, Store, StoreConfig};
use quill::trending::TrendingFilters;

fn viewer_from(headers: &HeaderMap) -> ViewerContext {
    headers
        .get("x-forwarded-user")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(ViewerContext::authenticated)
        .unwrap_or_else(ViewerContext::anonymous)
}

#[derive(Debug, Deserialize, Default)]
struct PageQuery {
    first: Option<i32>,
    after: Option<String>,
    last: Option<i32>,
    before: Option<String>,
}

impl PageQuery {
    fn into_args(self) -> ConnectionArgs {
        ConnectionArgs {
            first: self.first,
            after: self.after,
            last: self.last,
            before: self.before,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PostListQuery {
    first: Option<i32>,
    after: Option<String>,
    last: Option<i32>,
    before: Option<String>,
    profile_id: Option<String>,
    privacy: Option<Privacy>,
    language: Option<String>,
    query: Option<String>,
    from: Option<String>,
    to: Option<String>,
    sort: Option<String>,
}

fn parse_timestamp(value: Option<&str>, field: &str) -> AppResult<Option<i64>> {
    value
        .map(|raw| {
            chrono::DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.timestamp_millis())
                .map_err(|_| {
                    AppError::InvalidInput(format!("{} must be an RFC 3339 timestamp", field))
                })
        })
        .transpose()
}

fn parse_sort(value: Option<&str>) -> AppResult<PostSort> {
    match value {
        None | Some("recent") => Ok(PostSort::MostRecent),
        Some("starred") => Ok(PostSort::MostStarred),
        Some(other) => Err(AppError::InvalidInput(format!(
            "unknown sort mode: {}",
            other
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct TrendingQuery {
    first: Option<i32>,
    after: Option<String>,
    last: Option<i32>,
    before: Option<String>,
    profile_id: Option<String>,
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FindPostQuery {
    id: Option<String>,
    slug: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatePostRequest {
    title: String,
    avatar_url: Option<String>,
    summary: Option<String>,
    content: Option<serde_json::Value>,
    privacy: Option<Privacy>,
    language: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct UpdatePostRequest {
    title: Option<String>,
    avatar_url: Option<String>,
    summary: Option<String>,
    content: Option<serde_json::Value>,
    privacy: Option<Privacy>,
    language: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct UpdateProfileRequest {
    bio: Option<String>,
    language: Option<String>,
}

#[derive(Debug, serde::Serialize)]
struct ViewsResponse {
    views: i64,
}

// Profile handlers

async fn create_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Profile>> {
    let viewer = viewer_from(&headers);
    Ok(Json(state.profiles.create(&viewer).await?))
}

async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<UpdateProfileRequest>,
) -> AppResult<Json<Profile>> {
    let viewer = viewer_from(&headers);
    let values = ProfileUpdateInput {
        bio: request.bio,
        language: request.language,
    };
    Ok(Json(state.profiles.update(&viewer, values).await?))
}

async fn delete_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<bool>> {
    let viewer = viewer_from(&headers);
    Ok(Json(state.profiles.delete(&viewer).await?))
}

async fn find_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(profile_id): Path<String>,
) -> AppResult<Json<Profile>> {
    let viewer = viewer_from(&headers);
    Ok(Json(state.profiles.find(&viewer, Some(&profile_id)).await?))
}

async fn find_own_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Profile>> {
    let viewer = viewer_from(&headers);
    Ok(Json(state.profiles.find(&viewer, None).await?))
}

async fn list_profiles(State(state): State<AppState>) -> AppResult<Json<Vec<Profile>>> {
    Ok(Json(state.profiles.find_all().await?))
}

async fn follow_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(profile_id): Path<String>,
) -> AppResult<Json<Follow>> {
    let viewer = viewer_from(&headers);
    Ok(Json(state.profiles.follow(&viewer, &profile_id).await?))
}

async fn unfollow_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(profile_id): Path<String>,
) -> AppResult<Json<bool>> {
    let viewer = viewer_from(&headers);
    Ok(Json(state.profiles.unfollow(&viewer, &profile_id).await?))
}

async fn list_followers(
    State(state): State<AppState>,
    Path(profile_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> AppResult<Json<Connection<Profile>>> {
    Ok(Json(
        state
            .profiles
            .followers(&profile_id, &page.into_args())
            .await?,
    ))
}

async fn list_following(
    State(state): State<AppState>,
    Path(profile_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> AppResult<Json<Connection<Profile>>> {
    Ok(Json(
        state
            .profiles
            .following(&profile_id, &page.into_args())
            .await?,
    ))
}

async fn list_activity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(profile_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> AppResult<Json<Connection<FeedEntry>>> {
    let viewer = viewer_from(&headers);
    Ok(Json(
        state
            .profiles
            .activity(&viewer, &profile_id, &page.into_args())
            .await?,
    ))
}

async fn list_starred_posts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(profile_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> AppResult<Json<Connection<StarredPost>>> {
    let viewer = viewer_from(&headers);
    Ok(Json(
        state
            .profiles
            .starred_posts(&viewer, &profile_id, &page.into_args())
            .await?,
    ))
}

async fn profile_views(
    State(state): State<AppState>,
    Path(profile_id): Path<String>,
) -> AppResult<Json<ViewsResponse>> {
    let views = state.profiles.views(&profile_id).await?;
    Ok(Json(ViewsResponse { views }))
}

// Post handlers

async fn create_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreatePostRequest>,
) -> AppResult<Json<Post>> {
    let viewer = viewer_from(&headers);
    let values = PostInput {
        title: request.title,
        avatar_url: request.avatar_url,
        summary: request.summary,
        content: request.content,
        privacy: request.privacy,
        language: request.language,
    };
    Ok(Json(state.posts.create(&viewer, values).await?))
}

async fn update_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
    Json(request): Json<UpdatePostRequest>,
) -> AppResult<Json<Post>> {
    let viewer = viewer_from(&headers);
    let values = PostUpdateInput {
        title: request.title,
        avatar_url: request.avatar_url,
        summary: request.summary,
        content: request.content,
        privacy: request.privacy,
        language: request.language,
    };
    Ok(Json(state.posts.update(&viewer, &post_id, values).await?))
}

async fn delete_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
) -> AppResult<Json<bool>> {
    let viewer = viewer_from(&headers);
    Ok(Json(state.posts.delete(&viewer, &post_id).await?))
}

async fn find_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<FindPostQuery>,
) -> AppResult<Json<Post>> {
    let viewer = viewer_from(&headers);
    Ok(Json(
        state
            .posts
            .find(&viewer, query.id.as_deref(), query.slug.as_deref())
            .await?,
    ))
}

async fn find_post_by_id(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
) -> AppResult<Json<Post>> {
    let viewer = viewer_from(&headers);
    Ok(Json(state.posts.find(&viewer, Some(&post_id), None).await?))
}

async fn list_posts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PostListQuery>,
) -> AppResult<Json<Connection<PostHit>>> {
    let viewer = viewer_from(&headers);
    let args = ConnectionArgs {
        first: query.first,
        after: query.after,
        last: query.last,
        before: query.before,
    };
    let filters = PostListFilters {
        profile_id: query.profile_id,
        privacy: query.privacy,
        language: query.language,
        query: query.query,
        from: parse_timestamp(query.from.as_deref(), "from")?,
        to: parse_timestamp(query.to.as_deref(), "to")?,
        sort: parse_sort(query.sort.as_deref())?,
    };
    Ok(Json(state.posts.find_all(&viewer, &args, filters).await?))
}

async fn list_trending_posts(
    State(state): State<AppState>,
    Query(query): Query<TrendingQuery>,
) -> AppResult<Json<Connection<Post>>> {
    let args = ConnectionArgs {
        first: query.first,
        after: query.after,
        last: query.last,
        before: query.before,
    };
    let filters = TrendingFilters {
        profile_id: query.profile_id,
        language: query.language,
    };
    Ok(Json(state.posts.find_trending(&args, filters).await?))
}

async fn star_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
) -> AppResult<Json<Star>> {
    let viewer = viewer_from(&headers);
    Ok(Json(state.posts.star(&viewer, &post_id).await?))
}

async fn unstar_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
) -> AppResult<Json<bool>> {
    let viewer = viewer_from(&headers);
    Ok(Json(state.posts.unstar(&viewer, &post_id).await?))
}

async fn list_post_stars(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> AppResult<Json<Connection<PostStar>>> {
    Ok(Json(state.posts.stars(&post_id, &page.into_args()).await?))
}

async fn post_views(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> AppResult<Json<ViewsResponse>> {
    let views = state.posts.views(&post_id).await?;
    Ok(Json(ViewsResponse { views }))
}

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/profiles", get(list_profiles).post(create_profile))
        .route("/profiles/me", get(find_own_profile))
        .route("/profiles/me", patch(update_profile))
        .route("/profiles/me", delete(delete_profile))
        .route("/profiles/{id}", get(find_profile))
        .route("/profiles/{id}/follow", post(follow_profile))
        .route("/profiles/{id}/unfollow", post(unfollow_profile))
        .route("/profiles/{id}/followers", get(list_followers))
        .route("/profiles/{id}/following", get(list_following))
        .route("/profiles/{id}/activity", get(list_activity))
        .route("/profiles/{id}/starred", get(list_starred_posts))
        .route("/profiles/{id}/views", get(profile_views))
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/find", get(find_post))
        .route("/posts/trending", get(list_trending_posts))
        .route("/posts/{id}", get(find_post_by_id))
        .route("/posts/{id}", patch(update_post))
        .route("/posts/{id}", delete(delete_post))
        .route("/posts/{id}/star", post(star_post))
        .route("/posts/{id}/unstar", post(unstar_post))
        .route("/posts/{id}/stars", get(list_post_stars))
        .route("/posts/{id}/views", get(post_views))
        .layer(ServiceBuilder::new().layer(cors))
        .with_state(state)
}

async fn serve(state: AppState) -> anyhow::Result<()> {
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = TcpListener::bind(&bind_addr).await?;
    info!("Listening on {}", bind_addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match std::env::var("DATABASE_URL") {
        Ok(url) => {
            info!("Connecting to PostgreSQL store");
            let store = Arc::new(
                PostgresStore::connect(&StoreConfig::new(url))
                    .await
                    .map_err(|e| anyhow::anyhow!("failed to initialize store: {}", e))?,
            );
            serve(AppState::new(store.clone())).await?;
            store.shutdown().await;
        }
        Err(_) => {
            info!("DATABASE_URL not set; using in-memory SQLite store");
            let store: Arc<dyn Store> = Arc::new(
                SqliteStore::in_memory()
                    .await
                    .map_err(|e| anyhow::anyhow!("failed to initialize store: {}", e))?,
            );
            serve(AppState::new(store)).await?;
        }
    }

    info!("Server stopped");
    Ok(())
}
