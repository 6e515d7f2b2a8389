// PostgreSQL implementation of the storage interface.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow, Postgres};
use sqlx::{QueryBuilder, Row};
use uuid::Uuid;

use crate::core::{current_time_millis, Privacy};
use crate::error::{AppError, AppResult};
use crate::models::{Activity, ActivityGroup, Follow, Post, PostStar, Profile, Star, StarredPost};
use crate::pagination::{Direction, SortKey};
use crate::storage::{
    like_pattern, range_ops, FollowDirection, PostFilters, PostSort, PostUpdate, ProfileUpdate,
    Store,
};

const POST_COLUMNS: &str = "p.id, p.slug, p.title, p.avatar_url, p.summary, p.content, \
     p.privacy, p.language, p.profile_id, p.created_at, p.updated_at";

const PROFILE_COLUMNS: &str = "pr.id, pr.bio, pr.language, pr.created_at, pr.updated_at";

/// Connection configuration for the production store. Constructed
/// explicitly and passed in; the store handle owns the pool lifecycle.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl StoreConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        StoreConfig {
            database_url: database_url.into(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_secs: 30,
        }
    }
}

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        PostgresStore { pool }
    }

    pub async fn connect(config: &StoreConfig) -> AppResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.database_url)
            .await?;

        let store = PostgresStore { pool };
        store.initialize().await?;
        Ok(store)
    }

    /// Verify database connectivity.
    pub async fn health_check(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close the connection pool. Called once at graceful shutdown.
    pub async fn shutdown(&self) {
        self.pool.close().await;
    }

    pub async fn initialize(&self) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                id TEXT PRIMARY KEY,
                bio TEXT,
                language TEXT,
                created_at BIGINT NOT NULL,
                updated_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id TEXT PRIMARY KEY,
                slug TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                avatar_url TEXT,
                summary TEXT,
                content TEXT,
                privacy VARCHAR(16) NOT NULL,
                language TEXT,
                profile_id TEXT NOT NULL,
                created_at BIGINT NOT NULL,
                updated_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stars (
                profile_id TEXT NOT NULL,
                post_id TEXT NOT NULL,
                created_at BIGINT NOT NULL,
                PRIMARY KEY (profile_id, post_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS follows (
                id TEXT NOT NULL UNIQUE,
                follower_id TEXT NOT NULL,
                followed_id TEXT NOT NULL,
                created_at BIGINT NOT NULL,
                PRIMARY KEY (follower_id, followed_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS activities (
                id TEXT PRIMARY KEY,
                profile_id TEXT NOT NULL,
                activity_type VARCHAR(32) NOT NULL,
                post_id TEXT,
                follow_id TEXT,
                created_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS post_view_stats (
                post_id TEXT NOT NULL,
                day DATE NOT NULL,
                views BIGINT NOT NULL DEFAULT 0,
                PRIMARY KEY (post_id, day)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS profile_view_stats (
                profile_id TEXT NOT NULL,
                day DATE NOT NULL,
                views BIGINT NOT NULL DEFAULT 0,
                PRIMARY KEY (profile_id, day)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_profile ON posts(profile_id, created_at)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_stars_post ON stars(post_id, created_at)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_follows_followed ON follows(followed_id, created_at)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_activities_profile ON activities(profile_id, created_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn profile_from_row(row: &PgRow) -> Profile {
    Profile {
        id: row.get("id"),
        bio: row.get("bio"),
        language: row.get("language"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn post_from_row(row: &PgRow) -> AppResult<Post> {
    let privacy: String = row.get("privacy");
    let privacy = privacy
        .parse::<Privacy>()
        .map_err(|e| AppError::SourceUnavailable(anyhow::anyhow!(e)))?;

    let content: Option<String> = row.get("content");
    let content = content
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| AppError::SourceUnavailable(anyhow::anyhow!("invalid content document: {}", e)))?;

    Ok(Post {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        avatar_url: row.get("avatar_url"),
        summary: row.get("summary"),
        content,
        privacy,
        language: row.get("language"),
        profile_id: row.get("profile_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn activity_group_from_row(row: &PgRow) -> AppResult<ActivityGroup> {
    let activity_type: String = row.get("activity_type");
    let activity_type = activity_type
        .parse()
        .map_err(|e: String| AppError::SourceUnavailable(anyhow::anyhow!(e)))?;

    Ok(ActivityGroup {
        row_id: row.get("row_id"),
        activity_type,
        post_id: row.get("post_id"),
        follow_id: row.get("follow_id"),
        created_at: row.get("created_at"),
    })
}

fn post_primary_expr(sort: PostSort) -> &'static str {
    match sort {
        PostSort::MostRecent => "p.created_at",
        PostSort::MostStarred => "(SELECT COUNT(*) FROM stars s WHERE s.post_id = p.id)",
    }
}

fn push_post_filters(qb: &mut QueryBuilder<'_, Postgres>, filters: &PostFilters) {
    if let Some(profile_id) = &filters.profile_id {
        qb.push(" AND p.profile_id = ");
        qb.push_bind(profile_id.clone());
    }
    if let Some(privacy) = filters.privacy {
        qb.push(" AND p.privacy = ");
        qb.push_bind(privacy.as_str());
    }
    if let Some(language) = &filters.language {
        qb.push(" AND p.language = ");
        qb.push_bind(language.clone());
    }
    if let Some(query) = &filters.query {
        let pattern = like_pattern(query);
        qb.push(" AND (p.title ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" ESCAPE '\\' OR p.summary ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" ESCAPE '\\' OR p.content ILIKE ");
        qb.push_bind(pattern);
        qb.push(" ESCAPE '\\')");
    }
    if let Some(from) = filters.from {
        qb.push(" AND p.created_at >= ");
        qb.push_bind(from);
    }
    if let Some(to) = filters.to {
        qb.push(" AND p.created_at <= ");
        qb.push_bind(to);
    }
}

fn push_range_bound(
    qb: &mut QueryBuilder<'_, Postgres>,
    primary_expr: &str,
    id_column: &str,
    bound: &SortKey,
    cmp: &str,
) {
    qb.push(" AND (");
    qb.push(primary_expr);
    qb.push(format!(" {} ", cmp));
    qb.push_bind(bound.primary);
    qb.push(" OR (");
    qb.push(primary_expr);
    qb.push(" = ");
    qb.push_bind(bound.primary);
    qb.push(format!(" AND {} {} ", id_column, cmp));
    qb.push_bind(bound.id.clone());
    qb.push("))");
}

fn push_limit(qb: &mut QueryBuilder<'_, Postgres>, limit: Option<u32>) {
    if let Some(limit) = limit {
        qb.push(" LIMIT ");
        qb.push_bind(limit as i64);
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn create_profile(&self, id: &str) -> AppResult<Profile> {
        let now = current_time_millis();
        let result = sqlx::query(
            "INSERT INTO profiles (id, bio, language, created_at, updated_at) VALUES ($1, NULL, NULL, $2, $3)",
        )
        .bind(id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(Profile {
                id: id.to_string(),
                bio: None,
                language: None,
                created_at: now,
                updated_at: now,
            }),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(
                AppError::InvalidInput(format!("profile {} already exists", id)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_profile(&self, id: &str, values: &ProfileUpdate) -> AppResult<Profile> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE profiles SET updated_at = ");
        qb.push_bind(current_time_millis());
        if let Some(bio) = &values.bio {
            qb.push(", bio = ");
            qb.push_bind(bio.clone());
        }
        if let Some(language) = &values.language {
            qb.push(", language = ");
            qb.push_bind(language.clone());
        }
        qb.push(" WHERE id = ");
        qb.push_bind(id.to_string());

        let result = qb.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Profile {} not found", id)));
        }

        self.get_profile(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Profile {} not found", id)))
    }

    async fn delete_profile(&self, id: &str) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM stars WHERE profile_id = $1 OR post_id IN (SELECT id FROM posts WHERE profile_id = $1)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "DELETE FROM post_view_stats WHERE post_id IN (SELECT id FROM posts WHERE profile_id = $1)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM posts WHERE profile_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM follows WHERE follower_id = $1 OR followed_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM activities WHERE profile_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM profile_view_stats WHERE profile_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM profiles WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(AppError::NotFound(format!("Profile {} not found", id)));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_profile(&self, id: &str) -> AppResult<Option<Profile>> {
        let row = sqlx::query(
            "SELECT id, bio, language, created_at, updated_at FROM profiles WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| profile_from_row(&row)))
    }

    async fn list_profiles(&self) -> AppResult<Vec<Profile>> {
        let rows = sqlx::query(
            "SELECT id, bio, language, created_at, updated_at FROM profiles ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(profile_from_row).collect())
    }

    async fn create_post(&self, post: &Post) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO posts (id, slug, title, avatar_url, summary, content, privacy, language, profile_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&post.id)
        .bind(&post.slug)
        .bind(&post.title)
        .bind(&post.avatar_url)
        .bind(&post.summary)
        .bind(post.content.as_ref().map(|value| value.to_string()))
        .bind(post.privacy.as_str())
        .bind(&post.language)
        .bind(&post.profile_id)
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_post(&self, id: &str, values: &PostUpdate) -> AppResult<Post> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE posts SET updated_at = ");
        qb.push_bind(current_time_millis());
        if let Some(title) = &values.title {
            qb.push(", title = ");
            qb.push_bind(title.clone());
        }
        if let Some(avatar_url) = &values.avatar_url {
            qb.push(", avatar_url = ");
            qb.push_bind(avatar_url.clone());
        }
        if let Some(summary) = &values.summary {
            qb.push(", summary = ");
            qb.push_bind(summary.clone());
        }
        if let Some(content) = &values.content {
            qb.push(", content = ");
            qb.push_bind(content.to_string());
        }
        if let Some(privacy) = values.privacy {
            qb.push(", privacy = ");
            qb.push_bind(privacy.as_str());
        }
        if let Some(language) = &values.language {
            qb.push(", language = ");
            qb.push_bind(language.clone());
        }
        qb.push(" WHERE id = ");
        qb.push_bind(id.to_string());

        let result = qb.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Post {} not found", id)));
        }

        self.get_post(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Post {} not found", id)))
    }

    async fn delete_post(&self, id: &str) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM stars WHERE post_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM post_view_stats WHERE post_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(AppError::NotFound(format!("Post {} not found", id)));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_post(&self, id: &str) -> AppResult<Option<Post>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM posts p WHERE p.id = $1",
            POST_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| post_from_row(&row)).transpose()
    }

    async fn get_post_by_slug(&self, slug: &str) -> AppResult<Option<Post>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM posts p WHERE p.slug = $1",
            POST_COLUMNS
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| post_from_row(&row)).transpose()
    }

    async fn slug_exists(&self, slug: &str) -> AppResult<bool> {
        let row = sqlx::query("SELECT 1 FROM posts WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn fetch_posts(
        &self,
        filters: &PostFilters,
        bound: Option<&SortKey>,
        direction: Direction,
        limit: Option<u32>,
    ) -> AppResult<Vec<(SortKey, Post)>> {
        let (cmp, ord) = range_ops(direction);
        let primary = post_primary_expr(filters.sort);

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {}, {} AS sort_primary FROM posts p WHERE 1 = 1",
            POST_COLUMNS, primary
        ));
        push_post_filters(&mut qb, filters);
        if let Some(bound) = bound {
            push_range_bound(&mut qb, primary, "p.id", bound, cmp);
        }
        qb.push(format!(" ORDER BY {} {}, p.id {}", primary, ord, ord));
        push_limit(&mut qb, limit);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                let post = post_from_row(row)?;
                let key = SortKey::new(row.get("sort_primary"), post.id.clone());
                Ok((key, post))
            })
            .collect()
    }

    async fn count_posts(&self, filters: &PostFilters) -> AppResult<i64> {
        let mut qb =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) AS count FROM posts p WHERE 1 = 1");
        push_post_filters(&mut qb, filters);

        let row = qb.build().fetch_one(&self.pool).await?;
        Ok(row.get("count"))
    }

    async fn get_public_posts_by_ids(
        &self,
        ids: &[String],
        profile_id: Option<&str>,
        language: Option<&str>,
    ) -> AppResult<Vec<Post>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM posts p WHERE p.privacy = 'PUBLIC' AND p.id IN (",
            POST_COLUMNS
        ));
        let mut separated = qb.separated(",");
        for id in ids {
            separated.push_bind(id.clone());
        }
        qb.push(")");
        if let Some(profile_id) = profile_id {
            qb.push(" AND p.profile_id = ");
            qb.push_bind(profile_id.to_string());
        }
        if let Some(language) = language {
            qb.push(" AND p.language = ");
            qb.push_bind(language.to_string());
        }
        qb.push(" ORDER BY p.created_at DESC, p.id DESC");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(post_from_row).collect()
    }

    async fn create_star(&self, profile_id: &str, post_id: &str) -> AppResult<Star> {
        let now = current_time_millis();
        let result =
            sqlx::query("INSERT INTO stars (profile_id, post_id, created_at) VALUES ($1, $2, $3)")
                .bind(profile_id)
                .bind(post_id)
                .bind(now)
                .execute(&self.pool)
                .await;

        match result {
            Ok(_) => Ok(Star {
                profile_id: profile_id.to_string(),
                post_id: post_id.to_string(),
                created_at: now,
            }),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(AppError::AlreadyStarred(post_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_star(&self, profile_id: &str, post_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM stars WHERE profile_id = $1 AND post_id = $2")
            .bind(profile_id)
            .bind(post_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn star_exists(&self, profile_id: &str, post_id: &str) -> AppResult<bool> {
        let row = sqlx::query("SELECT 1 FROM stars WHERE profile_id = $1 AND post_id = $2")
            .bind(profile_id)
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn fetch_post_stars(
        &self,
        post_id: &str,
        bound: Option<&SortKey>,
        direction: Direction,
        limit: Option<u32>,
    ) -> AppResult<Vec<(SortKey, PostStar)>> {
        let (cmp, ord) = range_ops(direction);

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT s.created_at AS starred_at, {} FROM stars s JOIN profiles pr ON pr.id = s.profile_id WHERE s.post_id = ",
            PROFILE_COLUMNS
        ));
        qb.push_bind(post_id.to_string());
        if let Some(bound) = bound {
            push_range_bound(&mut qb, "s.created_at", "pr.id", bound, cmp);
        }
        qb.push(format!(" ORDER BY s.created_at {}, pr.id {}", ord, ord));
        push_limit(&mut qb, limit);

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| {
                let profile = profile_from_row(row);
                let starred_at: i64 = row.get("starred_at");
                let key = SortKey::new(starred_at, profile.id.clone());
                (
                    key,
                    PostStar {
                        profile,
                        created_at: starred_at,
                    },
                )
            })
            .collect())
    }

    async fn count_post_stars(&self, post_id: &str) -> AppResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM stars WHERE post_id = $1")
            .bind(post_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("count"))
    }

    async fn fetch_starred_posts(
        &self,
        profile_id: &str,
        privacy: Option<Privacy>,
        bound: Option<&SortKey>,
        direction: Direction,
        limit: Option<u32>,
    ) -> AppResult<Vec<(SortKey, StarredPost)>> {
        let (cmp, ord) = range_ops(direction);

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT s.created_at AS starred_at, {} FROM stars s JOIN posts p ON p.id = s.post_id WHERE s.profile_id = ",
            POST_COLUMNS
        ));
        qb.push_bind(profile_id.to_string());
        if let Some(privacy) = privacy {
            qb.push(" AND p.privacy = ");
            qb.push_bind(privacy.as_str());
        }
        if let Some(bound) = bound {
            push_range_bound(&mut qb, "s.created_at", "p.id", bound, cmp);
        }
        qb.push(format!(" ORDER BY s.created_at {}, p.id {}", ord, ord));
        push_limit(&mut qb, limit);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                let post = post_from_row(row)?;
                let starred_at: i64 = row.get("starred_at");
                let key = SortKey::new(starred_at, post.id.clone());
                Ok((
                    key,
                    StarredPost {
                        post,
                        created_at: starred_at,
                    },
                ))
            })
            .collect()
    }

    async fn count_starred_posts(
        &self,
        profile_id: &str,
        privacy: Option<Privacy>,
    ) -> AppResult<i64> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) AS count FROM stars s JOIN posts p ON p.id = s.post_id WHERE s.profile_id = ",
        );
        qb.push_bind(profile_id.to_string());
        if let Some(privacy) = privacy {
            qb.push(" AND p.privacy = ");
            qb.push_bind(privacy.as_str());
        }

        let row = qb.build().fetch_one(&self.pool).await?;
        Ok(row.get("count"))
    }

    async fn create_follow(&self, follower_id: &str, followed_id: &str) -> AppResult<Follow> {
        let id = Uuid::new_v4().to_string();
        let now = current_time_millis();
        let result = sqlx::query(
            "INSERT INTO follows (id, follower_id, followed_id, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(&id)
        .bind(follower_id)
        .bind(followed_id)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(Follow {
                id,
                follower_id: follower_id.to_string(),
                followed_id: followed_id.to_string(),
                created_at: now,
            }),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(AppError::AlreadyFollowed(followed_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_follow(&self, follower_id: &str, followed_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND followed_id = $2")
            .bind(follower_id)
            .bind(followed_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn follow_exists(&self, follower_id: &str, followed_id: &str) -> AppResult<bool> {
        let row = sqlx::query("SELECT 1 FROM follows WHERE follower_id = $1 AND followed_id = $2")
            .bind(follower_id)
            .bind(followed_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn get_follow(&self, id: &str) -> AppResult<Option<Follow>> {
        let row = sqlx::query(
            "SELECT id, follower_id, followed_id, created_at FROM follows WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Follow {
            id: row.get("id"),
            follower_id: row.get("follower_id"),
            followed_id: row.get("followed_id"),
            created_at: row.get("created_at"),
        }))
    }

    async fn fetch_follow_edges(
        &self,
        profile_id: &str,
        which: FollowDirection,
        bound: Option<&SortKey>,
        direction: Direction,
        limit: Option<u32>,
    ) -> AppResult<Vec<(SortKey, Profile)>> {
        let (cmp, ord) = range_ops(direction);
        let (subject_column, other_column) = match which {
            FollowDirection::Followers => ("followed_id", "follower_id"),
            FollowDirection::Following => ("follower_id", "followed_id"),
        };

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT f.created_at AS followed_at, {} FROM follows f JOIN profiles pr ON pr.id = f.{} WHERE f.{} = ",
            PROFILE_COLUMNS, other_column, subject_column
        ));
        qb.push_bind(profile_id.to_string());
        if let Some(bound) = bound {
            push_range_bound(&mut qb, "f.created_at", "pr.id", bound, cmp);
        }
        qb.push(format!(" ORDER BY f.created_at {}, pr.id {}", ord, ord));
        push_limit(&mut qb, limit);

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| {
                let profile = profile_from_row(row);
                let followed_at: i64 = row.get("followed_at");
                (SortKey::new(followed_at, profile.id.clone()), profile)
            })
            .collect())
    }

    async fn count_follow_edges(
        &self,
        profile_id: &str,
        which: FollowDirection,
    ) -> AppResult<i64> {
        let subject_column = match which {
            FollowDirection::Followers => "followed_id",
            FollowDirection::Following => "follower_id",
        };

        let row = sqlx::query(&format!(
            "SELECT COUNT(*) AS count FROM follows WHERE {} = $1",
            subject_column
        ))
        .bind(profile_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("count"))
    }

    async fn append_activity(&self, activity: &Activity) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO activities (id, profile_id, activity_type, post_id, follow_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&activity.id)
        .bind(&activity.profile_id)
        .bind(activity.activity_type.as_str())
        .bind(&activity.post_id)
        .bind(&activity.follow_id)
        .bind(activity.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_activity_groups(
        &self,
        profile_id: &str,
        bound: Option<&SortKey>,
        direction: Direction,
        limit: Option<u32>,
    ) -> AppResult<Vec<(SortKey, ActivityGroup)>> {
        let (cmp, ord) = range_ops(direction);

        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT a.activity_type, a.post_id, a.follow_id, MAX(a.created_at) AS created_at, \
             MIN(a.id) AS row_id FROM activities a WHERE a.profile_id = ",
        );
        qb.push_bind(profile_id.to_string());
        qb.push(" GROUP BY a.activity_type, a.post_id, a.follow_id");
        if let Some(bound) = bound {
            qb.push(format!(" HAVING MAX(a.created_at) {} ", cmp));
            qb.push_bind(bound.primary);
            qb.push(" OR (MAX(a.created_at) = ");
            qb.push_bind(bound.primary);
            qb.push(format!(" AND MIN(a.id) {} ", cmp));
            qb.push_bind(bound.id.clone());
            qb.push(")");
        }
        qb.push(format!(
            " ORDER BY MAX(a.created_at) {}, MIN(a.id) {}",
            ord, ord
        ));
        push_limit(&mut qb, limit);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                let group = activity_group_from_row(row)?;
                let key = SortKey::new(group.created_at, group.row_id.clone());
                Ok((key, group))
            })
            .collect()
    }

    async fn count_activity_groups(&self, profile_id: &str) -> AppResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM (SELECT 1 AS one FROM activities WHERE profile_id = $1 \
             GROUP BY activity_type, post_id, follow_id) AS grouped",
        )
        .bind(profile_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("count"))
    }

    async fn record_post_view(&self, post_id: &str, day: NaiveDate) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO post_view_stats (post_id, day, views) VALUES ($1, $2, 1) \
             ON CONFLICT (post_id, day) DO UPDATE SET views = post_view_stats.views + 1",
        )
        .bind(post_id)
        .bind(day)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_profile_view(&self, profile_id: &str, day: NaiveDate) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO profile_view_stats (profile_id, day, views) VALUES ($1, $2, 1) \
             ON CONFLICT (profile_id, day) DO UPDATE SET views = profile_view_stats.views + 1",
        )
        .bind(profile_id)
        .bind(day)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn sum_post_views(&self, post_id: &str) -> AppResult<i64> {
        let row = sqlx::query(
            "SELECT CAST(COALESCE(SUM(views), 0) AS BIGINT) AS total FROM post_view_stats WHERE post_id = $1",
        )
        .bind(post_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("total"))
    }

    async fn sum_profile_views(&self, profile_id: &str) -> AppResult<i64> {
        let row = sqlx::query(
            "SELECT CAST(COALESCE(SUM(views), 0) AS BIGINT) AS total FROM profile_view_stats WHERE profile_id = $1",
        )
        .bind(profile_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("total"))
    }

    async fn post_view_sums_since(&self, since: NaiveDate) -> AppResult<Vec<(String, i64)>> {
        let rows = sqlx::query(
            "SELECT post_id, CAST(SUM(views) AS BIGINT) AS total FROM post_view_stats WHERE day >= $1 \
             GROUP BY post_id ORDER BY total DESC, post_id ASC",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| (row.get("post_id"), row.get("total")))
            .collect())
    }
}
