// Entity models. Timestamps are milliseconds since Unix epoch
// throughout; view statistics bucket on UTC days.

pub mod document;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::core::{current_time_millis, Privacy};

/// A member profile. The id is the opaque caller identity resolved
/// upstream; one profile exists per identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub bio: Option<String>,
    pub language: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    /// Globally unique, derived from the title at creation and stable
    /// afterwards.
    pub slug: String,
    pub title: String,
    pub avatar_url: Option<String>,
    pub summary: Option<String>,
    /// Structured document blob; only scanned for text matches, never
    /// otherwise interpreted by the core.
    pub content: Option<serde_json::Value>,
    pub privacy: Privacy,
    pub language: Option<String>,
    /// Owning profile, immutable after creation.
    pub profile_id: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A star ("like") edge between a profile and a post, unique per pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Star {
    pub profile_id: String,
    pub post_id: String,
    pub created_at: i64,
}

/// A directed follow edge, unique per ordered pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Follow {
    pub id: String,
    pub follower_id: String,
    pub followed_id: String,
    pub created_at: i64,
}

/// Kind of an activity log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    ProfileCreate,
    BlogCreate,
    StarStar,
    StarUnstar,
    FollowFollow,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::ProfileCreate => "profile_create",
            ActivityType::BlogCreate => "blog_create",
            ActivityType::StarStar => "star_star",
            ActivityType::StarUnstar => "star_unstar",
            ActivityType::FollowFollow => "follow_follow",
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "profile_create" => Ok(ActivityType::ProfileCreate),
            "blog_create" => Ok(ActivityType::BlogCreate),
            "star_star" => Ok(ActivityType::StarStar),
            "star_unstar" => Ok(ActivityType::StarUnstar),
            "follow_follow" => Ok(ActivityType::FollowFollow),
            other => Err(format!("unknown activity type: {}", other)),
        }
    }
}

/// Append-only activity log entry. Never updated or deleted through
/// normal flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub profile_id: String,
    pub activity_type: ActivityType,
    pub post_id: Option<String>,
    pub follow_id: Option<String>,
    pub created_at: i64,
}

impl Activity {
    fn new(
        profile_id: &str,
        activity_type: ActivityType,
        post_id: Option<&str>,
        follow_id: Option<&str>,
    ) -> Self {
        Activity {
            id: Uuid::new_v4().to_string(),
            profile_id: profile_id.to_string(),
            activity_type,
            post_id: post_id.map(str::to_string),
            follow_id: follow_id.map(str::to_string),
            created_at: current_time_millis(),
        }
    }

    pub fn profile_create(profile_id: &str) -> Self {
        Self::new(profile_id, ActivityType::ProfileCreate, None, None)
    }

    pub fn blog_create(profile_id: &str, post_id: &str) -> Self {
        Self::new(profile_id, ActivityType::BlogCreate, Some(post_id), None)
    }

    pub fn star(profile_id: &str, post_id: &str) -> Self {
        Self::new(profile_id, ActivityType::StarStar, Some(post_id), None)
    }

    pub fn unstar(profile_id: &str, post_id: &str) -> Self {
        Self::new(profile_id, ActivityType::StarUnstar, Some(post_id), None)
    }

    pub fn follow(profile_id: &str, follow_id: &str) -> Self {
        Self::new(profile_id, ActivityType::FollowFollow, None, Some(follow_id))
    }
}

/// One logical feed entry: a distinct (type, post, follow) combination
/// with the timestamp of its latest occurrence and a stable
/// representative row id for cursor tie-breaks.
#[derive(Debug, Clone)]
pub struct ActivityGroup {
    pub row_id: String,
    pub activity_type: ActivityType,
    pub post_id: Option<String>,
    pub follow_id: Option<String>,
    pub created_at: i64,
}

/// A star on a post as listed from the post side.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostStar {
    pub profile: Profile,
    pub created_at: i64,
}

/// A starred post as listed from the profile side; the post has
/// already passed the viewer's visibility filter.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StarredPost {
    pub post: Post,
    pub created_at: i64,
}

/// A post row in a search listing, with the matching-span context
/// window when a text query located a match.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostHit {
    #[serde(flatten)]
    pub post: Post,
    pub matching_span: Option<String>,
}

/// The followed-profile reference embedded in a follow feed entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedFollow {
    pub created_at: i64,
    pub followed: Profile,
}

/// A rendered activity feed entry. The referenced post is embedded
/// only when the viewer may see it; the entry itself always survives.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEntry {
    pub activity_type: ActivityType,
    pub created_at: i64,
    pub post: Option<Post>,
    pub follow: Option<FeedFollow>,
}
