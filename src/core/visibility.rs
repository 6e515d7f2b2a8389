// Visibility filter - derives the effective privacy constraint for a
// relation query from the viewer, the resource owner and the requested
// filter. The same rule gates post listings, star listings (privacy of
// the starred post) and activity feed post references.

use crate::core::privacy::Privacy;
use crate::core::viewer::ViewerContext;
use crate::error::{AppError, AppResult};
use crate::models::Post;

/// Effective privacy constraint for a relation query.
///
/// Returns `Some(level)` to restrict the query to one privacy level,
/// or `None` for no constraint (all levels). Anonymous viewers asking
/// for non-public content fail with `Authentication`; identified
/// non-owners are silently restricted to public content instead, so a
/// stale filter never turns into an error for them.
pub fn effective_privacy(
    viewer: &ViewerContext,
    owner_id: Option<&str>,
    requested: Option<Privacy>,
) -> AppResult<Option<Privacy>> {
    let viewer_id = match viewer.viewer_id() {
        Some(id) => id,
        None => {
            if matches!(requested, Some(p) if p != Privacy::Public) {
                return Err(AppError::Authentication(
                    "you need to be logged in to view non-public posts".to_string(),
                ));
            }
            return Ok(Some(Privacy::Public));
        }
    };

    let is_owner = owner_id == Some(viewer_id);
    if !is_owner {
        return Ok(Some(Privacy::Public));
    }

    Ok(requested)
}

/// Whether a single post is visible to the viewer.
///
/// Non-owners see public posts only; existence of anything else is not
/// revealed. Used when rendering activity feed references and direct
/// finds.
pub fn can_view_post(viewer: &ViewerContext, post: &Post) -> bool {
    post.privacy == Privacy::Public || viewer.is_owner(&post.profile_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_defaults_to_public() {
        let viewer = ViewerContext::anonymous();
        let effective = effective_privacy(&viewer, Some("a"), None).unwrap();
        assert_eq!(effective, Some(Privacy::Public));
    }

    #[test]
    fn anonymous_requesting_private_fails() {
        let viewer = ViewerContext::anonymous();
        let err = effective_privacy(&viewer, Some("a"), Some(Privacy::Private)).unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));
    }

    #[test]
    fn anonymous_requesting_public_is_allowed() {
        let viewer = ViewerContext::anonymous();
        let effective = effective_privacy(&viewer, None, Some(Privacy::Public)).unwrap();
        assert_eq!(effective, Some(Privacy::Public));
    }

    #[test]
    fn non_owner_is_restricted_to_public() {
        let viewer = ViewerContext::authenticated("b");
        let effective = effective_privacy(&viewer, Some("a"), Some(Privacy::Private)).unwrap();
        assert_eq!(effective, Some(Privacy::Public));
    }

    #[test]
    fn owner_without_filter_sees_all_levels() {
        let viewer = ViewerContext::authenticated("a");
        let effective = effective_privacy(&viewer, Some("a"), None).unwrap();
        assert_eq!(effective, None);
    }

    #[test]
    fn owner_with_filter_keeps_the_filter() {
        let viewer = ViewerContext::authenticated("a");
        let effective = effective_privacy(&viewer, Some("a"), Some(Privacy::Friends)).unwrap();
        assert_eq!(effective, Some(Privacy::Friends));
    }

    #[test]
    fn listing_without_owner_is_public_only_for_identified_viewers() {
        let viewer = ViewerContext::authenticated("a");
        let effective = effective_privacy(&viewer, None, Some(Privacy::Private)).unwrap();
        assert_eq!(effective, Some(Privacy::Public));
    }
}
