// Slug derivation. Slugs are globally unique; collisions are resolved
// by suffixing an incrementing integer.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::AppResult;
use crate::storage::Store;

static NON_SLUG_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Derive the base slug from a title: lowercase, collapse every
/// non-alphanumeric run to a single `-`, trim the ends.
pub fn slugify(title: &str) -> String {
    let lowered = title.to_lowercase();
    let slug = NON_SLUG_CHARS
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string();

    if slug.is_empty() {
        "post".to_string()
    } else {
        slug
    }
}

/// Derive a slug for `title` that does not collide with any existing
/// post: the base slug if free, otherwise `-1`, `-2`, ... suffixes
/// until a free one is found.
pub async fn derive_unique_slug(store: &dyn Store, title: &str) -> AppResult<String> {
    let base = slugify(title);

    if !store.slug_exists(&base).await? {
        return Ok(base);
    }

    let mut suffix = 1u64;
    loop {
        let candidate = format!("{}-{}", base, suffix);
        if !store.slug_exists(&candidate).await? {
            return Ok(candidate);
        }
        suffix += 1;
    }
}
