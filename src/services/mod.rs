pub mod post_service;
pub mod profile_service;

pub use post_service::{PostInput, PostListFilters, PostService, PostUpdateInput};
pub use profile_service::{ProfileService, ProfileUpdateInput};
