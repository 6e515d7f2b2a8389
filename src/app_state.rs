// Application state shared with the transport layer. The store handle
// is constructed explicitly at process start and injected here; there
// is no process-wide singleton.

use std::sync::Arc;

use crate::services::{PostService, ProfileService};
use crate::storage::Store;

#[derive(Clone)]
pub struct AppState {
    pub profiles: Arc<ProfileService>,
    pub posts: Arc<PostService>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>) -> Self {
        AppState {
            profiles: Arc::new(ProfileService::new(store.clone())),
            posts: Arc::new(PostService::new(store)),
        }
    }
}
