use crate::error::{AppError, AppResult};

/// Caller identity as resolved by the upstream auth layer.
///
/// The identity is an opaque string; the core never issues or verifies
/// tokens. A context is built once per request and passed explicitly
/// through every operation, never attached to entity instances.
#[derive(Debug, Clone, Default)]
pub struct ViewerContext {
    viewer_id: Option<String>,
}

impl ViewerContext {
    pub fn authenticated(viewer_id: impl Into<String>) -> Self {
        ViewerContext {
            viewer_id: Some(viewer_id.into()),
        }
    }

    pub fn anonymous() -> Self {
        ViewerContext { viewer_id: None }
    }

    pub fn viewer_id(&self) -> Option<&str> {
        self.viewer_id.as_deref()
    }

    /// Identity of the caller, or `Authentication` when anonymous.
    pub fn require_viewer(&self) -> AppResult<&str> {
        self.viewer_id.as_deref().ok_or_else(|| {
            AppError::Authentication("this operation requires an identified viewer".to_string())
        })
    }

    pub fn is_owner(&self, owner_id: &str) -> bool {
        self.viewer_id.as_deref() == Some(owner_id)
    }
}
