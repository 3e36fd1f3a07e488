use std::sync::Arc;

use crate::engine::member_engine::MemberListEngine;

/// Shared state for the HTTP handlers.
pub struct AppState {
    pub engine: Arc<MemberListEngine>,
}
