//! Application state shared across request handlers.

use std::sync::Arc;

use wanimirror_storage::MirrorStore;
use wanimirror_sync::query::QueryService;
use wanimirror_sync::{SyncService, Upstream};

/// Handlers are generic over the store and upstream implementations,
/// so tests assemble the same router around an in-memory store and a
/// scripted upstream.
pub struct AppState<S: MirrorStore, U: Upstream> {
    pub store: Arc<S>,
    pub sync: Arc<SyncService<S, U>>,
    pub query: QueryService<S>,
    /// Bearer token required on non-`/health` requests. `None` = open.
    pub local_api_token: Option<String>,
}
