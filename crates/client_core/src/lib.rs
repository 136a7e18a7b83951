use std::sync::Arc;

pub mod api;
pub mod config;
pub mod embed;
pub mod error;
pub mod sync;
pub mod transport;

pub use api::{ApiClient, DashboardApi};
pub use config::{load_settings, ClientSettings};
pub use embed::{derive_embed_id, EmbedId};
pub use error::{ClientError, ClientResult};
pub use sync::{
    FetchOutcome, Operation, Resource, SyncEvent, SyncOptions, ViewSnapshot, ViewSyncController,
};

/// Wires an HTTP client and a view controller sharing the same settings.
pub fn connect(settings: &ClientSettings) -> ClientResult<(ApiClient, Arc<ViewSyncController>)> {
    let api = ApiClient::new(settings)?;
    let controller = ViewSyncController::new(Arc::new(api.clone()), SyncOptions::from(settings));
    Ok((api, controller))
}
