//! Object store backends for site images.

mod fs;
mod http;

pub use fs::FsObjectStore;
pub use http::HttpObjectStore;

use std::sync::Arc;

use crate::application::storage::ObjectStore;
use crate::config::StorageSettings;
use crate::infra::error::InfraError;

/// Build the configured backend.
pub fn from_settings(settings: &StorageSettings) -> Result<Arc<dyn ObjectStore>, InfraError> {
    match settings {
        StorageSettings::Filesystem { directory } => {
            let store = FsObjectStore::new(directory.clone())?;
            Ok(Arc::new(store))
        }
        StorageSettings::Http {
            base_url,
            bucket,
            service_key,
        } => {
            let store = HttpObjectStore::new(base_url.clone(), bucket.clone(), service_key.clone())
                .map_err(|err| InfraError::storage(format!("failed to build HTTP client: {err}")))?;
            Ok(Arc::new(store))
        }
    }
}
