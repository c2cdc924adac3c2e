use std::{fmt::Debug, path::Path, sync::Arc, time::Duration};

use url::Url;

use crate::error_code::ErrorCode;

pub(crate) mod file_store;
pub(crate) mod object_key;
pub(crate) mod object_store;

pub(crate) use object_key::ObjectKey;

pub(crate) type ArcStore = Arc<dyn Store>;

#[derive(Debug, thiserror::Error)]
pub(crate) enum StoreError {
    #[error("Error in file store")]
    FileStore(#[from] crate::store::file_store::FileError),

    #[error("Error in object store")]
    ObjectStore(#[from] crate::store::object_store::ObjectError),
}

impl StoreError {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::FileStore(e) => e.error_code(),
            Self::ObjectStore(e) => e.error_code(),
        }
    }
}

/// Somewhere published videos live
#[async_trait::async_trait(?Send)]
pub(crate) trait Store: Debug + Send + Sync {
    /// The container new uploads are published to
    fn container(&self) -> &str;

    async fn health_check(&self) -> Result<(), StoreError>;

    /// Copy a local file into `container` under `key`
    ///
    /// An existing object with the same key is overwritten
    async fn save_file(
        &self,
        container: &str,
        key: &ObjectKey,
        path: &Path,
        content_type: &mime::Mime,
    ) -> Result<(), StoreError>;

    /// Produce a url granting read access to an object for `ttl`
    async fn signed_url(&self, container: &str, key: &str, ttl: Duration)
        -> Result<Url, StoreError>;
}
