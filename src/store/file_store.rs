use std::{
    path::{Component, Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use url::Url;

use crate::{
    error_code::ErrorCode,
    store::{ObjectKey, Store, StoreError},
};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub(crate) enum FileError {
    #[error("Failed to read or write file")]
    Io(#[from] std::io::Error),

    #[error("Invalid signing secret")]
    Secret(#[from] hmac::digest::InvalidLength),

    #[error("Object path {0:?} escapes the store")]
    InvalidPath(String),

    #[error("Signature doesn't match")]
    InvalidSignature,

    #[error("Signed url has expired")]
    Expired,

    #[error("Couldn't build url")]
    Url(#[from] url::ParseError),
}

impl FileError {
    pub(super) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Io(_) => ErrorCode::FILE_IO_ERROR,
            Self::Secret(_) | Self::Url(_) => ErrorCode::SIGNING_ERROR,
            Self::InvalidPath(_) | Self::InvalidSignature | Self::Expired => {
                ErrorCode::INVALID_SIGNATURE
            }
        }
    }

    pub(crate) const fn is_forbidden(&self) -> bool {
        matches!(
            self,
            Self::InvalidPath(_) | Self::InvalidSignature | Self::Expired
        )
    }
}

/// Videos kept under a local directory, served back by tubely itself
///
/// Retrieval urls point at `/files/{container}/{key}` and carry an
/// HMAC-SHA256 signature over `GET\n{container}\n{key}\n{expires}`
#[derive(Clone)]
pub(crate) struct FileStore {
    root_dir: PathBuf,
    container: Arc<str>,
    signing_secret: Arc<[u8]>,
    public_url: Url,
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("root_dir", &self.root_dir)
            .field("container", &self.container)
            .field("signing_secret", &"redacted")
            .field("public_url", &self.public_url.as_str())
            .finish()
    }
}

impl FileStore {
    #[tracing::instrument(skip(signing_secret))]
    pub(crate) async fn build(
        root_dir: PathBuf,
        container: String,
        signing_secret: String,
        public_url: Url,
    ) -> Result<Self, FileError> {
        if signing_secret.is_empty() {
            tracing::warn!("store.signing_secret is empty, signed urls can be forged");
        }

        let this = FileStore {
            root_dir,
            container: Arc::from(container),
            signing_secret: Arc::from(signing_secret.into_bytes()),
            public_url,
        };

        let container_dir = this.object_path(&this.container, "")?;
        tokio::fs::create_dir_all(container_dir).await?;

        Ok(this)
    }

    fn object_path(&self, container: &str, key: &str) -> Result<PathBuf, FileError> {
        let is_single_component = matches!(
            Path::new(container).components().collect::<Vec<_>>().as_slice(),
            [Component::Normal(_)]
        );

        if !is_single_component {
            return Err(FileError::InvalidPath(container.to_string()));
        }

        if !Path::new(key)
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
        {
            return Err(FileError::InvalidPath(key.to_string()));
        }

        Ok(self.root_dir.join(container).join(key))
    }

    fn signature(&self, container: &str, key: &str, expires: i64) -> Result<Vec<u8>, FileError> {
        let mut mac = HmacSha256::new_from_slice(&self.signing_secret)?;

        mac.update(format!("GET\n{container}\n{key}\n{expires}").as_bytes());

        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn signed_url_at(
        &self,
        container: &str,
        key: &str,
        expires: i64,
    ) -> Result<Url, FileError> {
        let signature = hex::encode(self.signature(container, key, expires)?);

        let mut url = self
            .public_url
            .join(&format!("files/{container}/{key}"))?;

        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", &signature);

        Ok(url)
    }

    /// Check a request for `/files/{container}/{key}`, returning the file to serve
    pub(crate) fn verify(
        &self,
        container: &str,
        key: &str,
        expires: i64,
        signature: &str,
    ) -> Result<PathBuf, FileError> {
        self.verify_at(container, key, expires, signature, now())
    }

    fn verify_at(
        &self,
        container: &str,
        key: &str,
        expires: i64,
        signature: &str,
        now: i64,
    ) -> Result<PathBuf, FileError> {
        let path = self.object_path(container, key)?;

        let provided = hex::decode(signature).map_err(|_| FileError::InvalidSignature)?;
        let expected = self.signature(container, key, expires)?;

        if !bool::from(expected.ct_eq(&provided)) {
            return Err(FileError::InvalidSignature);
        }

        if expires < now {
            return Err(FileError::Expired);
        }

        Ok(path)
    }

    /// The content type a stored file was published with
    ///
    /// Files published without one, or whose record can't be read, have none
    pub(crate) async fn content_type(&self, path: &Path) -> Option<mime::Mime> {
        let recorded = tokio::fs::read_to_string(content_type_path(path)).await.ok()?;

        recorded.trim().parse().ok()
    }
}

fn content_type_path(path: &Path) -> PathBuf {
    let mut sidecar = path.as_os_str().to_owned();
    sidecar.push(".content-type");
    PathBuf::from(sidecar)
}

fn now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

#[async_trait::async_trait(?Send)]
impl Store for FileStore {
    fn container(&self) -> &str {
        &self.container
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        tokio::fs::metadata(&self.root_dir)
            .await
            .map_err(FileError::from)?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn save_file(
        &self,
        container: &str,
        key: &ObjectKey,
        path: &Path,
        content_type: &mime::Mime,
    ) -> Result<(), StoreError> {
        let target = self.object_path(container, key.as_str())?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(FileError::from)?;
        }

        let sidecar = content_type_path(&target);

        let res = match tokio::fs::copy(path, &target).await {
            Ok(_) => tokio::fs::write(&sidecar, content_type.to_string()).await,
            Err(e) => Err(e),
        };

        if let Err(e) = res {
            for partial in [&target, &sidecar] {
                if let Err(e) = tokio::fs::remove_file(partial).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!("Failed to remove partial copy {partial:?}: {e}");
                    }
                }
            }

            return Err(FileError::from(e).into());
        }

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn signed_url(
        &self,
        container: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<Url, StoreError> {
        // reject paths we'd refuse to serve
        self.object_path(container, key)?;

        let expires = now().saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX));

        Ok(self.signed_url_at(container, key, expires)?)
    }
}
