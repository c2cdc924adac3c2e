use std::{path::Path, sync::Arc, time::Duration};

use dashmap::DashMap;
use object_store::{
    aws::{AmazonS3, AmazonS3Builder},
    path::Path as ObjectPath,
    signer::Signer,
    Attribute, Attributes, ObjectStore as _, PutMultipartOpts, WriteMultipart,
};
use streem::IntoStreamer;
use tokio_util::io::ReaderStream;
use url::Url;

use crate::{
    config::ObjectStorage,
    error_code::ErrorCode,
    future::WithMetrics,
    store::{ObjectKey, Store, StoreError},
};

const CHUNK_SIZE: usize = 8 * 1024 * 1024;
const MAX_IN_FLIGHT_PARTS: usize = 4;

#[derive(Debug, thiserror::Error)]
pub(crate) enum ObjectError {
    #[error("Failed to build client for bucket {0}")]
    Build(String, #[source] object_store::Error),

    #[error("Error making request to object storage")]
    Request(#[source] object_store::Error),

    #[error("Failed to sign url")]
    Signing(#[source] object_store::Error),

    #[error("Failed to read file for upload")]
    Io(#[source] std::io::Error),
}

impl ObjectError {
    pub(super) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Signing(_) => ErrorCode::SIGNING_ERROR,
            Self::Io(_) => ErrorCode::FILE_IO_ERROR,
            Self::Build(_, _) | Self::Request(_) => ErrorCode::OBJECT_STORE_ERROR,
        }
    }
}

/// S3-compatible storage
///
/// Clients are built per bucket on first use, so locators pointing at buckets
/// other than the configured one still resolve
#[derive(Clone, Debug)]
pub(crate) struct ObjectStore {
    builder: AmazonS3Builder,
    bucket_name: Arc<str>,
    clients: Arc<DashMap<String, Arc<AmazonS3>>>,
}

impl ObjectStore {
    pub(crate) fn build(config: ObjectStorage) -> Result<Self, ObjectError> {
        let ObjectStorage {
            endpoint,
            bucket_name,
            region,
            use_path_style,
            allow_http,
            access_key,
            secret_key,
            session_token,
        } = config;

        let mut builder = AmazonS3Builder::from_env()
            .with_region(region)
            .with_virtual_hosted_style_request(!use_path_style)
            .with_allow_http(allow_http);

        if let Some(endpoint) = endpoint {
            builder = builder.with_endpoint(endpoint.as_str().trim_end_matches('/'));
        }
        if let Some(access_key) = access_key {
            builder = builder.with_access_key_id(access_key);
        }
        if let Some(secret_key) = secret_key {
            builder = builder.with_secret_access_key(secret_key);
        }
        if let Some(session_token) = session_token {
            builder = builder.with_token(session_token);
        }

        let this = ObjectStore {
            builder,
            bucket_name: Arc::from(bucket_name),
            clients: Arc::new(DashMap::new()),
        };

        // surface configuration problems at startup rather than on first upload
        this.client(&this.bucket_name.clone())?;

        Ok(this)
    }

    fn client(&self, bucket_name: &str) -> Result<Arc<AmazonS3>, ObjectError> {
        if let Some(client) = self.clients.get(bucket_name) {
            return Ok(Arc::clone(&client));
        }

        let client = self
            .builder
            .clone()
            .with_bucket_name(bucket_name)
            .build()
            .map_err(|e| ObjectError::Build(bucket_name.to_string(), e))?;

        let client = Arc::new(client);

        self.clients
            .insert(bucket_name.to_string(), Arc::clone(&client));

        Ok(client)
    }
}

// TODO: retry transport errors with backoff, they're surfaced as-is for now
#[async_trait::async_trait(?Send)]
impl Store for ObjectStore {
    fn container(&self) -> &str {
        &self.bucket_name
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let client = self.client(&self.bucket_name)?;

        // a missing object still proves the bucket is reachable
        match client.head(&ObjectPath::from("tubely-health-check")).await {
            Ok(_) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(ObjectError::Request(e).into()),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn save_file(
        &self,
        container: &str,
        key: &ObjectKey,
        path: &Path,
        content_type: &mime::Mime,
    ) -> Result<(), StoreError> {
        let client = self.client(container)?;

        let file = tokio::fs::File::open(path).await.map_err(ObjectError::Io)?;

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());

        let upload = client
            .put_multipart_opts(
                &ObjectPath::from(key.as_str()),
                PutMultipartOpts {
                    attributes,
                    ..Default::default()
                },
            )
            .await
            .map_err(ObjectError::Request)?;

        let mut writer = WriteMultipart::new_with_chunk_size(upload, CHUNK_SIZE);

        let stream = std::pin::pin!(ReaderStream::with_capacity(file, CHUNK_SIZE));
        let mut stream = stream.into_streamer();

        while let Some(res) = stream.next().await {
            tracing::trace!("save_file: looping");

            let bytes = match res {
                Ok(bytes) => bytes,
                Err(e) => {
                    abort(writer).await;
                    return Err(ObjectError::Io(e).into());
                }
            };

            if let Err(e) = writer.wait_for_capacity(MAX_IN_FLIGHT_PARTS).await {
                abort(writer).await;
                return Err(ObjectError::Request(e).into());
            }

            writer.write(&bytes);
        }

        writer
            .finish()
            .with_metrics(crate::init_metrics::OBJECT_STORAGE_UPLOAD)
            .await
            .map_err(ObjectError::Request)?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn signed_url(
        &self,
        container: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<Url, StoreError> {
        let client = self.client(container)?;

        let url = client
            .signed_url(reqwest::Method::GET, &ObjectPath::from(key), ttl)
            .await
            .map_err(ObjectError::Signing)?;

        Ok(url)
    }
}

async fn abort(writer: WriteMultipart) {
    if let Err(e) = writer.abort().await {
        tracing::warn!("Failed to abort multipart upload: {e}");
    }
}
