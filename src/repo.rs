use std::{fmt::Debug, sync::Arc};

use time::OffsetDateTime;
use url::Url;
use uuid::Uuid;

use crate::{config, error_code::ErrorCode, locator::Locator};

pub(crate) mod sled;

pub(crate) type ArcRepo = Arc<dyn VideoRepo>;

#[derive(Debug, thiserror::Error)]
pub(crate) enum RepoError {
    #[error("Error in sled")]
    SledError(#[from] crate::repo::sled::SledError),

    #[error("Video {0} doesn't exist")]
    NotFound(Uuid),

    #[error("User doesn't own video {0}")]
    NotOwner(Uuid),
}

impl RepoError {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::SledError(e) => e.error_code(),
            Self::NotFound(_) => ErrorCode::VIDEO_NOT_FOUND,
            Self::NotOwner(_) => ErrorCode::NOT_OWNER,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub(crate) struct VideoRecord {
    pub(crate) id: Uuid,

    #[serde(with = "time::serde::rfc3339")]
    pub(crate) created_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub(crate) updated_at: OffsetDateTime,

    pub(crate) title: String,

    pub(crate) description: String,

    pub(crate) thumbnail_url: Option<Url>,

    /// A stored `{container},{key}` locator, or a signed url once it's been
    /// prepared for a response
    pub(crate) video_url: Option<String>,

    pub(crate) user_id: Uuid,
}

/// A locator reserved for an upload that hasn't been confirmed
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct PendingLocator {
    pub(crate) locator: Locator,
    pub(crate) video_id: Uuid,
    pub(crate) reserved_at: OffsetDateTime,
}

#[async_trait::async_trait(?Send)]
pub(crate) trait VideoRepo: Debug + Send + Sync {
    async fn health_check(&self) -> Result<(), RepoError>;

    async fn create_video(
        &self,
        user_id: Uuid,
        title: String,
        description: String,
    ) -> Result<VideoRecord, RepoError>;

    async fn video(&self, id: Uuid) -> Result<Option<VideoRecord>, RepoError>;

    async fn set_thumbnail_url(
        &self,
        id: Uuid,
        user_id: Uuid,
        thumbnail_url: Url,
    ) -> Result<VideoRecord, RepoError>;

    /// Record that `locator` is about to be published for video `id`
    async fn reserve_locator(&self, id: Uuid, locator: &Locator) -> Result<(), RepoError>;

    /// Point video `id` at `locator` and drop its reservation in one step
    ///
    /// Only the video's owner may do this
    async fn confirm_locator(
        &self,
        id: Uuid,
        user_id: Uuid,
        locator: &Locator,
    ) -> Result<VideoRecord, RepoError>;

    /// Drop a reservation for a locator that was never published
    async fn release_locator(&self, locator: &Locator) -> Result<(), RepoError>;

    /// Reservations that were never confirmed or released
    ///
    /// Each one may name an object that exists in the store without any
    /// video referencing it
    async fn pending_locators(&self) -> Result<Vec<PendingLocator>, RepoError>;
}

pub(crate) fn open(config: &config::Repo) -> color_eyre::Result<ArcRepo> {
    match config {
        config::Repo::Sled(config::Sled {
            path,
            cache_capacity,
        }) => {
            let db = ::sled::Config::new()
                .cache_capacity(*cache_capacity)
                .path(path)
                .open()?;

            Ok(Arc::new(self::sled::SledRepo::new(db)?))
        }
    }
}
