use sled::{
    transaction::{
        ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
        TransactionalTree,
    },
    Db, Transactional, Tree,
};
use time::OffsetDateTime;
use url::Url;
use uuid::Uuid;

use crate::{
    error_code::ErrorCode,
    locator::Locator,
    repo::{PendingLocator, RepoError, VideoRecord, VideoRepo},
};

macro_rules! b {
    ($self:ident.$ident:ident, $expr:expr) => {{
        let $ident = $self.$ident.clone();

        actix_web::rt::task::spawn_blocking(move || $expr)
            .await
            .map_err(SledError::from)??
    }};
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum SledError {
    #[error("Error in database")]
    Sled(#[from] sled::Error),

    #[error("Invalid video json")]
    Json(#[from] serde_json::Error),

    #[error("Invalid pending locator")]
    Locator(#[from] crate::locator::LocatorError),

    #[error("Operation panicked")]
    Panic,
}

impl SledError {
    pub(super) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Panic => ErrorCode::PANIC,
            Self::Sled(_) | Self::Json(_) | Self::Locator(_) => ErrorCode::SLED_ERROR,
        }
    }
}

impl From<actix_web::rt::task::JoinError> for SledError {
    fn from(_: actix_web::rt::task::JoinError) -> Self {
        SledError::Panic
    }
}

/// Why a transaction gave up
#[derive(Debug)]
enum Abort {
    NotFound(Uuid),
    NotOwner(Uuid),
    Json(serde_json::Error),
}

impl From<TransactionError<Abort>> for RepoError {
    fn from(value: TransactionError<Abort>) -> Self {
        match value {
            TransactionError::Abort(Abort::NotFound(id)) => RepoError::NotFound(id),
            TransactionError::Abort(Abort::NotOwner(id)) => RepoError::NotOwner(id),
            TransactionError::Abort(Abort::Json(e)) => SledError::from(e).into(),
            TransactionError::Storage(e) => SledError::from(e).into(),
        }
    }
}

#[derive(serde::Deserialize, serde::Serialize)]
struct Reservation {
    video_id: Uuid,

    #[serde(with = "time::serde::rfc3339")]
    reserved_at: OffsetDateTime,
}

#[derive(Clone)]
pub(crate) struct SledRepo {
    videos: Tree,
    pending_locators: Tree,
    db: Db,
}

impl std::fmt::Debug for SledRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledRepo").finish()
    }
}

impl SledRepo {
    pub(crate) fn new(db: Db) -> Result<Self, SledError> {
        Ok(SledRepo {
            videos: db.open_tree("tubely-videos-tree")?,
            pending_locators: db.open_tree("tubely-pending-locators-tree")?,
            db,
        })
    }
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Apply `f` to a video owned by `user_id` inside a transaction
fn update_owned<F>(
    videos: &TransactionalTree,
    id: Uuid,
    user_id: Uuid,
    f: F,
) -> ConflictableTransactionResult<VideoRecord, Abort>
where
    F: Fn(&mut VideoRecord),
{
    let Some(bytes) = videos.get(id.as_bytes())? else {
        return Err(ConflictableTransactionError::Abort(Abort::NotFound(id)));
    };

    let mut video: VideoRecord = serde_json::from_slice(&bytes)
        .map_err(|e| ConflictableTransactionError::Abort(Abort::Json(e)))?;

    if video.user_id != user_id {
        return Err(ConflictableTransactionError::Abort(Abort::NotOwner(id)));
    }

    f(&mut video);
    video.updated_at = now();

    let bytes = serde_json::to_vec(&video)
        .map_err(|e| ConflictableTransactionError::Abort(Abort::Json(e)))?;

    videos.insert(id.as_bytes().to_vec(), bytes)?;

    Ok(video)
}

#[async_trait::async_trait(?Send)]
impl VideoRepo for SledRepo {
    async fn health_check(&self) -> Result<(), RepoError> {
        let next = self.db.generate_id().map_err(SledError::from)?;

        tracing::trace!("sled is alive, next id {next}");

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn create_video(
        &self,
        user_id: Uuid,
        title: String,
        description: String,
    ) -> Result<VideoRecord, RepoError> {
        let created_at = now();

        let video = VideoRecord {
            id: Uuid::new_v4(),
            created_at,
            updated_at: created_at,
            title,
            description,
            thumbnail_url: None,
            video_url: None,
            user_id,
        };

        let bytes = serde_json::to_vec(&video).map_err(SledError::from)?;
        let id = video.id;

        b!(self.videos, {
            videos.insert(id.as_bytes().to_vec(), bytes)?;
            Ok(()) as Result<(), SledError>
        });

        Ok(video)
    }

    #[tracing::instrument(skip(self))]
    async fn video(&self, id: Uuid) -> Result<Option<VideoRecord>, RepoError> {
        let opt = b!(self.videos, videos.get(id.as_bytes()).map_err(SledError::from));

        let Some(bytes) = opt else {
            return Ok(None);
        };

        let video = serde_json::from_slice(&bytes).map_err(SledError::from)?;

        Ok(Some(video))
    }

    #[tracing::instrument(skip(self))]
    async fn set_thumbnail_url(
        &self,
        id: Uuid,
        user_id: Uuid,
        thumbnail_url: Url,
    ) -> Result<VideoRecord, RepoError> {
        let video = b!(
            self.videos,
            videos
                .transaction(|videos| update_owned(videos, id, user_id, |video| {
                    video.thumbnail_url = Some(thumbnail_url.clone());
                }))
                .map_err(RepoError::from)
        );

        Ok(video)
    }

    #[tracing::instrument(skip(self))]
    async fn reserve_locator(&self, id: Uuid, locator: &Locator) -> Result<(), RepoError> {
        let key = locator.to_string();
        let reservation = serde_json::to_vec(&Reservation {
            video_id: id,
            reserved_at: now(),
        })
        .map_err(SledError::from)?;

        b!(self.pending_locators, {
            pending_locators.insert(key.as_bytes(), reservation)?;
            Ok(()) as Result<(), SledError>
        });

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn confirm_locator(
        &self,
        id: Uuid,
        user_id: Uuid,
        locator: &Locator,
    ) -> Result<VideoRecord, RepoError> {
        let key = locator.to_string();
        let pending_locators = self.pending_locators.clone();

        let video = b!(
            self.videos,
            (&videos, &pending_locators)
                .transaction(|(videos, pending_locators)| -> ConflictableTransactionResult<_, Abort> {
                    let video = update_owned(videos, id, user_id, |video| {
                        video.video_url = Some(key.clone());
                    })?;

                    pending_locators.remove(key.as_bytes())?;

                    Ok(video)
                })
                .map_err(RepoError::from)
        );

        Ok(video)
    }

    #[tracing::instrument(skip(self))]
    async fn release_locator(&self, locator: &Locator) -> Result<(), RepoError> {
        let key = locator.to_string();

        b!(self.pending_locators, {
            pending_locators.remove(key.as_bytes())?;
            Ok(()) as Result<(), SledError>
        });

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn pending_locators(&self) -> Result<Vec<PendingLocator>, RepoError> {
        let pending = b!(self.pending_locators, {
            pending_locators
                .iter()
                .map(|res| -> Result<PendingLocator, SledError> {
                    let (key, value) = res?;

                    let locator = String::from_utf8_lossy(&key).parse::<Locator>()?;
                    let reservation: Reservation = serde_json::from_slice(&value)?;

                    Ok(PendingLocator {
                        locator,
                        video_id: reservation.video_id,
                        reserved_at: reservation.reserved_at,
                    })
                })
                .collect::<Result<Vec<_>, SledError>>()
        });

        Ok(pending)
    }
}
