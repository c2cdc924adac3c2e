use std::path::Path;

use actix_web::web::Bytes;
use futures_core::Stream;
use streem::IntoStreamer;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::{
    aspect::AspectClass,
    config::ProbeFailure,
    error::{Error, UploadError},
    future::WithMetrics,
    locator::Locator,
    repo::{RepoError, VideoRecord},
    state::State,
    store::ObjectKey,
    tmp_file::TmpFile,
};


const VIDEO_MP4: &str = "video/mp4";

#[derive(Debug, thiserror::Error)]
#[error("Upload is larger than {limit} bytes")]
pub(crate) struct LimitError {
    pub(crate) limit: usize,
}

/// Check the caller may upload to this video before touching the disk
#[tracing::instrument(skip(state))]
pub(crate) async fn validate<'a>(
    state: &State,
    video_id: Uuid,
    user_id: Uuid,
    content_type: Option<&'a mime::Mime>,
) -> Result<(VideoRecord, &'a mime::Mime), Error> {
    let video = state
        .repo
        .video(video_id)
        .await?
        .ok_or(RepoError::NotFound(video_id))?;

    if video.user_id != user_id {
        return Err(RepoError::NotOwner(video_id).into());
    }

    let Some(content_type) = content_type else {
        return Err(UploadError::MissingContentType.into());
    };

    if content_type.essence_str() != VIDEO_MP4 {
        return Err(UploadError::UnsupportedMediaType(content_type.to_string()).into());
    }

    Ok((video, content_type))
}

/// Run one upload from the request stream through to a published, recorded video
///
/// Both scratch files are removed however this returns
#[tracing::instrument(name = "Ingest", skip(state, stream))]
pub(crate) async fn ingest<S, E>(
    state: &State,
    video_id: Uuid,
    user_id: Uuid,
    content_type: Option<&mime::Mime>,
    stream: S,
) -> Result<ObjectKey, Error>
where
    S: Stream<Item = Result<Bytes, E>>,
    UploadError: From<E>,
{
    let (video, content_type) = validate(state, video_id, user_id, content_type).await?;

    let original = state.tmp_dir.tmp_file(Some(".mp4"));
    let mut rewritten = None;

    let res = process(state, &video, content_type, stream, &original, &mut rewritten).await;

    cleanup(original).await;
    if let Some(rewritten) = rewritten {
        cleanup(rewritten).await;
    }

    let outcome = if res.is_ok() { "success" } else { "failure" };
    metrics::counter!(crate::init_metrics::UPLOADS, "outcome" => outcome).increment(1);

    res
}

async fn process<S, E>(
    state: &State,
    video: &VideoRecord,
    content_type: &mime::Mime,
    stream: S,
    original: &TmpFile,
    rewritten: &mut Option<TmpFile>,
) -> Result<ObjectKey, Error>
where
    S: Stream<Item = Result<Bytes, E>>,
    UploadError: From<E>,
{
    buffer(original, stream, state.config.media.max_file_size)
        .with_metrics(crate::init_metrics::INGEST_BUFFER)
        .await?;

    let class = classify(state, original).await?;

    let output = state
        .rewriter
        .faststart(original)
        .with_metrics(crate::init_metrics::INGEST_REWRITE)
        .await?;
    let rewritten = &*rewritten.insert(TmpFile::adopt(output));

    let key = ObjectKey::generate(class);
    let container = state.store.container();
    let locator = Locator::new(container, key.as_str());

    state.repo.reserve_locator(video.id, &locator).await?;

    let published = state
        .store
        .save_file(container, &key, rewritten, content_type)
        .with_metrics(crate::init_metrics::INGEST_PUBLISH)
        .await;

    if let Err(e) = published {
        if let Err(e) = state.repo.release_locator(&locator).await {
            tracing::warn!("Failed to release locator {locator}: {e}");
        }

        return Err(UploadError::Publish(e).into());
    }

    if let Err(e) = state
        .repo
        .confirm_locator(video.id, video.user_id, &locator)
        .await
    {
        tracing::error!("Published {locator} but couldn't record it on video {}", video.id);

        return Err(UploadError::Finalize(e).into());
    }

    Ok(key)
}

/// Copy the request body to disk, ffprobe and ffmpeg both need a seekable file
#[tracing::instrument(skip(stream))]
pub(crate) async fn buffer<S, E>(path: &Path, stream: S, limit: usize) -> Result<(), Error>
where
    S: Stream<Item = Result<Bytes, E>>,
    UploadError: From<E>,
{
    let mut file = tokio::fs::File::create(path).await?;

    let stream = std::pin::pin!(stream);
    let mut stream = stream.into_streamer();

    let mut written = 0;

    while let Some(bytes) = stream.try_next().await? {
        tracing::trace!("buffer: looping");

        written += bytes.len();

        if written > limit {
            return Err(LimitError { limit }.into());
        }

        file.write_all(&bytes).await?;
    }

    file.flush().await?;

    tracing::debug!("Buffered {written} bytes");

    Ok(())
}

async fn classify(state: &State, path: &Path) -> Result<AspectClass, Error> {
    let res = state
        .probe
        .aspect_ratio(path)
        .with_metrics(crate::init_metrics::INGEST_PROBE)
        .await;

    match (res, state.config.media.probe_failure) {
        (Ok(ratio), _) => {
            let class = AspectClass::classify(&ratio);

            tracing::debug!("Classified {ratio:?} as {class}");

            Ok(class)
        }
        (Err(e), ProbeFailure::Degrade) => {
            let reason = if e.is_parse_error() {
                "ffprobe output was unusable"
            } else {
                "ffprobe failed"
            };

            tracing::warn!(
                "{reason}, storing as {}: {}",
                AspectClass::Other,
                crate::format_error(&e)
            );

            Ok(AspectClass::Other)
        }
        (Err(e), ProbeFailure::Reject) => Err(e.into()),
    }
}

pub(crate) async fn cleanup(file: TmpFile) {
    let path = file.to_path_buf();

    if let Err(e) = file.cleanup().await {
        tracing::warn!("Failed to remove scratch file {path:?}: {e}");
    }
}
