use actix_web::web::Bytes;
use futures_core::Stream;
use uuid::Uuid;

use crate::{
    error::{Error, UploadError},
    ingest::{buffer, cleanup},
    repo::{RepoError, VideoRecord},
    state::State,
};

pub(crate) const MAX_THUMBNAIL_SIZE: usize = 10 * 1024 * 1024;

/// The file extension for an accepted thumbnail type
fn extension(content_type: &mime::Mime) -> Option<&'static str> {
    match content_type.essence_str() {
        "image/jpeg" => Some("jpeg"),
        "image/png" => Some("png"),
        _ => None,
    }
}

/// Write a thumbnail into the assets directory and point the video at it
#[tracing::instrument(name = "Thumbnail", skip(state, stream))]
pub(crate) async fn save<S, E>(
    state: &State,
    video_id: Uuid,
    user_id: Uuid,
    content_type: Option<&mime::Mime>,
    stream: S,
) -> Result<VideoRecord, Error>
where
    S: Stream<Item = Result<Bytes, E>>,
    UploadError: From<E>,
{
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

    let Some(ext) = extension(content_type) else {
        return Err(UploadError::UnsupportedMediaType(content_type.to_string()).into());
    };

    let res = write(state, video_id, ext, stream).await;

    let res = match res {
        Ok(url) => state
            .repo
            .set_thumbnail_url(video_id, user_id, url)
            .await
            .map_err(Error::from),
        Err(e) => Err(e),
    };

    let outcome = if res.is_ok() { "success" } else { "failure" };
    metrics::counter!(crate::init_metrics::THUMBNAILS, "outcome" => outcome).increment(1);

    res
}

async fn write<S, E>(
    state: &State,
    video_id: Uuid,
    ext: &str,
    stream: S,
) -> Result<url::Url, Error>
where
    S: Stream<Item = Result<Bytes, E>>,
    UploadError: From<E>,
{
    let file_name = format!("{video_id}.{ext}");

    let suffix = format!(".{ext}");
    let tmp = state.tmp_dir.tmp_file(Some(suffix.as_str()));

    let res = buffer(&tmp, stream, MAX_THUMBNAIL_SIZE).await;

    let res = match res {
        Ok(()) => tokio::fs::copy(&tmp, state.config.server.assets_root.join(&file_name))
            .await
            .map_err(Error::from),
        Err(e) => Err(e),
    };

    cleanup(tmp).await;
    res?;

    let url = state
        .config
        .server
        .public_url
        .join(&format!("assets/{file_name}"))?;

    Ok(url)
}
