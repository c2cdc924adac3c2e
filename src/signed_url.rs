use std::time::Duration;

use crate::{error::Error, locator::Locator, repo::VideoRecord, store::Store};

/// How long a handed out video url stays valid
pub(crate) const SIGNED_URL_TTL: Duration = Duration::from_secs(120);

/// Swap a record's stored locator for a url the client can fetch
///
/// Records that were never uploaded to are returned untouched
#[tracing::instrument(skip(store, video), fields(video_id = %video.id))]
pub(crate) async fn sign_video(
    store: &dyn Store,
    mut video: VideoRecord,
) -> Result<VideoRecord, Error> {
    let Some(stored) = video.video_url.as_deref() else {
        return Ok(video);
    };

    let locator = match stored.parse::<Locator>() {
        Ok(locator) => locator,
        Err(e) => {
            tracing::error!("Video {} has a corrupt locator {stored:?}", video.id);
            metrics::counter!(crate::init_metrics::SIGN_CORRUPT_LOCATOR).increment(1);

            return Err(e.into());
        }
    };

    let url = store
        .signed_url(locator.container(), locator.key(), SIGNED_URL_TTL)
        .await?;

    metrics::counter!(crate::init_metrics::SIGN).increment(1);

    video.video_url = Some(url.to_string());

    Ok(video)
}
