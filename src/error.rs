use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use color_eyre::Report;

use crate::error_code::ErrorCode;

pub(crate) struct Error {
    inner: color_eyre::Report,
}

impl Error {
    pub(crate) fn kind(&self) -> Option<&UploadError> {
        self.inner.downcast_ref()
    }

    pub(crate) fn root_cause(&self) -> &(dyn std::error::Error + 'static) {
        self.inner.root_cause()
    }

    pub(crate) fn error_code(&self) -> ErrorCode {
        self.kind()
            .map(|e| e.error_code())
            .unwrap_or(ErrorCode::UNKNOWN_ERROR)
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.inner, f)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.inner, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl<T> From<T> for Error
where
    UploadError: From<T>,
{
    fn from(error: T) -> Self {
        Error {
            inner: Report::from(UploadError::from(error)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum UploadError {
    #[error("Couldn't upload file")]
    Upload(#[from] actix_form_data::Error),

    #[error("Error in DB")]
    Repo(#[from] crate::repo::RepoError),

    #[error("Couldn't authenticate request")]
    Auth(#[from] crate::auth::AuthError),

    #[error("Error interacting with filesystem")]
    Io(#[from] std::io::Error),

    #[error("Error in ffprobe")]
    Probe(#[from] crate::ffprobe::ProbeError),

    #[error("Error in ffmpeg")]
    Rewrite(#[from] crate::faststart::RewriteError),

    #[error("Error in store")]
    Store(#[from] crate::store::StoreError),

    #[error("Video has a corrupt locator")]
    Locator(#[from] crate::locator::LocatorError),

    #[error("Failed to publish video")]
    Publish(#[source] crate::store::StoreError),

    #[error("Published video, but failed to record it")]
    Finalize(#[source] crate::repo::RepoError),

    #[error("Invalid video ID")]
    InvalidVideoId(#[source] uuid::Error),

    #[error("Unsupported media type {0}")]
    UnsupportedMediaType(String),

    #[error("Upload has no content type")]
    MissingContentType,

    #[error("No files present in upload")]
    NoFiles,

    #[error("Requested file doesn't exist")]
    MissingFile,

    #[error("Couldn't build url")]
    Url(#[from] url::ParseError),

    #[error("Hit limit")]
    Limit(#[from] crate::ingest::LimitError),
}

impl UploadError {
    const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Upload(actix_form_data::Error::FileSize) => ErrorCode::VALIDATE_FILE_SIZE,
            Self::Upload(_) => ErrorCode::FILE_UPLOAD_ERROR,
            Self::Repo(e) => e.error_code(),
            Self::Auth(e) => e.error_code(),
            Self::Io(_) => ErrorCode::IO_ERROR,
            Self::Probe(e) => e.error_code(),
            Self::Rewrite(e) => e.error_code(),
            Self::Store(e) => e.error_code(),
            Self::Locator(e) => e.error_code(),
            Self::Publish(_) => ErrorCode::PUBLISH_FAILED,
            Self::Finalize(_) => ErrorCode::FINALIZE_FAILED,
            Self::InvalidVideoId(_) => ErrorCode::INVALID_VIDEO_ID,
            Self::UnsupportedMediaType(_) | Self::MissingContentType => {
                ErrorCode::UNSUPPORTED_MEDIA_TYPE
            }
            Self::NoFiles => ErrorCode::VALIDATE_NO_FILES,
            Self::MissingFile => ErrorCode::NOT_FOUND,
            Self::Url(_) => ErrorCode::INVALID_URL,
            Self::Limit(_) => ErrorCode::VALIDATE_FILE_SIZE,
        }
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self.kind() {
            Some(
                UploadError::Upload(_)
                | UploadError::InvalidVideoId(_)
                | UploadError::UnsupportedMediaType(_)
                | UploadError::MissingContentType
                | UploadError::NoFiles
                | UploadError::Limit(_),
            ) => StatusCode::BAD_REQUEST,
            Some(
                UploadError::Auth(_) | UploadError::Repo(crate::repo::RepoError::NotOwner(_)),
            ) => StatusCode::UNAUTHORIZED,
            Some(
                UploadError::Repo(crate::repo::RepoError::NotFound(_)) | UploadError::MissingFile,
            ) => StatusCode::NOT_FOUND,
            Some(UploadError::Store(crate::store::StoreError::FileStore(e))) if e.is_forbidden() => {
                StatusCode::FORBIDDEN
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .content_type("application/json")
            .body(
                serde_json::to_string(&serde_json::json!({
                    "msg": self.root_cause().to_string(),
                    "code": self.error_code()
                }))
                .unwrap_or_else(|_| {
                    r#"{"msg":"Request failed","code":"unknown-error"}"#.to_string()
                }),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, UploadError};
    use crate::{
        auth::AuthError,
        faststart::RewriteError,
        locator::LocatorError,
        process::ProcessError,
        repo::RepoError,
    };
    use actix_web::{http::StatusCode, ResponseError};
    use std::sync::Arc;
    use uuid::Uuid;

    fn status_and_code(error: Error) -> (StatusCode, &'static str) {
        (error.status_code(), error.error_code().as_str())
    }

    #[test]
    fn client_faults() {
        assert_eq!(
            status_and_code(UploadError::UnsupportedMediaType("image/png".into()).into()),
            (StatusCode::BAD_REQUEST, "unsupported-media-type")
        );
        assert_eq!(
            status_and_code(UploadError::MissingContentType.into()),
            (StatusCode::BAD_REQUEST, "unsupported-media-type")
        );
        assert_eq!(
            status_and_code(crate::ingest::LimitError { limit: 10 }.into()),
            (StatusCode::BAD_REQUEST, "validate-file-size")
        );
        assert_eq!(
            status_and_code(AuthError::MissingToken.into()),
            (StatusCode::UNAUTHORIZED, "missing-token")
        );
        assert_eq!(
            status_and_code(RepoError::NotOwner(Uuid::new_v4()).into()),
            (StatusCode::UNAUTHORIZED, "not-owner")
        );
        assert_eq!(
            status_and_code(RepoError::NotFound(Uuid::new_v4()).into()),
            (StatusCode::NOT_FOUND, "video-not-found")
        );
    }

    #[test]
    fn server_faults_are_distinguished() {
        assert_eq!(
            status_and_code(
                RewriteError::Process(ProcessError::Timeout(Arc::from("ffmpeg"))).into()
            ),
            (StatusCode::INTERNAL_SERVER_ERROR, "command-timeout")
        );
        assert_eq!(
            status_and_code(LocatorError::Malformed("nope".into()).into()),
            (StatusCode::INTERNAL_SERVER_ERROR, "invalid-locator")
        );
        assert_eq!(
            status_and_code(UploadError::Finalize(RepoError::NotFound(Uuid::new_v4())).into()),
            (StatusCode::INTERNAL_SERVER_ERROR, "finalize-failed")
        );
    }
}
