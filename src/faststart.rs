use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use crate::{
    error_code::ErrorCode,
    process::{Process, ProcessError},
};

const PROCESSING_MARKER: &str = "processing";

/// Something that can move an mp4's moov atom ahead of its media data
#[async_trait::async_trait(?Send)]
pub(crate) trait Rewrite: Send + Sync {
    /// Write a fast-start copy of `input` next to it, returning the new path
    ///
    /// `input` is left in place, removing both files is up to the caller
    async fn faststart(&self, input: &Path) -> Result<PathBuf, RewriteError>;
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum RewriteError {
    #[error("Path {0:?} needs a file name with exactly one extension")]
    MalformedPath(PathBuf),

    #[error("Error in ffmpeg process")]
    Process(#[source] ProcessError),
}

impl RewriteError {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::MalformedPath(_) => ErrorCode::MALFORMED_PATH,
            Self::Process(e) => e.error_code(),
        }
    }
}

/// `/tmp/x.y/upload.mp4` becomes `/tmp/x.y/upload.processing.mp4`
///
/// Dots in parent directories don't matter, but the file name must split
/// into a non-empty stem and extension on exactly one '.'
pub(crate) fn processing_path(input: &Path) -> Result<PathBuf, RewriteError> {
    let malformed = || RewriteError::MalformedPath(input.to_path_buf());

    let file_name = input
        .file_name()
        .and_then(OsStr::to_str)
        .ok_or_else(malformed)?;

    let mut parts = file_name.split('.');

    let (Some(stem), Some(extension), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(malformed());
    };

    if stem.is_empty() || extension.is_empty() {
        return Err(malformed());
    }

    Ok(input.with_file_name(format!("{stem}.{PROCESSING_MARKER}.{extension}")))
}

#[derive(Clone, Debug)]
pub(crate) struct FfMpeg {
    command: Arc<str>,
    timeout: Duration,
}

impl FfMpeg {
    pub(crate) fn new(command: &str, timeout: Duration) -> Self {
        FfMpeg {
            command: Arc::from(command),
            timeout,
        }
    }
}

#[async_trait::async_trait(?Send)]
impl Rewrite for FfMpeg {
    #[tracing::instrument(skip(self))]
    async fn faststart(&self, input: &Path) -> Result<PathBuf, RewriteError> {
        let output = processing_path(input)?;

        let args: [&OsStr; 10] = [
            "-i".as_ref(),
            input.as_os_str(),
            "-c".as_ref(),
            "copy".as_ref(),
            "-movflags".as_ref(),
            "faststart".as_ref(),
            "-f".as_ref(),
            "mp4".as_ref(),
            "-y".as_ref(),
            output.as_os_str(),
        ];

        let res = match Process::run(&self.command, &args, self.timeout) {
            Ok(process) => process.wait().await,
            Err(e) => Err(e),
        };

        if let Err(e) = res {
            remove_partial(&output).await;

            return Err(RewriteError::Process(e));
        }

        Ok(output)
    }
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!("Failed to remove partial ffmpeg output {path:?}: {e}");
        }
    }
}
