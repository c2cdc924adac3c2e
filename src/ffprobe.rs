use std::{ffi::OsStr, path::Path, sync::Arc, time::Duration};

use crate::{
    error_code::ErrorCode,
    process::{Process, ProcessError},
};

/// Something that can read the display aspect ratio of a local media file
#[async_trait::async_trait(?Send)]
pub(crate) trait Probe: Send + Sync {
    async fn aspect_ratio(&self, path: &Path) -> Result<String, ProbeError>;
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ProbeError {
    #[error("Error in ffprobe process")]
    Process(#[source] ProcessError),

    #[error("Invalid ffprobe output")]
    Json(#[source] serde_json::Error),

    #[error("ffprobe reported no streams")]
    NoStreams,

    #[error("ffprobe reported an empty display aspect ratio")]
    EmptyAspectRatio,
}

impl ProbeError {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Process(e) => e.error_code(),
            Self::Json(_) | Self::NoStreams | Self::EmptyAspectRatio => ErrorCode::PROBE_OUTPUT,
        }
    }

    /// The process ran but told us something we couldn't use
    pub(crate) const fn is_parse_error(&self) -> bool {
        !matches!(self, Self::Process(_))
    }
}

#[derive(Debug, serde::Deserialize)]
struct FfProbeOutput {
    streams: Vec<FfProbeStream>,
}

#[derive(Debug, serde::Deserialize)]
struct FfProbeStream {
    #[serde(default)]
    display_aspect_ratio: Option<String>,
}

#[derive(Clone, Debug)]
pub(crate) struct FfProbe {
    command: Arc<str>,
    timeout: Duration,
}

impl FfProbe {
    pub(crate) fn new(command: &str, timeout: Duration) -> Self {
        FfProbe {
            command: Arc::from(command),
            timeout,
        }
    }
}

#[async_trait::async_trait(?Send)]
impl Probe for FfProbe {
    #[tracing::instrument(skip(self))]
    async fn aspect_ratio(&self, path: &Path) -> Result<String, ProbeError> {
        let args: [&OsStr; 6] = [
            "-v".as_ref(),
            "error".as_ref(),
            "-print_format".as_ref(),
            "json".as_ref(),
            "-show_streams".as_ref(),
            path.as_os_str(),
        ];

        let output = Process::run(&self.command, &args, self.timeout)
            .map_err(ProbeError::Process)?
            .output()
            .await
            .map_err(ProbeError::Process)?;

        parse_aspect_ratio(&output)
    }
}

fn parse_aspect_ratio(output: &[u8]) -> Result<String, ProbeError> {
    let output: FfProbeOutput = serde_json::from_slice(output).map_err(ProbeError::Json)?;

    let stream = output.streams.into_iter().next().ok_or(ProbeError::NoStreams)?;

    match stream.display_aspect_ratio {
        Some(ratio) if !ratio.is_empty() => Ok(ratio),
        _ => Err(ProbeError::EmptyAspectRatio),
    }
}
