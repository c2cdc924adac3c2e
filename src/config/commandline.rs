use crate::config::primitives::{Filesystem, LogFormat, ObjectStorage, ProbeFailure, Targets};
use clap::{Parser, Subcommand};
use std::{net::SocketAddr, path::PathBuf};
use url::Url;

impl Args {
    pub(super) fn into_output(self) -> Output {
        let Args {
            config_file,
            log_format,
            log_targets,
            opentelemetry_url,
            opentelemetry_service_name,
            opentelemetry_targets,
            save_to,
            command,
        } = self;

        let tracing = Tracing {
            logging: Logging {
                format: log_format,
                targets: log_targets,
            },
            opentelemetry: OpenTelemetry {
                url: opentelemetry_url,
                service_name: opentelemetry_service_name,
                targets: opentelemetry_targets,
            },
        };

        let Some(Command::Run(Run {
            address,
            temporary_directory,
            assets_root,
            public_url,
            jwt_secret,
            metrics_prometheus_address,
            media_max_file_size,
            media_process_timeout,
            media_probe_failure,
            media_ffprobe_path,
            media_ffmpeg_path,
            repo_path,
            repo_cache_capacity,
            store,
        })) = command
        else {
            return Output {
                config_format: ConfigFormat {
                    tracing,
                    ..Default::default()
                },
                config_file,
                save_to,
            };
        };

        let server = Server {
            address,
            temporary_directory,
            assets_root,
            public_url,
        };

        let auth = Auth { jwt_secret };

        let metrics = Metrics {
            prometheus_address: metrics_prometheus_address,
        };

        let media = Media {
            max_file_size: media_max_file_size,
            process_timeout: media_process_timeout,
            probe_failure: media_probe_failure,
            ffprobe_path: media_ffprobe_path,
            ffmpeg_path: media_ffmpeg_path,
        };

        let repo = Sled {
            path: repo_path,
            cache_capacity: repo_cache_capacity,
        }
        .set();

        let store = store.map(|store| match store {
            RunStore::Filesystem(filesystem) => Store::Filesystem(filesystem),
            RunStore::ObjectStorage(object_storage) => Store::ObjectStorage(object_storage),
        });

        Output {
            config_format: ConfigFormat {
                server,
                auth,
                tracing,
                metrics,
                media,
                repo,
                store,
            },
            config_file,
            save_to,
        }
    }
}

pub(super) struct Output {
    pub(super) config_format: ConfigFormat,
    pub(super) config_file: Option<PathBuf>,
    pub(super) save_to: Option<PathBuf>,
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub(super) struct ConfigFormat {
    server: Server,
    auth: Auth,
    tracing: Tracing,
    metrics: Metrics,
    media: Media,
    #[serde(skip_serializing_if = "Option::is_none")]
    repo: Option<Repo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    store: Option<Store>,
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct Server {
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<SocketAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temporary_directory: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    assets_root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    public_url: Option<Url>,
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct Auth {
    #[serde(skip_serializing_if = "Option::is_none")]
    jwt_secret: Option<String>,
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct Tracing {
    logging: Logging,
    opentelemetry: OpenTelemetry,
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct Logging {
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<LogFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    targets: Option<Targets>,
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct OpenTelemetry {
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    service_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    targets: Option<Targets>,
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct Metrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    prometheus_address: Option<SocketAddr>,
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct Media {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_file_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    process_timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    probe_failure: Option<ProbeFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ffprobe_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ffmpeg_path: Option<String>,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
enum Repo {
    Sled(Sled),
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct Sled {
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_capacity: Option<u64>,
}

impl Sled {
    fn set(self) -> Option<Repo> {
        let any_set = self.path.is_some() || self.cache_capacity.is_some();

        if any_set {
            Some(Repo::Sled(self))
        } else {
            None
        }
    }
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
enum Store {
    Filesystem(Filesystem),
    ObjectStorage(ObjectStorage),
}

/// Run the tubely video upload server
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub(super) struct Args {
    /// Path to the tubely configuration file
    #[arg(short, long)]
    config_file: Option<PathBuf>,

    /// Format of logs printed to stdout
    #[arg(long)]
    log_format: Option<LogFormat>,
    /// Log levels to print to stdout, respects RUST_LOG formatting
    #[arg(long)]
    log_targets: Option<Targets>,

    /// URL to send OpenTelemetry metrics
    #[arg(long)]
    opentelemetry_url: Option<Url>,
    /// Service Name to use for OpenTelemetry
    #[arg(long)]
    opentelemetry_service_name: Option<String>,
    /// Log levels to use for OpenTelemetry, respects RUST_LOG formatting
    #[arg(long)]
    opentelemetry_targets: Option<Targets>,

    /// File to save the current configuration for reproducible runs
    #[arg(long)]
    save_to: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Runs the tubely web server
    Run(Run),
}

#[derive(Debug, Parser)]
struct Run {
    /// The address and port to bind the tubely web server
    #[arg(short, long)]
    address: Option<SocketAddr>,

    /// The path in which tubely keeps uploads while they are being processed
    #[arg(long)]
    temporary_directory: Option<PathBuf>,

    /// The directory thumbnails are written to
    #[arg(long)]
    assets_root: Option<PathBuf>,

    /// The externally reachable url of this server
    #[arg(long)]
    public_url: Option<Url>,

    /// The secret bearer tokens are signed with
    #[arg(long)]
    jwt_secret: Option<String>,

    /// Address and port to expose tubely metrics
    #[arg(long)]
    metrics_prometheus_address: Option<SocketAddr>,

    /// The maximum size, in bytes, of an uploaded video
    #[arg(long)]
    media_max_file_size: Option<usize>,
    /// Timeout, in seconds, for ffprobe and ffmpeg invocations
    #[arg(long)]
    media_process_timeout: Option<u64>,
    /// Whether a failed aspect ratio probe stores the video as `other` or rejects it
    #[arg(long)]
    media_probe_failure: Option<ProbeFailure>,
    /// The ffprobe executable
    #[arg(long)]
    media_ffprobe_path: Option<String>,
    /// The ffmpeg executable
    #[arg(long)]
    media_ffmpeg_path: Option<String>,

    /// The path to the sled video database
    #[arg(long)]
    repo_path: Option<PathBuf>,
    /// The cache capacity, in bytes, allowed to sled for in-memory operations
    #[arg(long)]
    repo_cache_capacity: Option<u64>,

    #[command(subcommand)]
    store: Option<RunStore>,
}

/// Configure the store uploaded videos are published to
#[derive(Debug, Subcommand)]
enum RunStore {
    /// Publish videos to the local filesystem
    Filesystem(Filesystem),

    /// Publish videos to an S3-compatible object storage
    ObjectStorage(ObjectStorage),
}
