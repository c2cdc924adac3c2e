use clap::ValueEnum;
use std::{fmt::Display, path::PathBuf, str::FromStr};
use url::Url;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Deserialize,
    serde::Serialize,
    ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub(crate) enum LogFormat {
    Compact,
    Json,
    Normal,
    Pretty,
}

/// What to do with an upload when ffprobe can't tell us its aspect ratio
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize, ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ProbeFailure {
    /// Store the video under the `other` prefix
    Degrade,
    /// Fail the upload
    Reject,
}

#[derive(Clone, Debug)]
pub(crate) struct Targets {
    pub(crate) targets: tracing_subscriber::filter::Targets,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub(crate) enum Store {
    Filesystem(Filesystem),

    ObjectStorage(ObjectStorage),
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize, clap::Parser)]
#[serde(rename_all = "snake_case")]
pub(crate) struct Filesystem {
    /// The directory uploaded videos are written to
    #[arg(short, long)]
    pub(crate) path: PathBuf,

    /// The name recorded as the container part of video locators
    #[arg(short, long)]
    pub(crate) container: String,

    /// The secret used to sign retrieval urls
    #[arg(short, long)]
    pub(crate) signing_secret: String,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize, clap::Parser)]
#[serde(rename_all = "snake_case")]
pub(crate) struct ObjectStorage {
    /// The base endpoint for the object storage, for S3-compatible providers
    ///
    /// Examples:
    /// - `http://localhost:9000`
    /// - `https://s3.dualstack.eu-west-1.amazonaws.com`
    #[arg(short, long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) endpoint: Option<Url>,

    /// The bucket uploads are written to
    #[arg(short, long)]
    pub(crate) bucket_name: String,

    /// The region the bucket is located in
    #[arg(short, long)]
    pub(crate) region: String,

    /// Use path-style urls instead of virtual-hosted urls
    #[arg(long)]
    #[serde(default)]
    pub(crate) use_path_style: bool,

    /// Allow plain http endpoints
    #[arg(long)]
    #[serde(default)]
    pub(crate) allow_http: bool,

    /// The access key, falls back to the AWS environment when absent
    #[arg(short, long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) access_key: Option<String>,

    /// The secret key, falls back to the AWS environment when absent
    #[arg(short, long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) secret_key: Option<String>,

    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) session_token: Option<String>,
}

impl FromStr for Targets {
    type Err = <tracing_subscriber::filter::Targets as FromStr>::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Targets {
            targets: s.parse()?,
        })
    }
}

impl Display for Targets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let targets = self
            .targets
            .iter()
            .map(|(path, level)| format!("{path}={level}"))
            .collect::<Vec<_>>()
            .join(",");

        match (self.targets.default_level(), targets.is_empty()) {
            (Some(level), true) => write!(f, "{}", level.to_string().to_lowercase()),
            (Some(level), false) => write!(f, "{},{targets}", level.to_string().to_lowercase()),
            (None, _) => write!(f, "{targets}"),
        }
    }
}

impl serde::Serialize for Targets {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Targets {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        s.parse().map_err(serde::de::Error::custom)
    }
}

impl Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.to_possible_value()
            .expect("no values are skipped")
            .get_name()
            .fmt(f)
    }
}

impl Display for ProbeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.to_possible_value()
            .expect("no values are skipped")
            .get_name()
            .fmt(f)
    }
}
