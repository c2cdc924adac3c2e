use clap::Parser;
use std::path::Path;
use url::Url;

mod commandline;
mod defaults;
mod file;
mod primitives;

use commandline::{Args, ConfigFormat, Output};
use config::Config;
use defaults::Defaults;

pub(crate) use file::{ConfigFile as Configuration, Repo, Sled, Tracing};
pub(crate) use primitives::{Filesystem, LogFormat, ObjectStorage, ProbeFailure, Store};

pub(crate) fn configure_without_clap<P: AsRef<Path>, Q: AsRef<Path>>(
    config_file: Option<P>,
    save_to: Option<Q>,
) -> color_eyre::Result<Configuration> {
    build(config_file, None, save_to)
}

pub(crate) fn configure() -> color_eyre::Result<Configuration> {
    let Output {
        config_format,
        config_file,
        save_to,
    } = Args::parse().into_output();

    build(config_file, Some(&config_format), save_to)
}

fn build<P: AsRef<Path>, Q: AsRef<Path>>(
    config_file: Option<P>,
    overrides: Option<&ConfigFormat>,
    save_to: Option<Q>,
) -> color_eyre::Result<Configuration> {
    let config = Config::builder().add_source(config::Config::try_from(&Defaults::default())?);

    let config = if let Some(config_file) = config_file {
        config.add_source(config::File::from(config_file.as_ref()))
    } else {
        config
    };

    let config = config.add_source(config::Environment::with_prefix("TUBELY").separator("__"));

    let config = if let Some(overrides) = overrides {
        config.add_source(config::Config::try_from(overrides)?)
    } else {
        config
    };

    let mut config: Configuration = config.build()?.try_deserialize()?;
    config.server.public_url = with_trailing_slash(config.server.public_url);

    if let Some(save_to) = save_to {
        let output = toml::to_string_pretty(&config)?;
        std::fs::write(save_to, output)?;
    }

    Ok(config)
}

/// Urls are joined onto `public_url`, which drops its last segment unless it ends in '/'
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    url
}

#[cfg(test)]
mod tests {
    use super::{configure_without_clap, with_trailing_slash, ProbeFailure, Store};
    use std::path::PathBuf;

    #[test]
    fn defaults_deserialize() {
        let config = configure_without_clap(None::<PathBuf>, None::<PathBuf>)
            .expect("defaults are valid");

        assert_eq!(config.media.max_file_size, 1024 * 1024 * 1024);
        assert_eq!(config.media.process_timeout, 30);
        assert_eq!(config.media.probe_failure, ProbeFailure::Degrade);
        assert_eq!(config.server.address.port(), 8091);
        assert!(matches!(config.store, Store::Filesystem(_)));
    }

    #[test]
    fn public_url_keeps_its_path_prefix() {
        let url = with_trailing_slash("https://example.com/tubely".parse().expect("valid url"));
        assert_eq!(
            url.join("assets/a.png").expect("joined").as_str(),
            "https://example.com/tubely/assets/a.png"
        );

        let url = with_trailing_slash("https://example.com/tubely/".parse().expect("valid url"));
        assert_eq!(url.as_str(), "https://example.com/tubely/");

        let url = with_trailing_slash("http://localhost:8091".parse().expect("valid url"));
        assert_eq!(url.as_str(), "http://localhost:8091/");
    }

    #[test]
    fn configured_public_url_is_normalized() {
        let dir = std::env::temp_dir().join(format!("tubely-config-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).expect("created dir");

        let config_file = dir.join("tubely.toml");
        std::fs::write(
            &config_file,
            "[server]\npublic_url = \"https://example.com/tubely\"\n",
        )
        .expect("wrote config");

        let config = configure_without_clap(Some(&config_file), None::<PathBuf>)
            .expect("config is valid");

        assert_eq!(config.server.public_url.as_str(), "https://example.com/tubely/");

        std::fs::remove_dir_all(dir).expect("removed dir");
    }
}
