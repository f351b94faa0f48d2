pub mod filters;
pub mod log_level;

use std::path::{Path, PathBuf};

use figment::providers::{Format, Yaml};
use figment::{providers::Env, Figment};
use serde::Deserialize;

use crate::config::{
    filters::{deserialize_filters, FilterRules},
    log_level::LogLevel,
};

pub const CONFIG_FILE_NAME: &str = "pointfilter.yaml";

/// `YamlConfig` holds the nested sections of `pointfilter.yaml` that have no flat equivalent.
#[derive(Debug, PartialEq, Deserialize, Clone, Default)]
#[serde(default)]
#[allow(clippy::module_name_repetitions)]
pub struct YamlConfig {
    pub proxy: YamlProxyConfig,
}

#[derive(Debug, PartialEq, Deserialize, Clone, Default)]
#[serde(default)]
#[allow(clippy::module_name_repetitions)]
pub struct YamlProxyConfig {
    pub https: Option<String>,
    pub no_proxy: Option<Vec<String>>,
}

#[derive(Debug, PartialEq, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub log_level: LogLevel,
    /// Rules used when no `pull_url` is configured.
    #[serde(deserialize_with = "deserialize_filters")]
    pub filters: FilterRules,
    /// Control-plane endpoint serving `{"filters": ..., "pull_interval": ...}`.
    pub pull_url: Option<String>,
    pub pull_query: String,
    pub pull_interval_secs: u64,
    /// Follow the `pull_interval` hint returned by the remote source.
    pub honor_pull_interval: bool,
    pub pull_timeout_secs: u64,
    /// When set, every fetched payload is persisted to `<data_dir>/.pull`.
    pub data_dir: Option<PathBuf>,
    pub https_proxy: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: LogLevel::default(),
            filters: FilterRules::new(),
            pull_url: None,
            pull_query: "filters=true".to_string(),
            pull_interval_secs: 30,
            honor_pull_interval: true,
            pull_timeout_secs: 10,
            data_dir: None,
            https_proxy: None,
        }
    }
}

#[derive(Debug, PartialEq, thiserror::Error)]
#[allow(clippy::module_name_repetitions)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    ParseError(String),
    #[error("unsupported value for field {0}")]
    UnsupportedField(String),
}

#[allow(clippy::module_name_repetitions)]
pub fn get_config(config_directory: &Path) -> Result<Config, ConfigError> {
    let path = config_directory.join(CONFIG_FILE_NAME);

    let figment = Figment::new()
        .merge(Yaml::file(&path))
        .merge(Env::prefixed("POINTFILTER_"))
        .merge(Env::prefixed("PF_"))
        .merge(Env::raw().only(&["HTTPS_PROXY"]));

    let yaml_figment = Figment::from(Yaml::file(&path));

    let (mut config, yaml_config): (Config, YamlConfig) =
        match (figment.extract(), yaml_figment.extract()) {
            (Ok(env_config), Ok(yaml_config)) => (env_config, yaml_config),
            (_, Err(err)) | (Err(err), _) => {
                tracing::error!("CONFIG | Failed to parse config: {err}");
                return Err(ConfigError::ParseError(err.to_string()));
            }
        };

    if let Some(url) = config.pull_url.as_deref() {
        let url = url.trim();
        if url.is_empty() {
            config.pull_url = None;
        } else if !(url.starts_with("http://") || url.starts_with("https://")) {
            tracing::error!("CONFIG | pull_url must be an http(s) URL, got {url}");
            return Err(ConfigError::UnsupportedField("pull_url".to_string()));
        }
    }

    // Prefer PF_PROXY_HTTPS, then proxy.https from yaml, then HTTPS_PROXY
    if let Ok(https_proxy) = std::env::var("PF_PROXY_HTTPS").or_else(|_| {
        yaml_config
            .proxy
            .https
            .clone()
            .ok_or(std::env::VarError::NotPresent)
    }) {
        config.https_proxy = Some(https_proxy);
    }

    if let Some(host) = config.pull_url.as_deref().and_then(pull_host) {
        if std::env::var("NO_PROXY").is_ok_and(|no_proxy| no_proxy.contains(&host))
            || yaml_config
                .proxy
                .no_proxy
                .is_some_and(|no_proxy| no_proxy.contains(&host))
        {
            config.https_proxy = None;
        }
    }

    Ok(config)
}

fn pull_host(url: &str) -> Option<String> {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(ToString::to_string))
}
