use crate::config;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

#[must_use]
pub fn get_client(config: Arc<config::Config>) -> reqwest::Client {
    match build_client(&config) {
        Ok(client) => client,
        Err(e) => {
            error!(
                "Unable to parse proxy configuration: {}, no proxy will be used",
                e
            );
            reqwest::Client::builder()
                .timeout(Duration::from_secs(config.pull_timeout_secs))
                .build()
                .unwrap_or_default()
        }
    }
}

fn build_client(config: &config::Config) -> Result<reqwest::Client, reqwest::Error> {
    let client = reqwest::Client::builder().timeout(Duration::from_secs(config.pull_timeout_secs));
    // This covers PF_PROXY_HTTPS and HTTPS_PROXY
    if let Some(https_uri) = &config.https_proxy {
        let proxy = reqwest::Proxy::https(https_uri.clone())?;
        client.proxy(proxy).build()
    } else {
        client.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_proxy_falls_back() {
        let config = Arc::new(config::Config {
            https_proxy: Some("::not a proxy::".to_string()),
            ..config::Config::default()
        });
        // Must not panic; the client is usable without a proxy.
        let _client = get_client(config);
    }

    #[test]
    fn test_build_with_proxy() {
        let config = config::Config {
            https_proxy: Some("http://my-proxy:3128".to_string()),
            ..config::Config::default()
        };
        assert!(build_client(&config).is_ok());
    }
}
