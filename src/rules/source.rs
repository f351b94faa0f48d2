use crate::config::filters::FilterRules;
use crate::rules::errors::PullError;
use crate::rules::store::RuleOrigin;
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

/// Produces raw rule payload bytes on demand.
#[async_trait]
pub trait RuleSource: Send + Sync {
    fn origin(&self) -> RuleOrigin;

    /// A static source always yields the same bytes, so it is pulled once.
    fn is_static(&self) -> bool {
        false
    }

    async fn pull(&self, query: &str) -> Result<Vec<u8>, PullError>;
}

/// Rules taken from local configuration.
#[derive(Debug, Clone)]
pub struct LocalSource {
    payload: Vec<u8>,
}

impl LocalSource {
    #[must_use]
    pub fn new(filters: &FilterRules) -> Self {
        LocalSource {
            payload: json!({ "filters": filters }).to_string().into_bytes(),
        }
    }

    #[must_use]
    pub fn from_bytes(payload: Vec<u8>) -> Self {
        LocalSource { payload }
    }
}

#[async_trait]
impl RuleSource for LocalSource {
    fn origin(&self) -> RuleOrigin {
        RuleOrigin::Local
    }

    fn is_static(&self) -> bool {
        true
    }

    async fn pull(&self, _query: &str) -> Result<Vec<u8>, PullError> {
        Ok(self.payload.clone())
    }
}

/// Rules fetched with `GET <url>?<query>` from a control plane.
#[derive(Debug, Clone)]
pub struct RemoteSource {
    client: reqwest::Client,
    url: String,
}

impl RemoteSource {
    #[must_use]
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        RemoteSource {
            client,
            url: url.into(),
        }
    }

    fn request_url(&self, query: &str) -> String {
        let query = query.trim_start_matches('?');
        if query.is_empty() {
            self.url.clone()
        } else if self.url.contains('?') {
            format!("{}&{query}", self.url)
        } else {
            format!("{}?{query}", self.url)
        }
    }
}

#[async_trait]
impl RuleSource for RemoteSource {
    fn origin(&self) -> RuleOrigin {
        RuleOrigin::Remote
    }

    async fn pull(&self, query: &str) -> Result<Vec<u8>, PullError> {
        let url = self.request_url(query);
        debug!("RULES | pulling rules from {url}");

        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PullError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.bytes().await?.to_vec())
    }
}
