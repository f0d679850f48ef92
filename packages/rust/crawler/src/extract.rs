//! Client for the readable-text extraction service.
//!
//! The service takes an article URL as a query parameter and answers with a
//! JSON object (`att_title`, `att_body`, `att_type`, `att_lang`). Every
//! problem is folded into [`FetchResult::Failed`] so one bad URL never takes
//! the batch down.

use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use paperboy_shared::{
    Article, ExtractionConfig, FetchFailure, FetchResult, PaperboyError, Result,
};

/// Raw extraction response. Absent or null fields become empty strings.
#[derive(Debug, Default, Deserialize)]
struct ExtractionResponse {
    #[serde(default)]
    att_title: Option<String>,
    #[serde(default)]
    att_body: Option<String>,
    #[serde(default)]
    att_type: Option<String>,
    #[serde(default)]
    att_lang: Option<String>,
}

/// Calls the extraction endpoint, one request per article.
#[derive(Debug, Clone)]
pub struct ExtractionClient {
    client: Client,
    endpoint: Url,
    extra_query: Vec<(String, String)>,
    accept_language: String,
}

impl ExtractionClient {
    pub fn new(client: Client, config: &ExtractionConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            PaperboyError::config(format!(
                "invalid extraction endpoint '{}': {e}",
                config.endpoint
            ))
        })?;

        Ok(Self {
            client,
            endpoint,
            extra_query: config
                .extra_query
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            accept_language: config.accept_language.clone(),
        })
    }

    /// Fetch one article. Always yields exactly one [`FetchResult`].
    pub async fn fetch(&self, url: &str, group: &str, position: usize) -> FetchResult {
        match self.request(url).await {
            Ok(parsed) => {
                let title = parsed.att_title.unwrap_or_default().trim().to_string();
                FetchResult::Fetched(Article {
                    url: url.to_string(),
                    group: group.to_string(),
                    position,
                    title: if title.is_empty() { url.to_string() } else { title },
                    body: parsed.att_body.unwrap_or_default(),
                    body_type: parsed.att_type.unwrap_or_default(),
                    language: parsed.att_lang.unwrap_or_default(),
                })
            }
            Err(e) => FetchResult::Failed(FetchFailure {
                group: group.to_string(),
                url: url.to_string(),
                position,
                cause: e.to_string(),
            }),
        }
    }

    async fn request(&self, url: &str) -> Result<ExtractionResponse> {
        debug!(%url, "requesting extraction");

        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&self.extra_query)
            .query(&[("url", url)])
            .header(ACCEPT, "application/json, text/plain, */*")
            .header(ACCEPT_LANGUAGE, self.accept_language.as_str())
            .send()
            .await
            .map_err(|e| PaperboyError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PaperboyError::Network(format!("{url}: HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| PaperboyError::Network(format!("{url}: body read failed: {e}")))?;

        let malformed = |message: String| PaperboyError::MalformedResponse {
            url: url.to_string(),
            message,
        };

        let value: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| malformed(e.to_string()))?;
        if !value.is_object() {
            return Err(malformed("expected a JSON object".into()));
        }

        serde_json::from_value(value).map_err(|e| malformed(e.to_string()))
    }
}
