//! Front-page link discovery and cover-image lookup.
//!
//! Paperboy starts from the newspaper's front page, collects article URLs
//! grouped by topic, and (optionally) locates today's printed cover on a
//! separate page. Discovery failures never abort a run: they degrade to an
//! empty [`LinkSet`].

mod parser;

use paperboy_shared::{LinkSet, PaperboyError, Result, SourceConfig};
use reqwest::Client;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Maximum response size we are willing to parse (10 MB).
const MAX_RESPONSE_SIZE: u64 = 10 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Main entry points
// ---------------------------------------------------------------------------

/// Fetch the configured front page and extract its article links.
///
/// Returns [`PaperboyError::DiscoveryEmpty`] when the page loads but no
/// selector matches.
#[instrument(skip_all, fields(url = %config.front_page_url))]
pub async fn discover(config: &SourceConfig, client: &Client) -> Result<LinkSet> {
    let page_url = parse_page_url(&config.front_page_url)?;

    info!("discovering article links");

    let html = fetch_page(client, &page_url).await?;
    let links = parser::parse_links(&html, &page_url, config)?;

    if links.is_empty() {
        return Err(PaperboyError::DiscoveryEmpty {
            source_url: page_url.to_string(),
        });
    }

    info!(
        groups = links.group_count(),
        links = links.len(),
        "front page links discovered"
    );

    Ok(links)
}

/// Like [`discover`], but any failure becomes an empty [`LinkSet`].
pub async fn discover_or_empty(config: &SourceConfig, client: &Client) -> LinkSet {
    match discover(config, client).await {
        Ok(links) => links,
        Err(e) => {
            warn!(error = %e, "link discovery failed, continuing with no articles");
            LinkSet::new()
        }
    }
}

/// Locate the cover image URL, if a cover page is configured.
#[instrument(skip_all)]
pub async fn find_cover_url(config: &SourceConfig, client: &Client) -> Result<Option<String>> {
    let Some(cover_page) = config.cover_page_url.as_deref() else {
        info!("no cover page configured, building without cover");
        return Ok(None);
    };

    let page_url = parse_page_url(cover_page)?;
    let html = fetch_page(client, &page_url).await?;
    let cover = parser::parse_cover(&html, &page_url, &config.cover_selector)?;

    match &cover {
        Some(url) => info!(%url, "cover image located"),
        None => debug!(selector = %config.cover_selector, "cover selector matched nothing"),
    }

    Ok(cover)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_page_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| PaperboyError::validation(format!("invalid page URL '{raw}': {e}")))
}

/// GET a page and return its body as text.
async fn fetch_page(client: &Client, url: &Url) -> Result<String> {
    let response = client
        .get(url.as_str())
        .send()
        .await
        .map_err(|e| PaperboyError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(PaperboyError::Network(format!("{url}: HTTP {status}")));
    }

    if let Some(len) = response.content_length() {
        if len > MAX_RESPONSE_SIZE {
            return Err(PaperboyError::validation(format!(
                "{url}: response too large ({len} bytes, max {MAX_RESPONSE_SIZE})"
            )));
        }
    }

    response
        .text()
        .await
        .map_err(|e| PaperboyError::Network(format!("{url}: failed to read body: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> SourceConfig {
        SourceConfig {
            front_page_url: format!("{}/fsp", server.uri()),
            allowed_domains: vec![],
            section_selector: None,
            section_title_selector: None,
            link_selector: ".c-channel__headline".into(),
            default_group: "Headlines".into(),
            cover_page_url: Some(format!("{}/digital/", server.uri())),
            cover_selector: ".edition".into(),
        }
    }

    #[tokio::test]
    async fn test_discover_with_mock_server() {
        let server = MockServer::start().await;

        let page = r#"<html><body>
            <h2 class="c-channel__headline"><a href="/poder/1.shtml">One</a></h2>
            <h2 class="c-channel__headline"><a href="/esporte/2.shtml">Two</a></h2>
        </body></html>"#;

        Mock::given(method("GET"))
            .and(path("/fsp"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page))
            .mount(&server)
            .await;

        let links = discover(&config_for(&server), &Client::new()).await.unwrap();
        let urls = &links.group("Headlines").unwrap().urls;
        assert_eq!(urls.len(), 2);
        assert!(urls[0].ends_with("/poder/1.shtml"));
        assert!(urls[1].ends_with("/esporte/2.shtml"));
    }

    #[tokio::test]
    async fn test_discover_zero_matches_is_discovery_empty() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/fsp"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body></body></html>"))
            .mount(&server)
            .await;

        let err = discover(&config_for(&server), &Client::new()).await.unwrap_err();
        assert!(matches!(err, PaperboyError::DiscoveryEmpty { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_page_degrades_to_empty() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/fsp"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let links = discover_or_empty(&config_for(&server), &Client::new()).await;
        assert!(links.is_empty());
    }

    #[tokio::test]
    async fn test_find_cover_url() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/digital/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<div class="edition"><img src="https://img.example.com/capa.jpg"></div>"#,
            ))
            .mount(&server)
            .await;

        let cover = find_cover_url(&config_for(&server), &Client::new()).await.unwrap();
        assert_eq!(cover.as_deref(), Some("https://img.example.com/capa.jpg"));
    }

    #[tokio::test]
    async fn test_no_cover_page_configured() {
        let server = MockServer::start().await;
        let config = SourceConfig {
            cover_page_url: None,
            ..config_for(&server)
        };
        assert!(find_cover_url(&config, &Client::new()).await.unwrap().is_none());
    }
}
