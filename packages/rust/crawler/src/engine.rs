//! Concurrent fetch coordinator.
//!
//! Fans out one task per article URL across every group at once, paces
//! request starts with a [`RateLimiter`], bounds in-flight requests with a
//! semaphore, and fans results back in through one slot per URL. Slots are
//! awaited in input order, so the number of results always equals the number
//! of launched tasks and completion order never leaks into the output.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use paperboy_shared::{
    ArticleGroup, FetchConfig, FetchFailure, FetchResult, LinkSet, PaperboyError,
};

use crate::extract::ExtractionClient;
use crate::rate_limit::RateLimiter;

// ---------------------------------------------------------------------------
// FetchReport
// ---------------------------------------------------------------------------

/// Summary of a completed fetch run.
#[derive(Debug, Clone)]
pub struct FetchReport {
    /// One entry per LinkSet group, in LinkSet order; possibly empty.
    pub groups: Vec<ArticleGroup>,
    /// Articles that could not be fetched.
    pub failures: Vec<FetchFailure>,
    /// Number of fetch tasks launched (= total URLs).
    pub launched: usize,
    /// Total duration of the run.
    pub duration: Duration,
}

impl FetchReport {
    /// Number of articles fetched successfully.
    pub fn fetched(&self) -> usize {
        self.groups.iter().map(|g| g.articles.len()).sum()
    }
}

/// Receives per-article progress notifications.
pub trait FetchObserver: Send + Sync {
    /// Called once per URL as its result is collected.
    fn article_done(&self, url: &str, fetched: bool, collected: usize, total: usize);
}

// ---------------------------------------------------------------------------
// FetchCoordinator
// ---------------------------------------------------------------------------

/// One launched fetch and the identity of the URL it belongs to.
struct Slot {
    group: String,
    url: String,
    position: usize,
    handle: JoinHandle<FetchResult>,
}

/// Fetches every URL of a [`LinkSet`] through the extraction service.
pub struct FetchCoordinator {
    extractor: Arc<ExtractionClient>,
    limiter: Arc<RateLimiter>,
    semaphore: Arc<Semaphore>,
    timeout: Duration,
}

impl FetchCoordinator {
    pub fn new(extractor: ExtractionClient, config: &FetchConfig) -> Self {
        Self {
            extractor: Arc::new(extractor),
            limiter: Arc::new(RateLimiter::new(config.rate_limit)),
            semaphore: Arc::new(Semaphore::new(config.concurrency.max(1) as usize)),
            timeout: config.timeout,
        }
    }

    /// Fetch all URLs and return one result per URL, in LinkSet order.
    pub async fn fetch_all(&self, links: &LinkSet) -> Vec<FetchResult> {
        self.fetch_all_observed(links, None).await
    }

    /// [`fetch_all`](Self::fetch_all) with progress notifications.
    pub async fn fetch_all_observed(
        &self,
        links: &LinkSet,
        observer: Option<&dyn FetchObserver>,
    ) -> Vec<FetchResult> {
        let total = links.len();
        let mut slots: Vec<Slot> = Vec::with_capacity(total);

        for group in links.groups() {
            for (position, url) in group.urls.iter().enumerate() {
                slots.push(self.launch(&group.name, url, position));
            }
        }

        debug!(launched = slots.len(), "all fetch tasks launched");

        let mut results = Vec::with_capacity(slots.len());
        for (i, slot) in slots.into_iter().enumerate() {
            let result = match slot.handle.await {
                Ok(result) => result,
                Err(e) => FetchResult::Failed(FetchFailure {
                    group: slot.group,
                    url: slot.url,
                    position: slot.position,
                    cause: format!("fetch task aborted: {e}"),
                }),
            };

            if let Some(observer) = observer {
                observer.article_done(result.url(), result.is_fetched(), i + 1, total);
            }
            results.push(result);
        }

        results
    }

    /// Fetch all URLs and regroup successes per group, keeping input order.
    #[instrument(skip_all, fields(groups = links.group_count(), urls = links.len()))]
    pub async fn run(&self, links: &LinkSet, observer: Option<&dyn FetchObserver>) -> FetchReport {
        let start = Instant::now();

        info!(
            concurrency = self.semaphore.available_permits(),
            rate_limit_ms = self.limiter.interval().as_millis() as u64,
            "starting article fetch"
        );

        let results = self.fetch_all_observed(links, observer).await;
        let launched = results.len();

        let mut results = results.into_iter();
        let mut groups = Vec::with_capacity(links.group_count());
        let mut failures = Vec::new();

        for group in links.groups() {
            let mut articles = Vec::new();
            for result in results.by_ref().take(group.urls.len()) {
                match result {
                    FetchResult::Fetched(article) => articles.push(article),
                    FetchResult::Failed(failure) => {
                        let error = PaperboyError::from(failure.clone());
                        warn!(group = %failure.group, %error, "article fetch failed");
                        failures.push(failure);
                    }
                }
            }
            articles.sort_by_key(|a| a.position);

            if articles.is_empty() {
                warn!(group = %group.name, "no article fetched for group");
            }

            groups.push(ArticleGroup {
                name: group.name.clone(),
                articles,
            });
        }

        let report = FetchReport {
            groups,
            failures,
            launched,
            duration: start.elapsed(),
        };

        info!(
            launched = report.launched,
            fetched = report.fetched(),
            failed = report.failures.len(),
            duration_ms = report.duration.as_millis(),
            "article fetch completed"
        );

        report
    }

    /// Spawn the fetch for one URL.
    fn launch(&self, group: &str, url: &str, position: usize) -> Slot {
        let extractor = self.extractor.clone();
        let limiter = self.limiter.clone();
        let semaphore = self.semaphore.clone();
        let timeout = self.timeout;
        let group_owned = group.to_string();
        let url_owned = url.to_string();

        let handle = tokio::spawn(async move {
            let failed = |cause: String| {
                FetchResult::Failed(FetchFailure {
                    group: group_owned.clone(),
                    url: url_owned.clone(),
                    position,
                    cause,
                })
            };

            let Ok(_permit) = semaphore.acquire_owned().await else {
                return failed("fetch pool closed".into());
            };
            limiter.acquire().await;

            debug!(url = %url_owned, group = %group_owned, "fetching article");

            match tokio::time::timeout(timeout, extractor.fetch(&url_owned, &group_owned, position))
                .await
            {
                Ok(result) => result,
                Err(_) => failed(format!("timed out after {}ms", timeout.as_millis())),
            }
        });

        Slot {
            group: group.to_string(),
            url: url.to_string(),
            position,
            handle,
        }
    }
}

#[cfg(test)]
mod coordinator_tests {
    use super::*;
    use std::sync::Mutex;

    use paperboy_shared::ExtractionConfig;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn url(name: &str) -> String {
        format!("https://news.example.com/{name}")
    }

    async fn mount_article(server: &MockServer, name: &str, title: &str, delay_ms: u64) {
        Mock::given(method("GET"))
            .and(query_param("url", url(name).as_str()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({
                        "att_title": title,
                        "att_body": format!("<p>{title}</p>"),
                        "att_type": "text/html",
                        "att_lang": "pt",
                    }))
                    .set_delay(Duration::from_millis(delay_ms)),
            )
            .mount(server)
            .await;
    }

    async fn mount_failure(server: &MockServer, name: &str, status: u16) {
        Mock::given(method("GET"))
            .and(query_param("url", url(name).as_str()))
            .respond_with(ResponseTemplate::new(status))
            .mount(server)
            .await;
    }

    fn coordinator(server: &MockServer, config: FetchConfig) -> FetchCoordinator {
        let extraction = ExtractionConfig {
            endpoint: format!("{}/send.php", server.uri()),
            ..ExtractionConfig::default()
        };
        let extractor = ExtractionClient::new(reqwest::Client::new(), &extraction).unwrap();
        FetchCoordinator::new(extractor, &config)
    }

    fn fast_config() -> FetchConfig {
        FetchConfig {
            concurrency: 8,
            rate_limit: Duration::ZERO,
            timeout: Duration::from_secs(10),
        }
    }

    fn titles(group: &ArticleGroup) -> Vec<&str> {
        group.articles.iter().map(|a| a.title.as_str()).collect()
    }

    #[tokio::test]
    async fn test_one_result_per_url() {
        let server = MockServer::start().await;
        mount_article(&server, "u1", "A", 0).await;
        mount_failure(&server, "u2", 500).await;
        mount_article(&server, "u3", "C", 0).await;
        mount_failure(&server, "u4", 404).await;

        let links: LinkSet = [
            ("Sports", vec![url("u1"), url("u2")]),
            ("Politics", vec![url("u3"), url("u4")]),
        ]
        .into_iter()
        .collect();

        let results = coordinator(&server, fast_config()).fetch_all(&links).await;

        assert_eq!(results.len(), links.len());
        let urls: Vec<&str> = results.iter().map(|r| r.url()).collect();
        assert_eq!(urls, [url("u1"), url("u2"), url("u3"), url("u4")]);
        assert_eq!(results.iter().filter(|r| r.is_fetched()).count(), 2);
    }

    #[tokio::test]
    async fn test_order_survives_reversed_completion() {
        let server = MockServer::start().await;
        // Earlier URLs answer later.
        mount_article(&server, "u1", "A", 400).await;
        mount_article(&server, "u2", "B", 250).await;
        mount_article(&server, "u3", "C", 100).await;
        mount_article(&server, "u4", "D", 0).await;

        let links: LinkSet = [("Sports", vec![url("u1"), url("u2"), url("u3"), url("u4")])]
            .into_iter()
            .collect();

        let report = coordinator(&server, fast_config()).run(&links, None).await;

        assert_eq!(report.groups.len(), 1);
        assert_eq!(titles(&report.groups[0]), ["A", "B", "C", "D"]);
        let positions: Vec<usize> = report.groups[0].articles.iter().map(|a| a.position).collect();
        assert_eq!(positions, [0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_failed_group_stays_as_empty_placeholder() {
        let server = MockServer::start().await;
        mount_article(&server, "u1", "A", 50).await;
        mount_article(&server, "u2", "B", 0).await;
        mount_failure(&server, "u3", 502).await;

        let links: LinkSet = [
            ("Sports", vec![url("u1"), url("u2")]),
            ("Politics", vec![url("u3")]),
        ]
        .into_iter()
        .collect();

        let report = coordinator(&server, fast_config()).run(&links, None).await;

        let names: Vec<&str> = report.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, ["Sports", "Politics"]);
        assert_eq!(titles(&report.groups[0]), ["A", "B"]);
        assert!(report.groups[1].articles.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].url, url("u3"));
        assert_eq!(report.launched, 3);
    }

    #[tokio::test]
    async fn test_hung_fetch_times_out() {
        let server = MockServer::start().await;
        mount_article(&server, "slow", "Slow", 5_000).await;
        mount_article(&server, "fast", "Fast", 0).await;

        let links: LinkSet = [("Sports", vec![url("slow"), url("fast")])].into_iter().collect();

        let config = FetchConfig {
            timeout: Duration::from_millis(300),
            ..fast_config()
        };
        let start = Instant::now();
        let report = coordinator(&server, config).run(&links, None).await;

        assert!(start.elapsed() < Duration::from_secs(4));
        assert_eq!(titles(&report.groups[0]), ["Fast"]);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].cause.contains("timed out"));
    }

    #[tokio::test]
    async fn test_rate_limit_spaces_requests() {
        let server = MockServer::start().await;
        for name in ["u1", "u2", "u3"] {
            mount_article(&server, name, name, 0).await;
        }

        let links: LinkSet = [("Sports", vec![url("u1"), url("u2"), url("u3")])]
            .into_iter()
            .collect();

        let config = FetchConfig {
            rate_limit: Duration::from_millis(100),
            ..fast_config()
        };
        let start = Instant::now();
        let results = coordinator(&server, config).fetch_all(&links).await;

        assert_eq!(results.len(), 3);
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_empty_link_set() {
        let server = MockServer::start().await;
        let report = coordinator(&server, fast_config()).run(&LinkSet::new(), None).await;
        assert!(report.groups.is_empty());
        assert!(report.failures.is_empty());
        assert_eq!(report.launched, 0);
    }

    #[tokio::test]
    async fn test_observer_sees_every_url() {
        struct Recorder(Mutex<Vec<(String, bool, usize)>>);

        impl FetchObserver for Recorder {
            fn article_done(&self, url: &str, fetched: bool, collected: usize, _total: usize) {
                self.0.lock().unwrap().push((url.to_string(), fetched, collected));
            }
        }

        let server = MockServer::start().await;
        mount_article(&server, "u1", "A", 0).await;
        mount_failure(&server, "u2", 500).await;

        let links: LinkSet = [("Sports", vec![url("u1"), url("u2")])].into_iter().collect();
        let recorder = Recorder(Mutex::new(Vec::new()));

        coordinator(&server, fast_config())
            .run(&links, Some(&recorder))
            .await;

        let seen = recorder.0.into_inner().unwrap();
        assert_eq!(seen, vec![(url("u1"), true, 1), (url("u2"), false, 2)]);
    }
}
