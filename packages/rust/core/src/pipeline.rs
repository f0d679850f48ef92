//! End-to-end run: front page → links → articles → artifact → EPUB.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDate};
use tracing::{info, instrument, warn};

use paperboy_crawler::{Downloader, ExtractionClient, FetchCoordinator, FetchObserver, build_client};
use paperboy_epub::EpubBuilder;
use paperboy_shared::{AppConfig, Artifact, FetchConfig, FetchFailure, PaperboyError, Result};

use crate::assembler::{AssembleConfig, Assembler};

/// Configuration for one [`run`].
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Resolved application config.
    pub app: AppConfig,
    /// Runtime fetch policy (config file merged with CLI flags).
    pub fetch: FetchConfig,
    /// Directory the `.epub` is written to.
    pub output_dir: PathBuf,
    /// Scratch directory for downloaded images.
    pub image_dir: PathBuf,
    /// Look up and download the cover image.
    pub fetch_cover: bool,
    /// Edition date used in the book title.
    pub date: NaiveDate,
}

impl RunConfig {
    /// Run settings straight from an [`AppConfig`], dated today.
    pub fn from_app(app: AppConfig) -> Self {
        let output_dir = PathBuf::from(&app.output.dir);
        let image_dir = output_dir.join(&app.output.image_dir);
        Self {
            fetch: FetchConfig::from(&app),
            output_dir,
            image_dir,
            fetch_cover: true,
            date: Local::now().date_naive(),
            app,
        }
    }
}

/// Result of a successful [`run`].
#[derive(Debug)]
pub struct RunResult {
    /// Path of the written `.epub`.
    pub output_path: PathBuf,
    /// The assembled document.
    pub artifact: Artifact,
    /// Articles that could not be fetched.
    pub failures: Vec<FetchFailure>,
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called once per article URL as its fetch completes.
    fn article_fetched(&self, url: &str, fetched: bool, current: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, result: &RunResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn article_fetched(&self, _url: &str, _fetched: bool, _current: usize, _total: usize) {}
    fn done(&self, _result: &RunResult) {}
}

/// Adapts a `ProgressReporter` to the coordinator's `FetchObserver`.
struct FetchProgress<'a> {
    inner: &'a dyn ProgressReporter,
}

impl FetchObserver for FetchProgress<'_> {
    fn article_done(&self, url: &str, fetched: bool, collected: usize, total: usize) {
        self.inner.article_fetched(url, fetched, collected, total);
    }
}

/// Run the full pipeline.
///
/// 1. Prepare output directories
/// 2. Locate the cover image
/// 3. Discover article links
/// 4. Fetch articles concurrently
/// 5. Assemble sections and localize images
/// 6. Write the EPUB
///
/// Only directory creation, configuration errors, and the final write are
/// fatal; everything else degrades to warnings.
#[instrument(skip_all, fields(source = %config.app.source.front_page_url, date = %config.date))]
pub async fn run(config: &RunConfig, progress: &dyn ProgressReporter) -> Result<RunResult> {
    let start = Instant::now();

    info!("starting run");

    // --- Phase 1: Directories ---
    progress.phase("Preparing output");
    for dir in [&config.output_dir, &config.image_dir] {
        std::fs::create_dir_all(dir).map_err(|e| PaperboyError::io(dir, e))?;
    }

    let client = build_client(&config.fetch)?;

    // --- Phase 2: Cover ---
    let cover_url = if config.fetch_cover {
        progress.phase("Locating cover");
        match paperboy_discovery::find_cover_url(&config.app.source, &client).await {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "cover lookup failed, building without cover");
                None
            }
        }
    } else {
        None
    };

    // --- Phase 3: Discovery ---
    progress.phase("Discovering articles");
    let links = paperboy_discovery::discover_or_empty(&config.app.source, &client).await;

    // --- Phase 4: Fetch ---
    progress.phase("Fetching articles");
    let extractor = ExtractionClient::new(client.clone(), &config.app.extraction)?;
    let coordinator = FetchCoordinator::new(extractor, &config.fetch);
    let observer = FetchProgress { inner: progress };
    let report = coordinator.run(&links, Some(&observer)).await;

    // --- Phase 5: Assemble ---
    progress.phase("Assembling document");
    let assembler = Assembler::new(
        Downloader::new(client, &config.image_dir),
        AssembleConfig::from_output(&config.app.output, config.date),
    );
    let artifact = assembler.assemble(&report.groups, cover_url.as_deref()).await;

    // --- Phase 6: Write ---
    progress.phase("Writing EPUB");
    let output_path = write_artifact(&artifact, &config.output_dir, &config.app.output.language)?;

    let result = RunResult {
        output_path,
        artifact,
        failures: report.failures,
        elapsed: start.elapsed(),
    };

    progress.done(&result);

    info!(
        path = %result.output_path.display(),
        sections = result.artifact.sections.len(),
        articles = result.artifact.article_count(),
        failed = result.failures.len(),
        elapsed_ms = result.elapsed.as_millis(),
        "run complete"
    );

    Ok(result)
}

/// Write `artifact` as `<out_dir>/<title>.epub`.
///
/// The file is either fully written or absent.
#[instrument(skip_all, fields(title = %artifact.title))]
pub fn write_artifact(artifact: &Artifact, out_dir: &Path, language: &str) -> Result<PathBuf> {
    let path = out_dir.join(format!("{}.epub", file_stem(&artifact.title)));
    let fail = |e: paperboy_epub::EpubError| PaperboyError::artifact(&path, e.to_string());

    let mut book = EpubBuilder::new(&artifact.title);
    book.set_author(&artifact.author).set_language(language);

    if let Some(cover) = &artifact.cover {
        let href = book.add_image(&cover.path, &cover.file_name).map_err(fail)?;
        book.set_cover(&href).map_err(fail)?;
    }
    for image in &artifact.images {
        book.add_image(&image.path, &image.file_name).map_err(fail)?;
    }

    for section in &artifact.sections {
        let id = book.add_section(&section.title, &section.body);
        for sub in &section.subsections {
            book.add_subsection(id, &sub.title, &sub.body).map_err(fail)?;
        }
    }

    book.write(&path).map_err(fail)?;

    Ok(path)
}

/// Title with path separators replaced.
fn file_stem(title: &str) -> String {
    title.replace(['/', '\\'], "-")
}
