//! Document assembler.
//!
//! Turns grouped articles into an [`Artifact`]: one section per group, one
//! subsection per article, with each article's representative image
//! downloaded and its reference rewritten to the in-book href.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

use paperboy_crawler::Downloader;
use paperboy_shared::{
    Article, ArticleGroup, Artifact, ImagePolicy, LocalResource, OutputConfig, Section, Subsection,
};

/// Fixed file name for the downloaded cover image.
pub const COVER_FILE_NAME: &str = "cover.jpg";

/// Settings for one assembly.
#[derive(Debug, Clone)]
pub struct AssembleConfig {
    /// Full book title (prefix and date).
    pub title: String,
    pub author: String,
    pub image_policy: ImagePolicy,
    /// Rewrite image URLs to their medium-resolution variants before download.
    pub downscale_images: bool,
}

impl AssembleConfig {
    /// Derive assembly settings from `[output]` for the given edition date.
    pub fn from_output(output: &OutputConfig, date: NaiveDate) -> Self {
        Self {
            title: edition_title(&output.title_prefix, date),
            author: output.author.clone(),
            image_policy: output.image_policy,
            downscale_images: output.downscale_images,
        }
    }
}

/// `"<prefix> - dd-mm-YYYY"`.
pub fn edition_title(prefix: &str, date: NaiveDate) -> String {
    format!("{prefix} - {}", date.format("%d-%m-%Y"))
}

/// Builds artifacts, downloading images through a shared [`Downloader`].
pub struct Assembler {
    downloader: Downloader,
    config: AssembleConfig,
}

impl Assembler {
    pub fn new(downloader: Downloader, config: AssembleConfig) -> Self {
        Self { downloader, config }
    }

    /// Assemble `groups` (in order) into an artifact.
    ///
    /// Cover and image download failures are logged and never abort.
    #[instrument(skip_all, fields(title = %self.config.title, groups = groups.len()))]
    pub async fn assemble(&self, groups: &[ArticleGroup], cover_url: Option<&str>) -> Artifact {
        let cover = match cover_url {
            Some(url) => self.download_cover(url).await,
            None => {
                warn!("no cover image URL, building without cover");
                None
            }
        };

        let mut images = Vec::new();
        let mut sections = Vec::with_capacity(groups.len());

        for group in groups {
            let mut subsections = Vec::with_capacity(group.articles.len());

            for (index, article) in group.articles.iter().enumerate() {
                let (article, image) = self.localize_image(article.clone()).await;
                images.extend(image);

                let title = if article.title.trim().is_empty() {
                    article.url.clone()
                } else {
                    article.title.clone()
                };
                subsections.push(Subsection {
                    title: format!("{index} - {title}"),
                    body: article.body,
                    source_url: article.url,
                });
            }

            if subsections.is_empty() {
                debug!(group = %group.name, "group has no articles, adding empty section");
            }

            sections.push(Section {
                title: group.name.clone(),
                body: format!("<h1>{}</h1>", html_escape(&group.name)),
                subsections,
            });
        }

        let artifact = Artifact {
            title: self.config.title.clone(),
            author: self.config.author.clone(),
            cover,
            images,
            sections,
        };

        info!(
            sections = artifact.sections.len(),
            articles = artifact.article_count(),
            images = artifact.images.len(),
            cover = artifact.cover.is_some(),
            "artifact assembled"
        );

        artifact
    }

    async fn download_cover(&self, url: &str) -> Option<LocalResource> {
        match self.downloader.download(url, Some(COVER_FILE_NAME)).await {
            Ok(Some(resource)) => Some(resource),
            Ok(None) => {
                warn!("empty cover image URL, building without cover");
                None
            }
            Err(e) => {
                warn!(%url, error = %e, "cover download failed, building without cover");
                None
            }
        }
    }

    /// Download the article's representative image and point the body at it.
    ///
    /// Returns the article unchanged when there is no image or the download
    /// fails.
    async fn localize_image(&self, article: Article) -> (Article, Option<LocalResource>) {
        let Some(reference) = find_image_ref(&article.body, self.config.image_policy) else {
            return (article, None);
        };

        let Some(remote) = resolve(&article.url, &reference) else {
            warn!(url = %article.url, image = %reference, "unresolvable image reference");
            return (article, None);
        };
        let remote = if self.config.downscale_images {
            downscale_url(&remote)
        } else {
            remote
        };

        match self.downloader.download(&remote, None).await {
            Ok(Some(resource)) => {
                let href = paperboy_epub::image_href(&resource.file_name);
                let body = replace_reference(&article.body, &reference, &href);
                let body = self_close_images(&body, &href);
                debug!(url = %article.url, image = %remote, file = %resource.file_name, "image localized");
                (article.with_body(body), Some(resource))
            }
            Ok(None) => (article, None),
            Err(e) => {
                warn!(url = %article.url, image = %remote, error = %e, "image download failed, keeping remote reference");
                (article, None)
            }
        }
    }
}

/// The `src` of the image that represents an article, per `policy`.
pub fn find_image_ref(body: &str, policy: ImagePolicy) -> Option<String> {
    let css = match policy {
        ImagePolicy::FirstInParagraph => "p > img[src]",
        ImagePolicy::FirstAnywhere => "img[src]",
    };
    let selector = Selector::parse(css).ok()?;

    let fragment = Html::parse_fragment(body);
    fragment
        .select(&selector)
        .filter_map(|img| img.value().attr("src"))
        .map(str::trim)
        .find(|src| !src.is_empty())
        .map(str::to_string)
}

/// Swap resolution tags (`rt`, `xl`, `lg`) in an image URL for `md`.
pub fn downscale_url(url: &str) -> String {
    static RESOLUTION: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?P<pre>[-_/.])(?:rt|xl|lg)(?P<post>[-_/.])").expect("valid regex")
    });
    RESOLUTION.replace_all(url, "${pre}md${post}").into_owned()
}

/// Absolute URL for an image reference found in an article body.
fn resolve(article_url: &str, reference: &str) -> Option<String> {
    if let Ok(url) = Url::parse(reference) {
        return Some(url.to_string());
    }
    let base = Url::parse(article_url).ok()?;
    base.join(reference).ok().map(|u| u.to_string())
}

/// Replace attribute values equal to `reference`, raw or entity-encoded.
///
/// Only whole quoted values are touched, so URLs that merely contain the
/// reference stay intact.
fn replace_reference(body: &str, reference: &str, href: &str) -> String {
    let encoded = reference.replace('&', "&amp;");
    let mut forms = vec![reference];
    if encoded != reference {
        forms.push(&encoded);
    }

    let mut body = body.to_string();
    for form in forms {
        for quote in ['"', '\''] {
            body = body.replace(&format!("{quote}{form}{quote}"), &format!("{quote}{href}{quote}"));
        }
    }
    body
}

/// Self-close `<img>` tags pointing at `href` so the chapter stays well-formed XHTML.
fn self_close_images(body: &str, href: &str) -> String {
    static IMG_TAG: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)<img\b[^>]*>").expect("valid regex"));

    let quoted = [format!("\"{href}\""), format!("'{href}'")];
    IMG_TAG
        .replace_all(body, |caps: &regex::Captures<'_>| {
            let tag = &caps[0];
            if tag.ends_with("/>") || !quoted.iter().any(|q| tag.contains(q.as_str())) {
                tag.to_string()
            } else {
                format!("{}/>", tag[..tag.len() - 1].trim_end())
            }
        })
        .into_owned()
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
