//! Core domain types flowing through the Paperboy pipeline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::PaperboyError;

/// Group name used when the front page is not split by topic.
pub const DEFAULT_GROUP: &str = "Headlines";

// ---------------------------------------------------------------------------
// LinkSet
// ---------------------------------------------------------------------------

/// Article URLs discovered under one group, in page order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkGroup {
    /// Topic name (or the default group).
    pub name: String,
    /// Article URLs in discovery order.
    pub urls: Vec<String>,
}

/// Ordered mapping from group name to article URLs.
///
/// Group order is first-seen order; URL order within a group is discovery
/// order. Both are preserved all the way into the e-book.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkSet {
    groups: Vec<LinkGroup>,
}

impl LinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `url` to `group`, creating the group on first use.
    ///
    /// Returns `false` when the URL was already present in that group.
    pub fn push(&mut self, group: &str, url: impl Into<String>) -> bool {
        let url = url.into();
        let idx = match self.groups.iter().position(|g| g.name == group) {
            Some(idx) => idx,
            None => {
                self.groups.push(LinkGroup {
                    name: group.to_string(),
                    urls: Vec::new(),
                });
                self.groups.len() - 1
            }
        };

        let urls = &mut self.groups[idx].urls;
        if urls.contains(&url) {
            return false;
        }
        urls.push(url);
        true
    }

    /// All groups in discovery order.
    pub fn groups(&self) -> &[LinkGroup] {
        &self.groups
    }

    /// Look up a group by name.
    pub fn group(&self, name: &str) -> Option<&LinkGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Number of groups.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Total number of URLs across all groups.
    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.urls.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<G, U> FromIterator<(G, Vec<U>)> for LinkSet
where
    G: Into<String>,
    U: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (G, Vec<U>)>>(iter: I) -> Self {
        let mut set = LinkSet::new();
        for (group, urls) in iter {
            let group = group.into();
            for url in urls {
                set.push(&group, url);
            }
        }
        set
    }
}

// ---------------------------------------------------------------------------
// Article / FetchResult
// ---------------------------------------------------------------------------

/// One extracted article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Article {
    /// URL the article was requested with.
    pub url: String,
    /// Group the URL was discovered under.
    pub group: String,
    /// Index of the URL within its group.
    pub position: usize,
    /// Headline.
    pub title: String,
    /// Readable HTML body.
    pub body: String,
    /// Body content type as reported by the extraction service.
    pub body_type: String,
    /// Language code as reported by the extraction service.
    pub language: String,
}

impl Article {
    /// Same article with a replaced body.
    pub fn with_body(self, body: String) -> Self {
        Self { body, ..self }
    }
}

/// Why a single article could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchFailure {
    pub group: String,
    pub url: String,
    pub position: usize,
    pub cause: String,
}

impl From<FetchFailure> for PaperboyError {
    fn from(failure: FetchFailure) -> Self {
        PaperboyError::FetchFailed {
            url: failure.url,
            group: failure.group,
            cause: failure.cause,
        }
    }
}

/// Outcome of fetching one URL. Exactly one is produced per input URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    Fetched(Article),
    Failed(FetchFailure),
}

impl FetchResult {
    pub fn url(&self) -> &str {
        match self {
            Self::Fetched(a) => &a.url,
            Self::Failed(f) => &f.url,
        }
    }

    pub fn group(&self) -> &str {
        match self {
            Self::Fetched(a) => &a.group,
            Self::Failed(f) => &f.group,
        }
    }

    pub fn position(&self) -> usize {
        match self {
            Self::Fetched(a) => a.position,
            Self::Failed(f) => f.position,
        }
    }

    pub fn is_fetched(&self) -> bool {
        matches!(self, Self::Fetched(_))
    }
}

/// Successfully fetched articles of one group, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArticleGroup {
    pub name: String,
    pub articles: Vec<Article>,
}

// ---------------------------------------------------------------------------
// Artifact
// ---------------------------------------------------------------------------

/// A downloaded file referenced by the e-book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalResource {
    /// Where the bytes came from.
    pub remote_url: String,
    /// File name inside the image directory and the e-book.
    pub file_name: String,
    /// Location on disk.
    pub path: PathBuf,
}

/// A leaf entry: one article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subsection {
    pub title: String,
    pub body: String,
    pub source_url: String,
}

/// A top-level entry: one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub title: String,
    pub body: String,
    pub subsections: Vec<Subsection>,
}

/// The assembled document, ready for the e-book writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub title: String,
    pub author: String,
    pub cover: Option<LocalResource>,
    /// Inline images referenced from subsection bodies.
    pub images: Vec<LocalResource>,
    pub sections: Vec<Section>,
}

impl Artifact {
    /// Section titles in order.
    pub fn section_titles(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.title.as_str()).collect()
    }

    /// Look up a section by title.
    pub fn section(&self, title: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.title == title)
    }

    /// Total number of articles across all sections.
    pub fn article_count(&self) -> usize {
        self.sections.iter().map(|s| s.subsections.len()).sum()
    }
}
