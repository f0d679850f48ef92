//! Minimal EPUB 3 writer.
//!
//! The builder mirrors how the pipeline talks to an e-book: one author call,
//! one cover registration, then ordered section and subsection calls. The
//! archive is written to a temporary file and renamed into place, so a
//! failed write never leaves a truncated book behind.

mod writer;

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Directory (inside the book) holding image files.
pub const IMAGE_DIR: &str = "images";

/// Errors from the EPUB writer.
#[derive(Debug, Error)]
pub enum EpubError {
    #[error("cannot write EPUB: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write EPUB archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("failed to write EPUB entry: {0}")]
    Entry(#[from] std::io::Error),

    #[error("image '{0}' is already registered")]
    DuplicateImage(String),

    #[error("image '{0}' was never registered")]
    UnknownImage(String),

    #[error("invalid image file name: '{0}'")]
    InvalidImageName(String),

    #[error("section {0} does not exist")]
    UnknownSection(usize),
}

/// Href under which an image file is referenced from book content.
pub fn image_href(file_name: &str) -> String {
    format!("{IMAGE_DIR}/{file_name}")
}

/// Handle returned by [`EpubBuilder::add_section`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionId(usize);

#[derive(Debug, Clone)]
pub(crate) struct Image {
    pub source: PathBuf,
    pub file_name: String,
}

#[derive(Debug, Clone)]
pub(crate) struct Chapter {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub(crate) struct SectionEntry {
    pub chapter: Chapter,
    pub children: Vec<Chapter>,
}

/// Collects book content and writes it as an EPUB 3 archive.
#[derive(Debug, Clone)]
pub struct EpubBuilder {
    pub(crate) title: String,
    pub(crate) author: Option<String>,
    pub(crate) language: String,
    pub(crate) identifier: String,
    pub(crate) images: Vec<Image>,
    pub(crate) cover: Option<String>,
    pub(crate) sections: Vec<SectionEntry>,
}

impl EpubBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: None,
            language: "en".into(),
            identifier: format!("urn:uuid:{}", uuid::Uuid::now_v7()),
            images: Vec::new(),
            cover: None,
            sections: Vec::new(),
        }
    }

    pub fn set_author(&mut self, author: impl Into<String>) -> &mut Self {
        self.author = Some(author.into());
        self
    }

    pub fn set_language(&mut self, language: impl Into<String>) -> &mut Self {
        self.language = language.into();
        self
    }

    /// Register an image file; returns the href to use in content.
    pub fn add_image(
        &mut self,
        source: impl Into<PathBuf>,
        file_name: &str,
    ) -> Result<String, EpubError> {
        if file_name.is_empty() || file_name.contains(['/', '\\']) {
            return Err(EpubError::InvalidImageName(file_name.to_string()));
        }
        if self.images.iter().any(|i| i.file_name == file_name) {
            return Err(EpubError::DuplicateImage(file_name.to_string()));
        }

        self.images.push(Image {
            source: source.into(),
            file_name: file_name.to_string(),
        });
        Ok(image_href(file_name))
    }

    /// Use a registered image (by href or file name) as the cover.
    pub fn set_cover(&mut self, href: &str) -> Result<&mut Self, EpubError> {
        let file_name = href.strip_prefix(&format!("{IMAGE_DIR}/")).unwrap_or(href);
        if !self.images.iter().any(|i| i.file_name == file_name) {
            return Err(EpubError::UnknownImage(href.to_string()));
        }
        self.cover = Some(file_name.to_string());
        Ok(self)
    }

    /// Append a top-level section.
    pub fn add_section(&mut self, title: impl Into<String>, body: impl Into<String>) -> SectionId {
        self.sections.push(SectionEntry {
            chapter: Chapter {
                title: title.into(),
                body: body.into(),
            },
            children: Vec::new(),
        });
        SectionId(self.sections.len() - 1)
    }

    /// Append a subsection under `parent`.
    pub fn add_subsection(
        &mut self,
        parent: SectionId,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<(), EpubError> {
        let section = self
            .sections
            .get_mut(parent.0)
            .ok_or(EpubError::UnknownSection(parent.0))?;
        section.children.push(Chapter {
            title: title.into(),
            body: body.into(),
        });
        Ok(())
    }

    /// Write the book to `path`, replacing any existing file.
    pub fn write(&self, path: &Path) -> Result<(), EpubError> {
        writer::write_atomic(self, path)
    }
}
