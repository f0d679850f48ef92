//! Image and cover downloads into a shared scratch directory.

use std::path::{Path, PathBuf};

use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, instrument};
use url::Url;
use uuid::Uuid;

use paperboy_shared::{LocalResource, PaperboyError, Result};

/// Extensions kept from the remote URL when naming a download.
const KNOWN_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "svg"];

/// Fallback extension when neither the URL nor the content type tells.
const DEFAULT_EXTENSION: &str = "jpg";

/// Downloads remote resources to disk, one request per call.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    dir: PathBuf,
}

impl Downloader {
    /// Create a downloader writing into `dir` (created on first download).
    pub fn new(client: Client, dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            dir: dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Download `url` under `name`, or under a fresh unique name when `None`.
    ///
    /// An empty URL is a no-op and returns `Ok(None)`. The file appears under
    /// its final name only once fully written.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn download(&self, url: &str, name: Option<&str>) -> Result<Option<LocalResource>> {
        let url = url.trim();
        if url.is_empty() {
            return Ok(None);
        }

        let parsed = Url::parse(url)
            .map_err(|e| PaperboyError::validation(format!("invalid resource URL '{url}': {e}")))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(PaperboyError::validation(format!(
                "unsupported resource URL scheme: {url}"
            )));
        }
        if let Some(name) = name {
            validate_file_name(name)?;
        }

        let response = self
            .client
            .get(parsed.as_str())
            .send()
            .await
            .map_err(|e| PaperboyError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PaperboyError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PaperboyError::Network(format!("{url}: body read failed: {e}")))?;

        let file_name = match name {
            Some(name) => name.to_string(),
            None => generate_file_name(&parsed, content_type.as_deref()),
        };

        let path = write_atomic(&self.dir, &file_name, &bytes).await?;
        debug!(file = %file_name, size = bytes.len(), "downloaded resource");

        Ok(Some(LocalResource {
            remote_url: url.to_string(),
            file_name,
            path,
        }))
    }
}

/// Write `bytes` to `<dir>/<file_name>` via a hidden part file and a rename.
async fn write_atomic(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| PaperboyError::io(dir, e))?;

    let target = dir.join(file_name);
    let part = dir.join(format!(".{file_name}.part"));

    if let Err(e) = tokio::fs::write(&part, bytes).await {
        let _ = tokio::fs::remove_file(&part).await;
        return Err(PaperboyError::io(&part, e));
    }

    if let Err(e) = tokio::fs::rename(&part, &target).await {
        let _ = tokio::fs::remove_file(&part).await;
        return Err(PaperboyError::io(&target, e));
    }

    Ok(target)
}

/// A unique `<uuid>.<ext>` name; never derived from the content.
fn generate_file_name(url: &Url, content_type: Option<&str>) -> String {
    let ext = extension_from_url(url)
        .or_else(|| content_type.and_then(extension_from_content_type))
        .unwrap_or(DEFAULT_EXTENSION);
    format!("{}.{ext}", Uuid::now_v7())
}

fn extension_from_url(url: &Url) -> Option<&'static str> {
    let last = url.path_segments()?.next_back()?;
    let (_, ext) = last.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    KNOWN_EXTENSIONS.iter().copied().find(|known| *known == ext)
}

fn extension_from_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type.split(';').next()?.trim().to_ascii_lowercase();
    match mime.as_str() {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/svg+xml" => Some("svg"),
        _ => None,
    }
}

fn validate_file_name(name: &str) -> Result<()> {
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
        return Err(PaperboyError::validation(format!(
            "invalid download file name: '{name}'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("paperboy-download-test-{}", Uuid::now_v7()))
    }

    fn visible_files(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_empty_url_is_noop() {
        let dir = temp_dir();
        let downloader = Downloader::new(Client::new(), &dir);
        assert!(downloader.download("  ", None).await.unwrap().is_none());
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_relative_url_is_rejected() {
        let downloader = Downloader::new(Client::new(), temp_dir());
        let err = downloader.download("/img/a.jpg", None).await.unwrap_err();
        assert!(matches!(err, PaperboyError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_download_writes_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/photos/a-lg.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .expect(1)
            .mount(&server)
            .await;

        let dir = temp_dir();
        let downloader = Downloader::new(Client::new(), &dir);
        let url = format!("{}/photos/a-lg.png", server.uri());
        let resource = downloader.download(&url, None).await.unwrap().unwrap();

        assert!(resource.file_name.ends_with(".png"));
        assert_eq!(resource.remote_url, url);
        assert_eq!(std::fs::read(&resource.path).unwrap(), vec![1u8, 2, 3]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_non_success_is_download_failed_and_leaves_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = temp_dir();
        let downloader = Downloader::new(Client::new(), &dir);
        let err = downloader
            .download(&format!("{}/missing.jpg", server.uri()), None)
            .await
            .unwrap_err();

        match err {
            PaperboyError::DownloadFailed { status, .. } => assert_eq!(status, 404),
            other => panic!("expected DownloadFailed, got {other:?}"),
        }
        assert!(visible_files(&dir).is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_downloads_get_unique_names() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/same.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"same bytes".to_vec()))
            .mount(&server)
            .await;

        let dir = temp_dir();
        let downloader = Downloader::new(Client::new(), &dir);
        let url = format!("{}/same.jpg", server.uri());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let downloader = downloader.clone();
            let url = url.clone();
            handles.push(tokio::spawn(async move {
                downloader.download(&url, None).await.unwrap().unwrap()
            }));
        }

        let mut names = Vec::new();
        for handle in handles {
            names.push(handle.await.unwrap().file_name);
        }
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 8);
        assert_eq!(visible_files(&dir).len(), 8);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_caller_supplied_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"cover".to_vec()))
            .mount(&server)
            .await;

        let dir = temp_dir();
        let downloader = Downloader::new(Client::new(), &dir);
        let resource = downloader
            .download(&format!("{}/capa", server.uri()), Some("cover.jpg"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resource.file_name, "cover.jpg");
        assert_eq!(resource.path, dir.join("cover.jpg"));

        let err = downloader
            .download(&format!("{}/capa", server.uri()), Some("../escape.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, PaperboyError::Validation { .. }));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_extension_detection() {
        let url = Url::parse("https://img.example.com/a/b/photo.JPEG?w=1").unwrap();
        assert_eq!(extension_from_url(&url), Some("jpeg"));

        let url = Url::parse("https://img.example.com/a/b/photo").unwrap();
        assert_eq!(extension_from_url(&url), None);

        assert_eq!(extension_from_content_type("image/png; charset=binary"), Some("png"));
        assert_eq!(extension_from_content_type("text/html"), None);
    }
}
