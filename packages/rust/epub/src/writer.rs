//! Archive layout: mimetype, container, OPF, nav/NCX, title page, chapters, images.

use std::fmt::Write as _;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::{Chapter, EpubBuilder, EpubError, IMAGE_DIR};

const MIMETYPE: &[u8] = b"application/epub+zip";

const CONTAINER_XML: &[u8] = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<container version=\"1.0\" xmlns=\"urn:oasis:names:tc:opendocument:xmlns:container\">\n  <rootfiles>\n    <rootfile full-path=\"OEBPS/content.opf\" media-type=\"application/oebps-package+xml\"/>\n  </rootfiles>\n</container>\n";

const OEBPS_PREFIX: &str = "OEBPS/";

const TITLE_PAGE: &str = "title.xhtml";

/// One spine document: manifest id, file name, and content.
struct SpineItem<'a> {
    id: String,
    href: String,
    chapter: &'a Chapter,
}

/// A section with its spine item and those of its children.
struct TocNode<'a> {
    item: SpineItem<'a>,
    children: Vec<SpineItem<'a>>,
}

/// Write to `<path>.tmp` and rename, removing the temp file on failure.
pub(crate) fn write_atomic(book: &EpubBuilder, path: &Path) -> Result<(), EpubError> {
    let temp = temp_path(path);

    let result = std::fs::File::create(&temp)
        .map_err(|e| EpubError::Io {
            path: temp.clone(),
            source: e,
        })
        .and_then(|file| write_archive(book, file))
        .and_then(|()| {
            std::fs::rename(&temp, path).map_err(|e| EpubError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        });

    if result.is_err() {
        let _ = std::fs::remove_file(&temp);
    } else {
        info!(path = %path.display(), sections = book.sections.len(), "EPUB written");
    }

    result
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "book.epub".into());
    path.with_file_name(format!(".{name}.tmp"))
}

fn write_archive<W: Write + Seek>(book: &EpubBuilder, out: W) -> Result<(), EpubError> {
    let mut zip = ZipWriter::new(out);

    let stored = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o644);
    let deflated = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    // mimetype must be the first entry and uncompressed.
    zip.start_file("mimetype", stored)?;
    zip.write_all(MIMETYPE)?;

    zip.start_file("META-INF/container.xml", deflated)?;
    zip.write_all(CONTAINER_XML)?;

    let toc = build_toc(book);

    write_entry(&mut zip, "content.opf", &render_opf(book, &toc), deflated)?;
    write_entry(&mut zip, "nav.xhtml", &render_nav(book, &toc), deflated)?;
    write_entry(&mut zip, "toc.ncx", &render_ncx(book, &toc), deflated)?;
    write_entry(&mut zip, TITLE_PAGE, &render_title_page(book), deflated)?;

    for node in &toc {
        for item in std::iter::once(&node.item).chain(&node.children) {
            let doc = xhtml_document(&book.language, &item.chapter.title, &item.chapter.body);
            write_entry(&mut zip, &item.href, &doc, deflated)?;
        }
    }

    for image in &book.images {
        let data = std::fs::read(&image.source).map_err(|e| EpubError::Io {
            path: image.source.clone(),
            source: e,
        })?;
        zip.start_file(
            format!("{OEBPS_PREFIX}{IMAGE_DIR}/{}", image.file_name),
            stored,
        )?;
        zip.write_all(&data)?;
        debug!(file = %image.file_name, size = data.len(), "added image");
    }

    zip.finish()?;
    Ok(())
}

fn write_entry<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    name: &str,
    content: &str,
    options: SimpleFileOptions,
) -> Result<(), EpubError> {
    zip.start_file(format!("{OEBPS_PREFIX}{name}"), options)?;
    zip.write_all(content.as_bytes())?;
    Ok(())
}

fn build_toc(book: &EpubBuilder) -> Vec<TocNode<'_>> {
    book.sections
        .iter()
        .enumerate()
        .map(|(i, section)| TocNode {
            item: SpineItem {
                id: format!("section-{:04}", i + 1),
                href: format!("section-{:04}.xhtml", i + 1),
                chapter: &section.chapter,
            },
            children: section
                .children
                .iter()
                .enumerate()
                .map(|(j, chapter)| SpineItem {
                    id: format!("section-{:04}-{:04}", i + 1, j + 1),
                    href: format!("section-{:04}-{:04}.xhtml", i + 1, j + 1),
                    chapter,
                })
                .collect(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render_opf(book: &EpubBuilder, toc: &[TocNode<'_>]) -> String {
    let modified = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    let mut metadata = format!(
        "    <dc:identifier id=\"book-id\">{}</dc:identifier>\n    <dc:title>{}</dc:title>\n    <dc:language>{}</dc:language>\n    <meta property=\"dcterms:modified\">{modified}</meta>\n",
        xml_escape(&book.identifier),
        xml_escape(&book.title),
        xml_escape(&book.language),
    );
    if let Some(author) = &book.author {
        let _ = writeln!(metadata, "    <dc:creator>{}</dc:creator>", xml_escape(author));
    }
    if book.cover.is_some() {
        metadata.push_str("    <meta name=\"cover\" content=\"cover-image\"/>\n");
    }

    let mut manifest = String::from(
        "    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>\n    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\"/>\n    <item id=\"title-page\" href=\"title.xhtml\" media-type=\"application/xhtml+xml\"/>\n",
    );
    let mut spine = String::from("    <itemref idref=\"title-page\"/>\n");

    for node in toc {
        for item in std::iter::once(&node.item).chain(&node.children) {
            let _ = writeln!(
                manifest,
                "    <item id=\"{}\" href=\"{}\" media-type=\"application/xhtml+xml\"/>",
                item.id, item.href
            );
            let _ = writeln!(spine, "    <itemref idref=\"{}\"/>", item.id);
        }
    }

    for (i, image) in book.images.iter().enumerate() {
        let is_cover = book.cover.as_deref() == Some(image.file_name.as_str());
        let (id, properties) = if is_cover {
            ("cover-image".to_string(), " properties=\"cover-image\"")
        } else {
            (format!("image-{:04}", i + 1), "")
        };
        let _ = writeln!(
            manifest,
            "    <item id=\"{id}\" href=\"{IMAGE_DIR}/{}\" media-type=\"{}\"{properties}/>",
            xml_escape(&image.file_name),
            media_type(&image.file_name),
        );
    }

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<package xmlns=\"http://www.idpf.org/2007/opf\" version=\"3.0\" unique-identifier=\"book-id\">\n  <metadata xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n{metadata}  </metadata>\n  <manifest>\n{manifest}  </manifest>\n  <spine toc=\"ncx\">\n{spine}  </spine>\n</package>\n"
    )
}

fn render_nav(book: &EpubBuilder, toc: &[TocNode<'_>]) -> String {
    let mut list = String::new();
    for node in toc {
        let _ = write!(
            list,
            "      <li><a href=\"{}\">{}</a>",
            node.item.href,
            xml_escape(&node.item.chapter.title)
        );
        if !node.children.is_empty() {
            list.push_str("\n        <ol>\n");
            for child in &node.children {
                let _ = writeln!(
                    list,
                    "          <li><a href=\"{}\">{}</a></li>",
                    child.href,
                    xml_escape(&child.chapter.title)
                );
            }
            list.push_str("        </ol>\n      ");
        }
        list.push_str("</li>\n");
    }

    let body = format!(
        "<nav epub:type=\"toc\" id=\"toc\">\n    <h1>{}</h1>\n    <ol>\n      <li><a href=\"{TITLE_PAGE}\">{}</a></li>\n{list}    </ol>\n  </nav>",
        xml_escape(&book.title),
        xml_escape(&book.title),
    );
    xhtml_document(&book.language, &book.title, &body)
}

fn render_ncx(book: &EpubBuilder, toc: &[TocNode<'_>]) -> String {
    let mut play_order = 1;
    let mut points = format!(
        "    <navPoint id=\"nav-title\" playOrder=\"{play_order}\">\n      <navLabel><text>{}</text></navLabel>\n      <content src=\"{TITLE_PAGE}\"/>\n    </navPoint>\n",
        xml_escape(&book.title)
    );

    for node in toc {
        play_order += 1;
        let _ = writeln!(
            points,
            "    <navPoint id=\"nav-{}\" playOrder=\"{play_order}\">\n      <navLabel><text>{}</text></navLabel>\n      <content src=\"{}\"/>",
            node.item.id,
            xml_escape(&node.item.chapter.title),
            node.item.href
        );
        for child in &node.children {
            play_order += 1;
            let _ = writeln!(
                points,
                "      <navPoint id=\"nav-{}\" playOrder=\"{play_order}\">\n        <navLabel><text>{}</text></navLabel>\n        <content src=\"{}\"/>\n      </navPoint>",
                child.id,
                xml_escape(&child.chapter.title),
                child.href
            );
        }
        points.push_str("    </navPoint>\n");
    }

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<ncx xmlns=\"http://www.daisy.org/z3986/2005/ncx/\" version=\"2005-1\">\n  <head>\n    <meta name=\"dtb:uid\" content=\"{}\"/>\n    <meta name=\"dtb:depth\" content=\"2\"/>\n  </head>\n  <docTitle><text>{}</text></docTitle>\n  <navMap>\n{points}  </navMap>\n</ncx>\n",
        xml_escape(&book.identifier),
        xml_escape(&book.title),
    )
}

fn render_title_page(book: &EpubBuilder) -> String {
    let mut body = String::new();
    if let Some(cover) = &book.cover {
        let _ = writeln!(
            body,
            "<div class=\"cover\"><img src=\"{IMAGE_DIR}/{}\" alt=\"{}\"/></div>",
            xml_escape(cover),
            xml_escape(&book.title)
        );
    }
    let _ = writeln!(body, "<h1>{}</h1>", xml_escape(&book.title));
    if let Some(author) = &book.author {
        let _ = writeln!(body, "<p class=\"author\">{}</p>", xml_escape(author));
    }
    xhtml_document(&book.language, &book.title, &body)
}

/// Wrap body markup in an XHTML content document. The body is inserted as-is.
fn xhtml_document(language: &str, title: &str, body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!DOCTYPE html>\n<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\" lang=\"{lang}\" xml:lang=\"{lang}\">\n<head>\n  <meta charset=\"UTF-8\"/>\n  <title>{}</title>\n</head>\n<body>\n{body}\n</body>\n</html>\n",
        xml_escape(title),
        lang = xml_escape(language),
    )
}

fn media_type(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "image/jpeg",
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
