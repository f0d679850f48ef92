//! Selector-driven extraction of article links and the cover image.
//!
//! Two layouts are supported:
//! - flat: every `link_selector` match lands in the default group
//! - grouped: each `section_selector` match is a topic, named by its
//!   `section_title_selector` text, holding the `link_selector` matches inside it

use paperboy_shared::{LinkSet, PaperboyError, Result, SourceConfig};
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Compile a CSS selector, mapping failures to a parse error.
fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| PaperboyError::parse(format!("invalid selector '{css}': {e:?}")))
}

/// Extract grouped article links from a front page.
pub(crate) fn parse_links(html: &str, base_url: &Url, config: &SourceConfig) -> Result<LinkSet> {
    let doc = Html::parse_document(html);
    let link_sel = selector(&config.link_selector)?;
    let anchor_sel = selector("a[href]")?;
    let filter = LinkFilter::new(base_url, &config.allowed_domains);

    let mut links = LinkSet::new();

    match &config.section_selector {
        None => {
            for el in doc.select(&link_sel) {
                if let Some(url) = element_href(el, &anchor_sel).and_then(|h| filter.resolve(h)) {
                    links.push(&config.default_group, url);
                }
            }
        }
        Some(section_css) => {
            let section_sel = selector(section_css)?;
            let title_sel = config
                .section_title_selector
                .as_deref()
                .map(selector)
                .transpose()?;

            for section in doc.select(&section_sel) {
                let name = title_sel
                    .as_ref()
                    .and_then(|sel| section.select(sel).next())
                    .map(element_text)
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| config.default_group.clone());

                for el in section.select(&link_sel) {
                    if let Some(url) =
                        element_href(el, &anchor_sel).and_then(|h| filter.resolve(h))
                    {
                        links.push(&name, url);
                    }
                }
            }
        }
    }

    Ok(links)
}

/// Find the cover image URL on the cover page.
pub(crate) fn parse_cover(html: &str, base_url: &Url, cover_selector: &str) -> Result<Option<String>> {
    let doc = Html::parse_document(html);
    let cover_sel = selector(cover_selector)?;
    let src_sel = selector("[src]")?;

    let src = doc.select(&cover_sel).next().and_then(|el| {
        el.value()
            .attr("src")
            .or_else(|| el.select(&src_sel).next().and_then(|c| c.value().attr("src")))
    });

    Ok(src
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| base_url.join(s).ok())
        .map(|u| u.to_string()))
}

/// The element's own `href`, or that of its first descendant anchor.
fn element_href<'a>(el: ElementRef<'a>, anchor_sel: &Selector) -> Option<&'a str> {
    el.value()
        .attr("href")
        .or_else(|| el.select(anchor_sel).next().and_then(|a| a.value().attr("href")))
}

/// Collapse an element's text into a single trimmed line.
fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolves hrefs and keeps only article-looking links on allowed hosts.
struct LinkFilter<'a> {
    base_url: &'a Url,
    allowed_domains: &'a [String],
}

impl<'a> LinkFilter<'a> {
    fn new(base_url: &'a Url, allowed_domains: &'a [String]) -> Self {
        Self {
            base_url,
            allowed_domains,
        }
    }

    fn resolve(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
        {
            return None;
        }

        let mut resolved = self.base_url.join(href).ok()?;
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            return None;
        }
        resolved.set_fragment(None);

        if !self.allowed_domains.is_empty() {
            let host = resolved.host_str().unwrap_or("");
            if !self.allowed_domains.iter().any(|d| d == host) {
                return None;
            }
        }

        Some(resolved.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://news.example.com/today").unwrap()
    }

    fn flat_config() -> SourceConfig {
        SourceConfig {
            front_page_url: base().to_string(),
            allowed_domains: vec!["news.example.com".into()],
            section_selector: None,
            section_title_selector: None,
            link_selector: ".headline".into(),
            default_group: "Headlines".into(),
            cover_page_url: None,
            cover_selector: ".edition".into(),
        }
    }

    #[test]
    fn flat_layout_uses_default_group() {
        let html = r##"<html><body>
            <h2 class="headline"><a href="/a1">First</a></h2>
            <a class="headline" href="https://news.example.com/a2#top">Second</a>
            <h2 class="headline"><a href="#comments">Anchor</a></h2>
            <h2 class="headline"><a href="https://ads.example.net/x">Ad</a></h2>
            <h2 class="headline"><a href="/a1">Dup</a></h2>
        </body></html>"##;

        let links = parse_links(html, &base(), &flat_config()).unwrap();
        assert_eq!(links.group_count(), 1);
        assert_eq!(
            links.group("Headlines").unwrap().urls,
            ["https://news.example.com/a1", "https://news.example.com/a2"]
        );
    }

    #[test]
    fn grouped_layout_names_groups_by_title() {
        let html = r#"<html><body>
            <section class="topic"><h2> Sports </h2>
                <a class="headline" href="/s1">S1</a>
                <a class="headline" href="/s2">S2</a>
            </section>
            <section class="topic"><h2>Politics</h2>
                <a class="headline" href="/p1">P1</a>
            </section>
            <section class="topic">
                <a class="headline" href="/x1">Untitled</a>
            </section>
        </body></html>"#;

        let config = SourceConfig {
            section_selector: Some("section.topic".into()),
            section_title_selector: Some("h2".into()),
            link_selector: "a.headline".into(),
            ..flat_config()
        };

        let links = parse_links(html, &base(), &config).unwrap();
        let names: Vec<_> = links.groups().iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, ["Sports", "Politics", "Headlines"]);
        assert_eq!(links.group("Sports").unwrap().urls.len(), 2);
        assert_eq!(links.len(), 4);
    }

    #[test]
    fn no_matches_yields_empty_set() {
        let links = parse_links("<html><body><p>nothing</p></body></html>", &base(), &flat_config())
            .unwrap();
        assert!(links.is_empty());
    }

    #[test]
    fn invalid_selector_is_parse_error() {
        let config = SourceConfig {
            link_selector: "[[[".into(),
            ..flat_config()
        };
        let err = parse_links("<html></html>", &base(), &config).unwrap_err();
        assert!(err.to_string().contains("invalid selector"));
    }

    #[test]
    fn cover_from_child_image() {
        let html = r#"<div class="edition"><img src="/covers/today.jpg"></div>"#;
        let cover = parse_cover(html, &base(), ".edition").unwrap();
        assert_eq!(cover.as_deref(), Some("https://news.example.com/covers/today.jpg"));
    }

    #[test]
    fn cover_missing() {
        let cover = parse_cover("<div class='other'></div>", &base(), ".edition").unwrap();
        assert!(cover.is_none());
    }
}
