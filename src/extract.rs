// Copyright 2024. Felix Engl
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The renderer/extractor collaborator boundary (spec.md §6.4) plus the
//! HTML-level fallbacks the worker loop uses when the extractor's own
//! link list comes back empty (spec.md §4.6 step 5).

use crate::models::ArticleResult;
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::HashMap;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("extraction failed for {url}: {reason}")]
    Failed { url: String, reason: String },
}

/// What the renderer collaborator returns for one page (spec.md §6.4).
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    pub final_url: Url,
    pub article: ArticleResult,
}

/// One outlink, as returned by the link extractor or the HTML fallback.
#[derive(Debug, Clone)]
pub struct ExtractedLink {
    pub url: String,
    pub text: String,
    pub nofollow: bool,
}

/// Renders a page and returns its extracted content. Swappable: the
/// worker only depends on this trait, never on a concrete browser driver.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract_page(
        &self,
        url: &Url,
        render: &crate::models::RenderOptions,
    ) -> Result<ExtractedPage, ExtractError>;
}

/// Returns outlinks for a page. May be backed by the same renderer as
/// [`Extractor`] or run independently.
#[async_trait]
pub trait LinkExtractor: Send + Sync {
    async fn extract_links(
        &self,
        url: &Url,
        render: &crate::models::RenderOptions,
    ) -> Result<Vec<ExtractedLink>, ExtractError>;
}

/// HTML anchor scrape used as a fallback when the link extractor returns
/// nothing but the page produced `fullContent` (spec.md §4.6 step 5).
/// Skips `#...` and `javascript:...` hrefs and resolves relative hrefs
/// against `base`.
pub fn scrape_anchor_links(html: &str, base: &Url) -> Vec<ExtractedLink> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").expect("static selector is valid");

    let mut seen = std::collections::HashSet::new();
    let mut links = Vec::new();

    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
            continue;
        }

        let Ok(absolute) = base.join(href) else {
            continue;
        };
        let url = absolute.to_string();
        if !seen.insert(url.clone()) {
            continue;
        }

        let nofollow = element
            .value()
            .attr("rel")
            .map(|rel| rel.split_whitespace().any(|token| token == "nofollow"))
            .unwrap_or(false);
        let text = element.text().collect::<String>().trim().to_string();

        links.push(ExtractedLink {
            url,
            text,
            nofollow,
        });
    }

    links
}

/// Scrapes `<link rel="canonical" href="...">`, resolving a relative href
/// against `base` (`original_source/normalizer.py::extract_canonical_url`).
/// Returns the raw absolute URL; callers still run it through the usual
/// canonicalizer before storing or comparing it.
pub fn scrape_canonical_link(html: &str, base: &Url) -> Option<Url> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(r#"link[rel="canonical"][href]"#).ok()?;
    let href = document.select(&selector).next()?.value().attr("href")?;
    base.join(href.trim()).ok()
}

/// One discovered asset reference, paired with a MIME guess.
#[derive(Debug, Clone)]
pub struct ExtractedAsset {
    pub url: String,
    pub mime_guess: mime::Mime,
}

/// Scans `<img src>` and PDF-ending `<a href>` for asset candidates,
/// mirroring `original_source/extract.py::extract_assets_from_html`.
pub fn scrape_assets(html: &str, base: &Url) -> Vec<ExtractedAsset> {
    let document = Html::parse_document(html);
    let img_selector = Selector::parse("img[src]").expect("static selector is valid");
    let a_selector = Selector::parse("a[href]").expect("static selector is valid");

    let mut seen = std::collections::HashSet::new();
    let mut assets = Vec::new();

    for element in document.select(&img_selector) {
        let Some(src) = element.value().attr("src") else {
            continue;
        };
        let src = src.trim();
        if src.is_empty() || src.starts_with("data:") {
            continue;
        }
        let Ok(absolute) = base.join(src) else { continue };
        let url = absolute.to_string();
        if !seen.insert(url.clone()) {
            continue;
        }
        assets.push(ExtractedAsset {
            mime_guess: guess_image_mime(&url),
            url,
        });
    }

    for element in document.select(&a_selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if !href.to_ascii_lowercase().ends_with(".pdf") {
            continue;
        }
        let Ok(absolute) = base.join(href) else { continue };
        let url = absolute.to_string();
        if !seen.insert(url.clone()) {
            continue;
        }
        assets.push(ExtractedAsset {
            url,
            mime_guess: mime::APPLICATION_PDF,
        });
    }

    assets
}

fn guess_image_mime(url: &str) -> mime::Mime {
    let lower = url.to_ascii_lowercase();
    if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        mime::IMAGE_JPEG
    } else if lower.ends_with(".png") {
        mime::IMAGE_PNG
    } else if lower.ends_with(".gif") {
        mime::IMAGE_GIF
    } else if lower.ends_with(".svg") {
        "image/svg+xml".parse().expect("static mime literal is valid")
    } else {
        "image/*".parse().expect("static mime literal is valid")
    }
}

/// Extension guesses keyed by MIME essence, used by the blob store to
/// name asset files (spec.md §4.7).
pub fn guess_extension(mime_type: &mime::Mime) -> Option<&'static str> {
    let map: HashMap<&str, &str> = HashMap::from([
        ("image/jpeg", "jpg"),
        ("image/png", "png"),
        ("image/gif", "gif"),
        ("image/svg+xml", "svg"),
        ("image/webp", "webp"),
        ("application/pdf", "pdf"),
    ]);
    map.get(mime_type.essence_str()).copied()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn anchor_scrape_skips_fragments_and_js() {
        let html = r#"
            <a href="#top">top</a>
            <a href="javascript:void(0)">js</a>
            <a href="/a">a</a>
            <a href="https://other.com/b" rel="nofollow">b</a>
        "#;
        let base = Url::parse("https://example.com/page").unwrap();
        let links = scrape_anchor_links(html, &base);

        assert_eq!(links.len(), 2);
        assert_eq!(links[0].url, "https://example.com/a");
        assert!(!links[0].nofollow);
        assert_eq!(links[1].url, "https://other.com/b");
        assert!(links[1].nofollow);
    }

    #[test]
    fn canonical_link_resolves_relative_href() {
        let html = r#"<head><link rel="canonical" href="/a?utm_source=x"></head>"#;
        let base = Url::parse("https://example.com/a").unwrap();
        let canonical = scrape_canonical_link(html, &base).unwrap();
        assert_eq!(canonical.as_str(), "https://example.com/a?utm_source=x");
    }

    #[test]
    fn canonical_link_absent_returns_none() {
        let html = "<head></head>";
        let base = Url::parse("https://example.com/a").unwrap();
        assert!(scrape_canonical_link(html, &base).is_none());
    }

    #[test]
    fn asset_scrape_finds_images_and_pdfs() {
        let html = r#"
            <img src="/logo.png">
            <img src="data:image/png;base64,xyz">
            <a href="/report.pdf">report</a>
            <a href="/page.html">page</a>
        "#;
        let base = Url::parse("https://example.com/").unwrap();
        let assets = scrape_assets(html, &base);

        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].url, "https://example.com/logo.png");
        assert_eq!(assets[0].mime_guess, mime::IMAGE_PNG);
        assert_eq!(assets[1].url, "https://example.com/report.pdf");
        assert_eq!(assets[1].mime_guess, mime::APPLICATION_PDF);
    }

    #[test]
    fn extension_guess_covers_common_asset_types() {
        assert_eq!(guess_extension(&mime::IMAGE_JPEG), Some("jpg"));
        assert_eq!(guess_extension(&mime::APPLICATION_PDF), Some("pdf"));
    }
}
