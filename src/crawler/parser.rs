//! HTML parser for extracting page text and links
//!
//! Extracts:
//! - The page title (from `<title>`)
//! - The text of every `<p>` element, which becomes the indexed content
//! - Raw `<a href>` targets, resolved later against the page's final URL

use scraper::{ElementRef, Html, Selector};

/// Extracted information from an HTML page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPage {
    /// The page title, if present and non-blank
    pub title: Option<String>,

    /// Non-blank paragraph texts, whitespace-collapsed, in document order
    pub paragraphs: Vec<String>,

    /// Link targets as written in the markup
    pub links: Vec<String>,
}

/// Parses HTML content and extracts title, paragraphs and links
///
/// # Link Extraction Rules
///
/// **Include:** `<a href="...">` anywhere in the document (`rel="nofollow"` included)
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` and `data:` targets
/// - Fragment-only targets (`#section`)
///
/// # Example
///
/// ```
/// use sumi_seek::crawler::parse_html;
///
/// let html = r#"<html><head><title>Cat</title></head>
///     <body><p>The cat sat.</p><a href="/wiki/Dog">Dog</a></body></html>"#;
/// let parsed = parse_html(html);
/// assert_eq!(parsed.title.as_deref(), Some("Cat"));
/// assert_eq!(parsed.paragraphs, vec!["The cat sat."]);
/// assert_eq!(parsed.links, vec!["/wiki/Dog"]);
/// ```
pub fn parse_html(html: &str) -> ParsedPage {
    let document = Html::parse_document(html);

    ParsedPage {
        title: extract_title(&document),
        paragraphs: extract_paragraphs(&document),
        links: extract_links(&document),
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(element_text)
        .filter(|s| !s.is_empty())
}

fn extract_paragraphs(document: &Html) -> Vec<String> {
    let Ok(p_selector) = Selector::parse("p") else {
        return Vec::new();
    };

    document
        .select(&p_selector)
        .map(element_text)
        .filter(|text| !text.is_empty())
        .collect()
}

fn extract_links(document: &Html) -> Vec<String> {
    let Ok(a_selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    document
        .select(&a_selector)
        .filter(|element| element.value().attr("download").is_none())
        .filter_map(|element| element.value().attr("href"))
        .map(str::trim)
        .filter(|href| is_followable(href))
        .map(str::to_string)
        .collect()
}

fn is_followable(href: &str) -> bool {
    if href.is_empty() || href.starts_with('#') {
        return false;
    }

    let lower = href.to_ascii_lowercase();
    !["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}
