//! Content extraction functionality for the crawler module

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::crawler::PageMetadata;
use crate::crawler::error::CrawlError;
use crate::crawler::validate::persian_ratio;
use crate::registry::LegalSource;

/// Selectors tried when a source has none, or none of its own matched
const GENERIC_SELECTORS: &[&str] = &[
    ".law-content",
    "#lawContent",
    "article",
    "main",
    ".content",
    "#content",
    ".main-content",
    ".post-content",
    ".entry-content",
    ".news-content",
    ".news-body",
];

/// Boilerplate skipped everywhere
const DEFAULT_EXCLUDES: &[&str] = &[
    "script",
    "style",
    "noscript",
    "nav",
    "header",
    "footer",
    "aside",
    "form",
    "iframe",
    ".menu",
    "#menu",
    ".sidebar",
    ".breadcrumb",
];

/// Elements that start a new line of text
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "br", "li", "tr", "h1", "h2", "h3", "h4", "h5", "h6", "section", "article",
    "blockquote", "table", "ul", "ol",
];

/// A selector hit shorter than this is treated as a miss
const MIN_SELECTOR_CHARS: usize = 80;

/// Shortest paragraph kept by the heuristic
const MIN_PARAGRAPH_CHARS: usize = 40;

/// Words that mark a paragraph as legal text even when mixed with Latin script
const LEGAL_MARKERS: &[&str] = &["ماده", "تبصره", "قانون", "مصوب", "بند", "آیین‌نامه", "مقررات"];

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9۰-۹٠-٩]{4}[/\-.][0-9۰-۹٠-٩]{1,2}[/\-.][0-9۰-۹٠-٩]{1,2}")
        .expect("date regex is valid")
});

/// How the content was located
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "selector", rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// A selector from the source registry
    Selector(String),
    /// One of the generic content selectors
    Generic(String),
    /// Persian paragraph heuristic
    Heuristic,
}

impl ExtractionMethod {
    /// Short form stored alongside documents, e.g. `selector:.law-content`
    pub fn label(&self) -> String {
        match self {
            ExtractionMethod::Selector(s) => format!("selector:{}", s),
            ExtractionMethod::Generic(s) => format!("generic:{}", s),
            ExtractionMethod::Heuristic => "heuristic".to_string(),
        }
    }
}

/// Text pulled out of a page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub url: String,
    pub title: Option<String>,
    /// Normalised text, one block per line
    pub content: String,
    pub metadata: PageMetadata,
    pub extraction_method: ExtractionMethod,
}

/// Arabic letter forms folded to Persian; `None` for tatweel
pub fn fold_char(c: char) -> Option<char> {
    match c {
        'ي' | 'ى' => Some('ی'),
        'ك' => Some('ک'),
        'ـ' => None,
        c => Some(c),
    }
}

/// Normalise Persian text: Arabic yeh and kaf become their Persian forms,
/// tatweel is dropped and whitespace runs collapse to one space.
/// ZWNJ is kept since it is part of Persian orthography.
pub fn normalize_persian(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in text.chars().filter_map(fold_char) {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(c);
    }

    out
}

fn parse_selectors<'a>(selectors: impl IntoIterator<Item = &'a str>) -> Vec<(String, Selector)> {
    selectors
        .into_iter()
        .filter_map(|s| match Selector::parse(s) {
            Ok(selector) => Some((s.to_string(), selector)),
            Err(e) => {
                warn!("Failed to parse selector '{}': {}", s, e);
                None
            }
        })
        .collect()
}

/// Text of `element` with excluded subtrees skipped and block boundaries kept as newlines
fn collect_text(element: ElementRef<'_>, excludes: &[Selector], out: &mut String) {
    for child in element.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            if excludes.iter().any(|s| s.matches(&child_el)) {
                continue;
            }
            let block = BLOCK_ELEMENTS.contains(&child_el.value().name());
            if block {
                out.push('\n');
            }
            collect_text(child_el, excludes, out);
            if block {
                out.push('\n');
            }
        } else if let Node::Text(text) = child.value() {
            out.push_str(text);
        }
    }
}

/// Normalise each line and drop the empty ones
fn tidy_lines(raw: &str) -> String {
    raw.lines()
        .map(normalize_persian)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn element_text(element: ElementRef<'_>, excludes: &[Selector]) -> String {
    let mut raw = String::new();
    collect_text(element, excludes, &mut raw);
    tidy_lines(&raw)
}

/// First selector whose matches yield enough text
fn select_content(
    document: &Html,
    selectors: &[(String, Selector)],
    excludes: &[Selector],
) -> Option<(String, String)> {
    for (name, selector) in selectors {
        let text = document
            .select(selector)
            .map(|el| element_text(el, excludes))
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if text.chars().count() >= MIN_SELECTOR_CHARS {
            return Some((name.clone(), text));
        }
    }
    None
}

fn looks_legal(paragraph: &str) -> bool {
    paragraph.chars().count() >= MIN_PARAGRAPH_CHARS
        && (persian_ratio(paragraph) >= 0.5 || LEGAL_MARKERS.iter().any(|m| paragraph.contains(m)))
}

/// Persian paragraphs anywhere in the page
fn heuristic_content(document: &Html, excludes: &[Selector]) -> Option<String> {
    let paragraphs = Selector::parse("p, li, td, blockquote").ok()?;
    let mut kept: Vec<String> = Vec::new();

    for element in document.select(&paragraphs) {
        let text = element_text(element, excludes).replace('\n', " ");
        if looks_legal(&text) && kept.last() != Some(&text) {
            kept.push(text);
        }
    }

    if kept.is_empty() {
        let body = Selector::parse("body").ok()?;
        let text = document
            .select(&body)
            .next()
            .map(|el| element_text(el, excludes))?;
        return looks_legal(&text).then_some(text);
    }

    Some(kept.join("\n"))
}

fn first_text(document: &Html, selectors: &[(String, Selector)]) -> Option<String> {
    selectors.iter().find_map(|(_, selector)| {
        document
            .select(selector)
            .map(|el| normalize_persian(&el.text().collect::<String>()))
            .find(|t| !t.is_empty())
    })
}

/// Extract the document text from a page
///
/// Tries the source's selectors, then the generic ones, then the paragraph
/// heuristic. Navigation, scripts and the source's own exclusions are skipped.
pub fn extract_document(
    url: &str,
    html: &str,
    source: Option<&LegalSource>,
) -> Result<ExtractedDocument, CrawlError> {
    let document = Html::parse_document(html);
    let mut metadata = extract_metadata(url, html)?;

    let excludes: Vec<Selector> = parse_selectors(
        DEFAULT_EXCLUDES
            .iter()
            .copied()
            .chain(source.into_iter().flat_map(|s| s.selectors.exclude.iter().map(String::as_str))),
    )
    .into_iter()
    .map(|(_, s)| s)
    .collect();

    let source_selectors = source
        .map(|s| parse_selectors(s.selectors.content.iter().map(String::as_str)))
        .unwrap_or_default();
    let generic_selectors = parse_selectors(GENERIC_SELECTORS.iter().copied());

    let (content, extraction_method) =
        if let Some((sel, text)) = select_content(&document, &source_selectors, &excludes) {
            (text, ExtractionMethod::Selector(sel))
        } else if let Some((sel, text)) = select_content(&document, &generic_selectors, &excludes) {
            (text, ExtractionMethod::Generic(sel))
        } else if let Some(text) = heuristic_content(&document, &excludes) {
            (text, ExtractionMethod::Heuristic)
        } else {
            return Err(CrawlError::ContentExtraction(format!(
                "No legal text found in {}",
                url
            )));
        };

    let mut title = None;
    if let Some(source) = source {
        title = first_text(
            &document,
            &parse_selectors(source.selectors.title.iter().map(String::as_str)),
        );
        if let Some(date) = first_text(
            &document,
            &parse_selectors(source.selectors.date.iter().map(String::as_str)),
        ) {
            metadata.publication_date = DATE_RE
                .find(&date)
                .map(|m| m.as_str().to_string())
                .or(Some(date));
        }
    }
    let title = title
        .or_else(|| first_text(&document, &parse_selectors(["h1"])))
        .or_else(|| metadata.title.clone());

    debug!(
        "Extracted {} chars from {} via {:?}",
        content.chars().count(),
        url,
        extraction_method
    );

    Ok(ExtractedDocument {
        url: url.to_string(),
        title,
        content,
        metadata,
        extraction_method,
    })
}

fn meta_content(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("content"))
        .map(normalize_persian)
        .find(|s| !s.is_empty())
}

/// Extract metadata from a page
///
/// # Arguments
///
/// * `url` - The URL of the page
/// * `html` - The HTML of the page
///
/// # Returns
///
/// The extracted metadata
pub fn extract_metadata(url: &str, html: &str) -> Result<PageMetadata, CrawlError> {
    let document = Html::parse_document(html);

    let parsed_url = Url::parse(url).map_err(CrawlError::UrlParse)?;
    let domain = parsed_url
        .host_str()
        .ok_or_else(|| CrawlError::Other("Failed to extract domain from URL".to_string()))?
        .to_string();

    let title_selector = Selector::parse("title")
        .map_err(|e| CrawlError::HtmlParse(format!("Failed to parse title selector: {}", e)))?;
    let title = document
        .select(&title_selector)
        .next()
        .map(|element| normalize_persian(&element.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .or_else(|| meta_content(&document, "meta[property='og:title']"));

    let description = meta_content(&document, "meta[name='description']")
        .or_else(|| meta_content(&document, "meta[property='og:description']"));

    let author = meta_content(&document, "meta[name='author']");

    let keywords = meta_content(&document, "meta[name='keywords']")
        .map(|k| {
            k.split([',', '،'])
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    // Meta tags first, then the first date-shaped string in the body
    let publication_date = [
        "meta[property='article:published_time']",
        "meta[name='date']",
        "meta[name='DC.date']",
        "meta[name='dcterms.issued']",
    ]
    .iter()
    .find_map(|s| meta_content(&document, s))
    .or_else(|| {
        let text = document.root_element().text().collect::<String>();
        DATE_RE.find(&text).map(|m| m.as_str().to_string())
    });

    Ok(PageMetadata {
        title,
        description,
        publication_date,
        author,
        keywords,
        domain,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SourceRegistry;

    const LAW_PAGE: &str = r#"
        <html>
          <head>
            <title>قانون مدني | مرکز پژوهش‌ها</title>
            <meta name="description" content="متن کامل قانون مدنی">
            <meta name="keywords" content="قانون، حقوق مدنی, اموال">
          </head>
          <body>
            <nav><ul><li>صفحه اصلی</li><li>قوانین</li></ul></nav>
            <h1 class="law-title">قانون مدني</h1>
            <span class="date">مصوب ۱۳۰۷/۰۲/۱۸</span>
            <div class="law-content">
              <p>ماده ۱ - مصوبات مجلس شوراي اسلامي و نتيجه همه‌پرسي پس از طي مراحل قانوني به رئيس جمهور ابلاغ مي‌گردد.</p>
              <p>ماده ۲ - قوانين پانزده روز پس از انتشار در سراسر کشور لازم‌الاجرا است.</p>
              <script>var tracking = 1;</script>
            </div>
            <footer>کلیه حقوق محفوظ است</footer>
          </body>
        </html>"#;

    #[test]
    fn test_normalize_persian() {
        assert_eq!(normalize_persian("علي  كتاب"), "علی کتاب");
        assert_eq!(normalize_persian("قانــــون"), "قانون");
        assert_eq!(normalize_persian("  می\u{200c}شود \n\t "), "می\u{200c}شود");
        assert_eq!(normalize_persian(""), "");
    }

    #[test]
    fn test_extract_with_source_selectors() {
        let registry = SourceRegistry::default();
        let url = "https://rc.majlis.ir/fa/law/show/92778";
        let source = registry.lookup(url);
        assert!(source.is_some());

        let doc = extract_document(url, LAW_PAGE, source).unwrap();

        assert_eq!(doc.extraction_method, ExtractionMethod::Selector(".law-content".to_string()));
        assert_eq!(doc.title.as_deref(), Some("قانون مدنی"));
        assert!(doc.content.starts_with("ماده ۱ - مصوبات مجلس شورای اسلامی"));
        assert!(doc.content.contains("\nماده ۲"));
        assert!(!doc.content.contains("tracking"));
        assert!(!doc.content.contains("صفحه اصلی"));
        assert_eq!(doc.metadata.publication_date.as_deref(), Some("۱۳۰۷/۰۲/۱۸"));
    }

    #[test]
    fn test_extract_generic_without_source() {
        let html = format!(
            "<html><body><header>سربرگ</header><article><p>{}</p></article></body></html>",
            "تبصره - این آیین‌نامه از تاریخ ابلاغ اجرا می‌شود. ".repeat(4)
        );
        let doc = extract_document("https://example.ir/a", &html, None).unwrap();

        assert_eq!(doc.extraction_method, ExtractionMethod::Generic("article".to_string()));
        assert!(!doc.content.contains("سربرگ"));
    }

    #[test]
    fn test_extract_heuristic_paragraphs() {
        let html = r#"<html><body>
            <table><tr><td>ماده ۵ - کلیه ساکنین ایران اعم از اتباع داخله و خارجه مطیع قوانین ایران خواهند بود.</td></tr></table>
            <p>short</p>
            <p>This paragraph is long enough but it is entirely written in English text.</p>
        </body></html>"#;
        let doc = extract_document("https://unknown.ir/x", html, None).unwrap();

        assert_eq!(doc.extraction_method, ExtractionMethod::Heuristic);
        assert!(doc.content.starts_with("ماده ۵"));
        assert!(!doc.content.contains("English"));
    }

    #[test]
    fn test_extract_fails_without_text() {
        let result = extract_document("https://unknown.ir/x", "<html><body><p>hi</p></body></html>", None);
        assert!(matches!(result, Err(CrawlError::ContentExtraction(_))));
    }

    #[test]
    fn test_extract_metadata() {
        let metadata = extract_metadata("https://rc.majlis.ir/fa/law/show/92778", LAW_PAGE).unwrap();

        assert_eq!(metadata.title.as_deref(), Some("قانون مدنی | مرکز پژوهش‌ها"));
        assert_eq!(metadata.description.as_deref(), Some("متن کامل قانون مدنی"));
        assert_eq!(metadata.keywords, vec!["قانون", "حقوق مدنی", "اموال"]);
        assert_eq!(metadata.publication_date.as_deref(), Some("۱۳۰۷/۰۲/۱۸"));
        assert_eq!(metadata.domain, "rc.majlis.ir");
        assert!(metadata.author.is_none());
    }

    #[test]
    fn test_extract_metadata_prefers_meta_date() {
        let html = r#"<html><head><meta property="article:published_time" content="2023-05-01T10:00:00Z"></head>
            <body>1402/02/11</body></html>"#;
        let metadata = extract_metadata("https://dolat.ir/detail/1", html).unwrap();
        assert_eq!(metadata.publication_date.as_deref(), Some("2023-05-01T10:00:00Z"));
    }

    #[test]
    fn test_extract_metadata_invalid_url() {
        assert!(matches!(
            extract_metadata("not a url", "<html></html>"),
            Err(CrawlError::UrlParse(_))
        ));
    }
}
