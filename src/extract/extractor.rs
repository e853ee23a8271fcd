use crate::cache::{ImageDescriptor, PageMetadata, PageRecord, FLAG_LOW_QUALITY, FLAG_PARSE_ERROR};
use crate::classify::{analyze_structure, refine_kind, ContentKind};
use crate::config::ContentConfig;
use crate::crawler::FetchOutcome;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Class/id fragments that mark navigation chrome
static MENU_CLASS_PATTERNS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(^|[-_ ])(menu|nav|navbar|sidebar|header|footer|breadcrumbs?)([-_ ]|$)")
        .expect("invalid menu pattern")
});

/// Positional chrome, tried after the structural pass
static POSITION_CLASS_PATTERNS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(^|[-_ ])(top|left|right|bottom)[-_]?(bar|rail|panel|column)([-_ ]|$)")
        .expect("invalid position pattern")
});

/// Elements never serialized into cleaned content
const STRIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template", "iframe"];

/// Text-to-link density floor below which a linky element is menu chrome
const LINK_DENSITY_THRESHOLD: f64 = 0.2;

/// Minimum links before the density rule applies
const LINK_DENSITY_MIN_LINKS: usize = 5;

/// Turns fetched HTML into page records
///
/// The extractor never fails fatally: unparseable or empty input produces a
/// stub record flagged `parse-error`, and the page still counts against the
/// session's limits.
pub struct Extractor {
    cfg: ContentConfig,
}

impl Extractor {
    pub fn new(cfg: ContentConfig) -> Self {
        Self { cfg }
    }

    /// Produces a page record from a fetch outcome
    ///
    /// `canonical_url` is the admitted URL; the outcome's final URL records
    /// where redirects landed and is the base for resolving relative links.
    pub fn extract(
        &self,
        canonical_url: &Url,
        outcome: &FetchOutcome,
        kind: ContentKind,
    ) -> PageRecord {
        if outcome.body.trim().is_empty() || !outcome.is_html() {
            return self.stub(canonical_url, &outcome.final_url, kind);
        }

        let document = Html::parse_document(&outcome.body);
        let base = &outcome.final_url;

        let title = extract_title(&document)
            .unwrap_or_else(|| canonical_url.path().trim_matches('/').to_string());

        let metadata = if self.cfg.include_metadata {
            extract_metadata(&document)
        } else {
            PageMetadata::default()
        };

        // Menu exclusion, then main content selection over what remains
        let excluded = if self.cfg.include_menus {
            HashSet::new()
        } else {
            collect_menu_nodes(&document)
        };

        let main = select_main_content(&document, &excluded);

        let mut serializer = Serializer {
            excluded: &excluded,
            remove_images: self.cfg.remove_images,
            base,
            html: String::new(),
            text: String::new(),
            images: Vec::new(),
        };
        match main {
            Some(element) => serializer.walk_children(element),
            None => {
                return self.stub(canonical_url, base, kind);
            }
        }

        let text_content = normalize_whitespace(&serializer.text);
        let word_count = text_content.split_whitespace().count();

        // Links come from the whole document: menus are stripped from the
        // output but still advance the frontier.
        let links = harvest_links(&document, base);

        let structure = analyze_structure(&outcome.body);
        let refined = refine_kind(kind, &structure, self.cfg.min_content_length);

        let mut flags = Vec::new();
        if word_count < self.cfg.min_content_length || refined == ContentKind::LowQuality {
            flags.push(FLAG_LOW_QUALITY.to_string());
        }

        PageRecord {
            url: canonical_url.to_string(),
            final_url: base.to_string(),
            title,
            content: serializer.html,
            text_content,
            metadata,
            images: serializer.images,
            links,
            timestamp: Utc::now(),
            word_count,
            content_type: refined.as_str().to_string(),
            flags,
            depth: 0,
        }
    }

    /// An empty record for pages that could not be extracted
    pub fn stub(&self, canonical_url: &Url, final_url: &Url, kind: ContentKind) -> PageRecord {
        PageRecord {
            url: canonical_url.to_string(),
            final_url: final_url.to_string(),
            title: canonical_url.path().trim_matches('/').to_string(),
            content: String::new(),
            text_content: String::new(),
            metadata: PageMetadata::default(),
            images: vec![],
            links: vec![],
            timestamp: Utc::now(),
            word_count: 0,
            content_type: kind.as_str().to_string(),
            flags: vec![FLAG_PARSE_ERROR.to_string()],
            depth: 0,
        }
    }
}

fn extract_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| normalize_whitespace(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

fn extract_metadata(document: &Html) -> PageMetadata {
    let meta_content = |name: &str| -> Option<String> {
        let selector = Selector::parse(&format!("meta[name='{}']", name)).ok()?;
        document
            .select(&selector)
            .next()
            .and_then(|el| el.value().attr("content"))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    PageMetadata {
        description: meta_content("description").unwrap_or_default(),
        keywords: meta_content("keywords")
            .map(|k| {
                k.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default(),
        author: meta_content("author").unwrap_or_default(),
    }
}

/// Finds elements that read as navigation chrome
///
/// Structural signals first (`<nav>`, ARIA role, class/id naming, header and
/// footer tags), then positional class names, then the link-density rule:
/// an element whose immediate text is mostly link text and which carries
/// more than a handful of links.
fn collect_menu_nodes(document: &Html) -> HashSet<ego_tree::NodeId> {
    let mut excluded = HashSet::new();

    for node in document.root_element().descendants() {
        let Some(element) = ElementRef::wrap(node) else {
            continue;
        };
        let value = element.value();
        let name = value.name();

        let structural = name == "nav"
            || name == "header"
            || name == "footer"
            || value.attr("role") == Some("navigation")
            || has_matching_class_or_id(element, &MENU_CLASS_PATTERNS);

        if structural {
            excluded.insert(node.id());
        }
    }

    for node in document.root_element().descendants() {
        if excluded.contains(&node.id()) {
            continue;
        }
        let Some(element) = ElementRef::wrap(node) else {
            continue;
        };

        if has_matching_class_or_id(element, &POSITION_CLASS_PATTERNS) {
            excluded.insert(node.id());
            continue;
        }

        if is_link_farm(element) {
            excluded.insert(node.id());
        }
    }

    excluded
}

fn has_matching_class_or_id(element: ElementRef, pattern: &Regex) -> bool {
    let value = element.value();
    if let Some(id) = value.id() {
        if pattern.is_match(id) {
            return true;
        }
    }
    value.classes().any(|class| pattern.is_match(class))
}

fn is_link_farm(element: ElementRef) -> bool {
    let name = element.value().name();
    if !matches!(name, "div" | "ul" | "ol" | "section" | "aside") {
        return false;
    }

    let link_selector = Selector::parse("a").expect("static selector");
    let link_count = element.select(&link_selector).count();
    if link_count <= LINK_DENSITY_MIN_LINKS {
        return false;
    }

    let total_text: usize = element.text().map(str::len).sum();
    if total_text == 0 {
        return true;
    }

    let link_text: usize = element
        .select(&link_selector)
        .map(|a| a.text().map(str::len).sum::<usize>())
        .sum();
    let non_link_ratio = 1.0 - (link_text as f64 / total_text as f64);

    non_link_ratio < LINK_DENSITY_THRESHOLD
}

/// Picks the element holding the document's meaningful content
///
/// Preference order: `<main>`, `<article>`, `[role=main]`, then the largest
/// `<div>` by visible text after menu removal, then `<body>`.
fn select_main_content<'a>(
    document: &'a Html,
    excluded: &HashSet<ego_tree::NodeId>,
) -> Option<ElementRef<'a>> {
    for selector_str in ["main", "article", "[role='main']"] {
        let selector = Selector::parse(selector_str).expect("static selector");
        if let Some(element) = document
            .select(&selector)
            .find(|el| !excluded.contains(&el.id()))
        {
            return Some(element);
        }
    }

    let div_selector = Selector::parse("div").expect("static selector");
    let largest_div = document
        .select(&div_selector)
        .filter(|el| !excluded.contains(&el.id()))
        .max_by_key(|el| visible_text_len(*el, excluded));
    if let Some(div) = largest_div {
        if visible_text_len(div, excluded) > 0 {
            return Some(div);
        }
    }

    let body_selector = Selector::parse("body").expect("static selector");
    document.select(&body_selector).next()
}

fn visible_text_len(element: ElementRef, excluded: &HashSet<ego_tree::NodeId>) -> usize {
    let mut len = 0;
    for node in element.descendants() {
        if let Node::Text(text) = node.value() {
            let inside_excluded = node
                .ancestors()
                .any(|ancestor| excluded.contains(&ancestor.id()));
            if !inside_excluded {
                len += text.trim().len();
            }
        }
    }
    len
}

/// Serializes the selected content subtree, skipping excluded nodes and
/// collecting visible text and image descriptors along the way
struct Serializer<'a> {
    excluded: &'a HashSet<ego_tree::NodeId>,
    remove_images: bool,
    base: &'a Url,
    html: String,
    text: String,
    images: Vec<ImageDescriptor>,
}

impl Serializer<'_> {
    fn walk_children(&mut self, element: ElementRef) {
        for child in element.children() {
            self.walk(child);
        }
    }

    fn walk(&mut self, node: ego_tree::NodeRef<Node>) {
        match node.value() {
            Node::Text(text) => {
                self.html.push_str(&escape_text(text));
                self.text.push_str(text);
                self.text.push(' ');
            }
            Node::Element(_) => {
                let element = ElementRef::wrap(node).expect("element node wraps");
                self.write_element(element);
            }
            _ => {}
        }
    }

    fn write_element(&mut self, element: ElementRef) {
        let node = *element;
        if self.excluded.contains(&node.id()) {
            return;
        }

        let value = element.value();
        let name = value.name();

        if STRIPPED_TAGS.contains(&name) {
            return;
        }

        if name == "img" {
            self.write_image(element);
            return;
        }

        self.html.push('<');
        self.html.push_str(name);
        for (attr_name, attr_value) in value.attrs() {
            self.html.push(' ');
            self.html.push_str(attr_name);
            self.html.push_str("=\"");
            self.html.push_str(&escape_attr(attr_value));
            self.html.push('"');
        }

        if is_void_element(name) {
            self.html.push_str(">");
            return;
        }
        self.html.push('>');

        for child in node.children() {
            self.walk(child);
        }

        self.html.push_str("</");
        self.html.push_str(name);
        self.html.push('>');
    }

    fn write_image(&mut self, element: ElementRef) {
        let value = element.value();
        let src = value.attr("src").unwrap_or_default();
        let alt = value.attr("alt").unwrap_or_default().to_string();
        let title = value.attr("title").map(str::to_string);

        let absolute = self.base.join(src).map(|u| u.to_string()).ok();

        if let Some(src) = &absolute {
            self.images.push(ImageDescriptor {
                src: src.clone(),
                local_path: None,
                alt: alt.clone(),
                title: title.clone(),
                caption: find_caption(element),
            });
        }

        if self.remove_images {
            let placeholder = image_placeholder(&alt, title.as_deref(), src);
            self.html
                .push_str(&format!("<em>[{}]</em>", escape_text(&placeholder)));
            self.text.push_str(&placeholder);
            self.text.push(' ');
        } else {
            let resolved = absolute.as_deref().unwrap_or(src);
            self.html.push_str("<img src=\"");
            self.html.push_str(&escape_attr(resolved));
            self.html.push('"');
            if !alt.is_empty() {
                self.html.push_str(" alt=\"");
                self.html.push_str(&escape_attr(&alt));
                self.html.push('"');
            }
            if let Some(t) = &title {
                self.html.push_str(" title=\"");
                self.html.push_str(&escape_attr(t));
                self.html.push('"');
            }
            self.html.push('>');
        }
    }
}

/// Placeholder text chain: alt, title, cleaned filename, literal fallback
fn image_placeholder(alt: &str, title: Option<&str>, src: &str) -> String {
    if !alt.trim().is_empty() {
        return alt.trim().to_string();
    }
    if let Some(title) = title {
        if !title.trim().is_empty() {
            return title.trim().to_string();
        }
    }
    let filename = src
        .rsplit('/')
        .next()
        .unwrap_or("")
        .split('.')
        .next()
        .unwrap_or("")
        .replace(['-', '_'], " ");
    let filename = filename.trim().to_string();
    if !filename.is_empty() {
        return filename;
    }
    "image removed".to_string()
}

/// Caption from an enclosing `<figure>`'s `<figcaption>`, if any
fn find_caption(element: ElementRef) -> Option<String> {
    let node = *element;
    let figure = node.ancestors().find_map(|a| {
        let el = ElementRef::wrap(a)?;
        (el.value().name() == "figure").then_some(el)
    })?;

    let selector = Selector::parse("figcaption").expect("static selector");
    figure
        .select(&selector)
        .next()
        .map(|c| normalize_whitespace(&c.text().collect::<String>()))
        .filter(|c| !c.is_empty())
}

/// Collects absolute outbound links from the whole document
fn harvest_links(document: &Html, base: &Url) -> Vec<String> {
    let selector = Selector::parse("a[href]").expect("static selector");
    let mut links = Vec::new();
    let mut seen = HashSet::new();

    for element in document.select(&selector) {
        if element.value().attr("download").is_some() {
            continue;
        }
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Some(absolute) = resolve_link(href, base) else {
            continue;
        };
        if seen.insert(absolute.clone()) {
            links.push(absolute);
        }
    }

    links
}

/// Resolves an href to an absolute HTTP(S) URL, or discards it
///
/// Fragment-only anchors and javascript:/mailto:/tel:/data: links are not
/// crawlable and return None.
fn resolve_link(href: &str, base: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if lowered.starts_with("javascript:")
        || lowered.starts_with("mailto:")
        || lowered.starts_with("tel:")
        || lowered.starts_with("data:")
    {
        return None;
    }

    let absolute = base.join(href).ok()?;
    match absolute.scheme() {
        "http" | "https" => Some(absolute.to_string()),
        _ => None,
    }
}

fn is_void_element(name: &str) -> bool {
    matches!(
        name,
        "area" | "base" | "br" | "col" | "embed" | "hr" | "img" | "input" | "link" | "meta"
            | "source" | "track" | "wbr"
    )
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn outcome(body: &str) -> FetchOutcome {
        FetchOutcome {
            status: 200,
            final_url: Url::parse("https://example.org/guide/page").unwrap(),
            content_type: "text/html".to_string(),
            body: body.to_string(),
            elapsed: Duration::ZERO,
            rate_limited: false,
        }
    }

    fn extract(body: &str) -> PageRecord {
        extract_with(body, ContentConfig::default())
    }

    fn extract_with(body: &str, cfg: ContentConfig) -> PageRecord {
        let extractor = Extractor::new(cfg);
        let url = Url::parse("https://example.org/guide/page").unwrap();
        extractor.extract(&url, &outcome(body), ContentKind::Documentation)
    }

    #[test]
    fn test_title_and_metadata() {
        let record = extract(
            r#"<html><head>
                <title>  The Guide  </title>
                <meta name="description" content="A fine guide">
                <meta name="keywords" content="rust, crawling , docs">
                <meta name="author" content="Jo">
            </head><body><main><p>Hello world</p></main></body></html>"#,
        );
        assert_eq!(record.title, "The Guide");
        assert_eq!(record.metadata.description, "A fine guide");
        assert_eq!(record.metadata.keywords, vec!["rust", "crawling", "docs"]);
        assert_eq!(record.metadata.author, "Jo");
    }

    #[test]
    fn test_main_content_preferred_over_body() {
        let record = extract(
            r#"<html><body>
                <div>Sidebar junk everywhere</div>
                <main><p>Actual content lives here</p></main>
            </body></html>"#,
        );
        assert!(record.content.contains("Actual content"));
        assert!(!record.content.contains("Sidebar junk"));
    }

    #[test]
    fn test_article_fallback() {
        let record = extract(
            r#"<html><body><article><h1>Post</h1><p>Body text</p></article></body></html>"#,
        );
        assert!(record.content.contains("Body text"));
    }

    #[test]
    fn test_largest_div_fallback() {
        let record = extract(
            r#"<html><body>
                <div>tiny</div>
                <div><p>This much longer division holds the real page content
                for the reader to enjoy at length.</p></div>
            </body></html>"#,
        );
        assert!(record.content.contains("real page content"));
    }

    #[test]
    fn test_nav_stripped_but_links_harvested() {
        let record = extract(
            r#"<html><body>
                <nav><a href="/guide/other">Other</a></nav>
                <main><p>Content words here for the page body.</p>
                <a href="/guide/child">Child</a></main>
            </body></html>"#,
        );
        assert!(!record.content.contains("Other"));
        assert!(record
            .links
            .contains(&"https://example.org/guide/other".to_string()));
        assert!(record
            .links
            .contains(&"https://example.org/guide/child".to_string()));
    }

    #[test]
    fn test_menu_class_removed() {
        let record = extract(
            r#"<html><body><main>
                <div class="sidebar-menu"><a href="/a">A</a><a href="/b">B</a></div>
                <p>Real words of the page.</p>
            </main></body></html>"#,
        );
        assert!(!record.content.contains("sidebar-menu"));
        assert!(record.content.contains("Real words"));
    }

    #[test]
    fn test_include_menus_keeps_nav() {
        let mut cfg = ContentConfig::default();
        cfg.include_menus = true;
        let record = extract_with(
            r#"<html><body><main><nav><a href="/x">X</a></nav><p>Words</p></main></body></html>"#,
            cfg,
        );
        assert!(record.content.contains("<nav>"));
    }

    #[test]
    fn test_link_farm_removed_by_density() {
        let record = extract(
            r#"<html><body><main>
                <ul>
                    <a href="/1">one</a><a href="/2">two</a><a href="/3">three</a>
                    <a href="/4">four</a><a href="/5">five</a><a href="/6">six</a>
                </ul>
                <p>Paragraph with plenty of ordinary running text in it.</p>
            </main></body></html>"#,
        );
        assert!(!record.content.contains(">one<"));
        assert!(record.content.contains("ordinary running text"));
    }

    #[test]
    fn test_script_and_style_always_stripped() {
        let record = extract(
            r#"<html><body><main>
                <script>alert(1)</script><style>p{}</style><p>Visible</p>
            </main></body></html>"#,
        );
        assert!(!record.content.contains("alert"));
        assert!(!record.content.contains("p{}"));
        assert!(record.content.contains("Visible"));
    }

    #[test]
    fn test_image_descriptor_recorded_with_absolute_src() {
        let record = extract(
            r#"<html><body><main>
                <figure>
                    <img src="../pics/chart.png" alt="A chart" title="Chart">
                    <figcaption>Figure 1</figcaption>
                </figure>
                <p>Words</p>
            </main></body></html>"#,
        );
        assert_eq!(record.images.len(), 1);
        let img = &record.images[0];
        assert_eq!(img.src, "https://example.org/pics/chart.png");
        assert_eq!(img.alt, "A chart");
        assert_eq!(img.title.as_deref(), Some("Chart"));
        assert_eq!(img.caption.as_deref(), Some("Figure 1"));
        assert!(img.local_path.is_none());
    }

    #[test]
    fn test_remove_images_placeholder_chain() {
        let mut cfg = ContentConfig::default();
        cfg.remove_images = true;
        let record = extract_with(
            r#"<html><body><main>
                <img src="/a.png" alt="An alt">
                <img src="/b.png" title="A title">
                <img src="/some-file_name.png">
                <img src="">
                <p>Words</p>
            </main></body></html>"#,
            cfg,
        );
        assert!(record.content.contains("[An alt]"));
        assert!(record.content.contains("[A title]"));
        assert!(record.content.contains("[some file name]"));
        assert!(record.content.contains("[image removed]"));
        assert!(!record.content.contains("<img"));
    }

    #[test]
    fn test_link_filtering() {
        let record = extract(
            r##"<html><body><main>
                <a href="/ok">ok</a>
                <a href="javascript:void(0)">js</a>
                <a href="mailto:x@y.z">mail</a>
                <a href="tel:+123">tel</a>
                <a href="#frag">frag</a>
                <a href="/file.zip" download>dl</a>
                <a href="ftp://example.org/f">ftp</a>
                <p>Words</p>
            </main></body></html>"##,
        );
        assert_eq!(record.links, vec!["https://example.org/ok".to_string()]);
    }

    #[test]
    fn test_nofollow_links_still_harvested() {
        let record = extract(
            r#"<html><body><main><a href="/page" rel="nofollow">L</a><p>W</p></main></body></html>"#,
        );
        assert_eq!(record.links.len(), 1);
    }

    #[test]
    fn test_low_quality_flag() {
        let record = extract(r#"<html><body><main><p>Too few words</p></main></body></html>"#);
        assert!(record.has_flag(FLAG_LOW_QUALITY));
        assert_eq!(record.content_type, "low-quality");
    }

    #[test]
    fn test_substantial_page_not_flagged() {
        let words = "word ".repeat(120);
        let html = format!(
            r#"<html><body><main><h1>T</h1><p>{}</p></main></body></html>"#,
            words
        );
        let record = extract(&html);
        assert!(!record.has_flag(FLAG_LOW_QUALITY));
        assert_eq!(record.content_type, "documentation");
        assert!(record.word_count >= 120);
    }

    #[test]
    fn test_empty_body_yields_stub() {
        let record = extract("");
        assert!(record.has_flag(FLAG_PARSE_ERROR));
        assert!(record.content.is_empty());
        assert_eq!(record.word_count, 0);
    }

    #[test]
    fn test_non_html_yields_stub() {
        let extractor = Extractor::new(ContentConfig::default());
        let url = Url::parse("https://example.org/guide/data").unwrap();
        let mut oc = outcome("binary-ish");
        oc.content_type = "application/octet-stream".to_string();
        let record = extractor.extract(&url, &oc, ContentKind::Content);
        assert!(record.has_flag(FLAG_PARSE_ERROR));
    }

    #[test]
    fn test_text_content_normalized() {
        let record = extract(
            "<html><body><main><p>Spaced\n\n   out    text</p></main></body></html>",
        );
        assert_eq!(record.text_content, "Spaced out text");
        assert_eq!(record.word_count, 3);
    }

    #[test]
    fn test_placeholder_chain_unit() {
        assert_eq!(image_placeholder("alt", Some("t"), "/x.png"), "alt");
        assert_eq!(image_placeholder("", Some("t"), "/x.png"), "t");
        assert_eq!(image_placeholder("", None, "/my-chart_v2.png"), "my chart v2");
        assert_eq!(image_placeholder("", None, ""), "image removed");
    }
}
