use crate::assemble::{AssembleError, ChunkInfo, Generator, OutputContext};
use crate::cache::{PageRecord, FLAG_PARSE_ERROR};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

static EXCESS_BLANK_LINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{3,}").expect("invalid cleanup pattern"));

/// Converts cleaned HTML to Markdown
///
/// Handles headings, paragraphs, emphasis, links, images, ordered and
/// unordered lists (renumbered), inline and fenced code, blockquotes,
/// horizontal rules, and simple tables. Unknown elements contribute their
/// children inline.
pub fn html_to_markdown(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }

    let fragment = Html::parse_fragment(html);
    let rendered = render_children(fragment.root_element(), 0);

    let cleaned = EXCESS_BLANK_LINES.replace_all(&rendered, "\n\n");
    cleaned
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn render_children(element: ElementRef, list_depth: usize) -> String {
    let mut out = String::new();
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&collapse_whitespace(text)),
            Node::Element(_) => {
                let child_el = ElementRef::wrap(child).expect("element node wraps");
                out.push_str(&render_element(child_el, list_depth));
            }
            _ => {}
        }
    }
    out
}

fn render_element(element: ElementRef, list_depth: usize) -> String {
    let name = element.value().name();

    match name {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = name[1..].parse::<usize>().unwrap_or(1);
            format!(
                "\n\n{} {}\n\n",
                "#".repeat(level),
                render_children(element, list_depth).trim()
            )
        }
        "p" => format!("\n\n{}\n\n", render_children(element, list_depth).trim()),
        "strong" | "b" => format!("**{}**", render_children(element, list_depth).trim()),
        "em" | "i" => format!("*{}*", render_children(element, list_depth).trim()),
        "a" => {
            let text = render_children(element, list_depth);
            let text = text.trim();
            match element.value().attr("href") {
                Some(href) if !text.is_empty() => format!("[{}]({})", text, href),
                _ => text.to_string(),
            }
        }
        "img" => {
            let alt = element.value().attr("alt").unwrap_or_default();
            let src = element.value().attr("src").unwrap_or_default();
            format!("![{}]({})", alt, src)
        }
        "ul" => render_list(element, false, list_depth),
        "ol" => render_list(element, true, list_depth),
        "pre" => {
            let code: String = element.text().collect();
            format!("\n\n```\n{}\n```\n\n", code.trim_matches('\n'))
        }
        "code" => {
            let code: String = element.text().collect();
            format!("`{}`", code)
        }
        "blockquote" => {
            let inner = render_children(element, list_depth);
            let quoted = inner
                .trim()
                .lines()
                .map(|line| {
                    if line.trim().is_empty() {
                        ">".to_string()
                    } else {
                        format!("> {}", line.trim())
                    }
                })
                .collect::<Vec<_>>()
                .join("\n");
            format!("\n\n{}\n\n", quoted)
        }
        "hr" => "\n\n---\n\n".to_string(),
        "br" => "\n".to_string(),
        "table" => render_table(element),
        "div" | "section" | "article" | "main" | "aside" | "figure" | "header" | "footer" => {
            format!(
                "\n\n{}\n\n",
                render_children(element, list_depth).trim()
            )
        }
        "figcaption" => format!("\n*{}*\n", render_children(element, list_depth).trim()),
        _ => render_children(element, list_depth),
    }
}

fn render_list(element: ElementRef, ordered: bool, list_depth: usize) -> String {
    let mut out = String::new();
    out.push_str(if list_depth == 0 { "\n\n" } else { "\n" });

    let indent = "  ".repeat(list_depth);
    let mut number = 1;

    for child in element.children() {
        let Some(li) = ElementRef::wrap(child) else {
            continue;
        };
        if li.value().name() != "li" {
            continue;
        }

        let marker = if ordered {
            format!("{}. ", number)
        } else {
            "- ".to_string()
        };
        number += 1;

        let content = render_children(li, list_depth + 1);
        out.push_str(&format!("{}{}{}\n", indent, marker, content.trim()));
    }

    if list_depth == 0 {
        out.push('\n');
    }
    out
}

fn render_table(element: ElementRef) -> String {
    let mut rows: Vec<Vec<String>> = Vec::new();

    for node in element.descendants() {
        let Some(el) = ElementRef::wrap(node) else {
            continue;
        };
        if el.value().name() != "tr" {
            continue;
        }

        let mut cells = Vec::new();
        for cell_node in el.children() {
            let Some(cell) = ElementRef::wrap(cell_node) else {
                continue;
            };
            if matches!(cell.value().name(), "td" | "th") {
                cells.push(render_children(cell, 0).trim().to_string());
            }
        }
        if !cells.is_empty() {
            rows.push(cells);
        }
    }

    if rows.is_empty() {
        return String::new();
    }

    let mut out = String::from("\n\n");
    for (i, row) in rows.iter().enumerate() {
        out.push_str(&format!("| {} |\n", row.join(" | ")));
        if i == 0 {
            out.push_str(&format!("|{}\n", "---|".repeat(row.len())));
        }
    }
    out.push('\n');
    out
}

fn collapse_whitespace(text: &str) -> String {
    if text.trim().is_empty() {
        // Keep a single separator so words across tags do not fuse
        if text.is_empty() {
            return String::new();
        }
        return " ".to_string();
    }

    let mut collapsed = String::with_capacity(text.len());
    if text.starts_with(char::is_whitespace) {
        collapsed.push(' ');
    }
    collapsed.push_str(&text.split_whitespace().collect::<Vec<_>>().join(" "));
    if text.ends_with(char::is_whitespace) {
        collapsed.push(' ');
    }
    collapsed
}

/// Lowercase hyphenated slug of a title, for anchors and filenames
pub fn slugify(title: &str) -> String {
    let mut slug = String::new();
    for c in title.to_lowercase().chars() {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if c.is_whitespace() || c == '-' || c == '_' {
            if !slug.ends_with('-') {
                slug.push('-');
            }
        }
    }
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "page".to_string()
    } else {
        slug
    }
}

/// Assigns unique filenames by suffixing duplicate slugs
fn dedup_slug(slug: String, used: &mut HashMap<String, usize>) -> String {
    let count = used.entry(slug.clone()).or_insert(0);
    *count += 1;
    if *count == 1 {
        slug
    } else {
        format!("{}-{}", slug, count)
    }
}

/// The Markdown output backend
///
/// Single-file mode emits one document with a TOC and `---`-separated
/// sections; multi-file mode emits a directory with a README index and one
/// file per page.
pub struct MarkdownGenerator;

impl MarkdownGenerator {
    fn document_header(ctx: &OutputContext, total_pages: usize) -> String {
        let mut out = String::new();
        out.push_str(&format!("# Website Content: {}\n\n", ctx.host()));
        out.push_str(&format!("**Source:** {}\n", ctx.base_url));
        out.push_str(&format!(
            "**Generated:** {}\n",
            Utc::now().format("%Y-%m-%d %H:%M:%S")
        ));
        out.push_str(&format!("**Total Pages:** {}\n", total_pages));
        out
    }

    fn section(record: &PageRecord, page_number: usize, anchor: &str) -> String {
        let mut out = String::new();
        out.push_str(&format!("<a id=\"{}\"></a>\n\n", anchor));
        out.push_str(&format!("## {}. {}\n\n", page_number, record.title));
        out.push_str(&format!("**URL:** {}\n", record.url));
        out.push_str(&format!(
            "**Scraped:** {}\n\n",
            record.timestamp.format("%Y-%m-%d %H:%M:%S")
        ));

        if record.has_flag(FLAG_PARSE_ERROR) {
            out.push_str("*Content could not be extracted for this page.*\n");
        } else {
            out.push_str(&html_to_markdown(&record.content));
            out.push('\n');
        }
        out
    }

    fn build_document(
        records: &[PageRecord],
        ctx: &OutputContext,
        first_page_number: usize,
        chunk: Option<ChunkInfo>,
        prefix: Option<&str>,
    ) -> String {
        let mut parts = Vec::new();

        let mut header = match chunk {
            Some(info) => {
                let mut h = format!(
                    "# {} - Part {} of {}\n\n",
                    ctx.host(),
                    info.number,
                    info.total
                );
                h.push_str(&format!("**Source:** {}\n", ctx.base_url));
                h.push_str(&format!(
                    "**Generated:** {}\n",
                    Utc::now().format("%Y-%m-%d %H:%M:%S")
                ));
                h.push_str(&format!("**Pages in this chunk:** {}\n", records.len()));
                h
            }
            None => Self::document_header(ctx, records.len()),
        };

        // Prev/next navigation between chunk files
        if let (Some(info), Some(prefix)) = (chunk, prefix) {
            if info.number > 1 {
                let prev = super::chunk_filename(prefix, info.number - 1, info.total, "md");
                header.push_str(&format!("**Previous:** [{}](./{})\n", prev, prev));
            }
            if info.number < info.total {
                let next = super::chunk_filename(prefix, info.number + 1, info.total, "md");
                header.push_str(&format!("**Next:** [{}](./{})\n", next, next));
            }
        }
        parts.push(header);

        // Anchors are slugified titles, deduplicated by suffix within the
        // document; the same scheme names files in multi-file mode.
        let mut used = HashMap::new();
        let anchors: Vec<String> = records
            .iter()
            .map(|r| dedup_slug(slugify(&r.title), &mut used))
            .collect();

        if ctx.config.markdown.include_toc {
            let mut toc = String::from("## Table of Contents\n\n");
            for (i, record) in records.iter().enumerate() {
                let n = first_page_number + i;
                toc.push_str(&format!("{}. [{}](#{})\n", n, record.title, anchors[i]));
            }
            parts.push(toc);
        }

        for (i, record) in records.iter().enumerate() {
            parts.push(Self::section(record, first_page_number + i, &anchors[i]));
        }

        parts.join("\n---\n\n")
    }

    fn single_file(
        &self,
        records: &[PageRecord],
        ctx: &OutputContext,
    ) -> Result<Vec<PathBuf>, AssembleError> {
        let filename = ctx
            .config
            .markdown
            .output_filename
            .clone()
            .unwrap_or_else(|| format!("{}.md", ctx.default_stem()));
        let filename = if filename.ends_with(".md") {
            filename
        } else {
            format!("{}.md", filename)
        };

        std::fs::create_dir_all(ctx.output_dir)?;
        let path = ctx.output_dir.join(filename);
        let content = Self::build_document(records, ctx, 1, None, None);
        std::fs::write(&path, content)?;

        tracing::info!("Markdown written to {}", path.display());
        Ok(vec![path])
    }

    fn multi_file(
        &self,
        records: &[PageRecord],
        ctx: &OutputContext,
    ) -> Result<Vec<PathBuf>, AssembleError> {
        let dir = ctx.output_dir.join(ctx.default_stem());
        std::fs::create_dir_all(&dir)?;

        let mut used = HashMap::new();
        let named: Vec<(String, &PageRecord)> = records
            .iter()
            .map(|r| (dedup_slug(slugify(&r.title), &mut used), r))
            .collect();

        // README index first
        let mut index = Self::document_header(ctx, records.len());
        index.push_str("\n## Pages\n\n");
        for (i, (slug, record)) in named.iter().enumerate() {
            index.push_str(&format!(
                "{}. [{}]({}.md) - {}\n",
                i + 1,
                record.title,
                slug,
                record.url
            ));
        }
        let readme = dir.join("README.md");
        std::fs::write(&readme, index)?;

        let mut written = vec![readme];
        for (i, (slug, record)) in named.iter().enumerate() {
            let mut content = format!("# {}\n\n", record.title);
            content.push_str(&format!("**URL:** {}\n", record.url));
            content.push_str(&format!(
                "**Scraped:** {}\n\n",
                record.timestamp.format("%Y-%m-%d %H:%M:%S")
            ));
            if record.has_flag(FLAG_PARSE_ERROR) {
                content.push_str("*Content could not be extracted for this page.*\n");
            } else {
                content.push_str(&html_to_markdown(&record.content));
                content.push('\n');
            }

            // Relative links to neighbors keep the bundle navigable
            content.push_str("\n---\n");
            if i > 0 {
                content.push_str(&format!("Previous: [{}]({}.md)\n", named[i - 1].1.title, named[i - 1].0));
            }
            if i + 1 < named.len() {
                content.push_str(&format!("Next: [{}]({}.md)\n", named[i + 1].1.title, named[i + 1].0));
            }
            content.push_str("Index: [README](README.md)\n");

            let path = dir.join(format!("{}.md", slug));
            std::fs::write(&path, content)?;
            written.push(path);
        }

        tracing::info!("Multi-file markdown written under {}", dir.display());
        Ok(written)
    }
}

impl Generator for MarkdownGenerator {
    fn extension(&self) -> &'static str {
        "md"
    }

    fn size_overhead(&self, config: &crate::config::Config) -> f64 {
        config.chunking.size_estimation.markdown_overhead
    }

    fn generate(
        &self,
        records: &[PageRecord],
        ctx: &OutputContext,
    ) -> Result<Vec<PathBuf>, AssembleError> {
        if records.is_empty() {
            return Err(AssembleError::NoRecords);
        }
        if ctx.config.markdown.multi_file {
            self.multi_file(records, ctx)
        } else {
            self.single_file(records, ctx)
        }
    }

    fn generate_chunk(
        &self,
        records: &[PageRecord],
        ctx: &OutputContext,
        path: &Path,
        chunk: ChunkInfo,
    ) -> Result<(), AssembleError> {
        let prefix = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.split("_chunk_").next())
            .unwrap_or("output")
            .to_string();
        let content =
            Self::build_document(records, ctx, chunk.page_offset, Some(chunk), Some(&prefix));
        std::fs::write(path, content)?;
        Ok(())
    }

    fn generate_index(
        &self,
        chunks: &[(String, usize)],
        ctx: &OutputContext,
        path: &Path,
    ) -> Result<(), AssembleError> {
        let total_pages: usize = chunks.iter().map(|(_, n)| n).sum();

        let mut out = format!("# {} - Complete Archive Index\n\n", ctx.host());
        out.push_str(&format!("**Source:** {}\n", ctx.base_url));
        out.push_str(&format!(
            "**Generated:** {}\n",
            Utc::now().format("%Y-%m-%d %H:%M:%S")
        ));
        out.push_str(&format!("**Total Pages:** {}\n", total_pages));
        out.push_str(&format!("**Total Chunks:** {}\n\n", chunks.len()));
        out.push_str("## Chunks\n\n");

        for (i, (name, pages)) in chunks.iter().enumerate() {
            out.push_str(&format!(
                "{}. [{}](./{}) - {} pages\n",
                i + 1,
                name,
                name,
                pages
            ));
        }

        std::fs::write(path, out)?;
        Ok(())
    }
}
