use crate::assemble::{AssembleError, ChunkInfo, Generator, OutputContext};
use crate::cache::{PageRecord, FLAG_PARSE_ERROR};
use chrono::Utc;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

/// Failure inside the HTML-to-PDF transformer
#[derive(Debug, Error)]
#[error("{0}")]
pub struct RenderError(pub String);

/// The external rendering capability: HTML in, PDF bytes out
///
/// The engine itself is a collaborator, not part of this crate; anything
/// that can turn an HTML document into bytes can be plugged in.
pub trait HtmlRenderer {
    fn render(&self, html: &str) -> Result<Vec<u8>, RenderError>;
}

/// Renders by piping HTML through an external command (wkhtmltopdf-style:
/// reads the document on stdin, writes PDF bytes to stdout)
pub struct CommandRenderer {
    pub command: String,
    pub args: Vec<String>,
}

impl Default for CommandRenderer {
    fn default() -> Self {
        Self {
            command: "wkhtmltopdf".to_string(),
            args: vec!["-q".to_string(), "-".to_string(), "-".to_string()],
        }
    }
}

impl HtmlRenderer for CommandRenderer {
    fn render(&self, html: &str) -> Result<Vec<u8>, RenderError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| RenderError(format!("failed to launch {}: {}", self.command, e)))?;

        child
            .stdin
            .take()
            .ok_or_else(|| RenderError("renderer stdin unavailable".to_string()))?
            .write_all(html.as_bytes())
            .map_err(|e| RenderError(format!("failed to feed renderer: {}", e)))?;

        let output = child
            .wait_with_output()
            .map_err(|e| RenderError(format!("renderer failed: {}", e)))?;

        if !output.status.success() {
            return Err(RenderError(format!(
                "{} exited with {}",
                self.command, output.status
            )));
        }
        if output.stdout.is_empty() {
            return Err(RenderError("renderer produced no output".to_string()));
        }

        Ok(output.stdout)
    }
}

/// The PDF output backend
///
/// Composes one print-styled HTML document (cover, optional TOC, one
/// anchored section per record) and hands it to the renderer. A section the
/// renderer chokes on degrades through three levels: sanitized HTML, plain
/// text plus metadata, then an error placeholder.
pub struct PdfGenerator<R: HtmlRenderer> {
    renderer: R,
}

impl<R: HtmlRenderer> PdfGenerator<R> {
    pub fn new(renderer: R) -> Self {
        Self { renderer }
    }

    fn stylesheet(ctx: &OutputContext) -> String {
        let pdf = &ctx.config.pdf;
        let page_numbers = if pdf.include_page_numbers {
            "@bottom-right { content: 'Page ' counter(page); font-size: 10px; color: #666; }"
        } else {
            ""
        };

        format!(
            r#"<style>
@page {{
    size: {size} {orientation};
    margin: 20mm 15mm 20mm 15mm;
    {page_numbers}
}}
body {{
    font-family: Helvetica, Arial, sans-serif;
    font-size: 12px;
    line-height: 1.6;
    color: #333;
}}
.cover {{ text-align: center; padding: 120px 0; page-break-after: always; }}
.cover h1 {{ font-size: 32px; color: #2c3e50; }}
.cover .url {{ font-size: 20px; color: #3498db; word-break: break-all; }}
.cover .meta {{ font-size: 14px; color: #7f8c8d; }}
.toc {{ page-break-after: always; }}
.toc a {{ color: #3498db; text-decoration: none; }}
.page-section {{ margin-bottom: 32px; }}
.page-section .page-header {{ border-bottom: 2px solid #3498db; margin-bottom: 18px; }}
.page-section .page-url {{ font-size: 11px; color: #3498db; word-break: break-all; }}
.page-section img {{ max-width: 100%; height: auto; }}
h1, h2, h3, h4, h5, h6 {{ color: #2c3e50; page-break-after: avoid; }}
pre {{ background: #f6f6f6; padding: 8px; overflow-x: auto; }}
.render-error {{ color: #999; font-style: italic; border: 1px dashed #ccc; padding: 12px; }}
</style>"#,
            size = pdf.page_size,
            orientation = pdf.orientation,
            page_numbers = page_numbers,
        )
    }

    fn cover(ctx: &OutputContext, total_pages: usize, chunk: Option<ChunkInfo>) -> String {
        let subtitle = match chunk {
            Some(info) => format!("Part {} of {}", info.number, info.total),
            None => "Site Archive".to_string(),
        };
        format!(
            r#"<div class="cover">
<h1>{}</h1>
<div class="url">{}</div>
<p class="meta">{}</p>
<p class="meta">Generated {} &middot; {} pages</p>
</div>"#,
            escape_html(&ctx.host()),
            escape_html(ctx.base_url),
            subtitle,
            Utc::now().format("%Y-%m-%d %H:%M"),
            total_pages,
        )
    }

    fn toc(records: &[PageRecord], first_page_number: usize) -> String {
        let mut out = String::from("<div class=\"toc\"><h2>Contents</h2><ol>");
        for (i, record) in records.iter().enumerate() {
            let n = first_page_number + i;
            out.push_str(&format!(
                "<li><a href=\"#page-{}\">{}</a></li>",
                n,
                escape_html(&record.title)
            ));
        }
        out.push_str("</ol></div>");
        out
    }

    /// Content with stored image bodies swapped in for their remote sources
    fn sanitize_content(record: &PageRecord) -> String {
        let mut content = record.content.clone();
        for image in &record.images {
            if let Some(local) = &image.local_path {
                content = content.replace(&image.src, local);
            }
        }
        content
    }

    /// Three fallback levels per section, probed against the renderer
    fn section_html(&self, record: &PageRecord, page_number: usize) -> String {
        let header = format!(
            r#"<div class="page-header"><h2 id="page-{}">{}</h2><div class="page-url">{}</div></div>"#,
            page_number,
            escape_html(&record.title),
            escape_html(&record.url),
        );

        if !record.has_flag(FLAG_PARSE_ERROR) {
            let sanitized = format!(
                "<div class=\"page-section\">{}{}</div>",
                header,
                Self::sanitize_content(record)
            );
            if self.probe(&sanitized) {
                return sanitized;
            }
            tracing::warn!(
                "Renderer rejected section for {}, falling back to text",
                record.url
            );

            let text_only = format!(
                "<div class=\"page-section\">{}<p>{}</p><pre>{}</pre></div>",
                header,
                escape_html(&record.metadata.description),
                escape_html(&record.text_content),
            );
            if self.probe(&text_only) {
                return text_only;
            }
            tracing::warn!(
                "Renderer rejected text fallback for {}, inserting placeholder",
                record.url
            );
        }

        format!(
            "<div class=\"page-section\">{}<div class=\"render-error\">This page could not be rendered.</div></div>",
            header
        )
    }

    fn probe(&self, section: &str) -> bool {
        let doc = format!("<html><head></head><body>{}</body></html>", section);
        self.renderer.render(&doc).is_ok()
    }

    fn compose(
        &self,
        records: &[PageRecord],
        ctx: &OutputContext,
        first_page_number: usize,
        chunk: Option<ChunkInfo>,
    ) -> String {
        let mut html = String::from("<!DOCTYPE html><html><head><meta charset=\"utf-8\">");
        html.push_str(&format!(
            "<title>{}</title>",
            escape_html(&ctx.host())
        ));
        html.push_str(&Self::stylesheet(ctx));
        html.push_str("</head><body>");
        html.push_str(&Self::cover(ctx, records.len(), chunk));

        if ctx.config.pdf.include_toc {
            html.push_str(&Self::toc(records, first_page_number));
        }

        for (i, record) in records.iter().enumerate() {
            html.push_str(&self.section_html(record, first_page_number + i));
        }

        html.push_str("</body></html>");
        html
    }

    fn render_to(&self, html: &str, path: &Path) -> Result<(), AssembleError> {
        let bytes = self
            .renderer
            .render(html)
            .map_err(|e| AssembleError::Render(e.to_string()))?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

impl<R: HtmlRenderer> Generator for PdfGenerator<R> {
    fn extension(&self) -> &'static str {
        "pdf"
    }

    fn size_overhead(&self, config: &crate::config::Config) -> f64 {
        config.chunking.size_estimation.pdf_overhead
    }

    fn generate(
        &self,
        records: &[PageRecord],
        ctx: &OutputContext,
    ) -> Result<Vec<PathBuf>, AssembleError> {
        if records.is_empty() {
            return Err(AssembleError::NoRecords);
        }

        let filename = ctx
            .config
            .pdf
            .output_filename
            .clone()
            .unwrap_or_else(|| format!("{}.pdf", ctx.default_stem()));
        let filename = if filename.ends_with(".pdf") {
            filename
        } else {
            format!("{}.pdf", filename)
        };

        std::fs::create_dir_all(ctx.output_dir)?;
        let path = ctx.output_dir.join(filename);
        let html = self.compose(records, ctx, 1, None);
        self.render_to(&html, &path)?;

        tracing::info!("PDF written to {}", path.display());
        Ok(vec![path])
    }

    fn generate_chunk(
        &self,
        records: &[PageRecord],
        ctx: &OutputContext,
        path: &Path,
        chunk: ChunkInfo,
    ) -> Result<(), AssembleError> {
        let html = self.compose(records, ctx, chunk.page_offset, Some(chunk));
        self.render_to(&html, path)
    }

    fn generate_index(
        &self,
        chunks: &[(String, usize)],
        ctx: &OutputContext,
        path: &Path,
    ) -> Result<(), AssembleError> {
        let mut html = String::from("<!DOCTYPE html><html><head><meta charset=\"utf-8\">");
        html.push_str(&Self::stylesheet(ctx));
        html.push_str("</head><body>");
        html.push_str(&format!(
            "<h1>{} - Archive Index</h1><p>{} chunks</p><ol>",
            escape_html(&ctx.host()),
            chunks.len()
        ));
        for (name, pages) in chunks {
            html.push_str(&format!(
                "<li>{} ({} pages)</li>",
                escape_html(name),
                pages
            ));
        }
        html.push_str("</ol></body></html>");
        self.render_to(&html, path)
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
