use std::fs::File;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use url::Url;
use uuid::Uuid;

use crate::http::PageResponse;

const HTML_RENDER_WIDTH: usize = 120;
const FALLBACK_EXTENSION: &str = ".download";

/// The outcome of rendering a response to text.
#[derive(Debug, Clone, Default)]
pub struct RenderResult {
    pub title: Option<String>,
    pub content: String,
}

/// A renderer claims responsibility for a response and, once claimed,
/// consumes its body to produce a `RenderResult`. There is no going back
/// after a claim: the body stream is read exactly once.
pub trait PageRenderer {
    fn claims(&self, url: &str, status: u16, content_type: &str) -> bool;

    fn render(
        &self,
        response: &mut PageResponse,
        url: &str,
        status: u16,
        content_type: &str,
    ) -> Result<RenderResult>;
}

/// Ordered renderer lists with first-claim-wins dispatch. Registration is
/// LIFO: a renderer registered later is tried before earlier ones, so
/// callers can override defaults by registering after construction.
#[derive(Default)]
pub struct RendererRegistry {
    page_renderers: Vec<Box<dyn PageRenderer>>,
    error_renderers: Vec<Box<dyn PageRenderer>>,
}

impl RendererRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_page_renderer(&mut self, renderer: Box<dyn PageRenderer>) {
        self.page_renderers.insert(0, renderer);
    }

    pub fn register_error_renderer(&mut self, renderer: Box<dyn PageRenderer>) {
        self.error_renderers.insert(0, renderer);
    }

    pub fn dispatch_content(&self, response: &mut PageResponse, url: &str) -> Result<RenderResult> {
        Self::dispatch(&self.page_renderers, response, url)
    }

    pub fn dispatch_error(&self, response: &mut PageResponse, url: &str) -> Result<RenderResult> {
        Self::dispatch(&self.error_renderers, response, url)
    }

    fn dispatch(
        renderers: &[Box<dyn PageRenderer>],
        response: &mut PageResponse,
        url: &str,
    ) -> Result<RenderResult> {
        let status = response.status;
        let content_type = response.content_type();

        for renderer in renderers {
            if renderer.claims(url, status, &content_type) {
                return renderer.render(response, url, status, &content_type);
            }
        }

        // Unreachable with the default catch-all registered; kept so a
        // misconfigured registry still produces a page instead of failing.
        tracing::warn!(url, status, %content_type, "no renderer claimed response");
        Ok(RenderResult {
            title: Some("Error - Unhandled fetch".to_string()),
            content: format!(
                "Error - Unhandled fetch:\nUrl: {url}\nStatus code: {status}\nContent-type: {content_type}"
            ),
        })
    }
}

/// Anything with content type text/plain.
pub struct PlainTextRenderer;

impl PageRenderer for PlainTextRenderer {
    fn claims(&self, _url: &str, _status: u16, content_type: &str) -> bool {
        content_type.to_lowercase().contains("text/plain")
    }

    fn render(
        &self,
        response: &mut PageResponse,
        _url: &str,
        _status: u16,
        _content_type: &str,
    ) -> Result<RenderResult> {
        Ok(RenderResult {
            title: None,
            content: response.read_text()?,
        })
    }
}

/// Anything with content type text/html.
pub struct HtmlRenderer;

impl HtmlRenderer {
    pub(crate) fn render_html(&self, html: &str) -> RenderResult {
        let title = extract_title(html);
        let body = strip_tag_blocks(&strip_tag_blocks(html, "script"), "style");
        let text = html2text::from_read(body.as_bytes(), HTML_RENDER_WIDTH);
        let text = collapse_blank_lines(&text.replace("\r\n", "\n"));

        RenderResult {
            title,
            content: text.trim().to_string(),
        }
    }
}

impl PageRenderer for HtmlRenderer {
    fn claims(&self, _url: &str, _status: u16, content_type: &str) -> bool {
        content_type.to_lowercase().contains("text/html")
    }

    fn render(
        &self,
        response: &mut PageResponse,
        _url: &str,
        _status: u16,
        _content_type: &str,
    ) -> Result<RenderResult> {
        let html = response.read_text()?;
        Ok(self.render_html(&html))
    }
}

/// Anything with content type application/pdf.
#[cfg(feature = "pdf")]
pub struct PdfRenderer;

#[cfg(feature = "pdf")]
impl PageRenderer for PdfRenderer {
    fn claims(&self, _url: &str, _status: u16, content_type: &str) -> bool {
        content_type.to_lowercase().contains("application/pdf")
    }

    fn render(
        &self,
        response: &mut PageResponse,
        _url: &str,
        _status: u16,
        _content_type: &str,
    ) -> Result<RenderResult> {
        let bytes = response.read_bytes()?;
        let content =
            pdf_extract::extract_text_from_mem(&bytes).context("Failed to extract PDF text")?;
        Ok(RenderResult {
            title: None,
            content,
        })
    }
}

/// Catch-all downloader, active when a downloads directory is configured.
/// Content type is irrelevant: every claimed response is written to disk.
pub struct DownloadRenderer {
    downloads_folder: Option<PathBuf>,
}

impl DownloadRenderer {
    pub fn new(downloads_folder: Option<PathBuf>) -> Self {
        Self { downloads_folder }
    }
}

impl PageRenderer for DownloadRenderer {
    fn claims(&self, _url: &str, _status: u16, _content_type: &str) -> bool {
        self.downloads_folder.is_some()
    }

    fn render(
        &self,
        response: &mut PageResponse,
        url: &str,
        _status: u16,
        content_type: &str,
    ) -> Result<RenderResult> {
        let Some(folder) = self.downloads_folder.as_ref() else {
            bail!("no downloads directory configured");
        };

        // Prefer a sanitized basename from the URL path; otherwise make a
        // unique name with an extension guessed from the content type.
        let basename = Url::parse(url)
            .ok()
            .and_then(|u| u.path_segments().and_then(|mut s| s.next_back().map(String::from)));
        let file_name = basename
            .map(|name| sanitize_file_name(&name))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("{}{}", Uuid::new_v4(), guess_extension(content_type)));

        let path = std::path::absolute(folder.join(&file_name))
            .context("Failed to resolve download path")?;
        let mut file = File::create(&path)
            .with_context(|| format!("Failed to create download file '{}'", path.display()))?;
        response.copy_to(&mut file)?;

        tracing::debug!(url, path = %path.display(), "saved download");
        Ok(RenderResult {
            title: Some("Download complete.".to_string()),
            content: format!("Downloaded '{}' to '{}'.", url, path.display()),
        })
    }
}

/// Accepts every response. Registered first so it sits at the lowest
/// priority and guarantees dispatch always finds a claim.
pub struct FallbackPageRenderer;

impl PageRenderer for FallbackPageRenderer {
    fn claims(&self, _url: &str, _status: u16, _content_type: &str) -> bool {
        true
    }

    fn render(
        &self,
        _response: &mut PageResponse,
        _url: &str,
        _status: u16,
        content_type: &str,
    ) -> Result<RenderResult> {
        let message = format!("Error - Unsupported Content-Type '{content_type}'");
        Ok(RenderResult {
            title: Some(message.clone()),
            content: message,
        })
    }
}

/// Terminal handler for the error chain. HTML error bodies are rendered
/// like a normal page, then retitled; everything else is passed through
/// as raw text under an error heading.
pub struct FallbackErrorRenderer {
    html: HtmlRenderer,
}

impl FallbackErrorRenderer {
    pub fn new() -> Self {
        Self { html: HtmlRenderer }
    }
}

impl Default for FallbackErrorRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl PageRenderer for FallbackErrorRenderer {
    fn claims(&self, _url: &str, _status: u16, _content_type: &str) -> bool {
        true
    }

    fn render(
        &self,
        response: &mut PageResponse,
        url: &str,
        status: u16,
        content_type: &str,
    ) -> Result<RenderResult> {
        if content_type.to_lowercase().contains("text/html") {
            let mut result = self.html.render(response, url, status, content_type)?;
            result.title = Some(format!("Error {status}"));
            result.content = format!("## Error {status}\n\n{}", result.content);
            Ok(result)
        } else {
            Ok(RenderResult {
                title: Some(format!("Error {status}")),
                content: format!("## Error {status}\n\n{}", response.read_text()?),
            })
        }
    }
}

fn extract_title(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let start = lower.find("<title")?;
    let open_end = start + lower[start..].find('>')? + 1;
    let close = open_end + lower[open_end..].find("</title>")?;
    let title = html.get(open_end..close)?.trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

/// Remove every `<tag ...>...</tag>` block, case-insensitively. An
/// unterminated block swallows the rest of the document.
fn strip_tag_blocks(html: &str, tag: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let open = format!("<{tag}");
    let close = format!("</{tag}>");

    let mut out = String::with_capacity(html.len());
    let mut pos = 0;
    while let Some(found) = lower[pos..].find(&open) {
        let tag_start = pos + found;
        let after_name = tag_start + open.len();

        // Make sure this is really the tag and not a prefix of a longer name.
        let is_tag = lower
            .as_bytes()
            .get(after_name)
            .is_some_and(|b| matches!(b, b' ' | b'>' | b'\t' | b'\n' | b'/'));
        if !is_tag {
            out.push_str(&html[pos..after_name]);
            pos = after_name;
            continue;
        }

        out.push_str(&html[pos..tag_start]);
        match lower[tag_start..].find(&close) {
            Some(end) => pos = tag_start + end + close.len(),
            None => return out,
        }
    }
    out.push_str(&html[pos..]);
    out
}

/// Collapse runs of three or more newlines down to exactly two.
fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run = 0;
    for ch in text.chars() {
        if ch == '\n' {
            run += 1;
            if run <= 2 {
                out.push(ch);
            }
        } else {
            run = 0;
            out.push(ch);
        }
    }
    out
}

fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_control() && !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect::<String>()
        .trim()
        .to_string()
}

fn guess_extension(content_type: &str) -> String {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    mime_guess::get_mime_extensions_str(essence)
        .and_then(|extensions| extensions.first())
        .map(|extension| format!(".{extension}"))
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
    use std::io::Cursor;

    fn response(status: u16, content_type: &str, body: &str) -> PageResponse {
        let mut headers = HeaderMap::new();
        if !content_type.is_empty() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        }
        PageResponse::new(
            status,
            headers,
            Box::new(Cursor::new(body.as_bytes().to_vec())),
        )
    }

    fn default_registry() -> RendererRegistry {
        let mut registry = RendererRegistry::new();
        registry.register_page_renderer(Box::new(FallbackPageRenderer));
        registry.register_page_renderer(Box::new(DownloadRenderer::new(None)));
        registry.register_page_renderer(Box::new(HtmlRenderer));
        registry.register_page_renderer(Box::new(PlainTextRenderer));
        registry.register_error_renderer(Box::new(FallbackErrorRenderer::new()));
        registry
    }

    #[test]
    fn test_plain_text_renderer() {
        let registry = default_registry();
        let mut resp = response(200, "text/plain; charset=utf-8", "hello world");
        let result = registry.dispatch_content(&mut resp, "https://example.com/a.txt").unwrap();
        assert_eq!(result.title, None);
        assert_eq!(result.content, "hello world");
    }

    #[test]
    fn test_html_renderer_extracts_title_and_drops_scripts() {
        let registry = default_registry();
        let html = "<html><head><title>T</title></head><body><script>x</script><p>Hi</p></body></html>";
        let mut resp = response(200, "text/html", html);
        let result = registry.dispatch_content(&mut resp, "https://example.com/").unwrap();
        assert_eq!(result.title.as_deref(), Some("T"));
        assert_eq!(result.content, "Hi");
    }

    #[test]
    fn test_html_renderer_normalizes_whitespace() {
        let renderer = HtmlRenderer;
        let result = renderer.render_html(
            "<html><body><p>one</p>\r\n\r\n\r\n<p>two</p><style>p { color: red; }</style></body></html>",
        );
        assert!(result.content.contains("one"));
        assert!(result.content.contains("two"));
        assert!(!result.content.contains("color"));
        assert!(!result.content.contains("\n\n\n"));
        assert!(!result.content.contains('\r'));
    }

    #[test]
    fn test_fallback_renderer_reports_content_type() {
        let registry = default_registry();
        let mut resp = response(200, "application/x-unknown", "\x00\x01");
        let result = registry.dispatch_content(&mut resp, "https://example.com/blob").unwrap();
        assert_eq!(
            result.title.as_deref(),
            Some("Error - Unsupported Content-Type 'application/x-unknown'")
        );
        assert_eq!(
            result.content,
            "Error - Unsupported Content-Type 'application/x-unknown'"
        );
    }

    #[test]
    fn test_dispatch_is_total_without_content_type() {
        let registry = default_registry();
        let mut resp = response(200, "", "anything");
        let result = registry.dispatch_content(&mut resp, "https://example.com/").unwrap();
        assert_eq!(result.title.as_deref(), Some("Error - Unsupported Content-Type ''"));
    }

    struct MarkerRenderer {
        marker: &'static str,
    }

    impl PageRenderer for MarkerRenderer {
        fn claims(&self, _url: &str, _status: u16, content_type: &str) -> bool {
            content_type.contains("text/x-marked")
        }

        fn render(
            &self,
            _response: &mut PageResponse,
            _url: &str,
            _status: u16,
            _content_type: &str,
        ) -> Result<RenderResult> {
            Ok(RenderResult {
                title: Some(self.marker.to_string()),
                content: self.marker.to_string(),
            })
        }
    }

    #[test]
    fn test_later_registration_wins() {
        let mut registry = RendererRegistry::new();
        registry.register_page_renderer(Box::new(MarkerRenderer { marker: "first" }));
        registry.register_page_renderer(Box::new(MarkerRenderer { marker: "second" }));

        let mut resp = response(200, "text/x-marked", "");
        let result = registry.dispatch_content(&mut resp, "https://example.com/").unwrap();
        assert_eq!(result.content, "second");
    }

    #[test]
    fn test_empty_registry_returns_synthetic_result() {
        let registry = RendererRegistry::new();
        let mut resp = response(200, "text/html", "<p>x</p>");
        let result = registry.dispatch_content(&mut resp, "https://example.com/").unwrap();
        assert_eq!(result.title.as_deref(), Some("Error - Unhandled fetch"));
        assert!(result.content.contains("https://example.com/"));
        assert!(result.content.contains("200"));
        assert!(result.content.contains("text/html"));
    }

    #[test]
    fn test_error_renderer_plain_body() {
        let registry = default_registry();
        let mut resp = response(404, "text/plain", "not here");
        let result = registry.dispatch_error(&mut resp, "https://example.com/gone").unwrap();
        assert_eq!(result.title.as_deref(), Some("Error 404"));
        assert_eq!(result.content, "## Error 404\n\nnot here");
    }

    #[test]
    fn test_error_renderer_html_body() {
        let registry = default_registry();
        let mut resp = response(
            410,
            "text/html; charset=utf-8",
            "<html><head><title>Gone</title></head><body><p>long gone</p></body></html>",
        );
        let result = registry.dispatch_error(&mut resp, "https://example.com/gone").unwrap();
        assert_eq!(result.title.as_deref(), Some("Error 410"));
        assert!(result.content.starts_with("## Error 410\n\n"));
        assert!(result.content.contains("long gone"));
    }

    #[test]
    fn test_download_renderer_ignores_content_type_when_configured() {
        let renderer = DownloadRenderer::new(Some(std::env::temp_dir()));
        assert!(renderer.claims("https://example.com/", 200, "text/html"));
        assert!(renderer.claims("https://example.com/", 200, ""));

        let unconfigured = DownloadRenderer::new(None);
        assert!(!unconfigured.claims("https://example.com/", 200, "text/html"));
    }

    #[test]
    fn test_download_renderer_writes_basename() {
        let folder = std::env::temp_dir().join(format!("text-browser-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&folder).unwrap();

        let renderer = DownloadRenderer::new(Some(folder.clone()));
        let mut resp = response(200, "application/octet-stream", "payload");
        let result = renderer
            .render(&mut resp, "https://example.com/files/data.bin", 200, "application/octet-stream")
            .unwrap();

        assert_eq!(result.title.as_deref(), Some("Download complete."));
        let saved = folder.join("data.bin");
        assert_eq!(std::fs::read_to_string(&saved).unwrap(), "payload");
        assert!(result.content.contains("https://example.com/files/data.bin"));

        std::fs::remove_dir_all(&folder).unwrap();
    }

    #[test]
    fn test_download_renderer_generates_name_without_basename() {
        let folder = std::env::temp_dir().join(format!("text-browser-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&folder).unwrap();

        let renderer = DownloadRenderer::new(Some(folder.clone()));
        let mut resp = response(200, "", "payload");
        renderer
            .render(&mut resp, "https://example.com/", 200, "")
            .unwrap();

        let entries: Vec<_> = std::fs::read_dir(&folder).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let name = entries[0].as_ref().unwrap().file_name();
        assert!(name.to_string_lossy().ends_with(".download"));

        std::fs::remove_dir_all(&folder).unwrap();
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("report.pdf"), "report.pdf");
        assert_eq!(sanitize_file_name("a/b\\c:d.txt"), "abcd.txt");
        assert_eq!(sanitize_file_name("  spaced  "), "spaced");
        assert_eq!(sanitize_file_name("???"), "");
    }

    #[test]
    fn test_strip_tag_blocks_keeps_longer_tag_names() {
        let html = "<scripted>kept</scripted><script>dropped</script>";
        let stripped = strip_tag_blocks(html, "script");
        assert!(stripped.contains("kept"));
        assert!(!stripped.contains("dropped"));
    }

    #[test]
    fn test_extract_title_handles_attributes_and_absence() {
        assert_eq!(
            extract_title("<TITLE lang=\"en\">Hello</TITLE>").as_deref(),
            Some("Hello")
        );
        assert_eq!(extract_title("<p>no title</p>"), None);
        assert_eq!(extract_title("<title>   </title>"), None);
    }
}
