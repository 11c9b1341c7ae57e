use anyhow::{anyhow, Context, Result};
use url::Url;

use crate::config::BrowserConfig;
use crate::http::{FetchError, HttpClient};
use crate::render::{
    DownloadRenderer, FallbackErrorRenderer, FallbackPageRenderer, HtmlRenderer, PageRenderer,
    PlainTextRenderer, RenderResult, RendererRegistry,
};
#[cfg(feature = "pdf")]
use crate::render::PdfRenderer;
use crate::search::{format_results, SearchClient};

const ABOUT_BLANK: &str = "about:blank";
const SEARCH_SCHEME: &str = "search:";

/// A stateful text-only browser. Navigation fetches a resource, renders it
/// to text through the renderer registry, and exposes the result through a
/// paginated viewport. Owned by a single logical session; not thread-safe.
pub struct Browser {
    config: BrowserConfig,
    http: HttpClient,
    search_client: SearchClient,
    registry: RendererRegistry,
    history: Vec<String>,
    page_title: Option<String>,
    page_content: String,
    viewport_pages: Vec<(usize, usize)>,
    viewport_current_page: usize,
}

impl Browser {
    /// Build a browser and navigate to its configured start page.
    ///
    /// Renderers are registered LIFO: later registrations take priority, so
    /// the catch-all fallback goes in first and the most specific types last.
    pub fn new(config: BrowserConfig) -> Result<Self> {
        let http = HttpClient::new(&config.request)?;
        let search_client = SearchClient::new(&config.request)?;

        let mut registry = RendererRegistry::new();
        registry.register_page_renderer(Box::new(FallbackPageRenderer));
        registry.register_page_renderer(Box::new(DownloadRenderer::new(
            config.downloads_folder.clone(),
        )));
        registry.register_page_renderer(Box::new(HtmlRenderer));
        registry.register_page_renderer(Box::new(PlainTextRenderer));
        #[cfg(feature = "pdf")]
        registry.register_page_renderer(Box::new(PdfRenderer));

        registry.register_error_renderer(Box::new(FallbackErrorRenderer::new()));

        let mut browser = Self {
            config,
            http,
            search_client,
            registry,
            history: Vec::new(),
            page_title: None,
            page_content: String::new(),
            viewport_pages: vec![(0, 0)],
            viewport_current_page: 0,
        };

        let start_page = browser.config.start_page.clone();
        browser.set_address(&start_page)?;
        Ok(browser)
    }

    /// The address of the current page.
    pub fn address(&self) -> &str {
        self.history
            .last()
            .map(String::as_str)
            .unwrap_or(ABOUT_BLANK)
    }

    pub fn page_title(&self) -> Option<&str> {
        self.page_title.as_deref()
    }

    /// The full contents of the current page.
    pub fn page_content(&self) -> &str {
        &self.page_content
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn page_count(&self) -> usize {
        self.viewport_pages.len()
    }

    pub fn current_page(&self) -> usize {
        self.viewport_current_page
    }

    /// Register an additional content renderer. It will be tried before
    /// every renderer registered so far.
    pub fn register_page_renderer(&mut self, renderer: Box<dyn PageRenderer>) {
        self.registry.register_page_renderer(renderer);
    }

    pub fn register_error_renderer(&mut self, renderer: Box<dyn PageRenderer>) {
        self.registry.register_error_renderer(renderer);
    }

    /// Update the address, load the page, and return the viewport content.
    pub fn visit_page(&mut self, uri_or_path: &str) -> Result<String> {
        self.set_address(uri_or_path)?;
        Ok(self.viewport().to_string())
    }

    /// Navigate to an address: `about:blank`, `search:<query>`, an absolute
    /// http(s) URL, or a path resolved against the current address.
    pub fn set_address(&mut self, uri_or_path: &str) -> Result<()> {
        tracing::debug!(address = uri_or_path, "navigating");
        self.history.push(uri_or_path.to_string());

        if uri_or_path == ABOUT_BLANK {
            self.page_title = None;
            self.set_page_content(String::new());
        } else if let Some(query) = uri_or_path.strip_prefix(SEARCH_SCHEME) {
            let query = query.trim().to_string();
            self.search(&query)?;
        } else {
            let url = if uri_or_path.starts_with("http:") || uri_or_path.starts_with("https:") {
                uri_or_path.to_string()
            } else {
                let base = self
                    .previous_address()
                    .ok_or_else(|| anyhow!("no current address to resolve '{uri_or_path}' against"))?
                    .to_string();
                let resolved = resolve_address(&base, uri_or_path)?;
                // Keep history fully qualified.
                if let Some(last) = self.history.last_mut() {
                    *last = resolved.clone();
                }
                resolved
            };
            self.fetch_page(&url)?;
        }

        self.viewport_current_page = 0;
        Ok(())
    }

    /// The content of the current viewport.
    pub fn viewport(&self) -> &str {
        let (start, end) = self.viewport_pages[self.viewport_current_page];
        &self.page_content[start..end]
    }

    pub fn page_down(&mut self) {
        self.viewport_current_page =
            (self.viewport_current_page + 1).min(self.viewport_pages.len() - 1);
    }

    pub fn page_up(&mut self) {
        self.viewport_current_page = self.viewport_current_page.saturating_sub(1);
    }

    fn previous_address(&self) -> Option<&str> {
        self.history
            .len()
            .checked_sub(2)
            .and_then(|i| self.history.get(i))
            .map(String::as_str)
    }

    fn fetch_page(&mut self, url: &str) -> Result<()> {
        match self.http.fetch(url, &self.config.request) {
            Ok(mut response) => {
                let result = self.registry.dispatch_content(&mut response, url)?;
                self.apply_render_result(result);
            }
            Err(FetchError::HttpStatus(mut response)) => {
                tracing::debug!(url, status = response.status, "rendering HTTP error response");
                let result = self.registry.dispatch_error(&mut response, url)?;
                self.apply_render_result(result);
            }
            // No response to render; surface the failure as-is.
            Err(FetchError::Transport(err)) => {
                return Err(anyhow::Error::new(err).context(format!("Failed to fetch '{url}'")))
            }
        }
        Ok(())
    }

    fn search(&mut self, query: &str) -> Result<()> {
        let api_key = self
            .config
            .search_api_key
            .as_deref()
            .context("Missing search API key")?;
        let results = self
            .search_client
            .search(query, api_key, &self.config.request)?;
        let (title, content) = format_results(query, &results);
        self.page_title = Some(title);
        self.set_page_content(content);
        Ok(())
    }

    fn apply_render_result(&mut self, result: RenderResult) {
        self.page_title = result.title;
        self.set_page_content(result.content);
    }

    fn set_page_content(&mut self, content: String) {
        self.page_content = content;
        let http_origin =
            self.address().starts_with("http:") || self.address().starts_with("https:");
        self.viewport_pages =
            split_pages(&self.page_content, self.config.viewport_size, http_origin);
        if self.viewport_current_page >= self.viewport_pages.len() {
            self.viewport_current_page = self.viewport_pages.len() - 1;
        }
    }
}

/// Resolve a possibly-relative reference against a base address.
pub fn resolve_address(base: &str, reference: &str) -> Result<String> {
    let base = Url::parse(base)
        .with_context(|| format!("Cannot resolve '{reference}' against '{base}'"))?;
    let joined = base
        .join(reference)
        .with_context(|| format!("Cannot resolve '{reference}' against '{base}'"))?;
    Ok(joined.to_string())
}

/// Split content into viewport ranges.
///
/// Only http(s) pages are paginated; everything else is a single page no
/// matter how long. Ranges are byte offsets that always fall on character
/// boundaries; page sizing counts characters. A page is extended past the
/// nominal size until it ends on whitespace, so boundaries never split a
/// word when a whitespace break exists.
fn split_pages(content: &str, viewport_size: usize, http_origin: bool) -> Vec<(usize, usize)> {
    if !http_origin {
        return vec![(0, content.len())];
    }
    if content.is_empty() {
        return vec![(0, 0)];
    }

    let viewport_size = viewport_size.max(1);
    let chars: Vec<(usize, char)> = content.char_indices().collect();
    let total = chars.len();

    let mut pages = Vec::new();
    let mut start = 0;
    while start < total {
        let mut end = (start + viewport_size).min(total);
        // Adjust to end on whitespace.
        while end < total && !is_break_char(chars[end - 1].1) {
            end += 1;
        }

        let start_byte = chars[start].0;
        let end_byte = if end == total {
            content.len()
        } else {
            chars[end].0
        };
        pages.push((start_byte, end_byte));
        start = end;
    }
    pages
}

fn is_break_char(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}
