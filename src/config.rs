use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_START_PAGE: &str = "about:blank";
pub const DEFAULT_VIEWPORT_SIZE: usize = 1024 * 8;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Options applied to every outgoing request. A copy is held by the browser
/// for its whole lifetime; there is no shared mutable request state.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    /// Extra headers sent with every fetch.
    pub headers: Vec<(String, String)>,
    /// Extra query parameters appended to every fetch.
    pub params: Vec<(String, String)>,
    pub timeout: Duration,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
            params: Vec::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Browser construction options. Immutable once the browser is built.
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Address visited when the browser is created.
    pub start_page: String,
    /// Nominal viewport size in characters. Applies only to http(s) pages.
    pub viewport_size: usize,
    /// When set, every fetched resource is saved under this directory
    /// instead of being rendered.
    pub downloads_folder: Option<PathBuf>,
    /// API key for the `search:` scheme.
    pub search_api_key: Option<String>,
    pub request: RequestConfig,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            start_page: DEFAULT_START_PAGE.to_string(),
            viewport_size: DEFAULT_VIEWPORT_SIZE,
            downloads_folder: None,
            search_api_key: None,
            request: RequestConfig::default(),
        }
    }
}
