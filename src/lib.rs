pub mod browser;
pub mod config;
pub mod http;
pub mod render;
pub mod search;

// Re-export commonly used types
pub use browser::Browser;
pub use config::{BrowserConfig, RequestConfig};
pub use http::{FetchError, HttpClient, PageResponse};
pub use render::{PageRenderer, RenderResult, RendererRegistry};
pub use search::{SearchClient, SearchResults};
