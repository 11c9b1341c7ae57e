use anyhow::{Context, Result};
use serde::Deserialize;

use crate::config::RequestConfig;

const SEARCH_ENDPOINT: &str = "https://api.bing.microsoft.com/v7.0/search";
const API_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const USER_AGENT: &str = "text-browser/0.1.0";

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResults {
    #[serde(rename = "webPages")]
    pub web_pages: Option<WebPages>,
    pub news: Option<NewsResults>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebPages {
    pub value: Vec<WebResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebResult {
    pub name: String,
    pub url: String,
    pub snippet: String,
    #[serde(rename = "deepLinks")]
    pub deep_links: Option<Vec<DeepLink>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeepLink {
    pub name: String,
    pub url: String,
    pub snippet: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewsResults {
    pub value: Vec<NewsResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewsResult {
    pub name: String,
    pub url: String,
    pub description: String,
}

/// Key-authenticated client for the web-search API.
pub struct SearchClient {
    client: reqwest::blocking::Client,
}

impl SearchClient {
    pub fn new(request: &RequestConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request.timeout)
            .build()
            .context("Failed to build search client")?;

        Ok(Self { client })
    }

    pub fn search(
        &self,
        query: &str,
        api_key: &str,
        request: &RequestConfig,
    ) -> Result<SearchResults> {
        tracing::debug!(query, "running web search");

        let mut req = self
            .client
            .get(SEARCH_ENDPOINT)
            .header(API_KEY_HEADER, api_key)
            .query(&[
                ("q", query),
                ("textDecorations", "false"),
                ("textFormat", "raw"),
            ]);
        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        if !request.params.is_empty() {
            req = req.query(&request.params);
        }

        let response = req
            .send()
            .context("Search request failed")?
            .error_for_status()
            .context("Search endpoint returned an error status")?;

        response.json().context("Failed to parse search response")
    }
}

/// Format a result set as a numbered Markdown list. A single counter runs
/// across top-level results, their deep links, and the news section, so
/// numbering never restarts partway through the page.
pub fn format_results(query: &str, results: &SearchResults) -> (String, String) {
    let mut idx = 0usize;

    let mut web_snippets = Vec::new();
    if let Some(pages) = &results.web_pages {
        for page in &pages.value {
            idx += 1;
            web_snippets.push(format!("{idx}. [{}]({})\n{}", page.name, page.url, page.snippet));
            if let Some(deep_links) = &page.deep_links {
                for link in deep_links {
                    idx += 1;
                    web_snippets.push(format!(
                        "{idx}. [{}]({})\n{}",
                        link.name,
                        link.url,
                        link.snippet.as_deref().unwrap_or("")
                    ));
                }
            }
        }
    }

    let mut news_snippets = Vec::new();
    if let Some(news) = &results.news {
        for item in &news.value {
            idx += 1;
            news_snippets.push(format!(
                "{idx}. [{}]({})\n{}",
                item.name, item.url, item.description
            ));
        }
    }

    let title = format!("{query} - Search");
    let mut content = format!(
        "A search for '{query}' found {} results:\n\n## Web Results\n{}",
        web_snippets.len() + news_snippets.len(),
        web_snippets.join("\n\n")
    );
    if !news_snippets.is_empty() {
        content.push_str("\n\n## News Results:\n");
        content.push_str(&news_snippets.join("\n\n"));
    }

    (title, content)
}
