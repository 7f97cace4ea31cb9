//! Concurrent, scope-aware crawl frontier.
//!
//! The frontier starts from a given URL and performs a level-batched BFS
//! within scope, respecting depth/concurrency/rate limits. Fetched pages are
//! handed to the consolidation engine one at a time through
//! [`DiscoverySource`]. Batches are awaited in enqueue order, so the yielded
//! sequence (and every discovery index) is deterministic for a given site.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use scraper::{Html, Selector};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use url::Url;

use docs2md_discovery::{DiscoveryError, DiscoverySource};
use docs2md_shared::{
    CrawlConfig, Dialect, Docs2MdError, HierarchyPosition, Result, SourceDocument, SourceId,
    SourceRoot,
};

/// User-Agent string for crawl requests.
const USER_AGENT: &str = concat!("docs2md/", env!("CARGO_PKG_VERSION"));

/// Maximum response size accepted for a single page (10 MB).
const MAX_RESPONSE_SIZE: u64 = 10 * 1024 * 1024;

// ---------------------------------------------------------------------------
// CrawlFrontier
// ---------------------------------------------------------------------------

/// A fetched page before it becomes a [`SourceDocument`].
#[derive(Debug)]
struct FetchedPage {
    url: Url,
    depth: u32,
    bytes: Vec<u8>,
    content_type: Option<String>,
    links: Vec<Url>,
}

/// Pull-based web crawler. Each pull drains one fetched page; when the
/// buffer is empty the next batch of queued URLs is fetched concurrently.
pub struct CrawlFrontier {
    config: CrawlConfig,
    client: Client,
    scope: CrawlScope,
    root: SourceRoot,
    start_url: Url,
    queue: VecDeque<(Url, u32)>,
    visited: HashSet<String>,
    ready: VecDeque<std::result::Result<SourceDocument, DiscoveryError>>,
    semaphore: Arc<Semaphore>,
    scheduled: usize,
    yielded: usize,
    /// Allow localhost/private IPs (for integration tests with mock servers).
    allow_localhost: bool,
}

impl CrawlFrontier {
    /// Create a frontier rooted at `start_url`.
    pub fn new(start_url: Url, config: CrawlConfig) -> Result<Self> {
        if !matches!(start_url.scheme(), "http" | "https") {
            return Err(Docs2MdError::validation(format!(
                "crawl start URL must be http or https: {start_url}"
            )));
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Docs2MdError::Network(format!("failed to build HTTP client: {e}")))?;

        let scope = CrawlScope::new(&start_url, &config);
        let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1) as usize));

        let mut visited = HashSet::new();
        visited.insert(normalize_url(&start_url));

        Ok(Self {
            root: SourceRoot::Site {
                start_url: start_url.clone(),
            },
            queue: VecDeque::from([(start_url.clone(), 0)]),
            start_url,
            config,
            client,
            scope,
            visited,
            ready: VecDeque::new(),
            semaphore,
            scheduled: 0,
            yielded: 0,
            allow_localhost: false,
        })
    }

    /// Allow crawling localhost/private IPs (for integration tests).
    #[cfg(test)]
    pub fn allow_localhost(mut self) -> Self {
        self.allow_localhost = true;
        self
    }

    /// Fetch the next batch of queued URLs and buffer the results in order.
    #[instrument(skip_all, fields(queued = self.queue.len()))]
    async fn fetch_batch(&mut self) {
        let batch_size = (self.config.concurrency.max(1) as usize).min(self.queue.len());
        let batch: Vec<(Url, u32)> = self.queue.drain(..batch_size).collect();
        let mut handles = Vec::new();

        for (url, depth) in batch {
            let is_start = depth == 0;

            if !self.allow_localhost && is_ssrf_target(&url) {
                warn!(%url, "SSRF protection: blocked");
                let msg = "blocked private or local address";
                self.ready.push_back(Err(if is_start {
                    DiscoveryError::fatal(url.as_str(), msg)
                } else {
                    DiscoveryError::item(url.as_str(), msg)
                }));
                continue;
            }

            if self.scheduled >= self.config.max_pages {
                debug!(%url, max_pages = self.config.max_pages, "page limit reached");
                self.queue.clear();
                break;
            }
            self.scheduled += 1;

            let client = self.client.clone();
            let sem = self.semaphore.clone();
            let rate_limit = self.config.rate_limit_ms;

            handles.push((
                url.clone(),
                is_start,
                tokio::spawn(async move {
                    let _permit = sem
                        .acquire_owned()
                        .await
                        .map_err(|e| Docs2MdError::Network(e.to_string()))?;

                    if rate_limit > 0 {
                        tokio::time::sleep(Duration::from_millis(rate_limit)).await;
                    }

                    fetch_page(&client, url, depth).await
                }),
            ));
        }

        for (url, is_start, handle) in handles {
            let outcome = match handle.await {
                Ok(result) => result,
                Err(e) => Err(Docs2MdError::Network(format!("fetch task failed: {e}"))),
            };

            match outcome {
                Ok(page) => {
                    self.enqueue_links(&page);
                    let doc = self.make_document(page);
                    self.ready.push_back(Ok(doc));
                }
                Err(e) => {
                    warn!(%url, error = %e, "page fetch failed");
                    self.ready.push_back(Err(if is_start {
                        DiscoveryError::fatal(url.as_str(), e.to_string())
                    } else {
                        DiscoveryError::item(url.as_str(), e.to_string())
                    }));
                }
            }
        }
    }

    fn enqueue_links(&mut self, page: &FetchedPage) {
        if page.depth >= self.config.depth {
            return;
        }
        for link in &page.links {
            if !self.scope.in_scope(link) {
                continue;
            }
            if self.visited.insert(normalize_url(link)) {
                self.queue.push_back((link.clone(), page.depth + 1));
            }
        }
    }

    fn make_document(&mut self, page: FetchedPage) -> SourceDocument {
        let index = self.yielded;
        self.yielded += 1;

        let content_type = page.content_type.as_deref().unwrap_or("text/html");
        let mut metadata = BTreeMap::new();
        metadata.insert("source_url".to_string(), page.url.to_string());

        SourceDocument {
            position: HierarchyPosition::for_page(&page.url, page.depth, index),
            encoding: charset_of(content_type),
            dialect: Dialect::from_content_type(content_type),
            id: SourceId::Page(page.url),
            bytes: page.bytes,
            metadata,
        }
    }
}

impl DiscoverySource for CrawlFrontier {
    fn root(&self) -> &SourceRoot {
        &self.root
    }

    async fn next_item(&mut self) -> Option<std::result::Result<SourceDocument, DiscoveryError>> {
        loop {
            if let Some(item) = self.ready.pop_front() {
                return Some(item);
            }
            if self.queue.is_empty() {
                info!(
                    start_url = %self.start_url,
                    pages = self.yielded,
                    "crawl completed"
                );
                return None;
            }
            self.fetch_batch().await;
        }
    }
}

// ---------------------------------------------------------------------------
// Scope checking
// ---------------------------------------------------------------------------

/// Determines which URLs are "in scope" for a crawl.
struct CrawlScope {
    /// Host that URLs must match.
    base_host: String,
    /// Port that URLs must match.
    base_port: Option<u16>,
    /// Path prefixes links must start with (empty = any).
    follow_paths: Vec<String>,
    /// Lowercased extensions (with dot) never fetched.
    excluded_extensions: Vec<String>,
    /// Include patterns (if non-empty, URL must match at least one).
    include_patterns: Vec<regex::Regex>,
    /// Exclude patterns (if URL matches any, it's excluded).
    exclude_patterns: Vec<regex::Regex>,
}

impl CrawlScope {
    fn new(start_url: &Url, config: &CrawlConfig) -> Self {
        let base_host = start_url.host_str().unwrap_or("").to_string();

        let include_patterns = config
            .include_patterns
            .iter()
            .filter_map(|p| glob_to_regex(p))
            .collect();

        let exclude_patterns = config
            .exclude_patterns
            .iter()
            .filter_map(|p| glob_to_regex(p))
            .collect();

        let excluded_extensions = config
            .excluded_extensions
            .iter()
            .map(|e| {
                let e = e.to_ascii_lowercase();
                if e.starts_with('.') { e } else { format!(".{e}") }
            })
            .collect();

        Self {
            base_host,
            base_port: start_url.port_or_known_default(),
            follow_paths: config.follow_paths.clone(),
            excluded_extensions,
            include_patterns,
            exclude_patterns,
        }
    }

    fn in_scope(&self, url: &Url) -> bool {
        // Must be http/https
        if url.scheme() != "http" && url.scheme() != "https" {
            return false;
        }

        // Must match base host
        if url.host_str().unwrap_or("") != self.base_host
            || url.port_or_known_default() != self.base_port
        {
            return false;
        }

        let path = url.path();
        let lower = path.to_ascii_lowercase();
        if self.excluded_extensions.iter().any(|ext| lower.ends_with(ext)) {
            return false;
        }

        if !self.follow_paths.is_empty()
            && !self.follow_paths.iter().any(|prefix| path.starts_with(prefix.as_str()))
        {
            return false;
        }

        // Check exclude patterns
        for pattern in &self.exclude_patterns {
            if pattern.is_match(path) {
                return false;
            }
        }

        // Check include patterns (if any configured, must match at least one)
        if !self.include_patterns.is_empty() {
            return self.include_patterns.iter().any(|p| p.is_match(path));
        }

        true
    }
}

/// Convert a glob-like pattern to a regex.
fn glob_to_regex(pattern: &str) -> Option<regex::Regex> {
    let escaped = regex::escape(pattern)
        .replace(r"\*\*", ".*")
        .replace(r"\*", "[^/]*")
        .replace(r"\?", ".");
    regex::Regex::new(&format!("^{escaped}$")).ok()
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
                // 192.0.0.0/24
                || (v4.octets()[0] == 192 && v4.octets()[1] == 0 && v4.octets()[2] == 0)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

// ---------------------------------------------------------------------------
// Page fetching
// ---------------------------------------------------------------------------

/// Fetch a single page and collect its outgoing links.
async fn fetch_page(client: &Client, url: Url, depth: u32) -> Result<FetchedPage> {
    debug!(%url, depth, "fetching page");

    let response = client
        .get(url.as_str())
        .send()
        .await
        .map_err(|e| Docs2MdError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Docs2MdError::Network(format!("{url}: HTTP {status}")));
    }

    if let Some(len) = response.content_length() {
        if len > MAX_RESPONSE_SIZE {
            return Err(Docs2MdError::validation(format!(
                "{url}: response too large ({len} bytes, max {MAX_RESPONSE_SIZE})"
            )));
        }
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if let Some(ct) = &content_type {
        if !is_document_type(ct) {
            return Err(Docs2MdError::validation(format!(
                "{url}: unsupported content type {ct}"
            )));
        }
    }

    let final_url = response.url().clone();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| Docs2MdError::Network(format!("{url}: body read failed: {e}")))?
        .to_vec();

    let is_html = content_type
        .as_deref()
        .is_none_or(|ct| Dialect::from_content_type(ct) == Dialect::Html);
    let links = if is_html {
        extract_links(&String::from_utf8_lossy(&bytes), &final_url)
    } else {
        Vec::new()
    };

    Ok(FetchedPage {
        url: final_url,
        depth,
        bytes,
        content_type,
        links,
    })
}

/// Whether a `Content-Type` names something the normalizer can read.
fn is_document_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    matches!(
        mime.as_str(),
        "" | "text/html" | "application/xhtml+xml" | "text/markdown" | "text/x-markdown" | "text/mdx"
    )
}

/// The `charset=` parameter of a `Content-Type` value.
fn charset_of(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_ascii_lowercase())
    })
}

/// Extract all links from an HTML document, resolved against the base URL.
fn extract_links(html: &str, base_url: &Url) -> Vec<Url> {
    let doc = Html::parse_document(html);
    let Ok(link_sel) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let mut links = Vec::new();

    for el in doc.select(&link_sel) {
        if let Some(href) = el.value().attr("href") {
            let href = href.trim();
            // Skip anchors, javascript:, mailto:, tel:
            if href.is_empty()
                || href.starts_with('#')
                || href.starts_with("javascript:")
                || href.starts_with("mailto:")
                || href.starts_with("tel:")
            {
                continue;
            }

            if let Ok(mut resolved) = base_url.join(href) {
                resolved.set_fragment(None);
                links.push(resolved);
            }
        }
    }

    links
}

/// Normalize a URL for deduplication (strip fragment, trailing slash).
fn normalize_url(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    let mut s = normalized.to_string();
    // Remove trailing slash for consistency (except root path)
    if s.ends_with('/') && normalized.path() != "/" {
        s.pop();
    }
    s
}
