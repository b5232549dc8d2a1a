//! Concurrent, bounded document fetcher.
//!
//! The ingestor fetches every input URL once, in parallel up to the
//! configured concurrency, extracts concepts from each body, and reassembles
//! the results in input order. A URL that cannot be fetched or parsed becomes
//! an [`IngestWarning`]; it never aborts the batch.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use learnpath_shared::{IngestConfig, IngestWarning, LearnPathError, Result};
use reqwest::Client;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::cache::ContentCache;
use crate::extract::{ExtractOptions, extract_document};
use crate::{IngestOutput, IngestedDocument};

/// User-Agent string for fetch requests.
const USER_AGENT: &str = concat!("LearnPath/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects to follow per URL.
const MAX_REDIRECTS: usize = 5;

/// Per-URL state while a batch is in flight. Kept in input order.
enum Slot {
    Cached(IngestedDocument),
    Failed(IngestWarning),
    Fetching {
        raw: String,
        key: String,
        handle: JoinHandle<Result<IngestedDocument>>,
    },
}

// ---------------------------------------------------------------------------
// Ingestor
// ---------------------------------------------------------------------------

/// Fetches documents and extracts concept signals from them.
pub struct Ingestor {
    config: IngestConfig,
    client: Client,
    extract: ExtractOptions,
    cache: ContentCache,
}

impl Ingestor {
    /// Create a new ingestor with the given configuration.
    pub fn new(config: IngestConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LearnPathError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            extract: ExtractOptions::from(&config),
            cache: ContentCache::new(Duration::from_secs(config.cache_ttl_secs)),
            config,
            client,
        })
    }

    /// Fetch and extract every URL in `urls`.
    ///
    /// Documents and warnings are returned in input order. Duplicate URLs
    /// (ignoring fragments) are fetched once.
    #[instrument(skip_all, fields(urls = urls.len()))]
    pub async fn ingest(&self, urls: &[String]) -> IngestOutput {
        let start_time = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut seen: HashSet<String> = HashSet::new();
        let mut slots: Vec<Slot> = Vec::with_capacity(urls.len());

        info!(
            concurrency = self.config.concurrency,
            timeout_secs = self.config.timeout_secs,
            "starting ingestion"
        );

        for raw in urls {
            let url = match parse_target(raw, self.config.allow_private_hosts) {
                Ok(url) => url,
                Err(e) => {
                    warn!(url = %raw, error = %e, "skipping url");
                    slots.push(Slot::Failed(IngestWarning::new(raw.as_str(), e.to_string())));
                    continue;
                }
            };

            let key = normalize_url(&url);
            if !seen.insert(key.clone()) {
                debug!(%url, "duplicate url, skipping");
                continue;
            }

            if let Some(doc) = self.cache.get(&key).await {
                debug!(%url, "cache hit");
                slots.push(Slot::Cached(doc));
                continue;
            }

            let client = self.client.clone();
            let sem = semaphore.clone();
            let opts = self.extract.clone();
            let max_body = self.config.max_body_bytes;

            let handle = tokio::spawn(async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|e| LearnPathError::Internal(format!("semaphore closed: {e}")))?;
                let (final_url, body) = fetch_body(&client, &url, max_body).await?;
                extract_document(final_url.as_str(), &body, &opts)
            });

            slots.push(Slot::Fetching {
                raw: raw.clone(),
                key,
                handle,
            });
        }

        let mut output = IngestOutput::default();
        for slot in slots {
            match slot {
                Slot::Cached(doc) => output.documents.push(doc),
                Slot::Failed(warning) => output.warnings.push(warning),
                Slot::Fetching { raw, key, handle } => match handle.await {
                    Ok(Ok(doc)) => {
                        self.cache.insert(key, doc.clone()).await;
                        output.documents.push(doc);
                    }
                    Ok(Err(e)) => {
                        warn!(url = %raw, error = %e, "document skipped");
                        output.warnings.push(IngestWarning::new(raw, e.to_string()));
                    }
                    Err(e) => {
                        warn!(url = %raw, error = %e, "fetch task failed");
                        output
                            .warnings
                            .push(IngestWarning::new(raw, format!("fetch task failed: {e}")));
                    }
                },
            }
        }

        info!(
            documents = output.documents.len(),
            warnings = output.warnings.len(),
            duration_ms = start_time.elapsed().as_millis(),
            "ingestion completed"
        );

        output
    }
}

// ---------------------------------------------------------------------------
// URL checks
// ---------------------------------------------------------------------------

/// Parse and vet one input URL.
fn parse_target(raw: &str, allow_private: bool) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| LearnPathError::validation(format!("invalid URL '{raw}': {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(LearnPathError::validation(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }

    if !allow_private && is_ssrf_target(&url) {
        return Err(LearnPathError::validation(format!(
            "blocked private or local address: {url}"
        )));
    }

    Ok(url)
}

/// Check if a URL targets a potentially dangerous resource.
fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    if let Some(host) = url.host_str() {
        let bare = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = bare.parse::<IpAddr>() {
            return is_private_ip(&ip);
        }
        if host == "localhost" || host.ends_with(".local") || host.ends_with(".internal") {
            return true;
        }
    }

    false
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
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

/// Normalize a URL for deduplication (strip fragment, trailing slash).
fn normalize_url(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    let mut s = normalized.to_string();
    if s.ends_with('/') && s.matches('/').count() > 3 {
        s.pop();
    }
    s
}

// ---------------------------------------------------------------------------
// Fetching
// ---------------------------------------------------------------------------

/// Fetch a document body, enforcing status and size limits.
///
/// Returns the URL the body was served from along with the body.
async fn fetch_body(client: &Client, url: &Url, max_body: u64) -> Result<(Url, String)> {
    debug!(%url, "fetching document");

    let mut response = client
        .get(url.as_str())
        .send()
        .await
        .map_err(|e| network_error(url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(LearnPathError::Network(format!("{url}: HTTP {status}")));
    }

    if let Some(len) = response.content_length() {
        if len > max_body {
            return Err(LearnPathError::Network(format!(
                "{url}: response too large ({len} bytes)"
            )));
        }
    }

    let final_url = response.url().clone();
    if final_url != *url {
        debug!(%url, %final_url, "followed redirect");
    }

    // Content-Length may be absent (chunked transfer), so the limit is also
    // enforced while streaming.
    let mut body: Vec<u8> = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(|e| network_error(url, e))? {
        if (body.len() + chunk.len()) as u64 > max_body {
            return Err(LearnPathError::Network(format!(
                "{url}: response too large (over {max_body} bytes)"
            )));
        }
        body.extend_from_slice(&chunk);
    }

    Ok((final_url, String::from_utf8_lossy(&body).into_owned()))
}

fn network_error(url: &Url, e: reqwest::Error) -> LearnPathError {
    if e.is_timeout() {
        LearnPathError::Network(format!("{url}: timed out"))
    } else {
        LearnPathError::Network(format!("{url}: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECURSION_PAGE: &str = r#"<html><body><main>
        <h1>Recursion Basics</h1>
        <p>Every recursive function needs a <strong>Base Case</strong>.</p>
    </main></body></html>"#;

    const SORTING_PAGE: &str = r#"<html><body><main>
        <h1>Sorting Algorithms</h1>
        <p>Start with <strong>Bubble Sort</strong> before <strong>Merge Sort</strong>.</p>
    </main></body></html>"#;

    fn test_config() -> IngestConfig {
        IngestConfig {
            concurrency: 2,
            timeout_secs: 5,
            allow_private_hosts: true,
            ..IngestConfig::default()
        }
    }

    async fn mount_page(server: &wiremock::MockServer, path: &str, body: &str) {
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path(path))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    #[test]
    fn test_normalize_url() {
        let url = Url::parse("https://docs.example.com/guide/intro/#section-1").unwrap();
        assert_eq!(normalize_url(&url), "https://docs.example.com/guide/intro");
    }

    #[test]
    fn test_ssrf_protection_blocks_private_ip() {
        for raw in [
            "http://192.168.1.1/admin",
            "http://10.0.0.1/",
            "http://127.0.0.1:8080/",
            "http://[::1]/",
            "http://localhost:3000/api",
        ] {
            let url = Url::parse(raw).unwrap();
            assert!(is_ssrf_target(&url), "{raw} should be blocked");
        }
    }

    #[test]
    fn test_ssrf_protection_allows_public() {
        let url = Url::parse("https://docs.example.com/page").unwrap();
        assert!(!is_ssrf_target(&url));
    }

    #[test]
    fn parse_target_rejects_bad_input() {
        assert!(parse_target("not a url", false).is_err());
        assert!(parse_target("ftp://example.com/file", false).is_err());
        assert!(parse_target("http://127.0.0.1/", false).is_err());
        assert!(parse_target("http://127.0.0.1/", true).is_ok());
        assert!(parse_target(" https://example.com/a ", false).is_ok());
    }

    #[tokio::test]
    async fn ingest_collects_documents_and_warnings_in_input_order() {
        let server = wiremock::MockServer::start().await;
        mount_page(&server, "/a", RECURSION_PAGE).await;
        wiremock::Mock::given(wiremock::matchers::path("/b"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let ingestor = Ingestor::new(test_config()).unwrap();
        let urls = vec![
            format!("{}/a", server.uri()),
            "not a url".to_string(),
            format!("{}/b", server.uri()),
            "ftp://example.com/file".to_string(),
        ];
        let output = ingestor.ingest(&urls).await;

        assert_eq!(output.documents.len(), 1);
        let labels: Vec<_> = output.documents[0]
            .concepts
            .iter()
            .map(|c| c.label.as_str())
            .collect();
        assert_eq!(labels, vec!["Recursion Basics", "Base Case"]);

        assert_eq!(output.warnings.len(), 3);
        assert_eq!(output.warnings[0].url, "not a url");
        assert!(output.warnings[1].url.ends_with("/b"));
        assert!(output.warnings[1].message.contains("404"));
        assert!(output.warnings[2].message.contains("unsupported scheme"));
    }

    #[tokio::test]
    async fn ingest_keeps_input_order_regardless_of_completion() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/slow"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_string(RECURSION_PAGE)
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;
        mount_page(&server, "/fast", SORTING_PAGE).await;

        let ingestor = Ingestor::new(test_config()).unwrap();
        let urls = vec![
            format!("{}/slow", server.uri()),
            format!("{}/fast", server.uri()),
        ];
        let output = ingestor.ingest(&urls).await;

        assert_eq!(output.documents.len(), 2);
        assert!(output.documents[0].url.ends_with("/slow"));
        assert!(output.documents[1].url.ends_with("/fast"));
    }

    #[tokio::test]
    async fn duplicate_urls_are_fetched_once() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/a"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(RECURSION_PAGE))
            .expect(1)
            .mount(&server)
            .await;

        let config = IngestConfig {
            cache_ttl_secs: 0,
            ..test_config()
        };
        let ingestor = Ingestor::new(config).unwrap();
        let urls = vec![
            format!("{}/a", server.uri()),
            format!("{}/a#intro", server.uri()),
        ];
        let output = ingestor.ingest(&urls).await;

        assert_eq!(output.documents.len(), 1);
        assert!(output.warnings.is_empty());
    }

    #[tokio::test]
    async fn cached_documents_skip_the_network() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/a"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(RECURSION_PAGE))
            .expect(1)
            .mount(&server)
            .await;

        let ingestor = Ingestor::new(test_config()).unwrap();
        let urls = vec![format!("{}/a", server.uri())];

        let first = ingestor.ingest(&urls).await;
        let second = ingestor.ingest(&urls).await;

        assert_eq!(first.documents.len(), 1);
        assert_eq!(second.documents.len(), 1);
        assert_eq!(
            first.documents[0].content_hash,
            second.documents[0].content_hash
        );
    }

    #[tokio::test]
    async fn slow_url_times_out_as_warning() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/hang"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_string(RECURSION_PAGE)
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;
        mount_page(&server, "/ok", SORTING_PAGE).await;

        let config = IngestConfig {
            timeout_secs: 1,
            ..test_config()
        };
        let ingestor = Ingestor::new(config).unwrap();
        let urls = vec![
            format!("{}/hang", server.uri()),
            format!("{}/ok", server.uri()),
        ];
        let output = ingestor.ingest(&urls).await;

        assert_eq!(output.documents.len(), 1);
        assert_eq!(output.warnings.len(), 1);
        assert!(output.warnings[0].message.contains("timed out"));
    }

    #[tokio::test]
    async fn redirected_document_reports_final_url() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/old"))
            .respond_with(
                wiremock::ResponseTemplate::new(301)
                    .insert_header("Location", format!("{}/new", server.uri()).as_str()),
            )
            .mount(&server)
            .await;
        mount_page(&server, "/new", RECURSION_PAGE).await;

        let ingestor = Ingestor::new(test_config()).unwrap();
        let output = ingestor.ingest(&[format!("{}/old", server.uri())]).await;

        assert_eq!(output.documents.len(), 1);
        assert_eq!(output.documents[0].url, format!("{}/new", server.uri()));
    }

    #[tokio::test]
    async fn oversized_body_is_skipped() {
        let server = wiremock::MockServer::start().await;
        mount_page(&server, "/big", &"x".repeat(4096)).await;
        mount_page(&server, "/small", SORTING_PAGE).await;

        let config = IngestConfig {
            max_body_bytes: 1024,
            ..test_config()
        };
        let ingestor = Ingestor::new(config).unwrap();
        let urls = vec![
            format!("{}/big", server.uri()),
            format!("{}/small", server.uri()),
        ];
        let output = ingestor.ingest(&urls).await;

        assert_eq!(output.documents.len(), 1);
        assert_eq!(output.warnings.len(), 1);
        assert!(output.warnings[0].message.contains("too large"));
    }

    #[tokio::test]
    async fn chunked_body_without_length_is_capped() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nTransfer-Encoding: chunked\r\n\r\n")
                .await;
            let chunk = "y".repeat(512);
            for _ in 0..16 {
                let frame = format!("{:x}\r\n{chunk}\r\n", chunk.len());
                if socket.write_all(frame.as_bytes()).await.is_err() {
                    return;
                }
            }
            let _ = socket.write_all(b"0\r\n\r\n").await;
        });

        let config = IngestConfig {
            max_body_bytes: 2048,
            ..test_config()
        };
        let ingestor = Ingestor::new(config).unwrap();
        let output = ingestor.ingest(&[format!("http://{addr}/stream")]).await;

        assert!(output.documents.is_empty());
        assert!(output.warnings[0].message.contains("too large"));
    }

    #[tokio::test]
    async fn private_hosts_blocked_by_default() {
        let server = wiremock::MockServer::start().await;
        mount_page(&server, "/a", RECURSION_PAGE).await;

        let ingestor = Ingestor::new(IngestConfig::default()).unwrap();
        let output = ingestor.ingest(&[format!("{}/a", server.uri())]).await;

        assert!(output.documents.is_empty());
        assert!(output.warnings[0].message.contains("blocked"));
    }
}
