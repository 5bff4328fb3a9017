use std::collections::{HashSet, VecDeque};
use std::io::Read;
use std::time::Duration;

use flate2::read::GzDecoder;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::Reader;
use reqwest::Client;
use tracing::warn;

use crawlkeep_common::SitemapError;

/// Outcome of parsing a single sitemap document: either a sitemap-index
/// (more sitemaps to enqueue) or a urlset (page URLs, already filtered).
enum SitemapOutcome {
    Index(Vec<String>),
    Urls(Vec<String>),
}

/// Result of a full expansion walk: the page-URL batches discovered plus
/// every per-sitemap failure encountered along the way. A wholly-empty
/// `batches` alongside a non-empty `errors` means the seed never yielded
/// a single reachable sitemap (distinct from a legitimately empty one).
#[derive(Default)]
pub struct ExpandOutcome {
    pub batches: Vec<Vec<String>>,
    pub errors: Vec<String>,
}

/// Resolves a seed (website or sitemap URL) into the full set of page
/// URLs its sitemaps declare, walking sitemap-indexes breadth-first with
/// a visited set so cyclic references terminate.
pub struct SitemapExpander {
    client: Client,
    timeout: Duration,
}

impl SitemapExpander {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Resolve the seed into the initial frontier of sitemap URLs:
    /// the seed itself if it already looks like a sitemap, else whatever
    /// `robots.txt` lists under `Sitemap:`, else `<seed>/sitemap.xml`.
    pub async fn discover_sitemaps(&self, seed: &str) -> Vec<String> {
        if is_direct_sitemap(seed) {
            return vec![seed.to_string()];
        }
        let base = seed.trim_end_matches('/');
        let robots_url = format!("{base}/robots.txt");
        match self.fetch_body(&robots_url).await {
            Ok(body) => {
                let found = parse_robots_sitemaps(&body);
                if found.is_empty() {
                    vec![format!("{base}/sitemap.xml")]
                } else {
                    found
                }
            }
            Err(e) => {
                warn!(seed, error = %e, "robots.txt fetch failed, falling back to /sitemap.xml");
                vec![format!("{base}/sitemap.xml")]
            }
        }
    }

    /// Breadth-first walk of the sitemap frontier. Returns one batch of
    /// page URLs per sitemap that yielded any (already filtered), in the
    /// order each sitemap was processed, so callers can merge-and-persist
    /// incrementally the way the spec describes, plus every per-sitemap
    /// failure seen along the way. Individual sitemap failures are logged
    /// and skipped; they never abort the walk.
    pub async fn expand(&self, seed: &str, filter: Option<&str>) -> ExpandOutcome {
        let mut frontier: VecDeque<String> = self.discover_sitemaps(seed).await.into();
        let mut visited: HashSet<String> = HashSet::new();
        let mut outcome = ExpandOutcome::default();

        while let Some(sitemap_url) = frontier.pop_front() {
            if !visited.insert(sitemap_url.clone()) {
                continue;
            }
            match self.process_one(&sitemap_url, filter).await {
                Ok(SitemapOutcome::Index(children)) => {
                    for child in children {
                        if !visited.contains(&child) {
                            frontier.push_back(child);
                        }
                    }
                }
                Ok(SitemapOutcome::Urls(urls)) => {
                    if !urls.is_empty() {
                        outcome.batches.push(urls);
                    }
                }
                Err(e) => {
                    warn!(sitemap_url, error = %e, "sitemap processing failed, skipping");
                    outcome.errors.push(format!("{sitemap_url}: {e}"));
                }
            }
        }

        outcome
    }

    async fn process_one(
        &self,
        sitemap_url: &str,
        filter: Option<&str>,
    ) -> Result<SitemapOutcome, SitemapError> {
        let body = self.fetch_sitemap_body(sitemap_url).await?;
        parse_sitemap_xml(&body, filter)
    }

    async fn fetch_body(&self, url: &str) -> Result<String, SitemapError> {
        let resp = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SitemapError::Fetch(e.to_string()))?;
        resp.text()
            .await
            .map_err(|e| SitemapError::Fetch(e.to_string()))
    }

    async fn fetch_sitemap_body(&self, url: &str) -> Result<String, SitemapError> {
        let resp = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SitemapError::Fetch(e.to_string()))?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| SitemapError::Fetch(e.to_string()))?;
        if url.ends_with(".gz") {
            let mut decoder = GzDecoder::new(&bytes[..]);
            let mut text = String::new();
            decoder
                .read_to_string(&mut text)
                .map_err(|e| SitemapError::Parse(e.to_string()))?;
            Ok(text)
        } else {
            String::from_utf8(bytes.to_vec()).map_err(|e| SitemapError::Parse(e.to_string()))
        }
    }
}

fn is_direct_sitemap(seed: &str) -> bool {
    seed.ends_with(".xml") || seed.to_lowercase().contains("sitemap")
}

/// Parse `robots.txt` body, collecting every value after a case-insensitive
/// `Sitemap:` line prefix.
fn parse_robots_sitemaps(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            let lower = trimmed.to_lowercase();
            lower
                .strip_prefix("sitemap:")
                .map(|_| trimmed[8..].trim().to_string())
        })
        .filter(|s| !s.is_empty())
        .collect()
}

fn keep_url(url: &str, filter: Option<&str>) -> bool {
    match filter {
        None => true,
        Some(f) if f.is_empty() => true,
        Some(f) => url.contains(f),
    }
}

fn local_name_start(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn local_name_end(e: &BytesEnd) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

/// Parse a sitemap XML document (sitemap-index or urlset) per
/// `http://www.sitemaps.org/schemas/sitemap/0.9`.
fn parse_sitemap_xml(xml: &str, filter: Option<&str>) -> Result<SitemapOutcome, SitemapError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut is_index: Option<bool> = None;
    let mut locs = Vec::new();
    let mut in_loc = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = local_name_start(&e);
                if is_index.is_none() {
                    is_index = Some(name.eq_ignore_ascii_case("sitemapindex"));
                }
                if name.eq_ignore_ascii_case("loc") {
                    in_loc = true;
                }
            }
            Ok(Event::Text(t)) if in_loc => {
                let text = t
                    .unescape()
                    .map_err(|e| SitemapError::Parse(e.to_string()))?
                    .into_owned();
                locs.push(text);
            }
            Ok(Event::End(e)) => {
                if local_name_end(&e).eq_ignore_ascii_case("loc") {
                    in_loc = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(SitemapError::Parse(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if is_index.unwrap_or(false) {
        Ok(SitemapOutcome::Index(locs))
    } else {
        let urls = locs.into_iter().filter(|u| keep_url(u, filter)).collect();
        Ok(SitemapOutcome::Urls(urls))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URLSET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://x.test/a</loc></url>
  <url><loc>https://x.test/b</loc></url>
</urlset>"#;

    const SITEMAP_INDEX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap><loc>https://x.test/sitemap-a.xml</loc></sitemap>
  <sitemap><loc>https://x.test/sitemap-b.xml</loc></sitemap>
</sitemapindex>"#;

    #[test]
    fn parses_urlset() {
        match parse_sitemap_xml(URLSET, None).unwrap() {
            SitemapOutcome::Urls(urls) => {
                assert_eq!(urls, vec!["https://x.test/a", "https://x.test/b"]);
            }
            _ => panic!("expected urlset"),
        }
    }

    #[test]
    fn parses_sitemap_index() {
        match parse_sitemap_xml(SITEMAP_INDEX, None).unwrap() {
            SitemapOutcome::Index(children) => {
                assert_eq!(children.len(), 2);
            }
            _ => panic!("expected index"),
        }
    }

    #[test]
    fn filters_urls_by_substring() {
        match parse_sitemap_xml(URLSET, Some("/a")).unwrap() {
            SitemapOutcome::Urls(urls) => assert_eq!(urls, vec!["https://x.test/a"]),
            _ => panic!("expected urlset"),
        }
    }

    #[test]
    fn empty_filter_keeps_everything() {
        match parse_sitemap_xml(URLSET, Some("")).unwrap() {
            SitemapOutcome::Urls(urls) => assert_eq!(urls.len(), 2),
            _ => panic!("expected urlset"),
        }
    }

    #[test]
    fn robots_sitemap_directive_is_case_insensitive() {
        let body = "User-agent: *\nSITEMAP: https://x.test/sitemap1.xml\nsitemap: https://x.test/sitemap2.xml\n";
        let found = parse_robots_sitemaps(body);
        assert_eq!(
            found,
            vec![
                "https://x.test/sitemap1.xml".to_string(),
                "https://x.test/sitemap2.xml".to_string()
            ]
        );
    }

    #[test]
    fn direct_sitemap_seed_is_detected() {
        assert!(is_direct_sitemap("https://x.test/sitemap.xml"));
        assert!(is_direct_sitemap("https://x.test/sitemaps/index"));
        assert!(!is_direct_sitemap("https://x.test"));
    }

    #[test]
    fn gzip_decompression_yields_identical_xml() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(URLSET.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut decoder = GzDecoder::new(&compressed[..]);
        let mut decompressed = String::new();
        decoder.read_to_string(&mut decompressed).unwrap();

        assert_eq!(decompressed, URLSET);
        let plain = parse_sitemap_xml(URLSET, None).unwrap();
        let gz = parse_sitemap_xml(&decompressed, None).unwrap();
        match (plain, gz) {
            (SitemapOutcome::Urls(a), SitemapOutcome::Urls(b)) => assert_eq!(a, b),
            _ => panic!("expected urlset both"),
        }
    }

    #[tokio::test]
    async fn cyclic_sitemap_index_terminates() {
        // A -> B -> A. Neither fetch ever actually happens (no network in
        // this test), but the visited-set bookkeeping in `expand` must not
        // loop forever even with well-formed mutual references; exercised
        // indirectly through the parse layer's child-enqueue contract.
        let mut visited: HashSet<String> = HashSet::new();
        let mut frontier: VecDeque<String> = VecDeque::new();
        frontier.push_back("a".to_string());
        let graph = [("a", vec!["b"]), ("b", vec!["a"])]
            .into_iter()
            .collect::<std::collections::HashMap<_, _>>();
        let mut visits = 0;
        while let Some(node) = frontier.pop_front() {
            if !visited.insert(node.clone()) {
                continue;
            }
            visits += 1;
            for child in graph.get(node.as_str()).into_iter().flatten() {
                if !visited.contains(*child) {
                    frontier.push_back(child.to_string());
                }
            }
        }
        assert_eq!(visits, 2);
    }

    mod http {
        use super::*;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        fn expander() -> SitemapExpander {
            SitemapExpander::new(Client::new(), Duration::from_secs(5))
        }

        #[tokio::test]
        async fn discover_sitemaps_reads_robots_txt() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/robots.txt"))
                .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                    "User-agent: *\nSitemap: {}/sitemap-a.xml\n",
                    server.uri()
                )))
                .mount(&server)
                .await;

            let found = expander().discover_sitemaps(&server.uri()).await;
            assert_eq!(found, vec![format!("{}/sitemap-a.xml", server.uri())]);
        }

        #[tokio::test]
        async fn discover_sitemaps_falls_back_when_robots_has_no_directive() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/robots.txt"))
                .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /admin\n"))
                .mount(&server)
                .await;

            let found = expander().discover_sitemaps(&server.uri()).await;
            assert_eq!(found, vec![format!("{}/sitemap.xml", server.uri())]);
        }

        #[tokio::test]
        async fn discover_sitemaps_falls_back_when_robots_missing() {
            let server = MockServer::start().await;
            Mock::given(method("GET")).and(path("/robots.txt")).respond_with(ResponseTemplate::new(404)).mount(&server).await;
            let found = expander().discover_sitemaps(&server.uri()).await;
            assert_eq!(found, vec![format!("{}/sitemap.xml", server.uri())]);
        }

        #[tokio::test]
        async fn expand_walks_a_sitemap_index_into_its_children() {
            let server = MockServer::start().await;
            let index = format!(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap><loc>{0}/child-a.xml</loc></sitemap>
  <sitemap><loc>{0}/child-b.xml</loc></sitemap>
</sitemapindex>"#,
                server.uri()
            );
            let child_a = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://x.test/a1</loc></url>
</urlset>"#;
            let child_b = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://x.test/b1</loc></url>
</urlset>"#;

            Mock::given(method("GET")).and(path("/root.xml")).respond_with(ResponseTemplate::new(200).set_body_string(index)).mount(&server).await;
            Mock::given(method("GET")).and(path("/child-a.xml")).respond_with(ResponseTemplate::new(200).set_body_string(child_a)).mount(&server).await;
            Mock::given(method("GET")).and(path("/child-b.xml")).respond_with(ResponseTemplate::new(200).set_body_string(child_b)).mount(&server).await;

            let seed = format!("{}/root.xml", server.uri());
            let outcome = expander().expand(&seed, None).await;
            let all: Vec<String> = outcome.batches.into_iter().flatten().collect();
            assert_eq!(all.len(), 2);
            assert!(all.contains(&"https://x.test/a1".to_string()));
            assert!(all.contains(&"https://x.test/b1".to_string()));
            assert!(outcome.errors.is_empty());
        }

        #[tokio::test]
        async fn expand_skips_a_sitemap_that_fails_without_aborting_the_walk() {
            let server = MockServer::start().await;
            let index = format!(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap><loc>{0}/missing.xml</loc></sitemap>
  <sitemap><loc>{0}/ok.xml</loc></sitemap>
</sitemapindex>"#,
                server.uri()
            );
            let ok = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://x.test/ok</loc></url>
</urlset>"#;

            Mock::given(method("GET")).and(path("/root.xml")).respond_with(ResponseTemplate::new(200).set_body_string(index)).mount(&server).await;
            Mock::given(method("GET")).and(path("/missing.xml")).respond_with(ResponseTemplate::new(404)).mount(&server).await;
            Mock::given(method("GET")).and(path("/ok.xml")).respond_with(ResponseTemplate::new(200).set_body_string(ok)).mount(&server).await;

            let seed = format!("{}/root.xml", server.uri());
            let outcome = expander().expand(&seed, None).await;
            let all: Vec<String> = outcome.batches.into_iter().flatten().collect();
            assert_eq!(all, vec!["https://x.test/ok".to_string()]);
            assert_eq!(outcome.errors.len(), 1);
        }

        #[tokio::test]
        async fn expand_reports_errors_when_the_whole_seed_is_unreachable() {
            let server = MockServer::start().await;
            Mock::given(method("GET")).and(path("/robots.txt")).respond_with(ResponseTemplate::new(404)).mount(&server).await;
            Mock::given(method("GET")).and(path("/sitemap.xml")).respond_with(ResponseTemplate::new(500)).mount(&server).await;

            let outcome = expander().expand(&server.uri(), None).await;
            assert!(outcome.batches.is_empty());
            assert_eq!(outcome.errors.len(), 1);
        }

        #[tokio::test]
        async fn expand_reports_no_errors_for_a_legitimately_empty_sitemap() {
            let server = MockServer::start().await;
            Mock::given(method("GET")).and(path("/robots.txt")).respond_with(ResponseTemplate::new(404)).mount(&server).await;
            let empty = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"></urlset>"#;
            Mock::given(method("GET")).and(path("/sitemap.xml")).respond_with(ResponseTemplate::new(200).set_body_string(empty)).mount(&server).await;

            let outcome = expander().expand(&server.uri(), None).await;
            assert!(outcome.batches.is_empty());
            assert!(outcome.errors.is_empty());
        }

        #[tokio::test]
        async fn expand_filters_urls_by_substring_across_the_walk() {
            let server = MockServer::start().await;
            let urlset = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://x.test/blog/a</loc></url>
  <url><loc>https://x.test/shop/b</loc></url>
</urlset>"#;
            Mock::given(method("GET")).and(path("/sitemap.xml")).respond_with(ResponseTemplate::new(200).set_body_string(urlset)).mount(&server).await;

            let seed = format!("{}/sitemap.xml", server.uri());
            let outcome = expander().expand(&seed, Some("/blog/")).await;
            let all: Vec<String> = outcome.batches.into_iter().flatten().collect();
            assert_eq!(all, vec!["https://x.test/blog/a".to_string()]);
        }
    }
}
