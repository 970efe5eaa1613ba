//! RSS news collection and full-text article scraping.
//!
//! Failures never propagate out of `NewsFetcher::latest_articles`: a feed that
//! cannot be fetched or parsed contributes no articles, and a page that cannot
//! be scraped yields an error string as its text.

use crate::queue::Article;
use crate::{OnAirError, Result};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Content containers tried in order when scraping an article page
const CONTENT_SELECTORS: [&str; 4] = ["article", "main", ".article-content", ".story-content"];

/// Elements removed from a content container before extracting text
const STRIPPED_ELEMENTS: &str = "script, style, nav, header, footer";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
}

impl FeedSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

pub fn default_sources() -> Vec<FeedSource> {
    vec![
        FeedSource::new("The Intercept", "https://theintercept.com/feed/?lang=en"),
        FeedSource::new("The Guardian", "https://www.theguardian.com/uk/rss"),
        FeedSource::new("TechCrunch", "https://techcrunch.com/feed/"),
        FeedSource::new("Wired", "https://www.wired.com/feed/rss"),
        FeedSource::new("The Verge", "https://www.theverge.com/rss/index.xml"),
    ]
}

/// Pick feeds from `default_sources()` by 1-based number or by name.
///
/// Names match case-insensitively, with or without a leading "The".
/// Invalid selections are skipped with a warning; at least one must be valid.
pub fn select_sources<S: AsRef<str>>(selections: &[S]) -> Result<Vec<FeedSource>> {
    let available = default_sources();
    let mut picked: Vec<FeedSource> = Vec::new();
    for selection in selections {
        let selection = selection.as_ref().trim();
        if selection.is_empty() {
            continue;
        }
        let found = match selection.parse::<usize>() {
            Ok(n) => n.checked_sub(1).and_then(|i| available.get(i)),
            Err(_) => available
                .iter()
                .find(|s| source_key(&s.name) == source_key(selection)),
        };
        match found {
            Some(source) if !picked.contains(source) => picked.push(source.clone()),
            Some(_) => {}
            None => warn!(target = "news", selection, "Invalid news source selection"),
        }
    }
    if picked.is_empty() {
        return Err(OnAirError::NewsError(
            "Select at least one valid news source".into(),
        ));
    }
    Ok(picked)
}

fn source_key(name: &str) -> String {
    let lower = name.trim().to_ascii_lowercase();
    match lower.strip_prefix("the ") {
        Some(rest) => rest.trim().to_string(),
        None => lower,
    }
}

/// Sources named in `ONAIR_NEWS_SOURCES` (comma separated), else every default
fn sources_from_env() -> Vec<FeedSource> {
    let Ok(raw) = std::env::var("ONAIR_NEWS_SOURCES") else {
        return default_sources();
    };
    let selections: Vec<&str> = raw.split(',').collect();
    match select_sources(&selections) {
        Ok(sources) => sources,
        Err(e) => {
            warn!(target = "news", error = %e, "Using all default news sources");
            default_sources()
        }
    }
}

/// Split `max_total` articles across sources; earlier sources absorb the remainder.
pub fn distribute_articles(sources: &[FeedSource], max_total: usize) -> Vec<(FeedSource, usize)> {
    if sources.is_empty() {
        return Vec::new();
    }
    let base = max_total / sources.len();
    let remainder = max_total % sources.len();
    sources
        .iter()
        .enumerate()
        .map(|(i, s)| (s.clone(), base + usize::from(i < remainder)))
        .collect()
}

#[derive(Clone, Debug)]
pub struct NewsConfig {
    pub sources: Vec<FeedSource>,
    pub max_total_articles: usize,
    /// Fetch each entry's page and extract the article body
    pub scrape_full_text: bool,
    pub request_timeout_ms: u64,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            sources: sources_from_env(),
            max_total_articles: std::env::var("ONAIR_MAX_ARTICLES")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(10),
            scrape_full_text: std::env::var("ONAIR_SCRAPE_FULL_TEXT")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true),
            request_timeout_ms: 15_000,
        }
    }
}

/// One pass over the configured feeds; an unusable HTTP client yields nothing
pub async fn fetch_articles(cfg: NewsConfig) -> Vec<Article> {
    match NewsFetcher::new(cfg) {
        Ok(fetcher) => fetcher.latest_articles().await,
        Err(e) => {
            warn!(target = "news", error = %e, "News unavailable");
            Vec::new()
        }
    }
}

pub struct NewsFetcher {
    http: Client,
    cfg: NewsConfig,
}

impl NewsFetcher {
    pub fn new(cfg: NewsConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .user_agent("onair-radio/0.1")
            .build()
            .map_err(|e| OnAirError::NewsError(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http, cfg })
    }

    /// Collect up to `max_total_articles` across the configured sources
    pub async fn latest_articles(&self) -> Vec<Article> {
        let mut out = Vec::new();
        for (source, count) in distribute_articles(&self.cfg.sources, self.cfg.max_total_articles) {
            if count == 0 {
                continue;
            }
            match self.fetch_feed(&source, count).await {
                Ok(mut articles) => {
                    info!(target = "news", source = %source.name, count = articles.len(), "Fetched feed");
                    out.append(&mut articles);
                }
                Err(e) => {
                    warn!(target = "news", source = %source.name, error = %e, "Feed fetch failed");
                }
            }
        }
        out
    }

    async fn fetch_feed(&self, source: &FeedSource, limit: usize) -> Result<Vec<Article>> {
        let bytes = self
            .http
            .get(&source.url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        let mut articles = parse_feed(&bytes, &source.name, limit)?;
        if self.cfg.scrape_full_text {
            for article in articles.iter_mut() {
                if !article.link.is_empty() {
                    article.full_text = self.fetch_full_text(&article.link).await;
                }
            }
        }
        Ok(articles)
    }

    /// Fetch the article body behind `url`; errors are returned as text
    pub async fn fetch_full_text(&self, url: &str) -> String {
        let page = async {
            self.http
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await
        };
        match page.await {
            Ok(html) => extract_article_text(&html),
            Err(e) => {
                debug!(target = "news", url = %url, error = %e, "Article scrape failed");
                format!("Error fetching article: {e}")
            }
        }
    }
}

/// Parse RSS/Atom bytes into at most `limit` articles
pub fn parse_feed(bytes: &[u8], source_name: &str, limit: usize) -> Result<Vec<Article>> {
    let feed = feed_rs::parser::parse(bytes)
        .map_err(|e| OnAirError::NewsError(format!("Failed to parse feed: {e}")))?;
    Ok(feed
        .entries
        .into_iter()
        .take(limit)
        .map(|entry| {
            let summary = entry
                .summary
                .map(|t| collapse_whitespace(&t.content))
                .unwrap_or_default();
            let full_text = entry
                .content
                .and_then(|c| c.body)
                .map(|body| extract_article_text(&body))
                .unwrap_or_default();
            Article {
                title: entry.title.map(|t| t.content).unwrap_or_default(),
                summary,
                link: entry
                    .links
                    .first()
                    .map(|l| l.href.clone())
                    .unwrap_or_default(),
                full_text,
                source: source_name.to_string(),
            }
        })
        .collect())
}

/// Extract readable text from an HTML page.
///
/// The first matching content container wins; its script/style/nav/header/footer
/// descendants are ignored. Without a container the whole page text is used.
pub fn extract_article_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let Ok(stripped) = Selector::parse(STRIPPED_ELEMENTS) else {
        return collapse_whitespace(&doc.root_element().text().collect::<Vec<_>>().join(" "));
    };
    for css in CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(css) else {
            continue;
        };
        if let Some(container) = doc.select(&selector).next() {
            return container_text(container, &stripped);
        }
    }
    collapse_whitespace(&doc.root_element().text().collect::<Vec<_>>().join(" "))
}

fn container_text(container: ElementRef<'_>, stripped: &Selector) -> String {
    let excluded: Vec<_> = container.select(stripped).map(|el| el.id()).collect();
    let mut parts = Vec::new();
    for node in container.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let inside_excluded = node
            .ancestors()
            .take_while(|a| a.id() != container.id())
            .any(|a| excluded.contains(&a.id()));
        if !inside_excluded {
            parts.push(&**text);
        }
    }
    collapse_whitespace(&parts.join(" "))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapse_whitespace_joins_words() {
        assert_eq!(collapse_whitespace("  a \n\t b  "), "a b");
    }
}
