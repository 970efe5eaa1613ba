use onair_core::news::{distribute_articles, extract_article_text, parse_feed, select_sources};
use onair_core::FeedSource;

fn sources(n: usize) -> Vec<FeedSource> {
    (0..n)
        .map(|i| FeedSource::new(format!("Source {i}"), format!("https://feeds.example/{i}")))
        .collect()
}

#[test]
fn test_articles_split_evenly_across_sources() {
    let counts: Vec<usize> = distribute_articles(&sources(5), 10)
        .into_iter()
        .map(|(_, n)| n)
        .collect();
    assert_eq!(counts, vec![2, 2, 2, 2, 2]);
}

#[test]
fn test_remainder_goes_to_earlier_sources() {
    let split = distribute_articles(&sources(3), 8);
    let counts: Vec<usize> = split.iter().map(|(_, n)| *n).collect();
    assert_eq!(counts, vec![3, 3, 2]);
    assert_eq!(split[0].0.name, "Source 0");
    assert!(distribute_articles(&[], 10).is_empty());
}

#[test]
fn test_sources_are_selected_by_number_or_name() {
    let picked = select_sources(&["3", "the guardian", "WIRED", "3"]).unwrap();
    let names: Vec<&str> = picked.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["TechCrunch", "The Guardian", "Wired"]);
}

#[test]
fn test_invalid_selections_are_skipped_but_one_must_be_valid() {
    let picked = select_sources(&["9", "intercept", "bbc"]).unwrap();
    assert_eq!(picked.len(), 1);
    assert_eq!(picked[0].url, "https://theintercept.com/feed/?lang=en");

    assert!(select_sources(&["0", "bbc", " "]).is_err());
    assert!(select_sources::<&str>(&[]).is_err());
}

#[test]
fn test_article_container_text_skips_chrome() {
    let html = r#"
        <html><body>
          <nav>Home | World</nav>
          <article>
            <header>Byline</header>
            <h1>Big   news</h1>
            <script>track()</script>
            <p>First paragraph.</p>
            <p>Second
               paragraph.</p>
            <footer>Share this</footer>
          </article>
        </body></html>"#;
    assert_eq!(
        extract_article_text(html),
        "Big news First paragraph. Second paragraph."
    );
}

#[test]
fn test_main_is_used_when_there_is_no_article() {
    let html = "<html><body><div>Sidebar</div><main><p>Main body</p></main></body></html>";
    assert_eq!(extract_article_text(html), "Main body");
}

#[test]
fn test_whole_page_text_without_container() {
    let html = "<html><body><div>Just</div><div>text</div></body></html>";
    assert_eq!(extract_article_text(html), "Just text");
}

const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example</title>
    <link>https://news.example/</link>
    <description>Example feed</description>
    <item>
      <title>First story</title>
      <link>https://news.example/first</link>
      <description>  A short
        summary.  </description>
    </item>
    <item>
      <title>Second story</title>
      <link>https://news.example/second</link>
      <description>Another summary.</description>
    </item>
    <item>
      <title>Third story</title>
      <link>https://news.example/third</link>
      <description>Cut by the limit.</description>
    </item>
  </channel>
</rss>"#;

#[test]
fn test_rss_entries_become_articles() {
    let articles = parse_feed(RSS.as_bytes(), "Example", 2).unwrap();
    assert_eq!(articles.len(), 2);
    assert_eq!(articles[0].title, "First story");
    assert_eq!(articles[0].link, "https://news.example/first");
    assert_eq!(articles[0].summary, "A short summary.");
    assert_eq!(articles[0].source, "Example");
    assert!(articles[0].full_text.is_empty());
    assert_eq!(articles[1].title, "Second story");
}

#[test]
fn test_unparseable_feed_is_an_error() {
    assert!(parse_feed(b"<html>not a feed", "Broken", 5).is_err());
}
