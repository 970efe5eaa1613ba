//! Radio queue data model and block expansion.
//!
//! The queue is a single linear sequence of what plays next. Blocks follow a
//! fixed pattern: N songs, a placeholder about the last of them, N more songs,
//! and a placeholder about one unused article.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

/// One of the two radio hosts
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Matt,
    Mollie,
}

impl Speaker {
    /// Speaker used for an untagged line at `position`: even → Matt, odd → Mollie.
    pub fn alternating(position: usize) -> Self {
        if position % 2 == 0 {
            Speaker::Matt
        } else {
            Speaker::Mollie
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Speaker::Matt => "MATT",
            Speaker::Mollie => "MOLLIE",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::Matt => "matt",
            Speaker::Mollie => "mollie",
        }
    }

    /// Guess the speaker from a file name such as `speech_1_matt.wav`
    pub fn from_file_name(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        if lower.contains("mollie") {
            Some(Speaker::Mollie)
        } else if lower.contains("matt") {
            Some(Speaker::Matt)
        } else {
            None
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechLine {
    pub text: String,
    pub speaker: Speaker,
}

impl SpeechLine {
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            speaker,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub name: String,
    pub artist: String,
    /// Playable URI; `None` for fallback entries that nothing can play
    pub uri: Option<String>,
}

impl Song {
    pub fn fallback() -> Self {
        Self {
            name: "Fallback Song".to_string(),
            artist: "Fallback Artist".to_string(),
            uri: None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.uri.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub summary: String,
    pub link: String,
    pub full_text: String,
    #[serde(default)]
    pub source: String,
}

impl Article {
    /// Used in live mode once every fetched article has been talked about
    pub fn exhausted() -> Self {
        Self {
            title: "No More Real Articles".to_string(),
            summary: "No more articles left.".to_string(),
            link: "#".to_string(),
            full_text: "None left.".to_string(),
            source: String::new(),
        }
    }

    /// Used in dummy mode, where nothing is fetched
    pub fn dummy() -> Self {
        Self {
            title: "Dummy Article".to_string(),
            summary: "This is a dummy summary".to_string(),
            link: "http://example.com/dummy".to_string(),
            full_text: "This is dummy full text.".to_string(),
            source: String::new(),
        }
    }
}

/// What a conversation placeholder is about
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Topic {
    SongDescription { song_name: String, artist: String },
    NewsDescription { article: Article },
}

/// Pre-recorded line played from a local file; never deleted after playback
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedClip {
    pub path: PathBuf,
    pub speaker: Speaker,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum QueueItem {
    Song(Song),
    ConversationPlaceholder(Topic),
    Conversation {
        lines: Vec<SpeechLine>,
        topic: Option<Topic>,
    },
    #[serde(rename = "conversation_pre_recorded")]
    PreRecorded(Vec<RecordedClip>),
}

impl QueueItem {
    pub fn kind(&self) -> &'static str {
        match self {
            QueueItem::Song(_) => "song",
            QueueItem::ConversationPlaceholder(_) => "conversation_placeholder",
            QueueItem::Conversation { .. } => "conversation",
            QueueItem::PreRecorded(_) => "conversation_pre_recorded",
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, QueueItem::ConversationPlaceholder(_))
    }
}

/// Songs and articles already used in the current session
#[derive(Clone, Debug, Default)]
pub struct SessionHistory {
    played_songs: Vec<String>,
    used_articles: HashSet<String>,
}

impl SessionHistory {
    pub fn played_songs(&self) -> &[String] {
        &self.played_songs
    }

    pub fn has_played(&self, uri: &str) -> bool {
        self.played_songs.iter().any(|u| u == uri)
    }

    pub fn mark_played(&mut self, uri: &str) {
        if !self.has_played(uri) {
            self.played_songs.push(uri.to_string());
        }
    }

    pub fn is_article_used(&self, link: &str) -> bool {
        self.used_articles.contains(link)
    }

    pub fn mark_article_used(&mut self, link: &str) {
        self.used_articles.insert(link.to_string());
    }

    pub fn clear(&mut self) {
        self.played_songs.clear();
        self.used_articles.clear();
    }
}

/// Result of appending one block to the queue
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockReport {
    pub real_songs: usize,
    pub fallback_songs: usize,
    pub used_fallback_article: bool,
    /// The music service answered that no unplayed track is left
    pub playlist_exhausted: bool,
}

impl BlockReport {
    /// The playlist is used up and this block got no song from it.
    /// A block short of songs because the service was unreachable is not exhausted.
    pub fn songs_exhausted(&self) -> bool {
        self.playlist_exhausted && self.real_songs == 0
    }
}

/// Linear playlist plus the index of the next item to play
#[derive(Clone, Debug, Default, Serialize)]
pub struct RadioQueue {
    items: Vec<QueueItem>,
    current_index: usize,
}

impl RadioQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Items not yet handed out by `advance`
    pub fn remaining(&self) -> usize {
        self.items.len().saturating_sub(self.current_index)
    }

    pub fn push(&mut self, item: QueueItem) {
        self.items.push(item);
    }

    pub fn get(&self, index: usize) -> Option<&QueueItem> {
        self.items.get(index)
    }

    /// The item that will be returned by the next `advance`
    pub fn peek_next(&self) -> Option<&QueueItem> {
        self.items.get(self.current_index)
    }

    /// Hand out the next item and move the cursor past it
    pub fn advance(&mut self) -> Option<(usize, QueueItem)> {
        let index = self.current_index;
        let item = self.items.get(index)?.clone();
        self.current_index += 1;
        Some((index, item))
    }

    /// Topic of the placeholder at `index`, if that item is still unrendered
    pub fn placeholder_topic(&self, index: usize) -> Option<Topic> {
        match self.items.get(index) {
            Some(QueueItem::ConversationPlaceholder(topic)) => Some(topic.clone()),
            _ => None,
        }
    }

    /// Replace the placeholder at `index` with its rendered conversation.
    ///
    /// Returns false (and changes nothing) when the item is not a placeholder,
    /// which is what makes rendering happen at most once per placeholder.
    pub fn fill_placeholder(&mut self, index: usize, lines: Vec<SpeechLine>) -> bool {
        let Some(slot) = self.items.get_mut(index) else {
            return false;
        };
        let QueueItem::ConversationPlaceholder(topic) = slot else {
            return false;
        };
        let topic = topic.clone();
        *slot = QueueItem::Conversation {
            lines,
            topic: Some(topic),
        };
        true
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.current_index = 0;
    }
}

/// Append one block: `songs_per_block` songs, a placeholder about the last one,
/// `songs_per_block` songs, then the news item.
///
/// `next_song` yields a unique song or `None`; missing songs become fallback
/// entries. `news_item` produces the closing conversation item.
pub fn append_block<S, N>(
    queue: &mut RadioQueue,
    songs_per_block: usize,
    mut next_song: S,
    news_item: N,
) -> BlockReport
where
    S: FnMut() -> Option<Song>,
    N: FnOnce(&mut BlockReport) -> QueueItem,
{
    let mut report = BlockReport::default();
    let mut take_song = |report: &mut BlockReport| match next_song() {
        Some(song) => {
            report.real_songs += 1;
            song
        }
        None => {
            report.fallback_songs += 1;
            Song::fallback()
        }
    };

    let mut last = Song::fallback();
    for _ in 0..songs_per_block {
        last = take_song(&mut report);
        queue.push(QueueItem::Song(last.clone()));
    }
    queue.push(QueueItem::ConversationPlaceholder(Topic::SongDescription {
        song_name: last.name.clone(),
        artist: last.artist.clone(),
    }));

    for _ in 0..songs_per_block {
        let song = take_song(&mut report);
        queue.push(QueueItem::Song(song));
    }

    let closing = news_item(&mut report);
    queue.push(closing);
    report
}

/// Pick an unused article at random and mark it used; fall back to the
/// "no more articles" entry when none are left.
pub fn pick_article(
    articles: &[Article],
    history: &mut SessionHistory,
    report: &mut BlockReport,
) -> Article {
    use rand::seq::SliceRandom;

    let available: Vec<&Article> = articles
        .iter()
        .filter(|a| !history.is_article_used(&a.link))
        .collect();
    match available.choose(&mut rand::thread_rng()) {
        Some(article) => {
            history.mark_article_used(&article.link);
            (*article).clone()
        }
        None => {
            report.used_fallback_article = true;
            Article::exhausted()
        }
    }
}
