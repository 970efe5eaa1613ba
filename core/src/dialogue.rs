//! Scripted two-host dialogue: LLM prompting and reply parsing.

use crate::llm::{ChatModel, LlmClient};
use crate::prompts;
use crate::queue::{Article, Speaker, SpeechLine, Topic};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Parse an LLM reply into utterances.
///
/// Exactly one utterance per line whose first non-blank characters are a
/// `MATT:` or `MOLLIE:` tag (any case); every other line is dropped.
pub fn parse_dialogue(text: &str) -> Vec<SpeechLine> {
    text.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<SpeechLine> {
    let line = line.trim_start();
    [Speaker::Matt, Speaker::Mollie].into_iter().find_map(|speaker| {
        let tag = speaker.tag();
        let n = tag.len();
        let name = line.get(..n)?;
        if line.get(n..n + 1)? == ":" && name.eq_ignore_ascii_case(tag) {
            Some(SpeechLine::new(speaker, line[n + 1..].trim()))
        } else {
            None
        }
    })
}

/// Turns a conversation topic into lines. Never fails: implementations
/// degrade to canned lines.
#[async_trait]
pub trait ConversationWriter: Send + Sync {
    async fn render(&self, topic: &Topic) -> Vec<SpeechLine>;
}

/// Fixed lines used when no LLM is available or a call failed
#[derive(Clone, Debug, Default)]
pub struct CannedWriter;

impl CannedWriter {
    pub fn lines_for(topic: &Topic) -> Vec<SpeechLine> {
        match topic {
            Topic::SongDescription { song_name, artist } => vec![
                SpeechLine::new(
                    Speaker::Matt,
                    format!("That was '{song_name}' by {artist}. Always a vibe!"),
                ),
                SpeechLine::new(Speaker::Mollie, "Definitely. Let's keep the party going!"),
            ],
            Topic::NewsDescription { .. } => vec![
                SpeechLine::new(Speaker::Matt, "Some interesting news out there, apparently!"),
                SpeechLine::new(Speaker::Mollie, "Big stuff happening. Next song soon!"),
            ],
        }
    }
}

#[async_trait]
impl ConversationWriter for CannedWriter {
    async fn render(&self, topic: &Topic) -> Vec<SpeechLine> {
        Self::lines_for(topic)
    }
}

/// LLM-backed dialogue writer
pub struct DialogueGenerator {
    model: Arc<dyn ChatModel>,
}

impl DialogueGenerator {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub async fn song_dialogue(&self, song_name: &str, artist: &str) -> Result<Vec<SpeechLine>> {
        let user = format!("Song just played: '{song_name}' by {artist}");
        let reply = self
            .model
            .complete(&prompts::song_dialogue_prompt(), &user)
            .await?;
        Ok(parse_dialogue(&reply))
    }

    /// Condense an article before asking for a dialogue about it
    pub async fn summarise_article(&self, article: &Article) -> Result<String> {
        let body = if article.full_text.trim().is_empty() {
            &article.summary
        } else {
            &article.full_text
        };
        let user = format!(
            "Please summarise this news article:\nTitle: {}\n\n{}",
            article.title, body
        );
        self.model
            .complete(prompts::NEWS_SUMMARY_PROMPT, &user)
            .await
    }

    pub async fn news_dialogue(&self, summary: &str) -> Result<Vec<SpeechLine>> {
        let user = format!("Create a dialogue about this news: {summary}");
        let reply = self
            .model
            .complete(&prompts::radio_system_prompt(), &user)
            .await?;
        Ok(parse_dialogue(&reply))
    }

    async fn try_render(&self, topic: &Topic) -> Result<Vec<SpeechLine>> {
        match topic {
            Topic::SongDescription { song_name, artist } => {
                self.song_dialogue(song_name, artist).await
            }
            Topic::NewsDescription { article } => {
                let summary = self.summarise_article(article).await?;
                debug!(target = "dialogue", title = %article.title, "Summarised article");
                self.news_dialogue(&summary).await
            }
        }
    }
}

#[async_trait]
impl ConversationWriter for DialogueGenerator {
    async fn render(&self, topic: &Topic) -> Vec<SpeechLine> {
        match self.try_render(topic).await {
            Ok(lines) if !lines.is_empty() => {
                info!(target = "dialogue", lines = lines.len(), "Generated dialogue");
                lines
            }
            Ok(_) => {
                warn!(target = "dialogue", "LLM reply had no tagged lines; using canned dialogue");
                CannedWriter::lines_for(topic)
            }
            Err(e) => {
                warn!(target = "dialogue", error = %e, "Dialogue generation failed; using canned dialogue");
                CannedWriter::lines_for(topic)
            }
        }
    }
}

/// LLM dialogue when `OPENAI_API_KEY` is set, canned lines otherwise
pub fn writer_from_env() -> Arc<dyn ConversationWriter> {
    match LlmClient::from_env() {
        Ok(client) if client.config().api_key.is_some() => {
            Arc::new(DialogueGenerator::new(Arc::new(client)))
        }
        Ok(_) => {
            info!(target = "dialogue", "OPENAI_API_KEY not set; using canned dialogue");
            Arc::new(CannedWriter)
        }
        Err(e) => {
            warn!(target = "dialogue", error = %e, "LLM unavailable; using canned dialogue");
            Arc::new(CannedWriter)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_line_handles_unicode_without_panicking() {
        assert!(parse_line("ÉÉÉÉÉÉÉÉ").is_none());
        assert!(parse_line("MATÉ: nope").is_none());
        assert!(parse_line("MA").is_none());
        assert_eq!(
            parse_line("  mollie:   hey  "),
            Some(SpeechLine::new(Speaker::Mollie, "hey"))
        );
    }
}
