use async_trait::async_trait;
use mockall::{mock, Sequence};
use onair_core::prompts::NEWS_SUMMARY_PROMPT;
use onair_core::{
    parse_dialogue, Article, CannedWriter, ChatModel, ConversationWriter, DialogueGenerator,
    OnAirError, Speaker, SpeechLine, Topic,
};
use std::sync::Arc;

mock! {
    pub Model {}

    #[async_trait]
    impl ChatModel for Model {
        async fn complete(&self, system: &str, user: &str) -> onair_core::Result<String>;
    }
}

fn song_topic() -> Topic {
    Topic::SongDescription {
        song_name: "Blue Monday".into(),
        artist: "New Order".into(),
    }
}

mod parser {
    use super::*;

    #[test]
    fn test_one_utterance_per_tagged_line() {
        let reply = "</MUSIC_ENDS>\nMATT: Hello there!\nMOLLIE: Hi Matt.\n<MUSIC_BEGINS>";
        assert_eq!(
            parse_dialogue(reply),
            vec![
                SpeechLine::new(Speaker::Matt, "Hello there!"),
                SpeechLine::new(Speaker::Mollie, "Hi Matt."),
            ]
        );
    }

    #[test]
    fn test_untagged_lines_are_dropped() {
        let reply = "Here is your dialogue:\n\nMATT: One\nnarrator: nope\nMatthew: also no\nMOLLIE: Two";
        let lines = parse_dialogue(reply);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].speaker, Speaker::Matt);
        assert_eq!(lines[1].speaker, Speaker::Mollie);
    }

    #[test]
    fn test_tags_are_case_insensitive_and_trimmed() {
        let lines = parse_dialogue("  matt:   spaced out  \nMoLLiE:tight");
        assert_eq!(
            lines,
            vec![
                SpeechLine::new(Speaker::Matt, "spaced out"),
                SpeechLine::new(Speaker::Mollie, "tight"),
            ]
        );
    }

    #[test]
    fn test_empty_tagged_line_is_kept() {
        let lines = parse_dialogue("MATT:\nMOLLIE: still here");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], SpeechLine::new(Speaker::Matt, ""));
    }

    #[test]
    fn test_no_tags_yields_nothing() {
        assert!(parse_dialogue("").is_empty());
        assert!(parse_dialogue("just prose\nwith no speakers").is_empty());
    }
}

mod generator {
    use super::*;

    #[tokio::test]
    async fn test_song_dialogue_prompts_with_song_and_artist() {
        let mut model = MockModel::new();
        model
            .expect_complete()
            .withf(|_, user| user == "Song just played: 'Blue Monday' by New Order")
            .times(1)
            .returning(|_, _| Ok("MATT: Classic.\nMOLLIE: Timeless.".into()));

        let writer = DialogueGenerator::new(Arc::new(model));
        let lines = writer.render(&song_topic()).await;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "Classic.");
    }

    #[tokio::test]
    async fn test_news_is_summarised_before_dialogue() {
        let mut model = MockModel::new();
        let mut seq = Sequence::new();
        model
            .expect_complete()
            .withf(|system, user| {
                system == NEWS_SUMMARY_PROMPT && user.contains("Title: Rust 2.0") && user.contains("full body")
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok("- it shipped".into()));
        model
            .expect_complete()
            .withf(|_, user| user == "Create a dialogue about this news: - it shipped")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok("MOLLIE: Big news!".into()));

        let article = Article {
            title: "Rust 2.0".into(),
            summary: "short".into(),
            link: "https://example.com/rust".into(),
            full_text: "full body".into(),
            source: "Example".into(),
        };
        let writer = DialogueGenerator::new(Arc::new(model));
        let lines = writer.render(&Topic::NewsDescription { article }).await;
        assert_eq!(lines, vec![SpeechLine::new(Speaker::Mollie, "Big news!")]);
    }

    #[tokio::test]
    async fn test_summary_falls_back_to_feed_summary_without_full_text() {
        let mut model = MockModel::new();
        model
            .expect_complete()
            .withf(|system, user| system == NEWS_SUMMARY_PROMPT && user.ends_with("feed summary"))
            .times(1)
            .returning(|_, _| Ok("- summary".into()));

        let article = Article {
            title: "T".into(),
            summary: "feed summary".into(),
            link: "l".into(),
            full_text: "   ".into(),
            source: String::new(),
        };
        let writer = DialogueGenerator::new(Arc::new(model));
        assert_eq!(writer.summarise_article(&article).await.unwrap(), "- summary");
    }

    #[tokio::test]
    async fn test_llm_failure_degrades_to_canned_lines() {
        let mut model = MockModel::new();
        model
            .expect_complete()
            .returning(|_, _| Err(OnAirError::LlmError("boom".into())));

        let writer = DialogueGenerator::new(Arc::new(model));
        let topic = song_topic();
        assert_eq!(writer.render(&topic).await, CannedWriter::lines_for(&topic));
    }

    #[tokio::test]
    async fn test_untagged_reply_degrades_to_canned_lines() {
        let mut model = MockModel::new();
        model
            .expect_complete()
            .returning(|_, _| Ok("Sorry, I can't do that.".into()));

        let writer = DialogueGenerator::new(Arc::new(model));
        let topic = Topic::NewsDescription {
            article: Article::dummy(),
        };
        assert_eq!(writer.render(&topic).await, CannedWriter::lines_for(&topic));
    }
}
