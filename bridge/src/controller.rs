//! Owns the one running station session behind the HTTP API.

use std::sync::Arc;
use std::time::Duration;

use onair_core::queue::BlockReport;
use onair_core::station::status_channel;
use onair_core::{
    fetch_articles, Article, ConversationSpeaker, NewsConfig, PlaybackDriver, Station,
    StationConfig, StationMode, StationSnapshot, Trigger,
};
use tokio::sync::{watch, Mutex, OnceCell};
use tokio::task::JoinHandle;
use tracing::{info, warn};

const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(2);

struct Session {
    cancel: Trigger,
    handle: JoinHandle<()>,
}

pub struct StationController {
    mode: StationMode,
    cfg: StationConfig,
    speaker: Arc<dyn ConversationSpeaker>,
    driver: Option<PlaybackDriver>,
    news: NewsConfig,
    /// Fetched on the first live start and reused by every later session
    articles: OnceCell<Vec<Article>>,
    status_tx: Arc<watch::Sender<StationSnapshot>>,
    current: Mutex<Option<Session>>,
    stop_grace: Duration,
}

impl StationController {
    pub fn new(mode: StationMode, cfg: StationConfig, speaker: Arc<dyn ConversationSpeaker>) -> Self {
        let (status_tx, _) = status_channel();
        Self {
            mode,
            cfg,
            speaker,
            driver: None,
            news: NewsConfig::default(),
            articles: OnceCell::new(),
            status_tx,
            current: Mutex::new(None),
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }

    /// Driver whose channel is silenced when a session is torn down
    pub fn with_driver(mut self, driver: PlaybackDriver) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn with_news(mut self, news: NewsConfig) -> Self {
        self.news = news;
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn mode(&self) -> StationMode {
        self.mode
    }

    pub fn subscribe(&self) -> watch::Receiver<StationSnapshot> {
        self.status_tx.subscribe()
    }

    pub fn snapshot(&self) -> StationSnapshot {
        self.status_tx.borrow().clone()
    }

    /// Articles for a new session. Feeds are read once per controller; dummy mode reads none.
    pub async fn articles(&self) -> Vec<Article> {
        if self.mode == StationMode::Dummy {
            return Vec::new();
        }
        self.articles
            .get_or_init(|| async {
                let articles = fetch_articles(self.news.clone()).await;
                info!(target = "controller", count = articles.len(), "News articles cached");
                articles
            })
            .await
            .clone()
    }

    pub async fn is_running(&self) -> bool {
        self.current
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| !s.handle.is_finished())
    }

    /// Stop any running session, then start a fresh one with empty history.
    /// Returns once the initial queue is built; playback continues in the background.
    pub async fn start_radio(&self) -> BlockReport {
        let mut current = self.current.lock().await;
        if let Some(session) = current.take() {
            self.stop_session(session).await;
        }

        let articles = self.articles().await;
        let mut station =
            Station::assemble(self.cfg.clone(), self.mode, Arc::clone(&self.speaker), articles)
                .with_status_sender(Arc::clone(&self.status_tx));
        let report = station.build_initial_queue().await;

        let cancel = Trigger::new();
        let run_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            station.run(run_cancel).await;
        });
        *current = Some(Session { cancel, handle });
        info!(target = "controller", mode = ?self.mode, "Station session started");
        report
    }

    pub async fn stop(&self) {
        if let Some(session) = self.current.lock().await.take() {
            self.stop_session(session).await;
        }
    }

    async fn stop_session(&self, session: Session) {
        let Session { cancel, mut handle } = session;
        cancel.fire();
        if tokio::time::timeout(self.stop_grace, &mut handle).await.is_err() {
            warn!(target = "controller", "Station did not stop in time; aborting");
            handle.abort();
            let _ = handle.await;
        }
        if let Some(driver) = &self.driver {
            driver.stop_current().await;
        }
        self.status_tx.send_modify(|s| s.running = false);
        info!(target = "controller", "Station session stopped");
    }
}
