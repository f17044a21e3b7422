use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::MissedTickBehavior;
use url::Url;

use super::entry::FeedKind;
use super::fetcher::{fetch_document, FetchError};
use super::parser::parse_feed;
use crate::config::SourceConfig;
use crate::record::{to_record, Record};

/// Whether parsed entries may currently be handed downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Running,
    Paused,
}

/// Reasons a single tick ended before delivering every entry.
#[derive(Debug, Error)]
pub enum TickError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// The downstream receiver was dropped.
    #[error("Downstream channel closed")]
    DownstreamClosed,
    /// The poller that owned this tick was dropped while it was paused.
    #[error("Poller stopped")]
    Stopped,
}

/// Cancellation handle for a started poll schedule.
#[derive(Debug, Clone)]
pub struct PollHandle {
    abort: AbortHandle,
}

impl PollHandle {
    /// Cancels future ticks and interrupts the current one at its next
    /// await point. Entries of an interrupted tick that were not yet
    /// delivered are lost.
    pub fn cancel(&self) {
        self.abort.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}

/// Periodically fetches one feed and delivers its entries as [`Record`]s.
///
/// # Pause semantics
///
/// [`pause`](Poller::pause) gates *delivery* only. A tick that starts while
/// paused still fetches and parses the document, then waits before handing
/// over the first entry. [`resume`](Poller::resume) releases the waiting
/// tick, which continues in document order. Pausing therefore stops record
/// emission but not network traffic.
///
/// # Scheduling
///
/// Ticks run on a single task and never overlap: the first runs immediately,
/// later ones every `interval`. A tick that runs longer than `interval`
/// (including time spent paused) delays the next one instead of running
/// concurrently with it.
pub struct Poller {
    url: Url,
    kind: FeedKind,
    client: reqwest::Client,
    state: watch::Sender<PollState>,
    task: Option<JoinHandle<()>>,
}

impl Poller {
    pub fn new(config: &SourceConfig, client: reqwest::Client) -> Self {
        let (state, _) = watch::channel(PollState::Running);
        Self {
            url: config.url().clone(),
            kind: config.feed_kind(),
            client,
            state,
            task: None,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn state(&self) -> PollState {
        *self.state.borrow()
    }

    /// Starts the poll schedule on the current tokio runtime.
    ///
    /// Starting an already running poller replaces its schedule.
    pub fn start(&mut self, interval: Duration, downstream: mpsc::Sender<Record>) -> PollHandle {
        self.stop();

        // tokio::time::interval panics on a zero period
        let interval = interval.max(Duration::from_millis(1));
        let url = self.url.clone();
        let kind = self.kind;
        let client = self.client.clone();
        let state = self.state.subscribe();

        tracing::info!(url = %url, kind = %kind, interval_ms = interval.as_millis() as u64, "Starting feed poller");

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match run_tick(&client, &url, kind, state.clone(), &downstream).await {
                    Ok(delivered) => {
                        tracing::debug!(url = %url, delivered, "Poll tick complete");
                    }
                    Err(TickError::Fetch(e)) => {
                        tracing::warn!(url = %url, error = %e, "Poll tick failed, will retry next interval");
                    }
                    Err(e) => {
                        tracing::info!(url = %url, reason = %e, "Stopping feed poller");
                        break;
                    }
                }
            }
        });

        let handle = PollHandle {
            abort: task.abort_handle(),
        };
        self.task = Some(task);
        handle
    }

    /// Runs one fetch-parse-deliver cycle on the caller's task.
    ///
    /// Honors the pause state exactly like a scheduled tick. Returns the
    /// number of records delivered.
    pub async fn poll_once(&self, downstream: &mpsc::Sender<Record>) -> Result<usize, TickError> {
        run_tick(
            &self.client,
            &self.url,
            self.kind,
            self.state.subscribe(),
            downstream,
        )
        .await
    }

    /// Suspends delivery before the next entry. No-op when already paused.
    pub fn pause(&self) {
        let changed = self.state.send_if_modified(|state| {
            if *state == PollState::Paused {
                return false;
            }
            *state = PollState::Paused;
            true
        });
        if changed {
            tracing::info!(url = %self.url, "Feed poller paused");
        }
    }

    /// Resumes delivery and wakes every waiting tick. No-op when running.
    pub fn resume(&self) {
        let changed = self.state.send_if_modified(|state| {
            if *state == PollState::Running {
                return false;
            }
            *state = PollState::Running;
            true
        });
        if changed {
            tracing::info!(url = %self.url, "Feed poller resumed");
        }
    }

    /// Cancels the schedule and interrupts a running tick. Idempotent.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!(url = %self.url, "Aborted feed poller task");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_tick(
    client: &reqwest::Client,
    url: &Url,
    kind: FeedKind,
    mut state: watch::Receiver<PollState>,
    downstream: &mpsc::Sender<Record>,
) -> Result<usize, TickError> {
    // Fetch and parse regardless of pause state; only delivery waits
    let bytes = fetch_document(client, url).await?;
    let entries = parse_feed(&bytes, kind).map_err(FetchError::from)?;

    let mut delivered = 0;
    for entry in entries {
        if *state.borrow() == PollState::Paused {
            tracing::debug!(url = %url, "Delivery suspended until resume");
        }
        if state
            .wait_for(|s| *s == PollState::Running)
            .await
            .is_err()
        {
            return Err(TickError::Stopped);
        }

        if downstream.send(to_record(&entry)).await.is_err() {
            return Err(TickError::DownstreamClosed);
        }
        delivered += 1;
    }

    Ok(delivered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceConfig;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RSS: &str = r#"<rss version="2.0"><channel>
<item><title>a</title><pubDate>d</pubDate><guid>1</guid><link>l1</link></item>
<item><title>b</title><pubDate>d</pubDate><guid>2</guid><link>l2</link></item>
</channel></rss>"#;

    async fn poller_for(server: &MockServer) -> Poller {
        let config = SourceConfig::new(
            &format!("{}/rss.xml", server.uri()),
            FeedKind::Rss,
            Duration::from_secs(60),
        )
        .unwrap();
        Poller::new(&config, reqwest::Client::new())
    }

    #[tokio::test]
    async fn test_pause_resume_idempotent() {
        let server = MockServer::start().await;
        let poller = poller_for(&server).await;
        assert_eq!(poller.state(), PollState::Running);
        poller.resume();
        assert_eq!(poller.state(), PollState::Running);
        poller.pause();
        poller.pause();
        assert_eq!(poller.state(), PollState::Paused);
        poller.resume();
        assert_eq!(poller.state(), PollState::Running);
    }

    #[tokio::test]
    async fn test_poll_once_delivers_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
            .mount(&server)
            .await;

        let poller = poller_for(&server).await;
        let (tx, mut rx) = mpsc::channel(8);
        let delivered = poller.poll_once(&tx).await.unwrap();
        assert_eq!(delivered, 2);
        assert_eq!(rx.recv().await.unwrap().get("guid"), Some("1"));
        assert_eq!(rx.recv().await.unwrap().get("guid"), Some("2"));
    }

    #[tokio::test]
    async fn test_poll_once_downstream_closed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
            .mount(&server)
            .await;

        let poller = poller_for(&server).await;
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let result = poller.poll_once(&tx).await;
        assert!(matches!(result, Err(TickError::DownstreamClosed)));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
            .mount(&server)
            .await;

        let mut poller = poller_for(&server).await;
        let (tx, _rx) = mpsc::channel(8);
        let handle = poller.start(Duration::from_secs(60), tx);
        assert!(poller.is_running());
        poller.stop();
        poller.stop();
        assert!(!poller.is_running());
        // Aborting is asynchronous; give the runtime a moment to reap the task
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.is_finished());
    }
}
