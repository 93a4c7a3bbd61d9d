//! WebSocket notification feed.
//!
//! Connects to the ledger's event endpoint, subscribes to the `election` topic and
//! republishes every frame as a payload-free [`LedgerNotification`]. On disconnect it
//! reconnects with capped exponential backoff. Each successful (re)connect publishes
//! [`LedgerNotification::Resubscribed`], since frames sent while we were away are lost.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, watch};
use tokio_tungstenite::tungstenite::Message;

use crate::LedgerNotification;

/// Topic name the ledger publishes election events under.
const ELECTION_TOPIC: &str = "election";

/// How long to wait for the feed task to finish on stop.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Backoff schedule for reconnect attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl ReconnectPolicy {
    /// Delay before the next attempt, doubling from `current` up to `max`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        (current * 2).min(self.max)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}

/// `{"topic": "election", "data": {"event": "vote_recorded", ...}}`
#[derive(Debug, Deserialize)]
struct EventFrame {
    topic: String,
    #[serde(default)]
    data: Option<EventData>,
}

#[derive(Debug, Deserialize)]
struct EventData {
    event: String,
}

/// Map a text frame to a notification. Anything we do not recognize is ignored.
pub fn parse_frame(text: &str) -> Option<LedgerNotification> {
    let frame: EventFrame = serde_json::from_str(text).ok()?;
    if frame.topic != ELECTION_TOPIC {
        return None;
    }
    match frame.data?.event.as_str() {
        "phase_changed" | "state_changed" => Some(LedgerNotification::PhaseChanged),
        "vote_recorded" | "voted" => Some(LedgerNotification::VoteRecorded),
        "candidate_added" => Some(LedgerNotification::CandidateAdded),
        _ => None,
    }
}

fn subscribe_message() -> String {
    serde_json::json!({ "action": "subscribe", "topic": ELECTION_TOPIC }).to_string()
}

/// Why a single connection ended.
enum ConnectionEnd {
    Shutdown,
    Lost(String),
}

/// Handle to the running notification feed task.
pub struct EventFeed {
    shutdown_tx: Option<watch::Sender<bool>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl EventFeed {
    /// Start the feed in the background, publishing into `notifier`.
    pub fn start(
        url: impl Into<String>,
        notifier: broadcast::Sender<LedgerNotification>,
        policy: ReconnectPolicy,
    ) -> Self {
        let url = url.into();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            run_feed_loop(url, notifier, policy, shutdown_rx).await;
        });

        Self {
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }

    /// Stop the feed and wait briefly for the connection to close.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.task.take() {
            let _ = tokio::time::timeout(STOP_TIMEOUT, task).await;
        }
    }
}

async fn run_feed_loop(
    url: String,
    notifier: broadcast::Sender<LedgerNotification>,
    policy: ReconnectPolicy,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut delay = policy.initial;

    loop {
        match connect_and_forward(&url, &notifier, &mut shutdown, &mut delay, policy).await {
            ConnectionEnd::Shutdown => break,
            ConnectionEnd::Lost(reason) => {
                tracing::warn!(url = %url, retry_in_ms = delay.as_millis() as u64, "event feed lost: {reason}");
            }
        }

        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            _ = tokio::time::sleep(delay) => {}
        }
        delay = policy.next_delay(delay);
    }

    tracing::debug!(url = %url, "event feed stopped");
}

async fn connect_and_forward(
    url: &str,
    notifier: &broadcast::Sender<LedgerNotification>,
    shutdown: &mut watch::Receiver<bool>,
    delay: &mut Duration,
    policy: ReconnectPolicy,
) -> ConnectionEnd {
    let (ws, _) = match tokio_tungstenite::connect_async(url).await {
        Ok(conn) => conn,
        Err(e) => return ConnectionEnd::Lost(format!("connect failed: {e}")),
    };
    let (mut sink, mut stream) = ws.split();

    if let Err(e) = sink.send(Message::Text(subscribe_message())).await {
        return ConnectionEnd::Lost(format!("subscribe failed: {e}"));
    }

    tracing::info!(url = %url, "event feed connected");
    *delay = policy.initial;
    // Whatever happened while we were disconnected is unknown.
    let _ = notifier.send(LedgerNotification::Resubscribed);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    let _ = sink.send(Message::Close(None)).await;
                    return ConnectionEnd::Shutdown;
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Some(notification) = parse_frame(&text) {
                        tracing::debug!(?notification, "ledger notification");
                        let _ = notifier.send(notification);
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = sink.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    return ConnectionEnd::Lost("closed by ledger".into());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return ConnectionEnd::Lost(e.to_string()),
            }
        }
    }
}
