//! SSE stream handling, decoupled from the HTTP layer.
//!
//! The handler is an explicit three-state machine
//! (`Connecting → Streaming → Closed`) with an explicit cancellation input,
//! so the exit conditions (client gone, server shutdown) are testable
//! without an HTTP server. The host bridges [`SseFrame::render`] output onto
//! its response body; there is no reconnection logic here, a disconnected
//! client opens a new stream.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};

use crate::broker::NotificationBroker;
use crate::insights::Insight;

/// Stream lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Subscribing and emitting the `connected` event.
    Connecting,
    /// Forwarding insights and heartbeats.
    Streaming,
    /// Unsubscribed; the stream is over.
    Closed,
}

/// Why a stream left the `Streaming` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The cancellation signal fired (client disconnect or server shutdown).
    Cancelled,
    /// The frame consumer went away.
    SinkClosed,
    /// The broker dropped the subscription side.
    SubscriptionClosed,
}

/// One frame of the event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    /// Sent once on open.
    Connected {
        /// The streaming user.
        user_id: i64,
        /// Connection time.
        timestamp: DateTime<Utc>,
    },
    /// One delivered insight.
    Insight(Box<Insight>),
    /// Keep-alive comment for intermediary proxies.
    Heartbeat,
}

#[derive(Serialize)]
struct ConnectedData {
    user_id: i64,
    timestamp: DateTime<Utc>,
}

impl SseFrame {
    /// Render the frame as SSE wire text.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Connected { user_id, timestamp } => {
                let data = serde_json::to_string(&ConnectedData {
                    user_id: *user_id,
                    timestamp: *timestamp,
                })
                .unwrap_or_else(|_| "{}".to_string());
                format!("event: connected\ndata: {data}\n\n")
            }
            Self::Insight(insight) => {
                let data =
                    serde_json::to_string(insight).unwrap_or_else(|_| "{}".to_string());
                format!("event: insight\ndata: {data}\n\n")
            }
            Self::Heartbeat => ": keep-alive\n\n".to_string(),
        }
    }
}

/// What a finished stream did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSummary {
    /// Insights forwarded to the sink.
    pub insights_sent: u64,
    /// Heartbeats written.
    pub heartbeats_sent: u64,
    /// Why the stream closed.
    pub close_reason: CloseReason,
}

/// Drives one subscriber's event stream.
pub struct SseStreamHandler {
    broker: Arc<NotificationBroker>,
    heartbeat_interval: Duration,
}

impl SseStreamHandler {
    /// Create a handler publishing heartbeats every `heartbeat_interval`.
    #[must_use]
    pub fn new(broker: Arc<NotificationBroker>, heartbeat_interval: Duration) -> Self {
        Self {
            broker,
            heartbeat_interval,
        }
    }

    /// Run the stream for `user_id`, pushing frames into `sink` until the
    /// cancellation signal fires or the sink closes. Blocks for the
    /// lifetime of the connection by design.
    pub async fn run(
        &self,
        user_id: i64,
        sink: mpsc::Sender<SseFrame>,
        mut cancel: watch::Receiver<bool>,
    ) -> StreamSummary {
        let mut state = StreamState::Connecting;
        tracing::debug!(user_id, state = ?state, "insight stream connecting");
        let mut subscription = self.broker.subscribe(user_id);
        let mut insights_sent = 0u64;
        let mut heartbeats_sent = 0u64;

        let close_reason = 'stream: {
            if sink
                .send(SseFrame::Connected {
                    user_id,
                    timestamp: Utc::now(),
                })
                .await
                .is_err()
            {
                break 'stream CloseReason::SinkClosed;
            }
            state = StreamState::Streaming;
            tracing::debug!(user_id, state = ?state, "insight stream open");

            let mut heartbeat = tokio::time::interval(self.heartbeat_interval);
            // The first tick fires immediately; spend it before the loop.
            heartbeat.tick().await;

            loop {
                tokio::select! {
                    delivered = subscription.receiver.recv() => {
                        let Some(insight) = delivered else {
                            break 'stream CloseReason::SubscriptionClosed;
                        };
                        if sink.send(SseFrame::Insight(Box::new(insight))).await.is_err() {
                            break 'stream CloseReason::SinkClosed;
                        }
                        insights_sent += 1;
                    }
                    _ = heartbeat.tick() => {
                        if sink.send(SseFrame::Heartbeat).await.is_err() {
                            break 'stream CloseReason::SinkClosed;
                        }
                        heartbeats_sent += 1;
                    }
                    changed = cancel.changed() => {
                        if changed.is_err() || *cancel.borrow() {
                            break 'stream CloseReason::Cancelled;
                        }
                    }
                }
            }
        };

        self.broker
            .unsubscribe(user_id, subscription.subscriber_id);
        state = StreamState::Closed;
        tracing::debug!(
            user_id,
            state = ?state,
            insights_sent,
            heartbeats_sent,
            "insight stream closed"
        );

        StreamSummary {
            insights_sent,
            heartbeats_sent,
            close_reason,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::insights::{InsightLevel, InsightPayload, InsightType};
    use pretty_assertions::assert_eq;

    fn insight(user_id: i64, id: i64) -> Insight {
        Insight {
            id,
            user_id,
            insight_type: InsightType::Mmr,
            level: InsightLevel::Success,
            title: "MMR climbing".into(),
            message: "m".into(),
            payload: InsightPayload::MmrShift { change: 60 },
            action_url: Some("/analytics/mmr".into()),
            is_read: false,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    #[test]
    fn connected_frame_renders_event_and_data_lines() {
        let frame = SseFrame::Connected {
            user_id: 7,
            timestamp: Utc::now(),
        };
        let text = frame.render();
        assert!(text.starts_with("event: connected\ndata: "));
        assert!(text.ends_with("\n\n"));
        assert!(text.contains("\"user_id\":7"));
    }

    #[test]
    fn insight_frame_carries_the_json_payload() {
        let frame = SseFrame::Insight(Box::new(insight(1, 42)));
        let text = frame.render();
        assert!(text.starts_with("event: insight\ndata: "));
        assert!(text.contains("\"type\":\"mmr\""));
        assert!(text.contains("\"id\":42"));
    }

    #[test]
    fn heartbeat_renders_as_comment() {
        assert_eq!(SseFrame::Heartbeat.render(), ": keep-alive\n\n");
    }

    #[tokio::test]
    async fn stream_opens_forwards_and_cancels() {
        let broker = Arc::new(NotificationBroker::new(20));
        let (sink_tx, mut sink_rx) = mpsc::channel(32);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let run_broker = Arc::clone(&broker);
        let handle = tokio::spawn(async move {
            SseStreamHandler::new(run_broker, Duration::from_secs(60))
                .run(1, sink_tx, cancel_rx)
                .await
        });

        // First frame is the connected event.
        let first = sink_rx.recv().await.unwrap();
        assert!(matches!(first, SseFrame::Connected { user_id: 1, .. }));

        // Published insights flow through.
        tokio::time::sleep(Duration::from_millis(10)).await;
        broker.publish(&insight(1, 5));
        let second = sink_rx.recv().await.unwrap();
        assert!(matches!(second, SseFrame::Insight(i) if i.id == 5));

        // Cancellation closes and unsubscribes.
        cancel_tx.send(true).unwrap();
        let summary = handle.await.unwrap();
        assert_eq!(summary.close_reason, CloseReason::Cancelled);
        assert_eq!(summary.insights_sent, 1);
        assert_eq!(broker.stats().subscribers, 0);
    }

    #[tokio::test]
    async fn dropped_sink_closes_the_stream() {
        let broker = Arc::new(NotificationBroker::new(20));
        let handler = SseStreamHandler::new(Arc::clone(&broker), Duration::from_secs(60));
        let (sink_tx, sink_rx) = mpsc::channel(32);
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        drop(sink_rx);

        let summary = handler.run(1, sink_tx, cancel_rx).await;
        assert_eq!(summary.close_reason, CloseReason::SinkClosed);
        assert_eq!(broker.stats().subscribers, 0);
    }

    #[tokio::test]
    async fn heartbeats_tick_on_interval() {
        let broker = Arc::new(NotificationBroker::new(20));
        let handler = SseStreamHandler::new(Arc::clone(&broker), Duration::from_millis(20));
        let (sink_tx, mut sink_rx) = mpsc::channel(32);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let handle = tokio::spawn(async move { handler.run(1, sink_tx, cancel_rx).await });

        let _connected = sink_rx.recv().await.unwrap();
        let mut heartbeats = 0;
        while heartbeats < 2 {
            if let Some(SseFrame::Heartbeat) = sink_rx.recv().await {
                heartbeats += 1;
            }
        }

        cancel_tx.send(true).unwrap();
        let summary = handle.await.unwrap();
        assert!(summary.heartbeats_sent >= 2);
    }
}
