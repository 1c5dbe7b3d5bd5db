use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use livequote_core::SessionId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::channel::{ChannelMessage, CloseGuard, Subscription};
use crate::events::QuoteEvent;

pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    Delivered,
    /// Nobody is subscribed; the event is dropped, not buffered.
    NoSubscriber,
    /// The subscriber disappeared mid-publish; its stale entry was removed.
    SubscriberGone,
}

/// Routing table from session id to its live push channel.
///
/// Implementations hold at most one subscriber per session and never own
/// ledger or conversation data. A clustered deployment can implement this
/// over a shared broker without touching callers.
pub trait SessionRegistry: Send + Sync {
    /// Registers a subscriber, replacing any previous one for the session.
    /// The connection acknowledgement is already queued when this returns.
    fn subscribe(&self, session_id: &SessionId) -> Subscription;
    fn publish(&self, session_id: &SessionId, event: QuoteEvent) -> PublishOutcome;
    /// Tears down the registration. Returns false if nothing was registered.
    fn close(&self, session_id: &SessionId) -> bool;
    fn is_connected(&self, session_id: &SessionId) -> bool;
    fn connected_sessions(&self) -> usize;
}

struct ChannelHandle {
    connection_id: u64,
    sender: mpsc::UnboundedSender<ChannelMessage>,
    heartbeat: JoinHandle<()>,
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.heartbeat.abort();
    }
}

type Channels = Mutex<HashMap<SessionId, ChannelHandle>>;

pub struct InMemorySessionRegistry {
    channels: Arc<Channels>,
    heartbeat_interval: Duration,
    next_connection_id: AtomicU64,
}

impl Default for InMemorySessionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_HEARTBEAT)
    }
}

impl InMemorySessionRegistry {
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            heartbeat_interval,
            next_connection_id: AtomicU64::new(1),
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }
}

fn lock_channels(channels: &Channels) -> MutexGuard<'_, HashMap<SessionId, ChannelHandle>> {
    match channels.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Removes the entry only if it still belongs to `connection_id`, so a
/// replaced subscriber cannot tear down its successor.
fn release_connection(channels: &Channels, session_id: &SessionId, connection_id: u64) -> bool {
    let removed = {
        let mut guard = lock_channels(channels);
        let current =
            guard.get(session_id).is_some_and(|handle| handle.connection_id == connection_id);
        if current {
            guard.remove(session_id)
        } else {
            None
        }
    };
    removed.is_some()
}

fn spawn_heartbeat(
    channels: Weak<Channels>,
    session_id: SessionId,
    connection_id: u64,
    sender: mpsc::UnboundedSender<ChannelMessage>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if sender.send(ChannelMessage::Heartbeat).is_err() {
                if let Some(channels) = channels.upgrade() {
                    if release_connection(&channels, &session_id, connection_id) {
                        warn!(
                            event_name = "stream.heartbeat.subscriber_gone",
                            session_id = %session_id,
                            connection_id,
                            "heartbeat found a half-open channel; entry removed"
                        );
                    }
                }
                break;
            }
            debug!(
                event_name = "stream.heartbeat.sent",
                session_id = %session_id,
                connection_id,
                "heartbeat"
            );
        }
    })
}

impl SessionRegistry for InMemorySessionRegistry {
    fn subscribe(&self, session_id: &SessionId) -> Subscription {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();

        // The receiver is alive in this scope, so the ack cannot fail.
        let _ = sender.send(ChannelMessage::Event(QuoteEvent::connection(session_id)));

        let heartbeat = spawn_heartbeat(
            Arc::downgrade(&self.channels),
            session_id.clone(),
            connection_id,
            sender.clone(),
            self.heartbeat_interval,
        );
        let replaced = lock_channels(&self.channels)
            .insert(session_id.clone(), ChannelHandle { connection_id, sender, heartbeat });

        info!(
            event_name = "stream.channel.subscribed",
            session_id = %session_id,
            connection_id,
            replaced_existing = replaced.is_some(),
            "subscriber registered"
        );
        drop(replaced);

        let channels = Arc::downgrade(&self.channels);
        let guard_session = session_id.clone();
        let guard = CloseGuard::new(move || {
            if let Some(channels) = channels.upgrade() {
                if release_connection(&channels, &guard_session, connection_id) {
                    info!(
                        event_name = "stream.channel.disconnected",
                        session_id = %guard_session,
                        connection_id,
                        "subscriber went away"
                    );
                }
            }
        });

        Subscription::new(session_id.clone(), receiver, guard)
    }

    fn publish(&self, session_id: &SessionId, event: QuoteEvent) -> PublishOutcome {
        let event_type = event.event_type;
        let mut channels = lock_channels(&self.channels);
        let Some(handle) = channels.get(session_id) else {
            debug!(
                event_name = "stream.publish.no_subscriber",
                session_id = %session_id,
                event_type = %event_type,
                "no subscriber; event dropped"
            );
            return PublishOutcome::NoSubscriber;
        };

        if handle.sender.send(ChannelMessage::Event(event)).is_err() {
            let stale = channels.remove(session_id);
            drop(channels);
            drop(stale);
            warn!(
                event_name = "stream.publish.subscriber_gone",
                session_id = %session_id,
                event_type = %event_type,
                "subscriber disappeared mid-publish; stale entry removed"
            );
            return PublishOutcome::SubscriberGone;
        }

        debug!(
            event_name = "stream.publish.delivered",
            session_id = %session_id,
            event_type = %event_type,
            "event enqueued"
        );
        PublishOutcome::Delivered
    }

    fn close(&self, session_id: &SessionId) -> bool {
        let removed = lock_channels(&self.channels).remove(session_id);
        let closed = removed.is_some();
        drop(removed);
        if closed {
            info!(event_name = "stream.channel.closed", session_id = %session_id, "channel closed");
        }
        closed
    }

    fn is_connected(&self, session_id: &SessionId) -> bool {
        lock_channels(&self.channels).contains_key(session_id)
    }

    fn connected_sessions(&self) -> usize {
        lock_channels(&self.channels).len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use livequote_core::SessionId;
    use serde_json::json;
    use tokio::time::Instant;

    use super::{InMemorySessionRegistry, PublishOutcome, SessionRegistry};
    use crate::channel::ChannelMessage;
    use crate::events::{EventType, QuoteEvent};

    fn session(id: &str) -> SessionId {
        SessionId::new(id)
    }

    fn expect_event(message: Option<ChannelMessage>) -> QuoteEvent {
        match message {
            Some(ChannelMessage::Event(event)) => event,
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn subscribe_yields_connection_ack_first() {
        let registry = InMemorySessionRegistry::default();
        let mut subscription = registry.subscribe(&session("s-1"));

        let ack = expect_event(subscription.recv().await);
        assert_eq!(ack.event_type, EventType::Connection);
        assert_eq!(ack.data["sessionId"], "s-1");
        assert!(registry.is_connected(&session("s-1")));
    }

    #[tokio::test]
    async fn publish_delivers_to_the_single_subscriber() {
        let registry = InMemorySessionRegistry::default();
        let mut subscription = registry.subscribe(&session("s-1"));
        let _ack = subscription.recv().await;

        let outcome = registry.publish(
            &session("s-1"),
            QuoteEvent::new(EventType::QuoteUpdate, json!({"revision": 1})),
        );
        assert_eq!(outcome, PublishOutcome::Delivered);

        let event = expect_event(subscription.recv().await);
        assert_eq!(event.data["revision"], 1);
        assert_eq!(
            registry.publish(&session("other"), QuoteEvent::error("nobody listening")),
            PublishOutcome::NoSubscriber
        );
    }

    #[tokio::test]
    async fn close_is_idempotent_and_ends_the_stream() {
        let registry = InMemorySessionRegistry::default();
        let mut subscription = registry.subscribe(&session("s-1"));
        let _ack = subscription.recv().await;

        assert!(registry.close(&session("s-1")));
        assert!(!registry.close(&session("s-1")));
        assert!(!registry.is_connected(&session("s-1")));
        assert_eq!(subscription.recv().await, None);
    }

    #[tokio::test]
    async fn resubscribe_replaces_previous_subscriber() {
        let registry = InMemorySessionRegistry::default();
        let mut first = registry.subscribe(&session("s-1"));
        let _ack = first.recv().await;
        let mut second = registry.subscribe(&session("s-1"));
        let _ack = second.recv().await;

        assert_eq!(first.recv().await, None);
        drop(first);
        assert!(registry.is_connected(&session("s-1")), "stale drop must not evict successor");

        registry.publish(&session("s-1"), QuoteEvent::error("to second"));
        let event = expect_event(second.recv().await);
        assert_eq!(event.data["message"], "to second");
        assert_eq!(registry.connected_sessions(), 1);
    }

    #[tokio::test]
    async fn dropping_subscription_removes_registry_entry() {
        let registry = InMemorySessionRegistry::default();
        let subscription = registry.subscribe(&session("s-1"));
        drop(subscription);

        assert!(!registry.is_connected(&session("s-1")));
    }

    #[tokio::test]
    async fn publish_to_vanished_receiver_removes_stale_entry() {
        let registry = InMemorySessionRegistry::default();
        let mut subscription = registry.subscribe(&session("s-1"));
        if let Some(guard) = subscription.guard.take() {
            std::mem::forget(guard);
        }
        drop(subscription);

        assert!(registry.is_connected(&session("s-1")));
        assert_eq!(
            registry.publish(&session("s-1"), QuoteEvent::error("lost")),
            PublishOutcome::SubscriberGone
        );
        assert!(!registry.is_connected(&session("s-1")));
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_fires_on_the_configured_interval() {
        let registry = InMemorySessionRegistry::new(Duration::from_secs(30));
        let mut subscription = registry.subscribe(&session("s-1"));
        let _ack = subscription.recv().await;

        let started = Instant::now();
        assert_eq!(subscription.recv().await, Some(ChannelMessage::Heartbeat));
        assert!(started.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn close_stops_heartbeat_scheduling() {
        let registry = InMemorySessionRegistry::new(Duration::from_secs(30));
        let mut subscription = registry.subscribe(&session("s-1"));
        let _ack = subscription.recv().await;

        registry.close(&session("s-1"));
        tokio::time::advance(Duration::from_secs(90)).await;

        assert_eq!(subscription.recv().await, None);
    }
}
