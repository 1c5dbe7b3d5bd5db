use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use livequote_core::SessionId;
use tokio::sync::mpsc;

use crate::events::QuoteEvent;

#[derive(Clone, Debug, PartialEq)]
pub enum ChannelMessage {
    Event(QuoteEvent),
    /// Keep-alive with no application data.
    Heartbeat,
}

/// Runs once when a subscription goes away without an explicit close.
pub(crate) struct CloseGuard(Option<Box<dyn FnOnce() + Send + Sync>>);

impl CloseGuard {
    pub(crate) fn new(on_close: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self(Some(Box::new(on_close)))
    }
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        if let Some(on_close) = self.0.take() {
            on_close();
        }
    }
}

/// The receiving end of one session's channel. Yields the connection
/// acknowledgement first, then published events and heartbeats. Ends when
/// the registry closes or replaces the channel.
pub struct Subscription {
    session_id: SessionId,
    receiver: mpsc::UnboundedReceiver<ChannelMessage>,
    pub(crate) guard: Option<CloseGuard>,
}

impl Subscription {
    pub(crate) fn new(
        session_id: SessionId,
        receiver: mpsc::UnboundedReceiver<ChannelMessage>,
        guard: CloseGuard,
    ) -> Self {
        Self { session_id, receiver, guard: Some(guard) }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub async fn recv(&mut self) -> Option<ChannelMessage> {
        self.receiver.recv().await
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("session_id", &self.session_id).finish_non_exhaustive()
    }
}

impl Stream for Subscription {
    type Item = ChannelMessage;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use futures::StreamExt;
    use livequote_core::SessionId;
    use tokio::sync::mpsc;

    use super::{ChannelMessage, CloseGuard, Subscription};
    use crate::events::QuoteEvent;

    #[tokio::test]
    async fn subscription_streams_queued_messages_in_order() {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut subscription =
            Subscription::new(SessionId::new("s-1"), receiver, CloseGuard::new(|| {}));

        sender.send(ChannelMessage::Event(QuoteEvent::error("first"))).expect("send");
        sender.send(ChannelMessage::Heartbeat).expect("send");
        drop(sender);

        let collected = (&mut subscription).collect::<Vec<_>>().await;
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[1], ChannelMessage::Heartbeat);
        assert_eq!(subscription.session_id().as_str(), "s-1");
    }

    #[test]
    fn dropping_subscription_runs_close_guard_once() {
        let closed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&closed);
        let (_sender, receiver) = mpsc::unbounded_channel();

        let subscription = Subscription::new(
            SessionId::new("s-2"),
            receiver,
            CloseGuard::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        drop(subscription);

        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }
}
