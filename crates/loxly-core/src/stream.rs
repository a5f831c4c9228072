// ── Event delivery ──
//
// Consumers never run on the receive path. The client publishes events on a
// bounded broadcast channel; a consumer that falls behind loses the oldest
// events and is told how many it missed.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::dispatcher::StateEvent;

/// `Stream` of state events backed by a broadcast receiver.
///
/// Lag is logged and skipped; the stream ends when the client is dropped.
pub struct EventStream {
    inner: BroadcastStream<StateEvent>,
}

impl EventStream {
    pub(crate) fn new(receiver: broadcast::Receiver<StateEvent>) -> Self {
        Self {
            inner: BroadcastStream::new(receiver),
        }
    }
}

impl Stream for EventStream {
    type Item = StateEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => return Poll::Ready(Some(event)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    tracing::warn!(skipped, "Event stream lagged, oldest events dropped");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

type Handler = Box<dyn FnMut(&StateEvent) + Send>;

/// Callbacks for the two event kinds.
///
/// Run on their own task by [`Client::spawn_handlers`](crate::Client::spawn_handlers).
#[derive(Default)]
pub struct EventHandlers {
    on_initial: Option<Handler>,
    on_change: Option<Handler>,
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_initial(mut self, handler: impl FnMut(&StateEvent) + Send + 'static) -> Self {
        self.on_initial = Some(Box::new(handler));
        self
    }

    #[must_use]
    pub fn on_change(mut self, handler: impl FnMut(&StateEvent) + Send + 'static) -> Self {
        self.on_change = Some(Box::new(handler));
        self
    }

    fn dispatch(&mut self, event: &StateEvent) {
        let handler = match event {
            StateEvent::Initial { .. } => self.on_initial.as_mut(),
            StateEvent::Changed { .. } => self.on_change.as_mut(),
        };
        if let Some(handler) = handler {
            handler(event);
        }
    }
}

impl std::fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_initial", &self.on_initial.is_some())
            .field("on_change", &self.on_change.is_some())
            .finish()
    }
}

/// Drain `receiver` into `handlers` until the sender side goes away.
pub(crate) fn spawn_handler_task(
    mut receiver: broadcast::Receiver<StateEvent>,
    mut handlers: EventHandlers,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => handlers.dispatch(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event handlers lagged, oldest events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        tracing::debug!("Event handler task finished");
    })
}
