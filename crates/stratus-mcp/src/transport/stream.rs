//! Server-push event loop shared by the unified and legacy stream endpoints.
//!
//! A stream waits on three things at once: the session's close signal, its
//! subscriber queue, and an idle timer. A queued message becomes one `data:`
//! event; thirty idle seconds produce a keepalive comment. Only the close
//! signal, or the client going away (the stream being dropped), ends it.

use std::sync::Arc;
use std::time::Duration;

use axum::response::sse::Event;
use futures::Stream;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::session::{SessionRegistry, SubscriberQueue};

/// Idle time after which a keepalive comment is sent.
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(30);

/// One outbound event-stream frame.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// `event: <name>\ndata: <data>\n\n`
    Named { event: &'static str, data: String },
    /// `data: <json>\n\n`
    Message(String),
    /// `: keepalive\n\n`
    Keepalive,
}

impl StreamEvent {
    pub fn connected() -> Self {
        StreamEvent::Named {
            event: "connected",
            data: r#"{"status":"connected"}"#.to_string(),
        }
    }

    pub fn endpoint(path: &str) -> Self {
        StreamEvent::Named {
            event: "endpoint",
            data: path.to_string(),
        }
    }

    pub fn into_sse(self) -> Event {
        match self {
            StreamEvent::Named { event, data } => Event::default().event(event).data(data),
            StreamEvent::Message(json) => Event::default().data(json),
            StreamEvent::Keepalive => Event::default().comment("keepalive"),
        }
    }
}

/// What a stream gives back when it ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Detach the queue; the session lives on.
    Subscriber,
    /// Tear down the whole session; it belonged to this connection alone.
    Session,
}

/// A queue attached to a session for the lifetime of one stream.
/// Dropping it performs the [`Release`].
struct Subscription {
    sessions: Arc<SessionRegistry>,
    session_id: String,
    queue: SubscriberQueue,
    release: Release,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        match self.release {
            Release::Subscriber => {
                self.sessions.detach_subscriber(&self.session_id, &self.queue);
                tracing::debug!(session_id = %self.session_id, "Stream closed");
            }
            Release::Session => {
                self.sessions.terminate(&self.session_id);
                tracing::debug!(session_id = %self.session_id, "Legacy stream closed");
            }
        }
    }
}

enum Wake {
    Disconnect,
    Message(Value),
    Idle,
}

/// Attach a stream to an existing session. `None` if the session is gone.
pub fn open_unified(
    sessions: &Arc<SessionRegistry>,
    session_id: &str,
    keepalive: Duration,
) -> Option<impl Stream<Item = StreamEvent> + Send + 'static> {
    let (subscription, receiver, closed) = subscribe(sessions, session_id, Release::Subscriber)?;
    Some(event_loop(
        subscription,
        receiver,
        closed,
        StreamEvent::connected(),
        keepalive,
    ))
}

/// Create a private session for a legacy client and stream on it.
///
/// Returns the new session id alongside the stream.
pub fn open_legacy(
    sessions: &Arc<SessionRegistry>,
    endpoint_path: &str,
    keepalive: Duration,
) -> Option<(String, impl Stream<Item = StreamEvent> + Send + 'static)> {
    let session = sessions.create();
    let (subscription, receiver, closed) = subscribe(sessions, &session.id, Release::Session)?;
    Some((
        session.id,
        event_loop(
            subscription,
            receiver,
            closed,
            StreamEvent::endpoint(endpoint_path),
            keepalive,
        ),
    ))
}

fn subscribe(
    sessions: &Arc<SessionRegistry>,
    session_id: &str,
    release: Release,
) -> Option<(Subscription, mpsc::Receiver<Value>, CancellationToken)> {
    let closed = sessions.get(session_id)?.closed();
    let (queue, receiver) = sessions.subscriber_queue();
    if !sessions.attach_subscriber(session_id, queue.clone()) {
        return None;
    }
    let subscription = Subscription {
        sessions: Arc::clone(sessions),
        session_id: session_id.to_string(),
        queue,
        release,
    };
    Some((subscription, receiver, closed))
}

fn event_loop(
    subscription: Subscription,
    mut receiver: mpsc::Receiver<Value>,
    closed: CancellationToken,
    preamble: StreamEvent,
    keepalive: Duration,
) -> impl Stream<Item = StreamEvent> + Send + 'static {
    async_stream::stream! {
        // Held until the generator is dropped or finishes.
        let _subscription = subscription;
        yield preamble;

        loop {
            let wake = tokio::select! {
                _ = closed.cancelled() => Wake::Disconnect,
                message = receiver.recv() => message.map_or(Wake::Disconnect, Wake::Message),
                _ = tokio::time::sleep(keepalive) => Wake::Idle,
            };

            match wake {
                Wake::Disconnect => break,
                Wake::Message(message) => match serde_json::to_string(&message) {
                    Ok(json) => yield StreamEvent::Message(json),
                    Err(e) => tracing::warn!("Dropping unencodable stream message: {e}"),
                },
                Wake::Idle => yield StreamEvent::Keepalive,
            }
        }
    }
}
