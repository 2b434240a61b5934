use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::protocol::{ClientMessage, ServerMessage, SessionSetup};
use hudlink_foundation::SessionError;

/// Everything the transport can tell the session controller, folded into
/// one event stream so the controller is a plain state machine over a
/// channel rather than a bundle of callbacks.
#[derive(Debug)]
pub enum SessionEvent {
    /// The duplex session is established.
    Opened,
    /// An inbound payload, in transport order.
    Message(ServerMessage),
    /// The transport closed; reconnect-eligible.
    Closed { reason: String },
    /// Protocol-level failure; terminal.
    TransportFailed { reason: String },
}

/// One open duplex session: an outbound sender and an inbound event stream.
pub struct LiveSession {
    outbound: mpsc::Sender<ClientMessage>,
    events: Option<mpsc::Receiver<SessionEvent>>,
    tasks: Vec<JoinHandle<()>>,
}

impl LiveSession {
    pub fn new(
        outbound: mpsc::Sender<ClientMessage>,
        events: mpsc::Receiver<SessionEvent>,
        tasks: Vec<JoinHandle<()>>,
    ) -> Self {
        Self {
            outbound,
            events: Some(events),
            tasks,
        }
    }

    pub fn outbound(&self) -> mpsc::Sender<ClientMessage> {
        self.outbound.clone()
    }

    /// The event stream can be taken exactly once, by the controller loop.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<SessionEvent>> {
        self.events.take()
    }

    /// Tear the transport down. Dropping the outbound sender ends the
    /// writer; reader/writer tasks are aborted in case they are blocked.
    pub fn close(self) {
        for task in &self.tasks {
            task.abort();
        }
        tracing::debug!("Live session closed");
    }
}

/// Seam between the controller and the actual network transport.
#[async_trait]
pub trait DuplexEndpoint: Send + Sync {
    /// Open a duplex session with the given configuration. An `Opened`
    /// event is delivered on the session's event stream once established.
    async fn open(&self, setup: SessionSetup) -> Result<LiveSession, SessionError>;
}
