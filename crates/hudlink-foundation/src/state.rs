use crate::error::SessionError;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use std::sync::Arc;

/// Lifecycle of one logical session attempt lineage.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// No devices held, no session open.
    Idle,
    /// Acquiring devices (unless already held) and opening the duplex session.
    Initializing,
    /// All pipelines running, inbound payloads being routed.
    Active,
    /// Transport lost; waiting out the fixed delay before re-initializing.
    Reconnecting,
    /// Terminal until the user explicitly restarts.
    Error { reason: String },
}

impl SessionState {
    /// Short status label for UI display.
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "offline",
            SessionState::Initializing => "initializing",
            SessionState::Active => "live",
            SessionState::Reconnecting => "reconnecting",
            SessionState::Error { .. } => "error",
        }
    }
}

/// Owns the session state and validates every transition.
///
/// Observers subscribe to a channel of state changes; only the session
/// controller calls `transition`.
pub struct StateManager {
    state: Arc<RwLock<SessionState>>,
    state_tx: Sender<SessionState>,
    state_rx: Receiver<SessionState>,
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StateManager {
    pub fn new() -> Self {
        let (state_tx, state_rx) = crossbeam_channel::unbounded();
        Self {
            state: Arc::new(RwLock::new(SessionState::Idle)),
            state_tx,
            state_rx,
        }
    }

    pub fn transition(&self, new_state: SessionState) -> Result<(), SessionError> {
        let mut current = self.state.write();

        let valid = matches!(
            (&*current, &new_state),
            (SessionState::Idle, SessionState::Initializing)
                | (SessionState::Initializing, SessionState::Active)
                | (SessionState::Initializing, SessionState::Error { .. })
                | (SessionState::Initializing, SessionState::Idle)
                | (SessionState::Active, SessionState::Reconnecting)
                | (SessionState::Active, SessionState::Idle)
                | (SessionState::Active, SessionState::Error { .. })
                | (SessionState::Reconnecting, SessionState::Initializing)
                | (SessionState::Reconnecting, SessionState::Idle)
                | (SessionState::Reconnecting, SessionState::Error { .. })
                | (SessionState::Error { .. }, SessionState::Initializing)
                | (SessionState::Error { .. }, SessionState::Idle)
        );

        if !valid {
            return Err(SessionError::TransportError(format!(
                "invalid state transition: {:?} -> {:?}",
                *current, new_state
            )));
        }

        tracing::info!("Session state: {:?} -> {:?}", *current, new_state);
        *current = new_state.clone();
        let _ = self.state_tx.send(new_state);
        Ok(())
    }

    pub fn current(&self) -> SessionState {
        self.state.read().clone()
    }

    pub fn subscribe(&self) -> Receiver<SessionState> {
        self.state_rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_lifecycle_is_valid() {
        let mgr = StateManager::new();
        mgr.transition(SessionState::Initializing).unwrap();
        mgr.transition(SessionState::Active).unwrap();
        mgr.transition(SessionState::Reconnecting).unwrap();
        mgr.transition(SessionState::Initializing).unwrap();
        mgr.transition(SessionState::Active).unwrap();
        mgr.transition(SessionState::Idle).unwrap();
        assert_eq!(mgr.current(), SessionState::Idle);
    }

    #[test]
    fn idle_cannot_jump_to_active() {
        let mgr = StateManager::new();
        assert!(mgr.transition(SessionState::Active).is_err());
        assert_eq!(mgr.current(), SessionState::Idle);
    }

    #[test]
    fn error_requires_explicit_restart() {
        let mgr = StateManager::new();
        mgr.transition(SessionState::Initializing).unwrap();
        mgr.transition(SessionState::Error {
            reason: "permission denied".into(),
        })
        .unwrap();
        // A restart goes back through Initializing, never straight to Active.
        assert!(mgr.transition(SessionState::Active).is_err());
        mgr.transition(SessionState::Initializing).unwrap();
    }

    #[test]
    fn reconnecting_reenters_initializing() {
        let mgr = StateManager::new();
        mgr.transition(SessionState::Initializing).unwrap();
        mgr.transition(SessionState::Active).unwrap();
        mgr.transition(SessionState::Reconnecting).unwrap();
        mgr.transition(SessionState::Initializing).unwrap();
        assert_eq!(mgr.current(), SessionState::Initializing);
    }

    #[test]
    fn subscribers_see_transitions_in_order() {
        let mgr = StateManager::new();
        let rx = mgr.subscribe();
        mgr.transition(SessionState::Initializing).unwrap();
        mgr.transition(SessionState::Active).unwrap();
        assert_eq!(rx.recv().unwrap(), SessionState::Initializing);
        assert_eq!(rx.recv().unwrap(), SessionState::Active);
    }
}
