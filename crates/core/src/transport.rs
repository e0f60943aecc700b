use std::sync::{Arc, Mutex};

use tracing::info;

use crate::domain::session::SessionId;
use crate::domain::turn::Turn;

/// Push side of a negotiation: every committed turn is handed to the adapter exactly once.
///
/// Implementations must not block and must swallow their own delivery failures.
pub trait TransportAdapter: Send + Sync {
    fn broadcast(&self, session_id: &SessionId, turn: &Turn);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTransport;

impl TransportAdapter for NoopTransport {
    fn broadcast(&self, _session_id: &SessionId, _turn: &Turn) {}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BroadcastEvent {
    pub session_id: SessionId,
    pub turn: Turn,
}

#[derive(Clone, Default)]
pub struct InMemoryTransport {
    events: Arc<Mutex<Vec<BroadcastEvent>>>,
}

impl InMemoryTransport {
    pub fn events(&self) -> Vec<BroadcastEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn events_for(&self, session_id: &SessionId) -> Vec<Turn> {
        self.events()
            .into_iter()
            .filter(|event| &event.session_id == session_id)
            .map(|event| event.turn)
            .collect()
    }
}

impl TransportAdapter for InMemoryTransport {
    fn broadcast(&self, session_id: &SessionId, turn: &Turn) {
        let event = BroadcastEvent { session_id: session_id.clone(), turn: turn.clone() };
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Writes each turn to the log; used by the CLI simulator.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingTransport;

impl TransportAdapter for TracingTransport {
    fn broadcast(&self, session_id: &SessionId, turn: &Turn) {
        info!(
            event_name = "negotiation.turn.broadcast",
            session_id = %session_id,
            round_index = turn.round_index,
            actor_role = %turn.actor_role,
            intent = ?turn.intent,
            price = %turn.offer.as_ref().map(|offer| offer.price.to_string()).unwrap_or_default(),
            rationale = %turn.rationale,
            "turn committed"
        );
    }
}
