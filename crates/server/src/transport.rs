use parley_core::domain::session::SessionId;
use parley_core::domain::turn::Turn;
use parley_core::transport::{BroadcastEvent, TransportAdapter};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Fans committed turns out to any number of in-process subscribers.
///
/// Sending never blocks; a turn with no live subscriber is dropped, and slow subscribers
/// observe a lag instead of stalling the session.
#[derive(Clone)]
pub struct ChannelTransport {
    sender: broadcast::Sender<BroadcastEvent>,
}

impl ChannelTransport {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.sender.subscribe()
    }
}

impl Default for ChannelTransport {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl TransportAdapter for ChannelTransport {
    fn broadcast(&self, session_id: &SessionId, turn: &Turn) {
        let event = BroadcastEvent { session_id: session_id.clone(), turn: turn.clone() };
        if self.sender.send(event).is_err() {
            debug!(
                event_name = "negotiation.turn.undelivered",
                session_id = %session_id,
                round_index = turn.round_index,
                "no subscribers for committed turn"
            );
        }
    }
}

/// Logs every delivered turn until the channel closes.
pub fn spawn_log_relay(mut receiver: broadcast::Receiver<BroadcastEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => info!(
                    event_name = "negotiation.turn.delivered",
                    session_id = %event.session_id,
                    round_index = event.turn.round_index,
                    actor_role = %event.turn.actor_role,
                    intent = ?event.turn.intent,
                    "turn delivered"
                ),
                Err(broadcast::error::RecvError::Lagged(skipped)) => warn!(
                    event_name = "negotiation.turn.relay_lagged",
                    skipped,
                    "turn relay fell behind"
                ),
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use parley_core::domain::party::Role;
    use parley_core::domain::session::SessionId;
    use parley_core::domain::turn::{Intent, Turn};
    use parley_core::transport::TransportAdapter;

    use super::ChannelTransport;

    fn reject_turn() -> Turn {
        Turn {
            round_index: 1,
            actor_role: Role::Buyer,
            intent: Intent::Reject,
            offer: None,
            rationale: "walk away".into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn every_subscriber_sees_each_turn() {
        let transport = ChannelTransport::new(4);
        let mut first = transport.subscribe();
        let mut second = transport.subscribe();

        transport.broadcast(&SessionId("neg-chan".into()), &reject_turn());

        let seen = first.recv().await.expect("first");
        assert_eq!(seen.session_id, SessionId("neg-chan".into()));
        assert_eq!(second.recv().await.expect("second").turn.intent, Intent::Reject);
    }

    #[test]
    fn broadcasting_without_subscribers_is_silent() {
        let transport = ChannelTransport::default();
        transport.broadcast(&SessionId("neg-none".into()), &reject_turn());
    }
}
