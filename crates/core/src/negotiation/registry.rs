use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex, MutexGuard};
use tracing::info;

use crate::domain::constraints::Constraints;
use crate::domain::party::{Party, Role};
use crate::domain::session::{SessionId, TerminationReason};
use crate::domain::turn::Turn;
use crate::errors::{DomainError, RegistryError};
use crate::negotiation::driver::{self, PolicyPair, TurnSettings};
use crate::negotiation::session::{NegotiationSession, SessionSnapshot};
use crate::transport::TransportAdapter;

struct SessionEntry {
    session: Mutex<NegotiationSession>,
    policies: PolicyPair,
    snapshot: watch::Sender<SessionSnapshot>,
}

/// Owns every live negotiation. Turns on one session are serialized by that session's lock;
/// sessions never wait on each other.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<SessionEntry>>>,
    settings: TurnSettings,
    transport: Arc<dyn TransportAdapter>,
}

impl SessionRegistry {
    pub fn new(settings: TurnSettings, transport: Arc<dyn TransportAdapter>) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), settings, transport }
    }

    pub fn settings(&self) -> &TurnSettings {
        &self.settings
    }

    /// Opens a session for exactly one buyer and one provider.
    pub fn create(
        &self,
        parties: Vec<Party>,
        constraints: Constraints,
        policies: PolicyPair,
    ) -> Result<SessionId, RegistryError> {
        let [first, second]: [Party; 2] = parties.try_into().map_err(|parties: Vec<Party>| {
            DomainError::InvalidParties(format!("expected 2 parties, got {}", parties.len()))
        })?;
        if first.role == second.role {
            return Err(RegistryError::DuplicatePartyRole(first.role));
        }
        let (buyer, provider) = match first.role {
            Role::Buyer => (first, second),
            Role::Provider => (second, first),
        };

        let session_id = SessionId::generate();
        let session = NegotiationSession::start(session_id.clone(), buyer, provider, constraints)?;
        let (snapshot, _) = watch::channel(session.snapshot());
        let entry = Arc::new(SessionEntry { session: Mutex::new(session), policies, snapshot });

        let mut sessions = self.write_sessions();
        sessions.insert(session_id.clone(), entry);
        info!(
            event_name = "negotiation.registry.created",
            session_id = %session_id,
            live_sessions = sessions.len(),
            "negotiation session registered"
        );
        Ok(session_id)
    }

    /// Latest committed state. Does not wait for an in-flight turn.
    pub fn get(&self, session_id: &SessionId) -> Result<SessionSnapshot, RegistryError> {
        let entry = self.entry(session_id)?;
        let snapshot = entry.snapshot.borrow().clone();
        Ok(snapshot)
    }

    /// Plays one turn, waiting for any turn already in flight on this session.
    pub async fn advance_turn(&self, session_id: &SessionId) -> Result<Turn, RegistryError> {
        let entry = self.entry(session_id)?;
        let session = entry.session.lock().await;
        self.play_turn(&entry, session).await
    }

    /// Plays one turn, or fails with `SessionBusy` instead of waiting.
    pub async fn try_advance_turn(&self, session_id: &SessionId) -> Result<Turn, RegistryError> {
        let entry = self.entry(session_id)?;
        let session =
            entry.session.try_lock().map_err(|_| RegistryError::SessionBusy(session_id.clone()))?;
        self.play_turn(&entry, session).await
    }

    /// Drives the session until it reaches a terminal state.
    ///
    /// The lock is released between turns so `get` and `close` stay responsive.
    pub async fn run_to_completion(&self, session_id: &SessionId) -> Result<SessionSnapshot, RegistryError> {
        let entry = self.entry(session_id)?;
        loop {
            let mut session = entry.session.lock().await;
            if session.status().is_terminal() {
                return Ok(session.snapshot());
            }
            driver::advance(&mut session, &entry.policies, &self.settings, self.transport.as_ref()).await?;
            entry.snapshot.send_replace(session.snapshot());
        }
    }

    /// Ends the session after any in-flight turn and removes it from the registry.
    pub async fn close(&self, session_id: &SessionId) -> Result<SessionSnapshot, RegistryError> {
        let entry = self.entry(session_id)?;
        let snapshot = {
            let mut session = entry.session.lock().await;
            session.close(TerminationReason::Closed);
            session.snapshot()
        };
        entry.snapshot.send_replace(snapshot.clone());
        self.remove_entry(session_id, &entry);

        info!(
            event_name = "negotiation.registry.closed",
            session_id = %session_id,
            status = ?snapshot.status,
            "negotiation session closed"
        );
        Ok(snapshot)
    }

    /// Closes and removes sessions untouched for at least `ttl`. Busy sessions are skipped.
    pub fn sweep_idle(&self, ttl: Duration) -> Vec<SessionId> {
        self.sweep_idle_at(ttl, Utc::now())
    }

    pub fn sweep_idle_at(&self, ttl: Duration, now: DateTime<Utc>) -> Vec<SessionId> {
        let candidates: Vec<(SessionId, Arc<SessionEntry>)> = self
            .read_sessions()
            .iter()
            .map(|(session_id, entry)| (session_id.clone(), Arc::clone(entry)))
            .collect();

        let mut swept = Vec::new();
        for (session_id, entry) in candidates {
            let Ok(mut session) = entry.session.try_lock() else {
                continue;
            };
            let idle_for = (now - session.updated_at()).to_std().unwrap_or(Duration::ZERO);
            if idle_for < ttl {
                continue;
            }
            session.close(TerminationReason::IdleTimeout);
            entry.snapshot.send_replace(session.snapshot());
            drop(session);
            self.remove_entry(&session_id, &entry);
            swept.push(session_id);
        }

        if !swept.is_empty() {
            info!(
                event_name = "negotiation.registry.swept",
                swept = swept.len(),
                ttl_secs = ttl.as_secs(),
                "idle negotiation sessions expired"
            );
        }
        swept
    }

    pub fn len(&self) -> usize {
        self.read_sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn play_turn(
        &self,
        entry: &SessionEntry,
        mut session: MutexGuard<'_, NegotiationSession>,
    ) -> Result<Turn, RegistryError> {
        if session.status().is_terminal() {
            return Err(RegistryError::SessionAlreadyTerminal {
                session_id: session.id().clone(),
                status: session.status(),
            });
        }
        let turn = driver::advance(&mut session, &entry.policies, &self.settings, self.transport.as_ref()).await?;
        entry.snapshot.send_replace(session.snapshot());
        Ok(turn)
    }

    fn entry(&self, session_id: &SessionId) -> Result<Arc<SessionEntry>, RegistryError> {
        self.read_sessions()
            .get(session_id)
            .cloned()
            .ok_or_else(|| RegistryError::SessionNotFound(session_id.clone()))
    }

    fn remove_entry(&self, session_id: &SessionId, entry: &Arc<SessionEntry>) {
        let mut sessions = self.write_sessions();
        if sessions.get(session_id).is_some_and(|current| Arc::ptr_eq(current, entry)) {
            sessions.remove(session_id);
        }
    }

    fn read_sessions(&self) -> std::sync::RwLockReadGuard<'_, HashMap<SessionId, Arc<SessionEntry>>> {
        match self.sessions.read() {
            Ok(sessions) => sessions,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_sessions(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<SessionId, Arc<SessionEntry>>> {
        match self.sessions.write() {
            Ok(sessions) => sessions,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
