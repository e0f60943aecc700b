use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::constraints::Constraints;
use crate::domain::offer::Offer;
use crate::domain::party::{Party, PartyId, Role};
use crate::domain::session::{
    RejectedProposal, SessionId, SessionStatus, TerminationReason,
};
use crate::domain::turn::{Intent, Turn};
use crate::errors::DomainError;
use crate::negotiation::agreement::Agreement;
use crate::negotiation::policy::{Decision, NegotiationContext};
use crate::negotiation::stall::StallTracker;
use crate::negotiation::validation::{validate, ConstraintViolation};

/// Result of feeding one decision into the state machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Applied {
    Committed(Turn),
    /// The proposal failed validation and the caller may solicit one retry.
    Inadmissible(ConstraintViolation),
}

/// Read model handed to callers outside the registry lock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub active_role: Role,
    pub buyer_id: PartyId,
    pub provider_id: PartyId,
    pub rounds_played: u32,
    pub max_rounds: u32,
    pub transcript: Vec<Turn>,
    pub final_offer: Option<Offer>,
    pub stall_detected: bool,
    pub rejected_proposals: Vec<RejectedProposal>,
    pub termination: Option<TerminationReason>,
    pub agreement: Option<Agreement>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The negotiation aggregate: one buyer, one provider, an append-only transcript.
#[derive(Clone, Debug)]
pub struct NegotiationSession {
    id: SessionId,
    buyer: Party,
    provider: Party,
    constraints: Constraints,
    turns: Vec<Turn>,
    status: SessionStatus,
    active_role: Role,
    final_offer: Option<Offer>,
    stall: StallTracker,
    rejected_proposals: Vec<RejectedProposal>,
    termination: Option<TerminationReason>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl NegotiationSession {
    pub fn start(
        id: SessionId,
        buyer: Party,
        provider: Party,
        constraints: Constraints,
    ) -> Result<Self, DomainError> {
        if buyer.role != Role::Buyer || provider.role != Role::Provider {
            return Err(DomainError::InvalidParties(format!(
                "expected one BUYER and one PROVIDER, got {} and {}",
                buyer.role, provider.role
            )));
        }
        for party in [&buyer, &provider] {
            for slot in &party.availability {
                slot.check_ordered().map_err(|error| {
                    DomainError::InvalidParties(format!("{} availability: {error}", party.id.0))
                })?;
            }
        }
        constraints.validate()?;

        let now = Utc::now();
        info!(
            event_name = "negotiation.session.started",
            session_id = %id,
            buyer_id = %buyer.id.0,
            provider_id = %provider.id.0,
            max_rounds = constraints.max_rounds,
            "negotiation session opened"
        );

        Ok(Self {
            id,
            buyer,
            provider,
            constraints,
            turns: Vec::new(),
            status: SessionStatus::Open,
            active_role: Role::Buyer,
            final_offer: None,
            stall: StallTracker::default(),
            rejected_proposals: Vec::new(),
            termination: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn active_role(&self) -> Role {
        self.active_role
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn final_offer(&self) -> Option<&Offer> {
        self.final_offer.as_ref()
    }

    pub fn termination(&self) -> Option<TerminationReason> {
        self.termination
    }

    pub fn stall(&self) -> &StallTracker {
        &self.stall
    }

    pub fn rejected_proposals(&self) -> &[RejectedProposal] {
        &self.rejected_proposals
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn party(&self, role: Role) -> &Party {
        match role {
            Role::Buyer => &self.buyer,
            Role::Provider => &self.provider,
        }
    }

    pub fn next_round_index(&self) -> u32 {
        u32::try_from(self.turns.len()).unwrap_or(u32::MAX).saturating_add(1)
    }

    /// Most recent valid counter from `role`; this is what the other side may accept.
    pub fn latest_offer_from(&self, role: Role) -> Option<&Offer> {
        self.turns
            .iter()
            .rev()
            .filter(|turn| turn.actor_role == role && turn.intent == Intent::Counter)
            .find_map(|turn| turn.offer.as_ref())
    }

    pub fn context(&self, retry_violation: Option<ConstraintViolation>) -> NegotiationContext {
        let role = self.active_role;
        NegotiationContext {
            session_id: self.id.clone(),
            round_index: self.next_round_index(),
            party: self.party(role).clone(),
            counterpart_availability: self.party(role.counterpart()).availability.clone(),
            counterpart_offer: self.latest_offer_from(role.counterpart()).cloned(),
            transcript: self.turns.clone(),
            constraints: self.constraints.clone(),
            stall_detected: self.stall.any_stalled(),
            retry_violation,
        }
    }

    /// Applies the active party's decision.
    ///
    /// With `allow_retry`, an inadmissible COUNTER is handed back as [`Applied::Inadmissible`]
    /// without touching the transcript or the active role; otherwise it ends the session.
    pub fn apply(&mut self, decision: Decision, allow_retry: bool) -> Result<Applied, DomainError> {
        self.ensure_open()?;

        let decision = match decision.into_checked() {
            Ok(decision) => decision,
            Err(error) => {
                warn!(
                    event_name = "negotiation.policy.contract_violation",
                    session_id = %self.id,
                    round_index = self.next_round_index(),
                    actor_role = %self.active_role,
                    error = %error,
                    "decision broke the policy contract; treating as reject"
                );
                let turn = self.commit_terminal(
                    Intent::Reject,
                    None,
                    format!("POLICY_CONTRACT_VIOLATION: {error}"),
                    SessionStatus::Rejected,
                    TerminationReason::PolicyContractViolation,
                );
                return Ok(Applied::Committed(turn));
            }
        };

        let Decision { intent, offer, rationale } = decision;
        match (intent, offer) {
            (Intent::Reject, _) => Ok(Applied::Committed(self.commit_terminal(
                Intent::Reject,
                None,
                rationale,
                SessionStatus::Rejected,
                TerminationReason::RejectedByParty,
            ))),
            (Intent::Accept, Some(offer)) => Ok(self.apply_accept(offer, rationale, allow_retry)),
            (Intent::Counter, Some(offer)) => Ok(self.apply_counter(offer, rationale, allow_retry)),
            (intent, None) => Err(DomainError::InvariantViolation(format!(
                "checked {intent:?} decision has no offer"
            ))),
        }
    }

    /// Ends the session with a synthetic REJECT from the active party.
    pub fn reject_active(
        &mut self,
        reason: TerminationReason,
        rationale: impl Into<String>,
    ) -> Result<Turn, DomainError> {
        self.ensure_open()?;
        Ok(self.commit_terminal(Intent::Reject, None, rationale.into(), SessionStatus::Rejected, reason))
    }

    /// Moves an open session to `EXPIRED`. Returns false when it was already terminal.
    pub fn close(&mut self, reason: TerminationReason) -> bool {
        self.updated_at = Utc::now();
        if self.status.is_terminal() {
            return false;
        }
        self.finish(SessionStatus::Expired, reason);
        true
    }

    pub fn agreement(&self) -> Option<Agreement> {
        if self.status != SessionStatus::Accepted {
            return None;
        }
        let offer = self.final_offer.as_ref()?;
        let accepted_at = self.turns.last().map(|turn| turn.created_at).unwrap_or(self.updated_at);
        Some(Agreement::from_accepted(
            &self.id,
            &self.buyer,
            &self.provider,
            offer,
            &self.constraints,
            accepted_at,
        ))
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            status: self.status,
            active_role: self.active_role,
            buyer_id: self.buyer.id.clone(),
            provider_id: self.provider.id.clone(),
            rounds_played: u32::try_from(self.turns.len()).unwrap_or(u32::MAX),
            max_rounds: self.constraints.max_rounds,
            transcript: self.turns.clone(),
            final_offer: self.final_offer.clone(),
            stall_detected: self.stall.any_stalled(),
            rejected_proposals: self.rejected_proposals.clone(),
            termination: self.termination,
            agreement: self.agreement(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn ensure_open(&self) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::InvariantViolation(format!(
                "session {} is {:?}; no further turns are allowed",
                self.id, self.status
            )));
        }
        Ok(())
    }

    fn apply_accept(&mut self, offer: Offer, rationale: String, allow_retry: bool) -> Applied {
        let role = self.active_role;
        let counterpart = role.counterpart();
        let matches_on_file = self.latest_offer_from(counterpart).is_some_and(|on_file| *on_file == offer);

        if !matches_on_file {
            debug!(
                event_name = "negotiation.turn.accept_downgraded",
                session_id = %self.id,
                round_index = self.next_round_index(),
                actor_role = %role,
                "accepted terms differ from the counterpart offer; treating as counter"
            );
            return self.apply_counter(offer, rationale, allow_retry);
        }

        match validate(&offer, self.party(role), &self.constraints, self.party(counterpart)).map(|_| ()) {
            Ok(()) => {
                let turn = self.commit_terminal(
                    Intent::Accept,
                    Some(offer.clone()),
                    rationale,
                    SessionStatus::Accepted,
                    TerminationReason::Agreement,
                );
                self.final_offer = Some(offer);
                info!(
                    event_name = "negotiation.session.accepted",
                    session_id = %self.id,
                    round_index = turn.round_index,
                    actor_role = %role,
                    price = %turn.offer.as_ref().map(|agreed| agreed.price).unwrap_or_default(),
                    "negotiation reached agreement"
                );
                Applied::Committed(turn)
            }
            Err(violation) => {
                warn!(
                    event_name = "negotiation.turn.stale_offer",
                    session_id = %self.id,
                    round_index = self.next_round_index(),
                    actor_role = %role,
                    violation = %violation,
                    "accepted offer no longer passes validation"
                );
                Applied::Committed(self.commit_terminal(
                    Intent::Reject,
                    None,
                    format!("STALE_OFFER: {violation}"),
                    SessionStatus::Rejected,
                    TerminationReason::StaleOffer,
                ))
            }
        }
    }

    fn apply_counter(&mut self, offer: Offer, rationale: String, allow_retry: bool) -> Applied {
        let role = self.active_role;
        let counterpart = role.counterpart();

        match validate(&offer, self.party(role), &self.constraints, self.party(counterpart)).map(|_| ()) {
            Ok(()) => {
                let price = offer.price;
                let turn = self.append(role, Intent::Counter, Some(offer), rationale);
                let stalled = self.stall.record(
                    role,
                    price,
                    self.constraints.stall_epsilon(),
                    self.constraints.stall_window,
                );
                if stalled {
                    info!(
                        event_name = "negotiation.session.stall_detected",
                        session_id = %self.id,
                        round_index = turn.round_index,
                        actor_role = %role,
                        "party has stopped conceding"
                    );
                }
                self.active_role = counterpart;

                if turn.round_index >= self.constraints.max_rounds {
                    self.finish(SessionStatus::Expired, TerminationReason::RoundLimit);
                    info!(
                        event_name = "negotiation.session.expired",
                        session_id = %self.id,
                        round_index = turn.round_index,
                        "round limit reached without agreement"
                    );
                }
                Applied::Committed(turn)
            }
            Err(violation) => {
                warn!(
                    event_name = "negotiation.turn.offer_rejected",
                    session_id = %self.id,
                    round_index = self.next_round_index(),
                    actor_role = %role,
                    violation = %violation,
                    retry_allowed = allow_retry,
                    "inadmissible offer kept out of the transcript"
                );
                self.rejected_proposals.push(RejectedProposal {
                    round_index: self.next_round_index(),
                    actor_role: role,
                    offer,
                    violation: violation.to_string(),
                    recorded_at: Utc::now(),
                });

                if allow_retry {
                    return Applied::Inadmissible(violation);
                }
                Applied::Committed(self.commit_terminal(
                    Intent::Reject,
                    None,
                    format!("CONSTRAINT_VIOLATION: {violation}"),
                    SessionStatus::Rejected,
                    TerminationReason::ConstraintViolation,
                ))
            }
        }
    }

    fn append(&mut self, role: Role, intent: Intent, offer: Option<Offer>, rationale: String) -> Turn {
        let turn = Turn {
            round_index: self.next_round_index(),
            actor_role: role,
            intent,
            offer,
            rationale,
            created_at: Utc::now(),
        };
        self.turns.push(turn.clone());
        self.updated_at = turn.created_at;
        turn
    }

    fn commit_terminal(
        &mut self,
        intent: Intent,
        offer: Option<Offer>,
        rationale: String,
        status: SessionStatus,
        reason: TerminationReason,
    ) -> Turn {
        let turn = self.append(self.active_role, intent, offer, rationale);
        self.finish(status, reason);
        turn
    }

    fn finish(&mut self, status: SessionStatus, reason: TerminationReason) {
        debug_assert!(self.status.can_transition_to(status));
        self.status = status;
        self.termination = Some(reason);
        self.updated_at = Utc::now();
    }
}
