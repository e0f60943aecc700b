use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::constraints::Constraints;
use crate::domain::money::Money;
use crate::domain::offer::{Offer, MAX_ALTERNATE_SLOTS};
use crate::domain::party::{Party, Role};
use crate::domain::schedule::{feasible_slots, shared_minutes, TimeSlot};
use crate::negotiation::policy::{Decision, DecisionPolicy, NegotiationContext, PolicyError};

pub const DEFAULT_CONCESSION_CAP_BPS: u32 = 2000;

/// Deterministic rule-based negotiator.
///
/// Concedes toward the counterpart along a front-loaded schedule, never past its own
/// reservation value, and pivots to the midpoint once either side stalls.
#[derive(Clone, Debug)]
pub struct ConcessionPolicy {
    name: String,
    concession_cap_bps: u32,
}

impl ConcessionPolicy {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), concession_cap_bps: DEFAULT_CONCESSION_CAP_BPS }
    }

    pub fn with_concession_cap_bps(mut self, concession_cap_bps: u32) -> Self {
        self.concession_cap_bps = concession_cap_bps;
        self
    }

    pub fn opening_price(party: &Party, constraints: &Constraints) -> Money {
        let price = match party.role {
            Role::Buyer => constraints.budget.min,
            Role::Provider => party
                .reservation_value
                .map_or(constraints.budget.target, |floor| floor.max(constraints.budget.target)),
        };
        party.clamp_to_reservation(price)
    }

    /// Price this party would counter with after `own_last`, facing `theirs`.
    pub fn next_price(&self, context: &NegotiationContext, own_last: Money, theirs: Money) -> Money {
        let goal = context.party.clamp_to_reservation(theirs);
        let scheduled =
            self.scheduled_price(own_last, goal, context.round_index, context.constraints.max_rounds);
        let price = if context.stall_detected {
            let midpoint = own_last.midpoint(goal);
            if midpoint.minor_units().abs_diff(goal.minor_units())
                < scheduled.minor_units().abs_diff(goal.minor_units())
            {
                midpoint
            } else {
                scheduled
            }
        } else {
            scheduled
        };
        context.party.clamp_to_reservation(price)
    }

    fn scheduled_price(&self, current: Money, goal: Money, round_index: u32, max_rounds: u32) -> Money {
        let progress =
            (Decimal::from(round_index) / Decimal::from(max_rounds.max(1))).min(Decimal::ONE);
        let remaining = Decimal::ONE - progress;
        let weight = Decimal::new(65, 2) * progress
            + Decimal::new(35, 2) * (Decimal::ONE - remaining * remaining);

        let current_value = current.to_decimal();
        let proposed = Money::from_decimal(current_value + (goal.to_decimal() - current_value) * weight)
            .unwrap_or(goal);
        let cap = current.max(Money::from_major(1)).scaled_bps(self.concession_cap_bps);
        proposed.clamp_between(current - cap, current + cap)
    }

    fn build_offer(&self, context: &NegotiationContext, price: Money) -> Option<Offer> {
        let template = context.counterpart_offer.as_ref();
        let minimum = context.constraints.min_duration_minutes;
        let requested = template.map_or(minimum, |offer| offer.duration_minutes.max(minimum));

        let (duration_minutes, (primary_slot, alternate_slots)) = [requested, minimum]
            .into_iter()
            .find_map(|minutes| {
                let length = u16::try_from(minutes).ok()?;
                choose_slots(context, length).map(|slots| (minutes, slots))
            })?;

        Some(Offer {
            price,
            duration_minutes,
            primary_slot,
            alternate_slots,
            includes_scope_items: template
                .map(|offer| offer.includes_scope_items.clone())
                .unwrap_or_default(),
        })
    }
}

/// Counterpart's primary slot, then its alternates, then the earliest window both calendars
/// share, then our own earliest window. Every candidate must hold `minutes` and finish by the
/// deadline. After an inadmissible proposal the counterpart's slots are skipped. Alternates
/// are further windows of our own.
fn choose_slots(context: &NegotiationContext, minutes: u16) -> Option<(TimeSlot, Vec<TimeSlot>)> {
    let own = &context.party.availability;
    let theirs = &context.counterpart_availability;
    let constraints = &context.constraints;
    let on_time = |slot: &TimeSlot| slot.ends_by(&constraints.calendar, constraints.latest_completion);

    let proposed = context
        .counterpart_offer
        .as_ref()
        .filter(|_| context.retry_violation.is_none())
        .and_then(|offer| {
            std::iter::once(&offer.primary_slot)
                .chain(offer.alternate_slots.iter())
                .find(|slot| {
                    slot.minutes() >= minutes
                        && shared_minutes(slot, own, theirs) >= minutes
                        && on_time(*slot)
                })
                .cloned()
        });

    let mut own_windows: Vec<TimeSlot> =
        own.iter().filter_map(|window| window.truncated(minutes)).filter(|slot| on_time(slot)).collect();
    own_windows.sort_by_key(TimeSlot::chronological_key);

    let primary = proposed
        .or_else(|| feasible_slots(own, theirs, minutes).into_iter().find(|slot| on_time(slot)))
        .or_else(|| own_windows.first().cloned())?;

    let alternates = own_windows
        .into_iter()
        .filter(|slot| !slot.contains(&primary))
        .take(MAX_ALTERNATE_SLOTS)
        .collect();
    Some((primary, alternates))
}

#[async_trait]
impl DecisionPolicy for ConcessionPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn decide(&self, context: &NegotiationContext) -> Result<Decision, PolicyError> {
        let party = &context.party;
        let opening = Self::opening_price(party, &context.constraints);

        let Some(theirs) = context.counterpart_offer.as_ref() else {
            return Ok(match self.build_offer(context, opening) {
                Some(offer) => Decision::counter(offer, format!("opening at {opening}")),
                None => Decision::reject("no availability window fits the minimum duration"),
            });
        };

        let next = match context.own_last_offer() {
            Some(own) => self.next_price(context, own.price, theirs.price),
            None => opening,
        };
        let tolerance = context.constraints.stall_epsilon();
        let acceptable_up_to = match party.role {
            Role::Buyer => next + tolerance,
            Role::Provider => next - tolerance,
        };
        if party.role.prefers_or_equal(theirs.price, acceptable_up_to) && party.within_reservation(theirs.price) {
            return Ok(Decision::accept(
                theirs.clone(),
                format!("{} is within reach of our next price {next}", theirs.price),
            ));
        }

        if context.is_final_round() {
            return Ok(Decision::reject(format!(
                "final round and {} is outside what we can accept",
                theirs.price
            )));
        }

        let rationale = if context.stall_detected {
            format!("stall detected; moving to {next}")
        } else {
            format!("conceding to {next}")
        };
        Ok(match self.build_offer(context, next) {
            Some(offer) => Decision::counter(offer, rationale),
            None => Decision::reject("no availability window fits the minimum duration"),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc, Weekday};

    use super::ConcessionPolicy;
    use crate::domain::money::Money;
    use crate::domain::party::Role;
    use crate::domain::session::{SessionId, SessionStatus};
    use crate::domain::turn::Intent;
    use crate::negotiation::driver::{advance, PolicyPair, TurnSettings};
    use crate::negotiation::fixtures::{buyer, constraints, offer_at, provider, slot};
    use crate::negotiation::policy::{DecisionPolicy, NegotiationContext};
    use crate::negotiation::session::NegotiationSession;
    use crate::negotiation::validation::{ConstraintViolation, ViolationKind};
    use crate::transport::NoopTransport;

    fn context_for(role: Role, round_index: u32) -> NegotiationContext {
        let (party, counterpart) = match role {
            Role::Buyer => (buyer(), provider()),
            Role::Provider => (provider(), buyer()),
        };
        NegotiationContext {
            session_id: SessionId("neg-concession".into()),
            round_index,
            party,
            counterpart_availability: counterpart.availability,
            counterpart_offer: None,
            transcript: Vec::new(),
            constraints: constraints(),
            stall_detected: false,
            retry_violation: None,
        }
    }

    #[test]
    fn opening_prices_sit_at_each_side_of_the_band() {
        let constraints = constraints();
        assert_eq!(ConcessionPolicy::opening_price(&buyer(), &constraints), Money::from_major(150));
        assert_eq!(ConcessionPolicy::opening_price(&provider(), &constraints), Money::from_major(250));

        let mut pricey = provider();
        pricey.reservation_value = Some(Money::from_major(270));
        assert_eq!(ConcessionPolicy::opening_price(&pricey, &constraints), Money::from_major(270));
    }

    #[test]
    fn schedule_moves_a_fraction_of_the_gap() {
        let policy = ConcessionPolicy::new("buyer");
        let context = context_for(Role::Buyer, 3);
        let next = policy.next_price(&context, Money::from_major(150), Money::from_major(250));
        assert_eq!(next, Money::from_minor(16_946));
    }

    #[test]
    fn movement_is_capped_per_round() {
        let policy = ConcessionPolicy::new("buyer");
        let context = context_for(Role::Buyer, 19);
        let next = policy.next_price(&context, Money::from_major(100), Money::from_major(300));
        assert_eq!(next, Money::from_major(120));
    }

    #[test]
    fn stall_pivots_to_the_midpoint() {
        let policy = ConcessionPolicy::new("buyer");
        let mut context = context_for(Role::Buyer, 3);
        context.stall_detected = true;
        let next = policy.next_price(&context, Money::from_major(200), Money::from_major(280));
        assert_eq!(next, Money::from_major(240));
    }

    #[test]
    fn never_concedes_past_own_reservation() {
        let policy = ConcessionPolicy::new("provider");
        let context = context_for(Role::Provider, 20);
        let next = policy.next_price(&context, Money::from_major(255), Money::from_major(150));
        assert_eq!(next, Money::from_major(250));
    }

    #[tokio::test]
    async fn opening_offer_uses_a_shared_window() {
        let decision = ConcessionPolicy::new("buyer").decide(&context_for(Role::Buyer, 1)).await.expect("decide");
        assert_eq!(decision.intent, Intent::Counter);
        let offer = decision.offer.expect("offer");
        assert_eq!(offer.price, Money::from_major(150));
        assert_eq!(offer.primary_slot, slot(Weekday::Tue, "10:00", "11:00"));
        assert!(offer.alternate_slots.len() <= 2);
    }

    #[tokio::test]
    async fn accepts_an_offer_better_than_its_own_next_move() {
        let mut context = context_for(Role::Buyer, 5);
        context.counterpart_offer = Some(offer_at(255));
        context.transcript = vec![crate::domain::turn::Turn {
            round_index: 3,
            actor_role: Role::Buyer,
            intent: Intent::Counter,
            offer: Some(offer_at(260)),
            rationale: String::new(),
            created_at: chrono::Utc::now(),
        }];

        let decision = ConcessionPolicy::new("buyer").decide(&context).await.expect("decide");
        assert_eq!(decision.intent, Intent::Accept);
        assert_eq!(decision.offer, Some(offer_at(255)));
    }

    #[tokio::test]
    async fn rejects_on_the_final_round() {
        let mut context = context_for(Role::Provider, 20);
        context.counterpart_offer = Some(offer_at(200));
        let decision = ConcessionPolicy::new("provider").decide(&context).await.expect("decide");
        assert_eq!(decision.intent, Intent::Reject);
    }

    #[tokio::test]
    async fn keeps_the_counterpart_slot_when_it_fits() {
        let mut context = context_for(Role::Provider, 2);
        let mut proposed = offer_at(200);
        proposed.primary_slot = slot(Weekday::Fri, "14:00", "15:00");
        context.counterpart_offer = Some(proposed);

        let decision = ConcessionPolicy::new("provider").decide(&context).await.expect("decide");
        let offer = decision.offer.expect("counter");
        assert_eq!(offer.price, Money::from_major(250));
        assert_eq!(offer.primary_slot, slot(Weekday::Fri, "14:00", "15:00"));
    }

    #[tokio::test]
    async fn retry_after_an_inadmissible_proposal_moves_off_the_counterpart_slot() {
        let mut context = context_for(Role::Provider, 2);
        let mut proposed = offer_at(200);
        proposed.primary_slot = slot(Weekday::Fri, "14:00", "15:00");
        context.counterpart_offer = Some(proposed);
        context.retry_violation = Some(ConstraintViolation {
            kind: ViolationKind::DeadlineExceeded,
            message: "slot Fri 14:00-15:00 ends after the deadline".into(),
        });

        let decision = ConcessionPolicy::new("provider").decide(&context).await.expect("decide");
        let offer = decision.offer.expect("counter");
        assert_eq!(offer.primary_slot, slot(Weekday::Tue, "10:00", "11:00"));
    }

    #[tokio::test]
    async fn counter_keeps_a_longer_visit_when_a_window_holds_it() {
        let mut context = context_for(Role::Provider, 2);
        let mut proposed = offer_at(200);
        proposed.duration_minutes = 90;
        proposed.primary_slot = slot(Weekday::Tue, "10:00", "11:30");
        context.counterpart_offer = Some(proposed);

        let offer = ConcessionPolicy::new("provider")
            .decide(&context)
            .await
            .expect("decide")
            .offer
            .expect("counter");
        assert_eq!(offer.duration_minutes, 90);
        assert_eq!(offer.primary_slot, slot(Weekday::Tue, "10:00", "11:30"));
    }

    #[tokio::test]
    async fn earliest_slot_before_the_deadline_wins_over_list_order() {
        let mut buyer = buyer();
        buyer.availability = vec![slot(Weekday::Fri, "13:00", "17:00"), slot(Weekday::Tue, "09:00", "12:00")];
        let mut constraints = constraints();
        constraints.latest_completion =
            Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).single().expect("wednesday");
        let policies = PolicyPair::new(
            Arc::new(ConcessionPolicy::new("buyer")),
            Arc::new(ConcessionPolicy::new("provider")),
        );
        let mut session =
            NegotiationSession::start(SessionId("neg-early".into()), buyer, provider(), constraints)
                .expect("valid");

        while !session.status().is_terminal() {
            advance(&mut session, &policies, &TurnSettings::default(), &NoopTransport).await.expect("turn");
        }

        assert_eq!(session.status(), SessionStatus::Accepted);
        assert!(session.rejected_proposals().is_empty());
        assert_eq!(
            session.final_offer().map(|offer| offer.primary_slot.clone()),
            Some(slot(Weekday::Tue, "10:00", "11:00"))
        );
    }

    #[tokio::test]
    async fn two_concession_policies_reach_agreement_inside_the_band() {
        let policies = PolicyPair::new(
            Arc::new(ConcessionPolicy::new("buyer")),
            Arc::new(ConcessionPolicy::new("provider")),
        );
        let mut session =
            NegotiationSession::start(SessionId("neg-auto".into()), buyer(), provider(), constraints())
                .expect("valid");

        while !session.status().is_terminal() {
            advance(&mut session, &policies, &TurnSettings::default(), &NoopTransport).await.expect("turn");
        }

        assert_eq!(session.status(), SessionStatus::Accepted);
        let price = session.final_offer().map(|offer| offer.price).expect("final offer");
        assert!(price >= Money::from_major(250) && price <= Money::from_major(300));
        assert!(session.turns().len() <= 20);
    }
}
