use parley_core::config::AgentConfig;
use parley_core::domain::turn::Intent;
use parley_core::negotiation::policy::{Decision, NegotiationContext};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    /// The decision was repaired; the caller should submit `decision` instead.
    Adjust { reason_code: &'static str, decision: Decision },
    Deny { reason_code: &'static str, user_message: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub clamp_to_reservation: bool,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self { clamp_to_reservation: true }
    }
}

impl From<&AgentConfig> for GuardrailPolicy {
    fn from(config: &AgentConfig) -> Self {
        Self { clamp_to_reservation: config.clamp_to_reservation }
    }
}

impl GuardrailPolicy {
    pub fn evaluate(&self, context: &NegotiationContext, decision: &Decision) -> GuardrailDecision {
        let party = &context.party;
        match (decision.intent, decision.offer.as_ref()) {
            (Intent::Accept, _) if context.counterpart_offer.is_none() => GuardrailDecision::Deny {
                reason_code: "accept_without_offer",
                user_message: "There is no counterpart offer on file to accept yet.".to_string(),
            },
            (Intent::Accept, Some(offer)) if !party.within_reservation(offer.price) => {
                GuardrailDecision::Deny {
                    reason_code: "accept_outside_reservation",
                    user_message: format!(
                        "Accepting {} would breach the {} reservation value.",
                        offer.price, party.role
                    ),
                }
            }
            (Intent::Counter, Some(offer))
                if self.clamp_to_reservation && !party.within_reservation(offer.price) =>
            {
                let clamped = offer.repriced(party.clamp_to_reservation(offer.price));
                GuardrailDecision::Adjust {
                    reason_code: "price_clamped_to_reservation",
                    decision: Decision::counter(clamped, decision.rationale.clone()),
                }
            }
            _ => GuardrailDecision::Allow,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{NaiveDate, TimeZone, Utc, Weekday};
    use parley_core::config::AgentConfig;
    use parley_core::domain::constraints::{BudgetBand, Constraints};
    use parley_core::domain::money::Money;
    use parley_core::domain::offer::Offer;
    use parley_core::domain::party::{Party, PartyId, Role};
    use parley_core::domain::schedule::{CalendarAnchor, TimeSlot};
    use parley_core::domain::session::SessionId;
    use parley_core::negotiation::policy::{Decision, NegotiationContext};

    use super::{GuardrailDecision, GuardrailPolicy};

    fn offer(price: i64) -> Offer {
        Offer {
            price: Money::from_major(price),
            duration_minutes: 60,
            primary_slot: TimeSlot {
                day: Weekday::Tue,
                start: "10:00".parse().expect("start"),
                end: "11:00".parse().expect("end"),
            },
            alternate_slots: Vec::new(),
            includes_scope_items: BTreeMap::new(),
        }
    }

    fn buyer_context(counterpart_offer: Option<Offer>) -> NegotiationContext {
        NegotiationContext {
            session_id: SessionId("neg-guard".into()),
            round_index: 3,
            party: Party {
                id: PartyId("buyer-1".into()),
                name: "Dana".into(),
                role: Role::Buyer,
                reservation_value: Some(Money::from_major(300)),
                availability: Vec::new(),
            },
            counterpart_availability: Vec::new(),
            counterpart_offer,
            transcript: Vec::new(),
            constraints: Constraints::new(
                Utc.with_ymd_and_hms(2025, 10, 3, 23, 59, 0).single().expect("deadline"),
                BudgetBand {
                    min: Money::from_major(150),
                    target: Money::from_major(250),
                    max: Money::from_major(300),
                },
                CalendarAnchor::new(NaiveDate::from_ymd_opt(2025, 9, 29).expect("monday"), 0),
            ),
            stall_detected: false,
            retry_violation: None,
        }
    }

    #[test]
    fn counter_above_ceiling_is_clamped() {
        let policy = GuardrailPolicy::default();
        let decision = policy.evaluate(&buyer_context(None), &Decision::counter(offer(340), "stretch"));

        match decision {
            GuardrailDecision::Adjust { reason_code, decision } => {
                assert_eq!(reason_code, "price_clamped_to_reservation");
                assert_eq!(decision.offer.map(|offer| offer.price), Some(Money::from_major(300)));
                assert_eq!(decision.rationale, "stretch");
            }
            other => panic!("expected adjust, got {other:?}"),
        }
    }

    #[test]
    fn clamping_can_be_disabled() {
        let policy = GuardrailPolicy::from(&AgentConfig { clamp_to_reservation: false });
        let decision = policy.evaluate(&buyer_context(None), &Decision::counter(offer(340), "stretch"));
        assert_eq!(decision, GuardrailDecision::Allow);
    }

    #[test]
    fn accept_needs_an_offer_on_file() {
        let policy = GuardrailPolicy::default();
        let decision = policy.evaluate(&buyer_context(None), &Decision::accept(offer(280), "deal"));
        assert!(matches!(decision, GuardrailDecision::Deny { reason_code: "accept_without_offer", .. }));
    }

    #[test]
    fn accept_above_ceiling_is_denied() {
        let policy = GuardrailPolicy::default();
        let decision =
            policy.evaluate(&buyer_context(Some(offer(320))), &Decision::accept(offer(320), "fine"));
        assert!(matches!(
            decision,
            GuardrailDecision::Deny { reason_code: "accept_outside_reservation", .. }
        ));
    }

    #[test]
    fn in_bounds_decisions_pass() {
        let policy = GuardrailPolicy::default();
        let context = buyer_context(Some(offer(280)));
        assert_eq!(policy.evaluate(&context, &Decision::accept(offer(280), "deal")), GuardrailDecision::Allow);
        assert_eq!(policy.evaluate(&context, &Decision::reject("walk away")), GuardrailDecision::Allow);
    }
}
