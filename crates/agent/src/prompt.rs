use std::fmt::Write as _;

use parley_core::domain::party::Role;
use parley_core::domain::schedule::TimeSlot;
use parley_core::negotiation::policy::NegotiationContext;

pub const RESPONSE_CONTRACT: &str = r#"Respond with a single JSON object and nothing else:
{"decision": "ACCEPT" | "COUNTER" | "REJECT",
 "offer": {"price": "250.00", "duration_minutes": 60,
           "primary_slot": {"day": "Tue", "start": "10:00", "end": "11:00"},
           "alternate_slots": [], "includes_scope_items": {}} | null,
 "reason": "one short sentence"}
ACCEPT must repeat the counterpart's last offer exactly. COUNTER must include a full offer.
REJECT ends the negotiation."#;

/// Renders the party's private view of the session.
///
/// Only the party's own reservation value appears; the counterpart's is never known here.
pub fn render(context: &NegotiationContext) -> String {
    let party = &context.party;
    let constraints = &context.constraints;
    let budget = &constraints.budget;
    let mut prompt = String::new();

    let persona = match party.role {
        Role::Buyer => "the BUYER of a home-service visit",
        Role::Provider => "the PROVIDER of a home-service visit",
    };
    let _ = writeln!(prompt, "You are {}, negotiating as {persona}.", display_name(&party.name, party.role));

    match (party.role, party.reservation_value) {
        (Role::Buyer, Some(ceiling)) => {
            let _ = writeln!(prompt, "Never agree to pay more than {ceiling} USD.");
        }
        (Role::Provider, Some(floor)) => {
            let _ = writeln!(prompt, "Never accept less than {floor} USD.");
        }
        (_, None) => {}
    }
    let _ = writeln!(
        prompt,
        "Budget band: min={} target={} max={} USD.",
        budget.min, budget.target, budget.max
    );
    let _ = writeln!(
        prompt,
        "The visit lasts at least {} minutes and must finish by {}.",
        constraints.min_duration_minutes,
        constraints.latest_completion.to_rfc3339()
    );
    let _ = writeln!(
        prompt,
        "The work is {} and may take at most {} visit(s).",
        if constraints.on_site_required { "on site" } else { "remote or on site" },
        constraints.max_visits
    );
    let _ = writeln!(prompt, "Your availability: {}.", slots(&party.availability));
    let _ = writeln!(prompt, "Counterpart availability: {}.", slots(&context.counterpart_availability));
    let _ = writeln!(prompt, "This is round {} of {}.", context.round_index, constraints.max_rounds);

    if !context.transcript.is_empty() {
        prompt.push_str("\nHistory:\n");
        for turn in &context.transcript {
            let price = turn.offer.as_ref().map(|offer| format!(" at {}", offer.price)).unwrap_or_default();
            let _ = writeln!(prompt, "- round {}: {} {:?}{price}", turn.round_index, turn.actor_role, turn.intent);
        }
    }

    match &context.counterpart_offer {
        Some(offer) => {
            let rendered = serde_json::to_string(offer).unwrap_or_else(|_| offer.price.to_string());
            let _ = writeln!(prompt, "\nCounterpart's last offer:\n{rendered}");
        }
        None => prompt.push_str("\nNo offer is on the table yet; make an opening offer.\n"),
    }

    if context.stall_detected {
        prompt.push_str("\nThe negotiation has stalled. Pivot: consider a midpoint price or a scope change.\n");
    }
    if let Some(violation) = &context.retry_violation {
        let _ = writeln!(prompt, "\nYour previous proposal was rejected ({violation}). Correct it.");
    }
    if context.is_final_round() {
        prompt.push_str("\nThis is the final round. Accept or reject.\n");
    }

    prompt.push('\n');
    prompt.push_str(RESPONSE_CONTRACT);
    prompt
}

fn display_name(name: &str, role: Role) -> &str {
    if name.trim().is_empty() {
        role.as_str()
    } else {
        name
    }
}

fn slots(availability: &[TimeSlot]) -> String {
    if availability.is_empty() {
        return "none declared".to_string();
    }
    availability.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{NaiveDate, TimeZone, Utc, Weekday};
    use parley_core::domain::constraints::{BudgetBand, Constraints};
    use parley_core::domain::money::Money;
    use parley_core::domain::offer::Offer;
    use parley_core::domain::party::{Party, PartyId, Role};
    use parley_core::domain::schedule::{CalendarAnchor, TimeSlot};
    use parley_core::domain::session::SessionId;
    use parley_core::negotiation::policy::NegotiationContext;

    use super::render;

    fn tuesday() -> TimeSlot {
        TimeSlot { day: Weekday::Tue, start: "10:00".parse().expect("start"), end: "12:00".parse().expect("end") }
    }

    fn provider_context() -> NegotiationContext {
        NegotiationContext {
            session_id: SessionId("neg-prompt".into()),
            round_index: 2,
            party: Party {
                id: PartyId("provider-1".into()),
                name: "Ace Plumbing".into(),
                role: Role::Provider,
                reservation_value: Some(Money::from_major(250)),
                availability: vec![tuesday()],
            },
            counterpart_availability: vec![tuesday()],
            counterpart_offer: Some(Offer {
                price: Money::from_major(220),
                duration_minutes: 60,
                primary_slot: tuesday(),
                alternate_slots: Vec::new(),
                includes_scope_items: BTreeMap::new(),
            }),
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
            stall_detected: true,
            retry_violation: None,
        }
    }

    #[test]
    fn prompt_carries_own_floor_offer_and_contract() {
        let prompt = render(&provider_context());

        assert!(prompt.contains("You are Ace Plumbing"));
        assert!(prompt.contains("Never accept less than 250.00 USD."));
        assert!(prompt.contains("\"price\":\"220.00\""));
        assert!(prompt.contains("round 2 of 20"));
        assert!(prompt.contains("The work is on site and may take at most 1 visit(s)."));
        assert!(prompt.contains("Pivot: consider a midpoint price"));
        assert!(prompt.contains("\"decision\": \"ACCEPT\" | \"COUNTER\" | \"REJECT\""));
    }

    #[test]
    fn opening_prompt_asks_for_an_opening_offer() {
        let mut context = provider_context();
        context.counterpart_offer = None;
        context.stall_detected = false;

        context.constraints.on_site_required = false;
        context.constraints.max_visits = 2;

        let prompt = render(&context);
        assert!(prompt.contains("remote or on site and may take at most 2 visit(s)"));
        assert!(prompt.contains("make an opening offer"));
        assert!(!prompt.contains("stalled"));
    }
}
