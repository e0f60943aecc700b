use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::constraints::Constraints;
use crate::domain::money::Money;
use crate::domain::offer::Offer;
use crate::domain::party::{Party, PartyId};
use crate::domain::schedule::TimeSlot;
use crate::domain::session::SessionId;

pub const STANDARD_TERMS: [&str; 4] = [
    "Provider will perform the specified work professionally and safely.",
    "Payment is due at completion unless otherwise agreed in writing.",
    "Cancellations require 12-hour notice.",
    "Any extra parts beyond the agreed scope require written approval.",
];

/// Binding summary of an accepted negotiation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agreement {
    pub agreement_id: String,
    pub session_id: SessionId,
    pub buyer_id: PartyId,
    pub provider_id: PartyId,
    pub scheduled_slot: TimeSlot,
    pub duration_minutes: u32,
    pub price: Money,
    pub scope: BTreeMap<String, bool>,
    pub on_site: bool,
    pub max_visits: u32,
    pub terms: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Agreement {
    pub fn from_accepted(
        session_id: &SessionId,
        buyer: &Party,
        provider: &Party,
        offer: &Offer,
        constraints: &Constraints,
        accepted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            agreement_id: format!("agr_{session_id}"),
            session_id: session_id.clone(),
            buyer_id: buyer.id.clone(),
            provider_id: provider.id.clone(),
            scheduled_slot: offer.primary_slot.clone(),
            duration_minutes: offer.duration_minutes,
            price: offer.price,
            scope: offer.includes_scope_items.clone(),
            on_site: constraints.on_site_required,
            max_visits: constraints.max_visits,
            terms: STANDARD_TERMS.iter().map(|term| term.to_string()).collect(),
            created_at: accepted_at,
        }
    }
}
