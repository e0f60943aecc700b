use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::money::Money;
use crate::domain::schedule::TimeSlot;
use crate::errors::DomainError;

pub const MAX_ALTERNATE_SLOTS: usize = 2;

/// One proposed set of deal terms. Every turn carries a fresh `Offer`; none is edited in place.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub price: Money,
    pub duration_minutes: u32,
    pub primary_slot: TimeSlot,
    #[serde(default)]
    pub alternate_slots: Vec<TimeSlot>,
    #[serde(default)]
    pub includes_scope_items: BTreeMap<String, bool>,
}

impl Offer {
    pub fn new(
        price: Money,
        duration_minutes: u32,
        primary_slot: TimeSlot,
        alternate_slots: Vec<TimeSlot>,
        includes_scope_items: BTreeMap<String, bool>,
    ) -> Result<Self, DomainError> {
        let offer =
            Self { price, duration_minutes, primary_slot, alternate_slots, includes_scope_items };
        offer.check_well_formed()?;
        Ok(offer)
    }

    /// Structural invariants. Offers arriving from a decision policy are re-checked here
    /// because deserialization alone cannot enforce them.
    pub fn check_well_formed(&self) -> Result<(), DomainError> {
        if self.price.is_negative() {
            return Err(DomainError::InvalidOffer(format!("price {} is negative", self.price)));
        }
        if self.duration_minutes == 0 {
            return Err(DomainError::InvalidOffer("duration_minutes must be positive".to_string()));
        }
        self.primary_slot
            .check_ordered()
            .map_err(|error| DomainError::InvalidOffer(format!("primary_slot: {error}")))?;
        if self.alternate_slots.len() > MAX_ALTERNATE_SLOTS {
            return Err(DomainError::InvalidOffer(format!(
                "at most {MAX_ALTERNATE_SLOTS} alternate slots are allowed, got {}",
                self.alternate_slots.len()
            )));
        }
        for alternate in &self.alternate_slots {
            alternate
                .check_ordered()
                .map_err(|error| DomainError::InvalidOffer(format!("alternate_slots: {error}")))?;
        }
        Ok(())
    }

    /// Same offer at a different price, keeping every other term.
    pub fn repriced(&self, price: Money) -> Offer {
        Offer { price, ..self.clone() }
    }

    pub fn scope_item(&self, name: &str) -> Option<bool> {
        self.includes_scope_items.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Weekday;

    use super::Offer;
    use crate::domain::money::Money;
    use crate::domain::schedule::TimeSlot;
    use crate::errors::DomainError;

    fn slot(start: &str, end: &str) -> TimeSlot {
        TimeSlot { day: Weekday::Fri, start: start.parse().expect("start"), end: end.parse().expect("end") }
    }

    fn offer() -> Offer {
        Offer::new(
            Money::from_major(220),
            60,
            slot("10:00", "11:00"),
            vec![slot("13:00", "14:00")],
            BTreeMap::from([("parts_included".to_string(), false)]),
        )
        .expect("well formed")
    }

    #[test]
    fn rejects_structural_violations() {
        let mut negative = offer();
        negative.price = Money::from_minor(-1);
        assert!(matches!(negative.check_well_formed(), Err(DomainError::InvalidOffer(_))));

        let mut zero_duration = offer();
        zero_duration.duration_minutes = 0;
        assert!(zero_duration.check_well_formed().is_err());

        let mut inverted = offer();
        inverted.primary_slot = slot("12:00", "11:00");
        assert!(inverted.check_well_formed().is_err());

        let mut crowded = offer();
        crowded.alternate_slots =
            vec![slot("08:00", "09:00"), slot("09:00", "10:00"), slot("15:00", "16:00")];
        assert!(crowded.check_well_formed().is_err());
    }

    #[test]
    fn repricing_keeps_other_terms() {
        let original = offer();
        let repriced = original.repriced(Money::from_major(280));

        assert_eq!(repriced.price, Money::from_major(280));
        assert_eq!(repriced.primary_slot, original.primary_slot);
        assert_eq!(repriced.scope_item("parts_included"), Some(false));
        assert_eq!(original.price, Money::from_major(220));
    }

    #[test]
    fn deserializes_from_wire_shape() {
        let offer: Offer = serde_json::from_value(serde_json::json!({
            "price": "249.50",
            "duration_minutes": 90,
            "primary_slot": {"day": "Tue", "start": "09:00", "end": "10:30"}
        }))
        .expect("deserialize");

        assert_eq!(offer.price, Money::from_minor(24_950));
        assert!(offer.alternate_slots.is_empty());
        assert!(offer.check_well_formed().is_ok());
    }
}
