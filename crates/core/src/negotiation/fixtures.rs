//! Shared parties and constraints for negotiation tests: a Tuesday/Friday week with a
//! $300 buyer ceiling and a $250 provider floor.

use std::collections::BTreeMap;

use chrono::{NaiveDate, TimeZone, Utc, Weekday};

use crate::domain::constraints::{BudgetBand, Constraints};
use crate::domain::money::Money;
use crate::domain::offer::Offer;
use crate::domain::party::{Party, PartyId, Role};
use crate::domain::schedule::{CalendarAnchor, TimeSlot};

pub fn slot(day: Weekday, start: &str, end: &str) -> TimeSlot {
    TimeSlot { day, start: start.parse().expect("start"), end: end.parse().expect("end") }
}

pub fn buyer() -> Party {
    Party {
        id: PartyId("buyer-1".into()),
        name: "Dana".into(),
        role: Role::Buyer,
        reservation_value: Some(Money::from_major(300)),
        availability: vec![slot(Weekday::Tue, "09:00", "12:00"), slot(Weekday::Fri, "13:00", "17:00")],
    }
}

pub fn provider() -> Party {
    Party {
        id: PartyId("provider-1".into()),
        name: "Ace Plumbing".into(),
        role: Role::Provider,
        reservation_value: Some(Money::from_major(250)),
        availability: vec![slot(Weekday::Tue, "10:00", "16:00"), slot(Weekday::Fri, "08:00", "18:00")],
    }
}

pub fn constraints() -> Constraints {
    Constraints::new(
        Utc.with_ymd_and_hms(2025, 10, 3, 23, 59, 0).single().expect("deadline"),
        BudgetBand { min: Money::from_major(150), target: Money::from_major(250), max: Money::from_major(300) },
        CalendarAnchor::new(NaiveDate::from_ymd_opt(2025, 9, 29).expect("monday"), 0),
    )
}

/// One-hour Tuesday morning visit at `price` dollars.
pub fn offer_at(price: i64) -> Offer {
    Offer::new(Money::from_major(price), 60, slot(Weekday::Tue, "10:00", "11:00"), Vec::new(), BTreeMap::new())
        .expect("well formed")
}
