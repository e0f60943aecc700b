use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::constraints::Constraints;
use crate::domain::offer::Offer;
use crate::domain::party::{Party, Role};
use crate::domain::schedule::shared_minutes;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationKind {
    BudgetCeilingExceeded,
    ReservationFloorViolated,
    InsufficientOverlap,
    DeadlineExceeded,
}

impl ViolationKind {
    pub fn code(self) -> &'static str {
        match self {
            Self::BudgetCeilingExceeded => "BUDGET_CEILING_EXCEEDED",
            Self::ReservationFloorViolated => "RESERVATION_FLOOR_VIOLATED",
            Self::InsufficientOverlap => "INSUFFICIENT_OVERLAP",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ConstraintViolation {
    pub kind: ViolationKind,
    pub message: String,
}

impl ConstraintViolation {
    fn new(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

/// Decides whether `offer`, issued by `issuer`, may enter the transcript.
///
/// The issuer's own reservation value is enforced here; the counterpart contributes its
/// availability to the overlap check. Its reservation value is enforced when the counterpart
/// issues or accepts an offer itself, so an agreement always satisfies both bounds.
///
/// The overlap rule asks for `min_duration_minutes` of `primary_slot` inside both calendars;
/// the slot may run past either calendar as long as that stretch exists. The visit length
/// itself must be at least the session minimum and fit inside `primary_slot`, and both
/// failures are reported as `INSUFFICIENT_OVERLAP`.
/// Pure: identical inputs always produce identical results.
pub fn validate<'a>(
    offer: &'a Offer,
    issuer: &Party,
    constraints: &Constraints,
    counterpart: &Party,
) -> Result<&'a Offer, ConstraintViolation> {
    if let Some(reservation) = issuer.reservation_value {
        match issuer.role {
            Role::Buyer if offer.price > reservation => {
                return Err(ConstraintViolation::new(
                    ViolationKind::BudgetCeilingExceeded,
                    format!("buyer offered {} above its ceiling", offer.price),
                ));
            }
            Role::Provider if offer.price < reservation => {
                return Err(ConstraintViolation::new(
                    ViolationKind::ReservationFloorViolated,
                    format!("provider offered {} below its floor", offer.price),
                ));
            }
            _ => {}
        }
    }

    if offer.duration_minutes < constraints.min_duration_minutes {
        return Err(ConstraintViolation::new(
            ViolationKind::InsufficientOverlap,
            format!(
                "visit of {} minutes is shorter than the {} minute minimum",
                offer.duration_minutes, constraints.min_duration_minutes
            ),
        ));
    }
    if offer.duration_minutes > u32::from(offer.primary_slot.minutes()) {
        return Err(ConstraintViolation::new(
            ViolationKind::InsufficientOverlap,
            format!(
                "visit of {} minutes does not fit slot {}",
                offer.duration_minutes, offer.primary_slot
            ),
        ));
    }

    let shared = u32::from(shared_minutes(
        &offer.primary_slot,
        &issuer.availability,
        &counterpart.availability,
    ));
    if shared < constraints.min_duration_minutes {
        return Err(ConstraintViolation::new(
            ViolationKind::InsufficientOverlap,
            format!(
                "slot {} shares {shared} minutes with both calendars, {} required",
                offer.primary_slot, constraints.min_duration_minutes
            ),
        ));
    }

    match offer.primary_slot.end_instant(&constraints.calendar) {
        Some(end) if end <= constraints.latest_completion => Ok(offer),
        Some(end) => Err(ConstraintViolation::new(
            ViolationKind::DeadlineExceeded,
            format!(
                "slot {} ends at {} after the deadline {}",
                offer.primary_slot,
                end.to_rfc3339(),
                constraints.latest_completion.to_rfc3339()
            ),
        )),
        None => Err(ConstraintViolation::new(
            ViolationKind::DeadlineExceeded,
            format!("slot {} cannot be placed on the session calendar", offer.primary_slot),
        )),
    }
}
