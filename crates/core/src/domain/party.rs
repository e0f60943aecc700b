use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::money::Money;
use crate::domain::schedule::TimeSlot;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartyId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Buyer,
    Provider,
}

impl Role {
    pub fn counterpart(self) -> Role {
        match self {
            Self::Buyer => Self::Provider,
            Self::Provider => Self::Buyer,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buyer => "BUYER",
            Self::Provider => "PROVIDER",
        }
    }

    /// Whether `candidate` is at least as good as `reference` from this side of the table.
    pub fn prefers_or_equal(self, candidate: Money, reference: Money) -> bool {
        match self {
            Self::Buyer => candidate <= reference,
            Self::Provider => candidate >= reference,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side of a negotiation. Fixed for the lifetime of the session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub id: PartyId,
    #[serde(default)]
    pub name: String,
    pub role: Role,
    /// Buyer ceiling or provider floor on the total price. `None` is unconstrained.
    #[serde(default)]
    pub reservation_value: Option<Money>,
    #[serde(default)]
    pub availability: Vec<TimeSlot>,
}

impl Party {
    /// True when `price` is on the permitted side of this party's reservation value.
    pub fn within_reservation(&self, price: Money) -> bool {
        match (self.role, self.reservation_value) {
            (_, None) => true,
            (Role::Buyer, Some(ceiling)) => price <= ceiling,
            (Role::Provider, Some(floor)) => price >= floor,
        }
    }

    /// Pulls `price` back inside the reservation value.
    pub fn clamp_to_reservation(&self, price: Money) -> Money {
        match (self.role, self.reservation_value) {
            (_, None) => price,
            (Role::Buyer, Some(ceiling)) => price.min(ceiling),
            (Role::Provider, Some(floor)) => price.max(floor),
        }
    }
}
