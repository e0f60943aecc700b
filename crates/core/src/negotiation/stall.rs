use serde::{Deserialize, Serialize};

use crate::domain::money::Money;
use crate::domain::party::Role;

/// Per-party history of countered prices, used to spot a side that has stopped conceding.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StallTracker {
    buyer_prices: Vec<Money>,
    provider_prices: Vec<Money>,
    buyer_stalled: bool,
    provider_stalled: bool,
}

impl StallTracker {
    /// Records a committed counter and re-evaluates that party's stall flag.
    ///
    /// A party is stalled when its last `window` counters moved less than `epsilon`
    /// toward agreement: upward for the buyer, downward for the provider.
    pub fn record(&mut self, role: Role, price: Money, epsilon: Money, window: usize) -> bool {
        let prices = match role {
            Role::Buyer => &mut self.buyer_prices,
            Role::Provider => &mut self.provider_prices,
        };
        prices.push(price);

        let stalled = window >= 2 && prices.len() >= window && {
            let recent = &prices[prices.len() - window..];
            let (first, last) = (recent[0], recent[window - 1]);
            let movement = match role {
                Role::Buyer => last - first,
                Role::Provider => first - last,
            };
            movement < epsilon
        };

        match role {
            Role::Buyer => self.buyer_stalled = stalled,
            Role::Provider => self.provider_stalled = stalled,
        }
        stalled
    }

    pub fn is_stalled(&self, role: Role) -> bool {
        match role {
            Role::Buyer => self.buyer_stalled,
            Role::Provider => self.provider_stalled,
        }
    }

    pub fn any_stalled(&self) -> bool {
        self.buyer_stalled || self.provider_stalled
    }

    pub fn prices(&self, role: Role) -> &[Money] {
        match role {
            Role::Buyer => &self.buyer_prices,
            Role::Provider => &self.provider_prices,
        }
    }
}
