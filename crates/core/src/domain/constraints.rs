use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::money::Money;
use crate::domain::schedule::CalendarAnchor;
use crate::errors::DomainError;

pub const DEFAULT_MIN_DURATION_MINUTES: u32 = 60;
pub const DEFAULT_MAX_ROUNDS: u32 = 20;
pub const DEFAULT_STALL_EPSILON_BPS: u32 = 100;
pub const DEFAULT_STALL_WINDOW: usize = 3;

pub const MAX_ROUNDS_LIMIT: u32 = 200;
pub const MIN_STALL_WINDOW: usize = 2;
pub const MAX_STALL_WINDOW: usize = 10;
pub const MAX_BASIS_POINTS: u32 = 10_000;
pub const MAX_DURATION_MINUTES: u32 = 24 * 60;

/// Buyer budget band. `target` anchors the stall epsilon.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetBand {
    pub min: Money,
    pub target: Money,
    pub max: Money,
}

impl BudgetBand {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.min.is_negative() {
            return Err(DomainError::InvalidConstraints("budget.min must be non-negative".into()));
        }
        if !(self.min <= self.target && self.target <= self.max) {
            return Err(DomainError::InvalidConstraints(format!(
                "budget must satisfy min <= target <= max (got {} / {} / {})",
                self.min, self.target, self.max
            )));
        }
        Ok(())
    }
}

/// Session-level hard limits shared by both parties.
///
/// `on_site_required` and `max_visits` describe the job rather than an offer: every offer is a
/// single visit, so they are not checked per turn. They are shown to LLM-backed parties and
/// carried into the agreement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraints {
    pub latest_completion: DateTime<Utc>,
    #[serde(default = "default_min_duration")]
    pub min_duration_minutes: u32,
    pub budget: BudgetBand,
    #[serde(default = "default_on_site")]
    pub on_site_required: bool,
    #[serde(default = "default_max_visits")]
    pub max_visits: u32,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    pub calendar: CalendarAnchor,
    #[serde(default = "default_stall_epsilon_bps")]
    pub stall_epsilon_bps: u32,
    #[serde(default = "default_stall_window")]
    pub stall_window: usize,
}

impl Constraints {
    pub fn new(latest_completion: DateTime<Utc>, budget: BudgetBand, calendar: CalendarAnchor) -> Self {
        Self {
            latest_completion,
            min_duration_minutes: DEFAULT_MIN_DURATION_MINUTES,
            budget,
            on_site_required: true,
            max_visits: 1,
            max_rounds: DEFAULT_MAX_ROUNDS,
            calendar,
            stall_epsilon_bps: DEFAULT_STALL_EPSILON_BPS,
            stall_window: DEFAULT_STALL_WINDOW,
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        self.budget.validate()?;
        if !(1..=MAX_DURATION_MINUTES).contains(&self.min_duration_minutes) {
            return Err(DomainError::InvalidConstraints(format!(
                "min_duration_minutes must be in range 1..={MAX_DURATION_MINUTES}"
            )));
        }
        if !(1..=MAX_ROUNDS_LIMIT).contains(&self.max_rounds) {
            return Err(DomainError::InvalidConstraints(format!(
                "max_rounds must be in range 1..={MAX_ROUNDS_LIMIT}"
            )));
        }
        if self.max_visits == 0 {
            return Err(DomainError::InvalidConstraints("max_visits must be greater than zero".into()));
        }
        if !(MIN_STALL_WINDOW..=MAX_STALL_WINDOW).contains(&self.stall_window) {
            return Err(DomainError::InvalidConstraints(format!(
                "stall_window must be in range {MIN_STALL_WINDOW}..={MAX_STALL_WINDOW}"
            )));
        }
        if self.stall_epsilon_bps > MAX_BASIS_POINTS {
            return Err(DomainError::InvalidConstraints(format!(
                "stall_epsilon_bps must not exceed {MAX_BASIS_POINTS}"
            )));
        }
        Ok(())
    }

    /// Smallest price movement that still counts as progress. Never below one minor unit.
    pub fn stall_epsilon(&self) -> Money {
        self.budget.target.scaled_bps(self.stall_epsilon_bps).max(Money::from_minor(1))
    }
}

fn default_min_duration() -> u32 {
    DEFAULT_MIN_DURATION_MINUTES
}

fn default_on_site() -> bool {
    true
}

fn default_max_visits() -> u32 {
    1
}

fn default_max_rounds() -> u32 {
    DEFAULT_MAX_ROUNDS
}

fn default_stall_epsilon_bps() -> u32 {
    DEFAULT_STALL_EPSILON_BPS
}

fn default_stall_window() -> usize {
    DEFAULT_STALL_WINDOW
}
