pub mod constraints;
pub mod money;
pub mod offer;
pub mod party;
pub mod schedule;
pub mod session;
pub mod turn;
