pub mod board;
pub mod calculator;

pub use board::{PublishedStake, StakeBoard};
pub use calculator::{MultiplierState, StakeCalculator, StakeError, StakeParams, StakeResult};
