//! Search attempt flow and its terminal outcomes

mod machine;
mod outcome;

pub use machine::{Pacing, SearchAttempt};
pub use outcome::{AttemptOutcome, AttemptStatus, ResultHit};
