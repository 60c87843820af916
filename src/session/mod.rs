//! The live-session engine: timers, phase machine, set ledger and summary
//! building. Everything here is synchronous and deterministic; the command
//! layer supplies the clock and carries out the effects.

pub mod ledger;
pub mod machine;
pub mod suggest;
pub mod summary;
pub mod timer;

pub use machine::{Effect, ExerciseSlot, Phase, Session, SessionConfig};
