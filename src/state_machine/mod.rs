//! State machines for the warranty lifecycle and the backjob dispute flow

pub mod lifecycle;
mod machine;

pub use machine::{build_transitions, BackjobMachine, TransitionDef};
