//! Database module - SQLite with sqlx

pub mod appointments;
pub mod backjobs;
pub mod conversations;
pub mod defects;
mod pool;

pub use appointments::*;
pub use backjobs::*;
pub use conversations::*;
pub use defects::*;
pub use pool::*;
