//! Fixhub - service-marketplace warranty core

pub mod clock;
pub mod config;
pub mod db;
pub mod domain;
pub mod events;
pub mod service;
pub mod state_machine;
pub mod sweep;
pub mod sync;
