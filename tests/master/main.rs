//! Document Master Integration Tests
//!
//! End-to-end behaviour of the master over the in-memory table:
//! - The worked add / update / correct / remove / history scenarios
//! - Interval invariants under random mutation sequences
//! - Racing writers

#[path = "../common/mod.rs"]
mod common;

mod concurrency;
mod invariants;
mod scenarios;
