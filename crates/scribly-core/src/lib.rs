//! Scribly Core — shared domain abstractions.
//!
//! Time, randomness, command metadata and the error taxonomy that every other
//! Scribly crate speaks. Nothing in here performs I/O.

pub mod clock;
pub mod command;
pub mod error;
pub mod rng;
