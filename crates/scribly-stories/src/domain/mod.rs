//! Domain layer: aggregates, commands, and the persistence ports.

pub mod aggregates;
pub mod commands;
pub mod ports;
pub mod turn;
pub mod user;
