//! Command modules for aspen-rmq.
//!
//! Each module handles a category of operations.

pub mod connection;
pub mod queue;
pub mod stats;
