//! The runner streams a CSV file of requests through the engine and writes
//! one reply row per request to a writer.
//!
//! It stands in for a network front end: reading and dispatching run as two
//! tasks joined by a bounded channel, and requests are applied in file order.

mod async_runner;

pub use async_runner::run;
