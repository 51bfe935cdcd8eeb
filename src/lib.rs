//! Library crate for lan-probe-rs: target enumeration, probe strategies and
//! the bounded-concurrency scheduler that turns them into a `ScanReport`.
pub mod config;
pub mod error;
pub mod netdetect;
pub mod ports;
pub mod probe;
pub mod resolve;
pub mod scanner;
pub mod targets;
pub mod types;
