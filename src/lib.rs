//! Multiplex-corrected rate and cumulative views of per-CPU PMU counter samples.
//!
//! Counter tables are loaded into typed [`table::kind::PerfCounterTable`]s
//! (or handled directly as untyped [`table::Table`]s) and normalized by
//! [`normalize::as_rate`] / [`normalize::as_cumulative`].

pub mod collection;
pub mod config;
pub mod job;
pub mod normalize;
pub mod table;
