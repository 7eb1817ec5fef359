//! Library for the vecro node containing most of its core code:
//! the workload stress engine, the service core with its downstream
//! fan-out, and the middleware chain wrapped around it.
//!
//! The binary only resolves configuration and wires the transport.

#![cfg_attr(
    not(test),
    warn(clippy::print_stdout, clippy::dbg_macro),
    deny(clippy::unwrap_used, clippy::expect_used)
)]

pub mod client;
pub mod config;
pub mod http;
pub mod metrics;
pub mod middleware;
pub mod service;
pub mod stress;
pub mod utils;
