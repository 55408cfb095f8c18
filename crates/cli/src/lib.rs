//! Library surface of the `wanimirror` binary: startup configuration
//! and the HTTP API server. Split out of `main.rs` so integration
//! tests can assemble the router in-process.

pub mod config;
pub mod serve;
