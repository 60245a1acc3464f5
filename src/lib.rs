//! filebench: a bulk file transfer throughput benchmark
//!
//! A server hands out randomly chosen files from a directory to any client
//! that asks, over a small length-prefixed TCP protocol. A client requests
//! a fixed number of files on one connection and saves them locally.
//!
//! Features:
//! - `MSGN` framed request/reply protocol
//! - One shared reactor driven by a configurable worker pool
//! - Session accounting with a single final throughput report
//! - Synthetic file generation for benchmark runs
//! - Configuration via CLI arguments or TOML file

pub mod catalog;
pub mod client;
pub mod config;
pub mod connection;
pub mod fixtures;
pub mod handler;
pub mod protocol;
pub mod runtime;
pub mod server;
pub mod session;
