//! docserve - Concurrent static file server
//!
//! Core library for request handling, path resolution and the worker pool.

pub mod access_log;
pub mod config;
pub mod http;
pub mod server;
