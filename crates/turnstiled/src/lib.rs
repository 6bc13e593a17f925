//! turnstiled — HTTP daemon for face-similarity identification.
//!
//! Exposes the modules so integration tests can build the router and engine
//! directly; the binary wires them together in `main.rs`.

pub mod config;
pub mod engine;
pub mod http;
