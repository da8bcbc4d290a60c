//! SDK entry point wrapping bootstrap → handshake → lifecycle, plus pairing.
//!
//! Documented guarantees on [`TetherClient`] are canonical for the crate.
pub mod client;

pub use client::TetherClient;
