//! Core types and trait definitions for the Needledrop recommendation store.
//!
//! This crate is deliberately free of database dependencies. Storage backends
//! (e.g. `needledrop-store-sqlite`) and front ends depend on this crate; it
//! depends on nothing proprietary.

pub mod error;
pub mod recommendation;
pub mod snowflake;
pub mod song;
pub mod store;
pub mod thread;

pub use error::{Error, Result};
