//! Core types and trait definitions for the date-night timeline.
//!
//! This crate is deliberately free of HTTP and database dependencies. It
//! describes the three backend collaborators (identity provider, relational
//! store, photo store) as traits, and the domain rows they exchange.

pub mod classify;
pub mod couple;
pub mod entry;
pub mod error;
pub mod identity;
pub mod nav;
pub mod store;

pub use error::{Error, Result};
