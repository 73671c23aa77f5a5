//! Core types and algorithms for the Cetus marine-animal incident store.
//!
//! This crate is deliberately free of database and I/O dependencies. Storage
//! backends implement [`store::IncidentStore`]; everything else here is pure.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod animal;
pub mod case;
pub mod dag;
pub mod datetime;
pub mod deps;
pub mod error;
pub mod gear;
pub mod ids;
pub mod numbering;
pub mod store;
pub mod taxon;

pub use error::{Error, Result};
