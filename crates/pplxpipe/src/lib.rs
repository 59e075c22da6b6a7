//! Public facade crate for `pplxpipe`.
//!
//! This crate intentionally contains no IO or backend-specific logic.
//! It re-exports the backend-agnostic types/traits from `pplxpipe-core`.

pub use pplxpipe_core::*;
