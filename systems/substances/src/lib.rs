#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Substance field solver and the backends that host it.
//!
//! The [`Field`] owns the authoritative quantities and evolves them in
//! response to [`kiln_core::FieldCommand`]s: decay, drift-biased diffusion,
//! temperature-driven phase transitions, turbine flow measurement and the
//! steady-state flood fills. The simulation talks to it through a
//! [`FieldChannel`], either the [`ThreadedField`] worker or the synchronous
//! [`InlineField`] used by deterministic replays.

pub mod field;
mod flood;
pub mod worker;

pub use field::Field;
pub use worker::{FieldChannel, InlineField, ThreadedField};
