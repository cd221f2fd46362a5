//! The aggregation engine: raw observation records in, bucketed summaries
//! and headline totals out.
//!
//! Everything in this module is pure. The reactive glue that decides *when*
//! to recompute lives in [`crate::engine`]; the mirror that feeds it lives
//! in [`crate::mirror`].

pub mod bucket;
pub mod label;
pub mod totals;
