//! Filter engine for vspace reads.
//!
//! A [`Filter`] binds one column name to a [`Predicate`]. Every filter can do
//! two things:
//!
//! - evaluate a single decoded value ([`StatisticsFilter::evaluate`]), and
//! - decide from a chunk's min/max summary alone whether the chunk can be
//!   skipped ([`StatisticsFilter::check_statistics`]).
//!
//! The second answer is conservative: it says "skip" only when no value in
//! `[min, max]` can satisfy the predicate. Missing statistics never skip.

pub mod filter;
pub mod predicate;
pub mod value;

pub use filter::{Filter, StatisticsFilter};
pub use predicate::{CompareOp, Predicate};
pub use value::{ScalarValue, scalar_at};
