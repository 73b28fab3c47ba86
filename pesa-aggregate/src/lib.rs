//! Pesa Aggregate - Resilient Aggregation
//!
//! Counting, summing, averaging and grouped aggregation that work the same
//! against every remote store build, whether or not it understands
//! COUNT/SUM/AVG/MIN/MAX, GROUP BY or HAVING.
//!
//! - [`AggregateEngine`]: native statement first, in-memory fallback on a
//!   recognised unsupported-syntax rejection
//! - [`HavingFilter`]: single-predicate HAVING evaluation for the fallback
//! - [`CapabilityProbe`]: diagnostic capability snapshot

pub mod engine;
pub mod having;
pub mod ops;
pub mod probe;

pub use engine::{AggregateEngine, CountMethod, CountOutcome};
pub use having::{HavingFilter, HavingOp};
pub use probe::{probe_statements, CapabilityProbe};
