//! Scoring (Layer 5)
//!
//! Dimension pass rates, the layered content-quality score, the weighted
//! total and the deliverable summary.
//!
//! Scoring is a pure function of the raw results, so it has no error type:
//! every result set, including an empty one, produces a report.

#![warn(missing_docs)]

pub mod policy;
pub mod aggregate;
pub mod completeness;
pub mod engine;

pub use policy::ScoringPolicy;
pub use aggregate::{content_quality, tally};
pub use completeness::output_completeness;
pub use engine::ScoringEngine;
