//! Resume tracking: byte position, range end and identity validator of a
//! logical request across physical attempts.
//!
//! The first accepted response fixes the range end and the strong validator.
//! A later response is only accepted as a continuation if it carries the same
//! validator and declares a range that starts exactly at the bytes already
//! delivered and ends where the first response ended.

mod error;
mod tracker;

pub use error::ResumeError;
pub use tracker::{ResponseDisposition, ResumeTracker};
