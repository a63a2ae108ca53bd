//! Shared utilities: duration parsing, glob matching, debouncing, and backoff. Small,
//! dependency-free helpers reused across the other crates so none of them need to
//! re-implement this plumbing.

mod backoff;
mod debounce;
mod duration;
mod glob_match;

pub use backoff::Backoff;
pub use debounce::Debouncer;
pub use duration::{format_duration, parse_duration};
pub use glob_match::glob_matches;
