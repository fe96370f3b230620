//! Trace decoding.
//!
//! Two kinds of tool output reach the judge:
//! - formatted trace text (`@00003000: $ 8 <= 0000000a`) from the reference
//!   generator or from a testbench executable, and
//! - raw bit lines from a circuit simulator's table mode, one event slot per line.
//!
//! A `LineClassifier` turns each line into an optional trace line, or fails the
//! case when the tool reports an error or the line cannot be decoded.

pub mod bitline;
pub mod classify;
pub mod event;

pub use bitline::BitLine;
pub use classify::{
    BitLineClassifier, DecodeConfig, LineClassifier, ReferenceClassifier, TestbenchClassifier,
};
pub use event::{LOAD_ORIGIN, RegisterPadding, TraceEvent};
