//! Feature extraction: turns a session's raw touch and keystroke event lists
//! into fixed-shape statistical summaries. Both extractors are total
//! functions of their input lists and return an all-zero summary on empty
//! input, so downstream scoring never branches on missing fields.

pub mod touch;
pub mod typing;

pub use touch::{summarize_touch, TouchGestureSummary};
pub use typing::{summarize_typing, TypingSummary};
