//! Report formatters.
//!
//! - [`text`]: human-readable summary
//! - [`json`]: machine-readable document for scripting

pub mod json;
pub mod text;

pub use json::{JsonOutput, JsonOutputError};
pub use text::TextOutput;
