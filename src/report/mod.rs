//! Report module - training summary and evaluation export

pub mod evaluation;
pub mod summary;

pub use evaluation::*;
pub use summary::*;
