//! Declared model objects, as handed over by the out-of-scope parsers.

pub mod registry;
pub mod types;

pub use registry::ModelRegistry;
pub use types::*;
