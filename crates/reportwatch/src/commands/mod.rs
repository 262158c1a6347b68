//! Command handlers for the reportwatch CLI.

pub mod logging;
pub mod query;
pub mod serve;

pub use logging::*;
pub use query::*;
pub use serve::*;
