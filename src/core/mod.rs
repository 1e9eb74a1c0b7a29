/*!
 * Core Module
 * Fundamental nucleus types, configuration and error handling
 */

pub mod clock;
pub mod config;
pub mod errors;
pub mod limits;
pub mod tracer;
pub mod types;

// Re-export for convenience
pub use clock::Deadline;
pub use config::NucleusConfig;
pub use errors::*;
pub use types::*;
