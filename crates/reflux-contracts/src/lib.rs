// Public contracts for the Reflux API
// This crate defines DTOs, the flow-spec wire format, and the node catalog

pub mod artifacts;
pub mod catalog;
pub mod flows;
pub mod logs;
pub mod metrics;
pub mod retention;
pub mod runs;
pub mod spec;

pub use artifacts::*;
pub use catalog::*;
pub use flows::*;
pub use logs::*;
pub use metrics::*;
pub use retention::*;
pub use runs::*;
pub use spec::*;
