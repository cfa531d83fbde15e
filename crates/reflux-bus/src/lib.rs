//! Node dispatch bus
//!
//! A name- and version-addressed request/reply layer between the execution
//! engine and node implementations. Handlers register under addresses of the
//! shape `<version>.<name>.execute`; the engine dispatches by name + version
//! with resolved params and run metadata. The default transport is in-process,
//! but the [`NodeBus`] trait is the seam for an external broker: the contract
//! is request timeout, addressability, unchanged metadata, and at-least-once
//! delivery.

mod address;
mod bus;
mod error;
mod handler;
mod registry;

pub use address::{Address, SemVer};
pub use bus::{BusConfig, InProcessBus, NodeBus, DEFAULT_REQUEST_TIMEOUT};
pub use error::{DispatchError, NodeError};
pub use handler::{DispatchMeta, NodeHandler, NodeSchema, ParamSpec, ParamType};
pub use registry::HandlerRegistry;
