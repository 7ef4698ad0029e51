//! LabelMesh node: wires the tables, batch queues, protocol core, and
//! transport together into a single actor task (spec.md §5), plus the
//! client-facing handle and the process entrypoint's supporting pieces.

pub mod batch;
pub mod config;
pub mod debug;
pub mod error;
pub mod group;
pub mod model;
pub mod protocol;
pub mod tables;
pub mod transport;

pub mod node;

pub use config::{ClientConfig, NodeConfig};
pub use error::NodeError;
pub use node::{DebugStatus, Node, NodeHandle};
