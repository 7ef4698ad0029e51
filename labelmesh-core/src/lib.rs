//! Shared primitives for a LabelMesh node: the wire codec, the data-model
//! newtypes tables are keyed by, the timer service, and the injectable
//! clock/rng collaborators the protocol core needs for deterministic tests.

pub mod clock;
pub mod constants;
pub mod deadline;
pub mod error;
pub mod timer;
pub mod wire;

pub use clock::{Clock, RandomSource, SystemClock, ThreadRandom};
#[cfg(any(test, feature = "test-support"))]
pub use clock::test_support::{FixedClock, ZeroRandom};
pub use constants::*;
pub use deadline::Deadline;
pub use error::CodecError;
pub use timer::{TimerHandle, TimerService};
pub use wire::{Item, Message};
